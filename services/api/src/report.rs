use crate::infra::{open_store, resolve_window};
use chrono::{NaiveDate, Utc};
use clap::Args;
use funnel_analytics::analytics::router::{DEFAULT_WINDOW_DAYS, REVENUE_WINDOW_DAYS};
use funnel_analytics::analytics::{
    as_of_for, write_report, AttributionModel, DashboardView,
    FunnelAnalyticsService, ReportKind, Roi,
};
use funnel_analytics::config::AppConfig;
use funnel_analytics::error::AppError;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct ReportArgs {
    /// SQLite database to read (overrides FUNNEL_DATABASE_PATH)
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
    /// First day of the window (YYYY-MM-DD). Defaults to 30 days before the end.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) start_date: Option<NaiveDate>,
    /// Last day of the window (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) end_date: Option<NaiveDate>,
    /// Attribution model (first_touch, last_touch, linear, time_decay, position_based)
    #[arg(long, value_parser = parse_model)]
    pub(crate) model: Option<AttributionModel>,
    /// Print the dashboard as JSON instead of text
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ExportArgs {
    /// Table to export: sources, stages, bottlenecks, attribution or trends
    #[arg(long, value_parser = parse_report_kind)]
    pub(crate) report: ReportKind,
    /// SQLite database to read (overrides FUNNEL_DATABASE_PATH)
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
    /// First day of the window (YYYY-MM-DD). Defaults to 90 days before the end.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) start_date: Option<NaiveDate>,
    /// Last day of the window (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) end_date: Option<NaiveDate>,
    /// Attribution model used for source and attribution tables
    #[arg(long, value_parser = parse_model)]
    pub(crate) model: Option<AttributionModel>,
    /// Destination file; stdout when omitted
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

fn parse_model(raw: &str) -> Result<AttributionModel, String> {
    raw.parse::<AttributionModel>().map_err(|err| err.to_string())
}

fn parse_report_kind(raw: &str) -> Result<ReportKind, String> {
    raw.parse::<ReportKind>().map_err(|err| err.to_string())
}

fn load_dashboard(
    config: AppConfig,
    database: Option<PathBuf>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    model: Option<AttributionModel>,
    default_days: u32,
) -> Result<DashboardView, AppError> {
    let store = open_store(&config.database, database)?;
    let service = FunnelAnalyticsService::new(Arc::new(store), config.analytics);

    let window = resolve_window(start_date, end_date, default_days)?;
    let model = model.unwrap_or_else(|| service.default_model());
    let dashboard = service.dashboard(window, model, as_of_for(&window, Utc::now()))?;
    Ok(dashboard)
}

pub(crate) fn run_report(config: AppConfig, args: ReportArgs) -> Result<(), AppError> {
    let ReportArgs {
        database,
        start_date,
        end_date,
        model,
        json,
    } = args;

    let dashboard = load_dashboard(config, database, start_date, end_date, model, DEFAULT_WINDOW_DAYS)?;

    if json {
        let rendered = serde_json::to_string_pretty(&dashboard)
            .map_err(|err| AppError::Io(io::Error::from(err)))?;
        println!("{rendered}");
    } else {
        render_dashboard(&dashboard);
    }
    Ok(())
}

pub(crate) fn run_export(config: AppConfig, args: ExportArgs) -> Result<(), AppError> {
    let ExportArgs {
        report,
        database,
        start_date,
        end_date,
        model,
        output,
    } = args;

    let dashboard = load_dashboard(config, database, start_date, end_date, model, REVENUE_WINDOW_DAYS)?;

    let rows = match output {
        Some(path) => {
            let writer = BufWriter::new(File::create(&path)?);
            let rows = write_report(report, &dashboard, writer)?;
            eprintln!("wrote {rows} {report} rows to {}", path.display());
            rows
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            let rows = write_report(report, &dashboard, &mut handle)?;
            handle.flush()?;
            rows
        }
    };

    if rows == 0 {
        eprintln!("no {report} rows for {} -> {}", dashboard.window.start, dashboard.window.end);
    }
    Ok(())
}

pub(crate) fn render_dashboard(dashboard: &DashboardView) {
    println!("Sales funnel dashboard");
    println!(
        "Window: {} -> {} (attribution model {})",
        dashboard.window.start, dashboard.window.end, dashboard.model
    );

    if dashboard.is_empty {
        println!("\nNo leads or funnel activity in this window.");
    }

    let overview = &dashboard.overview;
    println!("\nOverview");
    println!(
        "- Leads {} | Calls scheduled {} | Calls completed {} | Proposals {} | Contracts {}",
        overview.total_leads,
        overview.discovery_calls_scheduled,
        overview.discovery_calls_completed,
        overview.proposals_sent,
        overview.contracts_signed
    );
    println!(
        "- Revenue {:.2} | Avg deal {:.2} | Overall conversion {:.1}%",
        overview.total_revenue, overview.avg_deal_size, overview.overall_conversion_rate
    );
    match overview.avg_sales_cycle_days {
        Some(days) => println!("- Avg sales cycle {:.1} days", days),
        None => println!("- Avg sales cycle: n/a"),
    }

    println!("\nStages");
    for stage in &dashboard.funnel.stages {
        let avg = stage
            .avg_duration_days
            .map(|days| format!("{days:.1}d"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "- {}. {}: {} entered, {} converted ({:.1}%), avg {} (expected {:.0}d)",
            stage.stage_order,
            stage.stage_name,
            stage.prospects_entered,
            stage.prospects_converted,
            stage.stage_conversion_rate,
            avg,
            stage.expected_duration_days
        );
    }

    if dashboard.bottlenecks.findings.is_empty() {
        println!("\nBottlenecks: none");
    } else {
        println!("\nBottlenecks");
        for finding in &dashboard.bottlenecks.findings {
            println!(
                "- [{}] {} (score {:.2}, {} stuck)",
                finding.severity.label(),
                finding.stage_name,
                finding.score,
                finding.prospects_stuck
            );
        }
    }

    println!("\nSources");
    for row in &dashboard.sources {
        let roi = match row.roi {
            Roi::Defined(percent) => format!("{percent:.0}%"),
            Roi::Undefined => "n/a (no cost)".to_string(),
        };
        println!(
            "- {}: {} leads, {} contracts, revenue {:.2}, ROI {}",
            row.source_name, row.lead_count, row.contracts_count, row.attributed_revenue, roi
        );
    }

    println!("\nInsights");
    for insight in &dashboard.insights {
        println!("- [{}] {}: {}", insight.priority.label(), insight.title, insight.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use funnel_analytics::analytics::domain::DateWindow;
    use funnel_analytics::config::AnalyticsConfig;
    use funnel_analytics::store::InMemoryFunnelStore;

    #[test]
    fn renders_empty_dashboard() {
        let service = FunnelAnalyticsService::new(
            Arc::new(InMemoryFunnelStore::new()),
            AnalyticsConfig::default(),
        );
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date"),
            NaiveDate::from_ymd_opt(2025, 1, 31).expect("valid date"),
        )
        .expect("valid window");
        let as_of = Utc
            .with_ymd_and_hms(2025, 1, 31, 18, 0, 0)
            .single()
            .expect("valid timestamp");

        let dashboard = service
            .dashboard(window, AttributionModel::Linear, as_of)
            .expect("dashboard computed");

        assert!(dashboard.is_empty);
        render_dashboard(&dashboard);
    }

    #[test]
    fn model_flag_reuses_attribution_parser() {
        assert_eq!(
            parse_model("position_based").expect("known"),
            AttributionModel::PositionBased
        );
        assert!(parse_model("shapley").expect_err("unknown").contains("shapley"));
        assert_eq!(parse_report_kind("bottlenecks").expect("known"), ReportKind::Bottlenecks);
    }
}
