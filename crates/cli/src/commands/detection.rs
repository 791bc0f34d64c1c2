//! Detection trigger commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, CollectReport, PredictiveReport, ThresholdAction};
use crate::output::{
    color_action, format_score, print_info, print_json, print_success, print_table,
    print_warning, OutputFormat,
};

/// Row for threshold pass results
#[derive(Tabled)]
struct ThresholdRow {
    #[tabled(rename = "Workload")]
    workload: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
}

/// Row for predictive pass results
#[derive(Tabled)]
struct PredictiveRow {
    #[tabled(rename = "Workload")]
    workload: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Timestamp")]
    timestamp: String,
}

/// Run the threshold detection pass
pub async fn detect(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let actions: Vec<ThresholdAction> = client.get("detect_anomalies").await?;

    match format {
        OutputFormat::Json => print_json(&actions)?,
        OutputFormat::Table => {
            println!("{}", "Threshold Detection".bold());
            let rows: Vec<ThresholdRow> = actions
                .into_iter()
                .map(|a| ThresholdRow {
                    action: color_action(&a.action),
                    workload: a.workload,
                    reason: a.reason,
                    outcome: a.outcome,
                })
                .collect();
            print_table(&rows, "No threshold breaches");
        }
    }

    Ok(())
}

/// Run the predictive detection pass
pub async fn predict(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report: PredictiveReport = client.get("predict_anomalies").await?;

    if let OutputFormat::Json = format {
        return print_json(&report);
    }

    println!("{}", "Predictive Detection".bold());
    match report {
        PredictiveReport::NotEnoughData {
            rows_found,
            required_min,
        } => {
            print_warning(&format!(
                "Not enough data: {} samples found, {} required",
                rows_found, required_min
            ));
        }
        PredictiveReport::Completed {
            total_anomalies,
            details,
        } => {
            let rows: Vec<PredictiveRow> = details
                .into_iter()
                .map(|d| PredictiveRow {
                    score: format_score(d.score),
                    action: color_action(&d.action),
                    workload: d.workload,
                    metric: d.metric,
                    outcome: d.outcome,
                    timestamp: d.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                })
                .collect();
            print_table(&rows, "No anomalies detected");
            print_info(&format!("{} anomalous workloads handled", total_anomalies));
        }
    }

    Ok(())
}

/// Trigger a metric collection
pub async fn collect(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report: CollectReport = client.get("collect_metrics").await?;

    match (format, report) {
        (OutputFormat::Json, report) => print_json(&report)?,
        (OutputFormat::Table, CollectReport::Inserted { samples }) => {
            print_success(&format!("Stored {} samples", samples));
        }
        (OutputFormat::Table, CollectReport::NoData) => {
            print_warning("Source returned no samples");
        }
    }

    Ok(())
}
