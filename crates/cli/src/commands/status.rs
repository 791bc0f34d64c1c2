//! Service health command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse, ReadinessResponse};
use crate::output::{color_status, print_json, print_table, OutputFormat};

/// Row for component health
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Checked")]
    checked_at: String,
}

/// Show liveness and readiness of the service
pub async fn health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.get_probe("healthz").await?;
    let readiness: ReadinessResponse = client.get_probe("readyz").await?;

    if let OutputFormat::Json = format {
        return print_json(&serde_json::json!({
            "health": health,
            "readiness": readiness,
        }));
    }

    let ready = if readiness.ready { "ready" } else { "not ready" };
    println!("{}", "Service Health".bold());
    println!("{}", "=".repeat(50));
    println!("Status:                 {}", color_status(&health.status));
    println!("Readiness:              {}", color_status(ready));
    if let Some(reason) = &readiness.reason {
        println!("Reason:                 {}", reason);
    }
    println!();

    let rows: Vec<ComponentRow> = health
        .components
        .into_iter()
        .map(|(component, c)| ComponentRow {
            component,
            status: color_status(&c.status),
            message: c.message.unwrap_or_else(|| "-".to_string()),
            checked_at: c.checked_at.format("%H:%M:%S").to_string(),
        })
        .collect();
    print_table(&rows, "No components registered");

    Ok(())
}
