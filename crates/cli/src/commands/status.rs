//! Monitor status and usage commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use agent_lib::models::Sample;
use agent_lib::status::MonitorStatus;

use crate::client::ApiClient;
use crate::output::{
    color_percent, color_status, format_timestamp, print_json, print_warning, OutputFormat,
};

/// Row for the usage table
#[derive(Tabled)]
struct UsageRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Usage")]
    usage: String,
}

fn usage_rows(sample: &Sample, threshold: f64) -> Vec<UsageRow> {
    [
        ("CPU", sample.cpu_percent),
        ("Memory", sample.memory_percent),
        ("Disk", sample.disk_percent),
    ]
    .into_iter()
    .map(|(resource, value)| UsageRow {
        resource: resource.to_string(),
        usage: color_percent(value, threshold),
    })
    .collect()
}

fn print_usage_table(sample: &Sample, threshold: f64) {
    let table = tabled::Table::new(usage_rows(sample, threshold))
        .with(tabled::settings::Style::rounded())
        .to_string();
    println!("{}", table);
}

/// Show the agent's status snapshot
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: MonitorStatus = client.status().await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            println!("{}", "Agent Status".bold());
            println!("{}", "=".repeat(50));
            println!(
                "Status:             {}",
                color_status(&format!("{:?}", status.phase))
            );
            println!("Label:              {}", status.label);
            if let Some(phase) = status.migration_phase {
                println!("Migration Phase:    {}", phase);
            }
            println!("Provider:           {}", status.provider.cyan());
            println!(
                "High Samples:       {} of {} (threshold {:.0}%)",
                status.trailing_breaches, status.consecutive_checks, status.threshold_percent
            );
            println!("Samples Recorded:   {}", status.samples_recorded);
            println!("Migration Attempts: {}", status.migration_attempts);
            if let Some(failure) = &status.last_failure {
                println!("Last Failure:       {}", failure.red());
            }
            println!("Updated:            {}", format_timestamp(status.updated_at));
            println!();

            match &status.latest_sample {
                Some(sample) => print_usage_table(sample, status.threshold_percent),
                None => print_warning("No sample recorded yet"),
            }
        }
    }

    Ok(())
}

/// Take a fresh usage reading through the agent
pub async fn show_usage(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let sample: Sample = client.usage().await?;

    match format {
        OutputFormat::Json => print_json(&sample)?,
        OutputFormat::Table => {
            println!("Sampled at {}", format_timestamp(sample.timestamp));
            // The agent threshold is not part of a bare sample
            print_usage_table(&sample, agent_lib::detector::DEFAULT_THRESHOLD_PERCENT);
        }
    }

    Ok(())
}
