//! Synthetic load commands

use anyhow::Result;
use colored::Colorize;

use agent_lib::load::{LoadState, StressProfile};

use crate::client::ApiClient;
use crate::output::{format_bytes, print_info, print_json, print_success, OutputFormat};

fn print_state(state: &LoadState) {
    println!("{}", "Synthetic Load".bold());
    println!("{}", "-".repeat(40));
    println!("CPU Workers:    {}", state.cpu_workers);
    println!(
        "Memory Ballast: {} ({} of {} blocks)",
        format_bytes(state.memory_bytes as u64),
        state.memory_blocks,
        state.memory_max_blocks
    );
    println!("Stress Runs:    {}", state.stress_runs);
}

fn report(state: &LoadState, message: &str, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(state)?,
        OutputFormat::Table => {
            print_success(message);
            print_state(state);
        }
    }
    Ok(())
}

pub async fn start_cpu(
    client: &ApiClient,
    workers: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let state = client.start_cpu(workers).await?;
    report(
        &state,
        &format!("CPU load running with {} workers", state.cpu_workers),
        format,
    )
}

pub async fn stop_cpu(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let state = client.stop_cpu().await?;
    report(&state, "CPU load stopped", format)
}

pub async fn allocate_memory(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let state = client.allocate_memory().await?;
    report(
        &state,
        &format!("Ballast now holds {}", format_bytes(state.memory_bytes as u64)),
        format,
    )
}

pub async fn free_memory(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let state = client.free_memory().await?;
    report(&state, "Memory ballast released", format)
}

/// Start `stress` on the agent host; the agent does not wait for it
pub async fn run_stress(
    client: &ApiClient,
    timeout: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let mut profile = StressProfile::default();
    if let Some(secs) = timeout {
        profile.timeout_secs = secs;
    }

    let state = client.run_stress(&profile).await?;
    if let OutputFormat::Table = format {
        print_info(&format!("Started: {}", profile.command()));
    }
    report(&state, "Stress run started", format)
}

pub async fn show_load(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let state = client.load_state().await?;
    match format {
        OutputFormat::Json => print_json(&state)?,
        OutputFormat::Table => print_state(&state),
    }
    Ok(())
}
