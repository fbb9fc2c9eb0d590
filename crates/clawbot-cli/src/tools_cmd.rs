//! `clawbot tools` — start the tool servers and print the aggregated tool list.

use anyhow::Result;
use colored::Colorize;

use clawbot_core::config::Config;

use crate::helpers;

pub async fn run(config: &Config) -> Result<()> {
    let (servers, report) = helpers::start_tool_servers(config).await;
    let sessions = helpers::open_sessions()?;
    let registry = helpers::build_registry(config, servers.clone(), &sessions, None);
    let tools = registry.aggregate();

    println!();
    println!(
        "{} {}",
        "🧰 Tools".cyan().bold(),
        format!("({} servers started, {} tools)", report.servers_started, tools.len()).dimmed()
    );
    for (name, reason) in &report.failures {
        println!("  {} {name}: {reason}", "✗".red());
    }
    println!();
    helpers::print_tools(&tools);
    println!();

    servers.shutdown_all().await;
    Ok(())
}
