//! `clawbot status` — configuration, credentials and configured tool servers.

use anyhow::Result;
use colored::Colorize;

use clawbot_core::config::{get_config_path, Config};
use clawbot_mcp::load_server_configs;

fn mark(ok: bool, yes: &str, no: &str) -> String {
    if ok {
        format!("{} {yes}", "✓".green())
    } else {
        format!("{}", format!("· {no}").dimmed())
    }
}

pub fn run(config: &Config) -> Result<()> {
    let config_path = get_config_path();

    println!();
    println!("{}", "🦀 Clawbot Status".cyan().bold());
    println!();

    println!(
        "  {} {} {}",
        format!("{:<18}", "Config:").bold(),
        config_path.display(),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found, using defaults)".red().to_string()
        }
    );
    println!("  {} {}", format!("{:<18}", "Model:").bold(), config.ai.model);
    println!(
        "  {} {}",
        format!("{:<18}", "Parameters:").bold(),
        format!(
            "temp: {} | max_tokens: {} | max_tool_rounds: {}",
            config.ai.temperature, config.ai.max_tokens, config.ai.max_tool_rounds
        )
        .dimmed()
    );

    println!();
    println!(
        "  {} {}",
        format!("{:<18}", "Anthropic:").bold(),
        mark(config.providers.anthropic.is_configured(), "(key set)", "not configured")
    );
    println!(
        "  {} {}",
        format!("{:<18}", "Telegram:").bold(),
        mark(config.telegram.is_configured(), "(token set)", "not configured")
    );
    println!(
        "  {} {}",
        format!("{:<18}", "Memory:").bold(),
        mark(config.memory.enabled, "enabled", "disabled")
    );
    println!(
        "  {} {}",
        format!("{:<18}", "Knowledge search:").bold(),
        mark(config.rag.enabled, "enabled", "disabled")
    );

    println!();
    println!("  {}", "Tool servers:".bold());
    let servers = load_server_configs(&config.mcp);
    if servers.is_empty() {
        println!("    {}", "· none configured".dimmed());
    }
    for server in &servers {
        println!(
            "    {} {}",
            format!("{:<20}", server.name),
            format!("{} {}", server.command, server.args.join(" ")).dimmed()
        );
    }
    println!();

    Ok(())
}
