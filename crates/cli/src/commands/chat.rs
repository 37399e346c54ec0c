//! `ratchet chat` — single-prompt or interactive conversation mode.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use ratchet_agent::Agent;
use ratchet_config::Settings;
use ratchet_core::tool::ToolRegistry;
use ratchet_providers::OpenAiCompatBackend;
use ratchet_telemetry::Metrics;
use ratchet_tools::register_builtin_tools;

/// CLI flags that override loaded settings.
pub struct Overrides {
    pub safe_mode: bool,
    pub dry_run: bool,
    pub max_tools: Option<u32>,
    pub show_metrics: bool,
}

pub async fn run(
    config: Option<&Path>,
    prompt: Option<String>,
    overrides: Overrides,
) -> anyhow::Result<()> {
    let mut settings = Settings::load(config).context("failed to load config")?;
    if overrides.safe_mode {
        settings.safe_mode = true;
    }
    if let Some(budget) = overrides.max_tools {
        settings.max_tools = budget;
    }

    let backend = OpenAiCompatBackend::from_settings(&settings).context(
        "backend not configured; set LLM_ENDPOINT and LLM_MODEL (or endpoint/model in the config file)",
    )?;

    let registry = Arc::new(ToolRegistry::new());
    register_builtin_tools(&registry);
    let metrics = Arc::new(Metrics::new());

    let agent = Agent::new(Arc::new(backend), registry, Arc::clone(&metrics))
        .with_settings(&settings)
        .dry_run(overrides.dry_run);

    if let Some(prompt) = prompt {
        let answer = agent.chat(&prompt).await?;
        println!("{answer}");
        if overrides.show_metrics {
            print_metrics(&metrics)?;
        }
        return Ok(());
    }

    // Interactive mode: each line is its own conversation.
    println!("ratchet — model {} | safe_mode={}", settings.model, settings.safe_mode);
    println!("Type your message and press Enter. 'exit' to quit.");
    println!();

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        match agent.chat(line).await {
            Ok(answer) => {
                println!();
                println!("{answer}");
                println!();
                if overrides.show_metrics {
                    print_metrics(&metrics)?;
                }
            }
            Err(e) => eprintln!("[error] {e}"),
        }
    }

    Ok(())
}

fn print_metrics(metrics: &Metrics) -> anyhow::Result<()> {
    eprintln!("--- metrics ---");
    eprintln!("{}", serde_json::to_string_pretty(&metrics.snapshot())?);
    Ok(())
}
