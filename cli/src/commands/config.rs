// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use fedlcm_broker_core::domain::broker_config::{BrokerConfigManifest, DatabaseBackend};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with default values
    Generate {
        /// Output path (default: ./broker-config.yaml)
        #[arg(short, long, default_value = "./broker-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(&output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config =
        BrokerConfigManifest::load_or_default(config_override.clone()).context("Failed to load configuration")?;
    let spec = &config.spec;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. FEDLCM_BROKER_CONFIG: {}",
            std::env::var("FEDLCM_BROKER_CONFIG")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./broker-config.yaml");
        println!("  4. /etc/fedlcm/broker-config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Server:".bold());
    println!("  Listen: {}:{}", spec.server.bind_address, spec.server.port);
    println!();

    println!("{}", "Database:".bold());
    match spec.database.backend {
        DatabaseBackend::Memory => println!("  Backend: memory"),
        DatabaseBackend::Postgres => {
            println!("  Backend: postgres");
            println!(
                "  URL: {}",
                if spec.database.url.is_some() { "(set)" } else { "(missing)" }
            );
            println!("  Max connections: {}", spec.database.max_connections);
        }
    }
    println!();

    println!("{}", "Peer client:".bold());
    println!("  Attempts: {}", spec.peer_client.max_attempts);
    println!("  Retry delay: {}ms", spec.peer_client.retry_delay_ms);
    println!("  Timeout: {}s", spec.peer_client.timeout_secs);
    println!(
        "  Mutual TLS: {}",
        if spec.peer_client.tls.is_some() { "configured" } else { "off" }
    );
    println!();

    println!("{}", "Fan-out:".bold());
    println!("  Max in flight: {}", spec.fanout.max_in_flight);
    println!();

    println!("{}", "Observability:".bold());
    println!(
        "  Logs: {} ({})",
        spec.observability.log_level, spec.observability.log_format
    );
    match spec.observability.metrics_port {
        Some(port) => println!("  Metrics port: {}", port),
        None => println!("  Metrics port: {}", "(disabled)".dimmed()),
    }

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = BrokerConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists, pass --force to overwrite", output.display());
    }

    BrokerConfigManifest::default()
        .to_yaml_file(output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
