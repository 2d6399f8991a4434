//! cr - capability registry client
//!
//! CLI entry point: runs the client against an in-process registry and
//! inspects configuration.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{info, warn};

use capregistry::cli::{Cli, Command, get_log_path};
use capregistry::client::RegistryClient;
use capregistry::config::Config;
use capregistry::transport::{LoopbackTransport, RegistryService};

fn setup_logging(level: &str) -> Result<()> {
    // Create log directory
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level: tracing::Level = level
        .parse()
        .map_err(|_| eyre::eyre!("Invalid log level: {}", level))?;
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging: CLI flag wins over config
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    setup_logging(&level).context("Failed to setup logging")?;

    info!(
        "capregistry loaded config: hostname={}, reply-to={}",
        config.client.hostname, config.client.reply_to
    );

    match cli.command {
        Some(Command::Demo {
            duration_secs,
            list_every_ms,
        }) => cmd_demo(&config, Duration::from_secs(duration_secs), Duration::from_millis(list_every_ms)).await,
        Some(Command::Config) => cmd_config(&config),
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Print the effective configuration
fn cmd_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}

/// Register, list, answer a ping and unregister against an in-process registry
async fn cmd_demo(config: &Config, duration: Duration, list_every: Duration) -> Result<()> {
    let transport = Arc::new(LoopbackTransport::with_default_capacity());

    let service = Arc::new(RegistryService::new("registry", transport.clone()));
    let service_task = tokio::spawn(service.clone().run(transport.subscribe()));

    let client = Arc::new(RegistryClient::new(config, transport.clone()));
    let inbound = transport.inbound_for(client.reply_to());
    let inbound_client = client.clone();
    let inbound_task = tokio::spawn(async move { inbound_client.run_inbound(inbound).await });

    println!(
        "{} {} as {}",
        "client".bold(),
        config.client.hostname.cyan(),
        client.reply_to().dimmed()
    );

    let identity = config.provider.identity.clone();
    let record = client
        .register(identity.clone(), config.provider.capabilities.clone())
        .await
        .context("Failed to register provider")?;
    println!(
        "{} {} ({} capabilities)",
        "registered".green(),
        record.identity.name.bold(),
        record.capabilities.len()
    );

    let deadline = tokio::time::Instant::now() + duration;
    let mut pinged = false;
    while tokio::time::Instant::now() < deadline {
        match client.list_providers(client.request_timeout()).await {
            Ok(response) => {
                let names: Vec<String> = response.providers.iter().map(|p| p.identity.name.clone()).collect();
                println!(
                    "{} {} provider(s): {}",
                    "listed".blue(),
                    response.providers.len(),
                    names.join(", ")
                );
            }
            Err(e) => {
                warn!("List failed: {}", e);
                println!("{} {}", "list failed".red(), e);
            }
        }

        if !pinged {
            let ping_id = service.ping().await.context("Failed to ping clients")?;
            println!("{} {}", "pinged".yellow(), ping_id.to_string().dimmed());
            pinged = true;
        }

        tokio::time::sleep(list_every.min(deadline.saturating_duration_since(tokio::time::Instant::now()))).await;
    }

    client
        .unregister(&identity)
        .await
        .context("Failed to unregister provider")?;
    println!("{} {}", "unregistered".green(), identity.name.bold());

    let drained = client.shutdown(config.notifier.shutdown_wait()).await;
    let metrics = client.metrics();
    println!(
        "{} drained={} submitted={} resolved={} timed-out={} pongs-seen-by-registry={}",
        "shutdown".bold(),
        drained,
        metrics.submitted,
        metrics.resolved,
        metrics.timed_out,
        service.pongs_received()
    );

    inbound_task.abort();
    service_task.abort();
    Ok(())
}
