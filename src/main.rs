//! Auto-calibrate command-line host
//!
//! Runs calibrated sensors against an in-memory host driven by line
//! commands on stdin. Every snapshot a sensor publishes is echoed to stdout
//! as one JSON line.

use anyhow::Context;
use async_trait::async_trait;
use auto_calibrate::{
    config::AppConfig,
    host::{EntityStore, InMemoryHost, PublishedState, RestoredState, SourceState},
    logging::{init_logging, LogConfig},
    CalibrationRegistry, SetupFlow, SetupRequest,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "auto-calibrate")]
#[command(about = "Self-calibrating 0-100% sensor host")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "AUTO_CALIBRATE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the configured sensors, reading commands from stdin
    Run,
    /// Load and validate the configuration, then print it
    CheckConfig,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load_from_file(path)?,
            None => AppConfig::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }
}

/// One stdin command
#[derive(Debug, Clone, PartialEq)]
enum HostCommand {
    State {
        entity_id: String,
        value: String,
        friendly_name: Option<String>,
    },
    RemoveState(String),
    Add {
        entity_id: String,
        name: Option<String>,
    },
    Unload(String),
    Reset(Vec<String>),
    Show,
}

fn rest(words: &[&str]) -> Option<String> {
    (!words.is_empty()).then(|| words.join(" "))
}

fn parse_command(line: &str) -> anyhow::Result<HostCommand> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let command = match words.as_slice() {
        ["state", entity_id, value, name @ ..] => HostCommand::State {
            entity_id: entity_id.to_string(),
            value: value.to_string(),
            friendly_name: rest(name),
        },
        ["remove-state", entity_id] => HostCommand::RemoveState(entity_id.to_string()),
        ["add", entity_id, name @ ..] => HostCommand::Add {
            entity_id: entity_id.to_string(),
            name: rest(name),
        },
        ["unload", output] => HostCommand::Unload(output.to_string()),
        ["reset", outputs @ ..] if !outputs.is_empty() => {
            HostCommand::Reset(outputs.iter().map(|s| s.to_string()).collect())
        }
        ["show"] => HostCommand::Show,
        _ => anyhow::bail!("unrecognized command: {}", line.trim()),
    };
    Ok(command)
}

/// Store that forwards to the host and echoes each snapshot
struct EchoStore {
    host: Arc<InMemoryHost>,
    echo: mpsc::UnboundedSender<PublishedState>,
}

#[async_trait]
impl EntityStore for EchoStore {
    async fn publish(&self, state: &PublishedState) -> auto_calibrate::Result<()> {
        self.host.publish(state).await?;
        // Closed only while shutting down
        let _ = self.echo.send(state.clone());
        Ok(())
    }

    async fn last_state(&self, entity_id: &str) -> auto_calibrate::Result<Option<RestoredState>> {
        self.host.last_state(entity_id).await
    }
}

async fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

struct Session {
    host: Arc<InMemoryHost>,
    registry: CalibrationRegistry,
    setup: SetupFlow,
    config: AppConfig,
    config_path: Option<PathBuf>,
}

impl Session {
    async fn execute(&mut self, command: HostCommand) -> anyhow::Result<()> {
        match command {
            HostCommand::State {
                entity_id,
                value,
                friendly_name,
            } => {
                let mut state = SourceState::new(value);
                state.friendly_name = friendly_name;
                self.host.set_state(entity_id, state).await;
            }
            HostCommand::RemoveState(entity_id) => {
                self.host.remove_state(&entity_id).await;
            }
            HostCommand::Add { entity_id, name } => {
                let mut request = SetupRequest::new(entity_id);
                request.name = name;
                let entry = self
                    .setup
                    .create_entry(request, &self.registry.entries())
                    .await
                    .map_err(|e| match e.setup_error_key() {
                        Some(key) => anyhow::anyhow!("{}: {}", key, e),
                        None => e.into(),
                    })?;
                self.registry.setup_entry(entry.clone()).await?;
                self.config.sensors.push(entry);
                self.save_config()?;
            }
            HostCommand::Unload(output) => {
                let entry_id = self
                    .registry
                    .entry_id_for(&output)
                    .map(str::to_string)
                    .with_context(|| format!("no calibrated sensor {}", output))?;
                self.registry.unload_entry(&entry_id).await?;
                self.config.sensors.retain(|e| e.entry_id != entry_id);
                self.save_config()?;
            }
            HostCommand::Reset(outputs) => {
                let count = self.registry.reset(outputs.as_slice()).await?;
                info!("Reset {} of {} requested sensors", count, outputs.len());
            }
            HostCommand::Show => {
                for output in self.registry.output_entity_ids() {
                    if let Some(snapshot) = self.registry.snapshot(&output).await {
                        print_json(&snapshot).await?;
                    }
                }
            }
        }
        Ok(())
    }

    fn save_config(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.config_path {
            self.config
                .save_to_file(path)
                .with_context(|| format!("saving {:?}", path))?;
        }
        Ok(())
    }
}

async fn run(config: AppConfig, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let host = Arc::new(InMemoryHost::with_persistence(config.storage.path.clone()));
    let restored = host.load_from_disk().await?;
    if let Some(path) = host.persist_path() {
        info!("Loaded {} persisted snapshots from {:?}", restored, path);
    }

    let (echo_tx, mut echo_rx) = mpsc::unbounded_channel();
    let store = Arc::new(EchoStore {
        host: host.clone(),
        echo: echo_tx,
    });

    let printer = tokio::spawn(async move {
        while let Some(snapshot) = echo_rx.recv().await {
            if let Err(e) = print_json(&snapshot).await {
                warn!("Failed to write snapshot: {}", e);
            }
        }
    });

    let mut registry = CalibrationRegistry::new(host.clone(), store);
    for entry in &config.sensors {
        if let Err(e) = registry.setup_entry(entry.clone()).await {
            warn!("Skipping {}: {}", entry.source_entity, e);
        }
    }

    let mut session = Session {
        setup: SetupFlow::new(host.clone()),
        host,
        registry,
        config,
        config_path,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let result = match parse_command(&line) {
            Ok(command) => session.execute(command).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            eprintln!("error: {:#}", e);
        }
    }

    session.registry.shutdown().await;
    // Dropping the session drops the last echo sender
    drop(session);
    printer.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    let mut log_config = LogConfig::from(&config.logging);
    if cli.debug {
        log_config = log_config.with_debug();
    }
    init_logging(log_config)?;

    match cli.command {
        Command::Run => {
            info!("Starting auto-calibrate v{}", env!("CARGO_PKG_VERSION"));
            run(config, cli.config).await
        }
        Command::CheckConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
