//! Command-line interface for taskchain.
//!
//! Provides commands for running the task chain, running a single
//! countdown notifier, validating pipeline files and showing the resolved
//! configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::adapters::{ConsoleDisplay, ConsoleNotifications};
use crate::config::{self, GateKind, ResolvedConfig};
use crate::core::{CountdownNotifier, Dispatcher, Mailbox, Orchestrator, Pipeline};
use crate::domain::Journal;

/// taskchain - Sequential task pipeline with countdown notifiers
#[derive(Parser, Debug)]
#[command(name = "taskchain")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the three-task chain and both notifiers
    Run {
        /// Pipeline file (uses the built-in three-task chain if not provided)
        #[arg(short, long)]
        pipeline: Option<PathBuf>,

        /// Countdown tick in milliseconds
        #[arg(long, env = "TASKCHAIN_TICK_MS")]
        tick_ms: Option<u64>,

        /// Simulated work per task in milliseconds
        #[arg(long, env = "TASKCHAIN_WORK_DELAY_MS")]
        work_delay_ms: Option<u64>,

        /// Print the event timeline as JSON when done
        #[arg(long)]
        json: bool,
    },

    /// Run a single countdown notifier
    Countdown {
        /// Which notifier profile to run
        #[arg(value_enum)]
        profile: ProfileChoice,

        /// Identifier to start with (omitting it is fatal for the notifier)
        #[arg(long)]
        id: Option<String>,

        /// Countdown tick in milliseconds
        #[arg(long, env = "TASKCHAIN_TICK_MS")]
        tick_ms: Option<u64>,
    },

    /// Validate a pipeline file
    Validate {
        /// Pipeline YAML file
        path: PathBuf,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Notifier profile for CLI
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProfileChoice {
    /// Ten-step notifier
    Primary,

    /// Five-step notifier
    Secondary,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                pipeline,
                tick_ms,
                work_delay_ms,
                json,
            } => run_chain(pipeline, tick_ms, work_delay_ms, json).await,
            Commands::Countdown { profile, id, tick_ms } => {
                run_countdown(profile, id, tick_ms).await
            }
            Commands::Validate { path } => validate(&path),
            Commands::Config => show_config(),
        }
    }
}

async fn run_chain(
    pipeline_path: Option<PathBuf>,
    tick_ms: Option<u64>,
    work_delay_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    let config = config::config()?;

    let work_delay = work_delay_ms
        .map(Duration::from_millis)
        .unwrap_or(config.work_delay);
    let pipeline = match pipeline_path {
        Some(path) => {
            let pipeline = Pipeline::from_file(&path)?;
            match work_delay_ms {
                Some(_) => pipeline.with_work_delay(work_delay),
                None => pipeline,
            }
        }
        None => Pipeline::demo(work_delay),
    };

    let mut settings = config.orchestrator_settings();
    if let Some(ms) = tick_ms {
        settings.tick_interval = Duration::from_millis(ms);
    }

    let orchestrator = Orchestrator::new(
        settings,
        config.build_gate(),
        Arc::new(ConsoleDisplay),
        Arc::new(ConsoleNotifications::default()),
    )?;

    println!(
        "Running '{}' ({} tasks, gate: {})",
        pipeline.name,
        pipeline.tasks.len(),
        match config.gate.kind {
            GateKind::Always => "always".to_string(),
            GateKind::Network => format!("network via {}", config.gate.probe),
        }
    );

    let result = orchestrator.run(&pipeline).await;
    orchestrator.shutdown();
    let signals = result?;

    println!();
    println!(
        "Notifier completions: {}",
        signals
            .iter()
            .map(|s| s.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    if json {
        print_timeline(orchestrator.journal())?;
    }

    Ok(())
}

async fn run_countdown(profile: ProfileChoice, id: Option<String>, tick_ms: Option<u64>) -> Result<()> {
    let config = config::config()?;
    let profile = match profile {
        ProfileChoice::Primary => config.primary.clone(),
        ProfileChoice::Secondary => config.secondary.clone(),
    };
    let tick = tick_ms
        .map(Duration::from_millis)
        .unwrap_or(config.tick_interval);

    let dispatcher = Dispatcher::spawn("taskchain-delivery")?;
    let notifier = CountdownNotifier::new(
        profile,
        tick,
        Arc::new(ConsoleNotifications { show_initial: true }),
        Mailbox::new(dispatcher.clone()),
        Journal::new(),
    );

    let signal = notifier
        .start(id)?
        .wait()
        .await
        .context("Countdown did not complete")?;
    dispatcher.shutdown();

    println!("{}", notifier.profile().completion_message(&signal));
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    let pipeline = Pipeline::from_file(path)?;
    pipeline
        .validate()
        .with_context(|| format!("Invalid pipeline: {}", path.display()))?;

    println!("✓ {} ({} tasks)", pipeline.name, pipeline.tasks.len());
    for (i, task) in pipeline.tasks.iter().enumerate() {
        println!(
            "  {}. {:<10} id={:<6} delay={}ms{}{}",
            i + 1,
            task.name,
            task.id,
            task.delay.as_millis(),
            if task.requires_network { "" } else { " (ungated)" },
            if task.fails { " (fails)" } else { "" }
        );
    }
    Ok(())
}

fn show_config() -> Result<()> {
    let config: &ResolvedConfig = config::config()?;

    println!("Configuration:");
    match config.config_file {
        Some(ref path) => println!("  Config file:   {}", path.display()),
        None => println!("  Config file:   (none, using defaults)"),
    }
    if let Some(ref version) = config.config_version {
        println!("  Version:       {}", version);
    }
    println!("  Tick:          {}ms", config.tick_interval.as_millis());
    println!("  Work delay:    {}ms", config.work_delay.as_millis());
    println!("  Gate poll:     {}ms", config.gate_poll_interval.as_millis());
    println!("  Gate:          {:?} ({})", config.gate.kind, config.gate.probe);
    for profile in [&config.primary, &config.secondary] {
        println!(
            "  Notifier {:<10} id={} start={} channel={}",
            profile.name, profile.session_id, profile.start_value, profile.channel.id
        );
    }
    Ok(())
}

fn print_timeline(journal: &Journal) -> Result<()> {
    let events = journal.events();
    let json = serde_json::to_string_pretty(&events).context("Failed to serialize timeline")?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from(["taskchain", "run", "--tick-ms", "10", "--json"]).unwrap();
        match cli.command {
            Commands::Run { tick_ms, json, pipeline, .. } => {
                assert_eq!(tick_ms, Some(10));
                assert!(json);
                assert!(pipeline.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_countdown_without_id() {
        let cli = Cli::try_parse_from(["taskchain", "countdown", "secondary"]).unwrap();
        match cli.command {
            Commands::Countdown { profile, id, .. } => {
                assert!(matches!(profile, ProfileChoice::Secondary));
                assert!(id.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
