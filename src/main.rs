// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Watchtower command line: config checks, trace headers and event replay.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::Level;

use watchtower::config::{self, AgentConfig, EnvOverrides};
use watchtower::diagnostics::{init_logging, LogConfig, LogFormat};
use watchtower::{Agent, CorrelationContext, Occurrence, SubmitOutcome, VERSION};

/// Watchtower - in-process observability agent.
#[derive(Parser)]
#[command(name = "watchtower")]
#[command(author, version, about = "In-process observability agent", long_about = None)]
struct Cli {
    /// Directory to load configuration from
    #[arg(short = 'C', long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Show trace output
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and print the resolved configuration
    Check,
    /// Write an example configuration file
    Init,
    /// Mint a traceparent header, or continue an inbound one
    Traceparent {
        /// Inbound traceparent header to continue
        #[arg(long)]
        parent: Option<String>,

        /// Inbound tracestate header
        #[arg(long)]
        state: Option<String>,
    },
    /// Submit newline-delimited JSON occurrences and flush them
    Replay {
        /// File with one occurrence per line
        file: PathBuf,

        /// Correlate every line under one trace
        #[arg(long)]
        single_trace: bool,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that run with a config log the way an agent with that
    // config would; the flags override.
    let agent_config = match cli.command {
        Commands::Check | Commands::Replay { .. } => Some(load(&cli.dir)?),
        _ => None,
    };
    let log_config = agent_config
        .as_ref()
        .map(LogConfig::for_agent)
        .unwrap_or_default();
    let log_config = if cli.trace {
        log_config.with_level(Level::TRACE).with_format(LogFormat::Verbose)
    } else if cli.verbose {
        log_config.with_level(Level::DEBUG)
    } else {
        log_config
    };
    let _log_guard = init_logging(&log_config)?;

    match cli.command {
        Commands::Check => {
            if let Some(config) = &agent_config {
                print_config(config);
            }
        }
        Commands::Init => {
            let path = config::init_config(&cli.dir, None)?;
            println!("Created config file: {}", path.display());
        }
        Commands::Traceparent { parent, state } => {
            let inbound = CorrelationContext::from_headers(parent.as_deref(), state.as_deref());
            let (_, headers) = inbound.outgoing();
            for (name, value) in headers.iter() {
                println!("{}: {}", name, value);
            }
        }
        Commands::Replay { file, single_trace } => {
            if let Some(config) = agent_config {
                replay(config, &file, single_trace).await?;
            }
        }
        Commands::Version => {
            println!("watchtower {}", VERSION);
        }
    }

    Ok(())
}

fn load(dir: &Path) -> anyhow::Result<AgentConfig> {
    let env = EnvOverrides::from_env()?;
    config::load_config(dir, env)
        .with_context(|| format!("Failed to load configuration from {}", dir.display()))
}

fn print_config(config: &AgentConfig) {
    println!("enabled:      {}", config.enabled);
    println!("endpoint:     {}", config.endpoint);
    println!(
        "token:        {}",
        config.masked_token().unwrap_or_else(|| "(none)".to_string())
    );
    println!("environment:  {}", config.environment.as_deref().unwrap_or("-"));
    println!("release:      {}", config.release.as_deref().unwrap_or("-"));
    println!("server:       {}", config.server.as_deref().unwrap_or("-"));

    let mut disabled: Vec<&str> = config.disabled_kinds.iter().map(|k| k.as_str()).collect();
    disabled.sort_unstable();
    println!(
        "disabled:     {}",
        if disabled.is_empty() { "-".to_string() } else { disabled.join(", ") }
    );

    println!("sampling:     default {}", config.sampling.default_rate);
    let rates: BTreeMap<&str, f64> = config
        .sampling
        .rates
        .iter()
        .map(|(kind, rate)| (kind.as_str(), *rate))
        .collect();
    for (kind, rate) in rates {
        println!("              {} {}", kind, rate);
    }
    println!("consistency:  {:?}", config.sampling.trace_consistency);

    let transport = &config.transport;
    println!(
        "transport:    queue {}, batch {} / {:?}, timeout {:?}",
        transport.queue_capacity,
        transport.max_batch_size,
        transport.max_batch_age,
        transport.request_timeout
    );
    println!(
        "retry:        {} retries, backoff {:?}..{:?}, breaker {} / {:?}",
        transport.backoff.max_retries,
        transport.backoff.base,
        transport.backoff.cap,
        transport.breaker_threshold,
        transport.breaker_cooldown
    );
}

async fn replay(config: AgentConfig, file: &Path, single_trace: bool) -> anyhow::Result<()> {
    let reader = BufReader::new(
        std::fs::File::open(file).with_context(|| format!("Cannot open {}", file.display()))?,
    );

    let agent = Agent::start(config)?;
    let pipeline = agent.pipeline();
    let shared = CorrelationContext::new();

    let mut outcomes: BTreeMap<&'static str, u64> = BTreeMap::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let occurrence: Occurrence = match serde_json::from_str(&line) {
            Ok(occurrence) => occurrence,
            Err(err) => {
                eprintln!("line {}: skipped ({})", index + 1, err);
                *outcomes.entry("unparseable").or_default() += 1;
                continue;
            }
        };

        let outcome = if single_trace {
            pipeline.submit(occurrence, &shared)
        } else {
            pipeline.submit(occurrence, &CorrelationContext::new())
        };
        *outcomes.entry(outcome_label(&outcome)).or_default() += 1;
    }

    let clean = agent.shutdown().await;

    for (label, count) in &outcomes {
        println!("{:<12} {}", label, count);
    }
    println!();
    print!("{}", pipeline.diagnostics().format_report());
    if !clean {
        eprintln!("Shutdown budget exhausted; some events were not delivered");
    }
    Ok(())
}

fn outcome_label(outcome: &SubmitOutcome) -> &'static str {
    match outcome {
        SubmitOutcome::Enqueued { .. } => "enqueued",
        SubmitOutcome::Disabled => "disabled",
        SubmitOutcome::Invalid(_) => "invalid",
        SubmitOutcome::Filtered => "filtered",
        SubmitOutcome::SampledOut => "sampled_out",
        SubmitOutcome::Dropped(_) => "dropped",
        SubmitOutcome::Failed(_) => "failed",
    }
}
