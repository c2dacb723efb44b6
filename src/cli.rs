use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tabled::{Table, Tabled};

use crmonban_ingest::config::Config;
use crmonban_ingest::engine::{EngineStats, PcapCapture, PipelineBuilder};
use crmonban_ingest::error::StartupError;

#[derive(Parser)]
#[command(name = "crmonban-ingest")]
#[command(author, version, about = "Packet ingestion pipeline for crmonban")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the configured pipeline and validate its queue topology
    Check,

    /// Show the queue table of the configured pipeline
    Queues,

    /// Run the pipeline over a pcap file
    Replay {
        /// PCAP file to replay
        pcap: PathBuf,
    },

    /// Generate default configuration file
    GenConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Table row for counters
#[derive(Tabled)]
struct CounterRow {
    #[tabled(rename = "Counter")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: u64,
}

pub fn run_command(cli: Cli) -> Result<()> {
    if let Commands::GenConfig { output } = &cli.command {
        return cmd_gen_config(output.as_ref());
    }

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    match cli.command {
        Commands::Check => cmd_check(&config),
        Commands::Queues => cmd_queues(&config),
        Commands::Replay { pcap } => cmd_replay(&config, pcap),
        Commands::GenConfig { .. } => Ok(()),
    }
}

fn cmd_check(config: &Config) -> Result<()> {
    let pipeline = PipelineBuilder::from_config(config).build()?;

    println!("{}", Table::new(pipeline.registry().snapshot()));

    match pipeline.validate() {
        Ok(()) => {
            println!(
                "{} {} stages, {} queues",
                "Topology OK:".green().bold(),
                pipeline.bindings().len(),
                pipeline.registry().len()
            );
            Ok(())
        }
        Err(err) => {
            for fault in err.faults() {
                println!("{} {}", "FAULT".red().bold(), fault);
            }
            Err(StartupError::from(err).into())
        }
    }
}

fn cmd_queues(config: &Config) -> Result<()> {
    let pipeline = PipelineBuilder::from_config(config).build()?;
    let queues = pipeline.registry().snapshot();

    if queues.is_empty() {
        println!("No queues configured");
    } else {
        println!("{}", Table::new(queues));
    }

    Ok(())
}

fn cmd_replay(config: &Config, pcap: PathBuf) -> Result<()> {
    let source = PcapCapture::open(&pcap)?;
    let pipeline = PipelineBuilder::from_config(config).build()?;

    println!("Replaying {}...", pcap.display());
    let mut running = pipeline.start(Box::new(source))?;
    running.wait_capture();
    let stats = running.shutdown();

    print_stats(&stats);

    if stats.roots_released != stats.packets_captured {
        println!(
            "{} {} of {} root packets were not released",
            "WARNING:".yellow().bold(),
            stats.packets_captured.saturating_sub(stats.roots_released),
            stats.packets_captured
        );
    }

    Ok(())
}

fn print_stats(stats: &EngineStats) {
    let rows = vec![
        CounterRow { name: "frames read", value: stats.capture.received },
        CounterRow { name: "frames skipped", value: stats.capture.skipped },
        CounterRow { name: "packets captured", value: stats.packets_captured },
        CounterRow { name: "capture errors", value: stats.capture_errors },
        CounterRow { name: "decoded", value: stats.decode.packets },
        CounterRow { name: "bytes", value: stats.decode.bytes },
        CounterRow { name: "ipv4", value: stats.decode.ipv4 },
        CounterRow { name: "ipv6", value: stats.decode.ipv6 },
        CounterRow { name: "udp", value: stats.decode.udp },
        CounterRow { name: "teredo", value: stats.decode.teredo },
        CounterRow { name: "tunnel depth exceeded", value: stats.decode.tunnel_depth_exceeded },
        CounterRow { name: "tunnel alloc failed", value: stats.decode.tunnel_alloc_failed },
        CounterRow { name: "invalid", value: stats.decode.invalid },
        CounterRow { name: "forwarded", value: stats.packets_forwarded },
        CounterRow { name: "dropped", value: stats.packets_dropped },
        CounterRow { name: "roots finished", value: stats.roots_finished },
        CounterRow { name: "derived finished", value: stats.derived_finished },
        CounterRow { name: "roots released", value: stats.roots_released },
    ];

    println!("{}", Table::new(rows));
}

fn cmd_gen_config(output: Option<&PathBuf>) -> Result<()> {
    let config = Config::default();

    match output {
        Some(path) => {
            config
                .save(path)
                .with_context(|| format!("Failed to write config file: {}", path.display()))?;
            println!("{} {}", "Configuration written to".green().bold(), path.display());
        }
        None => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
