//! `hostscope` entry point
//!
//! Runs the selected probes against one target and prints the JSON report.
//! stdout carries only the report; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use hostscope_probes::{ProbeConfig, ProbeKind, ProbeScheduler};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hostscope")]
#[command(about = "Run timed network probes against one host and print a JSON report")]
#[command(version)]
struct Args {
    /// Hostname, IP address or URL to probe
    target: String,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Probe to run, repeatable (ports, dns, blocklist, whois, tls, mail-config,
    /// txt-records, dns-server, ip). Runs every probe when omitted.
    #[arg(short, long = "probe", value_name = "KIND", value_parser = str::parse::<ProbeKind>)]
    probes: Vec<ProbeKind>,
}

impl Args {
    fn kinds(&self) -> Vec<ProbeKind> {
        if self.probes.is_empty() {
            ProbeKind::ALL.to_vec()
        } else {
            self.probes.clone()
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config =
        ProbeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let scheduler = ProbeScheduler::new(config);

    let report = scheduler
        .run(&args.target, &args.kinds())
        .await
        .with_context(|| format!("Cannot probe {}", args.target))?;

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing to stderr (stdout is reserved for the report)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_ansi(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version land here too
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    tracing::info!("Probing {} ({} probe kind(s))", args.target, args.kinds().len());
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
