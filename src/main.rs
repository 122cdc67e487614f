use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use exnus_miner::egress::load_egress_list;
use exnus_miner::identity::load_identities;
use exnus_miner::mining::config::DEFAULT_API_BASE_URL;
use exnus_miner::mining::config::DEFAULT_IP_LOOKUP_URL;
use exnus_miner::progress::{self, ProgressDisplay};
use exnus_miner::{ChannelSink, ErrorMatchSet, MinerConfig, MinerError, Scheduler};

/// Exnus Point session miner - keeps a mining window open for every account
#[derive(Parser, Debug)]
#[command(name = "exnus-miner")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File with one base58 private key per line
    #[arg(short, long, env = "EXNUS_KEYS_FILE", default_value = "pk.txt")]
    keys: PathBuf,

    /// File with one proxy URL per line (http, https or socks5)
    #[arg(short, long, env = "EXNUS_PROXY_FILE", default_value = "proxy.txt")]
    proxies: PathBuf,

    /// Ignore the proxy file and connect directly
    #[arg(long)]
    no_proxy: bool,

    /// Reward service base URL
    #[arg(long, env = "EXNUS_API_URL", default_value = DEFAULT_API_BASE_URL)]
    api_url: String,

    /// Public IP lookup endpoint
    #[arg(long, env = "EXNUS_IP_URL", default_value = DEFAULT_IP_LOOKUP_URL)]
    ip_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "EXNUS_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,

    /// Seconds between status refreshes
    #[arg(long, env = "EXNUS_REFRESH_SECS", default_value = "3600")]
    refresh_secs: u64,

    /// Extra server message meaning a session is already active
    #[arg(long = "already-active-error")]
    already_active_errors: Vec<String>,

    /// Extra server message meaning the signature was rejected
    #[arg(long = "signature-error")]
    signature_errors: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    println!("🚀 Exnus Point Miner");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let identities = load_identities(&args.keys)
        .with_context(|| format!("Failed to read keys file {}", args.keys.display()))?
        .into_iter()
        .filter_map(|record| match record {
            Ok(identity) => Some(identity),
            Err(e) => {
                println!("⚠️  Skipping key record: {}", e);
                None
            }
        })
        .collect::<Vec<_>>();
    println!("🔑 Accounts: {}", identities.len());

    let proxies = if args.no_proxy {
        Vec::new()
    } else {
        load_egress_list(&args.proxies)
            .with_context(|| format!("Failed to read proxy file {}", args.proxies.display()))?
            .into_iter()
            .filter_map(|line| match line {
                Ok(egress) => Some(egress),
                Err(e) => {
                    println!("⚠️  Skipping proxy: {}", e);
                    None
                }
            })
            .collect::<Vec<_>>()
    };
    if proxies.is_empty() {
        println!("⚠️  No valid proxies found. Running without proxy.");
    } else {
        println!("🌐 Proxies: {}", proxies.len());
    }

    let config = MinerConfig::new()
        .with_api_base_url(args.api_url)
        .with_ip_lookup_url(args.ip_url)
        .with_request_timeout(Duration::from_secs(args.timeout_secs.max(1)))
        .with_refresh_interval(Duration::from_secs(args.refresh_secs.max(1)))
        .with_error_matches(
            ErrorMatchSet::default()
                .with_already_active(args.already_active_errors)
                .with_signature_rejected(args.signature_errors),
        );

    let scheduler = match Scheduler::new(identities, &proxies, config) {
        Ok(scheduler) => scheduler,
        Err(MinerError::NothingToRun) => {
            anyhow::bail!("No valid private keys found in {}", args.keys.display())
        }
        Err(e) => return Err(e.into()),
    };
    for binding in scheduler.bindings() {
        let route = binding
            .egress
            .as_ref()
            .map(|e| e.redacted())
            .unwrap_or_else(|| "direct".to_string());
        println!("👤 Account {}: {} via {}", binding.id(), binding.address(), route);
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let accounts = scheduler.bindings().len();
    let (sink, events) = ChannelSink::new();
    let running = scheduler
        .start(Arc::new(sink))
        .context("Failed to start account sessions")?;
    let reporter = tokio::spawn(progress::report(events, ProgressDisplay::new(accounts)));

    // Setup Ctrl+C handler
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("Failed to install Ctrl+C handler")?;

    cancel.cancelled().await;
    running.stop().await;

    // The spinner owns the terminal until the reporter has drained
    match reporter.await {
        Ok(display) => display.finish_with_message("⛔ Cancelled by user"),
        Err(e) => tracing::error!("reporter task failed: {}", e),
    }
    println!("👋 All miners stopped");

    Ok(())
}
