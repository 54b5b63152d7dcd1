//! guardian CLI - local blocking proxy
//!
//! This is the CLI binary that wires the guardian classifier, the on-disk
//! blocklists and the guardian-proxy server together.

mod blocklist;
mod cli;
mod config;
mod stats;
mod watch;

use blocklist::Blocklists;
use clap::Parser;
use cli::{CheckArgs, Cli, Commands, EditArgs, RunArgs};
use config::GuardianConfig;
use guardian::{Category, Classifier, GuardianError, Result};
use guardian_proxy::{ChannelSink, NoopSystemProxy, Protection, ProxyFilter};
use stats::DecisionStats;
use watch::UserListWatcher;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Capacity of the decision channel feeding the statistics task.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        error!("{}", e);
        eprintln!("guardian: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => run_proxy(args),
        Commands::Check(args) => run_check(args),
        Commands::Edit(args) => run_edit(args),
    }
}

/// Build a classifier from the lists under `lists`.
fn load_classifier(config: &GuardianConfig, lists: &Blocklists) -> Result<Arc<Classifier>> {
    let classifier = Arc::new(Classifier::new(&config.filters));
    let report = lists.load_into(&classifier, &config.categories)?;
    if report.saturated > 0 {
        warn!(
            "{} entries could not be stored and will not be blocked",
            report.saturated
        );
    }
    info!(
        "Loaded {} rules from {} ({} skipped)",
        report.loaded,
        lists.root().display(),
        report.skipped
    );
    Ok(classifier)
}

/// Run the proxy until Ctrl-C. Edits to the user lists are picked up
/// while it runs.
fn run_proxy(args: RunArgs) -> Result<()> {
    let config = GuardianConfig::from_run_args(&args)?;
    let lists = Blocklists::new(config.lists_dir());
    for list in [Category::Blacklist, Category::Whitelist] {
        lists.ensure_user_list(list)?;
    }
    let classifier = load_classifier(&config, &lists)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| GuardianError::Proxy(format!("Failed to start proxy runtime: {}", e)))?;
    rt.block_on(serve(config, lists, classifier))
}

async fn serve(config: GuardianConfig, lists: Blocklists, classifier: Arc<Classifier>) -> Result<()> {
    let (sink, events) = ChannelSink::new(EVENT_CHANNEL_CAPACITY);
    let stats = Arc::new(DecisionStats::default());
    let stats_task = {
        let stats = Arc::clone(&stats);
        tokio::spawn(async move { stats.consume(events).await })
    };

    let filter = ProxyFilter::new(classifier.clone()).with_sink(Arc::new(sink));
    let mut protection = Protection::new(config.proxy.clone(), filter, Arc::new(NoopSystemProxy));
    let addr = protection
        .enable()
        .await
        .map_err(|e| GuardianError::Proxy(format!("Failed to start proxy: {}", e)))?;
    eprintln!("guardian: protecting via proxy at {}", addr);

    let reload = || match lists.load_into(&classifier, &config.categories) {
        Ok(report) => info!("Reloaded {} rules", report.loaded),
        Err(e) => warn!("Reload failed: {}", e),
    };
    let watcher = UserListWatcher::new(&lists);
    let waited = tokio::select! {
        result = wait_for_shutdown(&reload) => result,
        () = watch::reload_on_change(watcher, watch::POLL_INTERVAL, &reload) => Ok(()),
    };

    protection.disable().await;
    stats_task.abort();
    info!(
        "Session summary: {} requests, {} blocked",
        stats.total(),
        stats.blocked()
    );
    eprintln!(
        "guardian: {} requests, {} blocked",
        stats.total(),
        stats.blocked()
    );
    waited
}

/// Wait for Ctrl-C, reloading the lists on every SIGHUP.
#[cfg(unix)]
async fn wait_for_shutdown(reload: impl Fn()) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Interrupted, shutting down");
                return Ok(());
            }
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading lists");
                reload();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_reload: impl Fn()) -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Interrupted, shutting down");
    Ok(())
}

/// Classify each URL and print the verdict
fn run_check(args: CheckArgs) -> Result<()> {
    let config = GuardianConfig::from_filter_args(&args.filter)?;
    let lists = Blocklists::new(config.lists_dir());
    let classifier = load_classifier(&config, &lists)?;
    for url in &args.urls {
        let verdict = if classifier.is_allowed(url) {
            "allow"
        } else {
            "deny"
        };
        println!("{}\t{}", verdict, url);
    }
    Ok(())
}

/// Edit a user list in an external editor
fn run_edit(args: EditArgs) -> Result<()> {
    let config = GuardianConfig::from_location(&args.location)?;
    let lists = Blocklists::new(config.lists_dir());
    let category = Category::from(args.list);
    let path = lists.ensure_user_list(category)?;

    blocklist::open_in_editor(&path)?;

    let entries = lists.read(category)?;
    println!("{}: {} entries in {}", category, entries.len(), path.display());
    println!("A running `guardian run` reloads the list within {:?}.", watch::POLL_INTERVAL);
    Ok(())
}
