//! Study-Crawl main entry point
//!
//! This is the command-line interface for the rendered study crawler.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use study_crawl::bridge::{detect_agent_id, BridgeClient, BridgeTabAllocator};
use study_crawl::config::{
    load_settings_with_hash, load_study_config, parse_root_domain, validate, LedgerBackend,
    Settings,
};
use study_crawl::crawler::{run_crawl, CrawlPlan};
use study_crawl::output::{load_study_statistics, print_report, print_statistics};
use tracing_subscriber::EnvFilter;

/// Study-Crawl: a rendered, resumable multi-domain crawler
///
/// Each domain is crawled through a browser tab obtained from the bridge, and
/// every page is stored under `studies/<domain>/<worker>/`. Interrupted runs
/// resume from the ledger on the next invocation.
#[derive(Parser, Debug)]
#[command(name = "crawl")]
#[command(version = "1.0.0")]
#[command(about = "A rendered, resumable multi-domain crawler", long_about = None)]
struct Cli {
    /// Root domains to crawl (e.g. example.com)
    #[arg(value_name = "DOMAIN", required = true, num_args = 1..)]
    domains: Vec<String>,

    /// Follow links to subdomains of each root domain
    #[arg(long)]
    subdomains: bool,

    /// Agent identity used to label browser tabs
    #[arg(long, value_name = "ID")]
    agent_id: Option<String>,

    /// Path to TOML settings file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding `studies/` and `removed/` (overrides settings)
    #[arg(long, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Worker directory name under each study (overrides settings)
    #[arg(long, value_name = "NAME")]
    worker: Option<String>,

    /// Ledger backend (overrides settings)
    #[arg(long, value_enum)]
    ledger: Option<LedgerArg>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show settings, batches and filters without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show ledger statistics for each domain and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LedgerArg {
    Fs,
    Sqlite,
}

impl From<LedgerArg> for LedgerBackend {
    fn from(arg: LedgerArg) -> Self {
        match arg {
            LedgerArg::Fs => LedgerBackend::Fs,
            LedgerArg::Sqlite => LedgerBackend::Sqlite,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let settings = load_effective_settings(&cli)?;

    let mut domains = Vec::with_capacity(cli.domains.len());
    for arg in &cli.domains {
        let domain = parse_root_domain(arg).with_context(|| format!("Invalid domain '{}'", arg))?;
        if !domains.contains(&domain) {
            domains.push(domain);
        }
    }

    let plan = CrawlPlan::new(domains, cli.subdomains, settings);

    if cli.dry_run {
        handle_dry_run(&plan)
    } else if cli.stats {
        handle_stats(&plan)
    } else {
        handle_crawl(plan, cli.agent_id.as_deref()).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("study_crawl=info,warn"),
            1 => EnvFilter::new("study_crawl=debug,info"),
            2 => EnvFilter::new("study_crawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the settings file, if any, and applies command-line overrides
fn load_effective_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => {
            tracing::info!("Loading settings from: {}", path.display());
            let (settings, hash) = load_settings_with_hash(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?;
            tracing::info!("Settings loaded (hash: {})", hash);
            settings
        }
        None => Settings::default(),
    };

    if let Some(base_dir) = &cli.base_dir {
        settings.output.base_dir = base_dir.clone();
    }
    if let Some(worker) = &cli.worker {
        settings.crawler.worker = worker.clone();
    }
    if let Some(ledger) = cli.ledger {
        settings.crawler.ledger = ledger.into();
    }

    validate(&settings).context("Invalid settings")?;
    Ok(settings)
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(plan: &CrawlPlan) -> Result<()> {
    let settings = &plan.settings;
    println!("=== Study-Crawl Dry Run ===\n");

    println!("Crawler:");
    println!("  Max domains per batch: {}", settings.crawler.max_per_batch);
    println!("  Worker: {}", settings.crawler.worker);
    println!("  Ledger: {}", settings.crawler.ledger.as_str());
    if plan.domains.len() == 1 {
        println!("  Page delay: {}ms", settings.crawler.page_delay_ms);
    } else {
        println!("  Page delay: round-robin");
    }
    println!(
        "  Ready timeout: {}ms (poll every {}ms), settle {}ms",
        settings.crawler.ready_timeout_ms,
        settings.crawler.ready_poll_interval_ms,
        settings.crawler.settle_delay_ms
    );
    println!("  Subdomains: {}", if plan.allow_subdomains { "yes" } else { "no" });

    println!("\nBridge:");
    println!("  URL: {}", settings.bridge.url);
    println!("  Attempts per request: {}", settings.bridge.retries);

    println!("\nBatches ({}):", plan.batches().len());
    for (id, batch) in plan.batches().iter().enumerate() {
        println!("  {}: {}", id, batch.join(", "));
    }

    println!("\nStudies:");
    for domain in &plan.domains {
        let layout = plan.layout(domain);
        let study = load_study_config(&layout.config_path())
            .with_context(|| format!("Invalid study config for {}", domain))?;
        let filter = study
            .filter()
            .with_context(|| format!("Invalid URL pattern for {}", domain))?;

        println!("  - {}", domain);
        println!("    Directory: {}", layout.worker_dir().display());
        println!(
            "    Filters: {} include, {} exclude{}",
            filter.include_count(),
            filter.exclude_count(),
            if layout.config_path().exists() { "" } else { " (defaults)" }
        );
    }

    println!("\n✓ Settings are valid");
    Ok(())
}

/// Handles the --stats mode: shows ledger statistics without a renderer
fn handle_stats(plan: &CrawlPlan) -> Result<()> {
    for domain in &plan.domains {
        let layout = plan.layout(domain);
        let stats = load_study_statistics(plan.settings.crawler.ledger, &layout)
            .with_context(|| format!("Failed to read ledger for {}", domain))?;
        print_statistics(&stats);
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(plan: CrawlPlan, agent_flag: Option<&str>) -> Result<()> {
    let agent_id = detect_agent_id(agent_flag);
    match &agent_id {
        Some(id) => tracing::info!("Agent: {}", id),
        None => tracing::info!("No agent identity; tabs are unlabeled"),
    }

    let client = BridgeClient::new(&plan.settings.bridge)?;
    if let Err(e) = client.health().await {
        tracing::warn!("Bridge health check failed: {}", e);
    }

    let bridge_url = client.base_url().to_string();
    let allocator = Arc::new(BridgeTabAllocator::new(client, agent_id));

    tracing::info!(
        "Crawling {} domain(s): {}",
        plan.domains.len(),
        plan.domains.join(", ")
    );

    let report = run_crawl(plan, allocator).await?;
    print_report(&report);

    if report.renderer_degraded() {
        eprintln!();
        eprintln!("Renderer unavailable: no domain could use a browser tab.");
        eprintln!("  Check that the bridge is running: curl {}/health", bridge_url);
        eprintln!("  Pending pages are kept and will be retried on the next run.");
    }

    Ok(())
}
