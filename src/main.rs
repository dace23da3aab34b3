use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use marker_reconciler::app::{ReconcileOptions, ReconcileUseCase};
use marker_reconciler::config::Config;
use marker_reconciler::infra::{FileOutputAdapter, JsonlFeedAdapter, LiftOverAdapter};
use marker_reconciler::observability::{init_logging, metrics};

#[derive(Parser)]
#[command(name = "marker_reconciler")]
#[command(about = "Reconcile yearly marker archives into one coordinate-complete dataset")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "reconcile.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full reconciliation over the extract feed
    Run {
        /// Directory holding one `<version>.jsonl` file per archive version
        #[arg(long)]
        feed_dir: Option<PathBuf>,
        /// Canonical dataset destination
        #[arg(long)]
        output: Option<PathBuf>,
        /// Coverage report destination
        #[arg(long)]
        report: Option<PathBuf>,
        /// Directory holding UCSC chain files
        #[arg(long)]
        chain_dir: Option<PathBuf>,
        /// Maximum concurrent transform jobs per hop level
        #[arg(long)]
        max_concurrent_jobs: Option<usize>,
    },
    /// Report which direct build pairs have a chain file and whether liftOver is present
    CheckChains {
        #[arg(long)]
        chain_dir: Option<PathBuf>,
    },
}

fn liftover_adapter(config: &Config) -> LiftOverAdapter {
    LiftOverAdapter::new(
        config.liftover.binary.clone(),
        config.liftover.chain_dir.clone(),
        config.liftover.chromosome.clone(),
    )
}

async fn run(config: Config) -> anyhow::Result<()> {
    let feed = Arc::new(JsonlFeedAdapter::new(
        config.feed.dir.clone(),
        config.feed.versions.clone(),
    ));
    let transform = Arc::new(liftover_adapter(&config));
    let output = Arc::new(FileOutputAdapter::new(
        config.output.path.clone(),
        config.output.format,
    ));
    let options = ReconcileOptions {
        harmonizer: config.harmonizer_settings(),
        project_extract_positions: config.harmonize.project_extract_positions,
    };

    let outcome = ReconcileUseCase::new(feed, transform, output, options)
        .run()
        .await?;

    outcome
        .report
        .write_json(&config.output.report_path)
        .await
        .with_context(|| format!("Failed to write report {}", config.output.report_path.display()))?;
    info!("Coverage report written to {}", config.output.report_path.display());

    if let Some(metrics_path) = &config.output.metrics_path {
        match metrics::render() {
            Some(snapshot) => tokio::fs::write(metrics_path, snapshot)
                .await
                .with_context(|| format!("Failed to write metrics {}", metrics_path.display()))?,
            None => warn!("Metrics recorder not installed; skipping {}", metrics_path.display()),
        }
    }

    println!("\n📊 {}", outcome.report.console_summary());
    if !outcome.report.signals.is_empty() {
        println!("⚠️  {} data-quality signals recorded in the report", outcome.report.signals.len());
    }
    println!("✅ Reconciliation completed: {}", outcome.output.path.display());
    Ok(())
}

async fn check_chains(config: Config) -> anyhow::Result<()> {
    let adapter = liftover_adapter(&config);

    let binary_ok = adapter.binary_available().await;
    println!(
        "{} liftOver binary: {}",
        if binary_ok { "✅" } else { "❌" },
        config.liftover.binary.display()
    );

    let mut missing = 0;
    for status in adapter.chain_statuses() {
        if !status.present {
            missing += 1;
        }
        println!(
            "{} {}->{}: {}",
            if status.present { "✅" } else { "❌" },
            status.source,
            status.target,
            status.path.display()
        );
    }

    if missing > 0 || !binary_ok {
        warn!("{} chain files missing; affected hops will leave positions unmapped", missing);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    init_logging(&config.logging.dir)?;
    if let Err(e) = metrics::init() {
        warn!("Metrics disabled: {}", e);
    }

    let result = match cli.command {
        Commands::Run {
            feed_dir,
            output,
            report,
            chain_dir,
            max_concurrent_jobs,
        } => {
            if let Some(dir) = feed_dir {
                config.feed.dir = dir;
            }
            if let Some(path) = output {
                config.output.path = path;
            }
            if let Some(path) = report {
                config.output.report_path = path;
            }
            if let Some(dir) = chain_dir {
                config.liftover.chain_dir = dir;
            }
            if let Some(jobs) = max_concurrent_jobs {
                config.harmonize.max_concurrent_jobs = jobs;
            }
            config.validate()?;
            println!("🚀 Running reconciliation...");
            run(config).await
        }
        Commands::CheckChains { chain_dir } => {
            if let Some(dir) = chain_dir {
                config.liftover.chain_dir = dir;
            }
            check_chains(config).await
        }
    };

    if let Err(e) = &result {
        error!("Run failed: {:#}", e);
        println!("❌ Run failed: {:#}", e);
    }
    result
}
