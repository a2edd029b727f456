use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use assay::analysis::{FileFindings, IssueCollector, RunCoordinator, RunReport, RunState};
use assay::cache::{format_marker, AnalysisCache, FsCacheStore};
use assay::config::GlobalConfig;
use assay::engine::{AnalysisEngine, BridgeProcess};
use assay::progress::{BarSink, LogSink, ProgressSink};
use assay::project::discovery::Discovery;
use assay::util::cancel::CancellationToken;

#[derive(Parser)]
#[command(name = "assay", about = "incremental source analysis through a lint engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Reduce log output (show warnings/errors only)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the sources under a directory
    Analyze {
        /// Project base directory
        #[arg(default_value = ".")]
        base_dir: PathBuf,

        /// Engine executable, overriding [engine].command
        #[arg(long)]
        engine: Option<String>,

        /// Do not read or write the analysis cache
        #[arg(long)]
        no_cache: bool,

        /// Analyze every file even when a cached result is still valid
        #[arg(long)]
        full: bool,

        /// Write a JSON report of the run(s) and findings
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config,
    /// Manage the analysis cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove every cached analysis
    Clear,
}

#[derive(Serialize)]
struct AnalyzeReport {
    runs: Vec<RunReport>,
    findings: Vec<FileFindings>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose > 1 {
        EnvFilter::new("trace")
    } else if cli.verbose > 0 {
        EnvFilter::new("debug")
    } else if cli.quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::new("info")
    };

    if cli.verbose > 0 {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .without_time()
            .with_target(false)
            .with_level(true)
            .with_env_filter(filter)
            .init();
    }

    let mut config = GlobalConfig::load(cli.config.as_deref())
        .context("failed to load config")?;

    match cli.command {
        Commands::Analyze {
            base_dir,
            engine,
            no_cache,
            full,
            report,
        } => {
            if let Some(command) = engine {
                config.engine.command = command;
            }
            if no_cache {
                config.cache.enabled = false;
            }
            if full {
                config.cache.skip_unchanged = false;
            }

            let outcome = analyze(&config, &base_dir, cli.quiet)?;
            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&outcome)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("failed to write report {}", path.display()))?;
                info!("Report written to {}", path.display());
            }

            let analysed: usize = outcome.runs.iter().map(|r| r.analysed).sum();
            let reused: usize = outcome.runs.iter().map(|r| r.reused).sum();
            let issues: usize = outcome.findings.iter().map(|f| f.issues.len()).sum();
            println!(
                "{} file(s) analyzed, {} reused from cache, {} issue(s)",
                analysed, reused, issues
            );

            if let Some(run) = outcome.runs.iter().find(|r| !r.is_success()) {
                eprintln!(
                    "error: analysis {}: {}",
                    run.state,
                    run.error.as_deref().unwrap_or("unknown error")
                );
                std::process::exit(1);
            }
        }
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config)
                .context("failed to render configuration")?;
            print!("{}", rendered);
        }
        Commands::Cache {
            action: CacheAction::Clear,
        } => {
            let store = FsCacheStore::new(config.analysis_cache_dir(), &config.general.work_dir);
            store.clear().context("failed to clear cache")?;
            println!("cleared {}", store.root().display());
        }
    }

    Ok(())
}

fn analyze(config: &GlobalConfig, base_dir: &Path, quiet: bool) -> Result<AnalyzeReport> {
    let base = base_dir
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", base_dir.display()))?;

    let discovery = Discovery::new(&config.analysis)?;
    let files = discovery.input_files(&base)?;
    let (configured, standalone): (Vec<_>, Vec<_>) = files
        .into_iter()
        .partition(|f| f.language().uses_project_config());

    let roots = if config.analysis.config_roots.is_empty() {
        discovery.config_roots(&base)?
    } else {
        config
            .analysis
            .config_roots
            .iter()
            .map(|p| base.join(p))
            .collect()
    };
    info!(
        "Found {} file(s) and {} root configuration(s) under {}",
        configured.len() + standalone.len(),
        roots.len(),
        base.display()
    );

    let cancel = CancellationToken::new();
    if let Err(e) = cancel.cancel_on_interrupt() {
        warn!("Interrupts will not cancel the run: {}", e);
    }

    let mut engine = BridgeProcess::start(&config.engine)
        .context("failed to start analysis engine")?;

    let work_dir = base.join(&config.general.work_dir);
    let store = FsCacheStore::new(config.analysis_cache_dir(), work_dir);
    let cache = AnalysisCache::new(&store, &config.cache, format_marker(engine.version()));

    let sink: Arc<dyn ProgressSink> = if !quiet && std::io::stderr().is_terminal() {
        Arc::new(BarSink::new())
    } else {
        Arc::new(LogSink)
    };

    let mut collector = IssueCollector::new();
    let mut runs = Vec::new();
    {
        let mut coordinator = RunCoordinator::new(
            &config.analysis,
            &mut engine,
            &cache,
            cancel.clone(),
            sink,
        );
        let report = coordinator.analyze_files(&roots, configured, &mut collector);
        let proceed = !matches!(report.state, RunState::Cancelled | RunState::Failed);
        runs.push(report);
        if proceed {
            runs.push(coordinator.analyze_standalone(standalone, &mut collector));
        }
    }
    engine.close();

    Ok(AnalyzeReport {
        runs,
        findings: collector.into_findings(),
    })
}
