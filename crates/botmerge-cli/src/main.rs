//! botmerge - merge trusted bot pull requests across git hosting providers.

mod factory;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use botmerge_core::config::Config;
use botmerge_engine::{MergeOptions, Merger, ProcessOptions, Processor};
use botmerge_storage::KeychainStore;

#[derive(Parser)]
#[command(name = "botmerge")]
#[command(author, version, about = "Merge trusted bot pull requests across providers", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover pull requests and evaluate their readiness
    Process {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Merge the pull requests that are ready
    Merge {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Report what would be merged without merging
        #[arg(long)]
        dry_run: bool,

        /// Merge PRs even when skipped or not ready
        #[arg(long)]
        force: bool,

        /// Delete head branches after merging
        #[arg(long)]
        delete_branches: bool,

        /// Override the generated commit title
        #[arg(long)]
        message: Option<String>,

        /// Enforce the configured minimum approvals
        #[arg(long)]
        require_approval: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Args)]
struct ScopeArgs {
    /// Restrict the run to these providers (repeatable)
    #[arg(long = "provider")]
    providers: Vec<String>,

    /// Restrict the run to repositories whose name contains this string
    #[arg(long)]
    repo: Option<String>,

    /// Ignore PRs older than this many days
    #[arg(long)]
    max_age_days: Option<u64>,

    /// Require checks to pass regardless of repository policy
    #[arg(long)]
    require_checks: bool,

    /// Additional skip labels for this run (repeatable)
    #[arg(long = "skip-label")]
    skip_labels: Vec<String>,

    /// Include closed PRs in discovery
    #[arg(long)]
    include_closed: bool,
}

impl ScopeArgs {
    fn to_process_options(&self) -> ProcessOptions {
        ProcessOptions {
            providers: self.providers.clone(),
            repo_filter: self.repo.clone(),
            max_age: self.max_age_days.map(|d| chrono::Duration::days(d as i64)),
            require_checks: self.require_checks.then_some(true),
            skip_labels: self.skip_labels.clone(),
            include_closed: self.include_closed,
        }
    }
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the loaded configuration
    Show,
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // A single token flows from here through every pipeline, provider call,
    // and backoff sleep.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling in-flight work");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Process { scope, json } => {
            let (processor, _) = build_engine(&config);
            let results = processor
                .process_all(&cancel, &scope.to_process_options())
                .await?;
            output::render_process(&results, json)?;
        }
        Commands::Merge {
            scope,
            dry_run,
            force,
            delete_branches,
            message,
            require_approval,
            json,
        } => {
            let (processor, merger) = build_engine(&config);
            let results = processor
                .process_all(&cancel, &scope.to_process_options())
                .await?;
            let options = MergeOptions {
                dry_run,
                force,
                delete_branches,
                custom_message: message,
                require_approval,
            };
            let outcomes = merger.merge_all(&cancel, &results, &options).await?;
            output::render_merge(&outcomes, json)?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                println!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigCommands::Path => {
                println!("{}", Config::config_path()?.display());
            }
        },
    }

    Ok(())
}

fn build_engine(config: &Config) -> (Processor, Merger) {
    let store = KeychainStore::new();
    let providers = factory::build_providers(config, &store);
    let config = Arc::new(config.clone());
    (
        Processor::new(config.clone(), providers.clone()),
        Merger::new(config, providers),
    )
}
