//! splitsync - cross-repository pull request synchronization
//!
//! ## Commands
//!
//! - `sync`: sync one pull request with its partner
//! - `sync-branch`: sync the open pull request of a branch
//! - `deliveries`: replay recorded webhook deliveries (JSONL)
//! - `branch-name`: encode or decode secondary branch names
//! - `meta`: print the metadata block of a pull request body
//! - `relationships`: print the configured repository directory

mod queue;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use splitsync_core::{
    branch_name, parse_pr_body_meta, Delivery, EventRouter, PullRequestRef, Routing, SyncConfig,
    SyncOrchestrator, SyncReport, SyncTarget, METRICS,
};
use splitsync_github::{GitCommitCopier, GitHubClient, GitHubConfig};

use crate::queue::KeyedQueue;

#[derive(Parser)]
#[command(name = "splitsync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Keep pull requests in sync across split repositories", long_about = None)]
struct Cli {
    /// Path to the configuration file (default: $SPLITSYNC_CONFIG or ./splitsync.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync one pull request with its partner, creating the partner if needed
    Sync {
        /// Repository (owner/repo)
        #[arg(long)]
        repo: String,

        /// Pull request number
        #[arg(long)]
        pr: u64,
    },

    /// Sync the open pull request whose head is a branch
    SyncBranch {
        /// Repository (owner/repo)
        #[arg(long)]
        repo: String,

        /// Head branch name
        #[arg(long)]
        branch: String,
    },

    /// Process recorded webhook deliveries, one JSON object per line
    Deliveries {
        /// JSONL file with `{"event": ..., "payload": ...}` lines
        file: PathBuf,

        /// Maximum number of syncs in flight (one per pull request at most)
        #[arg(long, default_value = "4")]
        concurrency: usize,
    },

    /// Encode or decode secondary branch names
    BranchName {
        #[command(subcommand)]
        action: BranchNameAction,
    },

    /// Print the metadata block of a pull request body as JSON
    Meta {
        /// File holding the body text
        file: PathBuf,
    },

    /// Print the configured repository relationships
    Relationships,
}

#[derive(Subcommand)]
enum BranchNameAction {
    /// Branch name for the secondary of a pull request
    Encode {
        #[arg(long)]
        repo: String,

        #[arg(long)]
        pr: u64,
    },
    /// Primary pull request named by a secondary branch
    Decode { branch: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    splitsync_core::init_tracing(cli.json, level);

    let config_path = SyncConfig::resolve_path(cli.config.as_deref());

    let result = match cli.command {
        Commands::Sync { repo, pr } => {
            cmd_sync(&config_path, SyncTarget::pull_request(repo, pr)).await
        }
        Commands::SyncBranch { repo, branch } => {
            cmd_sync(&config_path, SyncTarget::branch(repo, branch)).await
        }
        Commands::Deliveries { file, concurrency } => {
            cmd_deliveries(&config_path, &file, concurrency).await
        }
        Commands::BranchName { action } => match action {
            BranchNameAction::Encode { repo, pr } => cmd_branch_encode(&repo, pr),
            BranchNameAction::Decode { branch } => cmd_branch_decode(&branch),
        },
        Commands::Meta { file } => cmd_meta(&file),
        Commands::Relationships => cmd_relationships(&config_path),
    };

    METRICS.flush();
    result
}

fn load_config(path: &Path) -> Result<SyncConfig> {
    SyncConfig::load(path).with_context(|| format!("Failed to load config from {:?}", path))
}

fn build_orchestrator(config: &SyncConfig) -> Result<SyncOrchestrator> {
    let github =
        GitHubConfig::from_settings(&config.github).context("Failed to resolve GitHub token")?;
    let api = Arc::new(GitHubClient::new(github.clone()).context("Failed to build HTTP client")?);
    let copier = Arc::new(GitCommitCopier::new(github));
    let directory = Arc::new(
        config
            .directory()
            .context("Invalid repository relationships")?,
    );
    Ok(SyncOrchestrator::new(
        api,
        copier,
        directory,
        config.settings(),
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Sync a single target and print the report
async fn cmd_sync(config_path: &Path, target: SyncTarget) -> Result<()> {
    let config = load_config(config_path)?;
    let orchestrator = build_orchestrator(&config)?;

    let report = orchestrator
        .sync(&target)
        .await
        .with_context(|| format!("Sync of {} failed", target))?;

    info!(target = %target, result = report.kind(), "Sync complete");
    print_json(&report)
}

#[derive(Serialize)]
struct DeliveryResult {
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<SyncReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Route every delivery, then run the resulting syncs with per-PR serialization
async fn cmd_deliveries(config_path: &Path, file: &Path, concurrency: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let orchestrator = build_orchestrator(&config)?;
    let router = EventRouter::new(config.settings().aggregate);

    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read deliveries from {:?}", file))?;
    let targets = route_deliveries(&router, &source)?;
    info!(count = targets.len(), "Routed deliveries");

    let results = run_targets(&orchestrator, targets, concurrency).await;

    for result in &results {
        println!("{}", serde_json::to_string(result)?);
    }

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} syncs failed", failed, results.len());
    }
    Ok(())
}

/// Run syncs with bounded concurrency, never two at once for one PR pair.
async fn run_targets(
    orchestrator: &SyncOrchestrator,
    targets: Vec<SyncTarget>,
    concurrency: usize,
) -> Vec<DeliveryResult> {
    let queue = KeyedQueue::new();
    let queue = &queue;
    stream::iter(targets)
        .map(|target| async move {
            let target_key = target.key();
            let key = match orchestrator.pair_key(&target).await {
                Ok(key) => key,
                Err(err) => {
                    warn!(target = %target_key, error = %err, "Could not resolve pair, keying by target");
                    target_key.clone()
                }
            };
            let outcome = queue.run(&key, orchestrator.sync(&target)).await;
            match outcome {
                Ok(report) => DeliveryResult {
                    target: target_key,
                    report: Some(report),
                    error: None,
                },
                Err(err) => {
                    warn!(target = %target_key, error = %err, "Sync failed");
                    DeliveryResult {
                        target: target_key,
                        report: None,
                        error: Some(err.to_string()),
                    }
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

/// Parse JSONL deliveries into sync targets, in file order.
fn route_deliveries(router: &EventRouter, source: &str) -> Result<Vec<SyncTarget>> {
    let mut targets = Vec::new();
    for (index, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let delivery: Delivery = serde_json::from_str(line)
            .with_context(|| format!("Invalid delivery on line {}", index + 1))?;
        let routing = router
            .route_delivery(&delivery)
            .with_context(|| format!("Malformed {} payload on line {}", delivery.event, index + 1))?;
        match routing {
            Routing::Targets { targets: routed } => targets.extend(routed),
            Routing::Ignored { reason } | Routing::Skipped { reason } => {
                info!(event = %delivery.event, line = index + 1, reason = %reason, "Delivery not synced");
            }
        }
    }
    Ok(targets)
}

fn cmd_branch_encode(repo: &str, pr: u64) -> Result<()> {
    println!("{}", branch_name::encode(&PullRequestRef::new(repo, pr)));
    Ok(())
}

fn cmd_branch_decode(branch: &str) -> Result<()> {
    let primary = branch_name::decode(branch)
        .with_context(|| format!("{:?} is not a secondary branch name", branch))?;
    println!("{}", primary);
    Ok(())
}

fn cmd_meta(file: &Path) -> Result<()> {
    let body =
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    print_json(&parse_pr_body_meta(&body))
}

#[derive(Serialize)]
struct RepoView<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    children: Vec<splitsync_core::ChildRepo>,
}

fn cmd_relationships(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let directory = config
        .directory()
        .context("Invalid repository relationships")?;

    let repos: Vec<RepoView<'_>> = directory
        .repo_names()
        .map(|name| RepoView {
            name,
            parent: directory.parent_name(name),
            path: directory.path_in_parent(name),
            children: directory.children(name),
        })
        .collect();
    print_json(&repos)
}
