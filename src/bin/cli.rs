//! Cursor Sync CLI
//!
//! Command-line front end for pushing, pulling and scheduling settings sync.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cursor_sync::credentials::{CredentialStore, EnvCredentialStore, FileCredentialStore};
use cursor_sync::error::{FailureCategory, Result, SyncError};
use cursor_sync::port::{InteractionPort, SyncEvent};
use cursor_sync::remote::GistConnector;
use cursor_sync::sync::{ResolveOutcome, Scheduler, SyncEngine, SyncOutcome};
use cursor_sync::telemetry::TracingTelemetry;
use cursor_sync::types::*;
use cursor_sync::SyncConfig;

#[derive(Parser)]
#[command(name = "cursor-sync")]
#[command(about = "Sync Cursor settings through a private GitHub Gist")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(long, env = "CURSOR_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for sync state, credentials and backups
    #[arg(long, env = "CURSOR_SYNC_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    json_logs: bool,

    /// Do not ask which files to overwrite on pull
    #[arg(short, long)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload local settings
    Push,
    /// Apply remote settings locally
    Pull,
    /// Show last sync and pending conflicts
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Detect conflicts, choose a side for each, then pull with those choices
    Resolve,
    /// Validate and store a GitHub token (gist scope)
    Login {
        /// Token; prompted for when omitted
        token: Option<String>,
    },
    /// Forget the stored token
    Logout,
    /// Run scheduled pushes until Ctrl-C
    Daemon,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let mut config = SyncConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.state_dir {
        config.state_dir = cursor_sync::config::expand_path(&dir);
    }

    let credentials: Arc<dyn CredentialStore> = if EnvCredentialStore::default().is_present() {
        Arc::new(EnvCredentialStore::default())
    } else {
        Arc::new(FileCredentialStore::new(config.credential_path()))
    };

    let connector = Arc::new(GistConnector::new(config.api_base_url.clone()));
    let engine = Arc::new(
        SyncEngine::new(config.clone(), connector)?
            .with_credentials(credentials)
            .with_port(Arc::new(TerminalPort { assume_yes: cli.yes }))
            .with_telemetry(Arc::new(TracingTelemetry)),
    );

    let ok = match cli.command {
        Commands::Push => {
            let outcome = engine.push(Trigger::Manual).await;
            retry_after_resolving(&engine, outcome, SyncDirection::Push).await
        }

        Commands::Pull => {
            let outcome = engine.pull().await;
            retry_after_resolving(&engine, outcome, SyncDirection::Pull).await
        }

        Commands::Status { json } => {
            let report = engine.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                match (&report.last_sync, &report.last_direction) {
                    (Some(at), Some(direction)) => println!(
                        "Last sync: {} ({})",
                        at.format("%Y-%m-%d %H:%M:%S UTC"),
                        direction
                    ),
                    _ => println!("Last sync: never"),
                }
                if let Some(url) = &report.document_url {
                    println!("Document: {}", url);
                }
                println!("Synced files: {}", report.synced_files);
                println!("Pending conflicts: {}", report.pending_conflicts);
            }
            true
        }

        Commands::Resolve => {
            let conflicts = engine.refresh_conflicts().await?;
            if conflicts.is_empty() {
                println!("No conflicts to resolve.");
                true
            } else {
                match engine.resolve_conflicts().await {
                    ResolveOutcome::Resolved { skipped: 0, .. } => engine.pull().await.is_success(),
                    ResolveOutcome::Resolved { skipped, .. } => {
                        println!("{} conflict(s) skipped; nothing applied.", skipped);
                        true
                    }
                    ResolveOutcome::Cancelled | ResolveOutcome::NothingPending => true,
                }
            }
        }

        Commands::Login { token } => {
            let token = match token {
                Some(token) => token,
                None => prompt("GitHub Personal Access Token (gist scope): ")
                    .await
                    .ok_or(SyncError::Cancelled)?,
            };
            engine.login(&token).await?;
            println!("GitHub token configured successfully.");
            true
        }

        Commands::Logout => {
            engine.logout().await?;
            println!("Token removed.");
            true
        }

        Commands::Daemon => {
            let mut schedule = config.schedule.clone();
            schedule.enabled = true;
            let Some(scheduler) = Scheduler::start(Arc::clone(&engine), &schedule) else {
                return Err(SyncError::Config("scheduler did not start".to_string()));
            };

            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutting down");
            scheduler.stop();
            scheduler.join().await;
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(false),
            )
            .init();
    }
}

/// On a conflict failure, walk the conflicts and try once more
async fn retry_after_resolving(
    engine: &SyncEngine,
    outcome: SyncOutcome,
    direction: SyncDirection,
) -> bool {
    let is_conflict = matches!(
        &outcome,
        SyncOutcome::Failed { category: FailureCategory::Conflict, .. }
    );
    if !is_conflict {
        return outcome.is_success();
    }

    match engine.resolve_conflicts().await {
        ResolveOutcome::Resolved { skipped: 0, .. } => match direction {
            SyncDirection::Push => engine.push(Trigger::Manual).await.is_success(),
            SyncDirection::Pull => engine.pull().await.is_success(),
        },
        _ => false,
    }
}

/// Read one trimmed line from stdin. `None` on EOF or empty input.
async fn prompt(question: &str) -> Option<String> {
    let question = question.to_string();
    let line = tokio::task::spawn_blocking(move || {
        print!("{}", question);
        io::stdout().flush().ok()?;
        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    })
    .await
    .ok()??;

    (!line.is_empty()).then_some(line)
}

/// Stdin/stdout prompts
struct TerminalPort {
    assume_yes: bool,
}

#[async_trait]
impl InteractionPort for TerminalPort {
    async fn request_credential(&self) -> Option<String> {
        println!("GitHub token not configured.");
        prompt("GitHub Personal Access Token (gist scope, empty to cancel): ").await
    }

    async fn choose_conflict_resolution(&self, entry: &ConflictEntry) -> Option<ConflictResolution> {
        println!("Conflict: {}", entry.key);
        let options = [
            ConflictResolution::KeepLocal,
            ConflictResolution::KeepRemote,
            ConflictResolution::Skip,
        ];
        for (i, option) in options.iter().enumerate() {
            println!("  {}) {}", i + 1, option.label());
        }

        loop {
            let answer = prompt("Choose [1-3], empty to cancel: ").await?;
            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Some(options[n - 1]),
                _ => println!("Please enter 1, 2 or 3."),
            }
        }
    }

    async fn choose_write_subset(&self, candidates: &[WriteCandidate]) -> Option<Vec<SyncKey>> {
        let all: Vec<SyncKey> = candidates.iter().map(|c| c.key.clone()).collect();
        if self.assume_yes {
            return Some(all);
        }

        println!("Files to overwrite:");
        for (i, candidate) in candidates.iter().enumerate() {
            println!("  {}) {}", i + 1, candidate.key);
        }

        let answer = prompt("Enter numbers to skip (e.g. 2,3), 'a' for all, empty to cancel: ").await?;
        if answer.eq_ignore_ascii_case("a") {
            return Some(all);
        }

        let skip: Vec<usize> = answer
            .split(',')
            .filter_map(|s| s.trim().parse::<usize>().ok())
            .collect();
        Some(
            all.into_iter()
                .enumerate()
                .filter(|(i, _)| !skip.contains(&(i + 1)))
                .map(|(_, key)| key)
                .collect(),
        )
    }

    fn notify(&self, event: &SyncEvent) {
        match event {
            SyncEvent::Started(_) => {}
            event if event.is_failure() => eprintln!("{}", event),
            event => println!("{}", event),
        }
    }
}
