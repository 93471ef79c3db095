use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use screenshot_ledger::config::{AppConfig, LoggingConfig};
use screenshot_ledger::internal::models::ScreenshotKey;
use screenshot_ledger::internal::profile::Profile;
use screenshot_ledger::internal::usage::UsageLookup;
use screenshot_ledger::internal::workspace::{Workspace, WorkspaceEvent};
use screenshot_ledger::vfs::LocalFileSystem;

#[derive(Debug, Parser)]
#[command(name = "screenshot-ledger")]
#[command(about = "Track wdio screenshot references, diffs and latest images per spec")]
struct Cli {
    /// Configuration file (defaults to config.ron lookup)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Test root overriding the configured or discovered one
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Screenshot profile: legacy, modern or none
    #[arg(long, global = true)]
    profile: Option<Profile>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the screenshot tree
    Tree {
        /// Scan spec files first and mark unused screenshots
        #[arg(long)]
        unused: bool,
    },
    /// Print spec, screenshot and reference counts
    Stats,
    /// List screenshots no validation call refers to
    Unused,
    /// List validation calls without a screenshot
    Missing,
    /// Locate the validation call producing a screenshot
    Usage { spec: String, screenshot: String },
    /// Print the dimensional context of a reference or diff image
    Context { path: PathBuf },
    /// Delete every variant of a screenshot
    Delete { spec: String, screenshot: String },
    /// Rename every variant of a screenshot
    Rename {
        spec: String,
        screenshot: String,
        new_name: String,
    },
    /// Replace references with the latest images
    Promote { spec: String, screenshot: String },
    /// Rebuild on every external change under the test root
    Watch,
}

fn env_filter(logging: &LoggingConfig) -> tracing_subscriber::EnvFilter {
    // RUST_LOG takes precedence over the configured levels.
    match std::env::var("RUST_LOG") {
        Ok(_) => tracing_subscriber::EnvFilter::from_default_env(),
        Err(_) => tracing_subscriber::EnvFilter::new(logging.filter_directives()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first to get logging settings
    let mut config = AppConfig::load(cli.config.as_deref());
    let logging = config.logging.clone();
    let _guard = match cli.command {
        Commands::Watch => {
            // Long-running: log to a daily rotating file.
            let log_dir = logging.log_directory.as_deref().unwrap_or("logs");
            let file_appender = tracing_appender::rolling::daily(log_dir, "screenshot-ledger.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter(&logging))
                .with_writer(non_blocking)
                .with_ansi(false)
                .compact()
                .init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter(&logging))
                .with_writer(std::io::stderr)
                .init();
            None
        }
    };

    if let Some(root) = &cli.root {
        config.test_root = Some(root.to_string_lossy().into_owned());
    }
    if cli.profile.is_some() {
        config.profile = cli.profile;
    }
    let settings = config.resolve()?;
    let show_statistics = settings.show_statistics;
    let (workspace, mut events) = Workspace::open(settings, Arc::new(LocalFileSystem)).await?;

    let result = run(&workspace, cli.command, show_statistics).await;
    report_notifications(&mut events);
    result
}

async fn run(workspace: &Workspace, command: Commands, show_statistics: bool) -> Result<()> {
    match command {
        Commands::Tree { unused } => {
            if unused {
                workspace.find_unused().await?;
            }
            print!("{}", workspace.snapshot().await.render(show_statistics));
        }
        Commands::Stats => {
            let stats = workspace.statistics().await;
            println!("specs: {}", stats.spec_count);
            println!("screenshots: {}", stats.screenshot_count);
            println!("references: {}", stats.reference_count);
        }
        Commands::Unused => {
            for key in workspace.find_unused().await? {
                println!("{key}");
            }
        }
        Commands::Missing => {
            for missing in workspace.find_missing().await? {
                println!(
                    "{}:{}:{} {}",
                    missing.file.display(),
                    missing.position.line,
                    missing.position.column,
                    missing.key
                );
            }
        }
        Commands::Usage { spec, screenshot } => {
            if let UsageLookup::Found { file, position } =
                workspace.find_usage(ScreenshotKey::new(spec, screenshot)).await?
            {
                println!("{}:{}:{}", file.display(), position.line, position.column);
            }
        }
        Commands::Context { path } => match workspace.context_of(&path) {
            Some(breadcrumb) => println!("{breadcrumb}"),
            None => anyhow::bail!("{} is not a reference or diff screenshot", path.display()),
        },
        Commands::Delete { spec, screenshot } => {
            let outcome = workspace.delete(ScreenshotKey::new(spec, screenshot)).await?;
            println!("deleted {} file(s)", outcome.deleted);
        }
        Commands::Rename {
            spec,
            screenshot,
            new_name,
        } => {
            let outcome = workspace
                .rename(ScreenshotKey::new(spec, screenshot), new_name)
                .await?;
            println!("renamed {} file(s) to {}", outcome.renamed, outcome.new_key);
        }
        Commands::Promote { spec, screenshot } => {
            let outcome = workspace
                .replace_with_latest(ScreenshotKey::new(spec, screenshot))
                .await?;
            println!(
                "replaced {} reference(s), removed {} diff(s)",
                outcome.replaced, outcome.diffs_removed
            );
        }
        Commands::Watch => {
            tokio::select! {
                res = workspace.watch() => res?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Stopping watcher"),
            }
        }
    }
    Ok(())
}

fn report_notifications(events: &mut UnboundedReceiver<WorkspaceEvent>) {
    while let Ok(event) = events.try_recv() {
        if let WorkspaceEvent::Notify(notification) = event {
            eprintln!(
                "{}: {}: {}",
                notification.notification_type, notification.title, notification.message
            );
        }
    }
}
