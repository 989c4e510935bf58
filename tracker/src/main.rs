use clap::{Parser, Subcommand};
use forge::GitHubProvisioner;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracker::config::{resolve_credentials, terminal_prompt, TrackerConfig};
use tracker::{
    build_reconciler, provision_and_initialize, start_tracking, ConsoleNotifier, Notifier,
    RepoLocks,
};

#[derive(Parser)]
#[command(name = "itrack")]
#[command(about = "Periodically commit a timestamped marker file and push it to GitHub")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct SetupArgs {
    /// Folder the tracking repository is created in
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,
    /// Config file (defaults to <workspace>/itrack.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up the tracking repository and commit on a timer until interrupted
    Start {
        #[command(flatten)]
        setup: SetupArgs,
        /// Seconds between commits (overrides the config file)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Set up the tracking repository and run a single commit cycle
    Once {
        #[command(flatten)]
        setup: SetupArgs,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(
    setup: &SetupArgs,
    interval_secs: Option<u64>,
) -> Result<TrackerConfig, Box<dyn std::error::Error>> {
    let mut config = TrackerConfig::discover(&setup.workspace, setup.config.as_deref())?
        .apply_env(|key| std::env::var(key).ok())?;
    if let Some(secs) = interval_secs {
        config = config.with_interval(Duration::from_secs(secs));
    }
    config.validate()?;
    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (setup, interval_secs, once) = match cli.command {
        Commands::Start {
            setup,
            interval_secs,
        } => (setup, interval_secs, false),
        Commands::Once { setup } => (setup, None, true),
    };

    init_tracing(setup.verbose);

    let config = load_config(&setup, interval_secs)?;
    let credentials = resolve_credentials(
        &config,
        |key| std::env::var(key).ok(),
        terminal_prompt,
    )?;

    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier::new());
    let provisioner = GitHubProvisioner::new(config.github_config(&credentials))?;

    let handle = provision_and_initialize(&config, &provisioner, notifier.as_ref()).await?;
    let mut reconciler = build_reconciler(
        &config,
        handle,
        &credentials,
        Arc::clone(&notifier),
        RepoLocks::new(),
    )?;

    if once {
        reconciler.run_cycle().await?;
        return Ok(());
    }

    let tracking = start_tracking(reconciler, config.interval())?;
    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, waiting for any running cycle to finish");
    let reconciler = tracking.stop().await?;
    debug!(
        "Next artifact would have been {}",
        reconciler.counter().current()
    );

    Ok(())
}
