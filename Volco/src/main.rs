//! Volco - keeps Volumio playlists in sync with Mixcloud / SoundCloud feeds.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use volconfig::Config;
use volcontrol::{BrowseClient, PageSource, SocketIoTransport, VolumioController};
use volsync::{
    Crawler, MutationKind, MutationOutcome, ProgressTracker, RuleSet, StateLogEntry,
    SyncConfigExt, SyncReport, Synchronizer, append_state, write_progress,
};

#[derive(Parser, Debug)]
#[command(name = "volco")]
#[command(about = "Volumio playlist synchronization")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to $VOLCO_CONFIG, ./.volco or ~/.volco)
    #[arg(long, global = true, default_value = "")]
    config_dir: String,

    /// Browse through the Socket.IO API instead of the REST endpoint
    #[arg(long, global = true)]
    push_browse: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add new feed tracks to the playlists and refresh the rotation playlist
    Sync,
    /// Remove exact duplicates from a playlist
    Dedupe { playlist: String },
    /// Compute listening progress from the state log
    Progress,
    /// List playlists stored on the player
    Playlists,
    /// Print the player state
    State {
        /// Also append it to the state log
        #[arg(long)]
        record: bool,
    },
    Play,
    Pause,
}

fn init_tracing(config: &Config) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.get_log_min_level().to_lowercase())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn connect(config: &Config) -> Result<VolumioController<SocketIoTransport>> {
    let host = config.get_volumio_host();
    let port = config.get_socketio_port();
    VolumioController::connect(&host, port, config.get_call_timeout())
        .with_context(|| format!("Failed to connect to Volumio at {}:{}", host, port))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_config(&cli.config_dir).context("Failed to load configuration")?;
    init_tracing(&config);

    match cli.command.unwrap_or(Command::Sync) {
        Command::Sync => run_sync(&config, cli.push_browse),
        Command::Dedupe { playlist } => run_dedupe(&config, &playlist, cli.push_browse),
        Command::Progress => run_progress(&config),
        Command::Playlists => {
            let controller = connect(&config)?;
            let names = controller
                .list_playlists()?
                .ok_or_else(|| anyhow!("No playlist list received from the player"))?;
            for name in names {
                println!("{}", name);
            }
            Ok(())
        }
        Command::State { record } => {
            let controller = connect(&config)?;
            let state = controller
                .get_state()?
                .ok_or_else(|| anyhow!("No state received from the player"))?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            if record {
                let path = config.get_state_log_path()?;
                append_state(&path, &StateLogEntry::new(chrono::Utc::now(), state))?;
                info!(path = %path.display(), "State recorded");
            }
            Ok(())
        }
        Command::Play => Ok(connect(&config)?.play()?),
        Command::Pause => Ok(connect(&config)?.pause()?),
    }
}

fn run_sync(config: &Config, push_browse: bool) -> Result<()> {
    let rules_path = config.get_rules_path()?;
    let rules = RuleSet::load(&rules_path)
        .with_context(|| format!("Invalid playlist rules in {}", rules_path.display()))?;
    let rotation = config.get_rotation_policy()?;
    let feeds = config.get_feed_sources()?;

    let controller = connect(config)?;
    let rest = BrowseClient::new(&config.get_rest_base_url(), config.get_http_timeout());
    let source: &dyn PageSource = if push_browse { &controller } else { &rest };

    let synchronizer = Synchronizer::new(
        Crawler::with_max_tracks(source, config.get_max_tracks()?),
        &controller,
    );

    let candidates = synchronizer.crawler().collect_candidates(
        &feeds,
        &rotation.playlist,
        config.get_overlap_threshold()?,
    )?;
    info!(count = candidates.len(), feeds = feeds.len(), "Collected candidate tracks");

    let report = synchronizer.sync(&candidates, &rules, &rotation);
    print_report(&report);

    run_progress(config)?;

    if !report.is_clean() {
        warn!(failures = report.failures.len(), "Some playlists were not synchronized");
    }
    Ok(())
}

fn run_dedupe(config: &Config, playlist: &str, push_browse: bool) -> Result<()> {
    let controller = connect(config)?;
    let rest = BrowseClient::new(&config.get_rest_base_url(), config.get_http_timeout());
    let source: &dyn PageSource = if push_browse { &controller } else { &rest };

    let synchronizer = Synchronizer::new(Crawler::new(source), &controller);
    let mutations = synchronizer.dedupe(playlist)?;
    println!("{}: {} duplicate(s) removed", playlist, mutations.len());
    Ok(())
}

fn run_progress(config: &Config) -> Result<()> {
    let tracker = ProgressTracker::new(config.get_tracked_services()?);
    let progress = tracker.progress_from_file(&config.get_state_log_path()?)?;
    let output = config.get_progress_output_path()?;
    write_progress(&output, &progress)?;
    println!("{} track(s) with progress written to {}", progress.len(), output.display());
    Ok(())
}

fn print_report(report: &SyncReport) {
    for mutation in &report.mutations {
        let verb = match mutation.kind {
            MutationKind::Add => "+",
            MutationKind::Remove => "-",
        };
        let outcome = match &mutation.outcome {
            MutationOutcome::Acknowledged => String::new(),
            MutationOutcome::Rejected(reason) => format!(" (rejected: {})", reason),
            MutationOutcome::Unknown => " (unconfirmed)".to_string(),
        };
        println!("{} [{}] {}{}", verb, mutation.playlist, mutation.title, outcome);
    }
    for failure in &report.failures {
        println!("! [{}] {}", failure.playlist, failure.reason);
    }
    println!(
        "{} added, {} removed, {} new track(s)",
        report.adds().count(),
        report.removes().count(),
        report.newly_added.len()
    );
}
