use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use wpectl_core::prelude::*;
use wpectl_core::{command, screens};

#[derive(Parser, Debug)]
#[command(name = "wpectl")]
#[command(about = "Control panel for the linux-wallpaperengine renderer", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Alternate configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan the wallpaper library and print the catalog
    Scan {
        /// Additional directory to merge into the catalog
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Keep scanning whenever the library changes on disk
    Watch,
    /// List the properties of a wallpaper, merged with saved overrides
    Properties {
        background_id: String,
        /// Use only the saved overrides, skip the engine invocation
        #[arg(long)]
        cached: bool,
    },
    /// Start the wallpaper with the given settings
    Apply(ApplyArgs),
    /// Stop the running wallpaper
    Stop,
    /// Print the connected displays
    Screens,
    /// Re-apply the last applied wallpaper
    Restore,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Wallpaper id or path
    #[arg(long = "bg")]
    background_id: String,

    /// Target display; defaults to the first detected one
    #[arg(long)]
    screen: Option<String>,

    /// Render into a window instead of the screen root
    #[arg(long)]
    windowed: bool,

    #[arg(long)]
    silent: bool,

    #[arg(long, default_value_t = command::DEFAULT_VOLUME)]
    volume: u32,

    #[arg(long)]
    noautomute: bool,

    #[arg(long = "no-audio-processing")]
    no_audio_processing: bool,

    #[arg(long, default_value_t = command::DEFAULT_FPS)]
    fps: u32,

    #[arg(long = "disable-mouse")]
    disable_mouse: bool,

    #[arg(long = "disable-parallax")]
    disable_parallax: bool,

    #[arg(long = "no-fullscreen-pause")]
    no_fullscreen_pause: bool,

    #[arg(long, default_value = command::DEFAULT_SCALING)]
    scaling: String,

    #[arg(long, default_value = command::DEFAULT_CLAMP)]
    clamp: String,

    /// Refresh property defaults from the engine before applying
    #[arg(long = "load-properties")]
    load_properties: bool,

    /// Property override as NAME=VALUE, repeatable
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,

    /// Extra arguments passed to the engine verbatim
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    extra: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => ConfigStore::open(path),
        None => ConfigStore::load_default(),
    };
    let service = EngineService::new(config);

    match cli.command {
        Commands::Scan { dir } => {
            let summary = match dir {
                Some(dir) => service.scan_extra(dir).await?,
                None => service.rescan().await?,
            };
            for entry in service.catalog() {
                println!("{}\t{}\t{}", entry.id, entry.title, entry.source_path.display());
            }
            info!(total = summary.total, added = summary.added, "scan complete");
        }
        Commands::Watch => {
            let mut changes = service.subscribe_changes();
            let summary = service.rescan().await?;
            info!(total = summary.total, "initial scan complete, watching for changes");

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("stopping watch");
                        break;
                    }
                    event = changes.recv() => match event {
                        Ok(LibraryEvent::Changed) => match service.rescan().await {
                            Ok(summary) => info!(total = summary.total, "library changed, rescanned"),
                            Err(EngineError::ScanInProgress) => {
                                warn!("change signal ignored, scan already running");
                            }
                            Err(err) => error!(%err, "rescan failed"),
                        },
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            service.stop_watching();
        }
        Commands::Properties { background_id, cached } => {
            if cached {
                let count = service.recall_properties(&background_id);
                info!(count, "loaded saved properties");
            } else {
                let load = service.load_properties(&background_id).await?;
                if load.timed_out {
                    warn!(count = load.count, "listing timed out, parsed partial output");
                } else if load.exit_code != Some(0) {
                    warn!(
                        count = load.count,
                        exit_code = ?load.exit_code,
                        "listing exited abnormally, parsed collected output"
                    );
                } else {
                    info!(count = load.count, "properties loaded");
                }
            }
            for (name, record) in service.properties(&background_id) {
                let type_hint = if record.type_hint.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", record.type_hint)
                };
                println!("{name} = {}{type_hint}", record.value);
            }
        }
        Commands::Apply(args) => {
            let screen = match args.screen.clone() {
                Some(screen) => screen,
                None => screens::detect_screens()
                    .await
                    .first()
                    .map(|s| s.name.clone())
                    .unwrap_or_default(),
            };

            service.recall_properties(&args.background_id);
            if args.load_properties {
                let load = service.load_properties(&args.background_id).await?;
                info!(count = load.count, timed_out = load.timed_out, "properties refreshed");
            }
            for pair in &args.set {
                let Some((name, value)) = pair.split_once('=') else {
                    warn!(pair = %pair, "ignoring malformed --set, expected NAME=VALUE");
                    continue;
                };
                if !service.set_property(&args.background_id, name, value) {
                    warn!(name, "unknown property for this wallpaper, ignored");
                }
            }

            let selection = Selection {
                background_id: args.background_id,
                screen,
                windowed: args.windowed,
                silent: args.silent,
                volume: args.volume,
                noautomute: args.noautomute,
                no_audio_processing: args.no_audio_processing,
                fps: args.fps,
                disable_mouse: args.disable_mouse,
                disable_parallax: args.disable_parallax,
                no_fullscreen_pause: args.no_fullscreen_pause,
                scaling: args.scaling,
                clamp: args.clamp,
                custom_args: args.extra.join(" "),
            };
            let command_line = service.apply(&selection).await?;
            info!(command = command_line.join(" "), "wallpaper started");
        }
        Commands::Stop => {
            service.stop().await?;
            info!("wallpaper stopped");
        }
        Commands::Screens => {
            for screen in screens::detect_screens().await {
                println!("{}\t{}", screen.name, screen.geometry());
            }
        }
        Commands::Restore => match service.restore_last().await? {
            Some(command_line) => info!(command = command_line.join(" "), "restored last wallpaper"),
            None => info!("no saved wallpaper to restore"),
        },
    }

    Ok(())
}
