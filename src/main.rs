use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{info, warn};
use tokio::sync::broadcast::error::TryRecvError;

use tunetree::config::{default_config_path, Config};
use tunetree::config_persistence::{load_config_file, persist_config_file};
use tunetree::library::{LibraryController, NodeId, NodeKind};
use tunetree::metadata_tags::LoftyMetadataReader;
use tunetree::protocol::LibraryEvent;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Scans or restores a music library and prints it as a tree.
#[derive(Parser, Debug)]
#[command(name = "tunetree")]
#[command(version)]
struct Args {
    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Music folder; repeat for several. Replaces the configured folders.
    #[arg(long = "folder")]
    folders: Vec<PathBuf>,

    /// Scan even if the cache matches the configured folders
    #[arg(long)]
    rescan: bool,

    /// Only show nodes matching this text
    #[arg(long)]
    filter: Option<String>,

    /// Give up waiting for a scan after this many seconds
    #[arg(long, default_value_t = 600)]
    timeout_secs: u64,

    #[arg(short, long)]
    verbose: bool,
}

fn load_or_create_config(config_path: &Option<PathBuf>) -> Config {
    let Some(config_path) = config_path else {
        warn!("No config directory available. Using defaults.");
        return Config::default();
    };
    if config_path.exists() {
        return load_config_file(config_path);
    }
    info!(
        "Config file not found. Creating default config. path={}",
        config_path.display()
    );
    let config = Config::default();
    persist_config_file(&config, config_path);
    config
}

fn print_tree(controller: &LibraryController, parent: Option<NodeId>, depth: usize) {
    for id in controller.filter().children(parent) {
        let Some(node) = controller.index().node(*id) else {
            continue;
        };
        let label = match &node.kind {
            NodeKind::Album(album) if album.year > 0 => {
                format!("{} ({})", node.display_text(), album.year)
            }
            _ => node.display_text().to_string(),
        };
        println!("{}{}", "  ".repeat(depth), label);
        print_tree(controller, Some(*id), depth + 1);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut clog = colog::default_builder();
    clog.filter(
        None,
        if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        },
    );
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_or_create_config(&config_path);
    let folder_override = !args.folders.is_empty();
    if folder_override {
        config.library.folders = args
            .folders
            .iter()
            .map(|folder| folder.to_string_lossy().to_string())
            .collect();
        if let Some(config_path) = &config_path {
            persist_config_file(&config, config_path);
        }
    }
    if config.library.folders.is_empty() {
        warn!("No music folders configured. Pass --folder or edit the config file.");
    }

    let cache_path = config
        .library
        .cache_path()
        .ok_or("no data directory available for the library cache")?;
    let mut controller = LibraryController::new(
        config,
        Arc::new(LoftyMetadataReader),
        cache_path,
        config_path,
    );
    let mut events = controller.subscribe();

    let location_changed = args.rescan || controller.music_location_changed();
    controller.begin_populate_tree(location_changed)?;

    let deadline = Instant::now() + Duration::from_secs(args.timeout_secs);
    loop {
        let busy = controller.poll();
        loop {
            match events.try_recv() {
                Ok(LibraryEvent::Progress(progress)) if progress > 0 => {
                    info!("Scanning... {}%", progress)
                }
                Ok(LibraryEvent::ScanFailed(reason)) => warn!("Scan failed: {}", reason),
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if !busy {
            break;
        }
        if Instant::now() >= deadline {
            warn!("Scan still running after {}s, giving up", args.timeout_secs);
            controller.cancel_scan();
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    if let Some(pattern) = &args.filter {
        controller.set_filter(pattern);
    }
    print_tree(&controller, None, 0);

    let letters = controller.filter().children(None).to_vec();
    let tracks = if letters.is_empty() {
        0
    } else {
        controller.count_all(&letters)
    };
    println!("{} track(s)", tracks);
    Ok(())
}
