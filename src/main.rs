//! Location Tracker CLI
//!
//! Replays position fixes through the tracking service and manages the
//! stored trail.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use trailmark::{
    geo::DEFAULT_MIN_DISTANCE_M,
    geocoder::{DisabledGeocoder, Geocoder, GeocoderConfig, HttpGeocoder},
    location::FeedSource,
    session::{ResetPrompt, SessionController},
    storage::FileTrailStore,
    tracker::TrackingService,
    types::{now_ms, Fix},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "trailmark")]
#[command(about = "Location tracker with a persistent trail", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to trail storage
    #[arg(short, long, default_value = "trail_data")]
    data_path: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Track fixes read as JSON lines from a file or stdin
    Track {
        /// Input file, "-" for stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Minimum distance in meters between recorded points
        #[arg(short, long, default_value_t = DEFAULT_MIN_DISTANCE_M)]
        min_distance: f64,

        /// Base URL of a Nominatim-compatible reverse geocoder
        #[arg(long, env = "TRAILMARK_GEOCODER_URL")]
        geocoder_url: Option<String>,

        /// Give up on a reverse geocoding lookup after this many milliseconds
        #[arg(long, default_value = "5000")]
        geocode_timeout_ms: u64,

        /// Seconds between stats reports
        #[arg(long, default_value = "10")]
        stats_interval: u64,
    },

    /// Print the stored trail
    Show {
        /// Show only the last N points
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Delete the stored trail
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show storage statistics
    Stats,
}

/// One line of tracker input.
#[derive(Debug, Deserialize)]
struct FixLine {
    latitude: f64,
    longitude: f64,
    timestamp_ms: Option<u64>,
}

impl FixLine {
    fn into_fix(self) -> Fix {
        Fix::new(
            self.latitude,
            self.longitude,
            self.timestamp_ms.unwrap_or_else(now_ms),
        )
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Track {
            input,
            min_distance,
            geocoder_url,
            geocode_timeout_ms,
            stats_interval,
        } => {
            run_tracker(
                &cli.data_path,
                input,
                min_distance,
                geocoder_url,
                Duration::from_millis(geocode_timeout_ms),
                Duration::from_secs(stats_interval.max(1)),
            )
            .await?;
        }

        Commands::Show { limit } => {
            show_trail(&cli.data_path, limit)?;
        }

        Commands::Reset { yes } => {
            reset_trail(&cli.data_path, yes)?;
        }

        Commands::Stats => {
            show_stats(&cli.data_path)?;
        }
    }

    Ok(())
}

async fn run_tracker(
    data_path: &Path,
    input: Option<PathBuf>,
    min_distance: f64,
    geocoder_url: Option<String>,
    geocode_timeout: Duration,
    stats_interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Starting location tracker");
    tracing::info!("Data path: {}", data_path.display());
    tracing::info!("Minimum distance: {} m", min_distance);

    let geocoder: Arc<dyn Geocoder> = match geocoder_url {
        Some(url) => {
            tracing::info!("Reverse geocoding via {}", url);
            Arc::new(HttpGeocoder::new(GeocoderConfig::new(url))?)
        }
        None => {
            tracing::info!("Reverse geocoding disabled");
            Arc::new(DisabledGeocoder)
        }
    };

    let store = Arc::new(FileTrailStore::open(data_path)?);
    let source = Arc::new(FeedSource::default());

    let tracker = Arc::new(
        TrackingService::builder()
            .source(source.clone())
            .geocoder(geocoder)
            .store(store.clone())
            .min_distance(min_distance)
            .geocode_timeout(geocode_timeout)
            .build()?,
    );
    let pump = tracker.attach();
    let stats = tracker.stats();

    let (session, mut events) = SessionController::new(Arc::clone(&tracker));

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::error!("Failed to encode event: {}", e),
            }
        }
    });

    session.load_trail().await;
    session.refresh_authorization();
    session.toggle_tracking();

    // Spawn stats reporting task
    let stats_handle = {
        let stats = stats.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(stats_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                let s = stats.snapshot();
                tracing::info!(
                    "Stats: received={}, accepted={}, discarded={}, written={}, errors={}",
                    s.fixes_received,
                    s.fixes_accepted,
                    s.fixes_discarded,
                    s.points_written,
                    s.acquisition_failures + s.persistence_failures
                );
            }
        })
    };

    // Handle Ctrl+C
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        result = feed_fixes(input.as_deref(), &source) => {
            match result {
                Ok(lines) => tracing::info!("Input finished after {} fixes", lines),
                Err(e) => tracing::error!("Input error: {}", e),
            }
        }
    }

    stats_handle.abort();

    // Let the pump drain what was already delivered
    source.close();
    let _ = pump.await;
    session.toggle_tracking();

    if let Err(e) = store.sync() {
        tracing::error!("Final sync error: {}", e);
    }

    drop(session);
    drop(tracker);
    let _ = printer.await;

    let final_stats = stats.snapshot();
    tracing::info!("Final statistics:");
    tracing::info!("  Fixes received: {}", final_stats.fixes_received);
    tracing::info!("  Fixes accepted: {}", final_stats.fixes_accepted);
    tracing::info!("  Fixes discarded: {}", final_stats.fixes_discarded);
    tracing::info!("  Fixes rejected: {}", final_stats.fixes_rejected);
    tracing::info!("  Acquisition failures: {}", final_stats.acquisition_failures);
    tracing::info!("  Geocode failures: {}", final_stats.geocode_failures);
    tracing::info!("  Points written: {}", final_stats.points_written);
    tracing::info!("  Persistence failures: {}", final_stats.persistence_failures);
    tracing::info!("  Trail length: {}", store.stats().point_count);

    Ok(())
}

/// Push every line of `input` into the source. Malformed lines are
/// reported as acquisition failures.
async fn feed_fixes(input: Option<&Path>, source: &FeedSource) -> std::io::Result<usize> {
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match input {
        Some(path) if path != Path::new("-") => {
            Box::new(BufReader::new(tokio::fs::File::open(path).await?))
        }
        _ => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let mut lines = reader.lines();
    let mut count = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match serde_json::from_str::<FixLine>(line) {
            Ok(fix) => {
                source.push_fix(fix.into_fix());
                count += 1;
            }
            Err(e) => source.push_failure(format!("malformed fix {:?}: {}", line, e)),
        }
    }

    Ok(count)
}

fn show_trail(data_path: &Path, limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileTrailStore::open(data_path)?;
    let points = store.read_all()?;

    if points.is_empty() {
        println!("Trail is empty");
        return Ok(());
    }

    let skip = limit.map_or(0, |n| points.len().saturating_sub(n));

    println!("Trail has {} points", points.len());
    println!();

    for (i, point) in points.iter().enumerate().skip(skip) {
        println!("Point {}:", i + 1);
        println!("  Captured at: {} ms", point.captured_at_ms);
        println!("  Position: {}", point.coordinate());
        if let Some(address) = &point.address {
            println!("  Address: {}", address);
        }
        println!();
    }

    Ok(())
}

fn reset_trail(data_path: &Path, confirmed: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !confirmed {
        let prompt = ResetPrompt::default();
        println!("{}", prompt.title);
        println!("{}", prompt.message);
        println!("Re-run with --yes to {}.", prompt.confirm.label.to_lowercase());
        return Ok(());
    }

    let store = FileTrailStore::open(data_path)?;
    let removed = store.stats().point_count;
    store.clear()?;
    store.sync()?;

    tracing::info!("Deleted {} points", removed);
    println!("Trail reset ({} points deleted)", removed);
    Ok(())
}

fn show_stats(data_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileTrailStore::open(data_path)?;
    let stats = store.stats();

    println!("Trail Statistics");
    println!("================");
    println!("Points stored: {}", stats.point_count);
    println!("Data size: {:.1} KB", stats.data_size_kb());
    println!("Capacity: {:.1} KB", stats.data_capacity_bytes as f64 / 1024.0);
    println!("Utilization: {:.1}%", stats.utilization() * 100.0);

    Ok(())
}
