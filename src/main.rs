use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use minisectors::analysis::{self, format_summary};
use minisectors::render::{render_speed_chart, render_track_map, Palette};
use minisectors::{AnalysisConfig, BoundaryPolicy, DistanceSource, FileSessionStore, SessionKind};

#[derive(Parser, Debug)]
#[command(name = "minisectors")]
#[command(version)]
#[command(about = "Compare two drivers' fastest laps minisector by minisector", long_about = None)]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Season year
    #[arg(long)]
    year: Option<u16>,

    /// Event name or location (e.g. "Silverstone")
    #[arg(long)]
    event: Option<String>,

    /// Session type (R, Q, S, SQ, FP1-FP3)
    #[arg(long)]
    session: Option<String>,

    /// The two drivers to compare, comma separated (e.g. VER,HAM)
    #[arg(long, value_delimiter = ',')]
    drivers: Option<Vec<String>>,

    /// Number of equal-length minisectors
    #[arg(short = 'n', long = "minisectors", value_name = "COUNT")]
    minisectors: Option<usize>,

    /// Bin for samples at exactly the track length
    #[arg(long, value_enum)]
    boundary: Option<BoundaryPolicy>,

    /// Integrate lap distance from speed, or use the cached Distance column
    #[arg(long, value_enum)]
    distance: Option<DistanceSource>,

    /// Session data cache directory
    #[arg(long, env = "MINISECTORS_CACHE_DIR", value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Output path of the speed/distance chart
    #[arg(long, value_name = "PNG")]
    speed_chart: Option<PathBuf>,

    /// Output path of the track map
    #[arg(long, value_name = "PNG")]
    track_map: Option<PathBuf>,

    /// Print the summary only, skip chart rendering
    #[arg(long)]
    no_plot: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<(AnalysisConfig, bool)> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => AnalysisConfig::default(),
        };

        if let Some(year) = self.year {
            config.session.year = year;
        }
        if let Some(event) = self.event {
            config.session.event = event;
        }
        if let Some(session) = self.session {
            config.session.session = session
                .parse::<SessionKind>()
                .context("invalid --session")?;
        }
        if let Some(drivers) = self.drivers {
            config.drivers = drivers;
        }
        if let Some(count) = self.minisectors {
            config.minisector_count = count;
        }
        if let Some(boundary) = self.boundary {
            config.boundary = boundary;
        }
        if let Some(distance) = self.distance {
            config.distance_source = distance;
        }
        if let Some(dir) = self.cache_dir {
            config.cache_dir = dir;
        }
        if let Some(path) = self.speed_chart {
            config.output.speed_chart = path;
        }
        if let Some(path) = self.track_map {
            config.output.track_map = path;
        }

        config.normalize();
        Ok((config, self.no_plot))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let (config, no_plot) = cli.into_config()?;

    let store =
        FileSessionStore::new(&config.cache_dir).with_distance_source(config.distance_source);
    info!(
        cache_dir = %store.cache_dir().display(),
        session = %config.session,
        distance = ?store.distance_source(),
        "starting analysis"
    );

    let analysis = analysis::run(&config, &store)
        .with_context(|| format!("analysis of {} failed", config.session))?;

    println!("{}", analysis.event.event_name);
    println!("Fastest driver per minisector:");
    print!("{}", format_summary(&analysis.table));

    if no_plot {
        return Ok(());
    }

    let palette = Palette::new(analysis.table.drivers(), &config.colors)?;
    let output = &config.output;
    render_speed_chart(
        &output.speed_chart,
        output.speed_chart_pixels(),
        output.speed_chart_dpi,
        &analysis.table,
        &palette,
    )
    .context("failed to render speed chart")?;
    render_track_map(
        &output.track_map,
        output.track_map_pixels(),
        output.track_map_dpi,
        &analysis.table,
        &palette,
        &analysis.title(&config),
    )
    .context("failed to render track map")?;

    Ok(())
}
