//! End-to-end comparison of two drivers' fastest laps.

use std::fmt::Write as _;

use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::minisector::{assign_minisectors, MinisectorTable};
use crate::session::{EventInfo, SessionResult, SessionStore};
use crate::telemetry::{concat, TelemetrySet};

/// Number of classified drivers logged with their Q3 time.
const RESULTS_SHOWN: usize = 10;

#[derive(Debug, Clone)]
pub struct Analysis {
    pub event: EventInfo,
    pub results: Vec<SessionResult>,
    /// Fastest-lap telemetry per compared driver, in configured order
    pub telemetry: Vec<TelemetrySet>,
    pub table: MinisectorTable,
}

impl Analysis {
    /// Chart title naming the event and both drivers.
    pub fn title(&self, config: &AnalysisConfig) -> String {
        format!(
            "{} {} {}: fastest minisectors {}",
            self.event.event_name,
            config.session.year,
            config.session.session,
            config.drivers.join(" vs "),
        )
    }
}

/// Load the configured session from `store` and assign minisectors to the
/// fastest laps of the configured drivers.
pub fn run(config: &AnalysisConfig, store: &dyn SessionStore) -> Result<Analysis> {
    config.validate()?;
    let session = &config.session;

    let event = store.event_info(session)?;
    info!(session = %session, event = %event.event_name, "loaded session");

    let results = store.results(session)?;
    log_results(&results, &config.drivers);

    let mut telemetry = Vec::with_capacity(config.drivers.len());
    for driver in &config.drivers {
        let set = store.fastest_lap_telemetry(session, driver)?;
        info!(
            driver = %driver,
            samples = set.len(),
            lap_length_m = set.track_length().unwrap_or(0.0),
            "loaded fastest lap telemetry"
        );
        telemetry.push(set);
    }

    let samples = concat(&telemetry);
    let table = assign_minisectors(&samples, &config.minisector_settings())?;
    info!(
        minisectors = config.minisector_count,
        track_length_m = table.track_length_m(),
        minisector_length_m = table.bin_width_m(),
        start_distances = ?table.start_distances(),
        "assigned minisectors"
    );

    Ok(Analysis {
        event,
        results,
        telemetry,
        table,
    })
}

fn log_results(results: &[SessionResult], drivers: &[String]) {
    if results.is_empty() {
        warn!("session has no classification results");
        return;
    }
    for result in results.iter().take(RESULTS_SHOWN) {
        info!(
            position = result.position,
            driver = %result.abbreviation,
            q3 = %result.q3.map_or_else(|| "-".to_string(), format_lap_time),
            "classification"
        );
    }
    for driver in drivers {
        if !results.iter().any(|r| &r.abbreviation == driver) {
            warn!(driver = %driver, "driver missing from session results");
        }
    }
}

/// Format seconds as `m:ss.mmm`.
pub fn format_lap_time(seconds: f64) -> String {
    let millis = (seconds * 1000.0).round() as u64;
    format!(
        "{}:{:02}.{:03}",
        millis / 60_000,
        (millis / 1000) % 60,
        millis % 1000
    )
}

/// Plain-text table of the fastest driver in every minisector.
pub fn format_summary(table: &MinisectorTable) -> String {
    let drivers = table.drivers();
    let mut out = String::new();

    let _ = write!(out, "{:>4}  {:>16}", "#", "range (m)");
    for driver in drivers {
        let _ = write!(out, "  {:>8}", driver);
    }
    let _ = writeln!(out, "  fastest");

    for summary in table.summaries() {
        let range = format!("{:.0}-{:.0}", summary.start_m, summary.end_m);
        let _ = write!(out, "{:>4}  {:>16}", summary.index, range);
        for driver in drivers {
            match summary.mean_speeds.get(driver) {
                Some(mean) => {
                    let _ = write!(out, "  {:>8.1}", mean);
                }
                None => {
                    let _ = write!(out, "  {:>8}", "-");
                }
            }
        }
        let _ = writeln!(out, "  {}", summary.winner);
    }

    let wins = table.wins_by_driver();
    let totals: Vec<String> = drivers
        .iter()
        .map(|d| format!("{} {}", d, wins.get(d).copied().unwrap_or(0)))
        .collect();
    let _ = writeln!(out, "minisectors won: {}", totals.join(", "));
    out
}
