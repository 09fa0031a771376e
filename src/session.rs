//! Session data access.
//!
//! A [`SessionStore`] resolves a season/event/session triple into laps,
//! classification results and per-lap telemetry. [`FileSessionStore`] reads
//! them from a local cache directory:
//!
//! ```text
//! <cache_dir>/<year>/<event-slug>/<session-code>/
//!     event.json
//!     results.csv
//!     laps.csv
//!     telemetry/<DRIVER>/<LapNumber>.csv
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MinisectorError, Result};
use crate::telemetry::{TelemetrySample, TelemetrySet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SessionKind {
    Practice1,
    Practice2,
    Practice3,
    Qualifying,
    SprintQualifying,
    Sprint,
    Race,
}

impl SessionKind {
    /// Short code, also used as the session directory name.
    pub fn code(&self) -> &'static str {
        match self {
            SessionKind::Practice1 => "FP1",
            SessionKind::Practice2 => "FP2",
            SessionKind::Practice3 => "FP3",
            SessionKind::Qualifying => "Q",
            SessionKind::SprintQualifying => "SQ",
            SessionKind::Sprint => "S",
            SessionKind::Race => "R",
        }
    }
}

impl FromStr for SessionKind {
    type Err = MinisectorError;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "fp1" | "practice 1" => SessionKind::Practice1,
            "fp2" | "practice 2" => SessionKind::Practice2,
            "fp3" | "practice 3" => SessionKind::Practice3,
            "q" | "qualifying" => SessionKind::Qualifying,
            "sq" | "sprint qualifying" | "sprint shootout" => SessionKind::SprintQualifying,
            "s" | "sprint" => SessionKind::Sprint,
            "r" | "race" => SessionKind::Race,
            other => {
                return Err(MinisectorError::InvalidConfiguration(format!(
                    "unknown session type '{}'",
                    other
                )))
            }
        };
        Ok(kind)
    }
}

impl TryFrom<String> for SessionKind {
    type Error = MinisectorError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SessionKind> for String {
    fn from(kind: SessionKind) -> Self {
        kind.code().to_string()
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionId {
    pub year: u16,
    /// Event name or location, e.g. "Silverstone"
    pub event: String,
    pub session: SessionKind,
}

impl Default for SessionId {
    fn default() -> Self {
        Self {
            year: 2024,
            event: "Silverstone".to_string(),
            session: SessionKind::Race,
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.year, self.event, self.session)
    }
}

/// Lowercase `name`, collapsing every run of non-alphanumeric characters into `_`.
pub fn event_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventInfo {
    pub event_name: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionResult {
    #[serde(rename = "Abbreviation")]
    pub abbreviation: String,
    #[serde(rename = "Position", default)]
    pub position: Option<u32>,
    /// Best Q3 time in seconds, if the driver reached Q3
    #[serde(rename = "Q3", default)]
    pub q3: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Lap {
    #[serde(rename = "Driver")]
    pub driver: String,
    #[serde(rename = "LapNumber")]
    pub lap_number: u32,
    /// Lap time in seconds; missing for in/out laps and laps under red flag
    #[serde(rename = "LapTime", default)]
    pub lap_time: Option<f64>,
    #[serde(rename = "Deleted", default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Laps(Vec<Lap>);

impl Laps {
    pub fn new(laps: Vec<Lap>) -> Self {
        Self(laps)
    }

    pub fn as_slice(&self) -> &[Lap] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All laps driven by `driver`.
    pub fn pick_driver(&self, driver: &str) -> Laps {
        Laps(
            self.0
                .iter()
                .filter(|lap| lap.driver == driver)
                .cloned()
                .collect(),
        )
    }

    /// The lap with the lowest valid lap time. Untimed and deleted laps are
    /// skipped; equal times go to the earlier lap.
    pub fn pick_fastest(&self) -> Option<&Lap> {
        let mut fastest: Option<(&Lap, f64)> = None;
        for lap in &self.0 {
            let Some(time) = lap.lap_time.filter(|t| t.is_finite()) else {
                continue;
            };
            if lap.deleted {
                continue;
            }
            match fastest {
                Some((best, best_time))
                    if time > best_time
                        || (time == best_time && lap.lap_number >= best.lap_number) => {}
                _ => fastest = Some((lap, time)),
            }
        }
        fastest.map(|(lap, _)| lap)
    }
}

/// Source of session data.
pub trait SessionStore {
    fn event_info(&self, session: &SessionId) -> Result<EventInfo>;

    fn results(&self, session: &SessionId) -> Result<Vec<SessionResult>>;

    fn laps(&self, session: &SessionId) -> Result<Laps>;

    fn lap_telemetry(&self, session: &SessionId, lap: &Lap) -> Result<TelemetrySet>;

    /// Telemetry of `driver`'s fastest lap.
    fn fastest_lap_telemetry(&self, session: &SessionId, driver: &str) -> Result<TelemetrySet> {
        let laps = self.laps(session)?.pick_driver(driver);
        if laps.is_empty() {
            return Err(MinisectorError::DataUnavailable(format!(
                "no laps for driver {} in {}",
                driver, session
            )));
        }
        let fastest = laps.pick_fastest().ok_or_else(|| {
            MinisectorError::DataUnavailable(format!(
                "driver {} has no timed lap in {}",
                driver, session
            ))
        })?;
        info!(
            driver,
            lap = fastest.lap_number,
            lap_time_s = fastest.lap_time,
            "selected fastest lap"
        );
        self.lap_telemetry(session, fastest)
    }
}

#[derive(Debug, Deserialize)]
struct TelemetryRow {
    #[serde(rename = "Time")]
    time: f64,
    #[serde(rename = "Speed")]
    speed: f64,
    #[serde(rename = "X")]
    x: f64,
    #[serde(rename = "Y")]
    y: f64,
    #[serde(rename = "Distance", default)]
    distance: Option<f64>,
}

/// Where lap distance comes from when telemetry is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DistanceSource {
    /// Always integrate speed over time, ignoring any cached `Distance` column
    #[default]
    Integrate,
    /// Use the cached `Distance` column when every row has one
    Recorded,
}

/// Reads session data from a local cache directory.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    cache_dir: PathBuf,
    distance: DistanceSource,
}

impl FileSessionStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            distance: DistanceSource::default(),
        }
    }

    pub fn with_distance_source(mut self, distance: DistanceSource) -> Self {
        self.distance = distance;
        self
    }

    pub fn distance_source(&self) -> DistanceSource {
        self.distance
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn session_dir(&self, session: &SessionId) -> PathBuf {
        self.cache_dir
            .join(session.year.to_string())
            .join(event_slug(&session.event))
            .join(session.session.code())
    }

    pub fn telemetry_path(&self, session: &SessionId, lap: &Lap) -> PathBuf {
        self.session_dir(session)
            .join("telemetry")
            .join(&lap.driver)
            .join(format!("{}.csv", lap.lap_number))
    }

    fn existing_session_dir(&self, session: &SessionId) -> Result<PathBuf> {
        let dir = self.session_dir(session);
        if !dir.is_dir() {
            return Err(MinisectorError::DataUnavailable(format!(
                "session {} not found in cache ({})",
                session,
                dir.display()
            )));
        }
        Ok(dir)
    }
}

fn read_csv<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.is_file() {
        return Err(MinisectorError::DataUnavailable(format!(
            "missing {}",
            path.display()
        )));
    }
    debug!(path = %path.display(), "reading csv");
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

impl SessionStore for FileSessionStore {
    fn event_info(&self, session: &SessionId) -> Result<EventInfo> {
        let path = self.existing_session_dir(session)?.join("event.json");
        if !path.is_file() {
            return Ok(EventInfo {
                event_name: session.event.clone(),
                location: None,
            });
        }
        let data = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    fn results(&self, session: &SessionId) -> Result<Vec<SessionResult>> {
        let path = self.existing_session_dir(session)?.join("results.csv");
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let mut results: Vec<SessionResult> = read_csv(&path)?;
        results.sort_by_key(|r| r.position.unwrap_or(u32::MAX));
        Ok(results)
    }

    fn laps(&self, session: &SessionId) -> Result<Laps> {
        let path = self.existing_session_dir(session)?.join("laps.csv");
        Ok(Laps::new(read_csv(&path)?))
    }

    fn lap_telemetry(&self, session: &SessionId, lap: &Lap) -> Result<TelemetrySet> {
        let path = self.telemetry_path(session, lap);
        let rows: Vec<TelemetryRow> = read_csv(&path)?;
        if rows.is_empty() {
            return Err(MinisectorError::DataUnavailable(format!(
                "telemetry for {} lap {} is empty",
                lap.driver, lap.lap_number
            )));
        }

        let use_recorded = self.distance == DistanceSource::Recorded
            && rows.iter().all(|row| row.distance.is_some());
        let samples = rows
            .into_iter()
            .map(|row| TelemetrySample {
                driver: lap.driver.clone(),
                time_s: row.time,
                distance_m: row.distance.unwrap_or(0.0),
                speed_kph: row.speed,
                x: row.x,
                y: row.y,
            })
            .collect();

        let set = TelemetrySet::new(lap.driver.clone(), samples);
        if use_recorded {
            Ok(set)
        } else {
            debug!(driver = %lap.driver, "integrating distance from speed");
            Ok(set.with_distance())
        }
    }
}
