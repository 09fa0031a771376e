use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MinisectorError, Result};
use crate::minisector::{BoundaryPolicy, MinisectorSettings, DEFAULT_MINISECTOR_COUNT};
use crate::session::{DistanceSource, SessionId};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub session: SessionId,
    /// The pair of drivers to compare, by abbreviation
    pub drivers: Vec<String>,
    pub minisector_count: usize,
    pub boundary: BoundaryPolicy,
    pub distance_source: DistanceSource,
    /// Local session data cache
    pub cache_dir: PathBuf,
    pub output: OutputConfig,
    /// Per-driver chart color overrides as `#rrggbb`
    pub colors: BTreeMap<String, String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            session: SessionId::default(),
            drivers: vec!["VER".to_string(), "HAM".to_string()],
            minisector_count: DEFAULT_MINISECTOR_COUNT,
            boundary: BoundaryPolicy::default(),
            distance_source: DistanceSource::default(),
            cache_dir: PathBuf::from("./cache"),
            output: OutputConfig::default(),
            colors: BTreeMap::new(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub speed_chart: PathBuf,
    pub track_map: PathBuf,
    /// Figure size in inches, width then height
    pub speed_chart_size_in: (f64, f64),
    pub track_map_size_in: (f64, f64),
    pub speed_chart_dpi: u32,
    pub track_map_dpi: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            speed_chart: PathBuf::from("speed_by_distance.png"),
            track_map: PathBuf::from("fastest_minisectors.png"),
            speed_chart_size_in: (15.0, 8.0),
            track_map_size_in: (12.0, 6.75),
            speed_chart_dpi: 100,
            track_map_dpi: 300,
        }
    }
}

impl OutputConfig {
    pub fn speed_chart_pixels(&self) -> (u32, u32) {
        pixels(self.speed_chart_size_in, self.speed_chart_dpi)
    }

    pub fn track_map_pixels(&self) -> (u32, u32) {
        pixels(self.track_map_size_in, self.track_map_dpi)
    }
}

fn pixels((width_in, height_in): (f64, f64), dpi: u32) -> (u32, u32) {
    (
        (width_in * dpi as f64).round() as u32,
        (height_in * dpi as f64).round() as u32,
    )
}

impl AnalysisConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| {
            MinisectorError::InvalidConfiguration(format!(
                "cannot read config {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut config: AnalysisConfig = serde_json::from_str(&data)?;
        config.normalize();
        Ok(config)
    }

    /// Trim and upper-case driver abbreviations, both in `drivers` and as
    /// color keys.
    pub fn normalize(&mut self) {
        for driver in &mut self.drivers {
            *driver = driver.trim().to_uppercase();
        }
        self.colors = std::mem::take(&mut self.colors)
            .into_iter()
            .map(|(driver, color)| (driver.trim().to_uppercase(), color))
            .collect();
    }

    pub fn minisector_settings(&self) -> MinisectorSettings {
        MinisectorSettings::new(self.minisector_count, self.boundary)
    }

    /// Reject configurations the analysis cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.minisector_count == 0 {
            return Err(invalid("minisector_count must be positive"));
        }
        if self.drivers.len() != 2 {
            return Err(invalid(format!(
                "exactly two drivers are compared, got {}",
                self.drivers.len()
            )));
        }
        if self.drivers[0] == self.drivers[1] {
            return Err(invalid(format!(
                "cannot compare driver {} against itself",
                self.drivers[0]
            )));
        }
        if self.drivers.iter().any(|d| d.trim().is_empty()) {
            return Err(invalid("driver identifiers must not be empty"));
        }
        for (driver, color) in &self.colors {
            parse_hex_color(color)
                .ok_or_else(|| invalid(format!("bad color '{}' for {}", color, driver)))?;
        }

        let out = &self.output;
        for (name, (w, h), dpi) in [
            ("speed chart", out.speed_chart_size_in, out.speed_chart_dpi),
            ("track map", out.track_map_size_in, out.track_map_dpi),
        ] {
            if dpi == 0 || !(w > 0.0) || !(h > 0.0) {
                return Err(invalid(format!(
                    "{} needs a positive size and dpi",
                    name
                )));
            }
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> MinisectorError {
    MinisectorError::InvalidConfiguration(msg.into())
}

/// Parse `#rrggbb` (leading `#` optional) into RGB components.
pub fn parse_hex_color(s: &str) -> Option<(u8, u8, u8)> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}
