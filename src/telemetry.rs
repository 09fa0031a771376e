use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Three-letter driver abbreviation
    pub driver: String,
    /// Session time in seconds
    pub time_s: f64,
    /// Distance along lap in meters
    pub distance_m: f64,
    /// Speed in km/h
    pub speed_kph: f64,
    pub x: f64,
    pub y: f64,
}

/// Telemetry of a single lap for one driver, ordered by time.
///
/// Sets are never mutated in place; every transformation hands back a new set.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySet {
    driver: String,
    samples: Vec<TelemetrySample>,
}

impl TelemetrySet {
    /// Build a set for `driver`, tagging every sample with that driver.
    pub fn new(driver: impl Into<String>, samples: Vec<TelemetrySample>) -> Self {
        let driver = driver.into();
        let samples = samples
            .into_iter()
            .map(|sample| TelemetrySample {
                driver: driver.clone(),
                ..sample
            })
            .collect();
        Self { driver, samples }
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn samples(&self) -> &[TelemetrySample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest distance reached on this lap, or `None` for an empty set.
    pub fn track_length(&self) -> Option<f64> {
        self.samples
            .iter()
            .map(|sample| sample.distance_m)
            .fold(None, |acc, d| Some(acc.map_or(d, |m: f64| m.max(d))))
    }

    /// Recompute distance by integrating speed over time.
    ///
    /// The first sample sits at 0 m; every later sample adds its own speed
    /// (converted to m/s) times the time elapsed since the previous sample.
    /// A step backwards in time adds nothing, so distance never decreases.
    pub fn with_distance(&self) -> Self {
        let mut distance_m = 0.0;
        let mut prev_time: Option<f64> = None;

        let samples = self
            .samples
            .iter()
            .map(|sample| {
                if let Some(prev) = prev_time {
                    let mut dt = sample.time_s - prev;
                    if dt < 0.0 {
                        warn!(
                            driver = %self.driver,
                            time_s = sample.time_s,
                            prev_s = prev,
                            "time went backwards"
                        );
                        dt = 0.0;
                    }
                    distance_m += sample.speed_kph / 3.6 * dt;
                }
                prev_time = Some(sample.time_s);
                TelemetrySample {
                    distance_m,
                    ..sample.clone()
                }
            })
            .collect();

        Self {
            driver: self.driver.clone(),
            samples,
        }
    }

    pub fn into_samples(self) -> Vec<TelemetrySample> {
        self.samples
    }
}

/// Concatenate several sets into one merged sequence, preserving set order
/// and the sample order within each set.
pub fn concat(sets: &[TelemetrySet]) -> Vec<TelemetrySample> {
    sets.iter()
        .flat_map(|set| set.samples.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(time_s: f64, speed_kph: f64) -> TelemetrySample {
        TelemetrySample {
            driver: String::new(),
            time_s,
            distance_m: 0.0,
            speed_kph,
            x: 0.0,
            y: 0.0,
        }
    }

    #[test]
    fn test_new_tags_driver() {
        let set = TelemetrySet::new("VER", vec![sample(0.0, 100.0), sample(1.0, 100.0)]);

        assert_eq!(set.driver(), "VER");
        assert!(set.samples().iter().all(|s| s.driver == "VER"));
    }

    #[test]
    fn test_distance_integration() {
        // 72 km/h = 20 m/s
        let set = TelemetrySet::new(
            "HAM",
            vec![sample(10.0, 72.0), sample(11.0, 72.0), sample(13.0, 36.0)],
        );

        let with_distance = set.with_distance();
        let distances: Vec<f64> = with_distance
            .samples()
            .iter()
            .map(|s| s.distance_m)
            .collect();

        assert_eq!(distances[0], 0.0);
        assert!((distances[1] - 20.0).abs() < 1e-9);
        assert!((distances[2] - 40.0).abs() < 1e-9, "10 m/s for 2 s adds 20 m");
        // source set is left untouched
        assert!(set.samples().iter().all(|s| s.distance_m == 0.0));
    }

    #[test]
    fn test_backwards_time_adds_no_distance() {
        // 36 km/h = 10 m/s; the third sample is stamped before the second
        let set = TelemetrySet::new(
            "VER",
            vec![
                sample(0.0, 36.0),
                sample(2.0, 36.0),
                sample(1.5, 36.0),
                sample(3.0, 36.0),
            ],
        )
        .with_distance();
        let distances: Vec<f64> = set.samples().iter().map(|s| s.distance_m).collect();

        assert!((distances[1] - 20.0).abs() < 1e-9);
        assert_eq!(distances[2], distances[1]);
        assert!((distances[3] - 35.0).abs() < 1e-9);
        for pair in distances.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    fn test_track_length() {
        let empty = TelemetrySet::new("VER", Vec::new());
        assert_eq!(empty.track_length(), None);

        let set = TelemetrySet::new("VER", vec![sample(0.0, 36.0), sample(5.0, 36.0)])
            .with_distance();
        let length = set.track_length().unwrap();
        assert!((length - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_concat_preserves_order() {
        let ver = TelemetrySet::new("VER", vec![sample(0.0, 1.0), sample(1.0, 2.0)]);
        let ham = TelemetrySet::new("HAM", vec![sample(0.0, 3.0)]);

        let merged = concat(&[ver, ham]);
        let drivers: Vec<&str> = merged.iter().map(|s| s.driver.as_str()).collect();
        assert_eq!(drivers, vec!["VER", "VER", "HAM"]);
        assert_eq!(merged[2].speed_kph, 3.0);
    }
}
