//! Minisector assignment.
//!
//! The merged telemetry of all compared drivers is cut into equal-length
//! distance bins; every bin goes to the driver with the higher mean speed
//! inside it, and that label is broadcast back onto each sample.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MinisectorError, Result};
use crate::telemetry::TelemetrySample;

pub const DEFAULT_MINISECTOR_COUNT: usize = 25;

/// What happens to a sample sitting exactly on the far end of the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryPolicy {
    /// Fold it into the last bin, giving exactly `count` bins
    #[default]
    Clamp,
    /// Let it spill into bin `count`, one past the last full bin.
    /// Indices come from `floor(distance / width)` on the quotient, which can
    /// land one bin higher than numpy's `//` at exact boundaries.
    Unclamped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinisectorSettings {
    pub count: usize,
    pub boundary: BoundaryPolicy,
}

impl Default for MinisectorSettings {
    fn default() -> Self {
        Self {
            count: DEFAULT_MINISECTOR_COUNT,
            boundary: BoundaryPolicy::default(),
        }
    }
}

impl MinisectorSettings {
    pub fn new(count: usize, boundary: BoundaryPolicy) -> Self {
        Self { count, boundary }
    }

    fn index_for(&self, distance_m: f64, bin_width_m: f64) -> usize {
        // Zero-length track: everything shares the first bin
        if bin_width_m <= 0.0 {
            return 0;
        }
        let raw = (distance_m / bin_width_m).floor();
        if raw <= 0.0 {
            return 0;
        }
        let index = raw as usize;
        match self.boundary {
            BoundaryPolicy::Clamp => index.min(self.count - 1),
            BoundaryPolicy::Unclamped => index,
        }
    }
}

/// A telemetry sample labelled with its minisector and that minisector's winner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignedSample {
    pub sample: TelemetrySample,
    pub minisector: usize,
    pub winner: String,
    /// 1-based position of the winner in [`MinisectorTable::drivers`]
    pub winner_code: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinisectorSummary {
    pub index: usize,
    pub start_m: f64,
    pub end_m: f64,
    /// Mean speed (km/h) of every driver with samples in this minisector
    pub mean_speeds: BTreeMap<String, f64>,
    pub winner: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinisectorTable {
    samples: Vec<AssignedSample>,
    summaries: Vec<MinisectorSummary>,
    drivers: Vec<String>,
    track_length_m: f64,
    bin_width_m: f64,
    count: usize,
}

impl MinisectorTable {
    /// Samples sorted by ascending distance.
    pub fn samples(&self) -> &[AssignedSample] {
        &self.samples
    }

    /// One entry per populated minisector, sorted by index.
    pub fn summaries(&self) -> &[MinisectorSummary] {
        &self.summaries
    }

    /// Drivers in order of first appearance in the input; codes are 1-based
    /// positions in this list.
    pub fn drivers(&self) -> &[String] {
        &self.drivers
    }

    pub fn track_length_m(&self) -> f64 {
        self.track_length_m
    }

    pub fn bin_width_m(&self) -> f64 {
        self.bin_width_m
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn driver_code(&self, driver: &str) -> Option<usize> {
        self.drivers.iter().position(|d| d == driver).map(|i| i + 1)
    }

    pub fn winner_of(&self, index: usize) -> Option<&str> {
        self.summaries
            .iter()
            .find(|summary| summary.index == index)
            .map(|summary| summary.winner.as_str())
    }

    /// Distance at which each of the `count` minisectors starts.
    pub fn start_distances(&self) -> Vec<f64> {
        (0..self.count)
            .map(|i| i as f64 * self.bin_width_m)
            .collect()
    }

    /// Number of minisectors won by each driver; drivers without a win map to 0.
    pub fn wins_by_driver(&self) -> BTreeMap<String, usize> {
        let mut wins: BTreeMap<String, usize> =
            self.drivers.iter().map(|d| (d.clone(), 0)).collect();
        for summary in &self.summaries {
            *wins.entry(summary.winner.clone()).or_insert(0) += 1;
        }
        wins
    }
}

/// Assign every sample to a minisector and label it with the minisector's
/// fastest driver.
///
/// Mean speeds are compared per minisector; a strictly higher mean wins and
/// exact ties go to the lexically smallest driver identifier. The returned
/// samples are stably sorted by distance.
pub fn assign_minisectors(
    samples: &[TelemetrySample],
    settings: &MinisectorSettings,
) -> Result<MinisectorTable> {
    if settings.count == 0 {
        return Err(MinisectorError::InvalidConfiguration(
            "minisector count must be positive".to_string(),
        ));
    }
    if samples.is_empty() {
        return Err(MinisectorError::EmptyInput);
    }
    for sample in samples {
        check_finite(sample)?;
    }

    let track_length_m = samples
        .iter()
        .map(|s| s.distance_m)
        .fold(f64::NEG_INFINITY, f64::max);
    let bin_width_m = track_length_m / settings.count as f64;

    let mut drivers: Vec<String> = Vec::new();
    for sample in samples {
        if !drivers.contains(&sample.driver) {
            drivers.push(sample.driver.clone());
        }
    }

    let indices: Vec<usize> = samples
        .iter()
        .map(|s| settings.index_for(s.distance_m, bin_width_m))
        .collect();

    // minisector -> driver -> (speed sum, sample count)
    let mut totals: BTreeMap<usize, BTreeMap<&str, (f64, usize)>> = BTreeMap::new();
    for (sample, &index) in samples.iter().zip(&indices) {
        let entry = totals
            .entry(index)
            .or_default()
            .entry(sample.driver.as_str())
            .or_insert((0.0, 0));
        entry.0 += sample.speed_kph;
        entry.1 += 1;
    }

    let summaries: Vec<MinisectorSummary> = totals
        .into_iter()
        .map(|(index, per_driver)| {
            let mean_speeds: BTreeMap<String, f64> = per_driver
                .into_iter()
                .map(|(driver, (sum, n))| (driver.to_string(), sum / n as f64))
                .collect();
            let winner = fastest_driver(&mean_speeds);
            debug!(index, winner = %winner, ?mean_speeds, "minisector decided");
            MinisectorSummary {
                index,
                start_m: index as f64 * bin_width_m,
                end_m: (index + 1) as f64 * bin_width_m,
                mean_speeds,
                winner,
            }
        })
        .collect();

    let winners: BTreeMap<usize, &str> = summaries
        .iter()
        .map(|summary| (summary.index, summary.winner.as_str()))
        .collect();

    let mut assigned: Vec<AssignedSample> = samples
        .iter()
        .zip(&indices)
        .map(|(sample, &index)| {
            let winner = winners[&index].to_string();
            let winner_code = drivers
                .iter()
                .position(|d| *d == winner)
                .map_or(0, |i| i + 1);
            AssignedSample {
                sample: sample.clone(),
                minisector: index,
                winner,
                winner_code,
            }
        })
        .collect();

    assigned.sort_by(|a, b| a.sample.distance_m.total_cmp(&b.sample.distance_m));

    Ok(MinisectorTable {
        samples: assigned,
        summaries,
        drivers,
        track_length_m,
        bin_width_m,
        count: settings.count,
    })
}

fn check_finite(sample: &TelemetrySample) -> Result<()> {
    let reason = if !sample.distance_m.is_finite() {
        format!("distance {} is not finite", sample.distance_m)
    } else if !sample.speed_kph.is_finite() {
        format!("speed {} is not finite", sample.speed_kph)
    } else {
        return Ok(());
    };
    Err(MinisectorError::InvalidSample {
        driver: sample.driver.clone(),
        reason,
    })
}

// BTreeMap iterates drivers lexically, so keeping the first of equal means
// hands ties to the smallest identifier.
fn fastest_driver(mean_speeds: &BTreeMap<String, f64>) -> String {
    let mut best: Option<(&String, f64)> = None;
    for (driver, &mean) in mean_speeds {
        match best {
            Some((_, best_mean)) if mean <= best_mean => {}
            _ => best = Some((driver, mean)),
        }
    }
    best.map(|(driver, _)| driver.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(driver: &str, distance_m: f64, speed_kph: f64) -> TelemetrySample {
        TelemetrySample {
            driver: driver.to_string(),
            time_s: 0.0,
            distance_m,
            speed_kph,
            x: distance_m,
            y: 0.0,
        }
    }

    fn lap(driver: &str, speed_kph: f64) -> Vec<TelemetrySample> {
        (0..=100)
            .map(|d| sample(driver, d as f64, speed_kph + (d % 7) as f64))
            .collect()
    }

    #[test]
    fn test_boundary_unclamped() {
        let samples = vec![
            sample("VER", 0.0, 200.0),
            sample("VER", 99.9, 200.0),
            sample("HAM", 100.0, 210.0),
        ];
        let settings = MinisectorSettings::new(10, BoundaryPolicy::Unclamped);

        let table = assign_minisectors(&samples, &settings).unwrap();
        let indices: Vec<usize> = table.samples().iter().map(|s| s.minisector).collect();

        assert_eq!(table.track_length_m(), 100.0);
        assert_eq!(table.bin_width_m(), 10.0);
        assert_eq!(indices, vec![0, 9, 10]);
    }

    #[test]
    fn test_boundary_clamped() {
        let samples = vec![
            sample("VER", 0.0, 200.0),
            sample("VER", 99.9, 200.0),
            sample("HAM", 100.0, 210.0),
        ];
        let settings = MinisectorSettings::new(10, BoundaryPolicy::Clamp);

        let table = assign_minisectors(&samples, &settings).unwrap();
        let indices: Vec<usize> = table.samples().iter().map(|s| s.minisector).collect();

        assert_eq!(indices, vec![0, 9, 9]);
        // HAM is faster in the shared last bin, and the label covers both samples
        assert_eq!(table.winner_of(9), Some("HAM"));
        assert!(table.samples()[1..].iter().all(|s| s.winner == "HAM"));
    }

    #[test]
    fn test_winner_selection() {
        let samples = vec![
            sample("A", 0.0, 100.0),
            sample("A", 31.0, 190.0),
            sample("A", 35.0, 210.0),
            sample("B", 32.0, 205.0),
            sample("B", 38.0, 215.0),
            sample("B", 100.0, 100.0),
        ];
        let table = assign_minisectors(&samples, &MinisectorSettings::new(10, BoundaryPolicy::Clamp))
            .unwrap();

        let bin3 = table.summaries().iter().find(|s| s.index == 3).unwrap();
        assert_eq!(bin3.mean_speeds["A"], 200.0);
        assert_eq!(bin3.mean_speeds["B"], 210.0);
        assert_eq!(bin3.winner, "B");

        for assigned in table.samples().iter().filter(|s| s.minisector == 3) {
            assert_eq!(assigned.winner, "B");
            assert_eq!(assigned.winner_code, 2);
        }
    }

    #[test]
    fn test_single_sample_per_driver() {
        let samples = vec![sample("VER", 10.0, 250.0), sample("HAM", 12.0, 251.0)];
        let table = assign_minisectors(&samples, &MinisectorSettings::new(1, BoundaryPolicy::Clamp))
            .unwrap();

        assert!(table.samples().iter().all(|s| s.minisector == 0));
        assert!(table.samples().iter().all(|s| s.winner == "HAM"));
    }

    #[test]
    fn test_tie_goes_to_lexically_smallest_driver() {
        let samples = vec![sample("VER", 10.0, 250.0), sample("HAM", 12.0, 250.0)];
        let table = assign_minisectors(&samples, &MinisectorSettings::new(1, BoundaryPolicy::Clamp))
            .unwrap();

        assert_eq!(table.winner_of(0), Some("HAM"));
        // codes still follow first appearance, not the tie-break order
        assert_eq!(table.driver_code("VER"), Some(1));
        assert!(table.samples().iter().all(|s| s.winner_code == 2));
    }

    #[test]
    fn test_empty_input() {
        let result = assign_minisectors(&[], &MinisectorSettings::default());
        assert!(matches!(result, Err(MinisectorError::EmptyInput)));
    }

    #[test]
    fn test_zero_minisectors_rejected() {
        let samples = vec![sample("VER", 10.0, 250.0)];
        let result = assign_minisectors(&samples, &MinisectorSettings::new(0, BoundaryPolicy::Clamp));
        assert!(matches!(result, Err(MinisectorError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_non_finite_speed_rejected() {
        let samples = vec![sample("VER", 10.0, f64::NAN)];
        let result = assign_minisectors(&samples, &MinisectorSettings::default());
        match result {
            Err(MinisectorError::InvalidSample { driver, .. }) => assert_eq!(driver, "VER"),
            other => panic!("expected InvalidSample, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_distance_rejected() {
        for distance in [f64::INFINITY, f64::NAN] {
            let samples = vec![sample("VER", 10.0, 200.0), sample("HAM", distance, 200.0)];
            let result = assign_minisectors(&samples, &MinisectorSettings::default());
            match result {
                Err(MinisectorError::InvalidSample { driver, reason }) => {
                    assert_eq!(driver, "HAM");
                    assert!(reason.contains("distance"), "reason: {}", reason);
                }
                other => panic!("expected InvalidSample, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_lone_driver_wins_bin() {
        // HAM is faster wherever both drivers have samples, but only VER
        // recorded anything in bin 1
        let samples = vec![
            sample("VER", 5.0, 150.0),
            sample("HAM", 6.0, 250.0),
            sample("VER", 15.0, 100.0),
            sample("VER", 25.0, 150.0),
            sample("HAM", 28.0, 250.0),
            sample("HAM", 30.0, 250.0),
        ];
        let table = assign_minisectors(&samples, &MinisectorSettings::new(3, BoundaryPolicy::Clamp))
            .unwrap();

        assert_eq!(table.winner_of(0), Some("HAM"));
        assert_eq!(table.winner_of(2), Some("HAM"));
        assert_eq!(table.winner_of(1), Some("VER"));

        let bin1 = table.summaries().iter().find(|s| s.index == 1).unwrap();
        assert_eq!(bin1.mean_speeds.len(), 1);
        assert!(!bin1.mean_speeds.contains_key("HAM"));
        assert_eq!(bin1.mean_speeds["VER"], 100.0);

        let lone = table.samples().iter().find(|s| s.minisector == 1).unwrap();
        assert_eq!(lone.winner_code, 1);
    }

    #[test]
    fn test_zero_length_track() {
        let samples = vec![sample("VER", 0.0, 10.0), sample("HAM", 0.0, 20.0)];
        let table = assign_minisectors(&samples, &MinisectorSettings::default()).unwrap();

        assert!(table.samples().iter().all(|s| s.minisector == 0));
        assert_eq!(table.winner_of(0), Some("HAM"));
    }

    #[test]
    fn test_index_range_and_consistent_labels() {
        let mut samples = lap("VER", 200.0);
        samples.extend(lap("HAM", 203.0));

        for boundary in [BoundaryPolicy::Clamp, BoundaryPolicy::Unclamped] {
            let settings = MinisectorSettings::new(7, boundary);
            let table = assign_minisectors(&samples, &settings).unwrap();
            let max_index = match boundary {
                BoundaryPolicy::Clamp => 6,
                BoundaryPolicy::Unclamped => 7,
            };

            for assigned in table.samples() {
                assert!(assigned.minisector <= max_index);
                assert_eq!(Some(assigned.winner.as_str()), table.winner_of(assigned.minisector));
            }
        }
    }

    #[test]
    fn test_output_sorted_and_stable() {
        let samples = vec![
            sample("VER", 50.0, 1.0),
            sample("VER", 0.0, 2.0),
            sample("HAM", 50.0, 3.0),
            sample("HAM", 20.0, 4.0),
        ];
        let table = assign_minisectors(&samples, &MinisectorSettings::new(5, BoundaryPolicy::Clamp))
            .unwrap();

        let distances: Vec<f64> = table.samples().iter().map(|s| s.sample.distance_m).collect();
        assert_eq!(distances, vec![0.0, 20.0, 50.0, 50.0]);
        // equal distances keep input order
        assert_eq!(table.samples()[2].sample.driver, "VER");
        assert_eq!(table.samples()[3].sample.driver, "HAM");
    }

    #[test]
    fn test_idempotent() {
        let mut samples = lap("VER", 180.0);
        samples.extend(lap("HAM", 181.0));
        let settings = MinisectorSettings::default();

        let first = assign_minisectors(&samples, &settings).unwrap();
        let second = assign_minisectors(&samples, &settings).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_start_distances_and_wins() {
        let mut samples = lap("VER", 200.0);
        samples.extend(lap("HAM", 100.0));
        let table = assign_minisectors(&samples, &MinisectorSettings::new(4, BoundaryPolicy::Clamp))
            .unwrap();

        assert_eq!(table.start_distances(), vec![0.0, 25.0, 50.0, 75.0]);
        let wins = table.wins_by_driver();
        assert_eq!(wins["VER"], 4);
        assert_eq!(wins["HAM"], 0);
    }
}
