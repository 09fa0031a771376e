//! Chart rendering.
//!
//! Both charts are built from segments extracted out of a [`MinisectorTable`];
//! the drawing code does no analysis of its own.

use std::collections::BTreeMap;
use std::path::Path;

use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use tracing::info;

use crate::config::parse_hex_color;
use crate::error::{MinisectorError, Result};
use crate::minisector::MinisectorTable;

pub const SPEED_CHART_TITLE: &str =
    "Speed by Distance (Color-Coded by Fastest Driver per Minisector)";

const DEFAULT_COLORS: [RGBColor; 6] = [
    RGBColor(255, 0, 0),
    RGBColor(0, 0, 255),
    RGBColor(34, 139, 34),
    RGBColor(255, 140, 0),
    RGBColor(148, 0, 211),
    RGBColor(0, 139, 139),
];
const UNKNOWN_COLOR: RGBColor = RGBColor(128, 128, 128);

/// Chart color of every compared driver, indexed by driver code.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    entries: Vec<(String, RGBColor)>,
}

impl Palette {
    /// Colors in driver-code order, taken from `overrides` when present and
    /// from the default categorical palette otherwise.
    pub fn new(drivers: &[String], overrides: &BTreeMap<String, String>) -> Result<Self> {
        let mut entries = Vec::with_capacity(drivers.len());
        for (i, driver) in drivers.iter().enumerate() {
            let color = match overrides.get(driver) {
                Some(hex) => {
                    let (r, g, b) = parse_hex_color(hex).ok_or_else(|| {
                        MinisectorError::InvalidConfiguration(format!(
                            "bad color '{}' for {}",
                            hex, driver
                        ))
                    })?;
                    RGBColor(r, g, b)
                }
                None => DEFAULT_COLORS[i % DEFAULT_COLORS.len()],
            };
            entries.push((driver.clone(), color));
        }
        Ok(Self { entries })
    }

    /// Color for a 1-based driver code.
    pub fn color(&self, code: usize) -> RGBColor {
        code.checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map_or(UNKNOWN_COLOR, |(_, color)| *color)
    }

    pub fn entries(&self) -> &[(String, RGBColor)] {
        &self.entries
    }
}

/// One driver's samples inside one minisector.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedSegment {
    pub minisector: usize,
    pub driver: String,
    pub winner_code: usize,
    /// (distance m, speed km/h), ascending in distance
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSegment {
    pub from: (f64, f64),
    pub to: (f64, f64),
    pub winner_code: usize,
}

/// Split the table into per-minisector, per-driver speed traces, ordered by
/// minisector and then driver code.
pub fn speed_segments(table: &MinisectorTable) -> Vec<SpeedSegment> {
    let mut segments: BTreeMap<(usize, usize), SpeedSegment> = BTreeMap::new();
    for assigned in table.samples() {
        let driver_code = table.driver_code(&assigned.sample.driver).unwrap_or(0);
        segments
            .entry((assigned.minisector, driver_code))
            .or_insert_with(|| SpeedSegment {
                minisector: assigned.minisector,
                driver: assigned.sample.driver.clone(),
                winner_code: assigned.winner_code,
                points: Vec::new(),
            })
            .points
            .push((assigned.sample.distance_m, assigned.sample.speed_kph));
    }
    segments.into_values().collect()
}

/// Line segments between consecutive positions of the distance-sorted table,
/// colored by the first point's minisector winner.
pub fn track_segments(table: &MinisectorTable) -> Vec<TrackSegment> {
    table
        .samples()
        .windows(2)
        .map(|pair| TrackSegment {
            from: (pair[0].sample.x, pair[0].sample.y),
            to: (pair[1].sample.x, pair[1].sample.y),
            winner_code: pair[0].winner_code,
        })
        .collect()
}

fn render_err<E: std::fmt::Display>(err: E) -> MinisectorError {
    MinisectorError::Render(err.to_string())
}

fn font(size: f64) -> FontDesc<'static> {
    FontDesc::new(FontFamily::SansSerif, size, FontStyle::Normal)
}

pub fn draw_speed_chart<DB>(
    root: DrawingArea<DB, Shift>,
    table: &MinisectorTable,
    palette: &Palette,
    scale: f64,
) -> Result<()>
where
    DB: DrawingBackend,
{
    root.fill(&WHITE).map_err(render_err)?;

    let segments = speed_segments(table);
    let speeds = table.samples().iter().map(|s| s.sample.speed_kph);
    let y_min = speeds.clone().fold(f64::INFINITY, f64::min).min(0.0);
    let mut y_max = speeds.fold(f64::NEG_INFINITY, f64::max);
    if !y_max.is_finite() || y_max <= y_min {
        y_max = y_min + 1.0;
    }
    let x_max = table.track_length_m().max(1.0);

    let mut chart = ChartBuilder::on(&root)
        .caption(SPEED_CHART_TITLE, font(24.0 * scale))
        .margin((20.0 * scale) as i32)
        .set_label_area_size(LabelAreaPosition::Left, (60.0 * scale) as i32)
        .set_label_area_size(LabelAreaPosition::Bottom, (50.0 * scale) as i32)
        .build_cartesian_2d(0.0..x_max, y_min..(y_max * 1.05))
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .x_desc("Distance (m)")
        .y_desc("Speed (km/h)")
        .label_style(font(14.0 * scale))
        .axis_desc_style(font(16.0 * scale))
        .draw()
        .map_err(render_err)?;

    let line_width = (2.0 * scale).max(1.0) as u32;
    for segment in &segments {
        chart
            .draw_series(LineSeries::new(
                segment.points.iter().copied(),
                palette.color(segment.winner_code).stroke_width(line_width),
            ))
            .map_err(render_err)?;
    }

    draw_legend(&mut chart, palette, scale)?;
    root.present().map_err(render_err)?;
    Ok(())
}

pub fn draw_track_map<DB>(
    root: DrawingArea<DB, Shift>,
    table: &MinisectorTable,
    palette: &Palette,
    title: &str,
    scale: f64,
) -> Result<()>
where
    DB: DrawingBackend,
{
    root.fill(&WHITE).map_err(render_err)?;

    let segments = track_segments(table);
    let (x_range, y_range) = equal_aspect_bounds(table, root.dim_in_pixel());

    let mut chart = ChartBuilder::on(&root)
        .caption(title, font(24.0 * scale))
        .margin((20.0 * scale) as i32)
        .build_cartesian_2d(x_range, y_range)
        .map_err(render_err)?;

    let line_width = (5.0 * scale).max(1.0) as u32;
    chart
        .draw_series(segments.iter().map(|segment| {
            PathElement::new(
                vec![segment.from, segment.to],
                palette.color(segment.winner_code).stroke_width(line_width),
            )
        }))
        .map_err(render_err)?;

    draw_legend(&mut chart, palette, scale)?;
    root.present().map_err(render_err)?;
    Ok(())
}

fn draw_legend<'a, DB>(
    chart: &mut ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    palette: &Palette,
    scale: f64,
) -> Result<()>
where
    DB: DrawingBackend + 'a,
{
    let marker_width = (3.0 * scale).max(1.0) as u32;
    let marker_len = (20.0 * scale) as i32;
    for (driver, color) in palette.entries() {
        let color = *color;
        chart
            .draw_series(LineSeries::new(
                std::iter::empty::<(f64, f64)>(),
                color.stroke_width(marker_width),
            ))
            .map_err(render_err)?
            .label(driver.as_str())
            .legend(move |(x, y)| {
                PathElement::new(
                    vec![(x, y), (x + marker_len, y)],
                    color.stroke_width(marker_width),
                )
            });
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK.mix(0.4))
        .label_font(font(16.0 * scale))
        .position(SeriesLabelPosition::UpperRight)
        .draw()
        .map_err(render_err)?;
    Ok(())
}

// Pad the position bounds so one meter spans the same number of pixels on
// both axes.
fn equal_aspect_bounds(
    table: &MinisectorTable,
    (width_px, height_px): (u32, u32),
) -> (std::ops::Range<f64>, std::ops::Range<f64>) {
    let (mut x_min, mut x_max, mut y_min, mut y_max) =
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
    for assigned in table.samples() {
        x_min = x_min.min(assigned.sample.x);
        x_max = x_max.max(assigned.sample.x);
        y_min = y_min.min(assigned.sample.y);
        y_max = y_max.max(assigned.sample.y);
    }
    if !x_min.is_finite() || !y_min.is_finite() {
        return (0.0..1.0, 0.0..1.0);
    }

    let x_span = (x_max - x_min).max(1.0) * 1.05;
    let y_span = (y_max - y_min).max(1.0) * 1.05;
    let aspect = width_px.max(1) as f64 / height_px.max(1) as f64;
    let (x_span, y_span) = if x_span / y_span < aspect {
        (y_span * aspect, y_span)
    } else {
        (x_span, x_span / aspect)
    };

    let x_mid = (x_min + x_max) / 2.0;
    let y_mid = (y_min + y_max) / 2.0;
    (
        (x_mid - x_span / 2.0)..(x_mid + x_span / 2.0),
        (y_mid - y_span / 2.0)..(y_mid + y_span / 2.0),
    )
}

/// Write the speed-versus-distance chart as a PNG.
pub fn render_speed_chart(
    path: &Path,
    size: (u32, u32),
    dpi: u32,
    table: &MinisectorTable,
    palette: &Palette,
) -> Result<()> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    draw_speed_chart(root, table, palette, dpi as f64 / 100.0)?;
    info!(path = %path.display(), width = size.0, height = size.1, "wrote speed chart");
    Ok(())
}

/// Write the minisector track map as a PNG.
pub fn render_track_map(
    path: &Path,
    size: (u32, u32),
    dpi: u32,
    table: &MinisectorTable,
    palette: &Palette,
    title: &str,
) -> Result<()> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    draw_track_map(root, table, palette, title, dpi as f64 / 100.0)?;
    info!(path = %path.display(), width = size.0, height = size.1, "wrote track map");
    Ok(())
}
