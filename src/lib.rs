//! Fastest-driver-per-minisector analysis of two drivers' fastest laps.
//!
//! Telemetry is loaded through a [`session::SessionStore`], binned into
//! equal-length minisectors by [`minisector::assign_minisectors`] and drawn
//! by the [`render`] module.

pub mod analysis;
pub mod config;
pub mod error;
pub mod minisector;
pub mod render;
pub mod session;
pub mod telemetry;

pub use config::AnalysisConfig;
pub use error::{MinisectorError, Result};
pub use minisector::{
    assign_minisectors, AssignedSample, BoundaryPolicy, MinisectorSettings, MinisectorSummary,
    MinisectorTable,
};
pub use session::{DistanceSource, FileSessionStore, SessionId, SessionKind, SessionStore};
pub use telemetry::{TelemetrySample, TelemetrySet};
