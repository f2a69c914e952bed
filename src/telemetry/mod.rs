//! # Telemetry Module
//!
//! Handles telemetry logging to JSONL files with rotation.
//!
//! This module handles:
//! - Selecting telemetry-bearing session events (link statistics, battery, GPS, connection edges)
//! - Formatting as JSONL (JSON Lines)
//! - Managing file rotation (max N records per file)
//! - Retaining only last M files

pub mod logger;
pub mod types;

pub use logger::TelemetryLogger;
pub use types::{TelemetryKind, TelemetryRecord};
