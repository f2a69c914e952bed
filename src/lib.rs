//! # CRSF Link Library
//!
//! Crossfire (CRSF) protocol engine for ExpressLRS and TBS radio links.
//!
//! This library provides frame synchronization over a noisy byte stream,
//! CRC8 validation, bit-exact encode/decode of RC channels, link statistics
//! and the other CRSF payloads, plus a per-link session that tracks channel
//! snapshots and connection state. The `serial` and `telemetry` modules join
//! a session to a real serial port and to rotating JSONL logs.

pub mod config;
pub mod crsf;
pub mod error;
pub mod serial;
pub mod session;
pub mod telemetry;
