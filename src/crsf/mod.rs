//! # CRSF Protocol Module
//!
//! Implementation of the Crossfire (CRSF) serial protocol.
//!
//! This module handles:
//! - Wire constants, addresses and typed frame payloads
//! - RC channel packing (16 channels, 11-bit resolution) and value conversions
//! - CRC8 (polynomial 0xD5) checksum calculation
//! - Frame encoding and validation
//! - Byte stream synchronization

pub mod channels;
pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod protocol;
pub mod sync;
