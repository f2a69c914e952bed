//! # Error Types
//!
//! Custom error types for CRSF Link using `thiserror`.
//!
//! [`FrameError`] is the protocol-level taxonomy. Every variant is recovered
//! locally by the frame synchronizer; none of them is fatal to the process.
//! [`CrsfLinkError`] wraps it together with the I/O, configuration and
//! telemetry failures of the outer surfaces.

use thiserror::Error;

use crate::crsf::protocol::FrameType;

/// Errors produced while parsing, validating or serializing CRSF frames
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Declared `frame_size` outside the accepted range
    #[error("frame size {size} outside accepted range {min}..={max}")]
    SizeOutOfRange { size: usize, min: u8, max: u8 },

    /// Fewer (or more) bytes than the frame layout requires
    #[error("payload length mismatch: expected {expected} bytes, got {actual}")]
    TruncatedPayload { expected: usize, actual: usize },

    /// Stored CRC does not match the recomputed one
    #[error("CRC mismatch: computed 0x{computed:02X}, received 0x{received:02X}")]
    CrcMismatch { computed: u8, received: u8 },

    /// Frame type the decoder does not interpret
    ///
    /// Non-fatal: the parser keeps such frames as opaque payloads.
    #[error("unknown frame type 0x{0:02X}")]
    UnknownType(u8),

    /// Candidate frame does not fit the synchronizer buffer
    #[error("buffer overrun: frame needs {needed} bytes, buffer holds {capacity}")]
    BufferOverrun { needed: usize, capacity: usize },

    /// Variable-length payload that violates its layout
    #[error("malformed {frame_type:?} payload")]
    MalformedPayload { frame_type: FrameType },

    /// Extended header presence disagrees with the frame type
    #[error("frame type 0x{frame_type:02X} extended header mismatch")]
    ExtendedHeaderMismatch { frame_type: u8 },

    /// Caller supplied output buffer is too small
    #[error("output buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },
}

/// Main error type for CRSF Link
#[derive(Debug, Error)]
pub enum CrsfLinkError {
    /// CRSF protocol errors
    #[error("CRSF frame error: {0}")]
    Frame(#[from] FrameError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// No serial device could be opened
    #[error("No serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// Telemetry record serialization errors
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] serde_json::Error),
}

/// Result type alias for CRSF Link
pub type Result<T> = std::result::Result<T, CrsfLinkError>;
