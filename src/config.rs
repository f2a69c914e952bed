//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and every field is optional; missing values fall back to
//! the defaults below.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::crsf::channels::CRSF_CHANNEL_RAW_MAX;
use crate::crsf::protocol::{CRSF_MAX_FRAME_LEN, CRSF_MAX_FRAME_SIZE, CRSF_MIN_FRAME_SIZE};
use crate::crsf::sync::{DEFAULT_ACCEPTED_ADDRESSES, DEFAULT_EVENT_QUEUE_DEPTH};
use crate::error::{CrsfLinkError, Result};

/// Supported CRSF baud rates
pub const SUPPORTED_BAUD_RATES: [u32; 6] = [115200, 400000, 420000, 921600, 1870000, 3750000];

/// Supported RC packet rates in Hz
pub const SUPPORTED_PACKET_RATES: [u32; 4] = [50, 150, 250, 500];

/// Accepted `logging.level` values
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub link: LinkConfig,
    pub session: SessionConfig,
    pub crsf: CrsfConfig,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

/// Frame synchronizer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    /// Address bytes recognised as frame starts
    #[serde(default = "default_accepted_addresses")]
    pub accepted_addresses: Vec<u8>,

    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: u8,

    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,
}

/// Connection state configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_failsafe_timeout_ms")]
    pub failsafe_timeout_ms: u64,

    #[serde(default = "default_timeout_check_interval_ms")]
    pub timeout_check_interval_ms: u64,

    #[serde(default = "default_rc_target_address")]
    pub rc_target_address: u8,
}

/// CRSF transmit configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CrsfConfig {
    #[serde(default = "default_packet_rate_hz")]
    pub packet_rate_hz: u32,

    /// Value sent on every channel by the binary
    #[serde(default = "default_idle_channel_value")]
    pub idle_channel_value: u16,
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_interval_ms")]
    pub log_interval_ms: u64,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Diagnostic logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files, empty for stderr only
    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyACM0".to_string() }
fn default_baud_rate() -> u32 { 420000 }
fn default_timeout_ms() -> u64 { 100 }
fn default_reconnect_interval_ms() -> u64 { 1000 }

fn default_accepted_addresses() -> Vec<u8> { DEFAULT_ACCEPTED_ADDRESSES.to_vec() }
fn default_max_frame_size() -> u8 { CRSF_MAX_FRAME_SIZE }
fn default_buffer_capacity() -> usize { CRSF_MAX_FRAME_LEN }
fn default_event_queue_depth() -> usize { DEFAULT_EVENT_QUEUE_DEPTH }

fn default_failsafe_timeout_ms() -> u64 { 500 }
fn default_timeout_check_interval_ms() -> u64 { 50 }
fn default_rc_target_address() -> u8 { 0xC8 }

fn default_packet_rate_hz() -> u32 { 250 }
fn default_idle_channel_value() -> u16 { 992 }

fn default_telemetry_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_interval_ms() -> u64 { 100 }
fn default_log_format() -> String { "jsonl".to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            accepted_addresses: default_accepted_addresses(),
            max_frame_size: default_max_frame_size(),
            buffer_capacity: default_buffer_capacity(),
            event_queue_depth: default_event_queue_depth(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            failsafe_timeout_ms: default_failsafe_timeout_ms(),
            timeout_check_interval_ms: default_timeout_check_interval_ms(),
            rc_target_address: default_rc_target_address(),
        }
    }
}

impl Default for CrsfConfig {
    fn default() -> Self {
        Self {
            packet_rate_hz: default_packet_rate_hz(),
            idle_channel_value: default_idle_channel_value(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            log_interval_ms: default_log_interval_ms(),
            format: default_log_format(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> CrsfLinkError {
    CrsfLinkError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use crsf_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Serial
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(
                "baud_rate must be one of: 115200, 400000, 420000, 921600, 1870000, 3750000",
            ));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 10000 {
            return Err(invalid("timeout_ms must be between 1 and 10000"));
        }

        if self.serial.reconnect_interval_ms == 0 || self.serial.reconnect_interval_ms > 60000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        // Link
        if self.link.accepted_addresses.is_empty() {
            return Err(invalid("accepted_addresses cannot be empty"));
        }

        if !(CRSF_MIN_FRAME_SIZE..=CRSF_MAX_FRAME_SIZE).contains(&self.link.max_frame_size) {
            return Err(invalid(format!(
                "max_frame_size must be between {} and {}",
                CRSF_MIN_FRAME_SIZE, CRSF_MAX_FRAME_SIZE
            )));
        }

        // Address + size byte + smallest frame
        let min_capacity = 2 + CRSF_MIN_FRAME_SIZE as usize;
        if !(min_capacity..=CRSF_MAX_FRAME_LEN).contains(&self.link.buffer_capacity) {
            return Err(invalid(format!(
                "buffer_capacity must be between {} and {}",
                min_capacity, CRSF_MAX_FRAME_LEN
            )));
        }

        if self.link.event_queue_depth == 0 {
            return Err(invalid("event_queue_depth must be greater than 0"));
        }

        // Session
        if self.session.failsafe_timeout_ms == 0 || self.session.failsafe_timeout_ms > 60000 {
            return Err(invalid("failsafe_timeout_ms must be between 1 and 60000"));
        }

        if self.session.timeout_check_interval_ms == 0
            || self.session.timeout_check_interval_ms > self.session.failsafe_timeout_ms
        {
            return Err(invalid(
                "timeout_check_interval_ms must be between 1 and failsafe_timeout_ms",
            ));
        }

        // CRSF
        if !SUPPORTED_PACKET_RATES.contains(&self.crsf.packet_rate_hz) {
            return Err(invalid("packet_rate_hz must be one of: 50, 150, 250, 500"));
        }

        if self.crsf.idle_channel_value > CRSF_CHANNEL_RAW_MAX {
            return Err(invalid("idle_channel_value must be between 0 and 2047"));
        }

        // Telemetry
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if self.telemetry.log_interval_ms == 0 || self.telemetry.log_interval_ms > 60000 {
            return Err(invalid("log_interval_ms must be between 1 and 60000"));
        }

        if self.telemetry.format != "jsonl" {
            return Err(invalid("log format must be 'jsonl' (only supported format)"));
        }

        // Logging
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid("logging level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crsf::sync::SyncSettings;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, 420000);
        assert_eq!(config.link.accepted_addresses, vec![0xC8, 0xEA, 0xEC, 0xEE]);
        assert_eq!(config.session.failsafe_timeout_ms, 500);
        assert_eq!(config.crsf.packet_rate_hz, 250);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[serial]
port = "/dev/ttyUSB0"

[link]
accepted_addresses = [0xC8]

[session]
failsafe_timeout_ms = 1000

[crsf]
packet_rate_hz = 150
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 420000);
        assert_eq!(config.link.accepted_addresses, vec![0xC8]);
        assert_eq!(config.link.buffer_capacity, 64);
        assert_eq!(config.session.failsafe_timeout_ms, 1000);
        assert_eq!(config.crsf.packet_rate_hz, 150);
    }

    #[test]
    fn test_shipped_default_config_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.link.accepted_addresses, default_accepted_addresses());
        assert_eq!(config.session.rc_target_address, 0xC8);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.link.max_frame_size, 62);
        assert_eq!(config.telemetry.log_dir, "./logs");
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/crsf-link.toml");
        assert!(matches!(result, Err(CrsfLinkError::Io(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = Config::from_toml("[serial\nport = ");
        assert!(matches!(result, Err(CrsfLinkError::Config(_))));
    }

    #[test]
    fn test_empty_serial_port() {
        let mut config = Config::default();
        config.serial.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = Config::default();
        config.serial.baud_rate = 9600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_all_supported_baud_rates() {
        for baud_rate in SUPPORTED_BAUD_RATES {
            let mut config = Config::default();
            config.serial.baud_rate = baud_rate;
            assert!(config.validate().is_ok(), "baud rate {} should be accepted", baud_rate);
        }
    }

    #[test]
    fn test_timeout_ms_bounds() {
        let mut config = Config::default();
        config.serial.timeout_ms = 0;
        assert!(config.validate().is_err());
        config.serial.timeout_ms = 10001;
        assert!(config.validate().is_err());
        config.serial.timeout_ms = 10000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reconnect_interval_bounds() {
        let mut config = Config::default();
        config.serial.reconnect_interval_ms = 0;
        assert!(config.validate().is_err());
        config.serial.reconnect_interval_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_accepted_addresses() {
        let mut config = Config::default();
        config.link.accepted_addresses.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_frame_size_bounds() {
        let mut config = Config::default();
        config.link.max_frame_size = 2;
        assert!(config.validate().is_err());
        config.link.max_frame_size = 63;
        assert!(config.validate().is_err());
        config.link.max_frame_size = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_buffer_capacity_bounds() {
        let mut config = Config::default();
        config.link.buffer_capacity = 4;
        assert!(config.validate().is_err());
        config.link.buffer_capacity = 65;
        assert!(config.validate().is_err());
        config.link.buffer_capacity = 5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_event_queue_depth_zero() {
        let mut config = Config::default();
        config.link.event_queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_failsafe_timeout_bounds() {
        let mut config = Config::default();
        config.session.failsafe_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.session.failsafe_timeout_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_check_interval_exceeds_failsafe() {
        let mut config = Config::default();
        config.session.timeout_check_interval_ms = 501;
        assert!(config.validate().is_err());
        config.session.timeout_check_interval_ms = 0;
        assert!(config.validate().is_err());
        config.session.timeout_check_interval_ms = 500;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_packet_rate() {
        let mut config = Config::default();
        config.crsf.packet_rate_hz = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_idle_channel_value_bounds() {
        let mut config = Config::default();
        config.crsf.idle_channel_value = 2048;
        assert!(config.validate().is_err());
        config.crsf.idle_channel_value = 2047;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_log_dir_when_enabled() {
        let mut config = Config::default();
        config.telemetry.enabled = true;
        config.telemetry.log_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_disabled() {
        let mut config = Config::default();
        config.telemetry.enabled = false;
        config.telemetry.log_dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_telemetry_file_limits_zero() {
        let mut config = Config::default();
        config.telemetry.max_records_per_file = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.telemetry.max_files_to_keep = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_interval_bounds() {
        let mut config = Config::default();
        config.telemetry.log_interval_ms = 0;
        assert!(config.validate().is_err());
        config.telemetry.log_interval_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = Config::default();
        config.telemetry.format = "csv".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_error_message_names_field() {
        let mut config = Config::default();
        config.crsf.packet_rate_hz = 1;
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("packet_rate_hz"), "unexpected message: {}", message);
    }

    #[test]
    fn test_link_config_into_sync_settings() {
        let mut config = Config::default();
        config.link.accepted_addresses = vec![0xEE];
        config.link.event_queue_depth = 4;

        let settings = SyncSettings::from(&config.link);
        assert_eq!(settings.accepted_addresses, vec![0xEE]);
        assert_eq!(settings.max_frame_size, 62);
        assert_eq!(settings.buffer_capacity, 64);
        assert_eq!(settings.event_queue_depth, 4);
    }

    #[test]
    fn test_default_link_config_matches_sync_defaults() {
        let config = Config::default();
        assert_eq!(SyncSettings::from(&config.link), SyncSettings::default());
    }
}
