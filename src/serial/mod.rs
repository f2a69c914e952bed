//! # Serial Communication Module
//!
//! Joins a serial port to a [`CrsfSession`].
//!
//! This module handles:
//! - Opening the serial port (8N1, no flow control) at the configured baud rate
//! - Transmitting CRSF frames
//! - Feeding received bytes to the session decoder
//! - Read timeouts so a silent link never blocks the caller

pub mod port_trait;

use std::time::Duration;

use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace, warn};

use crate::config::SerialConfig;
use crate::crsf::channels::ChannelSet;
use crate::error::{CrsfLinkError, Result};
use crate::session::CrsfSession;
use port_trait::{SerialPortIO, TokioSerialPort};

/// Standard CRSF baud rate (420,000 baud)
pub const CRSF_BAUD_RATE: u32 = 420_000;

/// Fallback device paths tried after the configured one
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // USB CDC devices (most common for ELRS)
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// Default read timeout when none is configured
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// CRSF serial link
///
/// Owns the port and the session decoding what arrives on it.
pub struct CrsfSerial<P: SerialPortIO = TokioSerialPort> {
    /// Serial port handle
    port: P,
    /// Device path (e.g., /dev/ttyACM0)
    device_path: String,
    session: CrsfSession,
    read_timeout: Duration,
}

impl<P: SerialPortIO> std::fmt::Debug for CrsfSerial<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrsfSerial")
            .field("device_path", &self.device_path)
            .field("connected", &self.session.is_connected())
            .finish_non_exhaustive()
    }
}

impl CrsfSerial<TokioSerialPort> {
    /// Open the configured port, falling back to the common device paths
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` if no candidate path could be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use crsf_link::config::SerialConfig;
    /// use crsf_link::serial::CrsfSerial;
    /// use crsf_link::session::CrsfSession;
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let link = CrsfSerial::open(&SerialConfig::default(), CrsfSession::default())?;
    ///     println!("Connected to: {}", link.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(config: &SerialConfig, session: CrsfSession) -> Result<Self> {
        let mut paths: Vec<&str> = vec![config.port.as_str()];
        paths.extend(DEFAULT_DEVICE_PATHS.iter().filter(|path| **path != config.port));

        let mut link = Self::open_with_paths(&paths, config.baud_rate, session)?;
        link.read_timeout = Duration::from_millis(config.timeout_ms);
        Ok(link)
    }

    /// Open the first path in `paths` that succeeds
    pub fn open_with_paths(paths: &[&str], baud_rate: u32, session: CrsfSession) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened CRSF device at {} ({} baud)", path, baud_rate);
                    return Ok(Self::with_port(TokioSerialPort::new(port), path, session));
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(CrsfLinkError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with CRSF line settings
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| CrsfLinkError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }
}

impl<P: SerialPortIO> CrsfSerial<P> {
    /// Wrap an already open port
    pub fn with_port(port: P, device_path: &str, session: CrsfSession) -> Self {
        Self {
            port,
            device_path: device_path.to_string(),
            session,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    /// Send a complete CRSF frame
    pub async fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port
            .write_all(packet)
            .await
            .map_err(|e| CrsfLinkError::Serial(format!("Failed to write packet: {}", e)))?;

        self.port
            .flush()
            .await
            .map_err(|e| CrsfLinkError::Serial(format!("Failed to flush serial port: {}", e)))?;

        trace!("Sent CRSF packet ({} bytes)", packet.len());
        Ok(())
    }

    /// Build and send an RC channels frame to the session's target address
    pub async fn send_channels(&mut self, channels: &ChannelSet) -> Result<()> {
        let packet = self.session.build_rc_frame(channels);
        self.send_packet(&packet).await
    }

    /// Read available bytes into the session
    ///
    /// Returns the number of bytes received; zero when the read timeout
    /// elapsed first. Decoded events are then available from
    /// [`session_mut`](Self::session_mut).
    ///
    /// # Errors
    ///
    /// Returns `Serial` on a read failure or end of stream
    pub async fn receive(&mut self) -> Result<usize> {
        let read = tokio::time::timeout(self.read_timeout, self.port.read_available()).await;
        let bytes = match read {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                return Err(CrsfLinkError::Serial(format!("Failed to read from serial port: {}", e)))
            }
            Err(_) => return Ok(0),
        };

        if bytes.is_empty() {
            return Err(CrsfLinkError::Serial(format!(
                "Serial port {} closed",
                self.device_path
            )));
        }

        self.session.feed(&bytes);
        Ok(bytes.len())
    }

    pub fn session(&self) -> &CrsfSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut CrsfSession {
        &mut self.session
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Give back the session, e.g. to carry it across a reconnect
    pub fn into_session(self) -> CrsfSession {
        self.session
    }
}
