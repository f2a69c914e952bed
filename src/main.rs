//! # CRSF Link
//!
//! Drive a CRSF link over a serial port and monitor the return stream.
//!
//! The tool transmits RC channel frames at the configured packet rate (all
//! channels at `crsf.idle_channel_value`), decodes everything the device
//! sends back, logs connection edges and writes telemetry to JSONL files.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crsf_link::config::{Config, LoggingConfig};
use crsf_link::crsf::channels::ChannelSet;
use crsf_link::crsf::protocol::{Frame, LinkStatistics};
use crsf_link::crsf::sync::SyncSettings;
use crsf_link::serial::CrsfSerial;
use crsf_link::session::handler::{self, SessionHandler};
use crsf_link::session::{CrsfSession, ParameterUpdate, SessionSettings};
use crsf_link::telemetry::TelemetryLogger;

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Number of packets between status log messages
const LOG_INTERVAL_PACKETS: u64 = 1000;

/// Why a link session ended
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Shutdown,
    LinkFailed,
}

/// One iteration of the link loop
enum Step {
    SendPacket,
    Received(crsf_link::error::Result<usize>),
    CheckTimeout,
    Shutdown,
}

/// Logs session events through `tracing`
#[derive(Debug, Default)]
struct LinkMonitor {
    link_stats_seen: u64,
}

impl SessionHandler for LinkMonitor {
    fn on_connected(&mut self) {
        info!("Receiving RC frames from the link");
    }

    fn on_disconnected(&mut self) {
        warn!("Failsafe: link silent, waiting for frames");
    }

    fn on_channels_updated(&mut self, current: &ChannelSet, previous: &ChannelSet) {
        for channel in current.changed(previous) {
            debug!(
                "CH{} {} -> {}",
                channel + 1,
                previous.0[channel],
                current.0[channel]
            );
        }
    }

    fn on_link_statistics(&mut self, stats: &LinkStatistics) {
        self.link_stats_seen += 1;
        debug!(
            "Link: RSSI -{}dBm LQ {}% SNR {}dB, downlink LQ {}%",
            stats.uplink_rssi_1, stats.uplink_lq, stats.uplink_snr, stats.downlink_lq
        );
    }

    fn on_parameter_update(&mut self, update: &ParameterUpdate) {
        info!(
            "Parameter {} written by {:?} for {:?}: {:02X?}",
            update.field_index, update.origin, update.dest, update.value
        );
    }

    fn on_frame(&mut self, frame: &Frame) {
        debug!("Frame 0x{:02X} from {:?}", frame.frame_type(), frame.address);
    }

    fn on_opaque_frame(&mut self, frame: &Frame) {
        debug!("Unrecognised frame type 0x{:02X}", frame.frame_type());
    }
}

/// Transmit interval for a packet rate
fn packet_period(rate_hz: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(rate_hz.max(1)))
}

fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path).with_context(|| format!("Failed to load config {}", path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("Failed to load config {}", DEFAULT_CONFIG_PATH)),
        None => Ok(Config::default()),
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` overrides the configured level. The returned guard must live
/// until exit so buffered file output is written.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Invalid log filter")?;

    if config.log_dir.is_empty() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
        return Ok(None);
    }

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "crsf-link.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    Ok(Some(guard))
}

fn drain_events(
    session: &mut CrsfSession,
    monitor: &mut LinkMonitor,
    telemetry: &mut TelemetryLogger,
) {
    let now = Instant::now();
    while let Some(event) = session.poll_frame() {
        handler::dispatch(monitor, &event);
        if let Err(e) = telemetry.log_event(&event, now) {
            warn!("Failed to write telemetry: {}", e);
        }
    }
}

/// Run one connected link until shutdown or a serial failure
async fn run_link(
    link: &mut CrsfSerial,
    config: &Config,
    telemetry: &mut TelemetryLogger,
    shutdown: &mut watch::Receiver<bool>,
) -> Outcome {
    let channels = ChannelSet::splat(config.crsf.idle_channel_value);
    let mut monitor = LinkMonitor::default();

    let mut packet_interval = interval(packet_period(config.crsf.packet_rate_hz));
    packet_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut timeout_interval =
        interval(Duration::from_millis(config.session.timeout_check_interval_ms));

    info!(
        "Transmitting RC frames at {}Hz, all channels at {}",
        config.crsf.packet_rate_hz, config.crsf.idle_channel_value
    );

    let mut packet_count: u64 = 0;

    loop {
        let step = tokio::select! {
            _ = packet_interval.tick() => Step::SendPacket,
            result = link.receive() => Step::Received(result),
            _ = timeout_interval.tick() => Step::CheckTimeout,
            _ = shutdown.changed() => Step::Shutdown,
        };

        match step {
            Step::SendPacket => {
                if let Err(e) = link.send_channels(&channels).await {
                    warn!("Failed to send packet: {}", e);
                    return Outcome::LinkFailed;
                }
                packet_count += 1;
                if packet_count % LOG_INTERVAL_PACKETS == 0 {
                    let stats = link.session().sync_stats();
                    info!(
                        "Sent {} packets, decoded {} frames, dropped {}",
                        packet_count,
                        stats.frames_decoded,
                        stats.frames_dropped()
                    );
                }
            }
            Step::Received(Ok(_)) => {
                drain_events(link.session_mut(), &mut monitor, telemetry);
            }
            Step::Received(Err(e)) => {
                warn!("Serial link failed: {}", e);
                return Outcome::LinkFailed;
            }
            Step::CheckTimeout => {
                link.session_mut().on_timeout_check(Instant::now());
                drain_events(link.session_mut(), &mut monitor, telemetry);
            }
            Step::Shutdown => {
                info!("Total packets sent: {}", packet_count);
                return Outcome::Shutdown;
            }
        }
    }
}

/// Main entry point for CRSF Link
///
/// Usage: `crsf-link [CONFIG]`. Without an argument `config/default.toml` is
/// used if present, otherwise built-in defaults.
///
/// The serial port is reopened every `serial.reconnect_interval_ms` after a
/// failure; Ctrl+C exits cleanly.
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1);
    let config = load_config(config_path.as_deref())?;
    let _log_guard = init_logging(&config.logging)?;

    info!("CRSF Link v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut telemetry =
        TelemetryLogger::new(&config.telemetry).context("Failed to initialise telemetry log")?;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
        }
        let _ = shutdown_tx.send(true);
    });

    let reconnect_interval = Duration::from_millis(config.serial.reconnect_interval_ms);
    info!("Press Ctrl+C to exit");

    loop {
        let session = CrsfSession::new(
            SyncSettings::from(&config.link),
            SessionSettings::from(&config.session),
        );

        match CrsfSerial::open(&config.serial, session) {
            Ok(mut link) => {
                info!("CRSF serial port opened at: {}", link.device_path());
                if run_link(&mut link, &config, &mut telemetry, &mut shutdown_rx).await
                    == Outcome::Shutdown
                {
                    break;
                }
            }
            Err(e) => warn!("{}", e),
        }

        info!("Reconnecting in {}ms", reconnect_interval.as_millis());
        tokio::select! {
            _ = sleep(reconnect_interval) => {}
            _ = shutdown_rx.changed() => break,
        }
    }

    telemetry.flush()?;
    Ok(())
}
