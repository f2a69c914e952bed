//! JSONL telemetry writer with file rotation

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, info, warn};

use super::types::{BatteryRecord, GpsRecord, TelemetryKind, TelemetryRecord};
use crate::config::TelemetryConfig;
use crate::crsf::protocol::FramePayload;
use crate::error::Result;
use crate::session::DecodedEvent;

const FILE_PREFIX: &str = "telemetry_";
const FILE_EXTENSION: &str = "jsonl";

/// Writes telemetry records to rotating JSONL files
///
/// A new file is started every `max_records_per_file` records and only the
/// newest `max_files_to_keep` files are retained. Link statistics are rate
/// limited to one record per `log_interval_ms`.
#[derive(Debug)]
pub struct TelemetryLogger {
    enabled: bool,
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    log_interval: Duration,
    writer: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    records_in_file: usize,
    file_seq: u32,
    last_link_stats: Option<Instant>,
}

impl TelemetryLogger {
    /// Create the logger, creating the log directory when enabled
    ///
    /// No file is opened until the first record.
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.log_dir);
        if config.enabled {
            fs::create_dir_all(&dir)?;
            info!("Telemetry logging to {}", dir.display());
        }

        Ok(Self {
            enabled: config.enabled,
            dir,
            max_records_per_file: config.max_records_per_file.max(1),
            max_files_to_keep: config.max_files_to_keep.max(1),
            log_interval: Duration::from_millis(config.log_interval_ms),
            writer: None,
            current_path: None,
            records_in_file: 0,
            file_seq: 0,
            last_link_stats: None,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// File currently being written, if any
    pub fn current_file(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// Record a session event if it carries telemetry
    ///
    /// Returns `true` when a record was written.
    pub fn log_event(&mut self, event: &DecodedEvent, now: Instant) -> Result<bool> {
        if !self.enabled {
            return Ok(false);
        }

        let kind = match event {
            DecodedEvent::LinkStatisticsUpdated(stats) => {
                let due = self
                    .last_link_stats
                    .map_or(true, |last| now.saturating_duration_since(last) >= self.log_interval);
                if !due {
                    return Ok(false);
                }
                self.last_link_stats = Some(now);
                TelemetryKind::LinkStatistics((*stats).into())
            }
            DecodedEvent::Connected => TelemetryKind::Connection { connected: true },
            DecodedEvent::Disconnected => TelemetryKind::Connection { connected: false },
            DecodedEvent::FrameReceived(frame) => match &frame.payload {
                FramePayload::BatterySensor(battery) => {
                    TelemetryKind::Battery(BatteryRecord::from(battery))
                }
                FramePayload::Gps(gps) => TelemetryKind::Gps(GpsRecord::from(gps)),
                _ => return Ok(false),
            },
            _ => return Ok(false),
        };

        self.write_record(&TelemetryRecord::new(kind))?;
        Ok(true)
    }

    /// Append one record, rotating first when the current file is full
    pub fn write_record(&mut self, record: &TelemetryRecord) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            self.records_in_file += 1;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        self.flush()?;

        let stamp = Local::now().format("%Y%m%dT%H%M%S").to_string();
        // Never reuse a name: another run may have written it this second
        let (path, file) = loop {
            let name = format!("{}{}_{:04}.{}", FILE_PREFIX, stamp, self.file_seq, FILE_EXTENSION);
            self.file_seq = self.file_seq.wrapping_add(1);

            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        };
        debug!("Opened telemetry file {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.current_path = Some(path);
        self.records_in_file = 0;

        self.prune()
    }

    /// Delete the oldest telemetry files beyond `max_files_to_keep`
    fn prune(&self) -> Result<()> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_telemetry_file(path))
            .collect();

        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        // Names sort chronologically
        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove old telemetry file {}: {}", path.display(), e);
            }
        }
        Ok(())
    }
}

impl Drop for TelemetryLogger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush telemetry log: {}", e);
        }
    }
}

fn is_telemetry_file(path: &Path) -> bool {
    let name_ok = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(FILE_PREFIX));
    let ext_ok = path.extension().is_some_and(|ext| ext == FILE_EXTENSION);
    name_ok && ext_ok
}
