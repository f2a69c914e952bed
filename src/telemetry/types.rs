//! Telemetry record types, one JSON object per line

use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;

use crate::crsf::protocol::{BatterySensor, GpsData, LinkStatistics};

/// One JSONL line
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    /// RFC 3339 wall clock time, millisecond precision
    pub timestamp: String,

    #[serde(flatten)]
    pub kind: TelemetryKind,
}

impl TelemetryRecord {
    pub fn new(kind: TelemetryKind) -> Self {
        Self::at(Local::now(), kind)
    }

    pub fn at(time: DateTime<Local>, kind: TelemetryKind) -> Self {
        Self {
            timestamp: time.to_rfc3339_opts(SecondsFormat::Millis, true),
            kind,
        }
    }
}

/// Record payloads, tagged by `"type"`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryKind {
    LinkStatistics(LinkStatsRecord),
    Battery(BatteryRecord),
    Gps(GpsRecord),
    Connection { connected: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkStatsRecord {
    #[serde(flatten)]
    pub stats: LinkStatistics,

    /// Decoded uplink power, absent for unknown power codes
    pub tx_power_mw: Option<u16>,
}

impl From<LinkStatistics> for LinkStatsRecord {
    fn from(stats: LinkStatistics) -> Self {
        Self {
            tx_power_mw: stats.tx_power().map(|power| power.milliwatts()),
            stats,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryRecord {
    pub voltage_v: f32,
    pub current_a: f32,
    pub capacity_mah: u32,
    pub remaining_percent: u8,
}

impl From<&BatterySensor> for BatteryRecord {
    fn from(battery: &BatterySensor) -> Self {
        Self {
            voltage_v: battery.voltage_volts(),
            current_a: battery.current_amps(),
            capacity_mah: battery.capacity_used,
            remaining_percent: battery.remaining_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsRecord {
    pub latitude: f64,
    pub longitude: f64,
    pub ground_speed_kmh: f32,
    pub heading_deg: f32,
    pub altitude_m: i32,
    pub satellites: u8,
}

impl From<&GpsData> for GpsRecord {
    fn from(gps: &GpsData) -> Self {
        Self {
            latitude: gps.latitude_deg(),
            longitude: gps.longitude_deg(),
            ground_speed_kmh: gps.ground_speed_kmh(),
            heading_deg: gps.heading_deg(),
            altitude_m: gps.altitude_m(),
            satellites: gps.satellites,
        }
    }
}
