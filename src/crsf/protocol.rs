//! # CRSF Protocol Constants and Types
//!
//! Core protocol definitions for CRSF (Crossfire) communication.
//!
//! Wire layout of every frame:
//!
//! ```text
//! [address][frame_size][type][dest, orig]?[payload ...][crc8]
//!           \_______________ frame_size bytes ______________/
//! ```
//!
//! The `[dest, orig]` extended header is present only for frame types in
//! `0x28..=0x96`.

use serde::Serialize;

use super::channels::ChannelSet;
use crate::error::FrameError;

/// CRSF frame sync byte (flight controller address)
pub const CRSF_SYNC_BYTE: u8 = 0xC8;

/// Maximum length of a whole frame on the wire, address byte included
pub const CRSF_MAX_FRAME_LEN: usize = 64;

/// Bytes not counted by `frame_size` (address + frame_size itself)
pub const CRSF_FRAME_NOT_COUNTED_BYTES: usize = 2;

/// Smallest accepted `frame_size` (type + one payload byte + crc)
pub const CRSF_MIN_FRAME_SIZE: u8 = 3;

/// Largest accepted `frame_size`
pub const CRSF_MAX_FRAME_SIZE: u8 = 62;

/// Size of the extended header (dest + orig)
pub const CRSF_EXT_HEADER_SIZE: usize = 2;

/// First frame type carrying an extended header
pub const CRSF_EXT_TYPE_FIRST: u8 = 0x28;

/// Last frame type carrying an extended header
pub const CRSF_EXT_TYPE_LAST: u8 = 0x96;

/// RC channels payload size (22 bytes for 16 channels × 11 bits)
pub const CRSF_RC_CHANNELS_PAYLOAD_SIZE: usize = 22;

/// Number of RC channels
pub const CRSF_NUM_CHANNELS: usize = 16;

/// Link Statistics payload size
pub const CRSF_LINK_STATS_PAYLOAD_SIZE: usize = 10;

/// Battery Sensor payload size
pub const CRSF_BATTERY_SENSOR_PAYLOAD_SIZE: usize = 8;

/// GPS payload size
pub const CRSF_GPS_PAYLOAD_SIZE: usize = 15;

/// Attitude payload size
pub const CRSF_ATTITUDE_PAYLOAD_SIZE: usize = 6;

/// Device info payload size after the NUL-terminated name
pub const CRSF_DEVICE_INFO_TAIL_SIZE: usize = 14;

/// Whether frames of this type carry the `[dest, orig]` extended header
pub const fn is_extended_type(frame_type: u8) -> bool {
    frame_type >= CRSF_EXT_TYPE_FIRST && frame_type <= CRSF_EXT_TYPE_LAST
}

/// CRSF device addresses
///
/// Any byte is a valid address on the wire; the ones without a name are
/// kept as [`DeviceAddress::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceAddress {
    Broadcast,
    Usb,
    TbsCorePnpPro,
    Reserved1,
    CurrentSensor,
    Gps,
    TbsBlackbox,
    FlightController,
    Reserved2,
    RaceTag,
    RadioTransmitter,
    Receiver,
    Transmitter,
    Unknown(u8),
}

impl From<u8> for DeviceAddress {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Broadcast,
            0x10 => Self::Usb,
            0x80 => Self::TbsCorePnpPro,
            0x8A => Self::Reserved1,
            0xC0 => Self::CurrentSensor,
            0xC2 => Self::Gps,
            0xC4 => Self::TbsBlackbox,
            0xC8 => Self::FlightController,
            0xCA => Self::Reserved2,
            0xCC => Self::RaceTag,
            0xEA => Self::RadioTransmitter,
            0xEC => Self::Receiver,
            0xEE => Self::Transmitter,
            other => Self::Unknown(other),
        }
    }
}

impl From<DeviceAddress> for u8 {
    fn from(address: DeviceAddress) -> Self {
        match address {
            DeviceAddress::Broadcast => 0x00,
            DeviceAddress::Usb => 0x10,
            DeviceAddress::TbsCorePnpPro => 0x80,
            DeviceAddress::Reserved1 => 0x8A,
            DeviceAddress::CurrentSensor => 0xC0,
            DeviceAddress::Gps => 0xC2,
            DeviceAddress::TbsBlackbox => 0xC4,
            DeviceAddress::FlightController => 0xC8,
            DeviceAddress::Reserved2 => 0xCA,
            DeviceAddress::RaceTag => 0xCC,
            DeviceAddress::RadioTransmitter => 0xEA,
            DeviceAddress::Receiver => 0xEC,
            DeviceAddress::Transmitter => 0xEE,
            DeviceAddress::Unknown(other) => other,
        }
    }
}

/// Frame types interpreted by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Gps = 0x02,
    BatterySensor = 0x08,
    LinkStatistics = 0x14,
    RcChannelsPacked = 0x16,
    Attitude = 0x1E,
    FlightMode = 0x21,
    // Extended header frames, range 0x28..=0x96
    DevicePing = 0x28,
    DeviceInfo = 0x29,
    ParameterSettingsEntry = 0x2B,
    ParameterRead = 0x2C,
    ParameterWrite = 0x2D,
    Command = 0x32,
    MspRequest = 0x7A,
    MspResponse = 0x7B,
    MspWrite = 0x7C,
}

impl FrameType {
    /// Whether frames of this type carry the extended header
    pub fn is_extended(self) -> bool {
        is_extended_type(self as u8)
    }
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x02 => Self::Gps,
            0x08 => Self::BatterySensor,
            0x14 => Self::LinkStatistics,
            0x16 => Self::RcChannelsPacked,
            0x1E => Self::Attitude,
            0x21 => Self::FlightMode,
            0x28 => Self::DevicePing,
            0x29 => Self::DeviceInfo,
            0x2B => Self::ParameterSettingsEntry,
            0x2C => Self::ParameterRead,
            0x2D => Self::ParameterWrite,
            0x32 => Self::Command,
            0x7A => Self::MspRequest,
            0x7B => Self::MspResponse,
            0x7C => Self::MspWrite,
            other => return Err(FrameError::UnknownType(other)),
        })
    }
}

/// Uplink transmit power as reported in link statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPower {
    P0,
    P10,
    P25,
    P100,
    P500,
    P1000,
    P2000,
    P250,
    P50,
}

impl TxPower {
    /// Decode the raw link statistics enum value
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::P0,
            1 => Self::P10,
            2 => Self::P25,
            3 => Self::P100,
            4 => Self::P500,
            5 => Self::P1000,
            6 => Self::P2000,
            7 => Self::P250,
            8 => Self::P50,
            _ => return None,
        })
    }

    /// Transmit power in milliwatts
    pub fn milliwatts(self) -> u16 {
        match self {
            Self::P0 => 0,
            Self::P10 => 10,
            Self::P25 => 25,
            Self::P50 => 50,
            Self::P100 => 100,
            Self::P250 => 250,
            Self::P500 => 500,
            Self::P1000 => 1000,
            Self::P2000 => 2000,
        }
    }
}

/// Link statistics telemetry data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LinkStatistics {
    /// Uplink RSSI (antenna 1) in -dBm
    pub uplink_rssi_1: u8,

    /// Uplink RSSI (antenna 2) in -dBm (diversity)
    pub uplink_rssi_2: u8,

    /// Uplink link quality (0-100%)
    pub uplink_lq: u8,

    /// Uplink SNR in dB
    pub uplink_snr: i8,

    /// Active antenna (0 or 1)
    pub active_antenna: u8,

    /// RF mode / packet rate
    pub rf_mode: u8,

    /// Uplink TX power (encoded, see [`TxPower`])
    pub uplink_tx_power: u8,

    /// Downlink RSSI in -dBm
    pub downlink_rssi: u8,

    /// Downlink link quality (0-100%)
    pub downlink_lq: u8,

    /// Downlink SNR in dB
    pub downlink_snr: i8,
}

impl LinkStatistics {
    /// Decoded uplink transmit power, if the raw value is known
    pub fn tx_power(&self) -> Option<TxPower> {
        TxPower::from_raw(self.uplink_tx_power)
    }
}

/// Battery sensor telemetry data (raw wire units)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatterySensor {
    /// Voltage in 0.1 V
    pub voltage: u16,

    /// Current in 0.1 A
    pub current: u16,

    /// Capacity used in mAh (24 bits on the wire)
    pub capacity_used: u32,

    /// Battery remaining percentage (0-100%)
    pub remaining_percent: u8,
}

impl BatterySensor {
    pub fn voltage_volts(&self) -> f32 {
        f32::from(self.voltage) / 10.0
    }

    pub fn current_amps(&self) -> f32 {
        f32::from(self.current) / 10.0
    }
}

/// GPS telemetry data (raw wire units)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpsData {
    /// Latitude in degrees × 10^7
    pub latitude: i32,

    /// Longitude in degrees × 10^7
    pub longitude: i32,

    /// Ground speed in km/h × 10
    pub ground_speed: u16,

    /// Heading in degrees × 100
    pub heading: u16,

    /// Altitude in meters + 1000
    pub altitude: u16,

    /// Number of satellites
    pub satellites: u8,
}

impl GpsData {
    pub fn latitude_deg(&self) -> f64 {
        f64::from(self.latitude) / 10_000_000.0
    }

    pub fn longitude_deg(&self) -> f64 {
        f64::from(self.longitude) / 10_000_000.0
    }

    pub fn ground_speed_kmh(&self) -> f32 {
        f32::from(self.ground_speed) / 10.0
    }

    pub fn heading_deg(&self) -> f32 {
        f32::from(self.heading) / 100.0
    }

    pub fn altitude_m(&self) -> i32 {
        i32::from(self.altitude) - 1000
    }
}

/// Attitude telemetry in radians × 10000
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attitude {
    pub pitch: i16,
    pub roll: i16,
    pub yaw: i16,
}

/// Device metadata, sent in response to a device ping
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub name: String,
    pub serial_number: u32,
    pub hardware_id: u32,
    pub firmware_id: u32,
    pub parameter_count: u8,
    pub parameter_version: u8,
}

/// One chunk of a parameter settings entry
///
/// The entry body is kept opaque; interpreting the settings UI is up to
/// the host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParameterEntry {
    pub field_index: u8,
    pub chunks_remaining: u8,
    pub data: Vec<u8>,
}

/// Request for one chunk of a parameter entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParameterRead {
    pub field_index: u8,
    pub chunk_index: u8,
}

/// New value for a parameter
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParameterWrite {
    pub field_index: u8,
    pub value: Vec<u8>,
}

/// Device command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    pub command_id: u8,
    pub data: Vec<u8>,
}

/// Typed frame payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    Gps(GpsData),
    BatterySensor(BatterySensor),
    LinkStatistics(LinkStatistics),
    RcChannels(ChannelSet),
    Attitude(Attitude),
    FlightMode(String),
    DevicePing,
    DeviceInfo(DeviceInfo),
    ParameterSettingsEntry(ParameterEntry),
    ParameterRead(ParameterRead),
    ParameterWrite(ParameterWrite),
    Command(Command),
    /// MSP request chunk, opaque
    MspRequest(Vec<u8>),
    /// MSP response chunk, opaque
    MspResponse(Vec<u8>),
    /// MSP write chunk, opaque
    MspWrite(Vec<u8>),
    /// Frame type the decoder does not interpret
    Opaque { frame_type: u8, data: Vec<u8> },
}

impl FramePayload {
    /// Frame type byte for this payload
    pub fn frame_type(&self) -> u8 {
        let known = match self {
            Self::Gps(_) => FrameType::Gps,
            Self::BatterySensor(_) => FrameType::BatterySensor,
            Self::LinkStatistics(_) => FrameType::LinkStatistics,
            Self::RcChannels(_) => FrameType::RcChannelsPacked,
            Self::Attitude(_) => FrameType::Attitude,
            Self::FlightMode(_) => FrameType::FlightMode,
            Self::DevicePing => FrameType::DevicePing,
            Self::DeviceInfo(_) => FrameType::DeviceInfo,
            Self::ParameterSettingsEntry(_) => FrameType::ParameterSettingsEntry,
            Self::ParameterRead(_) => FrameType::ParameterRead,
            Self::ParameterWrite(_) => FrameType::ParameterWrite,
            Self::Command(_) => FrameType::Command,
            Self::MspRequest(_) => FrameType::MspRequest,
            Self::MspResponse(_) => FrameType::MspResponse,
            Self::MspWrite(_) => FrameType::MspWrite,
            Self::Opaque { frame_type, .. } => return *frame_type,
        };
        known as u8
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Self::Opaque { .. })
    }
}

/// Extended header addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedHeader {
    pub dest: DeviceAddress,
    pub origin: DeviceAddress,
}

/// CRSF frame structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Address byte at offset 0 (the sync byte)
    pub address: DeviceAddress,

    /// Present iff the frame type is in the extended range
    pub extended: Option<ExtendedHeader>,

    /// Payload data
    pub payload: FramePayload,
}

impl Frame {
    /// Create a frame without extended header
    pub fn new(address: DeviceAddress, payload: FramePayload) -> Self {
        Self {
            address,
            extended: None,
            payload,
        }
    }

    /// Create an extended-header frame
    pub fn extended(
        address: DeviceAddress,
        dest: DeviceAddress,
        origin: DeviceAddress,
        payload: FramePayload,
    ) -> Self {
        Self {
            address,
            extended: Some(ExtendedHeader { dest, origin }),
            payload,
        }
    }

    /// Frame type byte
    pub fn frame_type(&self) -> u8 {
        self.payload.frame_type()
    }
}
