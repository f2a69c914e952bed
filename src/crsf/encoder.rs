//! # CRSF Frame Encoder
//!
//! Serializes [`Frame`] values to wire bytes and builds the outbound RC
//! channels and link statistics frames.
//!
//! `parse_frame(&serialize_frame(&f)?)` reproduces `f` for every frame the
//! decoder can produce.

use bytes::BufMut;

use super::channels::ChannelSet;
use super::crc::{crc8, crc8_update};
use super::protocol::*;
use crate::error::FrameError;

/// Length of an RC channels frame on the wire
pub const CRSF_RC_CHANNELS_FRAME_LEN: usize =
    CRSF_FRAME_NOT_COUNTED_BYTES + 1 + CRSF_RC_CHANNELS_PAYLOAD_SIZE + 1;

/// Length of a link statistics frame on the wire
pub const CRSF_LINK_STATS_FRAME_LEN: usize =
    CRSF_FRAME_NOT_COUNTED_BYTES + 1 + CRSF_LINK_STATS_PAYLOAD_SIZE + 1;

/// Encode RC channels into a complete frame addressed to the flight controller
///
/// # Returns
///
/// * `Vec<u8>` - 26 bytes: address + frame_size + type + 22-byte payload + crc
///
/// # Examples
///
/// ```
/// use crsf_link::crsf::channels::ChannelSet;
/// use crsf_link::crsf::encoder::build_rc_frame;
///
/// let frame = build_rc_frame(&ChannelSet::centered());
/// assert_eq!(frame.len(), 26);
/// assert_eq!(&frame[..3], &[0xC8, 0x18, 0x16]);
/// assert_eq!(frame[25], 0xAD);
/// ```
pub fn build_rc_frame(channels: &ChannelSet) -> Vec<u8> {
    build_rc_frame_to(DeviceAddress::FlightController, channels)
}

/// Encode RC channels into a complete frame for `address`
pub fn build_rc_frame_to(address: DeviceAddress, channels: &ChannelSet) -> Vec<u8> {
    build_fixed_frame(address, FrameType::RcChannelsPacked, &channels.encode())
}

/// Encode link statistics into a complete frame addressed to the flight controller
pub fn build_link_stats_frame(stats: &LinkStatistics) -> Vec<u8> {
    build_link_stats_frame_to(DeviceAddress::FlightController, stats)
}

/// Encode link statistics into a complete frame for `address`
pub fn build_link_stats_frame_to(address: DeviceAddress, stats: &LinkStatistics) -> Vec<u8> {
    build_fixed_frame(address, FrameType::LinkStatistics, &encode_link_statistics(stats))
}

/// Frame a fixed-size, non-extended payload
///
/// Payloads here are far below the 60-byte limit so this cannot fail.
fn build_fixed_frame(address: DeviceAddress, frame_type: FrameType, payload: &[u8]) -> Vec<u8> {
    let type_byte = frame_type as u8;
    let mut frame: Vec<u8> = Vec::with_capacity(CRSF_FRAME_NOT_COUNTED_BYTES + payload.len() + 2);
    frame.put_u8(address.into());
    frame.put_u8((payload.len() + 2) as u8); // type + payload + crc
    frame.put_u8(type_byte);
    frame.put_slice(payload);
    frame.put_u8(crc8_update(crc8(&[type_byte]), payload));
    frame
}

/// Serialize a frame to wire bytes
///
/// # Errors
///
/// * [`FrameError::ExtendedHeaderMismatch`] - extended header present on a
///   regular type or missing on an extended one
/// * [`FrameError::SizeOutOfRange`] - resulting `frame_size` outside `3..=62`
/// * [`FrameError::MalformedPayload`] - a string field contains NUL, or an
///   opaque payload carries a type the decoder interprets
pub fn serialize_frame(frame: &Frame) -> Result<Vec<u8>, FrameError> {
    let frame_type = frame.frame_type();
    if frame.extended.is_some() != is_extended_type(frame_type) {
        return Err(FrameError::ExtendedHeaderMismatch { frame_type });
    }
    check_payload(&frame.payload)?;

    let mut body: Vec<u8> = Vec::with_capacity(CRSF_MAX_FRAME_LEN);
    body.put_u8(frame_type);
    if let Some(header) = frame.extended {
        body.put_u8(header.dest.into());
        body.put_u8(header.origin.into());
    }
    encode_payload(&frame.payload, &mut body);

    let frame_size = body.len() + 1;
    let accepted = usize::from(CRSF_MIN_FRAME_SIZE)..=usize::from(CRSF_MAX_FRAME_SIZE);
    if !accepted.contains(&frame_size) {
        return Err(FrameError::SizeOutOfRange {
            size: frame_size,
            min: CRSF_MIN_FRAME_SIZE,
            max: CRSF_MAX_FRAME_SIZE,
        });
    }

    let mut out: Vec<u8> = Vec::with_capacity(CRSF_FRAME_NOT_COUNTED_BYTES + frame_size);
    out.put_u8(frame.address.into());
    out.put_u8(frame_size as u8);
    out.put_slice(&body);
    out.put_u8(crc8(&body));
    Ok(out)
}

/// Serialize a frame into a caller-provided buffer
///
/// # Returns
///
/// * `Result<usize>` - Number of bytes written
///
/// # Errors
///
/// Same as [`serialize_frame`], plus [`FrameError::BufferTooSmall`] when
/// `out` cannot hold the frame.
pub fn serialize_frame_into(frame: &Frame, out: &mut [u8]) -> Result<usize, FrameError> {
    let bytes = serialize_frame(frame)?;
    let capacity = out.len();
    let target = out
        .get_mut(..bytes.len())
        .ok_or(FrameError::BufferTooSmall {
            needed: bytes.len(),
            capacity,
        })?;
    target.copy_from_slice(&bytes);
    Ok(bytes.len())
}

/// Append the wire form of `payload` to `out`
pub fn encode_payload(payload: &FramePayload, out: &mut Vec<u8>) {
    match payload {
        FramePayload::Gps(gps) => encode_gps(gps, out),
        FramePayload::BatterySensor(battery) => encode_battery_sensor(battery, out),
        FramePayload::LinkStatistics(stats) => out.put_slice(&encode_link_statistics(stats)),
        FramePayload::RcChannels(channels) => out.put_slice(&channels.encode()),
        FramePayload::Attitude(attitude) => {
            out.put_i16(attitude.pitch);
            out.put_i16(attitude.roll);
            out.put_i16(attitude.yaw);
        }
        FramePayload::FlightMode(mode) => put_c_string(out, mode),
        FramePayload::DevicePing => {}
        FramePayload::DeviceInfo(info) => {
            put_c_string(out, &info.name);
            out.put_u32(info.serial_number);
            out.put_u32(info.hardware_id);
            out.put_u32(info.firmware_id);
            out.put_u8(info.parameter_count);
            out.put_u8(info.parameter_version);
        }
        FramePayload::ParameterSettingsEntry(entry) => {
            out.put_u8(entry.field_index);
            out.put_u8(entry.chunks_remaining);
            out.put_slice(&entry.data);
        }
        FramePayload::ParameterRead(read) => {
            out.put_u8(read.field_index);
            out.put_u8(read.chunk_index);
        }
        FramePayload::ParameterWrite(write) => {
            out.put_u8(write.field_index);
            out.put_slice(&write.value);
        }
        FramePayload::Command(command) => {
            out.put_u8(command.command_id);
            out.put_slice(&command.data);
        }
        FramePayload::MspRequest(data)
        | FramePayload::MspResponse(data)
        | FramePayload::MspWrite(data)
        | FramePayload::Opaque { data, .. } => out.put_slice(data),
    }
}

/// Reject payloads that would not parse back to the same value
fn check_payload(payload: &FramePayload) -> Result<(), FrameError> {
    let (frame_type, text) = match payload {
        FramePayload::FlightMode(mode) => (FrameType::FlightMode, mode.as_str()),
        FramePayload::DeviceInfo(info) => (FrameType::DeviceInfo, info.name.as_str()),
        FramePayload::Opaque { frame_type, .. } => {
            return match FrameType::try_from(*frame_type) {
                Ok(known) => Err(FrameError::MalformedPayload { frame_type: known }),
                Err(_) => Ok(()),
            };
        }
        _ => return Ok(()),
    };
    if text.contains('\0') {
        return Err(FrameError::MalformedPayload { frame_type });
    }
    Ok(())
}

fn put_c_string(out: &mut Vec<u8>, text: &str) {
    out.put_slice(text.as_bytes());
    out.put_u8(0);
}

/// Encode link statistics payload (10 bytes, no padding)
pub fn encode_link_statistics(stats: &LinkStatistics) -> [u8; CRSF_LINK_STATS_PAYLOAD_SIZE] {
    [
        stats.uplink_rssi_1,
        stats.uplink_rssi_2,
        stats.uplink_lq,
        stats.uplink_snr as u8,
        stats.active_antenna,
        stats.rf_mode,
        stats.uplink_tx_power,
        stats.downlink_rssi,
        stats.downlink_lq,
        stats.downlink_snr as u8,
    ]
}

fn encode_battery_sensor(battery: &BatterySensor, out: &mut Vec<u8>) {
    out.put_u16(battery.voltage);
    out.put_u16(battery.current);
    out.put_uint(u64::from(battery.capacity_used & 0x00FF_FFFF), 3);
    out.put_u8(battery.remaining_percent);
}

fn encode_gps(gps: &GpsData, out: &mut Vec<u8>) {
    out.put_i32(gps.latitude);
    out.put_i32(gps.longitude);
    out.put_u16(gps.ground_speed);
    out.put_u16(gps.heading);
    out.put_u16(gps.altitude);
    out.put_u8(gps.satellites);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crsf::decoder::parse_frame;

    fn sample_link_stats() -> LinkStatistics {
        LinkStatistics {
            uplink_rssi_1: 62,
            uplink_rssi_2: 70,
            uplink_lq: 100,
            uplink_snr: -3,
            active_antenna: 1,
            rf_mode: 5,
            uplink_tx_power: 3,
            downlink_rssi: 58,
            downlink_lq: 98,
            downlink_snr: 7,
        }
    }

    #[test]
    fn test_build_rc_frame_structure() {
        let frame = build_rc_frame(&ChannelSet::centered());

        assert_eq!(frame.len(), CRSF_RC_CHANNELS_FRAME_LEN);
        assert_eq!(frame[0], CRSF_SYNC_BYTE);
        assert_eq!(frame[1], 0x18); // 24 = type + 22 + crc
        assert_eq!(frame[2], FrameType::RcChannelsPacked as u8);
        assert_eq!(&frame[3..25], &ChannelSet::centered().encode());
        assert_eq!(frame[25], 0xAD);
    }

    #[test]
    fn test_build_rc_frame_to_address() {
        let frame = build_rc_frame_to(DeviceAddress::Transmitter, &ChannelSet::centered());

        assert_eq!(frame[0], 0xEE);
        // Address is not covered by the CRC
        assert_eq!(frame[25], 0xAD);
    }

    #[test]
    fn test_build_rc_frame_matches_serialize() {
        let channels = ChannelSet::from([
            172, 992, 1811, 0, 2047, 500, 1500, 1000, 188, 1795, 992, 992, 1, 2, 3, 4,
        ]);
        let frame = Frame::new(DeviceAddress::FlightController, FramePayload::RcChannels(channels));

        assert_eq!(build_rc_frame(&channels), serialize_frame(&frame).unwrap());
    }

    #[test]
    fn test_build_link_stats_frame() {
        let stats = sample_link_stats();
        let frame = build_link_stats_frame(&stats);

        assert_eq!(frame.len(), CRSF_LINK_STATS_FRAME_LEN);
        assert_eq!(frame[1], 12);
        assert_eq!(frame[2], FrameType::LinkStatistics as u8);
        assert_eq!(frame[6], 0xFD); // -3 as u8

        let decoded = parse_frame(&frame).unwrap();
        assert_eq!(decoded.payload, FramePayload::LinkStatistics(stats));
    }

    #[test]
    fn test_different_channels_different_crc() {
        let frame1 = build_rc_frame(&ChannelSet::splat(1000));
        let frame2 = build_rc_frame(&ChannelSet::splat(1500));

        assert_ne!(frame1[25], frame2[25]);
    }

    #[test]
    fn test_serialize_round_trips_typed_frames() {
        let frames = vec![
            Frame::new(
                DeviceAddress::FlightController,
                FramePayload::LinkStatistics(sample_link_stats()),
            ),
            Frame::new(
                DeviceAddress::RadioTransmitter,
                FramePayload::Gps(GpsData {
                    latitude: -338_688_000,
                    longitude: 1_512_093_000,
                    ground_speed: 123,
                    heading: 27_000,
                    altitude: 1_050,
                    satellites: 9,
                }),
            ),
            Frame::new(
                DeviceAddress::RadioTransmitter,
                FramePayload::BatterySensor(BatterySensor {
                    voltage: 252,
                    current: 301,
                    capacity_used: 0x01_2345,
                    remaining_percent: 64,
                }),
            ),
            Frame::new(
                DeviceAddress::RadioTransmitter,
                FramePayload::Attitude(Attitude { pitch: -1200, roll: 640, yaw: -31415 }),
            ),
            Frame::new(
                DeviceAddress::RadioTransmitter,
                FramePayload::FlightMode("ANGL".to_string()),
            ),
            Frame::extended(
                DeviceAddress::Receiver,
                DeviceAddress::Broadcast,
                DeviceAddress::RadioTransmitter,
                FramePayload::DevicePing,
            ),
            Frame::extended(
                DeviceAddress::RadioTransmitter,
                DeviceAddress::RadioTransmitter,
                DeviceAddress::Receiver,
                FramePayload::DeviceInfo(DeviceInfo {
                    name: "ELRS RX".to_string(),
                    serial_number: 0x454C_5253,
                    hardware_id: 0,
                    firmware_id: 0x0003_0401,
                    parameter_count: 19,
                    parameter_version: 0,
                }),
            ),
            Frame::extended(
                DeviceAddress::RadioTransmitter,
                DeviceAddress::RadioTransmitter,
                DeviceAddress::Receiver,
                FramePayload::ParameterSettingsEntry(ParameterEntry {
                    field_index: 3,
                    chunks_remaining: 0,
                    data: vec![0x00, 0x09, b'R', b'a', b't', b'e', 0x00],
                }),
            ),
            Frame::extended(
                DeviceAddress::Receiver,
                DeviceAddress::Receiver,
                DeviceAddress::RadioTransmitter,
                FramePayload::ParameterRead(ParameterRead { field_index: 3, chunk_index: 1 }),
            ),
            Frame::extended(
                DeviceAddress::Receiver,
                DeviceAddress::Receiver,
                DeviceAddress::RadioTransmitter,
                FramePayload::Command(Command { command_id: 0x10, data: vec![0x01, 0x5A] }),
            ),
            Frame::extended(
                DeviceAddress::FlightController,
                DeviceAddress::FlightController,
                DeviceAddress::RadioTransmitter,
                FramePayload::MspWrite(vec![0x30, 0x01, 0x02, 0x03]),
            ),
            Frame::new(
                DeviceAddress::Unknown(0x42),
                FramePayload::Opaque { frame_type: 0x0B, data: vec![0x00, 0x01, 0x02] },
            ),
        ];

        for frame in frames {
            let raw = serialize_frame(&frame).unwrap();
            assert_eq!(parse_frame(&raw).as_ref(), Ok(&frame), "round trip of {:?}", frame);
            assert_eq!(serialize_frame(&parse_frame(&raw).unwrap()).unwrap(), raw);
        }
    }

    #[test]
    fn test_serialize_battery_masks_capacity_to_24_bits() {
        let frame = Frame::new(
            DeviceAddress::FlightController,
            FramePayload::BatterySensor(BatterySensor {
                capacity_used: 0xFF00_0001,
                ..Default::default()
            }),
        );
        let raw = serialize_frame(&frame).unwrap();
        assert_eq!(&raw[7..10], &[0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_serialize_extended_header_mismatch() {
        let missing = Frame::new(DeviceAddress::FlightController, FramePayload::DevicePing);
        assert_eq!(
            serialize_frame(&missing),
            Err(FrameError::ExtendedHeaderMismatch { frame_type: 0x28 })
        );

        let unexpected = Frame::extended(
            DeviceAddress::FlightController,
            DeviceAddress::FlightController,
            DeviceAddress::Receiver,
            FramePayload::RcChannels(ChannelSet::centered()),
        );
        assert_eq!(
            serialize_frame(&unexpected),
            Err(FrameError::ExtendedHeaderMismatch { frame_type: 0x16 })
        );
    }

    #[test]
    fn test_serialize_payload_too_large() {
        let frame = Frame::extended(
            DeviceAddress::FlightController,
            DeviceAddress::FlightController,
            DeviceAddress::RadioTransmitter,
            FramePayload::MspResponse(vec![0u8; 59]),
        );
        // type + 2 header + 59 payload + crc = 63
        assert_eq!(
            serialize_frame(&frame),
            Err(FrameError::SizeOutOfRange { size: 63, min: 3, max: 62 })
        );
    }

    #[test]
    fn test_serialize_payload_at_limit() {
        let frame = Frame::extended(
            DeviceAddress::FlightController,
            DeviceAddress::FlightController,
            DeviceAddress::RadioTransmitter,
            FramePayload::MspResponse(vec![0u8; 58]),
        );
        let raw = serialize_frame(&frame).unwrap();
        assert_eq!(raw.len(), CRSF_MAX_FRAME_LEN);
        assert_eq!(raw[1], CRSF_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_serialize_empty_regular_frame_rejected() {
        let frame = Frame::new(
            DeviceAddress::FlightController,
            FramePayload::Opaque { frame_type: 0x0B, data: vec![] },
        );
        assert!(matches!(serialize_frame(&frame), Err(FrameError::SizeOutOfRange { size: 2, .. })));
    }

    #[test]
    fn test_serialize_rejects_nul_in_flight_mode() {
        let frame = Frame::new(
            DeviceAddress::FlightController,
            FramePayload::FlightMode("AC\0RO".to_string()),
        );
        assert_eq!(
            serialize_frame(&frame),
            Err(FrameError::MalformedPayload { frame_type: FrameType::FlightMode })
        );
    }

    #[test]
    fn test_serialize_rejects_nul_in_device_name() {
        let frame = Frame::extended(
            DeviceAddress::RadioTransmitter,
            DeviceAddress::RadioTransmitter,
            DeviceAddress::Receiver,
            FramePayload::DeviceInfo(DeviceInfo {
                name: "ELRS\0RX".to_string(),
                serial_number: 1,
                hardware_id: 0,
                firmware_id: 0,
                parameter_count: 0,
                parameter_version: 0,
            }),
        );
        assert_eq!(
            serialize_frame(&frame),
            Err(FrameError::MalformedPayload { frame_type: FrameType::DeviceInfo })
        );
    }

    #[test]
    fn test_serialize_rejects_opaque_with_known_type() {
        let frame = Frame::new(
            DeviceAddress::FlightController,
            FramePayload::Opaque { frame_type: 0x14, data: vec![0; 10] },
        );
        assert_eq!(
            serialize_frame(&frame),
            Err(FrameError::MalformedPayload { frame_type: FrameType::LinkStatistics })
        );

        for frame_type in [0x02, 0x08, 0x16, 0x1E, 0x21] {
            let frame = Frame::new(
                DeviceAddress::FlightController,
                FramePayload::Opaque { frame_type, data: vec![0; 4] },
            );
            assert!(
                matches!(serialize_frame(&frame), Err(FrameError::MalformedPayload { .. })),
                "opaque type 0x{:02X}",
                frame_type
            );
        }
    }

    #[test]
    fn test_serialize_frame_into() {
        let frame = Frame::new(
            DeviceAddress::FlightController,
            FramePayload::RcChannels(ChannelSet::centered()),
        );

        let mut buf = [0u8; CRSF_MAX_FRAME_LEN];
        let written = serialize_frame_into(&frame, &mut buf).unwrap();
        assert_eq!(&buf[..written], build_rc_frame(&ChannelSet::centered()).as_slice());

        let mut small = [0u8; 16];
        assert_eq!(
            serialize_frame_into(&frame, &mut small),
            Err(FrameError::BufferTooSmall { needed: 26, capacity: 16 })
        );
    }
}
