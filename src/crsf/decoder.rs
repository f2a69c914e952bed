//! # CRSF Frame Decoder
//!
//! Parses one complete frame (address through CRC) into a [`Frame`].
//!
//! Validation order:
//!
//! 1. `frame_size` within `3..=max`
//! 2. buffer length equals `2 + frame_size`
//! 3. CRC over `type ‖ [dest, orig] ‖ payload`
//! 4. extended header present when the type is in `0x28..=0x96`
//! 5. payload layout for interpreted types
//!
//! Unknown frame types are not an error: their payload is kept opaque.

use bytes::Buf;
use tracing::trace;

use super::channels::ChannelSet;
use super::crc::crc8;
use super::protocol::*;
use crate::error::FrameError;

/// Decode a complete CRSF frame
///
/// # Arguments
///
/// * `raw` - Complete frame bytes (address, frame_size, type, payload, crc)
///
/// # Errors
///
/// Returns [`FrameError`] if the size is out of range, the length does not
/// match, the CRC check fails or a typed payload is malformed.
///
/// # Examples
///
/// ```
/// use crsf_link::crsf::channels::ChannelSet;
/// use crsf_link::crsf::decoder::parse_frame;
/// use crsf_link::crsf::encoder::build_rc_frame;
/// use crsf_link::crsf::protocol::FramePayload;
///
/// let raw = build_rc_frame(&ChannelSet::centered());
/// let frame = parse_frame(&raw).unwrap();
/// assert_eq!(frame.payload, FramePayload::RcChannels(ChannelSet::centered()));
/// ```
pub fn parse_frame(raw: &[u8]) -> Result<Frame, FrameError> {
    parse_frame_with_limit(raw, CRSF_MAX_FRAME_SIZE)
}

/// Decode a complete CRSF frame with a custom upper bound on `frame_size`
pub fn parse_frame_with_limit(raw: &[u8], max_frame_size: u8) -> Result<Frame, FrameError> {
    if raw.len() < CRSF_FRAME_NOT_COUNTED_BYTES {
        return Err(FrameError::TruncatedPayload {
            expected: CRSF_FRAME_NOT_COUNTED_BYTES,
            actual: raw.len(),
        });
    }

    let frame_size = raw[1];
    let max_frame_size = max_frame_size.min(CRSF_MAX_FRAME_SIZE);
    if !(CRSF_MIN_FRAME_SIZE..=max_frame_size).contains(&frame_size) {
        return Err(FrameError::SizeOutOfRange {
            size: frame_size as usize,
            min: CRSF_MIN_FRAME_SIZE,
            max: max_frame_size,
        });
    }

    let total = CRSF_FRAME_NOT_COUNTED_BYTES + frame_size as usize;
    if raw.len() != total {
        return Err(FrameError::TruncatedPayload {
            expected: total,
            actual: raw.len(),
        });
    }

    // type ‖ [ext header] ‖ payload
    let body = &raw[2..total - 1];
    let received = raw[total - 1];
    let computed = crc8(body);
    if computed != received {
        return Err(FrameError::CrcMismatch { computed, received });
    }

    let frame_type = body[0];
    let (extended, payload) = if is_extended_type(frame_type) {
        if body.len() < 1 + CRSF_EXT_HEADER_SIZE {
            return Err(FrameError::TruncatedPayload {
                expected: 1 + CRSF_EXT_HEADER_SIZE,
                actual: body.len(),
            });
        }
        let header = ExtendedHeader {
            dest: DeviceAddress::from(body[1]),
            origin: DeviceAddress::from(body[2]),
        };
        (Some(header), &body[1 + CRSF_EXT_HEADER_SIZE..])
    } else {
        (None, &body[1..])
    };

    let payload = match FrameType::try_from(frame_type) {
        Ok(known) => decode_payload(known, payload)?,
        Err(FrameError::UnknownType(frame_type)) => {
            trace!("Keeping unknown frame type 0x{:02X} as opaque", frame_type);
            FramePayload::Opaque {
                frame_type,
                data: payload.to_vec(),
            }
        }
        Err(other) => return Err(other),
    };

    Ok(Frame {
        address: DeviceAddress::from(raw[0]),
        extended,
        payload,
    })
}

/// Decode the payload of an interpreted frame type
pub fn decode_payload(frame_type: FrameType, payload: &[u8]) -> Result<FramePayload, FrameError> {
    Ok(match frame_type {
        FrameType::Gps => FramePayload::Gps(decode_gps(payload)?),
        FrameType::BatterySensor => FramePayload::BatterySensor(decode_battery_sensor(payload)?),
        FrameType::LinkStatistics => FramePayload::LinkStatistics(decode_link_statistics(payload)?),
        FrameType::RcChannelsPacked => FramePayload::RcChannels(decode_rc_channels(payload)?),
        FrameType::Attitude => FramePayload::Attitude(decode_attitude(payload)?),
        FrameType::FlightMode => FramePayload::FlightMode(decode_flight_mode(payload)?),
        FrameType::DevicePing => {
            expect_len(payload, 0)?;
            FramePayload::DevicePing
        }
        FrameType::DeviceInfo => FramePayload::DeviceInfo(decode_device_info(payload)?),
        FrameType::ParameterSettingsEntry => {
            let (&field_index, rest) = payload
                .split_first()
                .ok_or(FrameError::MalformedPayload { frame_type })?;
            let (&chunks_remaining, data) = rest
                .split_first()
                .ok_or(FrameError::MalformedPayload { frame_type })?;
            FramePayload::ParameterSettingsEntry(ParameterEntry {
                field_index,
                chunks_remaining,
                data: data.to_vec(),
            })
        }
        FrameType::ParameterRead => {
            expect_len(payload, 2)?;
            FramePayload::ParameterRead(ParameterRead {
                field_index: payload[0],
                chunk_index: payload[1],
            })
        }
        FrameType::ParameterWrite => {
            let (&field_index, value) = payload
                .split_first()
                .ok_or(FrameError::MalformedPayload { frame_type })?;
            FramePayload::ParameterWrite(ParameterWrite {
                field_index,
                value: value.to_vec(),
            })
        }
        FrameType::Command => {
            let (&command_id, data) = payload
                .split_first()
                .ok_or(FrameError::MalformedPayload { frame_type })?;
            FramePayload::Command(Command {
                command_id,
                data: data.to_vec(),
            })
        }
        FrameType::MspRequest => FramePayload::MspRequest(payload.to_vec()),
        FrameType::MspResponse => FramePayload::MspResponse(payload.to_vec()),
        FrameType::MspWrite => FramePayload::MspWrite(payload.to_vec()),
    })
}

fn expect_len(payload: &[u8], expected: usize) -> Result<(), FrameError> {
    if payload.len() != expected {
        return Err(FrameError::TruncatedPayload {
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

/// Decode RC channels payload (22 bytes)
pub fn decode_rc_channels(payload: &[u8]) -> Result<ChannelSet, FrameError> {
    let packed: &[u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE] =
        payload.try_into().map_err(|_| FrameError::TruncatedPayload {
            expected: CRSF_RC_CHANNELS_PAYLOAD_SIZE,
            actual: payload.len(),
        })?;
    Ok(ChannelSet::decode(packed))
}

/// Decode Link Statistics telemetry packet (10 bytes)
pub fn decode_link_statistics(payload: &[u8]) -> Result<LinkStatistics, FrameError> {
    expect_len(payload, CRSF_LINK_STATS_PAYLOAD_SIZE)?;

    Ok(LinkStatistics {
        uplink_rssi_1: payload[0],
        uplink_rssi_2: payload[1],
        uplink_lq: payload[2],
        uplink_snr: payload[3] as i8,
        active_antenna: payload[4],
        rf_mode: payload[5],
        uplink_tx_power: payload[6],
        downlink_rssi: payload[7],
        downlink_lq: payload[8],
        downlink_snr: payload[9] as i8,
    })
}

/// Decode Battery Sensor telemetry packet (8 bytes, big-endian)
pub fn decode_battery_sensor(payload: &[u8]) -> Result<BatterySensor, FrameError> {
    expect_len(payload, CRSF_BATTERY_SENSOR_PAYLOAD_SIZE)?;
    let mut buf = payload;

    Ok(BatterySensor {
        voltage: buf.get_u16(),
        current: buf.get_u16(),
        // 24-bit capacity
        capacity_used: buf.get_uint(3) as u32,
        remaining_percent: buf.get_u8(),
    })
}

/// Decode GPS telemetry packet (15 bytes, big-endian)
pub fn decode_gps(payload: &[u8]) -> Result<GpsData, FrameError> {
    expect_len(payload, CRSF_GPS_PAYLOAD_SIZE)?;
    let mut buf = payload;

    Ok(GpsData {
        latitude: buf.get_i32(),
        longitude: buf.get_i32(),
        ground_speed: buf.get_u16(),
        heading: buf.get_u16(),
        altitude: buf.get_u16(),
        satellites: buf.get_u8(),
    })
}

/// Decode Attitude telemetry packet (6 bytes, big-endian)
pub fn decode_attitude(payload: &[u8]) -> Result<Attitude, FrameError> {
    expect_len(payload, CRSF_ATTITUDE_PAYLOAD_SIZE)?;
    let mut buf = payload;

    Ok(Attitude {
        pitch: buf.get_i16(),
        roll: buf.get_i16(),
        yaw: buf.get_i16(),
    })
}

/// Split a NUL-terminated UTF-8 string off the front of `data`
fn take_c_string(data: &[u8], frame_type: FrameType) -> Result<(String, &[u8]), FrameError> {
    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or(FrameError::MalformedPayload { frame_type })?;
    let text = std::str::from_utf8(&data[..nul])
        .map_err(|_| FrameError::MalformedPayload { frame_type })?;
    Ok((text.to_owned(), &data[nul + 1..]))
}

/// Decode Flight Mode packet (NUL-terminated string)
pub fn decode_flight_mode(payload: &[u8]) -> Result<String, FrameError> {
    let (mode, rest) = take_c_string(payload, FrameType::FlightMode)?;
    if !rest.is_empty() {
        return Err(FrameError::MalformedPayload {
            frame_type: FrameType::FlightMode,
        });
    }
    Ok(mode)
}

/// Decode Device Info packet
pub fn decode_device_info(payload: &[u8]) -> Result<DeviceInfo, FrameError> {
    let (name, tail) = take_c_string(payload, FrameType::DeviceInfo)?;
    expect_len(tail, CRSF_DEVICE_INFO_TAIL_SIZE)?;
    let mut buf = tail;

    Ok(DeviceInfo {
        name,
        serial_number: buf.get_u32(),
        hardware_id: buf.get_u32(),
        firmware_id: buf.get_u32(),
        parameter_count: buf.get_u8(),
        parameter_version: buf.get_u8(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crsf::crc::crc8;
    use crate::crsf::encoder::build_rc_frame;

    /// Assemble raw frame bytes around `body` (type ‖ ext ‖ payload)
    fn raw_frame(address: u8, body: &[u8]) -> Vec<u8> {
        let mut raw = vec![address, (body.len() + 1) as u8];
        raw.extend_from_slice(body);
        raw.push(crc8(body));
        raw
    }

    #[test]
    fn test_decode_frame_too_short() {
        let result = parse_frame(&[CRSF_SYNC_BYTE]);
        assert!(matches!(result, Err(FrameError::TruncatedPayload { .. })));
    }

    #[test]
    fn test_decode_frame_size_out_of_range() {
        let result = parse_frame(&[CRSF_SYNC_BYTE, 0x02, 0x16, 0x00]);
        assert_eq!(
            result,
            Err(FrameError::SizeOutOfRange { size: 2, min: 3, max: 62 })
        );

        let result = parse_frame(&[CRSF_SYNC_BYTE, 63]);
        assert!(matches!(result, Err(FrameError::SizeOutOfRange { size: 63, .. })));
    }

    #[test]
    fn test_decode_frame_custom_limit() {
        let raw = build_rc_frame(&ChannelSet::centered());
        let result = parse_frame_with_limit(&raw, 20);
        assert!(matches!(result, Err(FrameError::SizeOutOfRange { size: 24, max: 20, .. })));
    }

    #[test]
    fn test_decode_frame_length_mismatch() {
        let mut raw = build_rc_frame(&ChannelSet::centered());
        raw.pop();
        assert_eq!(
            parse_frame(&raw),
            Err(FrameError::TruncatedPayload { expected: 26, actual: 25 })
        );
    }

    #[test]
    fn test_decode_valid_rc_channels_frame() {
        let raw = build_rc_frame(&ChannelSet::centered());

        let frame = parse_frame(&raw).unwrap();

        assert_eq!(frame.address, DeviceAddress::FlightController);
        assert_eq!(frame.extended, None);
        assert_eq!(frame.frame_type(), FrameType::RcChannelsPacked as u8);
        assert_eq!(frame.payload, FramePayload::RcChannels(ChannelSet::centered()));
    }

    #[test]
    fn test_decode_frame_crc_error() {
        let mut raw = build_rc_frame(&ChannelSet::centered());
        raw[25] ^= 0xFF;

        let result = parse_frame(&raw);
        assert_eq!(
            result,
            Err(FrameError::CrcMismatch { computed: 0xAD, received: 0xAD ^ 0xFF })
        );
    }

    #[test]
    fn test_decode_rc_channels_wrong_length() {
        let raw = raw_frame(CRSF_SYNC_BYTE, &[0x16, 0x00, 0x00, 0x00]);
        assert_eq!(
            parse_frame(&raw),
            Err(FrameError::TruncatedPayload { expected: 22, actual: 3 })
        );
    }

    #[test]
    fn test_decode_link_statistics() {
        let payload = vec![
            100u8, // uplink_rssi_1
            95,    // uplink_rssi_2
            80,    // uplink_lq (80%)
            0xF6,  // uplink_snr (-10)
            1,     // active_antenna
            4,     // rf_mode
            3,     // uplink_tx_power
            90,    // downlink_rssi
            85,    // downlink_lq
            12,    // downlink_snr
        ];

        let stats = decode_link_statistics(&payload).unwrap();
        assert_eq!(stats.uplink_rssi_1, 100);
        assert_eq!(stats.uplink_rssi_2, 95);
        assert_eq!(stats.uplink_lq, 80);
        assert_eq!(stats.uplink_snr, -10);
        assert_eq!(stats.active_antenna, 1);
        assert_eq!(stats.rf_mode, 4);
        assert_eq!(stats.downlink_rssi, 90);
        assert_eq!(stats.downlink_lq, 85);
        assert_eq!(stats.downlink_snr, 12);
    }

    #[test]
    fn test_decode_link_statistics_wrong_length() {
        assert!(decode_link_statistics(&[100u8; 5]).is_err());
        assert!(decode_link_statistics(&[100u8; 11]).is_err());
    }

    #[test]
    fn test_decode_battery_sensor() {
        let payload = vec![
            0x00, 0xA8, // Voltage: 168 dV = 16.8 V
            0x00, 0x7D, // Current: 125 dA = 12.5 A
            0x00, 0x03, 0xE8, // Capacity: 1000 mAh
            0x4B, // Remaining: 75%
        ];

        let battery = decode_battery_sensor(&payload).unwrap();
        assert_eq!(battery.voltage, 168);
        assert!((battery.voltage_volts() - 16.8).abs() < 0.01);
        assert!((battery.current_amps() - 12.5).abs() < 0.01);
        assert_eq!(battery.capacity_used, 1000);
        assert_eq!(battery.remaining_percent, 75);
    }

    #[test]
    fn test_decode_gps() {
        let lat_raw: i32 = 377_749_000;
        let lon_raw: i32 = -1_224_194_000;

        let mut payload = Vec::new();
        payload.extend_from_slice(&lat_raw.to_be_bytes());
        payload.extend_from_slice(&lon_raw.to_be_bytes());
        payload.extend_from_slice(&[0x00, 0xFF]); // 25.5 km/h
        payload.extend_from_slice(&[0x23, 0x28]); // 90.00°
        payload.extend_from_slice(&[0x04, 0x4C]); // 100 m
        payload.push(12);

        let gps = decode_gps(&payload).unwrap();
        assert_eq!(gps.latitude, lat_raw);
        assert_eq!(gps.longitude, lon_raw);
        assert_eq!(gps.ground_speed, 255);
        assert_eq!(gps.heading, 9000);
        assert_eq!(gps.altitude_m(), 100);
        assert_eq!(gps.satellites, 12);
    }

    #[test]
    fn test_decode_gps_too_short() {
        assert!(decode_gps(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_decode_attitude() {
        let attitude = decode_attitude(&[0xFF, 0x9C, 0x00, 0x64, 0x7A, 0xB7]).unwrap();
        assert_eq!(attitude.pitch, -100);
        assert_eq!(attitude.roll, 100);
        assert_eq!(attitude.yaw, 31415);
    }

    #[test]
    fn test_decode_flight_mode() {
        assert_eq!(decode_flight_mode(b"ACRO\0").unwrap(), "ACRO");
        assert_eq!(
            decode_flight_mode(b"ACRO"),
            Err(FrameError::MalformedPayload { frame_type: FrameType::FlightMode })
        );
        assert!(decode_flight_mode(b"AC\0RO\0").is_err());
    }

    #[test]
    fn test_decode_device_info() {
        let mut payload = b"ELRS RX\0".to_vec();
        payload.extend_from_slice(&0x454C_5253u32.to_be_bytes());
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(&0x0003_0401u32.to_be_bytes());
        payload.extend_from_slice(&[12, 1]);

        let info = decode_device_info(&payload).unwrap();
        assert_eq!(info.name, "ELRS RX");
        assert_eq!(info.serial_number, 0x454C_5253);
        assert_eq!(info.hardware_id, 1);
        assert_eq!(info.firmware_id, 0x0003_0401);
        assert_eq!(info.parameter_count, 12);
        assert_eq!(info.parameter_version, 1);
    }

    #[test]
    fn test_decode_extended_frame() {
        // Parameter write from the handset to the receiver
        let raw = raw_frame(0xEC, &[0x2D, 0xEC, 0xEA, 0x05, 0x01]);

        let frame = parse_frame(&raw).unwrap();
        assert_eq!(frame.address, DeviceAddress::Receiver);
        assert_eq!(
            frame.extended,
            Some(ExtendedHeader {
                dest: DeviceAddress::Receiver,
                origin: DeviceAddress::RadioTransmitter,
            })
        );
        assert_eq!(
            frame.payload,
            FramePayload::ParameterWrite(ParameterWrite { field_index: 5, value: vec![0x01] })
        );
    }

    #[test]
    fn test_decode_device_ping() {
        let raw = raw_frame(CRSF_SYNC_BYTE, &[0x28, 0x00, 0xEA]);

        let frame = parse_frame(&raw).unwrap();
        assert_eq!(frame.payload, FramePayload::DevicePing);
        assert_eq!(frame.extended.map(|h| h.dest), Some(DeviceAddress::Broadcast));
    }

    #[test]
    fn test_decode_extended_frame_missing_header() {
        // frame_size 3 leaves room for only one of the two header bytes
        let raw = raw_frame(CRSF_SYNC_BYTE, &[0x28, 0x00]);
        assert_eq!(
            parse_frame(&raw),
            Err(FrameError::TruncatedPayload { expected: 3, actual: 2 })
        );
    }

    #[test]
    fn test_decode_unknown_type_is_opaque() {
        let raw = raw_frame(CRSF_SYNC_BYTE, &[0x0B, 0xDE, 0xAD]);

        let frame = parse_frame(&raw).unwrap();
        assert_eq!(frame.extended, None);
        assert_eq!(
            frame.payload,
            FramePayload::Opaque { frame_type: 0x0B, data: vec![0xDE, 0xAD] }
        );
    }

    #[test]
    fn test_decode_unknown_extended_type_keeps_header() {
        let raw = raw_frame(CRSF_SYNC_BYTE, &[0x40, 0xC8, 0xEC, 0x01, 0x02]);

        let frame = parse_frame(&raw).unwrap();
        assert_eq!(
            frame.extended,
            Some(ExtendedHeader {
                dest: DeviceAddress::FlightController,
                origin: DeviceAddress::Receiver,
            })
        );
        assert_eq!(
            frame.payload,
            FramePayload::Opaque { frame_type: 0x40, data: vec![0x01, 0x02] }
        );
    }

    #[test]
    fn test_decode_msp_chunk_is_opaque_blob() {
        let raw = raw_frame(CRSF_SYNC_BYTE, &[0x7B, 0xEA, 0xC8, 0x31, 0x02, 0x65, 0x00]);

        let frame = parse_frame(&raw).unwrap();
        assert_eq!(frame.payload, FramePayload::MspResponse(vec![0x31, 0x02, 0x65, 0x00]));
    }
}
