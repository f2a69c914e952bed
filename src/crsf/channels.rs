//! # RC Channel Codec
//!
//! Packs 16 unsigned 11-bit channel values into the 22-byte RC channels
//! payload and back, plus numeric helpers for mapping channel values to
//! microseconds, 10-bit integers, 3-bit switches and booleans.
//!
//! ## Value Ranges
//!
//! - Wire value: 0-2047 (11-bit)
//! - Nominal stick travel: 172-1811, center 992
//! - Equivalent pulse width: 988-2012 µs, center 1500 µs
//!
//! ## Bit Layout
//!
//! Channels are packed as one continuous bitstream, LSB first:
//!
//! ```text
//! Byte 0: Ch0[0:7]
//! Byte 1: Ch0[8:10] | Ch1[0:4]
//! Byte 2: Ch1[5:10] | Ch2[0:1]
//! ...
//! ```

use super::protocol::{CRSF_NUM_CHANNELS, CRSF_RC_CHANNELS_PAYLOAD_SIZE};

/// Bits per channel
pub const CRSF_CHANNEL_BITS: u32 = 11;

/// Mask applied to channel values before packing
pub const CRSF_CHANNEL_MASK: u16 = 0x07FF;

/// Largest value representable on the wire
pub const CRSF_CHANNEL_RAW_MAX: u16 = 2047;

/// Nominal channel range
pub const CRSF_CHANNEL_VALUE_MIN: u16 = 172;
pub const CRSF_CHANNEL_VALUE_MID: u16 = 992;
pub const CRSF_CHANNEL_VALUE_MAX: u16 = 1811;

/// Switch endpoint values
pub const CRSF_SWITCH_LOW: u16 = 188;
pub const CRSF_SWITCH_HIGH: u16 = 1795;

/// Pulse width range in microseconds
pub const US_MIN: u16 = 988;
pub const US_MAX: u16 = 2012;

/// 16 RC channel values, channel 0 first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ChannelSet(pub [u16; CRSF_NUM_CHANNELS]);

impl ChannelSet {
    /// All channels set to `value`
    pub const fn splat(value: u16) -> Self {
        Self([value; CRSF_NUM_CHANNELS])
    }

    /// All channels at the nominal center (992)
    pub const fn centered() -> Self {
        Self::splat(CRSF_CHANNEL_VALUE_MID)
    }

    /// Value of `channel`, `None` past the last channel
    pub fn get(&self, channel: usize) -> Option<u16> {
        self.0.get(channel).copied()
    }

    pub fn values(&self) -> &[u16; CRSF_NUM_CHANNELS] {
        &self.0
    }

    /// Indices of the channels whose value differs from `previous`
    pub fn changed<'a>(&'a self, previous: &'a ChannelSet) -> impl Iterator<Item = usize> + 'a {
        self.0
            .iter()
            .zip(previous.0.iter())
            .enumerate()
            .filter(|(_, (now, before))| now != before)
            .map(|(index, _)| index)
    }

    pub fn encode(&self) -> [u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE] {
        encode_channels(self)
    }

    pub fn decode(payload: &[u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE]) -> Self {
        decode_channels(payload)
    }
}

impl From<[u16; CRSF_NUM_CHANNELS]> for ChannelSet {
    fn from(values: [u16; CRSF_NUM_CHANNELS]) -> Self {
        Self(values)
    }
}

/// Pack 16 channels into the 22-byte payload
///
/// Values are masked to 11 bits, so out-of-range input is truncated
/// (`2048` packs as `0`), the same as an 11-bit field assignment.
///
/// # Examples
///
/// ```
/// use crsf_link::crsf::channels::{encode_channels, ChannelSet};
///
/// let payload = encode_channels(&ChannelSet::splat(2047));
/// assert_eq!(payload, [0xFF; 22]);
/// ```
pub fn encode_channels(channels: &ChannelSet) -> [u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE] {
    let mut payload = [0u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE];
    let mut out = payload.iter_mut();
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;

    for &value in channels.0.iter() {
        acc |= u32::from(value & CRSF_CHANNEL_MASK) << bits;
        bits += CRSF_CHANNEL_BITS;

        while bits >= 8 {
            if let Some(byte) = out.next() {
                *byte = acc as u8;
            }
            acc >>= 8;
            bits -= 8;
        }
    }

    payload
}

/// Unpack the 22-byte payload into 16 channels
pub fn decode_channels(payload: &[u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE]) -> ChannelSet {
    let mut channels = [0u16; CRSF_NUM_CHANNELS];
    let mut out = channels.iter_mut();
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;

    for &byte in payload.iter() {
        acc |= u32::from(byte) << bits;
        bits += 8;

        if bits >= CRSF_CHANNEL_BITS {
            if let Some(channel) = out.next() {
                *channel = (acc as u16) & CRSF_CHANNEL_MASK;
            }
            acc >>= CRSF_CHANNEL_BITS;
            bits -= CRSF_CHANNEL_BITS;
        }
    }

    ChannelSet(channels)
}

/// Linear map with round-half-away-from-zero, saturating into `u16`
fn map_round(value: u16, in_min: u16, in_max: u16, out_min: u16, out_max: u16) -> u16 {
    let scaled = (f64::from(value) - f64::from(in_min)) * (f64::from(out_max) - f64::from(out_min))
        / (f64::from(in_max) - f64::from(in_min));
    // `as` saturates for floats
    (scaled + f64::from(out_min)).round() as u16
}

/// Channel value to pulse width, `172..=1811` → `988..=2012` µs
///
/// # Examples
///
/// ```
/// use crsf_link::crsf::channels::crsf_to_microseconds;
///
/// assert_eq!(crsf_to_microseconds(172), 988);
/// assert_eq!(crsf_to_microseconds(992), 1500);
/// assert_eq!(crsf_to_microseconds(1811), 2012);
/// ```
pub fn crsf_to_microseconds(value: u16) -> u16 {
    map_round(value, CRSF_CHANNEL_VALUE_MIN, CRSF_CHANNEL_VALUE_MAX, US_MIN, US_MAX)
}

/// 10-bit integer to channel value, `0..=1024` → `172..=1811`
pub fn uint10_to_crsf(value: u16) -> u16 {
    map_round(value, 0, 1024, CRSF_CHANNEL_VALUE_MIN, CRSF_CHANNEL_VALUE_MAX)
}

/// Channel value to 10-bit integer, `172..=1811` → `0..=1023`
///
/// Values below 172 saturate to 0.
pub fn crsf_to_uint10(value: u16) -> u16 {
    map_round(value, CRSF_CHANNEL_VALUE_MIN, CRSF_CHANNEL_VALUE_MAX, 0, 1023)
}

/// 3-bit switch position to channel value, `0..=7` → `188..=1795`
///
/// Positions above 7 are clamped to 7.
pub fn switch3_to_crsf(position: u16) -> u16 {
    map_round(position.min(7), 0, 7, CRSF_SWITCH_LOW, CRSF_SWITCH_HIGH)
}

/// Boolean to switch channel value
pub fn bit_to_crsf(on: bool) -> u16 {
    if on {
        CRSF_SWITCH_HIGH
    } else {
        CRSF_SWITCH_LOW
    }
}

/// Switch channel value to boolean (high above 1000)
pub fn crsf_to_bit(value: u16) -> bool {
    value > 1000
}
