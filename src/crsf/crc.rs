//! # CRC8 Engine
//!
//! CRC-8 checksum used by every CRSF frame (the DVB-S2 variant).
//!
//! **Polynomial**: 0xD5 (x^8 + x^7 + x^6 + x^4 + x^2 + 1), MSB first, not reflected
//! **Initial Value**: 0x00
//!
//! The checksum covers `type ‖ [dest, orig] ‖ payload`, never the address or
//! length bytes.

/// CRC-8-DVB-S2 polynomial
const CRC8_POLY: u8 = 0xD5;

/// Precomputed CRC8 lookup table
const CRC8_TABLE: [u8; 256] = generate_crc8_table();

/// Generate CRC8 lookup table at compile time
const fn generate_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate the CRSF CRC8 of a byte slice
///
/// An empty slice yields the seed value `0x00`.
///
/// # Examples
///
/// ```
/// use crsf_link::crsf::crc::crc8;
///
/// let mut data = vec![0x16];
/// data.extend_from_slice(&[0u8; 22]);
/// assert_eq!(crc8(&data), 0xEF);
/// ```
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |crc, &byte| CRC8_TABLE[(crc ^ byte) as usize])
}

/// Continue a CRC8 computation from a previous value
///
/// `crc8_update(crc8(a), b) == crc8(a ‖ b)`, which lets the encoder checksum
/// header and payload without concatenating them first.
pub fn crc8_update(crc: u8, data: &[u8]) -> u8 {
    data.iter().fold(crc, |crc, &byte| CRC8_TABLE[(crc ^ byte) as usize])
}

/// Bitwise CRC8 (slow, for verifying the lookup table)
#[cfg(test)]
fn crc8_slow(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;

    for &byte in data {
        crc ^= byte;

        for _ in 0..8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}
