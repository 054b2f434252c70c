//! The FIT CRC-16 checksum
//!
//! Garmin's variant of CRC-16 folds each byte into the running sum one nibble
//! at a time through a 16-entry table.  A FIT file's trailing CRC is chosen so
//! that the checksum over the whole file, CRC included, comes out to zero, and
//! the same holds for a 14-byte file header and its embedded CRC.

static CRC_TABLE: [u16; 16] = [
    0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401, 0xA001, 0x6C00, 0x7800, 0xB401,
    0x5000, 0x9C01, 0x8801, 0x4400,
];

/// Fold a single byte into a running CRC value.
pub fn update(crc: u16, byte: u8) -> u16 {
    // Checksum lower four bits
    let mut sum = (crc >> 4) ^ CRC_TABLE[(crc & 0x0F) as usize] ^ CRC_TABLE[(byte & 0x0F) as usize];

    // Checksum upper four bits
    sum = (sum >> 4) ^ CRC_TABLE[(sum & 0x0F) as usize] ^ CRC_TABLE[(byte >> 4) as usize];
    sum
}

/// Compute the CRC of a buffer, starting from zero.
pub fn compute(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |acc, b| update(acc, *b))
}

/// A running FIT CRC accumulator.
#[derive(Clone, Copy, Default, Debug)]
pub struct Crc {
    sum: u16,
}

impl Crc {
    pub fn new() -> Self {
        // Garmin's docs don't say so explicitly, but the starting value is zero.
        Self { sum: 0 }
    }

    pub fn add_byte(&mut self, byte: u8) {
        self.sum = update(self.sum, byte);
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.add_byte(*byte);
        }
    }

    pub fn sum(&self) -> u16 {
        self.sum
    }
}
