//! Exports intended for testing use only.
//!
//! These need to be exported for access from the `devtools` binaries, but
//! they are not intended for use by external code.

use std::io::{self, Write};

use crate::crc;
use crate::definition::{Architecture, Definition, FieldDescriptor};
use crate::header::{FileHeader, ProtocolVersion};
use crate::profile::GlobalMessage;

/// Profile version written into generated headers.
pub const PROFILE_VERSION: u16 = 21158;

// 2023-07-14T12:00:00Z
const BASE_TIMESTAMP: u32 = 1_058_270_400;

const FILE_ID_LOCAL: u8 = 0;
const RECORD_LOCAL: u8 = 1;
const EVENT_LOCAL: u8 = 2;

/// Convert degrees to semicircles, rounding to the nearest.
pub fn degrees_to_semicircles(degrees: f64) -> i32 {
    (degrees * 2_147_483_648.0 / 180.0).round() as i32
}

/// Raw values for one `record` message.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TestPoint {
    pub timestamp: u32,
    pub latitude: i32,
    pub longitude: i32,
    pub altitude: u16,
    pub distance: u32,
    pub speed: u16,
    pub heart_rate: u8,
    pub temperature: i8,
}

impl TestPoint {
    /// A point `seconds` into a fixed activity.
    pub fn at_second(seconds: u32) -> Self {
        Self {
            timestamp: BASE_TIMESTAMP + seconds,
            latitude: 568_933_703 + seconds as i32 * 100,
            longitude: 1_402_806_806 - seconds as i32 * 100,
            altitude: 3400 + (seconds % 50) as u16,
            distance: seconds * 447,
            speed: 4470,
            heart_rate: 120 + (seconds % 60) as u8,
            temperature: 20,
        }
    }
}

enum Chunk {
    Definition(Definition),
    Raw(Vec<u8>),
}

impl Chunk {
    fn len(&self) -> usize {
        match self {
            Self::Definition(def) => def.definition_message_len(),
            Self::Raw(bytes) => bytes.len(),
        }
    }
}

/// Assembles FIT files from definitions and raw records.
///
/// Computes the declared data size and both CRCs, unless told to declare
/// something else.
pub struct FitFileBuilder {
    short_header: bool,
    architecture: Architecture,
    declared_data_size: Option<u32>,
    chunks: Vec<Chunk>,
    last_timestamp: u32,
}

impl Default for FitFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FitFileBuilder {
    pub fn new() -> Self {
        Self {
            short_header: false,
            architecture: Architecture::LittleEndian,
            declared_data_size: None,
            chunks: vec![],
            last_timestamp: BASE_TIMESTAMP,
        }
    }

    /// Write a 12-byte header without a CRC.
    pub fn short_header(self) -> Self {
        Self {
            short_header: true,
            ..self
        }
    }

    /// Byte order for the activity messages added after this call.
    pub fn with_architecture(self, architecture: Architecture) -> Self {
        Self {
            architecture,
            ..self
        }
    }

    /// Declare a data size other than the actual one.
    pub fn declare_data_size(self, data_size: u32) -> Self {
        Self {
            declared_data_size: Some(data_size),
            ..self
        }
    }

    pub fn add_definition(mut self, definition: Definition) -> Self {
        self.chunks.push(Chunk::Definition(definition));
        self
    }

    /// Append bytes to the record stream as-is.
    pub fn add_raw(mut self, bytes: &[u8]) -> Self {
        self.chunks.push(Chunk::Raw(bytes.to_vec()));
        self
    }

    /// Append a data record: its header byte and then `payload`.
    pub fn add_data(self, local_message_type: u8, payload: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(payload.len() + 1);
        bytes.push(local_message_type & 0x0F);
        bytes.extend_from_slice(payload);
        self.add_raw(&bytes)
    }

    fn u16_bytes(&self, v: u16) -> [u8; 2] {
        match self.architecture {
            Architecture::LittleEndian => v.to_le_bytes(),
            Architecture::BigEndian => v.to_be_bytes(),
        }
    }

    fn u32_bytes(&self, v: u32) -> [u8; 4] {
        match self.architecture {
            Architecture::LittleEndian => v.to_le_bytes(),
            Architecture::BigEndian => v.to_be_bytes(),
        }
    }

    /// Begin an activity: a file ID message followed by the definition used
    /// by [`Self::add_point`].
    pub fn start_activity(self) -> Self {
        let file_id = Definition::new(
            FILE_ID_LOCAL,
            GlobalMessage::FileId,
            self.architecture,
            vec![
                FieldDescriptor::new(0, 1, 0x00), // type
                FieldDescriptor::new(1, 2, 0x84), // manufacturer
                FieldDescriptor::new(2, 2, 0x84), // product
                FieldDescriptor::new(4, 4, 0x86), // time_created
                FieldDescriptor::new(3, 4, 0x8C), // serial_number
            ],
        );
        let mut payload = vec![4u8]; // activity
        payload.extend(self.u16_bytes(1)); // garmin
        payload.extend(self.u16_bytes(3121));
        payload.extend(self.u32_bytes(BASE_TIMESTAMP));
        payload.extend(self.u32_bytes(3_954_810_541));

        let record = Definition::new(
            RECORD_LOCAL,
            GlobalMessage::Record,
            self.architecture,
            vec![
                FieldDescriptor::new(253, 4, 0x86),
                FieldDescriptor::new(0, 4, 0x85),
                FieldDescriptor::new(1, 4, 0x85),
                FieldDescriptor::new(2, 2, 0x84),
                FieldDescriptor::new(5, 4, 0x86),
                FieldDescriptor::new(6, 2, 0x84),
                FieldDescriptor::new(3, 1, 0x02),
                FieldDescriptor::new(13, 1, 0x01),
            ],
        );

        self.add_definition(file_id)
            .add_data(FILE_ID_LOCAL, &payload)
            .add_definition(record)
    }

    /// Append a `record` message for a point.  Requires
    /// [`Self::start_activity`].
    pub fn add_point(mut self, point: &TestPoint) -> Self {
        let mut payload = Vec::with_capacity(22);
        payload.extend(self.u32_bytes(point.timestamp));
        payload.extend(self.u32_bytes(point.latitude as u32));
        payload.extend(self.u32_bytes(point.longitude as u32));
        payload.extend(self.u16_bytes(point.altitude));
        payload.extend(self.u32_bytes(point.distance));
        payload.extend(self.u16_bytes(point.speed));
        payload.push(point.heart_rate);
        payload.push(point.temperature as u8);
        self.last_timestamp = point.timestamp;
        self.add_data(RECORD_LOCAL, &payload)
    }

    /// End an activity with a timer stop event.
    pub fn finish_activity(self) -> Self {
        let event = Definition::new(
            EVENT_LOCAL,
            GlobalMessage::Event,
            self.architecture,
            vec![
                FieldDescriptor::new(253, 4, 0x86),
                FieldDescriptor::new(3, 4, 0x86),
                FieldDescriptor::new(0, 1, 0x00),
                FieldDescriptor::new(1, 1, 0x00),
                FieldDescriptor::new(4, 1, 0x02),
            ],
        );
        let mut payload = vec![];
        payload.extend(self.u32_bytes(self.last_timestamp));
        payload.extend(self.u32_bytes(0));
        payload.extend_from_slice(&[0, 4, 0]); // timer, stop_all, group 0
        self.add_definition(event).add_data(EVENT_LOCAL, &payload)
    }

    /// Total length of the record stream so far.
    pub fn data_size(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }

    /// Encode the file.
    pub fn build(&self) -> io::Result<Vec<u8>> {
        let data_size = match self.declared_data_size {
            Some(size) => size as usize,
            None => self.data_size(),
        };
        let mut header =
            FileHeader::new(ProtocolVersion::V10, PROFILE_VERSION, data_size).map_err(io::Error::other)?;
        if self.short_header {
            header = header.without_crc();
        }

        let mut buf = Vec::with_capacity(header.header_len() as usize + self.data_size() + 2);
        header.encode(&mut buf).map_err(io::Error::other)?;
        for chunk in &self.chunks {
            match chunk {
                Chunk::Definition(def) => def.encode(&mut buf)?,
                Chunk::Raw(bytes) => buf.write_all(bytes)?,
            }
        }
        let sum = crc::compute(&buf);
        buf.write_all(&sum.to_le_bytes())?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::{FitFileBuilder, TestPoint, degrees_to_semicircles};
    use crate::crc;

    #[test]
    fn test_activity_layout() -> Result<()> {
        let builder = FitFileBuilder::new()
            .start_activity()
            .add_point(&TestPoint::at_second(0))
            .finish_activity();
        // file ID definition and data, record definition and data, event
        // definition and data
        let expected = (6 + 15) + 14 + (6 + 24) + 23 + (6 + 15) + 12;
        assert_eq!(builder.data_size(), expected);

        let bytes = builder.build()?;
        assert_eq!(bytes.len(), 14 + expected + 2);
        assert_eq!(crc::compute(&bytes), 0);
        assert_eq!(crc::compute(&bytes[..14]), 0);
        Ok(())
    }

    #[test]
    fn test_degrees_to_semicircles() {
        assert_eq!(degrees_to_semicircles(0.0), 0);
        assert_eq!(degrees_to_semicircles(90.0), 1 << 30);
        assert_eq!(degrees_to_semicircles(-180.0), i32::MIN);
    }

    #[test]
    fn test_declared_size_override() -> Result<()> {
        let bytes = FitFileBuilder::new()
            .short_header()
            .add_raw(&[0x00])
            .declare_data_size(7)
            .build()?;
        assert_eq!(bytes.len(), 12 + 1 + 2);
        assert_eq!(bytes[4], 7);
        Ok(())
    }
}
