//! Whole-file decoding
//!
//! [`FitDecoder`] owns one decode pass over a FIT file: it validates the
//! header and the file CRC up front, then hands out the file's messages or
//! the points decoded from its `record` messages.

use std::collections::HashMap;
use std::io::{Read, Seek};

use tracing::{debug, info};

use crate::crc::Crc;
use crate::cursor::MessageCursor;
use crate::error::{FitDecodeError, Result};
use crate::header::FileHeader;
use crate::point::DecodedPoint;
use crate::profile::GlobalMessage;
use crate::stream::{MessageContent, RecordStream, TRAILING_CRC_LEN};

/// Default ceiling on the declared payload size.
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 256 * 1024 * 1024;

const CRC_CHUNK_SIZE: usize = 8192;

/// Options for decoding a FIT file
///
/// The defaults accept any well-formed file up to 256 MiB of records.
#[derive(Clone, Copy, Debug)]
pub struct DecodeOptions {
    pub max_fields: usize,
    pub max_payload_size: u32,
}

impl DecodeOptions {
    /// Set the most fields a single definition may declare.
    pub fn with_max_fields(self, max_fields: usize) -> Self {
        Self { max_fields, ..self }
    }

    /// Set the largest declared payload size to accept.
    pub fn with_max_payload_size(self, max_payload_size: u32) -> Self {
        Self {
            max_payload_size,
            ..self
        }
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_fields: u8::MAX as usize,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

/// Message counts for one global message type.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct MessageCounts {
    pub definitions: usize,
    pub data: usize,
}

/// The result of checking a FIT file.
#[derive(Clone, Debug)]
pub struct FileSummary {
    pub header: FileHeader,
    pub messages: usize,
    pub points: usize,
    pub counts: HashMap<GlobalMessage, MessageCounts>,
}

impl FileSummary {
    /// Per-message counts ordered by global message number.
    pub fn sorted_counts(&self) -> Vec<(GlobalMessage, MessageCounts)> {
        let mut counts = self
            .counts
            .iter()
            .map(|(m, c)| (*m, *c))
            .collect::<Vec<_>>();
        counts.sort_by_key(|(m, _)| m.id());
        counts
    }
}

/// Checksum the whole stream, which must sum to zero.
///
/// Files chained one after another also sum to zero, since each ends with
/// its own CRC.
fn verify_file_crc<R: Read + Seek>(cursor: &mut MessageCursor<R>) -> Result<()> {
    cursor.rewind()?;
    let mut crc = Crc::new();
    let mut buf = [0u8; CRC_CHUNK_SIZE];
    loop {
        let n = match cursor.get_mut().read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        crc.add_bytes(&buf[..n]);
    }
    match crc.sum() {
        0 => Ok(()),
        sum => Err(FitDecodeError::FileCrc(sum)),
    }
}

/// A validated FIT file, ready to be walked message by message.
pub struct FitDecoder<R> {
    header: FileHeader,
    header_bytes: Vec<u8>,
    stream: RecordStream<R>,
}

impl<R: Read + Seek> FitDecoder<R> {
    pub fn new(input: R) -> Result<Self> {
        Self::with_options(input, DecodeOptions::default())
    }

    /// Validate the file header and file CRC, leaving the decoder positioned
    /// at the first record.
    #[tracing::instrument(name = "open_fit", level = "debug", skip_all)]
    pub fn with_options(input: R, options: DecodeOptions) -> Result<Self> {
        let mut cursor = MessageCursor::new(input);
        cursor.rewind()?;
        let header = FileHeader::read(cursor.get_mut())?;
        if header.data_size() > options.max_payload_size {
            return Err(FitDecodeError::PayloadTooLarge {
                declared: header.data_size(),
                limit: options.max_payload_size,
            });
        }

        let header_len = header.header_len() as u64;
        let expected_len = header_len + header.data_size() as u64 + TRAILING_CRC_LEN;
        let actual_len = cursor.stream_len()?;
        if actual_len < expected_len {
            debug!(
                "File is {} bytes, header declares {}",
                actual_len, expected_len
            );
        }
        verify_file_crc(&mut cursor)?;
        debug!("File CRC OK");

        cursor.rewind()?;
        let mut header_bytes = vec![0u8; header_len as usize];
        cursor.read_exact(&mut header_bytes)?;

        Ok(Self {
            header,
            header_bytes,
            stream: RecordStream::new(cursor, header.data_size(), options.max_fields),
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// The file header exactly as stored.
    pub fn header_bytes(&self) -> &[u8] {
        &self.header_bytes
    }

    /// The file's messages, in stream order.
    pub fn messages(&mut self) -> &mut RecordStream<R> {
        &mut self.stream
    }

    /// Decode a point from every `record` message in the file.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn decode_points(mut self) -> Result<Vec<DecodedPoint>> {
        let mut points = vec![];
        for message in self.stream.by_ref() {
            if let Some(fields) = message?.record_fields() {
                points.push(DecodedPoint::from_fields(fields));
            }
        }
        info!("Decoded {} points", points.len());
        Ok(points)
    }

    /// Walk the whole file, counting messages by type.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn summarize(mut self) -> Result<FileSummary> {
        let mut summary = FileSummary {
            header: self.header,
            messages: 0,
            points: 0,
            counts: HashMap::new(),
        };
        for message in self.stream.by_ref() {
            let message = message?;
            summary.messages += 1;
            let counts = summary.counts.entry(message.global_message()).or_default();
            match &message.content {
                MessageContent::Definition(_) => counts.definitions += 1,
                MessageContent::Data { fields, .. } => {
                    counts.data += 1;
                    if fields.is_some() {
                        summary.points += 1;
                    }
                }
            }
        }
        info!("Checked {} messages", summary.messages);
        Ok(summary)
    }

    pub(crate) fn into_parts(self) -> (FileHeader, Vec<u8>, RecordStream<R>) {
        (self.header, self.header_bytes, self.stream)
    }
}
