//! Trimming re-encoder
//!
//! Copies a prefix of a FIT file's messages, byte for byte, into a new file
//! whose header and trailing CRC are recomputed to match.

use std::io::{Read, Seek, Write};

use thiserror::Error;
use tracing::{debug, info};

use crate::crc;
use crate::decoder::{DecodeOptions, FitDecoder};
use crate::error::FitDecodeError;
use crate::header::patch_header;
use crate::stream::{Message, TRAILING_CRC_LEN};

/// An error when trimming a FIT file
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TrimError {
    #[error("Error decoding input")]
    Decode(#[from] FitDecodeError),
    #[error("I/O error writing output")]
    Io(#[from] std::io::Error),
}

type Result<T> = std::result::Result<T, TrimError>;

/// How much of the input to keep
///
/// Every limit selects a prefix of the input's messages.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum TrimLimit {
    /// Keep every message.
    #[default]
    Unbounded,

    /// Keep the first n messages, definitions included.
    Messages(usize),

    /// Keep as many whole messages as fit in n bytes of payload.
    PayloadBytes(usize),

    /// Keep everything before the (n+1)-th `record` message.
    Points(usize),
}

/// Options for trimming a FIT file
#[derive(Clone, Copy, Debug, Default)]
pub struct TrimOptions {
    pub limit: TrimLimit,
    pub decode_options: DecodeOptions,
}

impl TrimOptions {
    pub fn with_limit(self, limit: TrimLimit) -> Self {
        Self { limit, ..self }
    }

    pub fn with_decode_options(self, decode_options: DecodeOptions) -> Self {
        Self {
            decode_options,
            ..self
        }
    }
}

/// What a trim kept and dropped.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct TrimReport {
    pub messages_kept: usize,
    pub messages_dropped: usize,
    pub points_kept: usize,

    /// Payload bytes kept, which the output header declares.
    pub bytes_kept: usize,

    /// Length of the whole output file.
    pub output_len: usize,
}

/// Tracks the selection as messages go by.
struct Selection {
    limit: TrimLimit,
    open: bool,
}

impl Selection {
    fn admits(&mut self, report: &TrimReport, message: &Message) -> bool {
        if !self.open {
            return false;
        }
        self.open = match self.limit {
            TrimLimit::Unbounded => true,
            TrimLimit::Messages(n) => report.messages_kept < n,
            TrimLimit::PayloadBytes(n) => report.bytes_kept + message.len <= n,
            TrimLimit::Points(n) => {
                message.record_fields().is_none() || report.points_kept < n
            }
        };
        self.open
    }
}

/// Re-encodes a prefix of a FIT file.
pub struct Trimmer<R> {
    decoder: FitDecoder<R>,
    limit: TrimLimit,
}

impl<R: Read + Seek> Trimmer<R> {
    /// Validate the input's header and file CRC.
    pub fn new(input: R, options: TrimOptions) -> Result<Self> {
        Ok(Self {
            decoder: FitDecoder::with_options(input, options.decode_options)?,
            limit: options.limit,
        })
    }

    /// Write the trimmed file to `output`.
    ///
    /// The whole input is walked, even past the end of the selection, so a
    /// malformed tail fails the trim as well.
    #[tracing::instrument(name = "trim", level = "debug", skip_all)]
    pub fn trim<W: Write>(self, output: &mut W) -> Result<TrimReport> {
        let (header, header_bytes, mut stream) = self.decoder.into_parts();
        let mut buf = Vec::with_capacity(
            header_bytes.len() + header.data_size() as usize + TRAILING_CRC_LEN as usize,
        );
        buf.extend_from_slice(&header_bytes);

        let mut selection = Selection {
            limit: self.limit,
            open: true,
        };
        let mut report = TrimReport::default();
        while let Some(message) = stream.next_message()? {
            if selection.admits(&report, &message) {
                stream.copy_message(&message, &mut buf)?;
                report.messages_kept += 1;
                report.bytes_kept += message.len;
                if message.record_fields().is_some() {
                    report.points_kept += 1;
                }
            } else {
                report.messages_dropped += 1;
            }
        }
        debug!(
            "Keeping {} of {} payload bytes",
            report.bytes_kept,
            header.data_size()
        );

        // Never more than the input's declared u32 data size.
        patch_header(&mut buf, report.bytes_kept as u32);
        let sum = crc::compute(&buf);
        buf.extend_from_slice(&sum.to_le_bytes());
        output.write_all(&buf)?;

        report.output_len = buf.len();
        info!(
            "Kept {} messages ({} points), dropped {}",
            report.messages_kept, report.points_kept, report.messages_dropped
        );
        Ok(report)
    }
}
