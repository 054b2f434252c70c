//! A CLI tool and library for decoding and trimming Garmin FIT activity files.
//!
//! Walks the definition and data records of a FIT file with strict framing:
//! every message is consumed by its exact length, the declared payload length
//! must be used up exactly, and both the header and file CRCs must check out.
//! Points are decoded from `record` messages into degrees, feet, miles per
//! hour and so on.  A trimming re-encoder copies a prefix of a file's messages
//! into a new, valid FIT file.
//!
//! See [`decode_points`], [`check_file`] and [`trim_file`], which are used by
//! the CLI, for the main entry points into the library.  [`FitDecoder`] gives
//! access to individual messages.
//!
//! # Feature flags
//!
//! - `cli` enables the additional dependencies needed by the CLI

pub mod crc;
mod cursor;
mod decoder;
mod definition;
mod error;
mod field;
mod header;
pub mod measure;
mod point;
pub mod profile;
mod stream;
pub mod testonly;
mod trim;

use std::io::{Read, Seek, Write};

use thiserror::Error;

pub use decoder::{DecodeOptions, FileSummary, FitDecoder, MessageCounts};
pub use definition::{Architecture, Definition, DefinitionTable, FieldDescriptor};
pub use error::{ErrorKind, FitDecodeError};
pub use field::{FieldValue, RawField, find_field};
pub use header::{FileHeader, HeaderError, ProfileVersion, ProtocolVersion};
pub use point::{DecodedPoint, FitDateTime, GARMIN_EPOCH_OFFSET};
pub use profile::GlobalMessage;
pub use stream::{Message, MessageContent, MessageKind, RecordStream};
pub use trim::{TrimError, TrimLimit, TrimOptions, TrimReport, Trimmer};

#[derive(Error, Debug)]
pub enum FitStreamError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("FIT decoding error")]
    Decode(#[from] FitDecodeError),
    #[error("FIT trimming error")]
    Trim(#[from] TrimError),
}

impl FitStreamError {
    /// Classify a decoding failure, if this is one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Decode(err) | Self::Trim(TrimError::Decode(err)) => Some(err.kind()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FitStreamError>;

/// Decode the points of every `record` message in a FIT file.
pub fn decode_points<R: Read + Seek>(input: R) -> Result<Vec<DecodedPoint>> {
    Ok(FitDecoder::new(input)?.decode_points()?)
}

/// Validate a FIT file end to end, counting its messages.
pub fn check_file<R: Read + Seek>(input: R) -> Result<FileSummary> {
    Ok(FitDecoder::new(input)?.summarize()?)
}

/// Write a trimmed copy of a FIT file.
///
/// `output` should probably be given as a buffered `Write`.
pub fn trim_file<R: Read + Seek, W: Write>(
    input: R,
    mut output: W,
    options: TrimOptions,
) -> Result<TrimReport> {
    let report = Trimmer::new(input, options)?.trim(&mut output)?;
    output.flush()?;
    Ok(report)
}
