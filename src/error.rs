//! Errors decoding a FIT stream

use strum::Display;
use thiserror::Error;

use crate::header::HeaderError;

/// Broad classification of decoding failures.
///
/// Every kind is fatal to the operation in progress.  FIT data is CRC
/// protected, so any inconsistency is taken to mean the whole file is
/// untrustworthy.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// Bad signature, bad CRC, truncated input, or a framing mismatch.
    Structural,
    /// Valid FIT that uses a feature this decoder doesn't handle.
    UnsupportedFeature,
    /// A definition names a global message outside the registry.
    UnknownSchema,
    /// A data record arrived with no definition in effect.
    ProtocolDesync,
}

/// An error when decoding FIT
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FitDecodeError {
    #[error("I/O error")]
    Io(#[source] std::io::Error),
    #[error("Truncated input")]
    Truncated,
    #[error("File header error")]
    Header(#[from] HeaderError),
    #[error("Bad file CRC: checksum over file is {0:#06x}, expected zero")]
    FileCrc(u16),
    #[error("Desynchronized record stream: {remaining} bytes of payload left over")]
    Desynchronized { remaining: i64 },
    #[error("Declared payload of {declared} bytes exceeds the limit of {limit}")]
    PayloadTooLarge { declared: u32, limit: u32 },
    #[error("Definition with {count} fields exceeds the limit of {limit}")]
    TooManyFields { count: usize, limit: usize },
    #[error("Compressed timestamp record header {0:#04x} is not supported")]
    CompressedHeader(u8),
    #[error("Unsupported field width: field {field_id} is {size} bytes")]
    FieldWidth { field_id: u8, size: u8 },
    #[error("Unsupported architecture byte {0:#04x}")]
    Architecture(u8),
    #[error("Unknown global message {global} defined for local message type {local}")]
    UnknownGlobalMessage { local: u8, global: u16 },
    #[error("Data record for local message type {0} has no definition")]
    UndefinedLocalMessage(u8),
}

impl FitDecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_)
            | Self::Truncated
            | Self::Header(_)
            | Self::FileCrc(_)
            | Self::Desynchronized { .. }
            | Self::PayloadTooLarge { .. }
            | Self::TooManyFields { .. } => ErrorKind::Structural,
            Self::CompressedHeader(_) | Self::FieldWidth { .. } | Self::Architecture(_) => {
                ErrorKind::UnsupportedFeature
            }
            Self::UnknownGlobalMessage { .. } => ErrorKind::UnknownSchema,
            Self::UndefinedLocalMessage(_) => ErrorKind::ProtocolDesync,
        }
    }
}

impl From<std::io::Error> for FitDecodeError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::Truncated,
            _ => Self::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, FitDecodeError>;

#[cfg(test)]
mod tests {
    use super::{ErrorKind, FitDecodeError};
    use crate::header::HeaderError;

    #[test]
    fn test_eof_is_truncation() {
        let err: FitDecodeError = std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into();
        assert!(matches!(err, FitDecodeError::Truncated));
        assert_eq!(err.kind(), ErrorKind::Structural);

        let err: FitDecodeError = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert!(matches!(err, FitDecodeError::Io(_)));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            FitDecodeError::Header(HeaderError::Signature(*b"FIT.")).kind(),
            ErrorKind::Structural
        );
        assert_eq!(
            FitDecodeError::CompressedHeader(0x80).kind(),
            ErrorKind::UnsupportedFeature
        );
        assert_eq!(
            FitDecodeError::UnknownGlobalMessage {
                local: 0,
                global: 31
            }
            .kind(),
            ErrorKind::UnknownSchema
        );
        assert_eq!(
            FitDecodeError::UndefinedLocalMessage(3).kind(),
            ErrorKind::ProtocolDesync
        );
        assert_eq!(ErrorKind::ProtocolDesync.to_string(), "protocol-desync");
    }
}
