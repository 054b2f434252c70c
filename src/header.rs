//! FIT file header codec

use std::fmt::{Display, Formatter};
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;
use tracing::debug;

use crate::crc;

/// The FIT file signature, found at bytes [8, 12) of the header.
pub const SIGNATURE: &[u8; 4] = b".FIT";

/// Length of a header without the trailing CRC field.
pub const SHORT_HEADER_LEN: u8 = 12;

/// Length of a header carrying its own CRC.
pub const LONG_HEADER_LEN: u8 = 14;

/// Offset of the header's declared payload length.
pub(crate) const DATA_SIZE_OFFSET: usize = 4;

/// An error reading or writing a FIT file header
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HeaderError {
    #[error("I/O error")]
    Io(#[source] std::io::Error),
    #[error("Truncated file header")]
    Truncated,
    #[error("Not a FIT file: signature {0:?} is not \".FIT\"")]
    Signature([u8; 4]),
    #[error("Unsupported header length {0}")]
    HeaderLength(u8),
    #[error("Bad header CRC: stored {stored:#06x}, computed {computed:#06x}")]
    HeaderCrc { stored: u16, computed: u16 },
}

impl From<std::io::Error> for HeaderError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::Truncated,
            _ => Self::Io(err),
        }
    }
}

type Result<T> = std::result::Result<T, HeaderError>;

/// Protocol version byte, major version in the high nibble.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ProtocolVersion(pub u8);

impl ProtocolVersion {
    pub const V10: ProtocolVersion = ProtocolVersion(0x10);

    pub fn major(self) -> u8 {
        self.0 >> 4
    }

    pub fn minor(self) -> u8 {
        self.0 & 0x0F
    }
}

impl Display for ProtocolVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.major(), self.minor())
    }
}

/// Profile version as `major * 100 + minor`, or `major * 1000 + minor` for
/// profiles written by SDK 21.100 and later.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ProfileVersion(pub u16);

impl ProfileVersion {
    /// Values at or above this can only be in the three-digit minor form.
    const WIDE_MINOR_THRESHOLD: u16 = 10_000;

    pub fn major(self) -> u16 {
        if self.0 >= Self::WIDE_MINOR_THRESHOLD {
            self.0 / 1000
        } else {
            self.0 / 100
        }
    }

    pub fn minor(self) -> u16 {
        if self.0 >= Self::WIDE_MINOR_THRESHOLD {
            self.0 % 1000
        } else {
            self.0 % 100
        }
    }
}

impl Display for ProfileVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0 >= Self::WIDE_MINOR_THRESHOLD {
            write!(f, "{}.{:03}", self.major(), self.minor())
        } else {
            write!(f, "{}.{:02}", self.major(), self.minor())
        }
    }
}

/// The header at the start of every FIT file.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FileHeader {
    header_len: u8,
    protocol_version: ProtocolVersion,
    profile_version: ProfileVersion,
    data_size: u32,
    crc: Option<u16>,
}

impl FileHeader {
    /// Creates a 14-byte header declaring `data_size` bytes of records.
    pub fn new(
        protocol_version: ProtocolVersion,
        profile_version: u16,
        data_size: usize,
    ) -> std::result::Result<Self, std::num::TryFromIntError> {
        Ok(Self {
            header_len: LONG_HEADER_LEN,
            protocol_version,
            profile_version: ProfileVersion(profile_version),
            data_size: u32::try_from(data_size)?,
            crc: None,
        })
    }

    /// Use the 12-byte header layout, which has no CRC.
    pub fn without_crc(self) -> Self {
        Self {
            header_len: SHORT_HEADER_LEN,
            crc: None,
            ..self
        }
    }

    /// Read and validate a header from the start of a FIT stream.
    ///
    /// Checks the ".FIT" signature and, for 14-byte headers, that the CRC
    /// over the whole header including its stored CRC sums to zero.
    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let mut raw = [0u8; LONG_HEADER_LEN as usize];
        r.read_exact(&mut raw[..SHORT_HEADER_LEN as usize])?;

        let mut fields = &raw[..SHORT_HEADER_LEN as usize];
        let header_len = fields.read_u8()?;
        let protocol_version = ProtocolVersion(fields.read_u8()?);
        let profile_version = ProfileVersion(fields.read_u16::<LittleEndian>()?);
        let data_size = fields.read_u32::<LittleEndian>()?;
        let mut signature = [0u8; 4];
        fields.read_exact(&mut signature)?;

        if &signature != SIGNATURE {
            return Err(HeaderError::Signature(signature));
        }

        let crc = match header_len {
            SHORT_HEADER_LEN => None,
            LONG_HEADER_LEN => {
                r.read_exact(&mut raw[SHORT_HEADER_LEN as usize..])?;
                let stored = u16::from_le_bytes([raw[12], raw[13]]);
                if crc::compute(&raw) != 0 {
                    return Err(HeaderError::HeaderCrc {
                        stored,
                        computed: crc::compute(&raw[..SHORT_HEADER_LEN as usize]),
                    });
                }
                Some(stored)
            }
            _ => return Err(HeaderError::HeaderLength(header_len)),
        };

        debug!(
            "FIT header: {} bytes, protocol {}, profile {}, {} data bytes",
            header_len, protocol_version, profile_version, data_size
        );

        Ok(Self {
            header_len,
            protocol_version,
            profile_version,
            data_size,
            crc,
        })
    }

    /// Encode the header, computing its CRC if it has a slot for one.
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut buf = Vec::with_capacity(self.header_len as usize);
        buf.write_u8(self.header_len)?;
        buf.write_u8(self.protocol_version.0)?;
        buf.write_u16::<LittleEndian>(self.profile_version.0)?;
        buf.write_u32::<LittleEndian>(self.data_size)?;
        buf.write_all(SIGNATURE)?;
        if self.header_len == LONG_HEADER_LEN {
            let crc = crc::compute(&buf);
            buf.write_u16::<LittleEndian>(crc)?;
        }
        w.write_all(&buf)?;
        Ok(())
    }

    /// Header length in bytes, either 12 or 14.
    pub fn header_len(&self) -> u8 {
        self.header_len
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    pub fn profile_version(&self) -> ProfileVersion {
        self.profile_version
    }

    /// Number of record bytes between the header and the trailing file CRC.
    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    /// The stored header CRC, if the header has one.
    pub fn crc(&self) -> Option<u16> {
        self.crc
    }
}

/// Rewrite the declared data size and header CRC of an encoded file in place.
///
/// `buf` must start with a complete header.
pub(crate) fn patch_header(buf: &mut [u8], data_size: u32) {
    let header_len = buf[0] as usize;
    buf[DATA_SIZE_OFFSET..DATA_SIZE_OFFSET + 4].copy_from_slice(&data_size.to_le_bytes());
    if header_len == LONG_HEADER_LEN as usize {
        let crc = crc::compute(&buf[..SHORT_HEADER_LEN as usize]);
        buf[SHORT_HEADER_LEN as usize..LONG_HEADER_LEN as usize].copy_from_slice(&crc.to_le_bytes());
    }
}
