//! Raw field values of data records
//!
//! Fields are read strictly by their declared width.  The base type in the
//! definition is not consulted; whoever interprets a field decides whether it
//! is signed.

use std::io::{Read, Seek};

use crate::cursor::MessageCursor;
use crate::definition::{Definition, FieldDescriptor};
use crate::error::{FitDecodeError, Result};

/// A field's raw integer, as wide as the field's declared size.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FieldValue {
    Byte(u8),
    Short(u16),
    Long(u32),
}

impl FieldValue {
    /// The value zero-extended to 32 bits.
    pub fn bits(self) -> u32 {
        match self {
            Self::Byte(v) => v as u32,
            Self::Short(v) => v as u32,
            Self::Long(v) => v,
        }
    }

    /// Width of the value in bytes.
    pub fn width(self) -> u8 {
        match self {
            Self::Byte(_) => 1,
            Self::Short(_) => 2,
            Self::Long(_) => 4,
        }
    }

    /// Interpret as an unsigned integer, or `None` for the all-ones invalid
    /// value.
    pub fn unsigned(self) -> Option<u32> {
        let invalid = match self {
            Self::Byte(v) => v == u8::MAX,
            Self::Short(v) => v == u16::MAX,
            Self::Long(v) => v == u32::MAX,
        };
        (!invalid).then_some(self.bits())
    }

    /// Interpret as a two's complement signed integer, or `None` for the
    /// maximum positive value, which FIT reserves as invalid.
    pub fn signed(self) -> Option<i32> {
        let (value, invalid) = match self {
            Self::Byte(v) => (v as i8 as i32, v as i8 == i8::MAX),
            Self::Short(v) => (v as i16 as i32, v as i16 == i16::MAX),
            Self::Long(v) => (v as i32, v as i32 == i32::MAX),
        };
        (!invalid).then_some(value)
    }
}

/// One decoded field of a data record.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RawField {
    pub field_id: u8,
    pub base_type: u8,
    pub value: FieldValue,
}

impl RawField {
    fn read<R: Read + Seek>(
        cursor: &mut MessageCursor<R>,
        descriptor: &FieldDescriptor,
        definition: &Definition,
    ) -> Result<Self> {
        let arch = definition.architecture();
        let value = match descriptor.size {
            1 => FieldValue::Byte(cursor.read_u8()?),
            2 => FieldValue::Short(cursor.read_u16(arch)?),
            4 => FieldValue::Long(cursor.read_u32(arch)?),
            size => {
                return Err(FitDecodeError::FieldWidth {
                    field_id: descriptor.field_id,
                    size,
                });
            }
        };
        Ok(Self {
            field_id: descriptor.field_id,
            base_type: descriptor.base_type,
            value,
        })
    }
}

/// Read every field of a data record's payload, in definition order.
///
/// Consumes exactly `record_size` bytes; trailing developer data is left for
/// the caller.  The widths are validated before anything is read, so an
/// unsupported layout fails without consuming part of the record.
pub(crate) fn read_fields<R: Read + Seek>(
    cursor: &mut MessageCursor<R>,
    definition: &Definition,
) -> Result<Vec<RawField>> {
    if let Some(bad) = definition
        .fields()
        .iter()
        .find(|f| !matches!(f.size, 1 | 2 | 4))
    {
        return Err(FitDecodeError::FieldWidth {
            field_id: bad.field_id,
            size: bad.size,
        });
    }

    definition
        .fields()
        .iter()
        .map(|descriptor| RawField::read(cursor, descriptor, definition))
        .collect()
}

/// Find a field by number.
pub fn find_field(fields: &[RawField], field_id: u8) -> Option<FieldValue> {
    fields
        .iter()
        .find(|f| f.field_id == field_id)
        .map(|f| f.value)
}
