//! Definition records and the table of definitions in effect
//!
//! A definition record declares the layout of the data records that follow
//! it under the same local message type, until the local type is redefined.

use std::io::{Read, Seek, Write};

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use tracing::{debug, trace};

use crate::cursor::MessageCursor;
use crate::error::{FitDecodeError, Result};
use crate::profile::{GlobalMessage, base_type_name, field_name};

/// Number of distinct local message types.
pub const LOCAL_MESSAGE_TYPES: usize = 16;

/// Size of a definition record without any field descriptors.
const DEFINITION_FIXED_LEN: usize = 6;

/// Size of one field descriptor triple.
const FIELD_DESCRIPTOR_LEN: usize = 3;

/// Byte order of the multi-byte fields of a definition and its data records.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Architecture {
    LittleEndian = 0u8,
    BigEndian = 1u8,
}

impl TryFrom<u8> for Architecture {
    type Error = FitDecodeError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::LittleEndian),
            1 => Ok(Self::BigEndian),
            _ => Err(FitDecodeError::Architecture(value)),
        }
    }
}

/// One field of a definition record.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FieldDescriptor {
    /// Field number, meaningful within the global message.
    pub field_id: u8,

    /// Size in bytes of the field within each data record.
    pub size: u8,

    /// FIT base type code.  Informational only; `size` determines how many
    /// bytes are read.
    pub base_type: u8,
}

impl FieldDescriptor {
    pub fn new(field_id: u8, size: u8, base_type: u8) -> Self {
        Self {
            field_id,
            size,
            base_type,
        }
    }

    fn read<R: Read + Seek>(cursor: &mut MessageCursor<R>) -> Result<Self> {
        let mut triple = [0u8; FIELD_DESCRIPTOR_LEN];
        cursor.read_exact(&mut triple)?;
        Ok(Self::new(triple[0], triple[1], triple[2]))
    }

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u8(self.field_id)?;
        w.write_u8(self.size)?;
        w.write_u8(self.base_type)?;
        Ok(())
    }
}

/// The layout in effect for one local message type.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Definition {
    local_message_type: u8,
    global_message: GlobalMessage,
    architecture: Architecture,
    fields: Vec<FieldDescriptor>,
    developer_fields: Option<Vec<FieldDescriptor>>,
    record_size: usize,
}

impl Definition {
    /// Creates a definition without developer fields.
    pub fn new(
        local_message_type: u8,
        global_message: GlobalMessage,
        architecture: Architecture,
        fields: Vec<FieldDescriptor>,
    ) -> Self {
        let record_size = fields.iter().map(|f| f.size as usize).sum();
        Self {
            local_message_type: local_message_type & 0x0F,
            global_message,
            architecture,
            fields,
            developer_fields: None,
            record_size,
        }
    }

    /// Declare developer fields, setting the definition's developer data bit.
    ///
    /// An empty list still sets the bit, as some devices do.
    pub fn with_developer_fields(mut self, developer_fields: Vec<FieldDescriptor>) -> Self {
        self.developer_fields = Some(developer_fields);
        self
    }

    pub fn local_message_type(&self) -> u8 {
        self.local_message_type
    }

    pub fn global_message(&self) -> GlobalMessage {
        self.global_message
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn developer_fields(&self) -> &[FieldDescriptor] {
        self.developer_fields.as_deref().unwrap_or(&[])
    }

    /// Sum of the sizes of the definition's (non-developer) fields.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Bytes of developer data trailing each data record.
    pub fn developer_data_size(&self) -> usize {
        self.developer_fields()
            .iter()
            .map(|f| f.size as usize)
            .sum()
    }

    /// Length of the definition record itself, header byte included.
    pub fn definition_message_len(&self) -> usize {
        let developer_len = match &self.developer_fields {
            Some(dev) => 1 + FIELD_DESCRIPTOR_LEN * dev.len(),
            None => 0,
        };
        DEFINITION_FIXED_LEN + FIELD_DESCRIPTOR_LEN * self.fields.len() + developer_len
    }

    /// Length of one data record of this layout, header byte included.
    pub fn data_message_len(&self) -> usize {
        1 + self.record_size + self.developer_data_size()
    }

    /// Read the body of a definition record whose header byte has already
    /// been consumed.
    pub(crate) fn read<R: Read + Seek>(
        cursor: &mut MessageCursor<R>,
        local_message_type: u8,
        has_developer_fields: bool,
        max_fields: usize,
    ) -> Result<Self> {
        let _reserved = cursor.read_u8()?;
        let architecture = Architecture::try_from(cursor.read_u8()?)?;
        let global_id = cursor.read_u16(architecture)?;
        let global_message =
            GlobalMessage::lookup(global_id).ok_or(FitDecodeError::UnknownGlobalMessage {
                local: local_message_type,
                global: global_id,
            })?;

        let num_fields = cursor.read_u8()? as usize;
        if num_fields > max_fields {
            return Err(FitDecodeError::TooManyFields {
                count: num_fields,
                limit: max_fields,
            });
        }
        let mut fields = Vec::with_capacity(num_fields);
        for _ in 0..num_fields {
            let field = FieldDescriptor::read(cursor)?;
            trace!(
                "-- field {} ({}), {} bytes, {}",
                field.field_id,
                field_name(global_message, field.field_id).unwrap_or("?"),
                field.size,
                base_type_name(field.base_type)
            );
            fields.push(field);
        }

        let mut definition =
            Definition::new(local_message_type, global_message, architecture, fields);

        // The developer data bit may be set with a field count of zero.
        if has_developer_fields {
            let num_developer = cursor.read_u8()? as usize;
            let mut developer_fields = Vec::with_capacity(num_developer);
            for _ in 0..num_developer {
                developer_fields.push(FieldDescriptor::read(cursor)?);
            }
            definition = definition.with_developer_fields(developer_fields);
        }

        debug!(
            "Read definition for {} (global {}) with local type {}: {} fields, {} developer fields, {} bytes per record",
            global_message,
            global_id,
            local_message_type,
            definition.fields.len(),
            definition.developer_fields().len(),
            definition.record_size
        );
        Ok(definition)
    }

    /// Encode the definition record, header byte included.
    pub fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        let developer_bit = if self.developer_fields.is_some() {
            0b0010_0000
        } else {
            0
        };
        w.write_u8(0b0100_0000 | developer_bit | self.local_message_type)?;
        w.write_u8(0x00)?; // reserved
        w.write_u8(self.architecture as u8)?;
        match self.architecture {
            Architecture::LittleEndian => w.write_u16::<LittleEndian>(self.global_message.id())?,
            Architecture::BigEndian => w.write_u16::<BigEndian>(self.global_message.id())?,
        }
        w.write_u8(u8::try_from(self.fields.len()).map_err(std::io::Error::other)?)?;
        for field in &self.fields {
            field.encode(w)?;
        }
        if let Some(dev) = &self.developer_fields {
            w.write_u8(u8::try_from(dev.len()).map_err(std::io::Error::other)?)?;
            for field in dev {
                field.encode(w)?;
            }
        }
        Ok(())
    }
}

/// The definitions in effect, one slot per local message type.
#[derive(Default, Debug)]
pub struct DefinitionTable {
    slots: [Option<Definition>; LOCAL_MESSAGE_TYPES],
}

impl DefinitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a definition, returning the one it replaces, if any.
    pub fn insert(&mut self, definition: Definition) -> Option<Definition> {
        let slot = &mut self.slots[definition.local_message_type as usize];
        slot.replace(definition)
    }

    /// The definition in effect for a local message type.
    pub fn get(&self, local_message_type: u8) -> Result<&Definition> {
        self.slots[(local_message_type & 0x0F) as usize]
            .as_ref()
            .ok_or(FitDecodeError::UndefinedLocalMessage(local_message_type))
    }

    /// Number of local message types with a definition in effect.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use anyhow::Result;

    use super::{Architecture, Definition, DefinitionTable, FieldDescriptor};
    use crate::cursor::MessageCursor;
    use crate::error::FitDecodeError;
    use crate::profile::GlobalMessage;

    fn event_definition(local: u8, arch: Architecture) -> Definition {
        Definition::new(
            local,
            GlobalMessage::Event,
            arch,
            vec![
                FieldDescriptor::new(253, 4, 0x86),
                FieldDescriptor::new(3, 4, 0x86),
                FieldDescriptor::new(0, 1, 0x00),
                FieldDescriptor::new(1, 1, 0x00),
                FieldDescriptor::new(4, 1, 0x02),
            ],
        )
    }

    fn read_back(bytes: Vec<u8>) -> crate::error::Result<Definition> {
        let mut cursor = MessageCursor::new(Cursor::new(bytes));
        let header = cursor.read_u8()?;
        Definition::read(&mut cursor, header & 0x0F, header & 0x20 != 0, 255)
    }

    #[test]
    fn test_event_layout() {
        let def = event_definition(1, Architecture::LittleEndian);
        assert_eq!(def.record_size(), 11);
        assert_eq!(def.data_message_len(), 12);
        assert_eq!(def.definition_message_len(), 6 + 15);
    }

    #[test]
    fn test_encode_read_big_endian() -> Result<()> {
        let def = event_definition(3, Architecture::BigEndian);
        let mut buf = vec![];
        def.encode(&mut buf)?;
        assert_eq!(&buf[..6], &[0x43, 0x00, 0x01, 0x00, 0x15, 0x05]);
        assert_eq!(buf.len(), def.definition_message_len());
        assert_eq!(read_back(buf)?, def);
        Ok(())
    }

    #[test]
    fn test_developer_fields_accounting() -> Result<()> {
        let def = event_definition(2, Architecture::LittleEndian)
            .with_developer_fields(vec![FieldDescriptor::new(0, 2, 0), FieldDescriptor::new(1, 1, 0)]);
        assert_eq!(def.definition_message_len(), 6 + 15 + 1 + 6);
        assert_eq!(def.data_message_len(), 1 + 11 + 3);

        let mut buf = vec![];
        def.encode(&mut buf)?;
        assert_eq!(buf[0], 0x62);
        assert_eq!(buf.len(), def.definition_message_len());
        assert_eq!(read_back(buf)?, def);
        Ok(())
    }

    #[test]
    fn test_developer_bit_with_no_fields() -> Result<()> {
        let def = event_definition(0, Architecture::LittleEndian).with_developer_fields(vec![]);
        assert_eq!(def.definition_message_len(), 6 + 15 + 1);
        let mut buf = vec![];
        def.encode(&mut buf)?;
        assert_eq!(read_back(buf)?.definition_message_len(), 22);
        Ok(())
    }

    #[test]
    fn test_unknown_global_message() {
        // Definition of global message 31 (course), local type 0, no fields.
        let bytes = vec![0x40u8, 0x00, 0x00, 31, 0x00, 0x00];
        assert!(matches!(
            read_back(bytes),
            Err(FitDecodeError::UnknownGlobalMessage {
                local: 0,
                global: 31
            })
        ));
    }

    #[test]
    fn test_bad_architecture() {
        let bytes = vec![0x40u8, 0x00, 0x02, 0x14, 0x00, 0x00];
        assert!(matches!(
            read_back(bytes),
            Err(FitDecodeError::Architecture(2))
        ));
    }

    #[test]
    fn test_field_limit() -> Result<()> {
        let def = event_definition(0, Architecture::LittleEndian);
        let mut buf = vec![];
        def.encode(&mut buf)?;
        let mut cursor = MessageCursor::new(Cursor::new(buf));
        cursor.read_u8()?;
        assert!(matches!(
            Definition::read(&mut cursor, 0, false, 4),
            Err(FitDecodeError::TooManyFields { count: 5, limit: 4 })
        ));
        Ok(())
    }

    #[test]
    fn test_truncated_definition() {
        let bytes = vec![0x40u8, 0x00, 0x00, 0x15, 0x00, 0x02, 253, 4];
        assert!(matches!(read_back(bytes), Err(FitDecodeError::Truncated)));
    }

    #[test]
    fn test_table_replaces_definitions() -> Result<()> {
        let mut table = DefinitionTable::new();
        assert!(table.is_empty());
        assert!(matches!(
            table.get(4),
            Err(FitDecodeError::UndefinedLocalMessage(4))
        ));

        assert!(
            table
                .insert(event_definition(4, Architecture::LittleEndian))
                .is_none()
        );
        assert_eq!(table.get(4)?.global_message(), GlobalMessage::Event);

        let replaced = table.insert(Definition::new(
            4,
            GlobalMessage::Record,
            Architecture::LittleEndian,
            vec![FieldDescriptor::new(253, 4, 0x86)],
        ));
        assert_eq!(replaced.map(|d| d.global_message()), Some(GlobalMessage::Event));
        assert_eq!(table.get(4)?.global_message(), GlobalMessage::Record);
        assert_eq!(table.len(), 1);
        Ok(())
    }
}
