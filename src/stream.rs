//! The record stream state machine
//!
//! Walks the records between the file header and the trailing CRC one
//! message at a time.  Each message's header byte selects definition or data
//! handling, and every message is consumed in full so that the next header
//! byte is found by length alone.  The payload length declared in the file
//! header is counted down as messages are consumed and must land on exactly
//! zero.

use std::io::{Read, Seek};

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, trace};

use crate::cursor::MessageCursor;
use crate::definition::{Definition, DefinitionTable};
use crate::error::{FitDecodeError, Result};
use crate::field::{RawField, read_fields};
use crate::profile::GlobalMessage;

const COMPRESSED_HEADER: u8 = 0b1000_0000;
const DEFINITION_HEADER: u8 = 0b0100_0000;
const DEVELOPER_DATA: u8 = 0b0010_0000;
const LOCAL_MESSAGE_TYPE: u8 = 0b0000_1111;

/// Size of the CRC following the record stream.
pub(crate) const TRAILING_CRC_LEN: u64 = 2;

/// A message's header byte, classified.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MessageKind {
    Definition {
        local_message_type: u8,
        has_developer_fields: bool,
    },
    Data {
        local_message_type: u8,
    },
}

impl MessageKind {
    /// Classify a record header byte.
    ///
    /// Compressed timestamp headers are not supported.
    pub fn from_header(header: u8) -> Result<Self> {
        if header & COMPRESSED_HEADER != 0 {
            return Err(FitDecodeError::CompressedHeader(header));
        }
        let local_message_type = header & LOCAL_MESSAGE_TYPE;
        if header & DEFINITION_HEADER != 0 {
            Ok(Self::Definition {
                local_message_type,
                has_developer_fields: header & DEVELOPER_DATA != 0,
            })
        } else {
            Ok(Self::Data { local_message_type })
        }
    }

    pub fn local_message_type(&self) -> u8 {
        match self {
            Self::Definition {
                local_message_type, ..
            } => *local_message_type,
            Self::Data { local_message_type } => *local_message_type,
        }
    }
}

/// What a message carried.
#[derive(Clone, PartialEq, Debug)]
pub enum MessageContent {
    /// A definition record, now in effect for its local message type.
    Definition(Definition),

    /// A data record.  Fields are decoded only for `record` messages; other
    /// data records are skipped by length.
    Data {
        global_message: GlobalMessage,
        fields: Option<Vec<RawField>>,
    },
}

/// One framed message of the record stream.
#[derive(Clone, PartialEq, Debug)]
pub struct Message {
    pub kind: MessageKind,

    /// Offset of the message's header byte from the start of the file.
    pub offset: u64,

    /// Exact length of the message in bytes, header byte included.
    pub len: usize,

    pub content: MessageContent,
}

impl Message {
    pub fn global_message(&self) -> GlobalMessage {
        match &self.content {
            MessageContent::Definition(def) => def.global_message(),
            MessageContent::Data { global_message, .. } => *global_message,
        }
    }

    /// The decoded fields, if this is a `record` data message.
    pub fn record_fields(&self) -> Option<&[RawField]> {
        match &self.content {
            MessageContent::Data {
                fields: Some(fields),
                ..
            } => Some(fields),
            _ => None,
        }
    }
}

/// Iterates over the messages of a record stream.
///
/// The cursor must be positioned at the first record, just past the file
/// header.  Once the declared payload is consumed the trailing CRC is read,
/// and the stream ends.  The first error also ends the stream.
pub struct RecordStream<R> {
    cursor: MessageCursor<R>,
    definitions: DefinitionTable,
    max_fields: usize,
    remaining: i64,
    trailing_crc: Option<u16>,
    done: bool,
}

impl<R: Read + Seek> RecordStream<R> {
    pub(crate) fn new(cursor: MessageCursor<R>, data_size: u32, max_fields: usize) -> Self {
        Self {
            cursor,
            definitions: DefinitionTable::new(),
            max_fields,
            remaining: data_size as i64,
            trailing_crc: None,
            done: false,
        }
    }

    /// Payload bytes not yet consumed.
    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    /// The file CRC following the record stream, once the stream has been
    /// consumed.
    pub fn trailing_crc(&self) -> Option<u16> {
        self.trailing_crc
    }

    pub fn definitions(&self) -> &DefinitionTable {
        &self.definitions
    }

    /// Decode the next message, or `None` at the end of the payload.
    pub fn next_message(&mut self) -> Result<Option<Message>> {
        if self.done {
            return Ok(None);
        }
        let result = self.advance();
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    fn advance(&mut self) -> Result<Option<Message>> {
        if self.remaining == 0 {
            self.read_trailer()?;
            return Ok(None);
        }

        let offset = self.cursor.position()?;
        let header = match self.cursor.peek_u8() {
            Ok(header) => header,
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(FitDecodeError::Desynchronized {
                    remaining: self.remaining,
                });
            }
            Err(err) => return Err(err.into()),
        };

        let kind = MessageKind::from_header(header)?;
        let content = match kind {
            MessageKind::Definition {
                local_message_type,
                has_developer_fields,
            } => {
                self.cursor.read_u8()?;
                let definition = Definition::read(
                    &mut self.cursor,
                    local_message_type,
                    has_developer_fields,
                    self.max_fields,
                )?;
                if let Some(old) = self.definitions.insert(definition.clone()) {
                    debug!(
                        "Local message type {} redefined from {} to {}",
                        local_message_type,
                        old.global_message(),
                        definition.global_message()
                    );
                }
                MessageContent::Definition(definition)
            }
            MessageKind::Data { local_message_type } => {
                // Fails before any of the record is consumed.
                let definition = self.definitions.get(local_message_type)?;
                self.cursor.read_u8()?;
                let fields = if definition.global_message() == GlobalMessage::Record {
                    Some(read_fields(&mut self.cursor, definition)?)
                } else {
                    self.cursor.skip(definition.record_size() as u64)?;
                    None
                };
                self.cursor.skip(definition.developer_data_size() as u64)?;
                MessageContent::Data {
                    global_message: definition.global_message(),
                    fields,
                }
            }
        };

        let len = (self.cursor.position()? - offset) as usize;
        self.remaining -= len as i64;
        if self.remaining < 0 {
            return Err(FitDecodeError::Desynchronized {
                remaining: self.remaining,
            });
        }

        let message = Message {
            kind,
            offset,
            len,
            content,
        };
        trace!(
            "{:?} message for {} at offset {}, {} bytes, {} remaining",
            message.kind,
            message.global_message(),
            offset,
            len,
            self.remaining
        );
        Ok(Some(message))
    }

    fn read_trailer(&mut self) -> Result<()> {
        let mut raw = [0u8; TRAILING_CRC_LEN as usize];
        self.cursor.read_exact(&mut raw)?;
        self.trailing_crc = Some(LittleEndian::read_u16(&raw));

        let pos = self.cursor.position()?;
        let len = self.cursor.stream_len()?;
        if len > pos {
            debug!("Ignoring {} bytes following the file CRC", len - pos);
        }
        Ok(())
    }

    /// Read back the raw bytes of a message already decoded, leaving the
    /// stream position unchanged.
    pub(crate) fn copy_message(&mut self, message: &Message, out: &mut Vec<u8>) -> Result<()> {
        let pos = self.cursor.position()?;
        self.cursor.restore(message.offset)?;
        let start = out.len();
        out.resize(start + message.len, 0);
        self.cursor.read_exact(&mut out[start..])?;
        self.cursor.restore(pos)?;
        Ok(())
    }
}

impl<R: Read + Seek> Iterator for RecordStream<R> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_message().transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use anyhow::Result;

    use super::{MessageContent, MessageKind, RecordStream};
    use crate::cursor::MessageCursor;
    use crate::definition::{Architecture, Definition, FieldDescriptor};
    use crate::error::FitDecodeError;
    use crate::field::FieldValue;
    use crate::profile::GlobalMessage;

    fn stream(payload: Vec<u8>, data_size: u32) -> RecordStream<Cursor<Vec<u8>>> {
        let mut bytes = payload;
        bytes.extend_from_slice(&[0x34, 0x12]);
        RecordStream::new(MessageCursor::new(Cursor::new(bytes)), data_size, 255)
    }

    fn definition(local: u8, global: GlobalMessage, fields: Vec<FieldDescriptor>) -> Vec<u8> {
        let mut buf = vec![];
        Definition::new(local, global, Architecture::LittleEndian, fields)
            .encode(&mut buf)
            .unwrap();
        buf
    }

    #[test]
    fn test_classify_header() -> Result<()> {
        assert_eq!(
            MessageKind::from_header(0x40)?,
            MessageKind::Definition {
                local_message_type: 0,
                has_developer_fields: false
            }
        );
        assert_eq!(
            MessageKind::from_header(0x6F)?,
            MessageKind::Definition {
                local_message_type: 15,
                has_developer_fields: true
            }
        );
        assert_eq!(
            MessageKind::from_header(0x03)?,
            MessageKind::Data {
                local_message_type: 3
            }
        );
        assert!(matches!(
            MessageKind::from_header(0x85),
            Err(FitDecodeError::CompressedHeader(0x85))
        ));
        Ok(())
    }

    #[test]
    fn test_record_and_skipped_messages() -> Result<()> {
        let mut payload = definition(
            0,
            GlobalMessage::Record,
            vec![
                FieldDescriptor::new(253, 4, 0x86),
                FieldDescriptor::new(2, 2, 0x84),
            ],
        );
        payload.extend_from_slice(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x48, 0x0d]);
        payload.extend(definition(
            1,
            GlobalMessage::Event,
            vec![
                FieldDescriptor::new(253, 4, 0x86),
                FieldDescriptor::new(3, 4, 0x86),
                FieldDescriptor::new(0, 1, 0x00),
                FieldDescriptor::new(1, 1, 0x00),
                FieldDescriptor::new(4, 1, 0x02),
            ],
        ));
        payload.push(0x01);
        payload.extend_from_slice(&[0u8; 11]);
        let size = payload.len() as u32;

        let mut stream = stream(payload, size);
        let messages = stream.by_ref().collect::<crate::error::Result<Vec<_>>>()?;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].len, 12);
        assert_eq!(messages[1].len, 7);
        assert_eq!(messages[1].offset, 12);
        assert_eq!(messages[2].len, 21);
        assert_eq!(messages[3].len, 12);
        assert_eq!(messages.iter().map(|m| m.len).sum::<usize>(), size as usize);

        let fields = messages[1].record_fields().unwrap();
        assert_eq!(fields[0].value, FieldValue::Long(1));
        assert_eq!(fields[1].value, FieldValue::Short(3400));
        assert!(matches!(
            messages[3].content,
            MessageContent::Data {
                global_message: GlobalMessage::Event,
                fields: None
            }
        ));
        assert_eq!(stream.remaining(), 0);
        assert_eq!(stream.trailing_crc(), Some(0x1234));
        Ok(())
    }

    #[test]
    fn test_developer_bytes_consumed() -> Result<()> {
        let mut payload = vec![];
        Definition::new(
            2,
            GlobalMessage::Record,
            Architecture::LittleEndian,
            vec![FieldDescriptor::new(3, 1, 0x02)],
        )
        .with_developer_fields(vec![FieldDescriptor::new(0, 3, 0x07)])
        .encode(&mut payload)?;
        payload.extend_from_slice(&[0x02, 142, b'a', b'b', 0]);
        let size = payload.len() as u32;

        let messages = stream(payload, size).collect::<crate::error::Result<Vec<_>>>()?;
        assert_eq!(messages[0].len, 6 + 3 + 1 + 3);
        assert_eq!(messages[1].len, 5);
        assert_eq!(
            messages[1].record_fields().unwrap()[0].value,
            FieldValue::Byte(142)
        );
        Ok(())
    }

    #[test]
    fn test_data_without_definition() {
        let mut stream = stream(vec![0x00, 0x01, 0x02], 3);
        assert!(matches!(
            stream.next(),
            Some(Err(FitDecodeError::UndefinedLocalMessage(0)))
        ));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_overrun_is_desynchronized() {
        let mut payload = definition(0, GlobalMessage::FileId, vec![]);
        payload.push(0x00);
        // Declares less than the definition alone occupies.
        let mut stream = stream(payload, 5);
        assert!(matches!(
            stream.next(),
            Some(Err(FitDecodeError::Desynchronized { remaining: -1 }))
        ));
    }

    #[test]
    fn test_exhausted_input_is_desynchronized() {
        let payload = definition(0, GlobalMessage::FileId, vec![]);
        let mut cursor_bytes = payload;
        cursor_bytes.push(0x00);
        let mut stream =
            RecordStream::new(MessageCursor::new(Cursor::new(cursor_bytes)), 10, 255);
        assert!(matches!(stream.next(), Some(Ok(_))));
        assert!(matches!(stream.next(), Some(Ok(_))));
        assert!(matches!(
            stream.next(),
            Some(Err(FitDecodeError::Desynchronized { remaining: 3 }))
        ));
    }

    #[test]
    fn test_missing_trailing_crc() {
        let payload = definition(0, GlobalMessage::FileId, vec![]);
        let mut stream = RecordStream::new(MessageCursor::new(Cursor::new(payload)), 6, 255);
        assert!(matches!(stream.next(), Some(Ok(_))));
        assert!(matches!(stream.next(), Some(Err(FitDecodeError::Truncated))));
    }

    #[test]
    fn test_copy_message() -> Result<()> {
        let mut payload = definition(0, GlobalMessage::FileId, vec![]);
        payload.push(0x00);
        let expected = payload.clone();
        let mut stream = stream(payload, 7);
        let first = stream.next_message()?.unwrap();
        let second = stream.next_message()?.unwrap();
        let mut out = vec![];
        stream.copy_message(&first, &mut out)?;
        stream.copy_message(&second, &mut out)?;
        assert_eq!(out, expected);
        assert!(stream.next_message()?.is_none());
        Ok(())
    }
}
