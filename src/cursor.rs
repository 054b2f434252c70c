//! Byte cursor over a seekable FIT stream
//!
//! Wraps a `Read + Seek` source with the handful of operations the record
//! decoder needs: exact reads in either byte order, a one-byte peek, and
//! saving and restoring the read position.  Short reads surface as
//! [`std::io::ErrorKind::UnexpectedEof`] rather than partial data.

use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::definition::Architecture;

pub struct MessageCursor<R> {
    inner: R,
}

impl<R: Read + Seek> MessageCursor<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Current offset from the start of the stream.
    pub fn position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    /// Return to a position previously obtained from [`Self::position`].
    pub fn restore(&mut self, pos: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn rewind(&mut self) -> io::Result<()> {
        self.inner.rewind()
    }

    /// Read the next byte without consuming it.
    pub fn peek_u8(&mut self) -> io::Result<u8> {
        let pos = self.position()?;
        let byte = self.inner.read_u8();
        self.restore(pos)?;
        byte
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        self.inner.read_u8()
    }

    pub fn read_u16(&mut self, arch: Architecture) -> io::Result<u16> {
        match arch {
            Architecture::LittleEndian => self.inner.read_u16::<LittleEndian>(),
            Architecture::BigEndian => self.inner.read_u16::<BigEndian>(),
        }
    }

    pub fn read_u32(&mut self, arch: Architecture) -> io::Result<u32> {
        match arch {
            Architecture::LittleEndian => self.inner.read_u32::<LittleEndian>(),
            Architecture::BigEndian => self.inner.read_u32::<BigEndian>(),
        }
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_exact(buf)
    }

    /// Consume `n` bytes, failing if fewer remain.
    pub fn skip(&mut self, n: u64) -> io::Result<()> {
        let copied = io::copy(&mut self.inner.by_ref().take(n), &mut io::sink())?;
        if copied < n {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(())
    }

    /// Total length of the stream, leaving the position unchanged.
    pub fn stream_len(&mut self) -> io::Result<u64> {
        let pos = self.position()?;
        let len = self.inner.seek(SeekFrom::End(0))?;
        self.restore(pos)?;
        Ok(len)
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};

    use anyhow::Result;

    use super::MessageCursor;
    use crate::definition::Architecture;

    #[test]
    fn test_peek_does_not_consume() -> Result<()> {
        let mut c = MessageCursor::new(Cursor::new(vec![0x40u8, 0x00]));
        assert_eq!(c.peek_u8()?, 0x40);
        assert_eq!(c.position()?, 0);
        assert_eq!(c.read_u8()?, 0x40);
        assert_eq!(c.peek_u8()?, 0x00);
        assert_eq!(c.position()?, 1);
        Ok(())
    }

    #[test]
    fn test_peek_at_end() {
        let mut c = MessageCursor::new(Cursor::new(Vec::<u8>::new()));
        let err = c.peek_u8().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_byte_order() -> Result<()> {
        let bytes = vec![0x14u8, 0x00, 0x00, 0x14, 0x01, 0x02, 0x03, 0x04];
        let mut c = MessageCursor::new(Cursor::new(bytes));
        assert_eq!(c.read_u16(Architecture::LittleEndian)?, 20);
        assert_eq!(c.read_u16(Architecture::BigEndian)?, 20);
        let pos = c.position()?;
        assert_eq!(c.read_u32(Architecture::LittleEndian)?, 0x04030201);
        c.restore(pos)?;
        assert_eq!(c.read_u32(Architecture::BigEndian)?, 0x01020304);
        Ok(())
    }

    #[test]
    fn test_skip_past_end() -> Result<()> {
        let mut c = MessageCursor::new(Cursor::new(vec![1u8, 2, 3]));
        c.skip(2)?;
        assert_eq!(c.read_u8()?, 3);
        c.rewind()?;
        assert_eq!(c.skip(4).unwrap_err().kind(), ErrorKind::UnexpectedEof);
        Ok(())
    }

    #[test]
    fn test_stream_len() -> Result<()> {
        let mut c = MessageCursor::new(Cursor::new(vec![1u8, 2, 3, 4, 5]));
        c.skip(2)?;
        assert_eq!(c.stream_len()?, 5);
        assert_eq!(c.position()?, 2);
        Ok(())
    }
}
