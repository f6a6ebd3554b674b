use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, ErrorKind};
use std::rc::Rc;

/// Table-string index meaning "null".
const STR_NULL: u16 = 65534;
/// Table-string index meaning "empty string".
const STR_EMPTY: u16 = 65533;

/// Seekable big-endian reader over a shared byte buffer.
///
/// Positions are relative to the wrapped sub-range, so a buffer returned by
/// [`ByteBuf::read_buffer`] can carry its own offset tables at position 0.
/// All reads fail with `UnexpectedEof` past the end of the range; callers
/// treat that as fatal for the whole package load.
#[derive(Clone)]
pub struct ByteBuf {
    data: Rc<[u8]>,
    start: usize,
    end: usize,
    pos: usize,
    pub(crate) string_pool: Rc<Vec<String>>,
    pub version: i32,
}

impl ByteBuf {
    pub fn new(data: Vec<u8>) -> Self {
        let end = data.len();
        Self {
            data: Rc::from(data),
            start: 0,
            end,
            pos: 0,
            string_pool: Rc::new(Vec::new()),
            version: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Jump to an absolute position within this buffer's range.
    pub fn set_pos(&mut self, pos: usize) -> io::Result<()> {
        if pos > self.len() {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("seek past end of package buffer ({} > {})", pos, self.len()),
            ));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> io::Result<()> {
        self.set_pos(self.pos + n)
    }

    fn take(&mut self, n: usize) -> io::Result<&[u8]> {
        if self.pos + n > self.len() {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!(
                    "read past end of package buffer (pos {}, need {}, len {})",
                    self.pos,
                    n,
                    self.len()
                ),
            ));
        }
        let at = self.start + self.pos;
        self.pos += n;
        Ok(&self.data[at..at + n])
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> io::Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_bool(&mut self) -> io::Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        let mut s = self.take(2)?;
        s.read_u16::<BigEndian>()
    }

    pub fn read_i16(&mut self) -> io::Result<i16> {
        let mut s = self.take(2)?;
        s.read_i16::<BigEndian>()
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        let mut s = self.take(4)?;
        s.read_u32::<BigEndian>()
    }

    pub fn read_i32(&mut self) -> io::Result<i32> {
        let mut s = self.take(4)?;
        s.read_i32::<BigEndian>()
    }

    /// A 2-byte character code.
    pub fn read_char(&mut self) -> io::Result<char> {
        let code = self.read_u16()?;
        Ok(char::from_u32(code as u32).unwrap_or('\u{fffd}'))
    }

    pub fn read_bytes(&mut self, n: usize) -> io::Result<Vec<u8>> {
        Ok(self.take(n)?.to_vec())
    }

    /// Length-prefixed inline UTF-8 string.
    pub fn read_string(&mut self) -> io::Result<String> {
        let len = self.read_u16()? as usize;
        let raw = self.take(len)?.to_vec();
        String::from_utf8(raw).map_err(|e| {
            io::Error::new(ErrorKind::InvalidData, format!("invalid utf-8 string: {}", e))
        })
    }

    /// String-pool reference. The format stores each distinct string once
    /// and references it by index everywhere else; `None` is a real value
    /// (unnamed sub-items have no name).
    pub fn read_pooled_string(&mut self) -> io::Result<Option<String>> {
        let index = self.read_u16()?;
        match index {
            STR_NULL => Ok(None),
            STR_EMPTY => Ok(Some(String::new())),
            _ => self
                .string_pool
                .get(index as usize)
                .cloned()
                .map(Some)
                .ok_or_else(|| {
                    io::Error::new(
                        ErrorKind::InvalidData,
                        format!(
                            "string index {} out of range (pool has {})",
                            index,
                            self.string_pool.len()
                        ),
                    )
                }),
        }
    }

    /// Length-prefixed nested sub-buffer, scoped to its own range so the
    /// payload can be decoded lazily later. Shares the string pool and
    /// format version with its parent.
    pub fn read_buffer(&mut self) -> io::Result<ByteBuf> {
        let count = self.read_i32()?;
        if count < 0 {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("negative sub-buffer length {}", count),
            ));
        }
        let count = count as usize;
        if self.pos + count > self.len() {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("sub-buffer of {} bytes exceeds parent range", count),
            ));
        }
        let sub = ByteBuf {
            data: Rc::clone(&self.data),
            start: self.start + self.pos,
            end: self.start + self.pos + count,
            pos: 0,
            string_pool: Rc::clone(&self.string_pool),
            version: self.version,
        };
        self.pos += count;
        Ok(sub)
    }

    /// Jump to the position recorded in one of the offset-table slots
    /// written at `base`: a slot count byte, a width flag byte (1 = 16-bit
    /// entries), then the table itself with offsets relative to `base`.
    ///
    /// Returns `false` without moving the cursor when the slot does not
    /// exist or holds a zero offset; older format versions omit trailing
    /// sections this way.
    pub fn seek(&mut self, base: usize, slot: usize) -> io::Result<bool> {
        let saved = self.pos;
        self.set_pos(base)?;
        let seg_count = self.read_u8()? as usize;
        if slot >= seg_count {
            self.pos = saved;
            return Ok(false);
        }
        let use_short = self.read_u8()? == 1;
        let offset = if use_short {
            self.set_pos(base + 2 + 2 * slot)?;
            self.read_u16()? as i64
        } else {
            self.set_pos(base + 2 + 4 * slot)?;
            self.read_i32()? as i64
        };
        if offset > 0 {
            self.set_pos(base + offset as usize)?;
            Ok(true)
        } else {
            self.pos = saved;
            Ok(false)
        }
    }
}
