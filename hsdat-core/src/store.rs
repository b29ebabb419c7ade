//! In-memory edit buffer with a file-like cursor.
//!
//! `ByteStore` only knows about bytes. Structural bookkeeping that has to
//! follow every size-changing edit (pointer relocation, view offsets,
//! alignment padding) is driven by [`crate::DatFile`], which owns the store
//! and is the only caller of [`ByteStore::splice`].

use std::ops::{Deref, DerefMut};

use byteorder::{BigEndian, ByteOrder};

use crate::error::{DatError, Result};

#[derive(Debug, Clone, Default)]
pub struct ByteStore {
    buf: Vec<u8>,
    pos: usize,
}

impl ByteStore {
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Moves the cursor. Seeking past the end is allowed, like a file; the
    /// next write extends the buffer with zeros up to the cursor.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn seek_relative(&mut self, delta: isize) -> Result<()> {
        self.pos = self.pos.checked_add_signed(delta).ok_or(DatError::OutOfBounds {
            offset: self.pos,
            len: delta.unsigned_abs(),
            size: self.buf.len(),
        })?;
        Ok(())
    }

    /// Reads up to `n` bytes at the cursor. Short reads happen at end of
    /// buffer.
    pub fn read(&mut self, n: usize) -> &[u8] {
        let start = self.pos.min(self.buf.len());
        let end = start.saturating_add(n).min(self.buf.len());
        self.pos = end.max(self.pos);
        &self.buf[start..end]
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let value = self.read_u32_at(self.pos)?;
        self.pos += 4;
        Ok(value)
    }

    /// Overwrites bytes at the cursor, growing the buffer when writing past
    /// its end.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let end = self.pos.checked_add(data.len()).ok_or(DatError::OutOfBounds {
            offset: self.pos,
            len: data.len(),
            size: self.buf.len(),
        })?;
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(())
    }

    /// Drops everything from the cursor to the end of the buffer.
    pub fn truncate(&mut self) {
        self.buf.truncate(self.pos);
    }

    pub fn peek(&mut self, n: usize) -> Vec<u8> {
        self.scoped().read(n).to_vec()
    }

    /// Saves the cursor and restores it when the returned guard is dropped,
    /// including on early return through `?`.
    pub fn scoped(&mut self) -> ScopedCursor<'_> {
        let saved = self.pos;
        ScopedCursor { store: self, saved }
    }

    pub fn read_at(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset.checked_add(len).filter(|end| *end <= self.buf.len());
        match end {
            Some(end) => Ok(&self.buf[offset..end]),
            None => Err(DatError::OutOfBounds {
                offset,
                len,
                size: self.buf.len(),
            }),
        }
    }

    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let size = self.buf.len();
        let dst = offset
            .checked_add(data.len())
            .filter(|end| *end <= size)
            .map(|end| &mut self.buf[offset..end])
            .ok_or(DatError::OutOfBounds {
                offset,
                len: data.len(),
                size,
            })?;
        dst.copy_from_slice(data);
        Ok(())
    }

    pub fn read_u32_at(&self, offset: usize) -> Result<u32> {
        Ok(BigEndian::read_u32(self.read_at(offset, 4)?))
    }

    pub fn write_u32_at(&mut self, offset: usize, value: u32) -> Result<()> {
        let mut word = [0u8; 4];
        BigEndian::write_u32(&mut word, value);
        self.write_at(offset, &word)
    }

    /// Bytes of the NUL-terminated string at `offset`, terminator excluded.
    /// A missing terminator ends the string at end of buffer.
    pub fn read_cstr_at(&self, offset: usize) -> Result<&[u8]> {
        let tail = self.read_at(offset, self.buf.len().saturating_sub(offset))?;
        let end = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
        Ok(&tail[..end])
    }

    /// Inserts `amount` bytes at `location` (zeros, or `data` when given), or
    /// removes `-amount` bytes when negative. Only the buffer changes; the
    /// cursor is left where it was.
    pub(crate) fn splice(&mut self, location: usize, amount: isize, data: Option<&[u8]>) -> Result<()> {
        if location > self.buf.len() {
            return Err(DatError::OutOfBounds {
                offset: location,
                len: amount.unsigned_abs(),
                size: self.buf.len(),
            });
        }
        if amount >= 0 {
            let fill = match data {
                Some(data) => {
                    if data.len() != amount as usize {
                        return Err(DatError::InvalidEdit(format!(
                            "splice of {} bytes given {} bytes of data",
                            amount,
                            data.len()
                        )));
                    }
                    data.to_vec()
                }
                None => vec![0u8; amount as usize],
            };
            self.buf.splice(location..location, fill);
        } else {
            let end = location + amount.unsigned_abs();
            if end > self.buf.len() {
                return Err(DatError::OutOfBounds {
                    offset: location,
                    len: amount.unsigned_abs(),
                    size: self.buf.len(),
                });
            }
            self.buf.drain(location..end);
        }
        Ok(())
    }
}

pub struct ScopedCursor<'a> {
    store: &'a mut ByteStore,
    saved: usize,
}

impl Deref for ScopedCursor<'_> {
    type Target = ByteStore;

    fn deref(&self) -> &ByteStore {
        self.store
    }
}

impl DerefMut for ScopedCursor<'_> {
    fn deref_mut(&mut self) -> &mut ByteStore {
        self.store
    }
}

impl Drop for ScopedCursor<'_> {
    fn drop(&mut self) {
        self.store.pos = self.saved;
    }
}
