// Random-access byte sources backing patch application.
//
// The interpreter is written once against `ByteSource`; the two memory
// strategies differ only in which backing they hand it: an in-memory
// buffer, or a file on persistent storage when scratch memory is short.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

/// A finite byte sequence readable both at absolute offsets and through a
/// sequential cursor.
///
/// All reads are exact: a short read is an error, never silent truncation.
/// The sequential cursor is advanced by `Read` and `read_next`, and left
/// untouched by `read_at`.
pub trait ByteSource: Read {
    /// Exact read of `buf.len()` bytes at absolute `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Total length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current sequential cursor position.
    fn position(&self) -> u64;

    /// Move the sequential cursor.
    fn seek_to(&mut self, offset: u64) -> io::Result<()>;

    /// Exact read at the sequential cursor.
    fn read_next(&mut self, buf: &mut [u8]) -> io::Result<()>
    where
        Self: Sized,
    {
        self.read_exact(buf)
    }
}

// ---------------------------------------------------------------------------
// In-memory backing
// ---------------------------------------------------------------------------

/// A `ByteSource` over a borrowed in-memory buffer.
#[derive(Debug)]
pub struct MemorySource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MemorySource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl Read for MemorySource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.pos.min(self.data.len())..];
        let n = buf.len().min(remaining.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl ByteSource for MemorySource<'_> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let end = offset
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= self.data.len() as u64)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of buffer")
            })?;
        buf.copy_from_slice(&self.data[offset as usize..end as usize]);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        if offset > self.data.len() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "seek past end of buffer",
            ));
        }
        self.pos = offset as usize;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File backing
// ---------------------------------------------------------------------------

/// A `ByteSource` over an open file, for the spooled strategy.
///
/// The sequential cursor is tracked here rather than relying on the OS file
/// position, so `read_at` and sequential reads can interleave freely.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    len: u64,
    pos: u64,
}

impl FileSource {
    pub fn new(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self { file, len, pos: 0 })
    }
}

impl Read for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(self.pos))?;
        let n = self.file.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl ByteSource for FileSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let end = offset.checked_add(buf.len() as u64).filter(|&e| e <= self.len);
        if end.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of file",
            ));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        if offset > self.len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "seek past end of file",
            ));
        }
        self.pos = offset;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
