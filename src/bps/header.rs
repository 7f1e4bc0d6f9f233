// BPS container prologue and checksum trailer.
//
// Layout:
//   offset 0      : 4 bytes, ASCII magic "BPS1"
//   then          : varint source_size, target_size, metadata_size
//   then          : metadata (rejected unless empty)
//   then          : command stream, up to offset (length - 12)
//   offset len-12 : u32 source crc32, u32 target crc32, u32 patch crc32
//                   (little-endian; the patch crc32 is carried, never checked)

use std::io::{self, Write};

use super::source::ByteSource;
use super::varint;
use crate::error::ApplyError;

pub const BPS_MAGIC: [u8; 4] = *b"BPS1";

/// Three 4-byte checksums at the end of every container.
pub const TRAILER_LEN: usize = 12;

/// Smallest possible container: magic, three one-byte varints, trailer.
pub const MIN_PATCH_LEN: u64 = 4 + 3 + TRAILER_LEN as u64;

/// Longest possible prologue: magic plus three maximal varints.
pub const MAX_PROLOGUE_LEN: usize = 4 + 3 * varint::MAX_VARINT_LEN;

// ---------------------------------------------------------------------------
// Prologue
// ---------------------------------------------------------------------------

/// Parsed BPS prologue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchHeader {
    pub source_size: u32,
    pub target_size: u32,
    pub metadata_size: u32,
    /// Byte offset where the command stream begins.
    pub command_start: usize,
}

impl PatchHeader {
    /// Parse the prologue from the first bytes of a container.
    ///
    /// `prologue` needs at most [`MAX_PROLOGUE_LEN`] bytes; `patch_len` is
    /// the total container length, used to bound the command region.
    pub fn parse(prologue: &[u8], patch_len: u64) -> Result<Self, ApplyError> {
        if patch_len < MIN_PATCH_LEN {
            return Err(ApplyError::PatchTooSmall(patch_len));
        }
        if prologue.len() < 4 || prologue[..4] != BPS_MAGIC {
            return Err(ApplyError::BadMagic);
        }

        let mut pos = 4;
        let (source_size, n) = varint::decode_u32(&prologue[pos..])?;
        pos += n;
        let (target_size, n) = varint::decode_u32(&prologue[pos..])?;
        pos += n;
        let (metadata_size, n) = varint::decode_u32(&prologue[pos..])?;
        pos += n;

        if metadata_size != 0 {
            return Err(ApplyError::UnsupportedMetadata(metadata_size));
        }
        if pos as u64 + TRAILER_LEN as u64 > patch_len {
            return Err(ApplyError::PatchTooSmall(patch_len));
        }

        Ok(Self {
            source_size,
            target_size,
            metadata_size,
            command_start: pos,
        })
    }

    /// Parse the prologue from a complete in-memory container.
    pub fn decode(patch: &[u8]) -> Result<Self, ApplyError> {
        Self::parse(patch, patch.len() as u64)
    }

    /// Read and parse the prologue from the front of a byte source.
    pub fn read_from<S: ByteSource>(src: &mut S) -> Result<Self, ApplyError> {
        let mut prologue = [0u8; MAX_PROLOGUE_LEN];
        let want = prologue.len().min(src.len() as usize);
        src.read_at(0, &mut prologue[..want])?;
        Self::parse(&prologue[..want], src.len())
    }

    /// Emit the prologue (magic plus size varints, no metadata).
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&BPS_MAGIC)?;
        varint::write_u32(w, self.source_size)?;
        varint::write_u32(w, self.target_size)?;
        varint::write_u32(w, self.metadata_size)
    }

    /// Byte offset where the trailer (and therefore the end of the command
    /// stream) sits in a container of `patch_len` bytes.
    pub fn command_end(patch_len: u64) -> u64 {
        patch_len - TRAILER_LEN as u64
    }
}

// ---------------------------------------------------------------------------
// Trailer
// ---------------------------------------------------------------------------

/// The three checksums at the end of the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchTrailer {
    pub source_crc32: u32,
    pub target_crc32: u32,
    pub patch_crc32: u32,
}

impl PatchTrailer {
    fn split(bytes: &[u8; TRAILER_LEN]) -> Self {
        Self {
            source_crc32: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            target_crc32: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            patch_crc32: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        }
    }

    /// Parse the trailer from a complete in-memory container.
    pub fn decode(patch: &[u8]) -> Result<Self, ApplyError> {
        if patch.len() < TRAILER_LEN {
            return Err(ApplyError::PatchTooSmall(patch.len() as u64));
        }
        let bytes: &[u8; TRAILER_LEN] = patch[patch.len() - TRAILER_LEN..].try_into().unwrap();
        Ok(Self::split(bytes))
    }

    /// Read the trailer from the last 12 bytes of a byte source.
    pub fn read_from<S: ByteSource>(src: &mut S) -> Result<Self, ApplyError> {
        if src.len() < TRAILER_LEN as u64 {
            return Err(ApplyError::PatchTooSmall(src.len()));
        }
        let mut bytes = [0u8; TRAILER_LEN];
        src.read_at(src.len() - TRAILER_LEN as u64, &mut bytes)?;
        Ok(Self::split(&bytes))
    }

    /// Emit the trailer in container order.
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.source_crc32.to_le_bytes())?;
        w.write_all(&self.target_crc32.to_le_bytes())?;
        w.write_all(&self.patch_crc32.to_le_bytes())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
