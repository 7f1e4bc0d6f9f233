// BPS command interpretation: reconstructs the target byte stream.
//
// Implemented once against `ByteSource`, so the in-memory and spooled
// strategies share a single dispatch loop.  The patch is treated as
// adversarial input: every computed read/write range is validated against
// the owning buffer's capacity before the copy executes, and the command
// loop must land exactly on the trailer boundary.

use super::header::TRAILER_LEN;
use super::source::ByteSource;
use super::varint;
use crate::error::{ApplyError, Region};

/// The four-command interpreter.
///
/// Three independent cursors are threaded through the whole run: the next
/// absolute write position in the target, and the relatively-addressed read
/// positions into source and target.  All start at zero and never reset.
///
/// `target` must already be sized to the declared target size, which the
/// format bounds at `u32::MAX`.
pub struct PatchApplier<'d, S, P> {
    source: S,
    patch: P,
    target: &'d mut [u8],
    output_offset: u32,
    source_relative_offset: u32,
    target_relative_offset: u32,
}

impl<'d, S: ByteSource, P: ByteSource> PatchApplier<'d, S, P> {
    /// `patch` must be positioned at the start of the command stream.
    pub fn new(source: S, patch: P, target: &'d mut [u8]) -> Self {
        debug_assert!(target.len() as u64 <= u64::from(u32::MAX));
        Self {
            source,
            patch,
            target,
            output_offset: 0,
            source_relative_offset: 0,
            target_relative_offset: 0,
        }
    }

    /// Run every command up to the trailer boundary.
    pub fn apply(mut self) -> Result<(), ApplyError> {
        if self.patch.len() < TRAILER_LEN as u64 {
            return Err(ApplyError::PatchTooSmall(self.patch.len()));
        }
        let command_end = self.patch.len() - TRAILER_LEN as u64;

        while self.patch.position() < command_end {
            let word = varint::stream_decode_u32(&mut self.patch)?;
            let run_length = (word >> 2) + 1;
            match word & 3 {
                0 => self.source_read(run_length)?,
                1 => self.target_read(run_length, command_end)?,
                2 => self.source_copy(run_length)?,
                3 => self.target_copy(run_length)?,
                other => return Err(ApplyError::MalformedCommand(other as u8)),
            }
        }

        // A command (or its varints) must not spill into the trailer.
        if self.patch.position() != command_end {
            return Err(ApplyError::CommandOverrun {
                position: self.patch.position(),
                boundary: command_end,
            });
        }
        Ok(())
    }

    /// Validate and return the output range `output_offset .. +len`.
    fn output_span(&self, len: u32) -> Result<std::ops::Range<usize>, ApplyError> {
        let start = u64::from(self.output_offset);
        let end = start + u64::from(len);
        if end > self.target.len() as u64 {
            return Err(ApplyError::OutOfBounds {
                region: Region::Target,
                offset: start as i64,
                len,
                capacity: self.target.len() as u64,
            });
        }
        Ok(start as usize..end as usize)
    }

    /// Apply a signed displacement to a relative cursor, bounds-checking
    /// the resulting `len`-byte read range against `capacity`.
    fn displaced(&mut self, cursor: u32, len: u32, region: Region, capacity: u64) -> Result<u64, ApplyError> {
        let raw = varint::stream_decode_u32(&mut self.patch)?;
        let pos = i64::from(cursor) + varint::unpack_signed(raw);
        if pos < 0 || pos as u64 + u64::from(len) > capacity {
            return Err(ApplyError::OutOfBounds {
                region,
                offset: pos,
                len,
                capacity,
            });
        }
        Ok(pos as u64)
    }

    /// kind 0: source bytes at the current output position.
    fn source_read(&mut self, len: u32) -> Result<(), ApplyError> {
        let span = self.output_span(len)?;
        let offset = u64::from(self.output_offset);
        if offset + u64::from(len) > self.source.len() {
            return Err(ApplyError::OutOfBounds {
                region: Region::Source,
                offset: offset as i64,
                len,
                capacity: self.source.len(),
            });
        }
        self.source.read_at(offset, &mut self.target[span])?;
        self.output_offset += len;
        Ok(())
    }

    /// kind 1: literal bytes from the patch stream.
    fn target_read(&mut self, len: u32, command_end: u64) -> Result<(), ApplyError> {
        let span = self.output_span(len)?;
        let position = self.patch.position();
        if position + u64::from(len) > command_end {
            return Err(ApplyError::OutOfBounds {
                region: Region::Patch,
                offset: position as i64,
                len,
                capacity: command_end,
            });
        }
        self.patch.read_next(&mut self.target[span])?;
        self.output_offset += len;
        Ok(())
    }

    /// kind 2: source bytes at a relatively-addressed position.
    fn source_copy(&mut self, len: u32) -> Result<(), ApplyError> {
        let source_len = self.source.len();
        let pos = self.displaced(self.source_relative_offset, len, Region::Source, source_len)?;
        let span = self.output_span(len)?;
        self.source.read_at(pos, &mut self.target[span])?;
        self.source_relative_offset = (pos + u64::from(len)) as u32;
        self.output_offset += len;
        Ok(())
    }

    /// kind 3: target bytes at a relatively-addressed position.
    ///
    /// The copy is byte-wise by contract: when the read range overlaps the
    /// write range, each byte read must observe the bytes just written,
    /// turning a short seed into a repeating pattern.
    fn target_copy(&mut self, len: u32) -> Result<(), ApplyError> {
        let capacity = self.target.len() as u64;
        let pos = self.displaced(self.target_relative_offset, len, Region::Target, capacity)?;
        let span = self.output_span(len)?;

        let mut read = pos as usize;
        for write in span {
            self.target[write] = self.target[read];
            read += 1;
        }

        self.target_relative_offset = (pos + u64::from(len)) as u32;
        self.output_offset += len;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bps::source::MemorySource;

    // Byte-program helpers: hand-encode commands, append an all-zero
    // trailer so the boundary arithmetic matches a real container.

    fn cmd(kind: u32, run_length: u32) -> Vec<u8> {
        let mut buf = [0u8; varint::MAX_VARINT_LEN];
        let len = varint::encode_u32(((run_length - 1) << 2) | kind, &mut buf);
        buf[..len].to_vec()
    }

    fn displacement(delta: i64) -> Vec<u8> {
        let mut buf = [0u8; varint::MAX_VARINT_LEN];
        let len = varint::encode_u32(varint::pack_signed(delta), &mut buf);
        buf[..len].to_vec()
    }

    fn with_trailer(commands: &[&[u8]]) -> Vec<u8> {
        let mut patch: Vec<u8> = commands.concat();
        patch.extend_from_slice(&[0u8; TRAILER_LEN]);
        patch
    }

    fn run(source: &[u8], patch: &[u8], target: &mut [u8]) -> Result<(), ApplyError> {
        PatchApplier::new(MemorySource::new(source), MemorySource::new(patch), target).apply()
    }

    #[test]
    fn literal_copy_writes_patch_bytes() {
        let patch = with_trailer(&[&cmd(1, 3), &[0xAA, 0xBB, 0xCC]]);
        let mut target = [0u8; 3];
        run(&[], &patch, &mut target).unwrap();
        assert_eq!(target, [0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn source_read_copies_unchanged_region() {
        let source = [1u8, 2, 3, 4, 5];
        let patch = with_trailer(&[&cmd(0, 5)]);
        let mut target = [0u8; 5];
        run(&source, &patch, &mut target).unwrap();
        assert_eq!(target, source);
    }

    #[test]
    fn source_copy_follows_displacements() {
        let source = *b"ABCDEFGH";
        // Copy "EFG" (displacement +4 from cursor 0), then "ABC"
        // (cursor is now 7, so displacement -7).
        let patch = with_trailer(&[
            &cmd(2, 3),
            &displacement(4),
            &cmd(2, 3),
            &displacement(-7),
        ]);
        let mut target = [0u8; 6];
        run(&source, &patch, &mut target).unwrap();
        assert_eq!(&target, b"EFGABC");
    }

    #[test]
    fn overlapping_target_copy_expands_run() {
        // Seed one 0x7F byte, then self-copy ten bytes from one position
        // back.  Byte-wise semantics must repeat the seed, not alias.
        let patch = with_trailer(&[
            &cmd(1, 1),
            &[0x7F],
            &cmd(3, 10),
            &displacement(0),
        ]);
        let mut target = [0u8; 11];
        run(&[], &patch, &mut target).unwrap();
        assert_eq!(target, [0x7F; 11]);
    }

    #[test]
    fn target_copy_backwards_region() {
        let patch = with_trailer(&[
            &cmd(1, 4),
            b"WXYZ",
            &cmd(3, 2),
            &displacement(1), // read from offset 1: "XY"
        ]);
        let mut target = [0u8; 6];
        run(&[], &patch, &mut target).unwrap();
        assert_eq!(&target, b"WXYZXY");
    }

    #[test]
    fn write_past_target_is_out_of_bounds() {
        let patch = with_trailer(&[&cmd(1, 4), b"WXYZ"]);
        let mut target = [0u8; 3];
        let err = run(&[], &patch, &mut target).unwrap_err();
        assert!(matches!(
            err,
            ApplyError::OutOfBounds {
                region: Region::Target,
                ..
            }
        ));
    }

    #[test]
    fn source_read_past_source_is_out_of_bounds() {
        let source = [9u8; 2];
        let patch = with_trailer(&[&cmd(0, 4)]);
        let mut target = [0u8; 4];
        let err = run(&source, &patch, &mut target).unwrap_err();
        assert!(matches!(
            err,
            ApplyError::OutOfBounds {
                region: Region::Source,
                ..
            }
        ));
    }

    #[test]
    fn displacement_underflow_is_out_of_bounds() {
        let source = [9u8; 8];
        let patch = with_trailer(&[&cmd(2, 1), &displacement(-1)]);
        let mut target = [0u8; 1];
        let err = run(&source, &patch, &mut target).unwrap_err();
        assert!(matches!(
            err,
            ApplyError::OutOfBounds {
                region: Region::Source,
                offset: -1,
                ..
            }
        ));
    }

    #[test]
    fn literal_run_into_trailer_is_rejected() {
        // run_length 4 but only 2 literal bytes before the trailer.
        let patch = with_trailer(&[&cmd(1, 4), &[0xAA, 0xBB]]);
        let mut target = [0u8; 4];
        let err = run(&[], &patch, &mut target).unwrap_err();
        assert!(matches!(
            err,
            ApplyError::OutOfBounds {
                region: Region::Patch,
                ..
            }
        ));
    }

    #[test]
    fn command_crossing_the_boundary_is_an_overrun() {
        // The last command's varint terminates inside the trailer: the
        // command itself executes, but the cursor passes the boundary.
        let mut patch = vec![0x00]; // single continuation byte as the command region
        let mut trailer = [0u8; TRAILER_LEN];
        trailer[0] = 0x84; // varint terminator lands inside the trailer
        patch.extend_from_slice(&trailer);

        let source = [5u8; 200];
        let mut target = [0u8; 200];
        let err = run(&source, &patch, &mut target).unwrap_err();
        assert!(matches!(
            err,
            ApplyError::CommandOverrun {
                position: 2,
                boundary: 1
            }
        ));
    }

    #[test]
    fn truncated_command_varint_is_rejected() {
        // All-continuation bytes never terminate; the decoder must error
        // out instead of reading past the end of the patch.
        let patch = with_trailer(&[&[0x00]]);
        let mut target = [0u8; 8];
        assert!(matches!(
            run(&[], &patch, &mut target),
            Err(ApplyError::Io(_))
        ));
    }

    #[test]
    fn empty_command_stream_is_a_noop() {
        let patch = with_trailer(&[]);
        let mut target = [0u8; 0];
        run(&[], &patch, &mut target).unwrap();
    }
}
