// Shared fixture builder: assembles well-formed BPS containers by
// simulating the interpreter's cursor model on the encoder side, so every
// test can compare against the exact target the commands describe.

use bpstitch::bps::header::{PatchHeader, PatchTrailer};
use bpstitch::bps::varint;
use bpstitch::engine::crc32;

pub struct PatchBuilder {
    source: Vec<u8>,
    target: Vec<u8>,
    commands: Vec<u8>,
    source_relative_offset: usize,
    target_relative_offset: usize,
}

#[allow(dead_code)] // not every test binary uses every command kind
impl PatchBuilder {
    pub fn new(source: &[u8]) -> Self {
        Self {
            source: source.to_vec(),
            target: Vec::new(),
            commands: Vec::new(),
            source_relative_offset: 0,
            target_relative_offset: 0,
        }
    }

    fn push_word(&mut self, kind: u32, run_length: usize) {
        assert!(run_length >= 1);
        varint::write_u32(&mut self.commands, (((run_length - 1) as u32) << 2) | kind).unwrap();
    }

    fn push_displacement(&mut self, delta: i64) {
        varint::write_u32(&mut self.commands, varint::pack_signed(delta)).unwrap();
    }

    /// kind 0: unchanged region, source at the current output position.
    pub fn source_read(&mut self, run_length: usize) -> &mut Self {
        self.push_word(0, run_length);
        let at = self.target.len();
        self.target.extend_from_slice(&self.source[at..at + run_length]);
        self
    }

    /// kind 1: literal bytes from the patch stream.
    pub fn target_read(&mut self, bytes: &[u8]) -> &mut Self {
        self.push_word(1, bytes.len());
        self.commands.extend_from_slice(bytes);
        self.target.extend_from_slice(bytes);
        self
    }

    /// kind 2: source bytes at `from`, addressed relative to the source cursor.
    pub fn source_copy(&mut self, from: usize, run_length: usize) -> &mut Self {
        self.push_word(2, run_length);
        self.push_displacement(from as i64 - self.source_relative_offset as i64);
        self.target.extend_from_slice(&self.source[from..from + run_length]);
        self.source_relative_offset = from + run_length;
        self
    }

    /// kind 3: target bytes at `from`, addressed relative to the target
    /// cursor, copied byte-wise so overlap repeats the seed.
    pub fn target_copy(&mut self, from: usize, run_length: usize) -> &mut Self {
        self.push_word(3, run_length);
        self.push_displacement(from as i64 - self.target_relative_offset as i64);
        let mut read = from;
        for _ in 0..run_length {
            let byte = self.target[read];
            self.target.push(byte);
            read += 1;
        }
        self.target_relative_offset = from + run_length;
        self
    }

    /// The target image the built patch reconstructs.
    pub fn target(&self) -> &[u8] {
        &self.target
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Assemble the container: prologue, commands, checksum trailer.
    pub fn build(&self) -> Vec<u8> {
        let mut patch = Vec::new();
        let header = PatchHeader {
            source_size: self.source.len() as u32,
            target_size: self.target.len() as u32,
            metadata_size: 0,
            command_start: 0,
        };
        header.encode(&mut patch).unwrap();
        patch.extend_from_slice(&self.commands);
        let trailer = PatchTrailer {
            source_crc32: crc32(&self.source),
            target_crc32: crc32(&self.target),
            patch_crc32: 0,
        };
        trailer.encode(&mut patch).unwrap();
        let patch_crc = crc32(&patch[..patch.len() - 4]);
        let len = patch.len();
        patch[len - 4..].copy_from_slice(&patch_crc.to_le_bytes());
        patch
    }
}
