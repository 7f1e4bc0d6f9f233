// Patch application errors.
//
// An absent patch resource is not an error; the engine reports it as a
// no-op outcome.  Everything that can actually go wrong during decoding
// and application lands here, split into failures detected before the
// destination is touched and failures that leave it partially written.

use std::io;

use crate::bps::varint::VarIntError;

/// Error applying a BPS patch.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// The container does not start with the `BPS1` magic tag.
    #[error("bad patch magic: expected \"BPS1\"")]
    BadMagic,

    /// The container is too short to hold the prologue and trailer.
    #[error("patch too small to be a BPS container ({0} bytes)")]
    PatchTooSmall(u64),

    /// The header declares a metadata block, which this engine rejects.
    #[error("embedded metadata is not supported ({0} bytes)")]
    UnsupportedMetadata(u32),

    /// The declared target does not fit the destination buffer.
    #[error("target size {target_size} exceeds destination capacity {capacity}")]
    TargetTooLarge { target_size: u32, capacity: u64 },

    /// The declared source does not fit the destination buffer, so a
    /// pre-patch snapshot could not serve every source read.
    #[error("source size {source_size} exceeds destination capacity {capacity}")]
    SourceTooLarge { source_size: u32, capacity: u64 },

    /// A malformed varint in the patch prologue.
    #[error("varint: {0}")]
    Varint(#[from] VarIntError),

    /// A read or write against a backing store failed or came up short.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A command's computed read or write range falls outside the owning
    /// buffer.  Detected before the copy executes.
    #[error("{region} access out of bounds: offset {offset} + {len} exceeds capacity {capacity}")]
    OutOfBounds {
        region: Region,
        offset: i64,
        len: u32,
        capacity: u64,
    },

    /// The command stream did not stop exactly at the trailer boundary.
    #[error("command stream overran the trailer boundary ({position} past {boundary})")]
    CommandOverrun { position: u64, boundary: u64 },

    /// A command selector outside the four known kinds.  Unreachable for a
    /// two-bit selector, but handled rather than assumed.
    #[error("malformed command kind {0}")]
    MalformedCommand(u8),

    /// The pre-patch image does not match the checksum embedded in the
    /// patch.  Detected before any destination byte is touched.
    #[error("source checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    SourceChecksumMismatch { expected: u32, actual: u32 },

    /// The reconstructed image does not match the checksum embedded in the
    /// patch.  The destination has already been overwritten.
    #[error("target checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    TargetChecksumMismatch { expected: u32, actual: u32 },
}

/// Which buffer a command range check failed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Source,
    Target,
    Patch,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Region::Source => write!(f, "source"),
            Region::Target => write!(f, "target"),
            Region::Patch => write!(f, "patch"),
        }
    }
}

impl ApplyError {
    /// Whether the destination buffer may hold partially applied,
    /// unverified bytes when this error is returned.
    ///
    /// Validation failures are raised before the destination is touched and
    /// leave it intact; mid-interpretation failures and a target checksum
    /// mismatch do not.  Callers that are about to execute the destination
    /// as code should treat a dirty failure as unrecoverable for the
    /// in-progress load.  I/O failures are classified dirty even though
    /// some occur during pre-flight reads.
    pub fn leaves_destination_dirty(&self) -> bool {
        match self {
            ApplyError::BadMagic
            | ApplyError::PatchTooSmall(_)
            | ApplyError::UnsupportedMetadata(_)
            | ApplyError::TargetTooLarge { .. }
            | ApplyError::SourceTooLarge { .. }
            | ApplyError::Varint(_)
            | ApplyError::SourceChecksumMismatch { .. } => false,
            ApplyError::Io(_)
            | ApplyError::OutOfBounds { .. }
            | ApplyError::CommandOverrun { .. }
            | ApplyError::MalformedCommand(_)
            | ApplyError::TargetChecksumMismatch { .. } => true,
        }
    }
}
