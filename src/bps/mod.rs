// BPS patch container implementation.
//
// This module provides decoding and application of the BPS binary
// differential-patch format: prologue, command stream, checksum trailer.
//
// # Modules
//
// - `varint`  — Variable-length integer codec (additive base-128)
// - `header`  — Container prologue and checksum trailer
// - `source`  — Random-access byte-source capability and its two backings
// - `applier` — The four-command patch interpreter

pub mod applier;
pub mod header;
pub mod source;
pub mod varint;

// Re-export key types for convenience.
pub use applier::PatchApplier;
pub use header::{BPS_MAGIC, PatchHeader, PatchTrailer, TRAILER_LEN};
pub use source::{ByteSource, FileSource, MemorySource};
