// File-level helpers for patch application.
//
// `apply_file()` wraps the engine for whole files: it sizes the destination
// buffer from the patch header, applies in place, and writes the result.
// Optionally computes a SHA-256 of the output (feature-gated behind
// `file-io`).  `patch_info()` reads just the container framing.

use std::fs::File;
use std::io;
use std::path::Path;

#[cfg(feature = "file-io")]
use sha2::Digest;

use log::info;

use crate::bps::header::{PatchHeader, PatchTrailer, TRAILER_LEN};
use crate::bps::source::{ByteSource, FileSource};
use crate::engine::{self, ApplyOptions, Outcome};
use crate::error::ApplyError;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `apply_file()`.
#[derive(Debug, Clone)]
pub struct ApplyStats {
    /// Pre-patch image size in bytes.
    pub image_size: u64,
    /// Patch container size in bytes (`None` when the patch is absent).
    pub patch_size: Option<u64>,
    /// Output size in bytes.
    pub output_size: u64,
    /// Whether a patch was applied (false for the absent-patch no-op).
    pub patched: bool,
    /// Whether the trailer checksums were verified.
    pub verified: bool,
    /// Trailer checksums of the applied patch.
    pub source_crc32: Option<u32>,
    pub target_crc32: Option<u32>,
    /// SHA-256 of the output (if the `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// apply_file
// ---------------------------------------------------------------------------

/// Apply the patch at `patch_path` to the image at `image_path`, writing
/// the result to `output_path`.
///
/// The image is read fully into a buffer sized to hold both the image and
/// the declared target (reconstruction may grow the image), then patched in
/// place by the engine.  An absent patch copies the image through
/// unchanged.
pub fn apply_file(
    image_path: &Path,
    patch_path: &Path,
    output_path: &Path,
    opts: &ApplyOptions,
) -> Result<ApplyStats, ApplyError> {
    let image = std::fs::read(image_path)?;
    let image_size = image.len() as u64;

    // Peek at the patch framing to size the destination buffer.  A missing
    // file here is fine; the engine re-checks and reports the no-op.
    let framing = match File::open(patch_path) {
        Ok(file) => {
            let mut src = FileSource::new(file)?;
            let header = PatchHeader::read_from(&mut src)?;
            Some((src.len(), header))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    let capacity = match &framing {
        Some((_, header)) => (image.len() as u64)
            .max(u64::from(header.source_size))
            .max(u64::from(header.target_size)) as usize,
        None => image.len(),
    };

    let mut dest = image;
    dest.resize(capacity, 0);

    let outcome = engine::apply_patch(&mut dest, patch_path, opts)?;
    let (patched, verified, source_crc32, target_crc32) = match outcome {
        Outcome::Applied(applied) => {
            dest.truncate(applied.target_size as usize);
            (
                true,
                applied.verified,
                Some(applied.source_crc32),
                Some(applied.target_crc32),
            )
        }
        Outcome::PatchAbsent => {
            dest.truncate(image_size as usize);
            (false, false, None, None)
        }
    };

    std::fs::write(output_path, &dest)?;

    #[cfg(feature = "file-io")]
    let output_sha256 = {
        let mut hasher = sha2::Sha256::new();
        hasher.update(&dest);
        Some(hasher.finalize().into())
    };
    #[cfg(not(feature = "file-io"))]
    let output_sha256: Option<[u8; 32]> = None;

    if patched {
        info!(
            "patched {} ({} -> {} bytes)",
            image_path.display(),
            image_size,
            dest.len()
        );
    }

    Ok(ApplyStats {
        image_size,
        patch_size: framing.map(|(len, _)| len),
        output_size: dest.len() as u64,
        patched,
        verified,
        source_crc32,
        target_crc32,
        output_sha256,
    })
}

// ---------------------------------------------------------------------------
// patch_info
// ---------------------------------------------------------------------------

/// Container framing facts, read without applying anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchInfo {
    pub patch_size: u64,
    pub source_size: u32,
    pub target_size: u32,
    pub metadata_size: u32,
    /// Length of the command stream in bytes.
    pub command_bytes: u64,
    pub source_crc32: u32,
    pub target_crc32: u32,
    pub patch_crc32: u32,
}

/// Read the prologue and trailer of the patch at `path`.
pub fn patch_info(path: &Path) -> Result<PatchInfo, ApplyError> {
    let mut src = FileSource::new(File::open(path)?)?;
    let header = PatchHeader::read_from(&mut src)?;
    let trailer = PatchTrailer::read_from(&mut src)?;
    Ok(PatchInfo {
        patch_size: src.len(),
        source_size: header.source_size,
        target_size: header.target_size,
        metadata_size: header.metadata_size,
        command_bytes: src.len() - TRAILER_LEN as u64 - header.command_start as u64,
        source_crc32: trailer.source_crc32,
        target_crc32: trailer.target_crc32,
        patch_crc32: trailer.patch_crc32,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
