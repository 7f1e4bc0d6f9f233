// Patch engine: strategy selection, resource scoping, checksum placement.
//
// Ties the container parsing (bps module) to the two memory-backing
// strategies and the integrity-verification contract:
//   - In-memory: patch and source snapshot live in owned buffers
//   - Spooled: source snapshot persisted to a spool file, patch streamed
// Both run the same interpreter; they differ only in the byte sources they
// construct.  Scratch resources are released on every exit path by
// ownership, never by per-return-site cleanup calls.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::bps::applier::PatchApplier;
use crate::bps::header::{PatchHeader, PatchTrailer};
use crate::bps::source::{ByteSource, FileSource, MemorySource};
use crate::error::ApplyError;

/// CRC-32 (IEEE) over a byte range, the checksum used by the patch trailer.
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Default scratch budget for automatic strategy selection.
pub const DEFAULT_SCRATCH_LIMIT: u64 = 64 << 20; // 64 MiB

/// How patch and source snapshot are backed during application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryStrategy {
    /// Pick based on the scratch budget in [`ApplyOptions`].
    Auto,
    /// Hold the whole patch and the source snapshot in memory.
    InMemory,
    /// Spool the source snapshot to a file and stream the patch.
    Spooled,
}

impl MemoryStrategy {
    /// Whether application should spool the source snapshot to disk rather
    /// than holding patch + snapshot in scratch memory.
    pub fn uses_spool(self, patch_len: u64, source_size: u32, scratch_limit: u64) -> bool {
        match self {
            MemoryStrategy::InMemory => false,
            MemoryStrategy::Spooled => true,
            MemoryStrategy::Auto => {
                patch_len.saturating_add(u64::from(source_size)) > scratch_limit
            }
        }
    }
}

/// Whether the trailer checksums are enforced.
///
/// `Skip` trades integrity for speed and was historically tied to the
/// spooled strategy; here it is an independent axis that must be requested
/// explicitly, whatever the backing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumPolicy {
    /// Verify the source checksum before any command runs and the target
    /// checksum after the command loop completes.
    Verify,
    /// Skip both checks.  The caller accepts that a corrupted or tampered
    /// image is only detectable downstream.
    Skip,
}

/// Configuration for patch application.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub strategy: MemoryStrategy,
    pub checksum: ChecksumPolicy,
    /// Scratch budget consulted by [`MemoryStrategy::Auto`].
    pub scratch_limit: u64,
    /// Directory for the spooled source snapshot (default: the system
    /// temporary directory).
    pub spool_dir: Option<PathBuf>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            strategy: MemoryStrategy::Auto,
            checksum: ChecksumPolicy::Verify,
            scratch_limit: DEFAULT_SCRATCH_LIMIT,
            spool_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of a successful [`apply_patch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No patch resource exists; the destination was left untouched.
    PatchAbsent,
    /// The patch was applied.
    Applied(AppliedPatch),
}

/// Facts about an applied patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedPatch {
    pub source_size: u32,
    pub target_size: u32,
    /// Checksums embedded in the patch trailer.
    pub source_crc32: u32,
    pub target_crc32: u32,
    /// Whether those checksums were actually verified.
    pub verified: bool,
}

// ---------------------------------------------------------------------------
// Top-level apply
// ---------------------------------------------------------------------------

/// Apply the patch at `patch_path` to `dest` in place.
///
/// `dest` is both the pre-patch source image and the post-patch target;
/// its length is the destination capacity.  An absent patch file is a
/// successful no-op.  On success with [`Outcome::Applied`], the first
/// `target_size` bytes of `dest` hold the reconstructed image.
///
/// On a failure that [`ApplyError::leaves_destination_dirty`], `dest` holds
/// partially applied, unverified bytes and must not be executed.
pub fn apply_patch(
    dest: &mut [u8],
    patch_path: &Path,
    opts: &ApplyOptions,
) -> Result<Outcome, ApplyError> {
    let file = match File::open(patch_path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("no patch at {}, leaving image untouched", patch_path.display());
            return Ok(Outcome::PatchAbsent);
        }
        Err(e) => return Err(e.into()),
    };

    let mut patch = FileSource::new(file)?;
    let header = PatchHeader::read_from(&mut patch)?;

    let applied = if opts
        .strategy
        .uses_spool(patch.len(), header.source_size, opts.scratch_limit)
    {
        debug!(
            "applying {} ({} bytes) spooled",
            patch_path.display(),
            patch.len()
        );
        apply_spooled(dest, patch, &header, opts)?
    } else {
        debug!(
            "applying {} ({} bytes) in memory",
            patch_path.display(),
            patch.len()
        );
        let mut bytes = Vec::with_capacity(patch.len() as usize);
        patch.seek_to(0)?;
        patch.read_to_end(&mut bytes)?;
        apply_patch_bytes(dest, &bytes, opts.checksum)?
    };

    Ok(Outcome::Applied(applied))
}

// ---------------------------------------------------------------------------
// Strategy A: fully in memory
// ---------------------------------------------------------------------------

/// Apply a fully in-memory patch to `dest` in place.
///
/// Snapshots the pre-patch destination into an owned buffer, zeroes the
/// destination, and reconstructs the target over it.  The snapshot is the
/// scratch region; dropping it is the guaranteed release.
pub fn apply_patch_bytes(
    dest: &mut [u8],
    patch: &[u8],
    checksum: ChecksumPolicy,
) -> Result<AppliedPatch, ApplyError> {
    let header = PatchHeader::decode(patch)?;
    let trailer = PatchTrailer::decode(patch)?;
    validate_sizes(&header, dest.len())?;

    let snapshot = dest[..header.source_size as usize].to_vec();
    verify_source(&snapshot, &trailer, checksum)?;

    dest.fill(0);
    let target = &mut dest[..header.target_size as usize];

    let mut patch_source = MemorySource::new(patch);
    patch_source.seek_to(header.command_start as u64)?;
    PatchApplier::new(MemorySource::new(&snapshot), patch_source, target).apply()?;

    verify_target(dest, &header, &trailer, checksum)
}

// ---------------------------------------------------------------------------
// Strategy B: spooled
// ---------------------------------------------------------------------------

/// Apply with the source snapshot persisted to a spool file and the patch
/// streamed from its open handle, writing in place into `dest`.
fn apply_spooled(
    dest: &mut [u8],
    mut patch: FileSource,
    header: &PatchHeader,
    opts: &ApplyOptions,
) -> Result<AppliedPatch, ApplyError> {
    let trailer = PatchTrailer::read_from(&mut patch)?;
    validate_sizes(header, dest.len())?;

    let snapshot = &dest[..header.source_size as usize];
    verify_source(snapshot, &trailer, opts.checksum)?;

    let spool_dir = opts.spool_dir.clone().unwrap_or_else(std::env::temp_dir);
    let spool = SpoolFile::create(&spool_dir, snapshot)?;
    debug!(
        "spooled {} source bytes to {}",
        header.source_size,
        spool.path().display()
    );

    let source = FileSource::new(spool.open()?)?;
    patch.seek_to(header.command_start as u64)?;
    let target = &mut dest[..header.target_size as usize];
    PatchApplier::new(source, patch, target).apply()?;

    verify_target(dest, header, &trailer, opts.checksum)
    // `spool` drops here, deleting the file on success and on every `?`
    // exit above that follows its creation.
}

/// A spool file that is deleted when dropped.
struct SpoolFile {
    path: PathBuf,
}

impl SpoolFile {
    /// Write `contents` to a fresh spool file in `dir`.  The guard owns the
    /// path from before the first write, so a partially written file is
    /// cleaned up too.
    fn create(dir: &Path, contents: &[u8]) -> io::Result<Self> {
        let path = dir.join(format!("bpstitch-{}.spool", std::process::id()));
        let guard = Self { path };
        fs::write(&guard.path, contents)?;
        Ok(guard)
    }

    fn open(&self) -> io::Result<File> {
        File::open(&self.path)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SpoolFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!("failed to remove spool file {}: {e}", self.path.display());
        }
    }
}

// ---------------------------------------------------------------------------
// Validation and verification
// ---------------------------------------------------------------------------

fn validate_sizes(header: &PatchHeader, capacity: usize) -> Result<(), ApplyError> {
    if u64::from(header.target_size) > capacity as u64 {
        return Err(ApplyError::TargetTooLarge {
            target_size: header.target_size,
            capacity: capacity as u64,
        });
    }
    if u64::from(header.source_size) > capacity as u64 {
        return Err(ApplyError::SourceTooLarge {
            source_size: header.source_size,
            capacity: capacity as u64,
        });
    }
    Ok(())
}

/// Strict-mode pre-check: refuse to touch the destination when the
/// pre-patch image is not the one this patch was built against.
fn verify_source(
    snapshot: &[u8],
    trailer: &PatchTrailer,
    checksum: ChecksumPolicy,
) -> Result<(), ApplyError> {
    match checksum {
        ChecksumPolicy::Verify => {
            let actual = crc32(snapshot);
            if actual != trailer.source_crc32 {
                return Err(ApplyError::SourceChecksumMismatch {
                    expected: trailer.source_crc32,
                    actual,
                });
            }
            Ok(())
        }
        ChecksumPolicy::Skip => {
            warn!("source checksum verification skipped");
            Ok(())
        }
    }
}

/// Post-loop check: the destination is already overwritten, so this is a
/// last-resort detector, not a preventer.
fn verify_target(
    dest: &[u8],
    header: &PatchHeader,
    trailer: &PatchTrailer,
    checksum: ChecksumPolicy,
) -> Result<AppliedPatch, ApplyError> {
    let verified = match checksum {
        ChecksumPolicy::Verify => {
            let actual = crc32(&dest[..header.target_size as usize]);
            if actual != trailer.target_crc32 {
                return Err(ApplyError::TargetChecksumMismatch {
                    expected: trailer.target_crc32,
                    actual,
                });
            }
            true
        }
        ChecksumPolicy::Skip => false,
    };
    Ok(AppliedPatch {
        source_size: header.source_size,
        target_size: header.target_size,
        source_crc32: trailer.source_crc32,
        target_crc32: trailer.target_crc32,
        verified,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
