//! Bpstitch: BPS binary-patch application in Rust.
//!
//! Applies a compact binary differential patch that transforms a known
//! source image into a target image, in place, before the image is run.
//!
//! The crate provides:
//! - A pure-Rust BPS container reader and command interpreter (`bps`)
//! - A memory-strategy orchestrator with in-memory and spooled backings (`engine`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use bpstitch::engine::{self, ApplyOptions, Outcome};
//!
//! // The buffer is both the pre-patch image and the patch destination;
//! // its length is the capacity the reconstructed target must fit.
//! let mut image = std::fs::read("code.bin").unwrap();
//! match engine::apply_patch(&mut image, "code.bps".as_ref(), &ApplyOptions::default()).unwrap() {
//!     Outcome::Applied(applied) => image.truncate(applied.target_size as usize),
//!     Outcome::PatchAbsent => {} // no patch: image left untouched
//! }
//! ```

pub mod bps;
pub mod engine;
pub mod error;
pub mod io;

#[cfg(feature = "cli")]
pub mod cli;
