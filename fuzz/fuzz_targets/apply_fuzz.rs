#![no_main]
use bpstitch::engine::{self, ChecksumPolicy};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Feed arbitrary bytes as a patch container.  The engine must never
    // panic or write out of bounds -- only return errors.
    let mut dest = vec![0x5Au8; 4096];
    let _ = engine::apply_patch_bytes(&mut dest, data, ChecksumPolicy::Verify);

    // Skip mode runs the interpreter even when the checksums are garbage,
    // so it reaches deeper into the command loop.
    let mut dest = vec![0x5Au8; 4096];
    let _ = engine::apply_patch_bytes(&mut dest, data, ChecksumPolicy::Skip);
});
