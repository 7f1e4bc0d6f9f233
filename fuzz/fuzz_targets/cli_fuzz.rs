#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|args: Vec<String>| {
    // Argument parsing must never panic, whatever the argv.
    bpstitch::cli::fuzz_try_parse_args(&args);
});
