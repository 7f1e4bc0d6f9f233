fn main() {
    #[cfg(feature = "cli")]
    bpstitch::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("bpstitch: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
