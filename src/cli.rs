// Command-line front end for bpstitch.
//
// Subcommands: `apply` (patch an image, in place or to a new file),
// `info` (print container framing), `verify` (check an image against the
// checksums embedded in a patch).

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::engine::{
    self, ApplyOptions, ChecksumPolicy, DEFAULT_SCRATCH_LIMIT, MemoryStrategy,
};
use crate::io::{apply_file, patch_info};

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

/// Ordinary failure: the destination was never touched.
const EXIT_FAILURE: i32 = 1;
/// Failure after the destination was partially written.  Callers that were
/// about to execute the image should treat this as unrecoverable.
const EXIT_DIRTY: i32 = 2;

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// BPS binary patch applier.
#[derive(Parser, Debug)]
#[command(
    name = "bpstitch",
    version,
    about = "BPS binary patch applier",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Apply a BPS patch to an image.
    Apply(ApplyArgs),
    /// Print patch container information.
    Info(InfoArgs),
    /// Check an image against the checksums embedded in a patch.
    Verify(VerifyArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    /// Pick based on the scratch limit.
    Auto,
    /// Hold patch and source snapshot in memory.
    Memory,
    /// Spool the source snapshot to disk, stream the patch.
    Spooled,
}

impl From<StrategyArg> for MemoryStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Auto => MemoryStrategy::Auto,
            StrategyArg::Memory => MemoryStrategy::InMemory,
            StrategyArg::Spooled => MemoryStrategy::Spooled,
        }
    }
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Image to patch.
    #[arg(value_hint = ValueHint::FilePath)]
    image: PathBuf,

    /// BPS patch file.  A missing patch is a successful no-op.
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,

    /// Output file (default: patch the image in place).
    #[arg(value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Memory-backing strategy.
    #[arg(long, value_enum, default_value_t = StrategyArg::Auto)]
    strategy: StrategyArg,

    /// Scratch memory budget for auto strategy selection (supports K/M/G suffix).
    #[arg(long = "scratch-limit", value_parser = parse_byte_size, default_value_t = DEFAULT_SCRATCH_LIMIT)]
    scratch_limit: u64,

    /// Directory for the spooled source snapshot.
    #[arg(long = "spool-dir", value_hint = ValueHint::DirPath)]
    spool_dir: Option<PathBuf>,

    /// Skip source/target checksum verification.
    #[arg(long = "no-verify")]
    no_verify: bool,
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// BPS patch file.
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// Image to check.
    #[arg(value_hint = ValueHint::FilePath)]
    image: PathBuf,

    /// BPS patch file.
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,

    /// Check against the embedded target checksum instead of the source.
    #[arg(long = "target")]
    as_target: bool,
}

// ---------------------------------------------------------------------------
// Apply command
// ---------------------------------------------------------------------------

fn build_apply_options(args: &ApplyArgs) -> ApplyOptions {
    ApplyOptions {
        strategy: args.strategy.into(),
        checksum: if args.no_verify {
            ChecksumPolicy::Skip
        } else {
            ChecksumPolicy::Verify
        },
        scratch_limit: args.scratch_limit,
        spool_dir: args.spool_dir.clone(),
    }
}

fn cmd_apply(cli: &Cli, args: &ApplyArgs) -> i32 {
    let output = args.output.clone().unwrap_or_else(|| args.image.clone());
    let in_place = output == args.image;

    if !in_place && output.exists() && !cli.force {
        eprintln!(
            "bpstitch: output file exists, use -f to overwrite: {}",
            output.display()
        );
        return EXIT_FAILURE;
    }

    let opts = build_apply_options(args);
    let stats = match apply_file(&args.image, &args.patch, &output, &opts) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("bpstitch: apply: {e}");
            return if e.leaves_destination_dirty() {
                EXIT_DIRTY
            } else {
                EXIT_FAILURE
            };
        }
    };

    if !cli.quiet {
        if stats.patched {
            if cli.verbose > 0 {
                eprintln!(
                    "bpstitch: applied {} ({} -> {} bytes, {})",
                    args.patch.display(),
                    stats.image_size,
                    stats.output_size,
                    if stats.verified {
                        "verified"
                    } else {
                        "unverified"
                    }
                );
            }
        } else {
            eprintln!(
                "bpstitch: no patch at {}, image copied unchanged",
                args.patch.display()
            );
        }
    }

    if cli.json_output {
        let json = serde_json::json!({
            "command": "apply",
            "image_size": stats.image_size,
            "patch_size": stats.patch_size,
            "output_size": stats.output_size,
            "patched": stats.patched,
            "verified": stats.verified,
            "target_crc32": stats.target_crc32,
        });
        eprintln!("{}", serde_json::to_string_pretty(&json).unwrap());
    }

    0
}

// ---------------------------------------------------------------------------
// Info command
// ---------------------------------------------------------------------------

fn cmd_info(cli: &Cli, args: &InfoArgs) -> i32 {
    let info = match patch_info(&args.patch) {
        Ok(info) => info,
        Err(e) => {
            eprintln!("bpstitch: {}: {e}", args.patch.display());
            return EXIT_FAILURE;
        }
    };

    if cli.json_output {
        let json = serde_json::json!({
            "command": "info",
            "patch_size": info.patch_size,
            "source_size": info.source_size,
            "target_size": info.target_size,
            "metadata_size": info.metadata_size,
            "command_bytes": info.command_bytes,
            "source_crc32": info.source_crc32,
            "target_crc32": info.target_crc32,
            "patch_crc32": info.patch_crc32,
        });
        eprintln!("{}", serde_json::to_string_pretty(&json).unwrap());
        return 0;
    }

    println!("BPS patch:          {}", args.patch.display());
    println!("BPS patch size:     {}", info.patch_size);
    println!("BPS source size:    {}", info.source_size);
    println!("BPS target size:    {}", info.target_size);
    println!("BPS metadata size:  {}", info.metadata_size);
    println!("BPS command bytes:  {}", info.command_bytes);
    println!("BPS source crc32:   {:08X}", info.source_crc32);
    println!("BPS target crc32:   {:08X}", info.target_crc32);
    println!("BPS patch crc32:    {:08X}", info.patch_crc32);

    0
}

// ---------------------------------------------------------------------------
// Verify command
// ---------------------------------------------------------------------------

fn cmd_verify(cli: &Cli, args: &VerifyArgs) -> i32 {
    let info = match patch_info(&args.patch) {
        Ok(info) => info,
        Err(e) => {
            eprintln!("bpstitch: {}: {e}", args.patch.display());
            return EXIT_FAILURE;
        }
    };

    let image = match std::fs::read(&args.image) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("bpstitch: {}: {e}", args.image.display());
            return EXIT_FAILURE;
        }
    };

    let (what, expected) = if args.as_target {
        ("target", info.target_crc32)
    } else {
        ("source", info.source_crc32)
    };
    let actual = engine::crc32(&image);

    if actual != expected {
        eprintln!(
            "bpstitch: {} checksum mismatch: patch expects {expected:08X}, image is {actual:08X}",
            what
        );
        return EXIT_FAILURE;
    }

    if !cli.quiet {
        eprintln!(
            "bpstitch: {} matches the patch {what} checksum ({actual:08X})",
            args.image.display()
        );
    }

    0
}

// ---------------------------------------------------------------------------
// Fuzzing shim
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("bpstitch".to_string())
        .chain(args.iter().cloned())
        .collect();
    let _ = Cli::try_parse_from(argv);
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point.  Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = Cli::parse();

    let exit_code = match &cli.command {
        Cmd::Apply(args) => cmd_apply(&cli, args),
        Cmd::Info(args) => cmd_info(&cli, args),
        Cmd::Verify(args) => cmd_verify(&cli, args),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
