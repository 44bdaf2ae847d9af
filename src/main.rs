//! Main entry point for the jarpack CLI application.

use anyhow::{Context, Result};
use clap::Parser;

use jarpack::cli::{Command, ListArgs};
use jarpack::{Cli, PathRelocator, RelocationMap, ZipArchive};

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .init();

    let config = cli.config();
    match &cli.command {
        Command::Pack(args) => {
            let report = jarpack::Packer::new(&args.input, &args.output, &config)?.run()?;
            let size = std::fs::metadata(&report.archive).map(|m| m.len()).unwrap_or(0);
            println!(
                "{}: {} files, {} directories, {}",
                report.archive.display(),
                report.files,
                report.directories,
                format_size(size)
            );
            for failure in &report.failures {
                eprintln!("skipped: {}", failure.error);
            }
        }
        Command::Unpack(args) => {
            let report = jarpack::Unpacker::new(&args.input, &args.output, &config)?.run()?;
            println!("{} files extracted", report.files.len());
            for failure in &report.failures {
                eprintln!("skipped: {}", failure.error);
            }
        }
        Command::Remap(args) => {
            let map = RelocationMap::try_from(args.relocations.as_slice())?;
            jarpack::remap(&args.input, &args.output, &map, &PathRelocator::new(&config))
                .with_context(|| format!("failed to remap {}", args.input.display()))?;
        }
        Command::List(args) => list_files(args)?,
    }

    Ok(())
}

/// List entries in the archive.
///
/// Supports two output formats:
/// - Simple format: just entry names, one per line
/// - Verbose format (`-v`): table with size, compression ratio and timestamps
fn list_files(args: &ListArgs) -> Result<()> {
    let archive = ZipArchive::open(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let verbose = args.verbose;

    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(70));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in archive.entries() {
        if !verbose {
            println!("{}", entry.file_name);
            continue;
        }

        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();

        let ratio = saved_ratio(entry.compressed_size, entry.uncompressed_size);

        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio,
            year,
            month,
            day,
            hour,
            minute,
            entry.file_name
        );

        if !entry.is_directory {
            total_uncompressed = total_uncompressed.saturating_add(entry.uncompressed_size);
            total_compressed = total_compressed.saturating_add(entry.compressed_size);
            file_count += 1;
        }
    }

    if verbose {
        println!("{}", "-".repeat(70));
        let total_ratio = saved_ratio(total_compressed, total_uncompressed);
        println!(
            "{:>10}  {:>10}  {}  {:>21}  {} files",
            total_uncompressed, total_compressed, total_ratio, "", file_count
        );
    }

    Ok(())
}

/// Compression ratio as percentage saved. Sizes come from the archive and
/// may be arbitrary, so the arithmetic is widened.
fn saved_ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed == 0 {
        return "  0%".to_string();
    }
    let kept = u128::from(compressed) * 100 / u128::from(uncompressed);
    format!("{:>4}%", 100 - kept as i128)
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_reports_space_saved() {
        assert_eq!(saved_ratio(25, 100), "  75%");
        assert_eq!(saved_ratio(100, 100), "   0%");
        assert_eq!(saved_ratio(0, 0), "  0%");
    }

    #[test]
    fn ratio_survives_hostile_sizes() {
        assert_eq!(saved_ratio(u64::MAX, 1), format!("{:>4}%", 100 - 100 * u64::MAX as i128));
        assert_eq!(saved_ratio(1, u64::MAX), " 100%");
    }
}
