use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{CompressionLevel, ErrorPolicy, JarConfig};
use crate::relocate::Relocation;

#[derive(Parser, Debug)]
#[command(name = "jarpack")]
#[command(version)]
#[command(about = "Pack directories into JAR/ZIP archives and unpack them", long_about = None)]
#[command(after_help = "Examples:\n  \
  jarpack unpack forge.jar out/                  extract forge.jar into out/\n  \
  jarpack pack -l best out/ forge-repacked.jar   repack with maximum compression\n  \
  jarpack remap in.jar out.jar -m com.gson=lib.com.gson   move a package\n  \
  jarpack list -v app.jar                        list entries with sizes")]
pub struct Cli {
    /// Log every entry as it is processed
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pack a directory into an archive
    Pack(PackArgs),
    /// Unpack an archive into a directory
    Unpack(UnpackArgs),
    /// Rename package prefixes inside an archive
    Remap(RemapArgs),
    /// List the entries of an archive
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct PackArgs {
    /// Directory whose contents become the archive entries
    #[arg(value_name = "DIR")]
    pub input: PathBuf,

    /// Archive to create or overwrite
    #[arg(value_name = "ARCHIVE")]
    pub output: PathBuf,

    /// Compression level: default, store, fast, best or -1..=9
    #[arg(short = 'l', long, default_value = "default", allow_negative_numbers = true)]
    pub level: CompressionLevel,

    /// Sort entries by name for reproducible archives
    #[arg(long)]
    pub sorted: bool,

    /// Stop at the first file that cannot be read
    #[arg(long)]
    pub fail_fast: bool,
}

#[derive(Args, Debug)]
pub struct UnpackArgs {
    /// Archive to extract
    #[arg(value_name = "ARCHIVE")]
    pub input: PathBuf,

    /// Destination directory, created if missing
    #[arg(value_name = "DIR")]
    pub output: PathBuf,

    /// Skip entries that cannot be extracted instead of stopping
    #[arg(long)]
    pub keep_going: bool,

    /// Restore file modification times from the archive
    #[arg(long)]
    pub restore_times: bool,
}

#[derive(Args, Debug)]
pub struct RemapArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Relocation rule, e.g. com.google.gson=lib.com.google.gson
    #[arg(short = 'm', long = "map", value_name = "FROM=TO", required = true)]
    pub relocations: Vec<Relocation>,

    /// Compression level for the rewritten archive
    #[arg(short = 'l', long, default_value = "default", allow_negative_numbers = true)]
    pub level: CompressionLevel,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(value_name = "ARCHIVE")]
    pub input: PathBuf,

    /// Show sizes, compression ratio and timestamps
    #[arg(short = 'v')]
    pub verbose: bool,
}

impl Cli {
    /// Build the job configuration from the parsed arguments.
    pub fn config(&self) -> JarConfig {
        let mut config = JarConfig {
            debug: self.debug,
            ..JarConfig::default()
        };
        match &self.command {
            Command::Pack(args) => {
                config.compression = args.level;
                config.sort_entries = args.sorted;
                if args.fail_fast {
                    config.pack_errors = ErrorPolicy::Abort;
                }
            }
            Command::Unpack(args) => {
                if args.keep_going {
                    config.unpack_errors = ErrorPolicy::Continue;
                }
                config.restore_timestamps = args.restore_times;
            }
            Command::Remap(args) => config.compression = args.level,
            Command::List(_) => {}
        }
        config
    }

    pub fn log_filter(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }
}
