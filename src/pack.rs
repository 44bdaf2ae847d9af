//! Directory tree to archive.

use std::fs::{self, File};
use std::io::{BufWriter, Seek, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use log::{error, info, log, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::{ErrorPolicy, JarConfig};
use crate::error::{EntryFailure, Error, Result};
use crate::io::copy_with_buffer;
use crate::zip::ZipWriter;

/// Outcome of a packing job.
#[derive(Debug)]
pub struct PackReport {
    pub archive: PathBuf,
    pub files: usize,
    pub directories: usize,
    /// Entries skipped under [`ErrorPolicy::Continue`].
    pub failures: Vec<EntryFailure>,
}

/// Packs one directory into one archive.
pub struct Packer<'a> {
    source: PathBuf,
    destination: PathBuf,
    config: &'a JarConfig,
}

impl<'a> Packer<'a> {
    /// Validate inputs. Nothing is created on disk until [`run`](Self::run).
    pub fn new(source: &Path, destination: &Path, config: &'a JarConfig) -> Result<Self> {
        if !source.exists() {
            return Err(Error::Precondition(format!(
                "input directory {} does not exist",
                source.display()
            )));
        }
        if !source.is_dir() {
            return Err(Error::Precondition(format!(
                "input {} is not a directory",
                source.display()
            )));
        }
        if destination.as_os_str().is_empty() {
            return Err(Error::Precondition("output archive path is empty".to_string()));
        }
        if destination.is_dir() {
            return Err(Error::Precondition(format!(
                "output archive {} is a directory",
                destination.display()
            )));
        }
        Ok(Self {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            config,
        })
    }

    pub fn run(self) -> Result<PackReport> {
        info!("Packing {} into {}", self.source.display(), self.destination.display());

        let file = File::create(&self.destination)
            .map_err(|e| Error::io_path("failed to create archive", &self.destination, e))?;
        let mut writer = ZipWriter::new(BufWriter::new(file), self.config.compression)?;

        let mut report = PackReport {
            archive: self.destination.clone(),
            files: 0,
            directories: 0,
            failures: Vec::new(),
        };
        let walked = self.walk(&mut writer, &mut report);

        // The central directory is written even when the walk was cut short
        if let Err(e) = writer.finish().and_then(trim_archive) {
            error!(
                "Failed to close {}, the archive is incomplete: {e}",
                self.destination.display()
            );
        }
        walked?;

        info!(
            "Packed {} ({} files, {} directories, {} skipped)",
            self.destination.display(),
            report.files,
            report.directories,
            report.failures.len()
        );
        Ok(report)
    }

    fn walk<W: Write + Seek>(
        &self,
        writer: &mut ZipWriter<W>,
        report: &mut PackReport,
    ) -> Result<()> {
        let mut buffer = self.config.transfer_buffer();
        let skip = fs::canonicalize(&self.destination).ok();

        let mut walker = WalkDir::new(&self.source).min_depth(1).follow_links(true);
        if self.config.sort_entries {
            walker = walker.sort_by_file_name();
        }

        for item in walker {
            let result = match item {
                Ok(entry) => {
                    if skip.is_some() && fs::canonicalize(entry.path()).ok() == skip {
                        continue;
                    }
                    self.add_entry(writer, &entry, &mut buffer, report)
                }
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.source.clone());
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
                    Err(Error::io_path("failed to read", &path, source))
                }
            };

            if let Err(e) = result {
                match self.config.pack_errors {
                    ErrorPolicy::Abort => return Err(e),
                    ErrorPolicy::Continue => {
                        warn!("Skipping entry: {e}");
                        report.failures.push(EntryFailure::from_error(e));
                    }
                }
            }
        }
        Ok(())
    }

    fn add_entry<W: Write + Seek>(
        &self,
        writer: &mut ZipWriter<W>,
        entry: &DirEntry,
        buffer: &mut [u8],
        report: &mut PackReport,
    ) -> Result<()> {
        let path = entry.path();
        let name = entry_name(&self.source, path)?;
        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or_else(SystemTime::now);

        if entry.file_type().is_dir() {
            log!(self.config.progress_level(), "[Packing] {name}/");
            writer
                .add_directory(&name, modified)
                .map_err(|e| e.in_entry(format!("{name}/")))?;
            report.directories += 1;
            return Ok(());
        }

        if !entry.file_type().is_file() {
            warn!("Skipping {}: not a regular file", path.display());
            return Ok(());
        }

        log!(self.config.progress_level(), "[Packing] {} => {name}", path.display());
        let mut input =
            File::open(path).map_err(|e| Error::io_path("failed to open", path, e).in_entry(&name))?;
        writer.start_file(&name, modified).map_err(|e| e.in_entry(&name))?;
        if let Err(e) = copy_with_buffer(&mut input, writer, buffer) {
            // A partial entry must not reach the archive
            writer.discard_entry().map_err(|e| e.in_entry(&name))?;
            return Err(Error::io_path("failed to copy", path, e).in_entry(&name));
        }
        writer.close_entry().map_err(|e| e.in_entry(&name))?;

        report.files += 1;
        Ok(())
    }
}

/// Cut off bytes left past the end of the archive by discarded entries.
fn trim_archive(sink: BufWriter<File>) -> Result<()> {
    let mut file = sink
        .into_inner()
        .map_err(|e| Error::io("failed to flush archive", e.into_error()))?;
    let end = file
        .stream_position()
        .map_err(|e| Error::io("failed to query archive position", e))?;
    file.set_len(end)
        .map_err(|e| Error::io("failed to truncate archive", e))
}

/// Archive name of `path`: its components relative to `root`, joined by `/`.
pub fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        Error::InvalidEntryName(format!("{} is outside {}", path.display(), root.display()))
    })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| Error::InvalidEntryName(relative.to_string_lossy().into_owned()))?;
                parts.push(part);
            }
            Component::CurDir => {}
            _ => return Err(Error::InvalidEntryName(relative.to_string_lossy().into_owned())),
        }
    }
    if parts.is_empty() {
        return Err(Error::InvalidEntryName(String::new()));
    }
    Ok(parts.join("/"))
}
