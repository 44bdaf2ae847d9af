//! Archive to directory tree.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Component, Path, PathBuf};

use log::{debug, info, log, warn};

use crate::config::{ErrorPolicy, JarConfig};
use crate::error::{EntryFailure, Error, Result};
use crate::io::{copy_with_buffer, ReadAt};
use crate::zip::{ZipArchive, ZipFileEntry};

/// Outcome of an unpacking job.
#[derive(Debug, Default)]
pub struct UnpackReport {
    /// Absolute paths of the extracted files, in archive order.
    pub files: Vec<PathBuf>,
    /// Entries skipped under [`ErrorPolicy::Continue`].
    pub failures: Vec<EntryFailure>,
}

/// Extracts one archive into one directory.
pub struct Unpacker<'a> {
    archive: PathBuf,
    destination: PathBuf,
    config: &'a JarConfig,
}

impl<'a> Unpacker<'a> {
    pub fn new(archive: &Path, destination: &Path, config: &'a JarConfig) -> Result<Self> {
        if !archive.exists() {
            return Err(Error::Precondition(format!(
                "input archive {} does not exist",
                archive.display()
            )));
        }
        if !archive.is_file() {
            return Err(Error::Precondition(format!(
                "input archive {} is not a file",
                archive.display()
            )));
        }
        let destination = std::path::absolute(destination)
            .map_err(|e| Error::io_path("failed to resolve", destination, e))?;
        Ok(Self {
            archive: archive.to_path_buf(),
            destination,
            config,
        })
    }

    pub fn run(self) -> Result<UnpackReport> {
        let archive = ZipArchive::open(&self.archive)?;
        info!(
            "Unpacking {} ({} entries) into {}",
            self.archive.display(),
            archive.len(),
            self.destination.display()
        );

        if !self.destination.exists() {
            match fs::create_dir_all(&self.destination) {
                Ok(()) => debug!("Created output directory {}", self.destination.display()),
                Err(e) => warn!(
                    "Failed to create output directory {}: {e}",
                    self.destination.display()
                ),
            }
        }

        let mut buffer = self.config.transfer_buffer();
        let mut report = UnpackReport::default();

        for entry in archive.entries() {
            if entry.is_directory {
                continue;
            }

            match self.extract(&archive, entry, &mut buffer) {
                Ok(path) => report.files.push(path),
                Err(e) => {
                    let e = e.in_entry(&entry.file_name);
                    match self.config.unpack_errors {
                        ErrorPolicy::Abort => return Err(e),
                        ErrorPolicy::Continue => {
                            warn!("Skipping entry: {e}");
                            report.failures.push(EntryFailure::from_error(e));
                        }
                    }
                }
            }
        }

        info!(
            "Unpacked {} files from {} ({} skipped)",
            report.files.len(),
            self.archive.display(),
            report.failures.len()
        );
        Ok(report)
    }

    fn extract<R: ReadAt>(
        &self,
        archive: &ZipArchive<R>,
        entry: &ZipFileEntry,
        buffer: &mut [u8],
    ) -> Result<PathBuf> {
        let out_path = self.destination.join(relative_path(&entry.file_name)?);
        log!(
            self.config.progress_level(),
            "[Unpacking] {} => {}",
            entry.file_name,
            out_path.display()
        );

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::io_path("failed to create directory", parent, e))?;
        }

        let mut input = archive.open_entry(entry)?;
        let file = File::create(&out_path)
            .map_err(|e| Error::io_path("failed to create", &out_path, e))?;
        let mut output = BufWriter::new(file);
        copy_with_buffer(&mut input, &mut output, buffer).map_err(|e| match Error::from(e) {
            Error::Io { source, .. } => Error::io_path("failed to extract", &out_path, source),
            other => other,
        })?;
        let file = output
            .into_inner()
            .map_err(|e| Error::io_path("failed to write", &out_path, e.into_error()))?;

        if self.config.restore_timestamps {
            if let Some(modified) = entry.last_modified() {
                if let Err(e) = file.set_modified(modified) {
                    warn!("Failed to set modification time of {}: {e}", out_path.display());
                }
            }
        }

        Ok(out_path)
    }
}

/// Map a slash-separated entry name to a relative path, refusing anything
/// that could land outside the destination directory.
pub fn relative_path(name: &str) -> Result<PathBuf> {
    if name.starts_with('/') {
        return Err(Error::UnsafeEntryName(name.to_string()));
    }

    let mut path = PathBuf::new();
    for segment in name.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => path.push(part),
            _ => return Err(Error::UnsafeEntryName(name.to_string())),
        }
    }

    if path.as_os_str().is_empty() {
        return Err(Error::InvalidEntryName(name.to_string()));
    }
    Ok(path)
}
