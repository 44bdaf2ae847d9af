//! Relocation: rewriting package prefixes inside an existing archive.
//!
//! Rewriting the type references embedded in class files is the job of a
//! bytecode library plugged in through [`Relocator`]. The crate ships
//! [`PathRelocator`], which moves entries to their relocated paths and
//! leaves entry content untouched.

use std::borrow::Cow;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;

use log::{info, log};

use crate::config::JarConfig;
use crate::error::{Error, Result};
use crate::io::copy_with_buffer;
use crate::zip::{ZipArchive, ZipWriter};

/// Ordered mapping from source prefix to destination prefix.
///
/// Prefixes are stored in path form (`com/google/gson`); package form
/// (`com.google.gson`) is converted on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationMap {
    rules: Vec<(String, String)>,
}

impl RelocationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: &str, to: &str) -> Result<()> {
        let from = normalize_prefix(from)?;
        let to = normalize_prefix(to)?;
        match self.rules.iter_mut().find(|(f, _)| *f == from) {
            Some(rule) => rule.1 = to,
            None => self.rules.push((from, to)),
        }
        Ok(())
    }

    pub fn rules(&self) -> &[(String, String)] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Relocated name of an entry. The longest matching prefix wins; a
    /// prefix only matches whole path segments.
    pub fn apply<'n>(&self, name: &'n str) -> Cow<'n, str> {
        let best = self
            .rules
            .iter()
            .filter(|(from, _)| {
                name.strip_prefix(from.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
            .max_by_key(|(from, _)| from.len());

        match best {
            Some((from, to)) => Cow::Owned(format!("{to}{}", &name[from.len()..])),
            None => Cow::Borrowed(name),
        }
    }
}

fn normalize_prefix(prefix: &str) -> Result<String> {
    let normalized = prefix.trim().replace('.', "/");
    let normalized = normalized.trim_matches('/');
    if normalized.is_empty() || normalized.contains("//") || normalized.contains('\\') {
        return Err(Error::Relocation(format!("invalid relocation prefix {prefix:?}")));
    }
    Ok(normalized.to_string())
}

/// One `FROM=TO` rule, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub from: String,
    pub to: String,
}

impl FromStr for Relocation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (from, to) = s
            .split_once('=')
            .ok_or_else(|| format!("expected FROM=TO, got {s:?}"))?;
        Ok(Relocation {
            from: from.trim().to_string(),
            to: to.trim().to_string(),
        })
    }
}

impl TryFrom<&[Relocation]> for RelocationMap {
    type Error = Error;

    fn try_from(relocations: &[Relocation]) -> Result<Self> {
        let mut map = RelocationMap::new();
        for r in relocations {
            map.insert(&r.from, &r.to)?;
        }
        Ok(map)
    }
}

/// Something that can produce a relocated copy of an archive.
pub trait Relocator {
    /// Read `input` and write a complete, valid archive to `output`.
    fn relocate(&self, input: &Path, output: &Path, map: &RelocationMap) -> Result<()>;
}

/// Relocate `input` into `output` using `relocator`.
///
/// The relocator writes into a temporary file next to `output`, which then
/// replaces `output` in one rename. A failed relocation leaves `output`
/// untouched. `input` and `output` may be the same file.
pub fn remap(
    input: &Path,
    output: &Path,
    map: &RelocationMap,
    relocator: &dyn Relocator,
) -> Result<()> {
    if !input.is_file() {
        return Err(Error::Precondition(format!(
            "input archive {} is not a file",
            input.display()
        )));
    }
    if output.as_os_str().is_empty() || output.is_dir() {
        return Err(Error::Precondition(format!(
            "output archive {} is not a file path",
            output.display()
        )));
    }
    if map.is_empty() {
        return Err(Error::Precondition("no relocations given".to_string()));
    }

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = tempfile::Builder::new()
        .prefix(".relocating-")
        .suffix(".jar")
        .tempfile_in(dir)
        .map_err(|e| Error::io_path("failed to create temporary file in", dir, e))?;

    info!("Relocating {} into {}", input.display(), output.display());
    relocator.relocate(input, temp.path(), map)?;

    temp.persist(output)
        .map_err(|e| Error::io_path("failed to replace", output, e.error))?;
    Ok(())
}

/// Relocator that renames entries and copies their bytes verbatim.
pub struct PathRelocator<'a> {
    config: &'a JarConfig,
}

impl<'a> PathRelocator<'a> {
    pub fn new(config: &'a JarConfig) -> Self {
        Self { config }
    }
}

impl Relocator for PathRelocator<'_> {
    fn relocate(&self, input: &Path, output: &Path, map: &RelocationMap) -> Result<()> {
        let archive = ZipArchive::open(input)?;
        let file =
            File::create(output).map_err(|e| Error::io_path("failed to create", output, e))?;
        let mut writer = ZipWriter::new(BufWriter::new(file), self.config.compression)?;
        let mut buffer = self.config.transfer_buffer();

        for entry in archive.entries() {
            let name = map.apply(&entry.file_name);
            if name != entry.file_name.as_str() {
                log!(
                    self.config.progress_level(),
                    "[Relocating] {} => {name}",
                    entry.file_name
                );
            }
            let modified = entry
                .last_modified()
                .unwrap_or(std::time::UNIX_EPOCH);

            if entry.is_directory {
                writer
                    .add_directory(&name, modified)
                    .map_err(|e| e.in_entry(&*name))?;
                continue;
            }

            let mut input = archive.open_entry(entry).map_err(|e| e.in_entry(&entry.file_name))?;
            writer.start_file(&name, modified).map_err(|e| e.in_entry(&*name))?;
            copy_with_buffer(&mut input, &mut writer, &mut buffer)
                .map_err(|e| Error::from(e).in_entry(&entry.file_name))?;
        }

        writer.finish()?;
        Ok(())
    }
}
