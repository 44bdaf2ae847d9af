//! Error type shared by the codec, the packer, the unpacker and relocation.

use std::io;
use std::path::Path;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid input paths, raised before any output is touched.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    #[error("unsupported compression method: {0} (only STORED and DEFLATE are supported)")]
    UnsupportedCompression(u16),

    #[error("invalid entry name {0:?}")]
    InvalidEntryName(String),

    #[error("duplicate entry {0:?}")]
    DuplicateEntry(String),

    #[error("entry {0:?} would be extracted outside the destination directory")]
    UnsafeEntryName(String),

    #[error("{0} (ZIP64 output is not supported)")]
    LimitExceeded(String),

    #[error("entry {name:?}: {source}")]
    Entry {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("relocation failed: {0}")]
    Relocation(String),
}

impl Error {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn io_path(action: &str, path: &Path, source: io::Error) -> Self {
        Error::io(format!("{action} {}", path.display()), source)
    }

    pub(crate) fn in_entry(self, name: impl Into<String>) -> Self {
        match self {
            e @ Error::Entry { .. } => e,
            e => Error::Entry {
                name: name.into(),
                source: Box::new(e),
            },
        }
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::Precondition(_))
    }

    /// The innermost error, with any `Entry` wrappers peeled off.
    pub fn root(&self) -> &Error {
        match self {
            Error::Entry { source, .. } => source.root(),
            e => e,
        }
    }
}

/// Stream-level failures surface through `std::io::Read`, so codec errors
/// raised inside an entry stream are tunnelled through `io::Error` and
/// unwrapped again here.
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(e) = inner.downcast::<Error>() {
                    return *e;
                }
            }
            return Error::InvalidArchive("corrupt entry stream".to_string());
        }
        Error::io("I/O error", err)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io { source, .. } => source,
            e => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

/// An entry that was skipped because the job ran with
/// [`ErrorPolicy::Continue`](crate::ErrorPolicy::Continue).
#[derive(Debug)]
pub struct EntryFailure {
    /// Archive entry name, when the failure could be tied to one.
    pub name: Option<String>,
    pub error: Error,
}

impl EntryFailure {
    pub(crate) fn from_error(error: Error) -> Self {
        let name = match &error {
            Error::Entry { name, .. } => Some(name.clone()),
            _ => None,
        };
        Self { name, error }
    }
}
