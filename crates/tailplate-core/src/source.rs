//! Source readers backing inline templates
//!
//! A reader hands out a file's text together with its modification identity,
//! and can report the identity alone so a cached template can be confirmed
//! fresh without reading the whole file.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::SystemTime,
};

use parking_lot::RwLock;
use tracing::trace;

/// Cheap, comparable signal that a source file may have changed
///
/// Not cryptographically strong: size plus last-write time is enough to
/// notice an editor save or a `touch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModificationIdentity {
    len: u64,
    modified: Option<SystemTime>,
}

impl ModificationIdentity {
    /// Build an identity from its parts
    pub fn new(len: u64, modified: Option<SystemTime>) -> Self {
        Self { len, modified }
    }

    /// Identity of a file as reported by the filesystem
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        Self {
            len: metadata.len(),
            // Some platforms cannot report mtime; size alone still catches most edits.
            modified: metadata.modified().ok(),
        }
    }
}

/// A file's full text and the identity observed when it was read
#[derive(Debug, Clone)]
pub struct SourceText {
    pub text: String,
    pub identity: ModificationIdentity,
}

/// Reads inline template sources
pub trait SourceReader: Send + Sync {
    /// Read the full text of `path`
    fn read(&self, path: &Path) -> io::Result<SourceText>;

    /// Current modification identity of `path` without reading its content
    fn peek_identity(&self, path: &Path) -> io::Result<ModificationIdentity>;
}

/// Filesystem-backed source reader
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSourceReader;

impl FsSourceReader {
    pub fn new() -> Self {
        Self
    }
}

impl SourceReader for FsSourceReader {
    fn read(&self, path: &Path) -> io::Result<SourceText> {
        // Identity first: an edit landing between the two calls is then seen
        // as a change on the next peek instead of being missed.
        let identity = self.peek_identity(path)?;
        let text = std::fs::read_to_string(path)?;
        trace!(file = %path.display(), bytes = text.len(), "Read inline template source");
        Ok(SourceText { text, identity })
    }

    fn peek_identity(&self, path: &Path) -> io::Result<ModificationIdentity> {
        let metadata = std::fs::metadata(path)?;
        Ok(ModificationIdentity::from_metadata(&metadata))
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    text: String,
    revision: u64,
}

/// In-memory source reader
///
/// Each file carries a revision counter that stands in for its timestamp.
/// Useful for hosts that embed their sources and for tests that need to
/// control exactly when a file's identity changes.
#[derive(Debug, Default)]
pub struct MemorySourceReader {
    files: RwLock<HashMap<PathBuf, MemoryFile>>,
    reads: AtomicU64,
}

impl MemorySourceReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `text` at `path` and advance the file's identity
    pub fn insert(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        let mut files = self.files.write();
        let file = files.entry(path.into()).or_insert_with(|| MemoryFile {
            text: String::new(),
            revision: 0,
        });
        file.text = text.into();
        file.revision += 1;
    }

    /// Replace the text at `path` without touching its identity
    ///
    /// Mimics a write that does not update the file's timestamp. Returns
    /// `false` when the path is unknown.
    pub fn replace_untracked(&self, path: &Path, text: impl Into<String>) -> bool {
        match self.files.write().get_mut(path) {
            Some(file) => {
                file.text = text.into();
                true
            }
            None => false,
        }
    }

    /// Advance the identity of `path` without changing its text
    pub fn touch(&self, path: &Path) -> bool {
        match self.files.write().get_mut(path) {
            Some(file) => {
                file.revision += 1;
                true
            }
            None => false,
        }
    }

    /// Forget `path`; later reads fail with `NotFound`
    pub fn remove(&self, path: &Path) -> bool {
        self.files.write().remove(path).is_some()
    }

    /// Number of full reads served so far
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no in-memory source at {}", path.display()),
        )
    }
}

impl SourceReader for MemorySourceReader {
    fn read(&self, path: &Path) -> io::Result<SourceText> {
        let files = self.files.read();
        let file = files.get(path).ok_or_else(|| Self::not_found(path))?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(SourceText {
            text: file.text.clone(),
            identity: ModificationIdentity::new(file.revision, None),
        })
    }

    fn peek_identity(&self, path: &Path) -> io::Result<ModificationIdentity> {
        self.files
            .read()
            .get(path)
            .map(|file| ModificationIdentity::new(file.revision, None))
            .ok_or_else(|| Self::not_found(path))
    }
}
