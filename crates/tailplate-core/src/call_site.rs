//! Call-site identity for inline templates

use std::{
    fmt,
    path::{Path, PathBuf},
};

/// Identity of a single inline-template usage
///
/// `line` is the 1-based line of the rendering call; the template is the
/// comment block that starts on the following line. Two call sites on the
/// same line with different engines are distinct cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    file: PathBuf,
    line: u32,
    engine: String,
}

impl CallSite {
    /// Create a call site from an already known file path
    pub fn new(file: impl Into<PathBuf>, line: u32, engine: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            engine: engine.into(),
        }
    }

    /// Source file containing the rendering call
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// 1-based line of the rendering call
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Name of the engine the block is rendered with
    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Same site, resolved against `root` when the file path is relative
    pub fn rooted_at(&self, root: &Path) -> Self {
        if self.file.is_absolute() {
            return self.clone();
        }
        Self {
            file: root.join(&self.file),
            line: self.line,
            engine: self.engine.clone(),
        }
    }

    /// Locate a path reported by `file!()` on disk
    ///
    /// `file!()` is relative to the directory rustc was invoked from, which
    /// is the workspace root for workspace members and the manifest directory
    /// otherwise, so the manifest directory and each of its ancestors are
    /// tried in turn. Falls back to `manifest_dir/file` when nothing exists.
    pub fn locate(file: &str, manifest_dir: &str) -> PathBuf {
        let file = Path::new(file);
        if file.is_absolute() {
            return file.to_path_buf();
        }

        let manifest_dir = Path::new(manifest_dir);
        manifest_dir
            .ancestors()
            .map(|dir| dir.join(file))
            .find(|candidate| candidate.is_file())
            .unwrap_or_else(|| manifest_dir.join(file))
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} [{}]", self.file.display(), self.line, self.engine)
    }
}
