use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// File metadata returned by [`FileSystem::stat`].
#[derive(Debug, Clone)]
pub struct FileStat {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Capability boundary for all file access in the pipeline.
///
/// Abstracting I/O keeps the core testable against an in-memory
/// implementation and makes every read/write injectable.
pub trait FileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
    fn exists(&self, path: &Path) -> bool;
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
    fn stat(&self, path: &Path) -> io::Result<FileStat>;
}

/// Production file system backed by `std::fs`.
#[derive(Debug, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let metadata = std::fs::metadata(path)?;
        Ok(FileStat {
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// In-memory file system for tests. Paths are normalized lexically, so
/// `/ws/./a.md` and `/ws/a.md` name the same file. A directory exists
/// whenever any stored file lives under it.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RefCell<BTreeMap<PathBuf, String>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl AsRef<Path>, contents: impl Into<String>) {
        self.files
            .borrow_mut()
            .insert(normalize(path.as_ref()), contents.into());
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.borrow().get(&normalize(path.as_ref())).cloned()
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.contents(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        let normalized = normalize(path);
        self.files
            .borrow()
            .keys()
            .any(|key| key == &normalized || key.starts_with(&normalized))
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        Ok(normalize(path))
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.insert(path, contents);
        Ok(())
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let contents = self.read_to_string(path)?;
        Ok(FileStat {
            size: contents.len() as u64,
            modified: None,
        })
    }
}

/// Lexically normalize a path: resolve `.` and `..` components without
/// touching the disk. `..` at the root is preserved so sandbox checks can
/// still see an escape attempt.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push(Component::ParentDir);
                }
            }
            other => result.push(other),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_resolves_dot_components() {
        assert_eq!(normalize(Path::new("/ws/./a.md")), PathBuf::from("/ws/a.md"));
        assert_eq!(
            normalize(Path::new("/ws/sub/../a.md")),
            PathBuf::from("/ws/a.md")
        );
    }

    #[test]
    fn test_normalize_keeps_escape_visible() {
        let escaped = normalize(Path::new("/ws/../../secret.md"));
        assert!(!escaped.starts_with("/ws"));
    }

    #[test]
    fn test_memory_fs_round_trip() {
        let fs = MemoryFileSystem::new();
        fs.insert("/ws/a.md", "# A\n");
        assert!(fs.exists(Path::new("/ws/./a.md")));
        assert!(fs.exists(Path::new("/ws")));
        assert!(!fs.exists(Path::new("/other")));
        assert_eq!(fs.read_to_string(Path::new("/ws/a.md")).unwrap(), "# A\n");
        assert_eq!(fs.stat(Path::new("/ws/a.md")).unwrap().size, 4);
        assert!(fs.read_to_string(Path::new("/ws/missing.md")).is_err());
    }
}
