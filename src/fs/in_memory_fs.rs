//! In-Memory File System
//!
//! Default backend for tests and sandboxed evaluation. Files live in a map
//! keyed by normalized absolute path; directories are tracked explicitly so
//! stat and mkdir behave like a real tree.
//!
//! The inherent methods are synchronous; the async `FileSystem` impl
//! delegates to them, and the interpreter's sync bridge can use them
//! directly without a runtime.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::fs::types::{join_path, normalize_path, FileSystem, FsError, FsStat, MkdirOptions};

#[derive(Debug, Default)]
struct FsState {
    files: BTreeMap<String, String>,
    directories: BTreeSet<String>,
}

/// An in-memory filesystem rooted at `/`.
#[derive(Debug, Default)]
pub struct InMemoryFs {
    state: Mutex<FsState>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.state.lock().unwrap().directories.insert("/".to_string());
        fs
    }

    /// Seed the filesystem with initial files.
    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let fs = Self::new();
        {
            let mut state = fs.state.lock().unwrap();
            for (path, content) in files {
                let path = normalize_path(&path.into());
                add_parent_dirs(&mut state.directories, &path);
                state.files.insert(path, content.into());
            }
        }
        fs
    }

    pub fn read_sync(&self, path: &str) -> Result<String, FsError> {
        let path = normalize_path(path);
        let state = self.state.lock().unwrap();
        if state.directories.contains(&path) {
            return Err(FsError::IsDirectory {
                path,
                operation: "read".to_string(),
            });
        }
        state
            .files
            .get(&path)
            .cloned()
            .ok_or_else(|| FsError::not_found(path, "open"))
    }

    pub fn write_sync(&self, path: &str, content: &str) -> Result<(), FsError> {
        let path = normalize_path(path);
        let mut state = self.state.lock().unwrap();
        if state.directories.contains(&path) {
            return Err(FsError::IsDirectory {
                path,
                operation: "write".to_string(),
            });
        }
        add_parent_dirs(&mut state.directories, &path);
        state.files.insert(path, content.to_string());
        Ok(())
    }

    pub fn append_sync(&self, path: &str, content: &str) -> Result<(), FsError> {
        let path = normalize_path(path);
        let mut state = self.state.lock().unwrap();
        add_parent_dirs(&mut state.directories, &path);
        state.files.entry(path).or_default().push_str(content);
        Ok(())
    }

    pub fn exists_sync(&self, path: &str) -> bool {
        let path = normalize_path(path);
        let state = self.state.lock().unwrap();
        state.files.contains_key(&path) || state.directories.contains(&path)
    }

    pub fn stat_sync(&self, path: &str) -> Result<FsStat, FsError> {
        let path = normalize_path(path);
        let state = self.state.lock().unwrap();
        if let Some(content) = state.files.get(&path) {
            return Ok(FsStat {
                is_file: true,
                is_directory: false,
                size: content.len() as u64,
            });
        }
        if state.directories.contains(&path) {
            return Ok(FsStat {
                is_file: false,
                is_directory: true,
                size: 0,
            });
        }
        Err(FsError::not_found(path, "stat"))
    }

    pub fn mkdir_sync(&self, path: &str, options: &MkdirOptions) -> Result<(), FsError> {
        let path = normalize_path(path);
        let mut state = self.state.lock().unwrap();
        if state.files.contains_key(&path) {
            return Err(FsError::NotDirectory {
                path,
                operation: "mkdir".to_string(),
            });
        }
        if options.recursive {
            add_parent_dirs(&mut state.directories, &format!("{}/.", path));
            state.directories.insert(path);
            return Ok(());
        }
        let parent = match path.rfind('/') {
            Some(0) => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
            None => "/".to_string(),
        };
        if !state.directories.contains(&parent) {
            return Err(FsError::not_found(parent, "mkdir"));
        }
        state.directories.insert(path);
        Ok(())
    }

    pub fn all_paths_sync(&self) -> Vec<String> {
        self.state.lock().unwrap().files.keys().cloned().collect()
    }
}

fn add_parent_dirs(directories: &mut BTreeSet<String>, path: &str) {
    let mut current = String::new();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    directories.insert("/".to_string());
    for segment in segments.iter().take(segments.len().saturating_sub(1)) {
        current.push('/');
        current.push_str(segment);
        directories.insert(current.clone());
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        self.read_sync(path)
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        self.write_sync(path, content)
    }

    async fn append_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        self.append_sync(path, content)
    }

    async fn exists(&self, path: &str) -> bool {
        self.exists_sync(path)
    }

    async fn stat(&self, path: &str) -> Result<FsStat, FsError> {
        self.stat_sync(path)
    }

    async fn mkdir(&self, path: &str, options: &MkdirOptions) -> Result<(), FsError> {
        self.mkdir_sync(path, options)
    }

    fn resolve_path(&self, base: &str, path: &str) -> String {
        join_path(base, path)
    }

    fn get_all_paths(&self) -> Vec<String> {
        self.all_paths_sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let fs = InMemoryFs::new();
        fs.write_file("/docs/a.md", "# A\nbody\n").await.unwrap();
        assert_eq!(fs.read_file("/docs/a.md").await.unwrap(), "# A\nbody\n");
        assert!(fs.exists("/docs").await);
    }

    #[test]
    fn test_read_missing_fails() {
        let fs = InMemoryFs::new();
        let err = fs.read_sync("/nope.txt").unwrap_err();
        assert!(matches!(err, FsError::NotFound { .. }));
    }

    #[test]
    fn test_append_creates() {
        let fs = InMemoryFs::new();
        fs.append_sync("/log.txt", "a").unwrap();
        fs.append_sync("/log.txt", "b").unwrap();
        assert_eq!(fs.read_sync("/log.txt").unwrap(), "ab");
    }

    #[test]
    fn test_mkdir_recursive() {
        let fs = InMemoryFs::new();
        fs.mkdir_sync("/a/b/c", &MkdirOptions { recursive: true }).unwrap();
        assert!(fs.exists_sync("/a/b/c"));
        let stat = fs.stat_sync("/a/b").unwrap();
        assert!(stat.is_directory);
    }

    #[test]
    fn test_mkdir_non_recursive_requires_parent() {
        let fs = InMemoryFs::new();
        assert!(fs.mkdir_sync("/a/b", &MkdirOptions { recursive: false }).is_err());
    }

    #[test]
    fn test_with_files_seeds_tree() {
        let fs = InMemoryFs::with_files([("/notes/x.md", "hello")]);
        assert_eq!(fs.read_sync("/notes/x.md").unwrap(), "hello");
        assert!(fs.exists_sync("/notes"));
        assert_eq!(fs.all_paths_sync(), vec!["/notes/x.md".to_string()]);
    }

    #[test]
    fn test_resolve_path() {
        let fs = InMemoryFs::new();
        assert_eq!(fs.resolve_path("/home", "a.txt"), "/home/a.txt");
    }
}
