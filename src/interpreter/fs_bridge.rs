//! Sync FileSystem Bridge
//!
//! The engine is synchronous; filesystem backends are async. This module
//! defines the sync interface the engine consumes, an adapter that bridges
//! any async backend via `block_in_place`, and a direct implementation for
//! the in-memory backend so engine tests need no runtime.

use std::sync::Arc;

use crate::fs::types::MkdirOptions;
use crate::fs::{FileSystem as AsyncFileSystem, FsError, InMemoryFs};

/// Sync filesystem interface consumed by the content loader and output
/// sinks.
pub trait SyncFileSystem: Send + Sync {
    fn read_file(&self, path: &str) -> Result<String, FsError>;

    /// Write a file, creating any missing parent directories.
    fn write_file(&self, path: &str, content: &str) -> Result<(), FsError>;

    fn exists(&self, path: &str) -> bool;

    fn resolve_path(&self, base: &str, path: &str) -> String;

    /// All file paths, for glob matching.
    fn all_paths(&self) -> Vec<String>;
}

impl SyncFileSystem for InMemoryFs {
    fn read_file(&self, path: &str) -> Result<String, FsError> {
        self.read_sync(path)
    }

    fn write_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        if let Some(idx) = path.rfind('/') {
            if idx > 0 {
                self.mkdir_sync(&path[..idx], &MkdirOptions { recursive: true })?;
            }
        }
        self.write_sync(path, content)
    }

    fn exists(&self, path: &str) -> bool {
        self.exists_sync(path)
    }

    fn resolve_path(&self, base: &str, path: &str) -> String {
        crate::fs::join_path(base, path)
    }

    fn all_paths(&self) -> Vec<String> {
        self.all_paths_sync()
    }
}

/// Adapter that wraps an async backend and provides the sync interface.
/// Used by the session facade, which runs the engine under
/// `tokio::task::block_in_place`.
pub struct SyncFsAdapter {
    inner: Arc<dyn AsyncFileSystem>,
    handle: tokio::runtime::Handle,
}

impl SyncFsAdapter {
    pub fn new(fs: Arc<dyn AsyncFileSystem>, handle: tokio::runtime::Handle) -> Self {
        Self { inner: fs, handle }
    }

    fn block_on<F, T>(&self, f: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        tokio::task::block_in_place(|| self.handle.block_on(f))
    }
}

impl SyncFileSystem for SyncFsAdapter {
    fn read_file(&self, path: &str) -> Result<String, FsError> {
        self.block_on(self.inner.read_file(path))
    }

    fn write_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        if let Some(idx) = path.rfind('/') {
            if idx > 0 {
                self.block_on(
                    self.inner
                        .mkdir(&path[..idx], &MkdirOptions { recursive: true }),
                )?;
            }
        }
        self.block_on(self.inner.write_file(path, content))
    }

    fn exists(&self, path: &str) -> bool {
        self.block_on(self.inner.exists(path))
    }

    fn resolve_path(&self, base: &str, path: &str) -> String {
        self.inner.resolve_path(base, path)
    }

    fn all_paths(&self) -> Vec<String> {
        self.inner.get_all_paths()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_sync_impl() {
        let fs = InMemoryFs::new();
        SyncFileSystem::write_file(&fs, "/deep/dir/file.txt", "content").unwrap();
        assert_eq!(SyncFileSystem::read_file(&fs, "/deep/dir/file.txt").unwrap(), "content");
        assert!(SyncFileSystem::exists(&fs, "/deep/dir"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_async_adapter() {
        let fs: Arc<dyn AsyncFileSystem> = Arc::new(InMemoryFs::with_files([("/a.txt", "x")]));
        let adapter = SyncFsAdapter::new(fs, tokio::runtime::Handle::current());
        assert_eq!(adapter.read_file("/a.txt").unwrap(), "x");
        adapter.write_file("/b/c.txt", "y").unwrap();
        assert_eq!(adapter.read_file("/b/c.txt").unwrap(), "y");
        assert_eq!(adapter.all_paths().len(), 2);
    }
}
