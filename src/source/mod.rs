pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Root directory inode (always 1 in FUSE)
pub const ROOT_INODE: u64 = 1;

/// Description of a single node in the virtual tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Entry name within its parent (empty for the root)
    pub name: String,
    /// Content length in bytes. Ignored for directories.
    pub size: u64,
    pub is_dir: bool,
    /// Inode this record names
    pub inode: u64,
}

impl FileInfo {
    pub fn file(inode: u64, name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            is_dir: false,
            inode,
        }
    }

    pub fn directory(inode: u64, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            is_dir: true,
            inode,
        }
    }
}

/// Data access contract a backing system implements to be mounted.
///
/// Sources own every naming and identity decision: they assign inode
/// numbers, keep them stable for the lifetime of the mount, and decide
/// which inodes are directories. The adapter forwards inode numbers
/// verbatim and never caches results, so implementations must tolerate
/// concurrent calls for the same inode.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Resolve `name` inside directory `parent`.
    ///
    /// An empty `name` resolves `parent` itself.
    async fn resolve_child(&self, parent: u64, name: &str) -> Result<FileInfo>;

    /// List a directory in a stable order.
    ///
    /// Fails with `NotFound` when `inode` is missing or not a directory.
    async fn list_directory(&self, inode: u64) -> Result<Vec<FileInfo>>;

    /// Full content of a file. The caller does any offset slicing.
    async fn read_content(&self, inode: u64) -> Result<Bytes>;

    /// Path-like description of `inode`, for diagnostics only
    fn locate(&self, inode: u64) -> String;

    /// Attributes of `inode` itself.
    ///
    /// Defaults to a self-lookup through `resolve_child` with an empty name.
    async fn stat(&self, inode: u64) -> Result<FileInfo> {
        self.resolve_child(inode, "").await
    }
}
