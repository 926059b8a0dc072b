//! In-memory data source
//!
//! Nodes live in an arena keyed by inode number. Inodes are handed out
//! sequentially from `ROOT_INODE + 1` as nodes are added, and children keep
//! insertion order, which gives directory listings the stable order paged
//! reads depend on.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::trace;

use super::{DataSource, FileInfo, ROOT_INODE};
use crate::error::{RestFuseError, Result};

/// Declarative tree entry, as written in the configuration file.
///
/// Entries with `children` are directories, entries with `content` are files.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TreeEntry {
    Directory {
        name: String,
        children: Vec<TreeEntry>,
    },
    File {
        name: String,
        content: String,
    },
}

impl TreeEntry {
    pub fn name(&self) -> &str {
        match self {
            TreeEntry::Directory { name, .. } | TreeEntry::File { name, .. } => name,
        }
    }
}

#[derive(Debug)]
enum NodeKind {
    File(Bytes),
    Directory(Vec<u64>),
}

#[derive(Debug)]
struct Node {
    name: String,
    parent: u64,
    kind: NodeKind,
}

impl Node {
    fn info(&self, inode: u64) -> FileInfo {
        match &self.kind {
            NodeKind::File(content) => FileInfo::file(inode, &self.name, content.len() as u64),
            NodeKind::Directory(_) => FileInfo::directory(inode, &self.name),
        }
    }
}

struct Arena {
    nodes: HashMap<u64, Node>,
    next_inode: u64,
}

impl Arena {
    fn child_named(&self, parent: u64, name: &str) -> Option<u64> {
        match &self.nodes.get(&parent)?.kind {
            NodeKind::Directory(children) => children
                .iter()
                .copied()
                .find(|ino| self.nodes.get(ino).is_some_and(|n| n.name == name)),
            NodeKind::File(_) => None,
        }
    }

    fn insert(&mut self, parent: u64, name: &str, kind: NodeKind) -> Result<u64> {
        validate_name(name)?;

        match self.nodes.get(&parent).map(|n| &n.kind) {
            None => return Err(RestFuseError::not_found_inode(parent)),
            Some(NodeKind::File(_)) => {
                return Err(RestFuseError::NotADirectory(format!("inode {}", parent)))
            }
            Some(NodeKind::Directory(_)) => {}
        }

        if self.child_named(parent, name).is_some() {
            return Err(RestFuseError::AlreadyExists(format!(
                "{} in inode {}",
                name, parent
            )));
        }

        let inode = self.next_inode;
        self.next_inode += 1;
        self.nodes.insert(
            inode,
            Node {
                name: name.to_string(),
                parent,
                kind,
            },
        );
        if let Some(Node {
            kind: NodeKind::Directory(children),
            ..
        }) = self.nodes.get_mut(&parent)
        {
            children.push(inode);
        }

        Ok(inode)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0')
    {
        return Err(RestFuseError::InvalidArgument(format!(
            "invalid entry name {:?}",
            name
        )));
    }
    Ok(())
}

/// Arena-backed in-memory tree
pub struct MemorySource {
    arena: RwLock<Arena>,
}

impl MemorySource {
    /// Create a source containing only the root directory
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_INODE,
            Node {
                name: String::new(),
                parent: ROOT_INODE,
                kind: NodeKind::Directory(Vec::new()),
            },
        );

        Self {
            arena: RwLock::new(Arena {
                nodes,
                next_inode: ROOT_INODE + 1,
            }),
        }
    }

    /// Build a source from declarative tree entries placed under the root
    pub fn from_tree(entries: &[TreeEntry]) -> Result<Self> {
        let source = Self::new();
        source.add_tree(ROOT_INODE, entries)?;
        Ok(source)
    }

    /// The fixed tree served by `restfuse --mount`
    pub fn demo() -> Result<Self> {
        let entries = vec![
            TreeEntry::File {
                name: "hello.txt".into(),
                content: "Hello__World!".into(),
            },
            TreeEntry::Directory {
                name: "subdir".into(),
                children: vec![
                    TreeEntry::File {
                        name: "file1.txt".into(),
                        content: "Content of file1".into(),
                    },
                    TreeEntry::File {
                        name: "file2.txt".into(),
                        content: "Content of file2".into(),
                    },
                ],
            },
        ];

        Self::from_tree(&entries)
    }

    /// Add a directory under `parent`, returning its inode
    pub fn add_dir(&self, parent: u64, name: &str) -> Result<u64> {
        self.arena
            .write()
            .insert(parent, name, NodeKind::Directory(Vec::new()))
    }

    /// Add a file under `parent`, returning its inode
    pub fn add_file(&self, parent: u64, name: &str, content: impl Into<Bytes>) -> Result<u64> {
        self.arena
            .write()
            .insert(parent, name, NodeKind::File(content.into()))
    }

    /// Recursively add tree entries under `parent`
    pub fn add_tree(&self, parent: u64, entries: &[TreeEntry]) -> Result<()> {
        for entry in entries {
            match entry {
                TreeEntry::File { name, content } => {
                    self.add_file(parent, name, Bytes::from(content.clone()))?;
                }
                TreeEntry::Directory { name, children } => {
                    let dir = self.add_dir(parent, name)?;
                    self.add_tree(dir, children)?;
                }
            }
        }
        Ok(())
    }

    /// Number of nodes, including the root
    pub fn node_count(&self) -> usize {
        self.arena.read().nodes.len()
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn resolve_child(&self, parent: u64, name: &str) -> Result<FileInfo> {
        trace!("resolve_child: parent={} name={:?}", parent, name);
        let arena = self.arena.read();

        let inode = if name.is_empty() {
            parent
        } else {
            arena
                .child_named(parent, name)
                .ok_or_else(|| RestFuseError::NotFound(format!("{} in inode {}", name, parent)))?
        };

        arena
            .nodes
            .get(&inode)
            .map(|node| node.info(inode))
            .ok_or_else(|| RestFuseError::not_found_inode(inode))
    }

    async fn list_directory(&self, inode: u64) -> Result<Vec<FileInfo>> {
        trace!("list_directory: inode={}", inode);
        let arena = self.arena.read();

        match arena.nodes.get(&inode).map(|n| &n.kind) {
            Some(NodeKind::Directory(children)) => Ok(children
                .iter()
                .filter_map(|ino| arena.nodes.get(ino).map(|node| node.info(*ino)))
                .collect()),
            _ => Err(RestFuseError::not_found_inode(inode)),
        }
    }

    async fn read_content(&self, inode: u64) -> Result<Bytes> {
        trace!("read_content: inode={}", inode);
        match self.arena.read().nodes.get(&inode).map(|n| &n.kind) {
            Some(NodeKind::File(content)) => Ok(content.clone()),
            _ => Err(RestFuseError::not_found_inode(inode)),
        }
    }

    fn locate(&self, inode: u64) -> String {
        let arena = self.arena.read();
        let mut parts = Vec::new();
        let mut current = inode;

        while current != ROOT_INODE {
            match arena.nodes.get(&current) {
                Some(node) => {
                    parts.push(node.name.as_str());
                    current = node.parent;
                }
                None => return format!("<inode {}>", inode),
            }
        }

        parts.reverse();
        format!("/{}", parts.join("/"))
    }
}
