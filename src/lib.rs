//! restfuse: expose any hierarchical data source as a read-only FUSE filesystem
//!
//! # Architecture
//!
//! - **Data sources**: Backing systems implement the `DataSource` trait:
//!   resolve a child by name, list a directory, read a file, and describe an
//!   inode for diagnostics. Sources own inode numbering.
//! - **FUSE adapter**: Translates kernel requests into data source calls,
//!   synthesizes attributes, and pages directory listings into the kernel's
//!   buffer. It keeps no inode table and no caches.
//! - **Mount manager**: Handles lifecycle of one or more mounts.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use restfuse::mount::{serve, MountOptions};
//! use restfuse::source::memory::MemorySource;
//! use restfuse::source::ROOT_INODE;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = MemorySource::new();
//! let docs = source.add_dir(ROOT_INODE, "docs")?;
//! source.add_file(docs, "readme.txt", "hello")?;
//!
//! // Blocks until `fusermount -u /mnt/docs`
//! serve("/mnt/docs".as_ref(), Arc::new(source), &MountOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod fuse;
pub mod mount;
pub mod source;

pub use error::{RestFuseError, Result};
