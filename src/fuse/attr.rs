//! Attribute synthesis
//!
//! Sources only describe name, size, and kind. Everything else the kernel
//! wants is derived here on every request and never stored.

use std::time::SystemTime;

use fuser::{FileAttr, FileType};

use crate::source::FileInfo;

/// Default file permissions (rw-r--r--)
pub const FILE_PERM: u16 = 0o644;
/// Default directory permissions (rwxr-xr-x)
pub const DIR_PERM: u16 = 0o755;

/// Block size for reporting
pub const BLOCK_SIZE: u32 = 4096;

/// Unit of `FileAttr::blocks`
const SECTOR_SIZE: u64 = 512;

/// Owner reported for every node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

impl Owner {
    /// Resolve the owner, falling back to the current process ids
    pub fn new(uid: Option<u32>, gid: Option<u32>) -> Self {
        // SAFETY: getuid/getgid cannot fail and touch no memory
        let uid = uid.unwrap_or_else(|| unsafe { libc::getuid() });
        let gid = gid.unwrap_or_else(|| unsafe { libc::getgid() });
        Self { uid, gid }
    }
}

pub fn file_type(is_dir: bool) -> FileType {
    if is_dir {
        FileType::Directory
    } else {
        FileType::RegularFile
    }
}

pub fn permissions(is_dir: bool) -> u16 {
    if is_dir {
        DIR_PERM
    } else {
        FILE_PERM
    }
}

/// Full `st_mode` value: file type bits plus the fixed permission mask
pub fn file_mode(is_dir: bool) -> u32 {
    let kind = if is_dir { libc::S_IFDIR } else { libc::S_IFREG };
    kind as u32 | permissions(is_dir) as u32
}

/// Directories report 2 links (self and parent entry), files 1
pub fn link_count(is_dir: bool) -> u32 {
    if is_dir {
        2
    } else {
        1
    }
}

/// Build the attribute record for `info`, stamped with `now`
pub fn synthesize(info: &FileInfo, owner: Owner, now: SystemTime) -> FileAttr {
    let size = if info.is_dir { 0 } else { info.size };

    FileAttr {
        ino: info.inode,
        size,
        blocks: size.div_ceil(SECTOR_SIZE),
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: file_type(info.is_dir),
        perm: permissions(info.is_dir),
        nlink: link_count(info.is_dir),
        uid: owner.uid,
        gid: owner.gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}
