//! Directory entry serialization
//!
//! A readdir reply is a byte buffer of `fuse_dirent` records, each padded to
//! an 8-byte boundary. The kernel sizes the buffer, so entries are appended
//! until the next one would not fit; the caller resumes from that entry's
//! index on the following request.

use fuser::{FileType, ReplyDirectory};

/// Size of the fixed `fuse_dirent` header (ino, off, namelen, type)
pub const DIRENT_HEADER_LEN: usize = 24;

const DT_DIR: u32 = 4;
const DT_REG: u32 = 8;

/// One directory entry ready for serialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    pub inode: u64,
    /// Offset at which the next read resumes (index of this entry + 1)
    pub offset: u64,
    pub name: String,
    pub is_dir: bool,
}

impl Dirent {
    /// Serialized length including padding
    pub fn encoded_len(&self) -> usize {
        (DIRENT_HEADER_LEN + self.name.len()).next_multiple_of(8)
    }

    fn dirent_type(&self) -> u32 {
        if self.is_dir {
            DT_DIR
        } else {
            DT_REG
        }
    }
}

/// Destination for directory entries.
pub trait DirentSink {
    /// Append `entry`. Returns `true` if it did not fit and was not added.
    fn push(&mut self, entry: &Dirent) -> bool;
}

impl DirentSink for ReplyDirectory {
    fn push(&mut self, entry: &Dirent) -> bool {
        let kind = if entry.is_dir {
            FileType::Directory
        } else {
            FileType::RegularFile
        };
        self.add(entry.inode, entry.offset as i64, kind, &entry.name)
    }
}

/// Fixed-capacity buffer holding entries in the kernel `fuse_dirent` layout
#[derive(Debug, Clone)]
pub struct DirentBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl DirentBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of bytes written so far
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Decode the entries written so far
    pub fn entries(&self) -> Vec<Dirent> {
        let mut entries = Vec::new();
        let mut rest = self.data.as_slice();

        while rest.len() >= DIRENT_HEADER_LEN {
            let inode = u64::from_ne_bytes(rest[0..8].try_into().unwrap_or_default());
            let offset = u64::from_ne_bytes(rest[8..16].try_into().unwrap_or_default());
            let namelen = u32::from_ne_bytes(rest[16..20].try_into().unwrap_or_default()) as usize;
            let kind = u32::from_ne_bytes(rest[20..24].try_into().unwrap_or_default());

            let end = DIRENT_HEADER_LEN + namelen;
            if rest.len() < end {
                break;
            }
            let name = String::from_utf8_lossy(&rest[DIRENT_HEADER_LEN..end]).into_owned();
            entries.push(Dirent {
                inode,
                offset,
                name,
                is_dir: kind == DT_DIR,
            });

            rest = &rest[end.next_multiple_of(8).min(rest.len())..];
        }

        entries
    }
}

impl DirentSink for DirentBuffer {
    fn push(&mut self, entry: &Dirent) -> bool {
        let len = entry.encoded_len();
        if self.data.len() + len > self.capacity {
            return true;
        }

        let start = self.data.len();
        self.data.extend_from_slice(&entry.inode.to_ne_bytes());
        self.data.extend_from_slice(&entry.offset.to_ne_bytes());
        self.data
            .extend_from_slice(&(entry.name.len() as u32).to_ne_bytes());
        self.data.extend_from_slice(&entry.dirent_type().to_ne_bytes());
        self.data.extend_from_slice(entry.name.as_bytes());
        self.data.resize(start + len, 0);

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(inode: u64, offset: u64, name: &str, is_dir: bool) -> Dirent {
        Dirent {
            inode,
            offset,
            name: name.to_string(),
            is_dir,
        }
    }

    #[test]
    fn test_encoded_len_is_padded() {
        assert_eq!(entry(2, 1, "a", false).encoded_len(), 32);
        assert_eq!(entry(2, 1, "abcdefgh", false).encoded_len(), 32);
        assert_eq!(entry(2, 1, "abcdefghi", false).encoded_len(), 40);
    }

    #[test]
    fn test_layout() {
        let mut buf = DirentBuffer::new(64);
        assert!(!buf.push(&entry(7, 1, "sub", true)));

        let bytes = buf.as_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[0..8], &7u64.to_ne_bytes());
        assert_eq!(&bytes[8..16], &1u64.to_ne_bytes());
        assert_eq!(&bytes[16..20], &3u32.to_ne_bytes());
        assert_eq!(&bytes[20..24], &DT_DIR.to_ne_bytes());
        assert_eq!(&bytes[24..27], b"sub");
        assert!(bytes[27..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_full_buffer_rejects_entry() {
        let mut buf = DirentBuffer::new(40);
        assert!(!buf.push(&entry(2, 1, "a.txt", false)));
        assert!(buf.push(&entry(3, 2, "sub", true)));
        assert_eq!(buf.len(), 32);
        assert_eq!(buf.entries(), vec![entry(2, 1, "a.txt", false)]);
    }

    #[test]
    fn test_zero_capacity() {
        let mut buf = DirentBuffer::new(0);
        assert!(buf.push(&entry(2, 1, "a", false)));
        assert!(buf.is_empty());
        assert!(buf.entries().is_empty());
    }
}
