//! Protocol-independent request handlers
//!
//! Each handler maps one FUSE request onto the data source and back. None of
//! them keep state between calls: inode numbers go to the source verbatim,
//! attributes are rebuilt on every request, and listings are refetched for
//! every page.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use fuser::FileAttr;
use tracing::{debug, trace};

use super::attr::{self, Owner, BLOCK_SIZE};
use super::dirent::{Dirent, DirentSink};
use crate::error::{RestFuseError, Result};
use crate::source::DataSource;

/// Fixed filesystem statistics reported by statfs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

impl FsStats {
    pub const FIXED: FsStats = FsStats {
        blocks: 0,
        bfree: 0,
        bavail: 0,
        files: 0,
        ffree: 0,
        bsize: BLOCK_SIZE,
        namelen: 255,
        frsize: BLOCK_SIZE,
    };
}

/// Request handlers over a shared data source
pub struct Handlers {
    source: Arc<dyn DataSource>,
    owner: Owner,
}

impl Handlers {
    pub fn new(source: Arc<dyn DataSource>, owner: Owner) -> Self {
        Self { source, owner }
    }

    /// Every source failure reaches the kernel as "no such entry"
    fn not_found(&self, op: &str, ino: u64, err: RestFuseError) -> RestFuseError {
        debug!("{} failed for {}: {}", op, self.source.locate(ino), err);
        match err {
            RestFuseError::NotFound(msg) => RestFuseError::NotFound(msg),
            other => RestFuseError::NotFound(other.to_string()),
        }
    }

    pub async fn get_attributes(&self, ino: u64) -> Result<FileAttr> {
        trace!("getattr: ino={}", ino);
        let info = self
            .source
            .stat(ino)
            .await
            .map_err(|e| self.not_found("getattr", ino, e))?;
        Ok(attr::synthesize(&info, self.owner, SystemTime::now()))
    }

    /// Resolve `name` in `parent`, returning the child's attributes
    /// (which carry its inode)
    pub async fn look_up(&self, parent: u64, name: &str) -> Result<FileAttr> {
        trace!("lookup: parent={} name={:?}", parent, name);
        // An empty name would turn into a self-lookup of the parent
        if name.is_empty() {
            return Err(RestFuseError::NotFound(format!(
                "empty name in inode {}",
                parent
            )));
        }
        let info = self
            .source
            .resolve_child(parent, name)
            .await
            .map_err(|e| self.not_found("lookup", parent, e))?;
        Ok(attr::synthesize(&info, self.owner, SystemTime::now()))
    }

    pub async fn open_directory(&self, ino: u64) -> Result<()> {
        trace!("opendir: ino={}", ino);
        self.source
            .list_directory(ino)
            .await
            .map_err(|e| self.not_found("opendir", ino, e))?;
        Ok(())
    }

    /// Push entries of `ino` starting at index `offset` into `sink` until the
    /// listing is exhausted or the sink is full. Returns the number of
    /// bytes written, counted in the kernel dirent encoding.
    pub async fn read_directory<S: DirentSink + ?Sized>(
        &self,
        ino: u64,
        offset: u64,
        sink: &mut S,
    ) -> Result<usize> {
        trace!("readdir: ino={} offset={}", ino, offset);
        let entries = self
            .source
            .list_directory(ino)
            .await
            .map_err(|e| self.not_found("readdir", ino, e))?;

        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let mut written = 0;

        for (index, info) in entries.into_iter().enumerate().skip(start) {
            let dirent = Dirent {
                inode: info.inode,
                offset: index as u64 + 1,
                name: info.name,
                is_dir: info.is_dir,
            };
            if sink.push(&dirent) {
                trace!("readdir: buffer full at index {}", index);
                break;
            }
            written += dirent.encoded_len();
        }

        Ok(written)
    }

    /// Opening never consults the source; reads fail later if the inode is bad
    pub fn open_file(&self, ino: u64) -> u64 {
        trace!("open: ino={}", ino);
        0
    }

    /// Read up to `size` bytes at `offset`. Reads at or past the end return
    /// no data rather than an error.
    pub async fn read_file(&self, ino: u64, offset: i64, size: u32) -> Result<Bytes> {
        trace!("read: ino={} offset={} size={}", ino, offset, size);
        let offset = u64::try_from(offset).map_err(|_| {
            RestFuseError::InvalidArgument(format!("negative read offset {}", offset))
        })?;

        let content = self
            .source
            .read_content(ino)
            .await
            .map_err(|e| self.not_found("read", ino, e))?;

        let len = content.len() as u64;
        if offset >= len {
            return Ok(Bytes::new());
        }

        let start = offset as usize;
        let end = start + (size as u64).min(len - offset) as usize;
        Ok(content.slice(start..end))
    }

    pub fn stat_filesystem(&self) -> FsStats {
        FsStats::FIXED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuse::dirent::DirentBuffer;
    use crate::source::memory::MemorySource;
    use crate::source::{FileInfo, ROOT_INODE};
    use fuser::FileType;

    const OWNER: Owner = Owner { uid: 0, gid: 0 };

    /// root(1) -> a.txt(2, "hi"), sub(3, empty)
    fn scenario() -> (Arc<MemorySource>, Handlers) {
        let source = Arc::new(MemorySource::new());
        source.add_file(ROOT_INODE, "a.txt", "hi").unwrap();
        source.add_dir(ROOT_INODE, "sub").unwrap();
        let handlers = Handlers::new(source.clone(), OWNER);
        (source, handlers)
    }

    fn wide_source(count: usize) -> (Arc<MemorySource>, Handlers) {
        let source = Arc::new(MemorySource::new());
        for i in 0..count {
            let name = format!("entry-{}-{}", i, "x".repeat(i % 13));
            if i % 3 == 0 {
                source.add_dir(ROOT_INODE, &name).unwrap();
            } else {
                source.add_file(ROOT_INODE, &name, vec![b'.'; i]).unwrap();
            }
        }
        let handlers = Handlers::new(source.clone(), OWNER);
        (source, handlers)
    }

    fn as_dirents(listing: Vec<FileInfo>) -> Vec<Dirent> {
        listing
            .into_iter()
            .enumerate()
            .map(|(i, info)| Dirent {
                inode: info.inode,
                offset: i as u64 + 1,
                name: info.name,
                is_dir: info.is_dir,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let (_, handlers) = scenario();

        let mut buf = DirentBuffer::new(4096);
        let written = handlers
            .read_directory(ROOT_INODE, 0, &mut buf)
            .await
            .unwrap();
        assert_eq!(written, buf.len());
        let entries = buf.entries();
        assert_eq!(
            entries.iter().map(|e| e.inode).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert!(!entries[0].is_dir);
        assert!(entries[1].is_dir);

        let data = handlers.read_file(2, 0, 4096).await.unwrap();
        assert_eq!(&data[..], b"hi");

        let eof = handlers.read_file(2, 2, 4096).await.unwrap();
        assert!(eof.is_empty());

        let missing = handlers.look_up(ROOT_INODE, "missing").await;
        assert!(matches!(missing, Err(RestFuseError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_full_listing_matches_source() {
        let (source, handlers) = wide_source(20);
        let listing = source.list_directory(ROOT_INODE).await.unwrap();

        let mut buf = DirentBuffer::new(1 << 16);
        handlers
            .read_directory(ROOT_INODE, 0, &mut buf)
            .await
            .unwrap();

        let entries = buf.entries();
        assert_eq!(entries, as_dirents(listing));
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.offset, i as u64 + 1);
        }

        // A second unpaged read is identical
        let mut again = DirentBuffer::new(1 << 16);
        handlers
            .read_directory(ROOT_INODE, 0, &mut again)
            .await
            .unwrap();
        assert_eq!(again.as_bytes(), buf.as_bytes());
    }

    #[tokio::test]
    async fn test_paged_reads_concatenate_to_full_listing() {
        let (source, handlers) = wide_source(25);
        let expected = as_dirents(source.list_directory(ROOT_INODE).await.unwrap());
        let largest = expected.iter().map(Dirent::encoded_len).max().unwrap();

        for capacity in [largest, largest + 8, 100, 257, 1000] {
            let mut collected = Vec::new();
            let mut offset = 0;
            loop {
                let mut buf = DirentBuffer::new(capacity);
                let written = handlers
                    .read_directory(ROOT_INODE, offset, &mut buf)
                    .await
                    .unwrap();
                let page = buf.entries();
                assert_eq!(buf.len(), written);
                assert!(buf.len() <= capacity);
                match page.last() {
                    Some(last) => offset = last.offset,
                    None => break,
                }
                collected.extend(page);
            }
            assert_eq!(collected, expected, "capacity {}", capacity);
        }
    }

    #[tokio::test]
    async fn test_read_directory_returns_bytes_written() {
        let (_, handlers) = scenario();

        // "a.txt" pads to 32 bytes, "sub" to 32 bytes
        let mut buf = DirentBuffer::new(4096);
        let written = handlers
            .read_directory(ROOT_INODE, 0, &mut buf)
            .await
            .unwrap();
        assert_eq!(written, 64);
        assert_eq!(written, buf.as_bytes().len());

        let mut partial = DirentBuffer::new(40);
        let written = handlers
            .read_directory(ROOT_INODE, 0, &mut partial)
            .await
            .unwrap();
        assert_eq!(written, 32);
        assert_eq!(partial.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_read_directory_past_end_is_empty() {
        let (_, handlers) = scenario();
        let mut buf = DirentBuffer::new(4096);
        let written = handlers
            .read_directory(ROOT_INODE, 10, &mut buf)
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_directory_ops_on_file_fail() {
        let (_, handlers) = scenario();
        let mut buf = DirentBuffer::new(4096);
        assert!(matches!(
            handlers.read_directory(2, 0, &mut buf).await,
            Err(RestFuseError::NotFound(_))
        ));
        assert!(matches!(
            handlers.open_directory(2).await,
            Err(RestFuseError::NotFound(_))
        ));
        assert!(matches!(
            handlers.open_directory(99).await,
            Err(RestFuseError::NotFound(_))
        ));
        handlers.open_directory(3).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_file_slicing() {
        let source = Arc::new(MemorySource::new());
        let ino = source
            .add_file(ROOT_INODE, "f", "0123456789")
            .unwrap();
        let handlers = Handlers::new(source, OWNER);

        assert_eq!(&handlers.read_file(ino, 3, 4).await.unwrap()[..], b"3456");
        assert_eq!(&handlers.read_file(ino, 8, 100).await.unwrap()[..], b"89");
        assert!(handlers.read_file(ino, 10, 4).await.unwrap().is_empty());
        assert!(handlers.read_file(ino, 1000, 4).await.unwrap().is_empty());
        assert!(handlers.read_file(ino, 0, 0).await.unwrap().is_empty());
        assert!(matches!(
            handlers.read_file(ino, -1, 4).await,
            Err(RestFuseError::InvalidArgument(_))
        ));
        assert!(matches!(
            handlers.read_file(ROOT_INODE, 0, 4).await,
            Err(RestFuseError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_attributes() {
        let (_, handlers) = scenario();

        let root = handlers.get_attributes(ROOT_INODE).await.unwrap();
        assert_eq!(root.kind, FileType::Directory);
        assert_eq!(root.nlink, 2);

        let file = handlers.get_attributes(2).await.unwrap();
        assert_eq!(file.kind, FileType::RegularFile);
        assert_eq!(file.size, 2);
        assert_eq!(file.nlink, 1);
        assert_eq!(file.perm, 0o644);

        assert!(matches!(
            handlers.get_attributes(404).await,
            Err(RestFuseError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_look_up() {
        let (_, handlers) = scenario();

        let sub = handlers.look_up(ROOT_INODE, "sub").await.unwrap();
        assert_eq!(sub.ino, 3);
        assert_eq!(sub.kind, FileType::Directory);

        assert!(matches!(
            handlers.look_up(ROOT_INODE, "").await,
            Err(RestFuseError::NotFound(_))
        ));
        assert!(matches!(
            handlers.look_up(404, "a.txt").await,
            Err(RestFuseError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_open_file_and_statfs() {
        let (_, handlers) = scenario();
        // No existence check at open time
        assert_eq!(handlers.open_file(404), 0);
        assert_eq!(handlers.stat_filesystem(), FsStats::FIXED);
        assert_eq!(handlers.stat_filesystem().namelen, 255);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests() {
        let (_, handlers) = wide_source(30);
        let handlers = Arc::new(handlers);

        let tasks = (0..64).map(|i| {
            let handlers = handlers.clone();
            tokio::spawn(async move {
                let mut buf = DirentBuffer::new(512);
                let written = handlers
                    .read_directory(ROOT_INODE, (i % 30) as u64, &mut buf)
                    .await?;
                let attr = handlers.get_attributes(ROOT_INODE).await?;
                Ok::<_, RestFuseError>((written, attr.nlink))
            })
        });

        for result in futures::future::join_all(tasks).await {
            let (written, nlink) = result.unwrap().unwrap();
            assert!(written > 0);
            assert_eq!(nlink, 2);
        }
    }
}
