pub mod attr;
pub mod dirent;
pub mod handlers;

use std::ffi::OsStr;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fuser::{
    Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyStatfs, ReplyWrite, Request,
};
use tracing::{debug, trace};

use crate::error::{RestFuseError, Result};
use crate::source::DataSource;

use self::attr::Owner;
use self::handlers::Handlers;

/// Default TTL for attribute caching (1 second)
pub const DEFAULT_ATTR_TTL: Duration = Duration::from_secs(1);

/// Generation number (not used, always 0)
const GENERATION: u64 = 0;

/// Worker threads of the request runtime
const WORKER_THREADS: usize = 4;

/// FUSE filesystem that delegates every request to a `DataSource`.
///
/// Each request is spawned onto a dedicated runtime together with its reply,
/// so slow source calls never hold up the FUSE session loop and requests run
/// concurrently.
///
/// The runtime is shut down in the background on drop, so an adapter may be
/// dropped from inside an async context.
pub struct FuseAdapter {
    handlers: Arc<Handlers>,
    runtime: Option<tokio::runtime::Runtime>,
    ttl: Duration,
}

impl FuseAdapter {
    /// Create a new FuseAdapter over `source`
    ///
    /// # Arguments
    /// * `source` - The data source to delegate requests to
    /// * `owner` - uid/gid reported for every node
    /// * `ttl` - How long the kernel may cache attributes and entries
    pub fn new(source: Arc<dyn DataSource>, owner: Owner, ttl: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(WORKER_THREADS)
            .thread_name("restfuse-worker")
            .enable_all()
            .build()
            .map_err(RestFuseError::Io)?;

        Ok(Self {
            handlers: Arc::new(Handlers::new(source, owner)),
            runtime: Some(runtime),
            ttl,
        })
    }

    pub fn handlers(&self) -> &Arc<Handlers> {
        &self.handlers
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(runtime) = &self.runtime {
            runtime.spawn(task);
        }
    }

    fn reject_write(op: &str, reply_error: impl FnOnce(i32)) {
        let err = RestFuseError::NotSupported(op.to_string());
        debug!("{}: {}", op, err);
        reply_error(err.to_errno());
    }
}

impl Drop for FuseAdapter {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Filesystem for FuseAdapter {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str().map(str::to_owned) else {
            trace!("lookup: non-UTF-8 name {:?}", name);
            reply.error(libc::ENOENT);
            return;
        };

        let handlers = self.handlers.clone();
        let ttl = self.ttl;
        self.spawn(async move {
            match handlers.look_up(parent, &name).await {
                Ok(attr) => reply.entry(&ttl, &attr, GENERATION),
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let handlers = self.handlers.clone();
        let ttl = self.ttl;
        self.spawn(async move {
            match handlers.get_attributes(ino).await {
                Ok(attr) => reply.attr(&ttl, &attr),
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let handlers = self.handlers.clone();
        self.spawn(async move {
            match handlers.open_directory(ino).await {
                Ok(()) => reply.opened(0, 0),
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };

        let handlers = self.handlers.clone();
        self.spawn(async move {
            match handlers.read_directory(ino, offset, &mut reply).await {
                Ok(_) => reply.ok(),
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let fh = self.handlers.open_file(ino);
        reply.opened(fh, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let handlers = self.handlers.clone();
        self.spawn(async move {
            match handlers.read_file(ino, offset, size).await {
                Ok(data) => reply.data(&data),
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let stats = self.handlers.stat_filesystem();
        reply.statfs(
            stats.blocks,
            stats.bfree,
            stats.bavail,
            stats.files,
            stats.ffree,
            stats.bsize,
            stats.namelen,
            stats.frsize,
        );
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        Self::reject_write("write", |errno| reply.error(errno));
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        Self::reject_write("create", |errno| reply.error(errno));
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        Self::reject_write("mkdir", |errno| reply.error(errno));
    }

    fn unlink(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        Self::reject_write("unlink", |errno| reply.error(errno));
    }

    fn rmdir(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        Self::reject_write("rmdir", |errno| reply.error(errno));
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        Self::reject_write("rename", |errno| reply.error(errno));
    }
}
