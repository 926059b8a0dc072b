//! Mount management and lifecycle

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fuser::MountOption;
use parking_lot::Mutex;
use tracing::info;

use crate::error::{RestFuseError, Result};
use crate::fuse::attr::Owner;
use crate::fuse::{FuseAdapter, DEFAULT_ATTR_TTL};
use crate::source::DataSource;

/// Filesystem name reported to the kernel
pub const FS_NAME: &str = "restfuse";
/// Filesystem subtype reported to the kernel
pub const FS_SUBTYPE: &str = "restfuse-v1";

/// Per-mount settings
#[derive(Debug, Clone)]
pub struct MountOptions {
    /// Kernel attribute/entry cache TTL
    pub attr_ttl: Duration,
    /// Let users other than the mounter access the filesystem
    pub allow_other: bool,
    /// Unmount automatically when the process exits
    pub auto_unmount: bool,
    /// uid reported for all nodes (defaults to process uid)
    pub uid: Option<u32>,
    /// gid reported for all nodes (defaults to process gid)
    pub gid: Option<u32>,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            attr_ttl: DEFAULT_ATTR_TTL,
            allow_other: false,
            auto_unmount: true,
            uid: None,
            gid: None,
        }
    }
}

impl MountOptions {
    /// fuser mount options; the filesystem is always read-only
    pub fn fuse_options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName(FS_NAME.to_string()),
            MountOption::Subtype(FS_SUBTYPE.to_string()),
            MountOption::RO,
            MountOption::DefaultPermissions,
        ];
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        options
    }

    fn owner(&self) -> Owner {
        Owner::new(self.uid, self.gid)
    }
}

fn check_mount_point(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(RestFuseError::NotFound(format!(
            "Mount point does not exist: {:?}",
            path
        )));
    }

    if !path.is_dir() {
        return Err(RestFuseError::NotADirectory(format!(
            "Mount point is not a directory: {:?}",
            path
        )));
    }

    Ok(())
}

/// Mount `source` at `path` and serve requests on the calling thread until
/// the filesystem is unmounted externally or the session fails.
pub fn serve(path: &Path, source: Arc<dyn DataSource>, options: &MountOptions) -> Result<()> {
    check_mount_point(path)?;
    let adapter = FuseAdapter::new(source, options.owner(), options.attr_ttl)?;

    info!(
        "Serving {:?} in the foreground. To unmount, use: fusermount -u {}",
        path,
        path.display()
    );
    fuser::mount2(adapter, path, &options.fuse_options()).map_err(RestFuseError::Io)?;
    info!("Unmounted {:?}", path);
    Ok(())
}

/// Represents an active mount
pub struct ActiveMount {
    /// Mount path
    pub path: PathBuf,
    /// Session handle (for unmounting)
    session: Option<fuser::BackgroundSession>,
}

impl ActiveMount {
    fn new(path: PathBuf, session: fuser::BackgroundSession) -> Self {
        Self {
            path,
            session: Some(session),
        }
    }

    /// Unmount this filesystem
    pub fn unmount(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Unmounting {:?}", self.path);
            drop(session);
        }
    }
}

impl Drop for ActiveMount {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Mount manager - handles lifecycle of all background mounts
pub struct MountManager {
    mounts: Mutex<Vec<ActiveMount>>,
}

impl MountManager {
    pub fn new() -> Self {
        Self {
            mounts: Mutex::new(Vec::new()),
        }
    }

    /// Mount a data source at the specified path in a background session
    pub fn mount(
        &self,
        path: PathBuf,
        source: Arc<dyn DataSource>,
        options: &MountOptions,
    ) -> Result<()> {
        info!("Mounting at {:?}", path);
        check_mount_point(&path)?;

        if self.mounts.lock().iter().any(|m| m.path == path) {
            return Err(RestFuseError::AlreadyExists(format!(
                "Already mounted: {:?}",
                path
            )));
        }

        let adapter = FuseAdapter::new(source, options.owner(), options.attr_ttl)?;
        let session = fuser::spawn_mount2(adapter, &path, &options.fuse_options())
            .map_err(RestFuseError::Io)?;

        self.mounts
            .lock()
            .push(ActiveMount::new(path.clone(), session));

        info!("Successfully mounted at {:?}", path);
        Ok(())
    }

    /// Unmount a specific path
    pub fn unmount(&self, path: &Path) -> Result<()> {
        let mut mounts = self.mounts.lock();
        if let Some(pos) = mounts.iter().position(|m| m.path == path) {
            let mut mount = mounts.remove(pos);
            mount.unmount();
            Ok(())
        } else {
            Err(RestFuseError::NotFound(format!("No mount at {:?}", path)))
        }
    }

    /// Unmount all filesystems
    pub fn unmount_all(&self) {
        let mut mounts = self.mounts.lock();
        if mounts.is_empty() {
            return;
        }
        info!("Unmounting all filesystems");
        for mut mount in mounts.drain(..) {
            mount.unmount();
        }
    }

    /// Get list of active mount paths
    pub fn list_mounts(&self) -> Vec<PathBuf> {
        self.mounts.lock().iter().map(|m| m.path.clone()).collect()
    }

    /// Number of active mounts
    pub fn count(&self) -> usize {
        self.mounts.lock().len()
    }
}

impl Default for MountManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MountManager {
    fn drop(&mut self) {
        self.unmount_all();
    }
}
