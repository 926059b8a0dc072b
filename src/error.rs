use std::io;
use thiserror::Error;

/// Main error type for restfuse operations
#[derive(Error, Debug)]
pub enum RestFuseError {
    #[error("No such entry: {0}")]
    NotFound(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Entry already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RestFuseError {
    /// Convert error to libc errno for FUSE responses
    pub fn to_errno(&self) -> i32 {
        match self {
            RestFuseError::NotFound(_) => libc::ENOENT,
            RestFuseError::NotSupported(_) => libc::ENOSYS,
            RestFuseError::NotADirectory(_) => libc::ENOTDIR,
            RestFuseError::AlreadyExists(_) => libc::EEXIST,
            RestFuseError::InvalidArgument(_) => libc::EINVAL,
            RestFuseError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    pub fn not_found_inode(ino: u64) -> Self {
        RestFuseError::NotFound(format!("inode {}", ino))
    }
}

/// Result type alias for restfuse operations
pub type Result<T> = std::result::Result<T, RestFuseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(RestFuseError::not_found_inode(7).to_errno(), libc::ENOENT);
        assert_eq!(
            RestFuseError::NotSupported("write".into()).to_errno(),
            libc::ENOSYS
        );
        assert_eq!(
            RestFuseError::Io(io::Error::from_raw_os_error(libc::EACCES)).to_errno(),
            libc::EACCES
        );
        assert_eq!(
            RestFuseError::Io(io::Error::new(io::ErrorKind::Other, "boom")).to_errno(),
            libc::EIO
        );
    }
}
