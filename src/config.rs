//! Configuration parsing and structures

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::env::EnvExpander;
use crate::error::Result;
use crate::fuse::DEFAULT_ATTR_TTL;
use crate::mount::MountOptions;
use crate::source::memory::{MemorySource, TreeEntry};
use crate::source::DataSource;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Mount points
    pub mounts: Vec<MountConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Mount point configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MountConfig {
    /// Path where the filesystem will be mounted
    pub path: PathBuf,

    /// How long the kernel may cache attributes (e.g., "1s", "500ms")
    #[serde(default = "default_attr_ttl", with = "humantime_serde")]
    pub attr_ttl: Duration,

    /// Allow other users to access the mount
    #[serde(default)]
    pub allow_other: bool,

    /// Unmount when the daemon exits
    #[serde(default = "default_auto_unmount")]
    pub auto_unmount: bool,

    /// uid reported for all nodes (defaults to the daemon's uid)
    pub uid: Option<u32>,

    /// gid reported for all nodes (defaults to the daemon's gid)
    pub gid: Option<u32>,

    /// Data source backing this mount
    pub source: SourceConfig,
}

fn default_attr_ttl() -> Duration {
    DEFAULT_ATTR_TTL
}

fn default_auto_unmount() -> bool {
    true
}

/// Data source configuration (tagged enum)
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// In-memory tree declared inline
    Memory {
        #[serde(default)]
        tree: Vec<TreeEntry>,
    },
    /// Built-in demo tree
    Demo,
}

impl SourceConfig {
    /// Construct the data source this configuration describes
    pub fn build(&self) -> Result<Arc<dyn DataSource>> {
        match self {
            SourceConfig::Memory { tree } => Ok(Arc::new(MemorySource::from_tree(tree)?)),
            SourceConfig::Demo => Ok(Arc::new(MemorySource::demo()?)),
        }
    }
}

impl MountConfig {
    pub fn options(&self) -> MountOptions {
        MountOptions {
            attr_ttl: self.attr_ttl,
            allow_other: self.allow_other,
            auto_unmount: self.auto_unmount,
            uid: self.uid,
            gid: self.gid,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> std::result::Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// `${VAR}` references in string values (log level, mount paths, tree
    /// entry names and file content) are expanded after parsing.
    pub fn from_str(content: &str) -> std::result::Result<Self, ConfigError> {
        let mut config: Config =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.expand_env_vars()?;
        Ok(config)
    }

    fn expand_env_vars(&mut self) -> std::result::Result<(), ConfigError> {
        let mut expander = EnvExpander::default();
        expander.expand_in_place(&mut self.logging.level);

        for mount in &mut self.mounts {
            // Non-UTF-8 paths cannot hold a reference
            if let Some(path) = mount.path.to_str() {
                let mut path = path.to_string();
                expander.expand_in_place(&mut path);
                mount.path = PathBuf::from(path);
            }
            if let SourceConfig::Memory { tree } = &mut mount.source {
                expand_tree(&mut expander, tree);
            }
        }

        expander.finish()
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.mounts.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one mount point is required".to_string(),
            ));
        }

        // Check for duplicate mount paths
        let mut paths = HashSet::new();
        for mount in &self.mounts {
            if !paths.insert(&mount.path) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate mount path: {:?}",
                    mount.path
                )));
            }
        }

        for mount in &self.mounts {
            if let SourceConfig::Memory { tree } = &mount.source {
                validate_tree(&mount.path, Path::new("/"), tree)?;
            }
        }

        Ok(())
    }
}

fn expand_tree(expander: &mut EnvExpander, entries: &mut [TreeEntry]) {
    for entry in entries {
        match entry {
            TreeEntry::File { name, content } => {
                expander.expand_in_place(name);
                expander.expand_in_place(content);
            }
            TreeEntry::Directory { name, children } => {
                expander.expand_in_place(name);
                expand_tree(expander, children);
            }
        }
    }
}

fn validate_tree(
    mount: &Path,
    dir: &Path,
    entries: &[TreeEntry],
) -> std::result::Result<(), ConfigError> {
    let mut names = HashSet::new();

    for entry in entries {
        let name = entry.name();
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "Mount {:?}: invalid entry name {:?} in {:?}",
                mount, name, dir
            )));
        }
        if !names.insert(name) {
            return Err(ConfigError::ValidationError(format!(
                "Mount {:?}: duplicate entry {:?} in {:?}",
                mount, name, dir
            )));
        }
        if let TreeEntry::Directory { children, .. } = entry {
            validate_tree(mount, &dir.join(name), children)?;
        }
    }

    Ok(())
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
