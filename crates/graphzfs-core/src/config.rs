//! Configuration model and helpers used by graphzfs drivers and binaries.

use crate::error::{GraphzfsError, GraphzfsResult};
use directories_next::ProjectDirs;
use log::{info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/graphzfs.toml";
pub const DEFAULT_POOL_ROOT: &str = "storage/docker";
pub const DEFAULT_DRIVER_NAME: &str = "zfs";
pub const DEFAULT_HOME: &str = "/var/lib/graphzfs";
const USER_FILE_NAME: &str = "graphzfs.toml";
const APP_QUALIFIER: &str = "io";
const APP_ORGANIZATION: &str = "Graphzfs";
const APP_NAME: &str = "graphzfs";
pub const KNOWN_ZFS_PATHS: &[&str] = &[
    "/usr/sbin/zfs",
    "/sbin/zfs",
    "/bin/zfs",
    "/usr/local/sbin/zfs",
];

pub(crate) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
}

/// Lightweight sanity check that a provided dataset name matches common ZFS patterns.
pub fn looks_like_dataset_name(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed != name {
        return false;
    }

    for segment in trimmed.split('/') {
        if segment.is_empty() {
            return false;
        }
        if segment.starts_with('-') || segment == "." || segment == ".." {
            return false;
        }
        if !segment
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | ':' | '.'))
        {
            return false;
        }
    }

    true
}

/// Return the first candidate binary that exists on this host.
pub fn detect_binary_path(candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .map(Path::new)
        .find(|path| path.exists())
        .map(|path| path.to_string_lossy().into_owned())
}

pub fn detect_zfs_binary_path() -> Option<String> {
    detect_binary_path(KNOWN_ZFS_PATHS)
}

/// Split a `key=value` driver option. Keys are case-insensitive and returned lowercased.
pub fn split_option(raw: &str) -> GraphzfsResult<(String, String)> {
    let (key, value) = raw.split_once('=').ok_or_else(|| {
        GraphzfsError::InvalidConfig(format!("driver option `{raw}` is not of the form key=value"))
    })?;
    let key = key.trim().to_ascii_lowercase();
    if key.is_empty() {
        return Err(GraphzfsError::InvalidConfig(format!(
            "driver option `{raw}` has an empty key"
        )));
    }
    Ok((key, value.trim().to_string()))
}

/// Which driver to initialise and what the host hands it at init time.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DriverCfg {
    #[serde(default = "default_driver_name")]
    pub name: String,

    /// Root path the engine assigns to the driver.
    #[serde(default = "default_home")]
    pub home: String,

    /// Driver options in `key=value` form, applied over the typed sections.
    #[serde(default)]
    pub options: Vec<String>,
}

fn default_driver_name() -> String {
    DEFAULT_DRIVER_NAME.to_string()
}

fn default_home() -> String {
    DEFAULT_HOME.to_string()
}

impl Default for DriverCfg {
    fn default() -> Self {
        Self {
            name: default_driver_name(),
            home: default_home(),
            options: Vec::new(),
        }
    }
}

/// Where layers live in the pool and how the `zfs` CLI is invoked.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ZfsCfg {
    #[serde(default)]
    pub zfs_path: Option<String>,

    /// Dataset every layer is created beneath.
    #[serde(default = "default_pool_root")]
    pub pool_root: String,

    /// Seconds to wait for a single `zfs` invocation; `0` waits indefinitely.
    #[serde(default)]
    pub timeout_secs: u64,
}

fn default_pool_root() -> String {
    DEFAULT_POOL_ROOT.to_string()
}

impl Default for ZfsCfg {
    fn default() -> Self {
        Self {
            zfs_path: None,
            pool_root: default_pool_root(),
            timeout_secs: 0,
        }
    }
}

/// Top-level configuration snapshot loaded from disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct GraphzfsConfig {
    #[serde(default)]
    pub driver: DriverCfg,

    #[serde(default)]
    pub zfs: ZfsCfg,

    #[serde(skip)]
    pub path: PathBuf,

    #[serde(skip)]
    pub format: ConfigFormat,
}

/// Tracks whether we parsed TOML or YAML so writes preserve format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigFormat {
    #[default]
    Toml,
    Yaml,
}

impl GraphzfsConfig {
    /// Return the canonical system-wide configuration path.
    pub fn default_path() -> &'static Path {
        Path::new(DEFAULT_CONFIG_PATH)
    }

    /// Resolve the per-user configuration path.
    pub fn user_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(USER_FILE_NAME))
    }

    /// Load configuration from `path`, falling back to defaults when it is missing.
    ///
    /// When the caller asks for the system default and it does not exist, a
    /// per-user configuration is consulted before settling on defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> GraphzfsResult<Self> {
        let target = path.as_ref();
        if target.exists() {
            return Self::load(target);
        }

        if target == Self::default_path() {
            if let Some(user_path) = Self::user_config_path().filter(|p| p.exists()) {
                warn!(
                    "configuration missing at {}; using per-user configuration at {}",
                    target.display(),
                    user_path.display()
                );
                return Self::load(&user_path);
            }
        }

        info!(
            "configuration missing at {}; using built-in defaults",
            target.display()
        );
        let mut cfg = Self::default();
        cfg.path = target.to_path_buf();
        cfg.format = format_for(target);
        Ok(cfg)
    }

    /// Read a config file from disk, detect format, and validate basics.
    pub fn load<P: AsRef<Path>>(path: P) -> GraphzfsResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let format = format_for(path);
        let mut cfg = match format {
            ConfigFormat::Toml => toml::from_str::<Self>(&contents)?,
            ConfigFormat::Yaml => serde_yaml::from_str::<Self>(&contents)?,
        };

        cfg.path = path.to_path_buf();
        cfg.format = format;

        if cfg.driver.name.trim().is_empty() {
            return Err(GraphzfsError::InvalidConfig(
                "driver.name must not be empty".to_string(),
            ));
        }

        Ok(cfg)
    }

    /// Perform a best-effort validation pass and return human-readable issues.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.driver.name.trim().is_empty() {
            issues.push("driver.name must not be empty".to_string());
        }

        if !Path::new(&self.driver.home).is_absolute() {
            issues.push(format!(
                "driver.home must be an absolute path: {}",
                self.driver.home
            ));
        }

        for option in &self.driver.options {
            if let Err(err) = split_option(option) {
                issues.push(err.to_string());
            }
        }

        if !looks_like_dataset_name(&self.zfs.pool_root) {
            issues.push(format!(
                "zfs.pool_root contains invalid dataset name: {}",
                self.zfs.pool_root
            ));
        }

        if let Some(path) = self.zfs.zfs_path.as_deref().map(str::trim) {
            if path.is_empty() {
                issues.push("zfs.zfs_path is set but empty".to_string());
            } else if !Path::new(path).exists() {
                issues.push(format!("zfs.zfs_path does not exist: {path}"));
            }
        }

        issues
    }

    /// Translate the stored timeout into a `Duration`; `None` means wait indefinitely.
    pub fn zfs_timeout(&self) -> Option<Duration> {
        (self.zfs.timeout_secs > 0).then(|| Duration::from_secs(self.zfs.timeout_secs))
    }

    /// Optional override for the `zfs` CLI path.
    pub fn zfs_binary_path(&self) -> Option<PathBuf> {
        self.zfs
            .zfs_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    }

    pub fn home(&self) -> PathBuf {
        PathBuf::from(&self.driver.home)
    }

    /// Persist the configuration back to its original on-disk format.
    pub fn save(&self) -> GraphzfsResult<()> {
        let payload = match self.format {
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
            ConfigFormat::Yaml => serde_yaml::to_string(self)?,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, payload)?;
        Ok(())
    }
}

fn format_for(path: &Path) -> ConfigFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            ConfigFormat::Yaml
        }
        _ => ConfigFormat::Toml,
    }
}
