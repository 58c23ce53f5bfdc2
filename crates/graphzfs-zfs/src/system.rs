//! System-backed `GraphDriver` implementation.
//!
//! Every layer is a dataset directly under the pool root. Child layers are
//! clones of a snapshot of their parent taken at creation time.

use crate::command::ZfsCommand;
use graphzfs_core::config::{
    detect_zfs_binary_path, looks_like_dataset_name, split_option, GraphzfsConfig,
    KNOWN_ZFS_PATHS,
};
use graphzfs_core::error::{GraphzfsError, GraphzfsResult};
use graphzfs_core::registry::{BoxedDriver, DriverRegistry};
use graphzfs_driver::{DriverStatus, GraphDriver, Lookup};
use log::{debug, info, warn};
use std::env;
use std::path::{Path, PathBuf};

pub const DRIVER_NAME: &str = "zfs";
pub const DEFAULT_ZFS_PATHS: &[&str] = KNOWN_ZFS_PATHS;

const OPTION_FSNAME: &str = "zfs.fsname";
const OPTION_PATH: &str = "zfs.path";

/// Layer store that manages datasets via the host `zfs` binary.
#[derive(Debug, Clone)]
pub struct ZfsDriver {
    zfs: ZfsCommand,
    pool_root: String,
    home: PathBuf,
}

/// Add the `zfs` factory to `registry`.
pub fn register(registry: &mut DriverRegistry) -> GraphzfsResult<()> {
    registry.register(DRIVER_NAME, factory)
}

fn factory(config: &GraphzfsConfig) -> GraphzfsResult<BoxedDriver> {
    Ok(Box::new(ZfsDriver::from_config(config)?))
}

impl ZfsDriver {
    /// Build a driver for `home` from built-in defaults plus `key=value` options.
    pub fn init(home: impl Into<PathBuf>, options: &[String]) -> GraphzfsResult<Self> {
        let home: PathBuf = home.into();
        let mut config = GraphzfsConfig::default();
        config.driver.home = home.to_string_lossy().into_owned();
        config.driver.options = options.to_vec();
        Self::from_config(&config)
    }

    /// Build a driver from configuration; `driver.options` override the `[zfs]` section.
    pub fn from_config(config: &GraphzfsConfig) -> GraphzfsResult<Self> {
        let mut pool_root = config.zfs.pool_root.clone();
        let mut zfs_path = config.zfs_binary_path();

        for option in &config.driver.options {
            let (key, value) = split_option(option)?;
            match key.as_str() {
                OPTION_FSNAME => pool_root = value,
                OPTION_PATH => zfs_path = Some(PathBuf::from(value)),
                _ => {
                    return Err(GraphzfsError::InvalidConfig(format!(
                        "unknown option {key} for zfs driver"
                    )))
                }
            }
        }

        let pool_root = pool_root.trim_end_matches('/').to_string();
        if !looks_like_dataset_name(&pool_root) {
            return Err(GraphzfsError::InvalidConfig(format!(
                "invalid zfs pool root `{pool_root}`"
            )));
        }

        let binary = resolve_zfs_path(zfs_path.as_deref())?;
        let zfs = ZfsCommand::new(binary, config.zfs_timeout());
        info!(
            "zfs driver ready (root dataset {pool_root}, binary {})",
            zfs.binary().display()
        );

        Ok(Self {
            zfs,
            pool_root,
            home: config.home(),
        })
    }

    pub fn pool_root(&self) -> &str {
        &self.pool_root
    }

    /// Root path the engine handed to the driver.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Dataset backing layer `id`. Only the last path component of `id` is
    /// used, so the result always sits directly under the pool root.
    pub fn dataset(&self, id: &str) -> GraphzfsResult<String> {
        Ok(format!("{}/{}", self.pool_root, layer_base(id)?))
    }

    /// Snapshot, clone, then defer destruction of the snapshot.
    ///
    /// The snapshot is named after the child id, so callers must not reuse a
    /// child id under the same parent; a collision fails before anything is cloned.
    fn create_from_parent(&self, id: &str, dataset: &str, parent: &str) -> GraphzfsResult<()> {
        let parent_dataset = self.dataset(parent)?;
        let snapshot = format!("{parent_dataset}@{}", layer_base(id)?);

        self.zfs.snapshot(&snapshot).map_err(|err| match err {
            GraphzfsError::AlreadyExists {
                step,
                command,
                diagnostic,
            } => GraphzfsError::AlreadyExists {
                step,
                command,
                diagnostic: format!(
                    "snapshot {snapshot} is already taken; layer ids must be unique per parent ({diagnostic})"
                ),
            },
            other => other,
        })?;

        if let Err(err) = self.zfs.clone_snapshot(&snapshot, dataset) {
            best_effort(&format!("destroy snapshot {snapshot}"), self.zfs.destroy(&snapshot));
            return Err(err);
        }

        if let Err(err) = self.zfs.destroy_deferred(&snapshot) {
            best_effort(
                &format!("destroy clone {dataset}"),
                self.zfs.destroy_recursive(dataset),
            );
            best_effort(&format!("destroy snapshot {snapshot}"), self.zfs.destroy(&snapshot));
            return Err(err);
        }

        debug!("cloned {snapshot} into {dataset}");
        Ok(())
    }
}

impl GraphDriver for ZfsDriver {
    type Error = GraphzfsError;

    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn status(&self) -> DriverStatus {
        Vec::new()
    }

    fn cleanup(&self) -> GraphzfsResult<()> {
        Ok(())
    }

    fn create(&self, id: &str, parent: Option<&str>) -> GraphzfsResult<()> {
        let dataset = self.dataset(id)?;
        match parent.filter(|parent| !parent.is_empty()) {
            None => self.zfs.create(&dataset),
            Some(parent) => self.create_from_parent(id, &dataset, parent),
        }
    }

    fn remove(&self, id: &str) -> GraphzfsResult<()> {
        let dataset = self.dataset(id)?;

        // Promotions run one at a time; each one moves snapshots between datasets.
        for snapshot in self.zfs.list_snapshots(&dataset)? {
            let clones = match self.zfs.clones(&snapshot) {
                Ok(clones) => clones,
                Err(err) if err.is_not_found() => {
                    debug!("snapshot {snapshot} moved by an earlier promotion; skipping");
                    continue;
                }
                Err(err) => return Err(err),
            };
            for clone in clones {
                debug!("promoting {clone} off {snapshot}");
                self.zfs.promote(&clone)?;
            }
        }

        self.zfs.destroy_recursive(&dataset)
    }

    fn get(&self, id: &str, _mount_label: &str) -> GraphzfsResult<PathBuf> {
        let dataset = self.dataset(id)?;
        let mountpoint = self.zfs.mountpoint(&dataset)?;
        // `none` and `legacy` leave the dataset without a path we can hand out.
        if !Path::new(&mountpoint).is_absolute() {
            return Err(GraphzfsError::Provider(format!(
                "dataset {dataset} has no usable mountpoint (`{mountpoint}`)"
            )));
        }
        Ok(PathBuf::from(mountpoint))
    }

    // Get performs no mount, so there is nothing to release.
    fn put(&self, _id: &str) {}

    fn lookup(&self, id: &str) -> GraphzfsResult<Lookup> {
        match self.get(id, "") {
            Ok(path) => Ok(Lookup::Found(path)),
            Err(err) if err.is_not_found() => Ok(Lookup::Missing),
            Err(err) => Err(err),
        }
    }

    fn exists(&self, id: &str) -> bool {
        match self.lookup(id) {
            Ok(lookup) => lookup.is_found(),
            Err(err) => {
                warn!("unable to determine whether layer {id} exists: {err}");
                false
            }
        }
    }
}

fn best_effort(action: &str, result: GraphzfsResult<()>) {
    if let Err(err) = result {
        warn!("rollback could not {action}: {err}; manual cleanup required");
    }
}

/// Final path component of `id`, rejecting anything that would not name a
/// plain child of the pool root.
fn layer_base(id: &str) -> GraphzfsResult<&str> {
    let base = id.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    if base.is_empty() || base == "." || base == ".." {
        return Err(GraphzfsError::InvalidId(format!(
            "`{id}` does not name a layer"
        )));
    }
    if base.contains('@') {
        return Err(GraphzfsError::InvalidId(format!(
            "`{id}` contains a snapshot separator"
        )));
    }
    Ok(base)
}

fn resolve_zfs_path(configured: Option<&Path>) -> GraphzfsResult<PathBuf> {
    if let Some(candidate) = configured {
        if !candidate.exists() {
            return Err(GraphzfsError::InvalidConfig(format!(
                "zfs binary not found at {}",
                candidate.display()
            )));
        }
        return Ok(candidate.to_path_buf());
    }

    if let Some(found) = detect_zfs_binary_path() {
        return Ok(PathBuf::from(found));
    }

    find_in_path("zfs").ok_or_else(|| {
        GraphzfsError::InvalidConfig(format!(
            "unable to locate zfs binary; tried {:?} and PATH",
            DEFAULT_ZFS_PATHS
        ))
    })
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(binary);
        if candidate.is_file() {
            Some(candidate)
        } else {
            None
        }
    })
}
