#![forbid(unsafe_code)]

//! Driver contract shared across graphzfs.
//!
//! The host engine's layer store talks to storage backends only through
//! [`GraphDriver`], so concrete integrations (`graphzfs-zfs`) stay swappable.

use std::error::Error;
use std::path::PathBuf;

/// Ordered key/value pairs surfaced by `docker info`-style status views.
pub type DriverStatus = Vec<(String, String)>;

/// Outcome of resolving a layer id to its on-disk location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The layer exists and is exposed at this path.
    Found(PathBuf),
    /// The backend positively reported that the layer does not exist.
    Missing,
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// Abstraction over a layer storage backend.
///
/// Callers serialise operations per layer id; implementations are not
/// required to guard against concurrent Create/Remove of the same id.
pub trait GraphDriver {
    type Error: Error + Send + Sync + 'static;

    /// Name the driver registers under.
    fn name(&self) -> &str;

    /// Backend-specific status rows.
    fn status(&self) -> DriverStatus;

    /// Release anything held for the driver's lifetime.
    fn cleanup(&self) -> Result<(), Self::Error>;

    /// Create layer `id`, optionally derived from the existing layer `parent`.
    fn create(&self, id: &str, parent: Option<&str>) -> Result<(), Self::Error>;

    /// Remove layer `id` and everything exclusively owned by it.
    fn remove(&self, id: &str) -> Result<(), Self::Error>;

    /// Return the path where layer `id` is exposed.
    ///
    /// `mount_label` exists for interface compatibility; backends that do not
    /// perform labelled mounts ignore it. The returned path is absolute; a
    /// layer with no path to expose is an error, not a relative value.
    fn get(&self, id: &str, mount_label: &str) -> Result<PathBuf, Self::Error>;

    /// Release whatever `get` acquired.
    fn put(&self, id: &str);

    /// Resolve layer `id`, separating "does not exist" from backend failures.
    fn lookup(&self, id: &str) -> Result<Lookup, Self::Error>;

    /// Return whether layer `id` exists.
    fn exists(&self, id: &str) -> bool {
        matches!(self.lookup(id), Ok(Lookup::Found(_)))
    }
}

impl<T> GraphDriver for Box<T>
where
    T: GraphDriver + ?Sized,
{
    type Error = T::Error;

    fn name(&self) -> &str {
        (**self).name()
    }

    fn status(&self) -> DriverStatus {
        (**self).status()
    }

    fn cleanup(&self) -> Result<(), Self::Error> {
        (**self).cleanup()
    }

    fn create(&self, id: &str, parent: Option<&str>) -> Result<(), Self::Error> {
        (**self).create(id, parent)
    }

    fn remove(&self, id: &str) -> Result<(), Self::Error> {
        (**self).remove(id)
    }

    fn get(&self, id: &str, mount_label: &str) -> Result<PathBuf, Self::Error> {
        (**self).get(id, mount_label)
    }

    fn put(&self, id: &str) {
        (**self).put(id)
    }

    fn lookup(&self, id: &str) -> Result<Lookup, Self::Error> {
        (**self).lookup(id)
    }

    fn exists(&self, id: &str) -> bool {
        (**self).exists(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fmt;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct MemError(String);

    impl fmt::Display for MemError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl Error for MemError {}

    #[derive(Default)]
    struct MemDriver {
        layers: Mutex<HashMap<String, Option<String>>>,
        broken: bool,
    }

    impl GraphDriver for MemDriver {
        type Error = MemError;

        fn name(&self) -> &str {
            "mem"
        }

        fn status(&self) -> DriverStatus {
            Vec::new()
        }

        fn cleanup(&self) -> Result<(), MemError> {
            Ok(())
        }

        fn create(&self, id: &str, parent: Option<&str>) -> Result<(), MemError> {
            self.layers
                .lock()
                .unwrap()
                .insert(id.to_string(), parent.map(str::to_string));
            Ok(())
        }

        fn remove(&self, id: &str) -> Result<(), MemError> {
            self.layers
                .lock()
                .unwrap()
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| MemError(format!("no layer {id}")))
        }

        fn get(&self, id: &str, _mount_label: &str) -> Result<PathBuf, MemError> {
            match self.lookup(id)? {
                Lookup::Found(path) => Ok(path),
                Lookup::Missing => Err(MemError(format!("no layer {id}"))),
            }
        }

        fn put(&self, _id: &str) {}

        fn lookup(&self, id: &str) -> Result<Lookup, MemError> {
            if self.broken {
                return Err(MemError("backend offline".into()));
            }
            if self.layers.lock().unwrap().contains_key(id) {
                Ok(Lookup::Found(PathBuf::from("/mem").join(id)))
            } else {
                Ok(Lookup::Missing)
            }
        }
    }

    #[test]
    fn exists_follows_lookup() {
        let driver = MemDriver::default();
        assert!(!driver.exists("a"));
        driver.create("a", None).unwrap();
        assert!(driver.exists("a"));
        assert!(driver.exists("a"));
    }

    #[test]
    fn exists_is_false_when_backend_fails() {
        let driver = MemDriver {
            broken: true,
            ..MemDriver::default()
        };
        assert!(!driver.exists("a"));
        assert!(driver.lookup("a").is_err());
    }

    #[test]
    fn boxed_driver_delegates() {
        let driver: Box<MemDriver> = Box::default();
        driver.create("b", Some("a")).unwrap();
        assert_eq!(driver.name(), "mem");
        assert_eq!(driver.get("b", "").unwrap(), PathBuf::from("/mem/b"));
        assert!(driver.lookup("b").unwrap().is_found());
    }
}
