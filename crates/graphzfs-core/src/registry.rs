//! Explicit driver registry.
//!
//! The host builds a registry, asks each backend crate to add its factory,
//! then initialises the driver named in configuration. Nothing registers
//! itself behind the host's back.

use crate::config::GraphzfsConfig;
use crate::error::{GraphzfsError, GraphzfsResult};
use graphzfs_driver::GraphDriver;
use log::debug;
use std::collections::BTreeMap;

/// Type-erased driver handed back to the host.
pub type BoxedDriver = Box<dyn GraphDriver<Error = GraphzfsError> + Send + Sync>;

/// Builds a driver from the loaded configuration (home, options, backend sections).
pub type DriverFactory = fn(&GraphzfsConfig) -> GraphzfsResult<BoxedDriver>;

#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `factory` under `name`. Registering the same name twice is a configuration error.
    pub fn register(&mut self, name: &str, factory: DriverFactory) -> GraphzfsResult<()> {
        if self.factories.contains_key(name) {
            return Err(GraphzfsError::InvalidConfig(format!(
                "driver `{name}` registered twice"
            )));
        }
        debug!("registered storage driver {name}");
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    /// Registered driver names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Initialise the driver named by `config.driver.name`.
    pub fn init(&self, config: &GraphzfsConfig) -> GraphzfsResult<BoxedDriver> {
        self.init_named(&config.driver.name, config)
    }

    pub fn init_named(&self, name: &str, config: &GraphzfsConfig) -> GraphzfsResult<BoxedDriver> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| GraphzfsError::UnknownDriver(name.to_string()))?;
        debug!("initialising storage driver {name} at {}", config.driver.home);
        factory(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphzfs_driver::{DriverStatus, Lookup};
    use std::path::PathBuf;

    struct NullDriver {
        home: PathBuf,
    }

    impl GraphDriver for NullDriver {
        type Error = GraphzfsError;

        fn name(&self) -> &str {
            "null"
        }

        fn status(&self) -> DriverStatus {
            vec![("Home".to_string(), self.home.display().to_string())]
        }

        fn cleanup(&self) -> GraphzfsResult<()> {
            Ok(())
        }

        fn create(&self, _id: &str, _parent: Option<&str>) -> GraphzfsResult<()> {
            Ok(())
        }

        fn remove(&self, id: &str) -> GraphzfsResult<()> {
            Err(GraphzfsError::Provider(format!("no layer {id}")))
        }

        fn get(&self, id: &str, _mount_label: &str) -> GraphzfsResult<PathBuf> {
            Err(GraphzfsError::Provider(format!("no layer {id}")))
        }

        fn put(&self, _id: &str) {}

        fn lookup(&self, _id: &str) -> GraphzfsResult<Lookup> {
            Ok(Lookup::Missing)
        }
    }

    fn null_factory(config: &GraphzfsConfig) -> GraphzfsResult<BoxedDriver> {
        Ok(Box::new(NullDriver {
            home: config.home(),
        }))
    }

    #[test]
    fn init_uses_configured_name() {
        let mut registry = DriverRegistry::new();
        registry.register("null", null_factory).unwrap();

        let mut config = GraphzfsConfig::default();
        config.driver.name = "null".into();
        config.driver.home = "/srv/layers".into();

        let driver = registry.init(&config).unwrap();
        assert_eq!(driver.name(), "null");
        assert_eq!(
            driver.status(),
            vec![("Home".to_string(), "/srv/layers".to_string())]
        );
        assert!(!driver.exists("anything"));
    }

    #[test]
    fn unknown_driver_is_reported() {
        let registry = DriverRegistry::new();
        match registry.init(&GraphzfsConfig::default()) {
            Err(GraphzfsError::UnknownDriver(name)) => assert_eq!(name, "zfs"),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected init to fail"),
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = DriverRegistry::new();
        registry.register("null", null_factory).unwrap();
        assert!(registry.register("null", null_factory).is_err());
        assert_eq!(registry.names(), vec!["null"]);
        assert!(registry.contains("null"));
    }
}
