//! Core building blocks shared by graphzfs crates.
//!
//! Configuration, the error taxonomy, logging bootstrap, and the driver
//! registry live here so backend crates only implement the driver contract.

pub mod config;
pub mod error;
pub mod logging;
pub mod registry;

pub use config::{ConfigFormat, DriverCfg, GraphzfsConfig, ZfsCfg};
pub use error::{GraphzfsError, GraphzfsResult};
pub use graphzfs_driver::{DriverStatus, GraphDriver, Lookup};
pub use registry::{BoxedDriver, DriverFactory, DriverRegistry};
