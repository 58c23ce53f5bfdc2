#![forbid(unsafe_code)]

//! ZFS layer storage driver.
//!
//! `system` implements `GraphDriver` on top of the host `zfs` CLI. `command` and
//! `parse` isolate process execution and output parsing so the driver stays testable.

mod command;
mod parse;
mod system;

pub use system::{register, ZfsDriver, DEFAULT_ZFS_PATHS, DRIVER_NAME};
