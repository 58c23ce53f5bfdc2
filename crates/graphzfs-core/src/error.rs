//! Error taxonomy shared by every graphzfs crate.

use std::time::Duration;
use thiserror::Error;

pub type GraphzfsResult<T> = Result<T, GraphzfsError>;

#[derive(Debug, Error)]
pub enum GraphzfsError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid layer id: {0}")]
    InvalidId(String),

    /// The tool reported that the dataset or snapshot does not exist.
    #[error("{step} failed: `{command}` reported a missing target: {diagnostic}")]
    NotFound {
        step: String,
        command: String,
        diagnostic: String,
    },

    /// The tool refused to create a name that is already taken.
    #[error("{step} failed: `{command}` reported a name collision: {diagnostic}")]
    AlreadyExists {
        step: String,
        command: String,
        diagnostic: String,
    },

    /// The external tool ran and reported failure.
    #[error("{step} failed: `{command}` exited with code {status}: {diagnostic}")]
    Command {
        step: String,
        command: String,
        status: i32,
        diagnostic: String,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("no driver registered under `{0}`")]
    UnknownDriver(String),

    #[error("{0}")]
    Provider(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl GraphzfsError {
    /// True when the backend positively reported the target as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GraphzfsError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_names_step_and_diagnostic() {
        let err = GraphzfsError::Command {
            step: "clone parent snapshot".into(),
            command: "zfs clone tank/a@b tank/b".into(),
            status: 1,
            diagnostic: "cannot create 'tank/b': out of space".into(),
        };
        let rendered = err.to_string();
        assert!(rendered.starts_with("clone parent snapshot failed"));
        assert!(rendered.contains("zfs clone tank/a@b tank/b"));
        assert!(rendered.ends_with("cannot create 'tank/b': out of space"));
    }

    #[test]
    fn not_found_is_distinct() {
        let missing = GraphzfsError::NotFound {
            step: "get mountpoint".into(),
            command: "zfs get -Ho value mountpoint tank/x".into(),
            diagnostic: "cannot open 'tank/x': dataset does not exist".into(),
        };
        assert!(missing.is_not_found());
        let rendered = missing.to_string();
        assert!(rendered.starts_with("get mountpoint failed"));
        assert!(rendered.contains("zfs get -Ho value mountpoint tank/x"));
        assert!(!GraphzfsError::Provider("boom".into()).is_not_found());
    }
}
