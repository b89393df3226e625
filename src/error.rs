use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file as YAML ({yaml}) or JSON ({json})")]
    Parse { yaml: String, json: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WakeError {
    #[error("invalid MAC address '{mac}': {reason}")]
    InvalidMac { mac: String, reason: &'static str },

    #[error("{context}: {source}")]
    Network {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl WakeError {
    pub(crate) fn network(context: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| WakeError::Network { context, source }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("server '{0}' not found in configuration")]
    UnknownHost(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification endpoint rejected message with status {0}")]
    Rejected(u16),

    #[error("notification delivery timed out")]
    Timeout,
}
