//! Top-level agent errors.
//!
//! Everything here is fatal at startup: the supervisor surfaces it and the
//! process exits with code 1. Per-connection and per-batch failures are
//! handled locally and never reach this type.

use std::path::PathBuf;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] crate::upstream::UpstreamError),

    #[error("AF_UNIX listener error at {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "AF_UNIX sockets are not supported on this Windows version; \
         upgrade to Windows 10 version 1803 or later"
    )]
    AfUnixUnsupported,
}
