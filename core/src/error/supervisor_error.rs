// core/src/error/supervisor_error.rs
use std::path::PathBuf;

use thiserror::Error;

use super::ChannelError;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("worker executable not found: {}", path.display())]
    ExecutableNotFound { path: PathBuf },

    #[error("failed to mark worker executable: {}", path.display())]
    Permissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn process: {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("spawned process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("failed to wait for worker process")]
    Wait(#[source] std::io::Error),

    #[error("failed to signal worker process")]
    Signal(#[source] std::io::Error),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}
