// core/src/error/session_error.rs
use thiserror::Error;

use super::ChannelError;

/// Caller-side misuse of a worker session, or a failed send on its behalf.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is terminated")]
    Terminated,

    #[error("worker id not assigned yet")]
    NotAssigned,

    #[error("current state has no buttons")]
    NotSelective,

    #[error("no button at index {index} (state has {available})")]
    NoSuchButton { index: usize, available: usize },

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}
