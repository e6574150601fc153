// core/src/error/channel_error.rs
use thiserror::Error;

use super::PacketError;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to encode outbound packet")]
    Encode(#[from] PacketError),

    #[error("worker process is not running")]
    NotRunning,

    #[error("channel closed: worker stdin is no longer writable")]
    Closed,

    #[error("io error while writing worker stdin")]
    Write(#[source] std::io::Error),

    #[error("io error while reading worker {stream}")]
    Read {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },
}
