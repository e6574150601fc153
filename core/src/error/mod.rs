mod channel_error;
mod config_error;
mod packet_error;
mod session_error;
mod supervisor_error;

pub use channel_error::ChannelError;
pub use config_error::ConfigError;
pub use packet_error::PacketError;
pub use session_error::SessionError;
pub use supervisor_error::SupervisorError;

use thiserror::Error;

/// Everything delivered to listeners' error sinks.
///
/// Each value is reported exactly once to every listener subscribed at the
/// time it occurs; none of these ever escape a read loop.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to decode worker packet: {source}")]
    Decode {
        line: String,
        #[source]
        source: PacketError,
    },

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("listener {listener} failed: {source}")]
    Listener {
        listener: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("listener {listener} panicked: {message}")]
    ListenerPanic {
        listener: &'static str,
        message: String,
    },
}
