// core/src/error/packet_error.rs
use thiserror::Error;

/// A line that could not be turned into a packet, or a packet that could not
/// be turned into a line.
#[derive(Debug, Error)]
pub enum PacketError {
    #[error("invalid json line")]
    InvalidJson(#[source] serde_json::Error),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("missing required field: {action}.{field}")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },

    #[error("schema mismatch: {action}.{field}")]
    SchemaMismatch {
        action: &'static str,
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid worker state: {0}")]
    InvalidState(&'static str),

    #[error("failed to encode packet")]
    Encode(#[source] serde_json::Error),
}
