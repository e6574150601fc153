mod reader;
mod writer;

pub use reader::{on_line, pump_stderr, pump_stdout};
pub use writer::PacketChannel;

use crate::error::ChannelError;
use crate::proto::ClientPacket;

/// Anything outbound packets can be handed to.
///
/// Implemented by [`PacketChannel`] directly and by the supervisor, which
/// forwards to whichever channel belongs to the running process.
pub trait PacketSink: Send + Sync {
    fn send(&self, packet: ClientPacket) -> Result<(), ChannelError>;
}

/// Cut `s` to at most `max` bytes on a char boundary for log output.
pub(crate) fn preview(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let end = s
        .char_indices()
        .take_while(|(i, c)| i + c.len_utf8() <= max)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let mut out = s[..end].to_string();
    out.push('…');
    out
}
