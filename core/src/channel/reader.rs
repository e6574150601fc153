use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

use super::preview;
use crate::error::{ChannelError, CoreError};
use crate::proto::ServerPacket;
use crate::registry::ListenerRegistry;

/// Decode one stdout line and deliver it, or report why it could not be.
pub fn on_line(registry: &ListenerRegistry, line: &str) {
    match ServerPacket::decode(line) {
        Ok(packet) => registry.dispatch(&packet),
        Err(source) => registry.report_error(CoreError::Decode {
            line: line.to_string(),
            source,
        }),
    }
}

/// Protocol reader: one packet per line until end-of-stream, then a single
/// `process_exited` broadcast.
pub fn pump_stdout<R>(
    reader: R,
    registry: Arc<ListenerRegistry>,
    preview_bytes: usize,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    tracing::debug!(
                        target: "archivist.channel",
                        bytes = line.len(),
                        preview = %preview(line, preview_bytes),
                        "stdout <<"
                    );
                    on_line(&registry, line);
                }
                Err(source) => {
                    registry.report_error(CoreError::Channel(ChannelError::Read {
                        stream: "stdout",
                        source,
                    }));
                    break;
                }
            }
        }
        tracing::debug!(target: "archivist.channel", "stdout reader finished");
        registry.process_exited();
    })
}

/// Diagnostic reader: stderr is free text, logged and forwarded, never parsed.
pub fn pump_stderr<R>(reader: R, registry: Arc<ListenerRegistry>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end();
                    if line.is_empty() {
                        continue;
                    }
                    tracing::warn!(target: "archivist.server", "{line}");
                    registry.diagnostic(line);
                }
                Err(source) => {
                    registry.report_error(CoreError::Channel(ChannelError::Read {
                        stream: "stderr",
                        source,
                    }));
                    break;
                }
            }
        }
        tracing::debug!(target: "archivist.channel", "stderr reader finished");
    })
}
