use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{preview, PacketSink};
use crate::error::{ChannelError, CoreError};
use crate::proto::ClientPacket;
use crate::registry::ListenerRegistry;

/// Outbound half of the packet protocol.
///
/// Every `send` encodes on the caller's task and queues one complete line;
/// a single writer task owns the stream and writes line, newline and flush
/// before taking the next one, so lines never interleave.
pub struct PacketChannel {
    tx: mpsc::UnboundedSender<String>,
    registry: Arc<ListenerRegistry>,
}

impl PacketChannel {
    pub fn spawn<W>(
        writer: W,
        registry: Arc<ListenerRegistry>,
        preview_bytes: usize,
    ) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let task = tokio::spawn(write_loop(writer, rx, registry.clone(), preview_bytes));
        (Self { tx, registry }, task)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl PacketSink for PacketChannel {
    fn send(&self, packet: ClientPacket) -> Result<(), ChannelError> {
        let line = packet.encode()?;
        if self.tx.send(line).is_err() {
            self.registry.report_error(ChannelError::Closed.into());
            return Err(ChannelError::Closed);
        }
        Ok(())
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<String>,
    registry: Arc<ListenerRegistry>,
    preview_bytes: usize,
) where
    W: AsyncWrite + Unpin + Send,
{
    while let Some(line) = rx.recv().await {
        tracing::debug!(
            target: "archivist.channel",
            bytes = line.len(),
            preview = %preview(&line, preview_bytes),
            "stdin >>"
        );
        if let Err(e) = write_line(&mut writer, &line).await {
            tracing::error!(
                target: "archivist.channel",
                error = %e,
                "stdin write failed, writer task exiting"
            );
            registry.report_error(CoreError::Channel(ChannelError::Write(e)));
            return;
        }
    }
    let _ = writer.shutdown().await;
    tracing::debug!(target: "archivist.channel", "stdin writer closed");
}

async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
