pub mod install;

pub use install::{check_installation, executable_name, executable_path, InstallationStatus};

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::channel::{pump_stderr, pump_stdout, PacketChannel, PacketSink};
use crate::config::{AppConfig, ServerConfig, ShutdownConfig};
use crate::error::{ChannelError, SupervisorError};
use crate::proto::ClientPacket;
use crate::registry::ListenerRegistry;

/// How the worker process ended during [`ProcessSupervisor::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    NotRunning,
    /// Exited after the global `TERMINATE` packet.
    Graceful { exit_code: i32 },
    /// Exited after the polite terminate signal.
    Signalled { exit_code: i32 },
    /// Force-killed; `None` if it still had not been reaped.
    Killed { exit_code: Option<i32> },
}

struct RunningServer {
    child: Child,
    writer: JoinHandle<()>,
    stdout: JoinHandle<()>,
    stderr: JoinHandle<()>,
}

/// Owns the worker subprocess and the channel wired to its stdio.
///
/// Created by the orchestrator, started with [`initialize`] and torn down with
/// [`shutdown`]. Also the [`PacketSink`] sessions send through.
///
/// [`initialize`]: ProcessSupervisor::initialize
/// [`shutdown`]: ProcessSupervisor::shutdown
pub struct ProcessSupervisor {
    server: ServerConfig,
    shutdown: ShutdownConfig,
    preview_bytes: usize,
    registry: Arc<ListenerRegistry>,
    process: Mutex<Option<RunningServer>>,
    channel: RwLock<Option<Arc<PacketChannel>>>,
}

impl ProcessSupervisor {
    pub fn new(cfg: &AppConfig, registry: Arc<ListenerRegistry>) -> Self {
        Self {
            server: cfg.server.clone(),
            shutdown: cfg.shutdown.clone(),
            preview_bytes: cfg.channel.preview_bytes,
            registry,
            process: Mutex::new(None),
            channel: RwLock::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Start the worker. A no-op while it is already running.
    pub async fn initialize(&self) -> Result<(), SupervisorError> {
        let mut process = self.process.lock().await;
        if let Some(running) = process.as_mut() {
            match running.child.try_wait() {
                Ok(None) => {
                    tracing::debug!(target: "archivist.supervisor", "worker already running");
                    return Ok(());
                }
                Ok(Some(status)) => {
                    tracing::info!(
                        target: "archivist.supervisor",
                        exit_code = normalize_exit(status),
                        "previous worker exited, restarting"
                    );
                }
                Err(e) => return Err(SupervisorError::Wait(e)),
            }
            if let Some(stale) = process.take() {
                self.set_channel(None);
                stale.writer.abort();
            }
        }

        let status =
            check_installation(&self.server.dir, self.server.expected_version.as_deref());
        match &status {
            InstallationStatus::UpToDate { .. } => {
                tracing::info!(target: "archivist.supervisor", status = %status)
            }
            _ => tracing::warn!(target: "archivist.supervisor", status = %status),
        }

        let path = install::ensure_executable(&self.server)?;
        let mut child = Command::new(&path)
            .args(&self.server.args)
            .current_dir(&self.server.dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                program: path.display().to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(SupervisorError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(SupervisorError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(SupervisorError::MissingPipe("stderr"))?;

        let (channel, writer) =
            PacketChannel::spawn(stdin, self.registry.clone(), self.preview_bytes);
        let stdout = pump_stdout(stdout, self.registry.clone(), self.preview_bytes);
        let stderr = pump_stderr(stderr, self.registry.clone());

        tracing::info!(
            target: "archivist.supervisor",
            pid = child.id(),
            program = %path.display(),
            "worker process started"
        );
        self.set_channel(Some(Arc::new(channel)));
        *process = Some(RunningServer {
            child,
            writer,
            stdout,
            stderr,
        });
        Ok(())
    }

    /// Stop the worker: `TERMINATE` packet, then a terminate signal, then a
    /// kill. Each stage waits a bounded time for the process to exit.
    pub async fn shutdown(&self) -> Result<ShutdownOutcome, SupervisorError> {
        let mut process = self.process.lock().await;
        let Some(mut running) = process.take() else {
            return Ok(ShutdownOutcome::NotRunning);
        };

        let outcome = self.stop_child(&mut running.child).await;
        self.set_channel(None);
        self.join_tasks(running).await;

        match &outcome {
            Ok(o) => tracing::info!(target: "archivist.supervisor", outcome = ?o, "worker shut down"),
            Err(e) => tracing::error!(target: "archivist.supervisor", error = %e, "worker shutdown failed"),
        }
        outcome
    }

    async fn stop_child(&self, child: &mut Child) -> Result<ShutdownOutcome, SupervisorError> {
        if let Some(status) = child.try_wait().map_err(SupervisorError::Wait)? {
            return Ok(ShutdownOutcome::Graceful {
                exit_code: normalize_exit(status),
            });
        }

        match self.send(ClientPacket::terminate()) {
            Ok(()) => {
                if let Some(code) = wait_bounded(child, self.shutdown.terminate_grace()).await? {
                    return Ok(ShutdownOutcome::Graceful { exit_code: code });
                }
                tracing::warn!(
                    target: "archivist.supervisor",
                    grace_ms = self.shutdown.terminate_grace_ms,
                    "worker ignored TERMINATE, signalling"
                );
            }
            Err(e) => {
                tracing::warn!(target: "archivist.supervisor", error = %e, "could not send TERMINATE");
            }
        }

        if let Err(e) = signal_terminate(child) {
            tracing::warn!(target: "archivist.supervisor", error = %e, "terminate signal failed");
        }
        if let Some(code) = wait_bounded(child, self.shutdown.signal_grace()).await? {
            return Ok(ShutdownOutcome::Signalled { exit_code: code });
        }

        tracing::warn!(
            target: "archivist.supervisor",
            grace_ms = self.shutdown.signal_grace_ms,
            "worker ignored terminate signal, killing"
        );
        if let Err(e) = child.start_kill() {
            tracing::error!(target: "archivist.supervisor", error = %e, "kill failed");
        }
        let exit_code = wait_bounded(child, self.shutdown.kill_wait()).await?;
        Ok(ShutdownOutcome::Killed { exit_code })
    }

    async fn join_tasks(&self, running: RunningServer) {
        let RunningServer {
            writer,
            stdout,
            stderr,
            ..
        } = running;
        let abort = [writer.abort_handle(), stdout.abort_handle(), stderr.abort_handle()];
        let joined = tokio::time::timeout(self.shutdown.kill_wait(), async {
            let _ = writer.await;
            let _ = stdout.await;
            let _ = stderr.await;
        })
        .await;
        if joined.is_err() {
            tracing::warn!(target: "archivist.supervisor", "io tasks did not finish, aborting");
            for handle in abort {
                handle.abort();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.current_channel().is_some_and(|c| !c.is_closed())
    }

    pub async fn pid(&self) -> Option<u32> {
        self.process.lock().await.as_ref().and_then(|r| r.child.id())
    }

    /// Exit code if the worker has already exited on its own.
    pub async fn exit_code(&self) -> Option<i32> {
        let mut process = self.process.lock().await;
        let running = process.as_mut()?;
        match running.child.try_wait() {
            Ok(Some(status)) => {
                let code = normalize_exit(status);
                tracing::info!(target: "archivist.supervisor", exit_code = code, "worker exited");
                Some(code)
            }
            _ => None,
        }
    }

    fn current_channel(&self) -> Option<Arc<PacketChannel>> {
        self.channel
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_channel(&self, channel: Option<Arc<PacketChannel>>) {
        *self.channel.write().unwrap_or_else(|e| e.into_inner()) = channel;
    }
}

impl PacketSink for ProcessSupervisor {
    fn send(&self, packet: ClientPacket) -> Result<(), ChannelError> {
        match self.current_channel() {
            Some(channel) => channel.send(packet),
            None => {
                self.registry.report_error(ChannelError::NotRunning.into());
                Err(ChannelError::NotRunning)
            }
        }
    }
}

/// Exit code of a finished worker; death by signal `n` reads as `128 + n`.
pub fn normalize_exit(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// `Some(exit_code)` if the child exited within `limit`.
async fn wait_bounded(child: &mut Child, limit: Duration) -> Result<Option<i32>, SupervisorError> {
    match tokio::time::timeout(limit, child.wait()).await {
        Ok(Ok(status)) => Ok(Some(normalize_exit(status))),
        Ok(Err(e)) => Err(SupervisorError::Wait(e)),
        Err(_) => Ok(None),
    }
}

#[cfg(unix)]
fn signal_terminate(child: &mut Child) -> Result<(), SupervisorError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|errno| SupervisorError::Signal(std::io::Error::from(errno)))
}

#[cfg(not(unix))]
fn signal_terminate(child: &mut Child) -> Result<(), SupervisorError> {
    child.start_kill().map_err(SupervisorError::Signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServerListener;
    use crate::error::CoreError;
    use crate::proto::ServerPacket;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Errors(StdMutex<Vec<String>>);

    impl ServerListener for Errors {
        fn packet_received(&self, _packet: &ServerPacket) -> anyhow::Result<()> {
            Ok(())
        }

        fn error_reported(&self, error: &CoreError) {
            self.0.lock().unwrap().push(error.to_string());
        }
    }

    #[tokio::test]
    async fn send_before_initialize_is_not_running() {
        let registry = Arc::new(ListenerRegistry::new());
        let errors = Arc::new(Errors::default());
        registry.subscribe(errors.clone());
        let supervisor = ProcessSupervisor::new(&AppConfig::default(), registry);

        assert!(!supervisor.is_running());
        assert!(matches!(
            supervisor.send(ClientPacket::terminate()),
            Err(ChannelError::NotRunning)
        ));
        assert_eq!(errors.0.lock().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn exit_status_maps_signals_above_128() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(normalize_exit(ExitStatus::from_raw(3 << 8)), 3);
        // raw wait status of a process killed by SIGKILL
        assert_eq!(normalize_exit(ExitStatus::from_raw(9)), 137);
    }

    #[tokio::test]
    async fn shutdown_without_process_is_a_no_op() {
        let supervisor =
            ProcessSupervisor::new(&AppConfig::default(), Arc::new(ListenerRegistry::new()));
        assert_eq!(supervisor.shutdown().await.unwrap(), ShutdownOutcome::NotRunning);
        assert_eq!(supervisor.pid().await, None);
    }
}
