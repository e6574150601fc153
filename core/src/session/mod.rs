mod correlate;
mod driver;

pub use driver::DriverFailure;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::channel::PacketSink;
use crate::error::{CoreError, SessionError};
use crate::proto::{
    ButtonAction, ClientPacket, ServerAction, ServerPacket, Target, WorkerState, WorkerType,
};
use crate::registry::{ListenerId, ListenerRegistry, ServerListener};

use correlate::{DispatchCorrelator, Ticket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The owner called [`WorkerSession::terminate`] or dropped the session.
    Requested,
    /// A selected button carried the `TERMINATE` action.
    ButtonAction,
    /// The worker process stopped producing output.
    ProcessExited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Pending,
    Active { worker_id: String },
    Terminated(TerminationReason),
}

/// Everything a session consumer needs to render, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Assigned { worker_id: String },
    StateChanged(WorkerState),
    Progress(f64),
    ResultAvailable(PathBuf),
    DriverStarted,
    DriverFailed(DriverFailure),
    Error(String),
    Terminated(TerminationReason),
}

/// Single FIFO queue of a session's events.
pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

#[derive(Debug)]
enum Phase {
    Pending { ticket: Ticket },
    Active { worker_id: String },
    Terminated { reason: TerminationReason },
}

#[derive(Debug)]
struct SessionInner {
    phase: Phase,
    current_state: WorkerState,
    progress: f64,
    result: Option<PathBuf>,
}

/// The listener half of a session; lives in the registry while subscribed.
struct SessionCore {
    inner: Mutex<SessionInner>,
    events: mpsc::UnboundedSender<SessionEvent>,
    correlator: Arc<DispatchCorrelator>,
}

impl SessionCore {
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // the consumer may have stopped listening; state is still tracked
        let _ = self.events.send(event);
    }

    fn apply(&self, inner: &mut SessionInner, action: &ServerAction) {
        match action {
            ServerAction::UuidAvailable { uuid } => {
                tracing::debug!(
                    target: "archivist.session",
                    uuid = %uuid,
                    "ignoring second uuid for assigned worker"
                );
            }
            ServerAction::ChromedriverStarted => self.emit(SessionEvent::DriverStarted),
            ServerAction::ChromedriverError { stacktrace } => {
                let failure = DriverFailure::classify(stacktrace);
                tracing::warn!(target: "archivist.session", failure = %failure, "chromedriver failed");
                self.emit(SessionEvent::DriverFailed(failure));
            }
            ServerAction::StateChanged { state } => {
                inner.current_state = state.clone();
                self.emit(SessionEvent::StateChanged(state.clone()));
            }
            ServerAction::ProgressUpdate { progress } => {
                inner.progress = *progress;
                self.emit(SessionEvent::Progress(*progress));
            }
            ServerAction::ResultAvailable { path } => {
                inner.result = Some(path.clone());
                self.emit(SessionEvent::ResultAvailable(path.clone()));
            }
        }
    }
}

impl ServerListener for SessionCore {
    fn name(&self) -> &'static str {
        "worker_session"
    }

    fn packet_received(&self, packet: &ServerPacket) -> anyhow::Result<()> {
        let mut inner = self.lock();
        match &inner.phase {
            Phase::Terminated { .. } => {}
            Phase::Pending { ticket } => {
                if let ServerAction::UuidAvailable { uuid } = &packet.action {
                    if self.correlator.take_claim(uuid, *ticket) {
                        tracing::info!(target: "archivist.session", worker_id = %uuid, "worker assigned");
                        inner.phase = Phase::Active {
                            worker_id: uuid.clone(),
                        };
                        self.emit(SessionEvent::Assigned {
                            worker_id: uuid.clone(),
                        });
                    }
                }
            }
            Phase::Active { worker_id } => {
                if packet.worker_id.as_deref() == Some(worker_id.as_str()) {
                    self.apply(&mut inner, &packet.action);
                }
            }
        }
        Ok(())
    }

    fn error_reported(&self, error: &CoreError) {
        // may run while the correlator is locked, so the session lock is not taken
        self.emit(SessionEvent::Error(error.to_string()));
    }

    fn process_exited(&self) {
        let mut inner = self.lock();
        if matches!(inner.phase, Phase::Terminated { .. }) {
            return;
        }
        inner.phase = Phase::Terminated {
            reason: TerminationReason::ProcessExited,
        };
        self.emit(SessionEvent::Terminated(TerminationReason::ProcessExited));
    }
}

/// Caller handle of one dispatched worker.
///
/// Dropping the handle terminates the session.
pub struct WorkerSession {
    core: Arc<SessionCore>,
    sink: Arc<dyn PacketSink>,
    registry: Arc<ListenerRegistry>,
    listener: ListenerId,
}

impl WorkerSession {
    pub fn phase(&self) -> SessionPhase {
        match &self.core.lock().phase {
            Phase::Pending { .. } => SessionPhase::Pending,
            Phase::Active { worker_id } => SessionPhase::Active {
                worker_id: worker_id.clone(),
            },
            Phase::Terminated { reason } => SessionPhase::Terminated(*reason),
        }
    }

    pub fn assigned_id(&self) -> Option<String> {
        match &self.core.lock().phase {
            Phase::Active { worker_id } => Some(worker_id.clone()),
            _ => None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.core.lock().phase, Phase::Terminated { .. })
    }

    pub fn current_state(&self) -> WorkerState {
        self.core.lock().current_state.clone()
    }

    pub fn progress(&self) -> f64 {
        self.core.lock().progress
    }

    pub fn result_path(&self) -> Option<PathBuf> {
        self.core.lock().result.clone()
    }

    /// Select a button of the current selective state.
    ///
    /// Sends `STATE_INPUT` with the button's client object, then terminates
    /// the session when the button's action is `TERMINATE`. The action is
    /// returned so the caller can act on `OPEN_LOG` and `EXPORT_ARCHIVE`.
    pub fn select_button(&self, index: usize) -> Result<ButtonAction, SessionError> {
        let (worker_id, button) = {
            let inner = self.core.lock();
            let worker_id = match &inner.phase {
                Phase::Terminated { .. } => return Err(SessionError::Terminated),
                Phase::Pending { .. } => return Err(SessionError::NotAssigned),
                Phase::Active { worker_id } => worker_id.clone(),
            };
            let buttons = match inner.current_state.buttons.as_deref() {
                Some(buttons) if !buttons.is_empty() => buttons,
                _ => return Err(SessionError::NotSelective),
            };
            let button = buttons
                .get(index)
                .cloned()
                .ok_or(SessionError::NoSuchButton {
                    index,
                    available: buttons.len(),
                })?;
            (worker_id, button)
        };

        tracing::debug!(
            target: "archivist.session",
            worker_id = %worker_id,
            label = %button.label,
            action = ?button.action,
            "button selected"
        );
        self.sink
            .send(ClientPacket::state_input(worker_id, button.client_object))?;

        if button.action == ButtonAction::Terminate {
            self.terminate_with(TerminationReason::ButtonAction)?;
        }
        Ok(button.action)
    }

    /// Stop the session. Returns false when it was already terminated.
    pub fn terminate(&self) -> Result<bool, SessionError> {
        self.terminate_with(TerminationReason::Requested)
    }

    fn terminate_with(&self, reason: TerminationReason) -> Result<bool, SessionError> {
        let previous = {
            let mut inner = self.core.lock();
            if matches!(inner.phase, Phase::Terminated { .. }) {
                None
            } else {
                self.core.emit(SessionEvent::Terminated(reason));
                Some(std::mem::replace(
                    &mut inner.phase,
                    Phase::Terminated { reason },
                ))
            }
        };
        self.registry.unsubscribe(self.listener);

        match previous {
            None => Ok(false),
            Some(Phase::Active { worker_id }) => {
                tracing::info!(target: "archivist.session", worker_id = %worker_id, ?reason, "terminating worker");
                self.sink.send(ClientPacket::terminate_worker(worker_id))?;
                Ok(true)
            }
            Some(Phase::Pending { ticket }) => {
                tracing::info!(target: "archivist.session", ?reason, "terminating unassigned session");
                self.core.correlator.abandon(ticket);
                Ok(true)
            }
            Some(Phase::Terminated { .. }) => Ok(false),
        }
    }
}

impl Drop for WorkerSession {
    fn drop(&mut self) {
        if let Err(e) = self.terminate_with(TerminationReason::Requested) {
            tracing::debug!(target: "archivist.session", error = %e, "terminate on drop failed");
        }
    }
}

/// Creates sessions and owns the dispatch correlation they share.
pub struct SessionHub {
    registry: Arc<ListenerRegistry>,
    sink: Arc<dyn PacketSink>,
    correlator: Arc<DispatchCorrelator>,
    correlator_id: ListenerId,
}

impl SessionHub {
    pub fn new(registry: Arc<ListenerRegistry>, sink: Arc<dyn PacketSink>) -> Self {
        let correlator = Arc::new(DispatchCorrelator::new(sink.clone()));
        let correlator_id = registry.subscribe(correlator.clone());
        Self {
            registry,
            sink,
            correlator,
            correlator_id,
        }
    }

    /// Send `DISPATCH_WORKER` and return a pending session for it.
    pub fn dispatch(
        &self,
        target: Target,
        worker_type: WorkerType,
    ) -> Result<(WorkerSession, SessionEvents), SessionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let ((core, listener), sent) = self.correlator.dispatch(
            ClientPacket::dispatch_worker(target.clone(), worker_type),
            |ticket| {
                let core = Arc::new(SessionCore {
                    inner: Mutex::new(SessionInner {
                        phase: Phase::Pending { ticket },
                        current_state: WorkerState::connecting(),
                        progress: 0.0,
                        result: None,
                    }),
                    events: tx,
                    correlator: self.correlator.clone(),
                });
                let id = self.registry.subscribe(core.clone());
                (core, id)
            },
        );
        if let Err(e) = sent {
            self.registry.unsubscribe(listener);
            return Err(e.into());
        }

        tracing::info!(
            target: "archivist.session",
            root_url = %target.root_url,
            version = target.version,
            worker_type = %worker_type,
            "worker dispatched"
        );
        Ok((
            WorkerSession {
                core,
                sink: self.sink.clone(),
                registry: self.registry.clone(),
                listener,
            },
            rx,
        ))
    }
}

impl Drop for SessionHub {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.correlator_id);
    }
}
