use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::CoreError;
use crate::proto::ServerPacket;

/// Receiver of everything the worker process produces.
///
/// Handlers run synchronously on the stdout reader task, so they must not
/// block. A handler that returns an error or panics is reported through
/// [`ServerListener::error_reported`] and delivery continues with the next
/// listener.
pub trait ServerListener: Send + Sync {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn packet_received(&self, packet: &ServerPacket) -> anyhow::Result<()>;

    fn error_reported(&self, _error: &CoreError) {}

    /// One line of free text from the worker's stderr.
    fn diagnostic(&self, _line: &str) {}

    /// The worker's stdout reached end-of-stream.
    fn process_exited(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Slots in subscription order plus an index from id to slot.
///
/// Unsubscribing leaves a hole; holes are squeezed out once they outnumber
/// live listeners, so both subscribe and unsubscribe are amortized O(1).
#[derive(Default)]
struct Slots {
    slots: Vec<Option<(ListenerId, Arc<dyn ServerListener>)>>,
    index: HashMap<ListenerId, usize>,
}

impl Slots {
    fn insert(&mut self, id: ListenerId, listener: Arc<dyn ServerListener>) {
        self.index.insert(id, self.slots.len());
        self.slots.push(Some((id, listener)));
    }

    fn remove(&mut self, id: ListenerId) -> bool {
        let Some(at) = self.index.remove(&id) else {
            return false;
        };
        self.slots[at] = None;
        if self.slots.len() > 2 * self.index.len() + 8 {
            self.compact();
        }
        true
    }

    fn compact(&mut self) {
        self.slots.retain(Option::is_some);
        for (at, slot) in self.slots.iter().enumerate() {
            if let Some((id, _)) = slot {
                self.index.insert(*id, at);
            }
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn listeners(&self) -> Vec<Arc<dyn ServerListener>> {
        self.slots
            .iter()
            .flatten()
            .map(|(_, listener)| listener.clone())
            .collect()
    }
}

/// Ordered, thread-safe set of listeners; iteration order is subscription
/// order.
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<Slots>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Slots::default()),
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn ServerListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(
            target: "archivist.registry",
            listener = listener.name(),
            id = id.0,
            "listener subscribed"
        );
        self.write().insert(id, listener);
        id
    }

    /// Returns false when the id was not (or no longer) subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let removed = self.write().remove(id);
        if removed {
            tracing::debug!(target: "archivist.registry", id = id.0, "listener unsubscribed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver one decoded packet to every listener in subscription order.
    pub fn dispatch(&self, packet: &ServerPacket) {
        for listener in self.snapshot() {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.packet_received(packet)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(source)) => self.report_error(CoreError::Listener {
                    listener: listener.name(),
                    source,
                }),
                Err(payload) => self.report_error(CoreError::ListenerPanic {
                    listener: listener.name(),
                    message: panic_message(payload.as_ref()),
                }),
            }
        }
    }

    /// Log `error` once and hand it to every current listener's error sink.
    pub fn report_error(&self, error: CoreError) {
        tracing::warn!(target: "archivist.registry", error = %error, "core error reported");
        self.fan_out("error_reported", |l| l.error_reported(&error));
    }

    pub fn diagnostic(&self, line: &str) {
        self.fan_out("diagnostic", |l| l.diagnostic(line));
    }

    pub fn process_exited(&self) {
        tracing::info!(target: "archivist.registry", "worker process output closed");
        self.fan_out("process_exited", |l| l.process_exited());
    }

    fn fan_out(&self, hook: &'static str, f: impl Fn(&dyn ServerListener)) {
        for listener in self.snapshot() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))) {
                tracing::error!(
                    target: "archivist.registry",
                    listener = listener.name(),
                    hook,
                    panic = %panic_message(payload.as_ref()),
                    "listener panicked"
                );
            }
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn ServerListener>> {
        self.read().listeners()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Slots> {
        self.listeners.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Slots> {
        self.listeners.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
