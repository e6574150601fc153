use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::channel::PacketSink;
use crate::error::ChannelError;
use crate::proto::{ClientPacket, ServerAction, ServerPacket};
use crate::registry::ServerListener;

/// Place of one dispatch in the worker's reply order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Ticket(u64);

#[derive(Debug)]
struct Outstanding {
    ticket: Ticket,
    abandoned: bool,
}

#[derive(Debug, Default)]
struct Ledger {
    next_ticket: u64,
    outstanding: VecDeque<Outstanding>,
    claims: HashMap<String, Ticket>,
}

/// Pairs each `UUID_AVAILABLE` with the dispatch it answers.
///
/// The worker replies to dispatches in the order it read them. Tickets are
/// queued and the dispatch is written under the same lock, so the n-th uuid
/// belongs to the n-th outstanding ticket. Must be subscribed before any
/// session so the claim exists when sessions see the packet.
pub(crate) struct DispatchCorrelator {
    ledger: Mutex<Ledger>,
    sink: Arc<dyn PacketSink>,
}

impl DispatchCorrelator {
    pub(crate) fn new(sink: Arc<dyn PacketSink>) -> Self {
        Self {
            ledger: Mutex::new(Ledger::default()),
            sink,
        }
    }

    /// Allocate a ticket, let the caller register for it, then send.
    ///
    /// Whatever `register` built is handed back even when the send fails, so
    /// the caller can undo its registration.
    pub(crate) fn dispatch<R>(
        &self,
        packet: ClientPacket,
        register: impl FnOnce(Ticket) -> R,
    ) -> (R, Result<(), ChannelError>) {
        let mut ledger = self.lock();
        let ticket = Ticket(ledger.next_ticket);
        ledger.next_ticket += 1;
        let registered = register(ticket);
        ledger.outstanding.push_back(Outstanding {
            ticket,
            abandoned: false,
        });
        let sent = self.sink.send(packet);
        if sent.is_err() {
            ledger.outstanding.pop_back();
        }
        (registered, sent)
    }

    /// True exactly once, for the ticket the uuid was bound to.
    pub(crate) fn take_claim(&self, uuid: &str, ticket: Ticket) -> bool {
        let mut ledger = self.lock();
        if ledger.claims.get(uuid) == Some(&ticket) {
            ledger.claims.remove(uuid);
            true
        } else {
            false
        }
    }

    /// Give up on a ticket whose session terminated before being assigned.
    ///
    /// A worker that was already granted, or is granted later, is told to
    /// terminate so it does not run unobserved.
    pub(crate) fn abandon(&self, ticket: Ticket) {
        let mut ledger = self.lock();
        if let Some(entry) = ledger.outstanding.iter_mut().find(|o| o.ticket == ticket) {
            entry.abandoned = true;
            return;
        }
        let claimed = ledger
            .claims
            .iter()
            .find(|(_, t)| **t == ticket)
            .map(|(uuid, _)| uuid.clone());
        if let Some(uuid) = claimed {
            ledger.claims.remove(&uuid);
            self.reap(uuid);
        }
    }

    #[cfg(test)]
    pub(crate) fn outstanding(&self) -> usize {
        self.lock().outstanding.len()
    }

    fn reap(&self, uuid: String) {
        tracing::info!(
            target: "archivist.session",
            worker_id = %uuid,
            "terminating worker of abandoned dispatch"
        );
        // a failed send is already reported through the registry
        let _ = self.sink.send(ClientPacket::terminate_worker(uuid));
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ServerListener for DispatchCorrelator {
    fn name(&self) -> &'static str {
        "dispatch_correlator"
    }

    fn packet_received(&self, packet: &ServerPacket) -> anyhow::Result<()> {
        let ServerAction::UuidAvailable { uuid } = &packet.action else {
            return Ok(());
        };
        let mut ledger = self.lock();
        match ledger.outstanding.pop_front() {
            Some(Outstanding {
                abandoned: true, ..
            }) => {
                drop(ledger);
                self.reap(uuid.clone());
            }
            Some(Outstanding { ticket, .. }) => {
                ledger.claims.insert(uuid.clone(), ticket);
            }
            None => {
                tracing::warn!(
                    target: "archivist.session",
                    uuid = %uuid,
                    "uuid granted with no dispatch outstanding"
                );
            }
        }
        Ok(())
    }

    fn process_exited(&self) {
        // the process that owed these uuids is gone; a restarted one starts
        // its reply order from scratch
        let mut ledger = self.lock();
        let dropped = ledger.outstanding.len() + ledger.claims.len();
        ledger.outstanding.clear();
        ledger.claims.clear();
        if dropped > 0 {
            tracing::info!(
                target: "archivist.session",
                dropped,
                "cleared dispatches of exited worker process"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{ClientAction, Target, WorkerType};

    #[derive(Default)]
    struct Outbox(Mutex<Vec<ClientPacket>>);

    impl PacketSink for Outbox {
        fn send(&self, packet: ClientPacket) -> Result<(), ChannelError> {
            self.0.lock().unwrap().push(packet);
            Ok(())
        }
    }

    fn dispatch() -> ClientPacket {
        ClientPacket::dispatch_worker(Target::new("https://f", 4), WorkerType::ForumWorker)
    }

    fn dispatched(correlator: &DispatchCorrelator) -> Ticket {
        let (ticket, sent) = correlator.dispatch(dispatch(), |t| t);
        sent.unwrap();
        ticket
    }

    fn granted(uuid: &str) -> ServerPacket {
        ServerPacket::new(
            None,
            ServerAction::UuidAvailable {
                uuid: uuid.to_string(),
            },
        )
    }

    #[test]
    fn uuids_bind_in_dispatch_order() {
        let outbox = Arc::new(Outbox::default());
        let correlator = DispatchCorrelator::new(outbox.clone());
        let first = dispatched(&correlator);
        let second = dispatched(&correlator);

        correlator.packet_received(&granted("w-1")).unwrap();
        correlator.packet_received(&granted("w-2")).unwrap();

        assert!(!correlator.take_claim("w-1", second));
        assert!(correlator.take_claim("w-1", first));
        assert!(!correlator.take_claim("w-1", first));
        assert!(correlator.take_claim("w-2", second));
        assert_eq!(correlator.outstanding(), 0);
    }

    #[test]
    fn abandoned_ticket_reaps_its_worker_on_arrival() {
        let outbox = Arc::new(Outbox::default());
        let correlator = DispatchCorrelator::new(outbox.clone());
        let ticket = dispatched(&correlator);
        correlator.abandon(ticket);

        correlator.packet_received(&granted("w-9")).unwrap();

        let sent = outbox.0.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].worker_id.as_deref(), Some("w-9"));
        assert_eq!(sent[1].action, ClientAction::TerminateWorker);
        assert!(!correlator.take_claim("w-9", ticket));
    }

    #[test]
    fn abandoning_an_unclaimed_grant_reaps_immediately() {
        let outbox = Arc::new(Outbox::default());
        let correlator = DispatchCorrelator::new(outbox.clone());
        let ticket = dispatched(&correlator);
        correlator.packet_received(&granted("w-3")).unwrap();

        correlator.abandon(ticket);

        let sent = outbox.0.lock().unwrap();
        assert_eq!(sent.last(), Some(&ClientPacket::terminate_worker("w-3")));
    }

    #[test]
    fn process_exit_forgets_tickets_of_the_old_process() {
        let outbox = Arc::new(Outbox::default());
        let correlator = DispatchCorrelator::new(outbox.clone());
        let stale = dispatched(&correlator);
        let abandoned = dispatched(&correlator);
        correlator.abandon(abandoned);

        correlator.process_exited();
        assert_eq!(correlator.outstanding(), 0);

        let fresh = dispatched(&correlator);
        correlator.packet_received(&granted("w-new")).unwrap();

        assert!(!correlator.take_claim("w-new", stale));
        assert!(correlator.take_claim("w-new", fresh));
        // nothing but the three dispatches went out
        assert_eq!(outbox.0.lock().unwrap().len(), 3);
    }
}
