//! End-to-end tests of the packet pipeline over in-memory pipes.
//!
//! A scripted fake worker sits on the far side of two duplex streams: it
//! reads what the channel writes and writes what the stdout reader decodes.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use archivist_core::api::*;
use pretty_assertions::assert_eq;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::task::JoinHandle;

struct FakeWorker {
    from_client: Lines<BufReader<DuplexStream>>,
    to_client: DuplexStream,
}

impl FakeWorker {
    async fn expect_packet(&mut self) -> ClientPacket {
        let line = tokio::time::timeout(Duration::from_secs(5), self.from_client.next_line())
            .await
            .expect("client wrote nothing")
            .unwrap()
            .expect("client stream closed");
        ClientPacket::decode(&line).unwrap()
    }

    async fn emit(&mut self, packet: ServerPacket) {
        self.emit_raw(&packet.encode().unwrap()).await;
    }

    async fn emit_raw(&mut self, line: &str) {
        self.to_client.write_all(line.as_bytes()).await.unwrap();
        self.to_client.write_all(b"\n").await.unwrap();
        self.to_client.flush().await.unwrap();
    }

    async fn grant(&mut self, uuid: &str) {
        self.emit(ServerPacket::new(
            None,
            ServerAction::UuidAvailable {
                uuid: uuid.to_string(),
            },
        ))
        .await;
    }
}

#[derive(Default)]
struct ErrorTap(Mutex<Vec<String>>);

impl ServerListener for ErrorTap {
    fn packet_received(&self, _packet: &ServerPacket) -> anyhow::Result<()> {
        Ok(())
    }

    fn error_reported(&self, error: &CoreError) {
        self.0.lock().unwrap().push(error.to_string());
    }
}

struct Pipeline {
    registry: Arc<ListenerRegistry>,
    hub: SessionHub,
    errors: Arc<ErrorTap>,
    worker: FakeWorker,
    _writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

fn pipeline() -> Pipeline {
    let registry = Arc::new(ListenerRegistry::new());
    let errors = Arc::new(ErrorTap::default());
    registry.subscribe(errors.clone());

    let (client_stdin, worker_stdin) = tokio::io::duplex(64 * 1024);
    let (worker_stdout, client_stdout) = tokio::io::duplex(64 * 1024);

    let (channel, writer) = PacketChannel::spawn(client_stdin, registry.clone(), 240);
    let reader = archivist_core::channel::pump_stdout(client_stdout, registry.clone(), 240);
    let hub = SessionHub::new(registry.clone(), Arc::new(channel));

    Pipeline {
        registry,
        hub,
        errors,
        worker: FakeWorker {
            from_client: BufReader::new(worker_stdin).lines(),
            to_client: worker_stdout,
        },
        _writer: writer,
        reader,
    }
}

fn target() -> Target {
    Target::new("https://community.example.com", 4)
}

async fn next_event(events: &mut SessionEvents) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no session event")
        .expect("session event queue closed")
}

#[tokio::test]
async fn dispatch_is_assigned_by_uuid_available() {
    let mut p = pipeline();
    let (session, mut events) = p.hub.dispatch(target(), WorkerType::MessengerWorker).unwrap();

    let dispatched = p.worker.expect_packet().await;
    assert_eq!(dispatched.worker_id, None);
    assert_eq!(
        dispatched.action,
        ClientAction::DispatchWorker {
            target: target(),
            worker_type: WorkerType::MessengerWorker,
        }
    );

    p.worker.grant("w-1").await;
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Assigned {
            worker_id: "w-1".into()
        }
    );
    assert_eq!(
        session.phase(),
        SessionPhase::Active {
            worker_id: "w-1".into()
        }
    );
}

#[tokio::test]
async fn state_changes_apply_in_wire_order() {
    let mut p = pipeline();
    let (session, mut events) = p.hub.dispatch(target(), WorkerType::TopicWorker).unwrap();
    p.worker.expect_packet().await;
    p.worker.grant("w-1").await;
    next_event(&mut events).await;

    for i in 0..50 {
        p.worker
            .emit(ServerPacket::new(
                Some("w-1".into()),
                ServerAction::StateChanged {
                    state: WorkerState::progressive(format!("step {i}")),
                },
            ))
            .await;
    }

    for i in 0..50 {
        match next_event(&mut events).await {
            SessionEvent::StateChanged(state) => assert_eq!(state.note, format!("step {i}")),
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(session.current_state().note, "step 49");
}

#[tokio::test]
async fn malformed_line_is_reported_once_and_skipped() {
    let mut p = pipeline();
    let (session, mut events) = p.hub.dispatch(target(), WorkerType::ForumWorker).unwrap();
    p.worker.expect_packet().await;
    p.worker.grant("w-1").await;
    next_event(&mut events).await;

    p.worker
        .emit(ServerPacket::new(
            Some("w-1".into()),
            ServerAction::ProgressUpdate { progress: 0.1 },
        ))
        .await;
    p.worker.emit_raw("{\"worker_id\": \"w-1\", \"action\": ").await;
    for progress in [0.2, 0.3] {
        p.worker
            .emit(ServerPacket::new(
                Some("w-1".into()),
                ServerAction::ProgressUpdate { progress },
            ))
            .await;
    }

    let mut seen = Vec::new();
    while seen.len() < 3 {
        match next_event(&mut events).await {
            SessionEvent::Progress(v) => seen.push(v),
            SessionEvent::Error(_) => {}
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(seen, vec![0.1, 0.2, 0.3]);
    assert_eq!(session.progress(), 0.3);

    let errors = p.errors.0.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("failed to decode worker packet"));
}

#[tokio::test]
async fn sessions_only_see_their_own_worker() {
    let mut p = pipeline();
    let (first, mut first_events) = p.hub.dispatch(target(), WorkerType::BlogWorker).unwrap();
    let (second, mut second_events) = p.hub.dispatch(target(), WorkerType::BlogWorker).unwrap();
    p.worker.expect_packet().await;
    p.worker.expect_packet().await;

    p.worker.grant("w-1").await;
    p.worker.grant("w-2").await;
    next_event(&mut first_events).await;
    next_event(&mut second_events).await;

    p.worker
        .emit(ServerPacket::new(
            Some("w-2".into()),
            ServerAction::StateChanged {
                state: WorkerState::progressive("second only"),
            },
        ))
        .await;
    p.worker
        .emit(ServerPacket::new(
            Some("w-2".into()),
            ServerAction::ResultAvailable {
                path: "/tmp/w-2.json".into(),
            },
        ))
        .await;

    assert!(matches!(
        next_event(&mut second_events).await,
        SessionEvent::StateChanged(_)
    ));
    assert!(matches!(
        next_event(&mut second_events).await,
        SessionEvent::ResultAvailable(_)
    ));

    assert_eq!(first.assigned_id().as_deref(), Some("w-1"));
    assert_eq!(first.current_state(), WorkerState::connecting());
    assert_eq!(first.result_path(), None);
    assert!(first_events.try_recv().is_err());
    assert_eq!(second.current_state().note, "second only");
}

#[tokio::test]
async fn selecting_terminate_button_sends_input_then_terminate_worker() {
    let mut p = pipeline();
    let (session, mut events) = p.hub.dispatch(target(), WorkerType::MessengerWorker).unwrap();
    p.worker.expect_packet().await;
    p.worker.grant("w-1").await;
    next_event(&mut events).await;

    p.worker
        .emit_raw(
            r#"{"worker_id":"w-1","action":"STATE_CHANGED","data":{"state":{"note":"Done","buttons":[{"label":"OK","action":"TERMINATE","client_object":true}]}}}"#,
        )
        .await;
    match next_event(&mut events).await {
        SessionEvent::StateChanged(state) => assert!(state.is_selective()),
        other => panic!("unexpected event {other:?}"),
    }

    p.worker
        .emit(ServerPacket::new(
            Some("w-1".into()),
            ServerAction::ProgressUpdate { progress: 0.42 },
        ))
        .await;
    next_event(&mut events).await;
    assert_eq!(session.progress(), 0.42);
    assert!(session.current_state().is_selective());

    assert_eq!(session.select_button(0).unwrap(), ButtonAction::Terminate);
    assert_eq!(
        p.worker.expect_packet().await,
        ClientPacket::state_input("w-1", ClientObject::Bool(true))
    );
    assert_eq!(
        p.worker.expect_packet().await,
        ClientPacket::terminate_worker("w-1")
    );
    assert_eq!(
        session.phase(),
        SessionPhase::Terminated(TerminationReason::ButtonAction)
    );

    // a second terminate sends nothing and does not fail
    assert!(!session.terminate().unwrap());
    drop(session);
    let (_next, _next_events) = p.hub.dispatch(target(), WorkerType::MessengerWorker).unwrap();
    assert!(matches!(
        p.worker.expect_packet().await.action,
        ClientAction::DispatchWorker { .. }
    ));
}

#[tokio::test]
async fn end_of_stream_terminates_live_sessions() {
    let mut p = pipeline();
    let (session, mut events) = p.hub.dispatch(target(), WorkerType::TopicWorker).unwrap();
    p.worker.expect_packet().await;
    p.worker.grant("w-1").await;
    next_event(&mut events).await;

    drop(p.worker.to_client);
    p.reader.await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Terminated(TerminationReason::ProcessExited)
    );
    assert!(session.is_terminated());
    assert_eq!(p.registry.len(), 3);
}
