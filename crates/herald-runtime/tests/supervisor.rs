//! End-to-end supervisor scenarios driven through scripted transports.

use herald_core::config::SupervisorConfig;
use herald_core::handlers::{
    AnticallPolicy, BotTransport, GroupUpdateHandler, MessageHandler, StatusHandler,
};
use herald_core::transport::{
    CallOffer, DisconnectCause, GroupUpdate, InboundMessage, TransportEvent,
};
use herald_core::types::{
    BoundUser, ConnectionState, InstanceId, InstanceIdentity, Jid, MessageId, SessionCredentials,
    StatusSnapshot,
};
use herald_runtime::stub::{ScriptedConnector, ScriptedSession, StubTransport};
use herald_runtime::{Collaborators, EventCache, SessionStore, Supervisor};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

// ----------------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------------

/// Event that keeps a scripted session open until the test shuts down.
fn hold_open() -> (Duration, TransportEvent) {
    (
        Duration::from_secs(3600),
        TransportEvent::Close {
            cause: DisconnectCause::ConnectionLost {
                reason: "test timeout".into(),
            },
        },
    )
}

fn open_event(jid: &str) -> TransportEvent {
    TransportEvent::Open {
        user: BoundUser {
            jid: Jid::normalize(jid),
            name: None,
        },
    }
}

fn close_event(code: Option<u16>) -> TransportEvent {
    TransportEvent::Close {
        cause: DisconnectCause::from_status(code, "scripted close"),
    }
}

fn message_event(conversation: &str, id: &str, sender: &str) -> TransportEvent {
    TransportEvent::MessagesUpsert {
        messages: vec![InboundMessage {
            conversation: Jid::normalize(conversation),
            id: MessageId::new(id),
            sender: Jid::normalize(sender),
            from_me: false,
            payload: json!({ "text": "hi" }),
        }],
    }
}

#[derive(Default)]
struct CountingHandlers {
    messages: AtomicUsize,
    statuses: AtomicUsize,
    groups: AtomicUsize,
    fail_messages: bool,
    anticall: bool,
}

#[async_trait::async_trait]
impl MessageHandler for CountingHandlers {
    async fn handle(&self, _: &BotTransport, _: &InboundMessage) -> anyhow::Result<()> {
        self.messages.fetch_add(1, Ordering::SeqCst);
        if self.fail_messages {
            anyhow::bail!("handler exploded");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StatusHandler for CountingHandlers {
    async fn handle_status(&self, _: &BotTransport, _: &InboundMessage) -> anyhow::Result<()> {
        self.statuses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait::async_trait]
impl GroupUpdateHandler for CountingHandlers {
    async fn handle_update(&self, _: &BotTransport, _: &GroupUpdate) -> anyhow::Result<()> {
        self.groups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl AnticallPolicy for CountingHandlers {
    fn anticall_enabled(&self) -> bool {
        self.anticall
    }
}

struct Harness {
    connector: Arc<ScriptedConnector>,
    store: Arc<SessionStore>,
    handlers: Arc<CountingHandlers>,
    shutdown: CancellationToken,
    status: watch::Receiver<StatusSnapshot>,
    run: tokio::task::JoinHandle<ConnectionState>,
    _dir: tempfile::TempDir,
}

fn start(
    phone: Option<&str>,
    handlers: CountingHandlers,
    sessions: Vec<ScriptedSession>,
) -> Harness {
    start_with_config(phone, handlers, sessions, SupervisorConfig::testing())
}

fn start_with_config(
    phone: Option<&str>,
    handlers: CountingHandlers,
    sessions: Vec<ScriptedSession>,
    config: SupervisorConfig,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let identity = InstanceIdentity {
        instance_id: InstanceId::new("itest"),
        phone_number: phone.map(str::to_string),
        control_port: 3001,
    };
    let connector = ScriptedConnector::new(sessions);
    let store = Arc::new(SessionStore::new(dir.path().join("session")));
    let cache = Arc::new(EventCache::new(
        dir.path().join("events.json"),
        &herald_core::config::CacheConfig::default(),
    ));
    let handlers = Arc::new(handlers);
    let collaborators = Collaborators {
        message_handler: handlers.clone(),
        status_handler: handlers.clone(),
        group_handler: handlers.clone(),
        anticall: handlers.clone(),
    };
    let shutdown = CancellationToken::new();
    let (supervisor, status) = Supervisor::new(
        identity,
        connector.clone(),
        store.clone(),
        cache,
        collaborators,
        config,
        shutdown.clone(),
    );
    let run = tokio::spawn(supervisor.run());
    Harness {
        connector,
        store,
        handlers,
        shutdown,
        status,
        run,
        _dir: dir,
    }
}

async fn wait_for_state(harness: &mut Harness, state: ConnectionState) -> StatusSnapshot {
    harness
        .status
        .wait_for(|s| s.state == state)
        .await
        .expect("status channel closed")
        .clone()
}

// ----------------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------------

#[tokio::test]
async fn transient_close_triggers_a_reconnect() {
    let first = StubTransport::new();
    let second = StubTransport::new();
    let mut harness = start(
        None,
        CountingHandlers::default(),
        vec![
            ScriptedSession::immediate(first, vec![close_event(Some(515))]),
            ScriptedSession::new(second, vec![(Duration::ZERO, open_event("1555")), hold_open()]),
        ],
    );

    wait_for_state(&mut harness, ConnectionState::Connected).await;
    assert_eq!(harness.connector.connect_count(), 2);

    harness.shutdown.cancel();
    harness.run.await.unwrap();
}

#[tokio::test]
async fn unauthorized_close_purges_and_never_reconnects() {
    let transport = StubTransport::new();
    let mut harness = start(
        None,
        CountingHandlers::default(),
        vec![ScriptedSession::immediate(
            transport,
            vec![open_event("1555"), close_event(Some(401))],
        )],
    );

    wait_for_state(&mut harness, ConnectionState::LoggedOut).await;
    let final_state = harness.run.await.unwrap();
    assert_eq!(final_state, ConnectionState::LoggedOut);
    assert_eq!(harness.connector.connect_count(), 1);

    // Credentials directory exists but holds nothing.
    let entries: Vec<_> = std::fs::read_dir(harness.store.dir()).unwrap().collect();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn explicit_logout_close_is_terminal() {
    let transport = StubTransport::new();
    let mut harness = start(
        None,
        CountingHandlers::default(),
        vec![ScriptedSession::immediate(
            transport,
            vec![close_event(Some(440))],
        )],
    );

    wait_for_state(&mut harness, ConnectionState::LoggedOut).await;
    assert_eq!(harness.run.await.unwrap(), ConnectionState::LoggedOut);
}

#[tokio::test]
async fn unregistered_phone_runs_the_pairing_flow() {
    let transport = StubTransport::with_pairing_code("ABCD1234EFGH");
    let mut harness = start(
        Some("15551234567"),
        CountingHandlers::default(),
        vec![ScriptedSession::new(
            transport.clone(),
            vec![
                (Duration::from_millis(500), open_event("15551234567")),
                hold_open(),
            ],
        )],
    );

    let snapshot = wait_for_state(&mut harness, ConnectionState::Pairing).await;
    assert_eq!(snapshot.pairing_code.as_deref(), Some("ABCD-1234-EFGH"));
    assert_eq!(transport.pairing_requests(), vec!["15551234567"]);

    // The code disappears the moment the connection opens.
    let snapshot = wait_for_state(&mut harness, ConnectionState::Connected).await;
    assert!(snapshot.pairing_code.is_none());

    harness.shutdown.cancel();
    harness.run.await.unwrap();
}

#[tokio::test]
async fn failed_pairing_request_enters_error_and_restarts() {
    // No canned code, so the pairing request fails.
    let transport = StubTransport::new();
    let mut harness = start(
        Some("15551234567"),
        CountingHandlers::default(),
        vec![ScriptedSession::new(transport.clone(), vec![hold_open()])],
    );

    let snapshot = wait_for_state(&mut harness, ConnectionState::Error).await;
    assert!(snapshot.pairing_code.is_none());
    assert_eq!(transport.pairing_requests(), vec!["15551234567"]);

    // The session ended; the reconnect loop retries the whole connection.
    while harness.connector.connect_count() < 2 {
        tokio::task::yield_now().await;
    }

    harness.shutdown.cancel();
    harness.run.await.unwrap();
}

#[tokio::test]
async fn opening_inside_the_pairing_window_disarms_the_request() {
    let transport = StubTransport::with_pairing_code("ABCD1234EFGH");
    let config = SupervisorConfig {
        pairing_delay_secs: 1,
        ..SupervisorConfig::testing()
    };
    let mut harness = start_with_config(
        Some("15551234567"),
        CountingHandlers::default(),
        vec![ScriptedSession::new(
            transport.clone(),
            vec![(Duration::ZERO, open_event("15551234567")), hold_open()],
        )],
        config,
    );

    wait_for_state(&mut harness, ConnectionState::Connected).await;
    // Outlive the pairing window; the code request must never fire.
    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert!(transport.pairing_requests().is_empty());
    assert_eq!(harness.status.borrow().state, ConnectionState::Connected);

    harness.shutdown.cancel();
    harness.run.await.unwrap();
}

#[tokio::test]
async fn credential_rotations_feed_the_next_attempt() {
    let first = StubTransport::new();
    let second = StubTransport::new();
    let rotated = SessionCredentials {
        registered: true,
        material: json!({ "rotation": 1 }),
    };
    let mut harness = start(
        None,
        CountingHandlers::default(),
        vec![
            ScriptedSession::immediate(
                first,
                vec![
                    TransportEvent::CredentialsUpdate {
                        credentials: rotated,
                    },
                    close_event(Some(515)),
                ],
            ),
            ScriptedSession::new(second, vec![(Duration::ZERO, open_event("1555")), hold_open()]),
        ],
    );

    wait_for_state(&mut harness, ConnectionState::Connected).await;
    let seen = harness.connector.credentials_seen();
    assert_eq!(seen.len(), 2);
    assert!(!seen[0].registered);
    assert!(seen[1].registered);
    assert_eq!(seen[1].material["rotation"], 1);

    harness.shutdown.cancel();
    harness.run.await.unwrap();
}

#[tokio::test]
async fn a_failing_handler_does_not_stop_dispatch() {
    let transport = StubTransport::new();
    let handlers = CountingHandlers {
        fail_messages: true,
        ..Default::default()
    };
    let mut harness = start(
        None,
        handlers,
        vec![ScriptedSession::new(
            transport,
            vec![
                (Duration::ZERO, open_event("1555")),
                (Duration::ZERO, message_event("15559990001", "M1", "15559990001")),
                (Duration::ZERO, message_event("15559990002", "M2", "15559990002")),
                hold_open(),
            ],
        )],
    );

    wait_for_state(&mut harness, ConnectionState::Connected).await;
    while harness.handlers.messages.load(Ordering::SeqCst) < 2 {
        tokio::task::yield_now().await;
    }
    assert_eq!(harness.handlers.messages.load(Ordering::SeqCst), 2);

    harness.shutdown.cancel();
    harness.run.await.unwrap();
}

#[tokio::test]
async fn broadcast_posts_route_to_the_status_handler() {
    let transport = StubTransport::new();
    let mut harness = start(
        None,
        CountingHandlers::default(),
        vec![ScriptedSession::new(
            transport,
            vec![
                (Duration::ZERO, open_event("1555")),
                (Duration::ZERO, message_event("status@broadcast", "M1", "1555999")),
                hold_open(),
            ],
        )],
    );

    wait_for_state(&mut harness, ConnectionState::Connected).await;
    while harness.handlers.statuses.load(Ordering::SeqCst) < 1 {
        tokio::task::yield_now().await;
    }
    assert_eq!(harness.handlers.messages.load(Ordering::SeqCst), 0);

    harness.shutdown.cancel();
    harness.run.await.unwrap();
}

#[tokio::test]
async fn incoming_calls_are_rejected_and_blocked() {
    let transport = StubTransport::new();
    let handlers = CountingHandlers {
        anticall: true,
        ..Default::default()
    };
    let caller = Jid::normalize("15558887777");
    let mut harness = start(
        None,
        handlers,
        vec![ScriptedSession::new(
            transport.clone(),
            vec![
                (Duration::ZERO, open_event("1555")),
                (
                    Duration::ZERO,
                    TransportEvent::IncomingCalls {
                        calls: vec![
                            CallOffer {
                                id: "call-1".into(),
                                from: caller.clone(),
                            },
                            CallOffer {
                                id: "call-2".into(),
                                from: caller.clone(),
                            },
                        ],
                    },
                ),
                hold_open(),
            ],
        )],
    );

    wait_for_state(&mut harness, ConnectionState::Connected).await;
    while transport.blocked().is_empty() {
        tokio::task::yield_now().await;
    }

    // Both offers rejected, one courtesy notice inside the window.
    assert_eq!(transport.rejected().len(), 2);
    let notices: Vec<_> = transport
        .sent()
        .into_iter()
        .filter(|(to, _)| *to == caller)
        .collect();
    assert_eq!(notices.len(), 1);
    assert!(transport.blocked().contains(&caller));

    harness.shutdown.cancel();
    harness.run.await.unwrap();
}
