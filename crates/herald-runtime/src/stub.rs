//! Scripted in-process transport
//!
//! A [`TransportConnector`] that replays pre-scripted event sequences
//! instead of speaking a real protocol. The supervisor tests drive their
//! scenarios through it, and the CLI's dev loopback mode uses it to run a
//! full instance with no network at all.

use async_trait::async_trait;
use herald_core::errors::TransportError;
use herald_core::transport::{
    CallOffer, ConnectOptions, ProtocolVersion, Transport, TransportConnector, TransportEvent,
    TransportSession,
};
use herald_core::types::{Jid, SessionCredentials};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ----------------------------------------------------------------------------
// Stub Transport
// ----------------------------------------------------------------------------

/// Records every operation invoked on it; answers pairing requests with a
/// canned code.
#[derive(Default)]
pub struct StubTransport {
    pairing_code: Option<String>,
    pairing_requests: Mutex<Vec<String>>,
    sent: Mutex<Vec<(Jid, String)>>,
    rejected: Mutex<Vec<CallOffer>>,
    blocked: Mutex<Vec<Jid>>,
    retry_clears: AtomicUsize,
}

impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A stub that answers pairing requests with `code`.
    pub fn with_pairing_code(code: &str) -> Arc<Self> {
        Arc::new(Self {
            pairing_code: Some(code.to_string()),
            ..Default::default()
        })
    }

    pub fn pairing_requests(&self) -> Vec<String> {
        self.pairing_requests.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(Jid, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn rejected(&self) -> Vec<CallOffer> {
        self.rejected.lock().unwrap().clone()
    }

    pub fn blocked(&self) -> Vec<Jid> {
        self.blocked.lock().unwrap().clone()
    }

    pub fn retry_clears(&self) -> usize {
        self.retry_clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn request_pairing_code(&self, phone: &str) -> Result<String, TransportError> {
        self.pairing_requests.lock().unwrap().push(phone.to_string());
        self.pairing_code
            .clone()
            .ok_or_else(|| TransportError::PairingUnavailable {
                reason: "no pairing code configured".to_string(),
            })
    }

    async fn send_text(&self, to: &Jid, body: &str) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((to.clone(), body.to_string()));
        Ok(())
    }

    async fn reject_call(&self, call: &CallOffer) -> Result<(), TransportError> {
        self.rejected.lock().unwrap().push(call.clone());
        Ok(())
    }

    async fn block(&self, jid: &Jid) -> Result<(), TransportError> {
        self.blocked.lock().unwrap().push(jid.clone());
        Ok(())
    }

    async fn resolve_display_name(&self, _jid: &Jid) -> Option<String> {
        None
    }

    fn clear_retry_counts(&self) {
        self.retry_clears.fetch_add(1, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------------
// Scripted Connector
// ----------------------------------------------------------------------------

/// One scripted connection: the handle the supervisor gets, and the timed
/// events that will be replayed to it.
pub struct ScriptedSession {
    pub transport: Arc<StubTransport>,
    pub events: Vec<(Duration, TransportEvent)>,
}

impl ScriptedSession {
    pub fn new(transport: Arc<StubTransport>, events: Vec<(Duration, TransportEvent)>) -> Self {
        Self { transport, events }
    }

    /// Events delivered back-to-back with no delays.
    pub fn immediate(transport: Arc<StubTransport>, events: Vec<TransportEvent>) -> Self {
        Self {
            transport,
            events: events
                .into_iter()
                .map(|e| (Duration::ZERO, e))
                .collect(),
        }
    }
}

/// Hands out scripted sessions in order; connection attempts beyond the
/// script fail, which the supervisor treats as a transient start failure.
pub struct ScriptedConnector {
    sessions: Mutex<VecDeque<ScriptedSession>>,
    connects: AtomicUsize,
    credentials_seen: Mutex<Vec<SessionCredentials>>,
}

impl ScriptedConnector {
    pub fn new(sessions: Vec<ScriptedSession>) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(sessions.into()),
            connects: AtomicUsize::new(0),
            credentials_seen: Mutex::new(Vec::new()),
        })
    }

    /// How many times `connect` has been called.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// The credentials each connection attempt was given, in order.
    pub fn credentials_seen(&self) -> Vec<SessionCredentials> {
        self.credentials_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransportConnector for ScriptedConnector {
    async fn latest_version(&self) -> Result<ProtocolVersion, TransportError> {
        Ok(ProtocolVersion(vec![2, 3000, 0]))
    }

    async fn connect(&self, options: ConnectOptions) -> Result<TransportSession, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.credentials_seen
            .lock()
            .unwrap()
            .push(options.credentials.clone());

        let session = self
            .sessions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::ConnectFailed {
                reason: "no scripted session remaining".to_string(),
            })?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            for (delay, event) in session.events {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            // Channel stays open-ended; the script ending without a Close
            // models a connection that simply goes quiet.
        });

        Ok(TransportSession {
            handle: session.transport,
            events: rx,
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
