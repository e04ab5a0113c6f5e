//! The opaque transport abstraction
//!
//! The wire protocol, encryption and session handshake live behind these
//! traits: Herald supervises a connection, it does not implement one. A
//! [`TransportConnector`] mints one [`TransportSession`] per connection
//! attempt: an operation handle plus a stream of typed [`TransportEvent`]s
//! the supervisor consumes in a single exhaustive match.

use crate::errors::TransportError;
use crate::types::{BoundUser, ContactRecord, Jid, MessageId, SessionCredentials};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

// ----------------------------------------------------------------------------
// Protocol Version
// ----------------------------------------------------------------------------

/// Protocol version negotiated with the remote service, fetched fresh on
/// every connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolVersion(pub Vec<u32>);

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|p| p.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

// ----------------------------------------------------------------------------
// Disconnect Causes
// ----------------------------------------------------------------------------

/// Why a connection closed.
///
/// `LoggedOut` and `Unauthorized` are distinct signals from the service but
/// collapse to the same handling: purge credentials, enter the terminal
/// state, never reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// The account was explicitly logged out on another device.
    LoggedOut,
    /// The service rejected the session credentials.
    Unauthorized,
    /// Anything else: network drop, timeout, server restart.
    ConnectionLost { reason: String },
}

const STATUS_UNAUTHORIZED: u16 = 401;
const STATUS_LOGGED_OUT: u16 = 440;

impl DisconnectCause {
    /// Map a close status code onto a cause.
    pub fn from_status(code: Option<u16>, reason: impl Into<String>) -> Self {
        match code {
            Some(STATUS_UNAUTHORIZED) => DisconnectCause::Unauthorized,
            Some(STATUS_LOGGED_OUT) => DisconnectCause::LoggedOut,
            _ => DisconnectCause::ConnectionLost {
                reason: reason.into(),
            },
        }
    }

    /// True when the session is unrecoverable and credentials must go.
    pub fn is_logged_out(&self) -> bool {
        matches!(self, DisconnectCause::LoggedOut | DisconnectCause::Unauthorized)
    }
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectCause::LoggedOut => f.write_str("logged out"),
            DisconnectCause::Unauthorized => f.write_str("unauthorized"),
            DisconnectCause::ConnectionLost { reason } => write!(f, "connection lost: {}", reason),
        }
    }
}

// ----------------------------------------------------------------------------
// Inbound Payloads
// ----------------------------------------------------------------------------

/// A message event as delivered by the transport, inbound or echoed
/// outbound.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub conversation: Jid,
    pub id: MessageId,
    pub sender: Jid,
    /// Set when the message was authored by this instance's own account.
    pub from_me: bool,
    /// Opaque message content, kept verbatim for cache lookups.
    pub payload: serde_json::Value,
}

/// An incoming call offer.
#[derive(Debug, Clone)]
pub struct CallOffer {
    pub id: String,
    pub from: Jid,
}

/// Group membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupAction {
    Add,
    Remove,
    Promote,
    Demote,
}

#[derive(Debug, Clone)]
pub struct GroupUpdate {
    pub group: Jid,
    pub participants: Vec<Jid>,
    pub action: GroupAction,
}

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// Everything the transport can tell the supervisor, as one typed enum.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Handshake in progress.
    Connecting,
    /// Connection open; the account identity is now bound.
    Open { user: BoundUser },
    /// Connection closed; the cause decides reconnect vs. logout.
    Close { cause: DisconnectCause },
    /// Rotated credentials that must be persisted before the next attempt.
    CredentialsUpdate { credentials: SessionCredentials },
    /// New or updated messages, inbound and outbound.
    MessagesUpsert { messages: Vec<InboundMessage> },
    /// Contact metadata updates.
    ContactsUpsert { contacts: Vec<ContactRecord> },
    /// A batch of incoming call offers.
    IncomingCalls { calls: Vec<CallOffer> },
    /// Group participant changes.
    GroupParticipantsUpdate { update: GroupUpdate },
}

// ----------------------------------------------------------------------------
// Transport Traits
// ----------------------------------------------------------------------------

/// Resolver the transport uses to re-fetch a message it needs to re-deliver.
pub type MessageLookup = Arc<dyn Fn(&Jid, &MessageId) -> Option<serde_json::Value> + Send + Sync>;

/// Everything a transport needs to establish one connection.
pub struct ConnectOptions {
    pub version: ProtocolVersion,
    pub credentials: SessionCredentials,
    /// Satisfies the transport's re-delivery queries from the event cache.
    pub message_lookup: MessageLookup,
}

/// One live connection: the operation handle and its event stream.
pub struct TransportSession {
    pub handle: Arc<dyn Transport>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Operations on a live transport connection.
///
/// All sends are fallible; callers on best-effort paths log and swallow the
/// error rather than propagate it.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Request a pairing code for linking a new device to `phone`.
    async fn request_pairing_code(&self, phone: &str) -> Result<String, TransportError>;

    /// Send a plain text message.
    async fn send_text(&self, to: &Jid, body: &str) -> Result<(), TransportError>;

    /// Reject an incoming call offer.
    async fn reject_call(&self, call: &CallOffer) -> Result<(), TransportError>;

    /// Block a remote party.
    async fn block(&self, jid: &Jid) -> Result<(), TransportError>;

    /// Resolve a display name for a jid, if the transport knows one.
    async fn resolve_display_name(&self, jid: &Jid) -> Option<String>;

    /// Drop the transport's internal per-message retry bookkeeping.
    fn clear_retry_counts(&self);
}

/// Factory for transport sessions; one connector outlives many connection
/// attempts.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Fetch the latest protocol version supported by the remote service.
    async fn latest_version(&self) -> Result<ProtocolVersion, TransportError>;

    /// Establish a connection with the given credentials.
    async fn connect(&self, options: ConnectOptions) -> Result<TransportSession, TransportError>;
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_status_maps_to_logout_handling() {
        let cause = DisconnectCause::from_status(Some(401), "unauthorized");
        assert_eq!(cause, DisconnectCause::Unauthorized);
        assert!(cause.is_logged_out());
    }

    #[test]
    fn logged_out_status_maps_to_logout_handling() {
        let cause = DisconnectCause::from_status(Some(440), "logged out elsewhere");
        assert_eq!(cause, DisconnectCause::LoggedOut);
        assert!(cause.is_logged_out());
    }

    #[test]
    fn other_statuses_are_transient() {
        for code in [None, Some(408), Some(500), Some(515)] {
            let cause = DisconnectCause::from_status(code, "stream error");
            assert!(!cause.is_logged_out(), "code {:?} must reconnect", code);
        }
    }

    #[test]
    fn protocol_version_display() {
        let version = ProtocolVersion(vec![2, 3000, 17]);
        assert_eq!(version.to_string(), "2.3000.17");
    }
}
