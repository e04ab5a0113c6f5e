//! Core identity and state types for a Herald instance
//!
//! A single process runs exactly one instance, identified by an
//! [`InstanceId`]. Everything the control surface exposes is derived from
//! the [`StatusSnapshot`] the supervisor publishes.

use serde::{Deserialize, Serialize};
use std::fmt;

// ----------------------------------------------------------------------------
// Instance Identity
// ----------------------------------------------------------------------------

/// Opaque identifier for a bot instance, supplied at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Startup-supplied identity of this instance. Immutable for the process
/// lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceIdentity {
    /// Unique instance identifier (also the per-instance directory name).
    pub instance_id: InstanceId,
    /// Phone number used for pairing-code registration, digits only.
    pub phone_number: Option<String>,
    /// TCP port for the loopback control surface.
    pub control_port: u16,
}

/// Strip everything but digits from a raw phone number.
///
/// `"+1 (555) 123-4567"` becomes `"15551234567"`.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

// ----------------------------------------------------------------------------
// Jids
// ----------------------------------------------------------------------------

const GROUP_DOMAIN: &str = "g.us";
const BROADCAST_DOMAIN: &str = "broadcast";
const USER_DOMAIN: &str = "s.whatsapp.net";

/// A normalized messaging-service address.
///
/// Raw jids can carry a device suffix on the user part
/// (`"4915551234567:12@s.whatsapp.net"`); normalization strips it so cache
/// keys and owner comparisons are stable across devices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jid(String);

impl Jid {
    /// Normalize a raw jid: strip the device suffix from the user part and
    /// lowercase the domain. A bare user part gets the default user domain.
    pub fn normalize(raw: &str) -> Self {
        match raw.split_once('@') {
            Some((user, domain)) => {
                let user = user.split_once(':').map(|(u, _)| u).unwrap_or(user);
                Self(format!("{}@{}", user, domain.to_ascii_lowercase()))
            }
            None => Self(format!("{}@{}", raw, USER_DOMAIN)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before the `@`.
    pub fn user(&self) -> &str {
        self.0.split_once('@').map(|(u, _)| u).unwrap_or(&self.0)
    }

    /// The part after the `@`.
    pub fn domain(&self) -> &str {
        self.0.split_once('@').map(|(_, d)| d).unwrap_or("")
    }

    pub fn is_group(&self) -> bool {
        self.domain() == GROUP_DOMAIN
    }

    /// Broadcast and status-channel conversations share the broadcast domain.
    pub fn is_broadcast(&self) -> bool {
        self.domain() == BROADCAST_DOMAIN
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Lifecycle state of the supervised connection.
///
/// Owned exclusively by the supervisor; everyone else observes it through
/// the published [`StatusSnapshot`]. Never persisted; a restarted process
/// begins at `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Pairing,
    Connected,
    /// Terminal: credentials were purged and reconnection requires external
    /// re-initiation (a fresh pairing).
    LoggedOut,
    Error,
}

impl ConnectionState {
    /// True for the one state the reconnect loop never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::LoggedOut)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Pairing => "pairing",
            ConnectionState::Connected => "connected",
            ConnectionState::LoggedOut => "logged_out",
            ConnectionState::Error => "error",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Pairing Codes
// ----------------------------------------------------------------------------

/// Format a raw pairing code as groups of 4 joined by `-`.
///
/// `"ABCD1234EFGH"` becomes `"ABCD-1234-EFGH"`. Codes whose length is not a
/// multiple of 4 keep a shorter final group.
pub fn format_pairing_code(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    chars
        .chunks(4)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

// ----------------------------------------------------------------------------
// Session Credentials
// ----------------------------------------------------------------------------

/// Opaque authentication material owned by the session store.
///
/// Herald never interprets the key material; it only persists what the
/// transport hands back on credential rotation and feeds it into the next
/// connection attempt. `registered` is the one field the supervisor reads:
/// an unregistered credential set with a configured phone number triggers
/// the pairing flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCredentials {
    /// Whether this credential set has completed device registration.
    pub registered: bool,
    /// Identity keys, pre-keys and signed session state, as the transport
    /// serializes them.
    pub material: serde_json::Value,
}

impl SessionCredentials {
    /// Fresh, unregistered credentials for a first run.
    pub fn fresh() -> Self {
        Self {
            registered: false,
            material: serde_json::Value::Object(Default::default()),
        }
    }
}

// ----------------------------------------------------------------------------
// Cached Events
// ----------------------------------------------------------------------------

/// Message identifier as assigned by the messaging service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message retained for transport re-delivery lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedMessage {
    pub conversation: Jid,
    pub id: MessageId,
    pub payload: serde_json::Value,
}

/// Contact metadata, upserted on contact-update events. No deletion path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: Jid,
    pub display_name: Option<String>,
}

// ----------------------------------------------------------------------------
// Bound User & Status Snapshot
// ----------------------------------------------------------------------------

/// The account identity the transport reports once the connection opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundUser {
    pub jid: Jid,
    pub name: Option<String>,
}

/// Read-only view of supervisor state, published over a watch channel and
/// consumed by the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub instance_id: InstanceId,
    pub state: ConnectionState,
    pub pairing_code: Option<String>,
    pub phone_number: Option<String>,
    pub user: Option<BoundUser>,
}

impl StatusSnapshot {
    /// Initial snapshot for a freshly started instance.
    pub fn initial(identity: &InstanceIdentity) -> Self {
        Self {
            instance_id: identity.instance_id.clone(),
            state: ConnectionState::Disconnected,
            pairing_code: None,
            phone_number: identity.phone_number.clone(),
            user: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_device_suffix() {
        let jid = Jid::normalize("4915551234567:12@s.whatsapp.net");
        assert_eq!(jid.as_str(), "4915551234567@s.whatsapp.net");
        assert_eq!(jid.user(), "4915551234567");
    }

    #[test]
    fn normalize_defaults_user_domain() {
        let jid = Jid::normalize("15551234567");
        assert_eq!(jid.as_str(), "15551234567@s.whatsapp.net");
    }

    #[test]
    fn normalize_lowercases_domain() {
        let jid = Jid::normalize("abc@S.WHATSAPP.NET");
        assert_eq!(jid.domain(), "s.whatsapp.net");
    }

    #[test]
    fn jid_classification() {
        assert!(Jid::normalize("12345-67890@g.us").is_group());
        assert!(Jid::normalize("status@broadcast").is_broadcast());
        assert!(!Jid::normalize("15551234567@s.whatsapp.net").is_group());
    }

    #[test]
    fn phone_normalization_keeps_digits_only() {
        assert_eq!(normalize_phone("+1 (555) 123-4567"), "15551234567");
        assert_eq!(normalize_phone("15551234567"), "15551234567");
    }

    #[test]
    fn pairing_code_groups_of_four() {
        assert_eq!(format_pairing_code("ABCD1234EFGH"), "ABCD-1234-EFGH");
        assert_eq!(format_pairing_code("ABCDEF"), "ABCD-EF");
        assert_eq!(format_pairing_code(""), "");
    }

    #[test]
    fn connection_state_serializes_snake_case() {
        let json = serde_json::to_string(&ConnectionState::LoggedOut).unwrap();
        assert_eq!(json, "\"logged_out\"");
        assert_eq!(ConnectionState::Pairing.to_string(), "pairing");
    }

    #[test]
    fn fresh_credentials_are_unregistered() {
        let creds = SessionCredentials::fresh();
        assert!(!creds.registered);
    }

    #[test]
    fn initial_snapshot_is_disconnected() {
        let identity = InstanceIdentity {
            instance_id: InstanceId::new("bot-1"),
            phone_number: Some("15551234567".to_string()),
            control_port: 3001,
        };
        let snapshot = StatusSnapshot::initial(&identity);
        assert_eq!(snapshot.state, ConnectionState::Disconnected);
        assert!(snapshot.pairing_code.is_none());
        assert!(snapshot.user.is_none());
    }
}
