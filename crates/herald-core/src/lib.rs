//! Herald Core
//!
//! Foundational types for a Herald bot instance: identities and jids, the
//! connection state machine vocabulary, configuration, the error taxonomy,
//! and the opaque transport abstraction the runtime supervises. The actual
//! wire protocol lives behind the [`transport::Transport`] trait; business
//! logic lives behind the collaborator traits in [`handlers`].

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod errors;
pub mod handlers;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{
    CacheConfig, ControlConfig, HeraldConfig, MemoryConfig, ReconnectConfig, SupervisorConfig,
    DEFAULT_CONTROL_PORT,
};
pub use errors::{CacheError, ControlError, HeraldError, Result, StoreError, TransportError};
pub use handlers::{AnticallPolicy, BotTransport, GroupUpdateHandler, MessageHandler, StatusHandler};
pub use transport::{
    CallOffer, ConnectOptions, DisconnectCause, GroupAction, GroupUpdate, InboundMessage,
    MessageLookup, ProtocolVersion, Transport, TransportConnector, TransportEvent, TransportSession,
};
pub use types::{
    format_pairing_code, normalize_phone, BoundUser, CachedMessage, ConnectionState, ContactRecord,
    InstanceId, InstanceIdentity, Jid, MessageId, SessionCredentials, StatusSnapshot,
};
