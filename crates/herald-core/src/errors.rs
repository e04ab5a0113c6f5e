//! Error taxonomy for Herald
//!
//! Subsystem-specific error enums unified by [`HeraldError`]. Transient
//! transport failures are recovered by the supervisor's reconnect loop;
//! store and cache failures surface to the caller; best-effort side
//! channels (self-notification, call handling) swallow their errors at the
//! call site and never construct these types at all.

use crate::types::Jid;

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Failures reported by the opaque transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {reason}")]
    ConnectFailed { reason: String },

    #[error("Protocol version fetch failed: {reason}")]
    VersionFetch { reason: String },

    #[error("Pairing code unavailable: {reason}")]
    PairingUnavailable { reason: String },

    #[error("Send to {to} failed: {reason}")]
    SendFailed { to: Jid, reason: String },

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Transport closed: {reason}")]
    Closed { reason: String },
}

// ----------------------------------------------------------------------------
// Session Store Errors
// ----------------------------------------------------------------------------

/// Failures persisting or purging session credentials.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Session store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ----------------------------------------------------------------------------
// Event Cache Errors
// ----------------------------------------------------------------------------

/// Failures snapshotting or loading the event cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ----------------------------------------------------------------------------
// Control Surface Errors
// ----------------------------------------------------------------------------

/// Failures binding or serving the control surface.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Control server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Top-level error type for Herald operations.
#[derive(Debug, thiserror::Error)]
pub enum HeraldError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Event cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Control surface error: {0}")]
    Control(#[from] ControlError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

impl HeraldError {
    /// Create a configuration error with a reason.
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        HeraldError::Configuration {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = std::result::Result<T, HeraldError>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_convert_to_herald_error() {
        let err: HeraldError = TransportError::NotConnected.into();
        assert!(matches!(err, HeraldError::Transport(_)));
        assert_eq!(err.to_string(), "Transport error: Transport is not connected");
    }

    #[test]
    fn io_errors_convert_through_store_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: HeraldError = StoreError::from(io).into();
        assert!(matches!(err, HeraldError::Store(StoreError::Io(_))));
    }
}
