//! Collaborator seams
//!
//! Business logic is external to the supervision core: message handling,
//! status-broadcast handling, group updates and the anticall policy are all
//! injected behind these traits. Collaborators receive a [`BotTransport`],
//! the raw transport handle decorated with jid normalization and
//! display-name resolution, rather than the bare handle.

use crate::transport::{GroupUpdate, InboundMessage, Transport};
use crate::types::Jid;
use async_trait::async_trait;
use std::sync::Arc;

// ----------------------------------------------------------------------------
// Decorated Transport Handle
// ----------------------------------------------------------------------------

/// The transport handle as handed to collaborators.
#[derive(Clone)]
pub struct BotTransport {
    inner: Arc<dyn Transport>,
}

impl BotTransport {
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self { inner }
    }

    /// Normalize a raw jid string.
    pub fn normalize_jid(&self, raw: &str) -> Jid {
        Jid::normalize(raw)
    }

    /// Resolve a human-readable name for a jid, falling back to the user
    /// part when the transport knows none.
    pub async fn display_name(&self, jid: &Jid) -> String {
        match self.inner.resolve_display_name(jid).await {
            Some(name) => name,
            None => jid.user().to_string(),
        }
    }

    /// The undecorated transport handle.
    pub fn raw(&self) -> &Arc<dyn Transport> {
        &self.inner
    }
}

// ----------------------------------------------------------------------------
// Collaborator Traits
// ----------------------------------------------------------------------------

/// Handles messages that survived dispatch filtering. Errors are caught at
/// the dispatch boundary; they never crash the instance or affect other
/// messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, transport: &BotTransport, message: &InboundMessage)
        -> anyhow::Result<()>;
}

/// Handles broadcast/status-channel messages, routed separately from the
/// main handler.
#[async_trait]
pub trait StatusHandler: Send + Sync {
    async fn handle_status(
        &self,
        transport: &BotTransport,
        message: &InboundMessage,
    ) -> anyhow::Result<()>;
}

/// Handles group membership changes.
#[async_trait]
pub trait GroupUpdateHandler: Send + Sync {
    async fn handle_update(
        &self,
        transport: &BotTransport,
        update: &GroupUpdate,
    ) -> anyhow::Result<()>;
}

/// Read on every incoming call batch; when enabled, calls are rejected and
/// callers blocked.
pub trait AnticallPolicy: Send + Sync {
    fn anticall_enabled(&self) -> bool;
}
