//! Default collaborator set for the binary
//!
//! The supervision core dispatches into injected handlers; the binary
//! ships a minimal set that logs what arrives. Deployments with real bot
//! logic link against `herald-runtime` and supply their own
//! [`Collaborators`].

use crate::config::BotConfig;
use async_trait::async_trait;
use herald_core::handlers::{
    AnticallPolicy, BotTransport, GroupUpdateHandler, MessageHandler, StatusHandler,
};
use herald_core::transport::{GroupUpdate, InboundMessage};
use herald_runtime::Collaborators;
use std::sync::Arc;
use tracing::{debug, info};

// ----------------------------------------------------------------------------
// Logging Handlers
// ----------------------------------------------------------------------------

struct LoggingHandlers;

#[async_trait]
impl MessageHandler for LoggingHandlers {
    async fn handle(&self, transport: &BotTransport, message: &InboundMessage) -> anyhow::Result<()> {
        let name = transport.display_name(&message.sender).await;
        info!(
            from = %name,
            conversation = %message.conversation,
            id = %message.id,
            "message received"
        );
        Ok(())
    }
}

#[async_trait]
impl StatusHandler for LoggingHandlers {
    async fn handle_status(
        &self,
        _transport: &BotTransport,
        message: &InboundMessage,
    ) -> anyhow::Result<()> {
        debug!(sender = %message.sender, id = %message.id, "status post received");
        Ok(())
    }
}

#[async_trait]
impl GroupUpdateHandler for LoggingHandlers {
    async fn handle_update(
        &self,
        _transport: &BotTransport,
        update: &GroupUpdate,
    ) -> anyhow::Result<()> {
        info!(
            group = %update.group,
            action = ?update.action,
            participants = update.participants.len(),
            "group membership changed"
        );
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Anticall Policy
// ----------------------------------------------------------------------------

/// Anticall toggle read from configuration at startup.
pub struct ConfiguredAnticall {
    enabled: bool,
}

impl AnticallPolicy for ConfiguredAnticall {
    fn anticall_enabled(&self) -> bool {
        self.enabled
    }
}

// ----------------------------------------------------------------------------
// Assembly
// ----------------------------------------------------------------------------

/// The collaborator set the binary runs with.
pub fn default_collaborators(bot: &BotConfig) -> Collaborators {
    let handlers = Arc::new(LoggingHandlers);
    Collaborators {
        message_handler: handlers.clone(),
        status_handler: handlers.clone(),
        group_handler: handlers,
        anticall: Arc::new(ConfiguredAnticall {
            enabled: bot.anticall,
        }),
    }
}
