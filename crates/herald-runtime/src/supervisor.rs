//! Connection supervisor
//!
//! One task owns the connection lifecycle end to end: it connects through
//! the [`TransportConnector`], consumes the session's event stream in a
//! single exhaustive match, and decides after every close whether to retry
//! or stop. State transitions are published as [`StatusSnapshot`]s over a
//! watch channel; nothing else ever mutates connection state.
//!
//! The reconnect policy is deliberately simple: any transient close or
//! failed attempt schedules another attempt after a delay, with no attempt
//! cap. Only a logout (or an explicit shutdown) leaves the loop.

use crate::dispatch::{route_message, CallGuard, DropReason, Route};
use crate::store::cache::{CacheEvent, EventCache};
use crate::store::session::SessionStore;
use herald_core::config::SupervisorConfig;
use herald_core::errors::{HeraldError, Result};
use herald_core::handlers::{
    AnticallPolicy, BotTransport, GroupUpdateHandler, MessageHandler, StatusHandler,
};
use herald_core::transport::{
    CallOffer, ConnectOptions, InboundMessage, Transport, TransportConnector, TransportEvent,
    TransportSession,
};
use herald_core::types::{
    format_pairing_code, BoundUser, CachedMessage, ConnectionState, InstanceIdentity,
    StatusSnapshot,
};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ----------------------------------------------------------------------------
// Collaborators
// ----------------------------------------------------------------------------

/// The injected business logic a supervisor dispatches into.
#[derive(Clone)]
pub struct Collaborators {
    pub message_handler: Arc<dyn MessageHandler>,
    pub status_handler: Arc<dyn StatusHandler>,
    pub group_handler: Arc<dyn GroupUpdateHandler>,
    pub anticall: Arc<dyn AnticallPolicy>,
}

// ----------------------------------------------------------------------------
// Session Outcomes
// ----------------------------------------------------------------------------

/// How one connection session ended.
enum SessionEnd {
    /// Transient close; the loop schedules another attempt.
    Closed,
    /// Terminal logout; credentials are already purged.
    LoggedOut,
    /// Shutdown was requested.
    Shutdown,
}

// ----------------------------------------------------------------------------
// Supervisor
// ----------------------------------------------------------------------------

pub struct Supervisor<C: TransportConnector> {
    identity: InstanceIdentity,
    connector: Arc<C>,
    store: Arc<SessionStore>,
    cache: Arc<EventCache>,
    collaborators: Collaborators,
    config: SupervisorConfig,
    shutdown: CancellationToken,

    status: watch::Sender<StatusSnapshot>,
    state: ConnectionState,
    pairing_code: Option<String>,
    user: Option<BoundUser>,
    call_guard: CallGuard,
    // True once the current session reached Connected; resets the
    // reconnect delay.
    session_connected: bool,
}

impl<C: TransportConnector> Supervisor<C> {
    /// Build a supervisor and the status receiver the control surface reads.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: InstanceIdentity,
        connector: Arc<C>,
        store: Arc<SessionStore>,
        cache: Arc<EventCache>,
        collaborators: Collaborators,
        config: SupervisorConfig,
        shutdown: CancellationToken,
    ) -> (Self, watch::Receiver<StatusSnapshot>) {
        let (status, receiver) = watch::channel(StatusSnapshot::initial(&identity));
        let call_guard = CallGuard::new(config.call_notify_window());
        (
            Self {
                identity,
                connector,
                store,
                cache,
                collaborators,
                config,
                shutdown,
                status,
                state: ConnectionState::Disconnected,
                pairing_code: None,
                user: None,
                call_guard,
                session_connected: false,
            },
            receiver,
        )
    }

    /// Drive the connect/supervise/reconnect loop until logout or shutdown.
    /// Returns the final connection state.
    pub async fn run(mut self) -> ConnectionState {
        let mut delay = self.config.reconnect.initial_delay();

        loop {
            self.session_connected = false;
            match self.run_session().await {
                Ok(SessionEnd::LoggedOut) => {
                    info!(instance = %self.identity.instance_id, "logged out, supervision ends");
                    break;
                }
                Ok(SessionEnd::Shutdown) => {
                    debug!(instance = %self.identity.instance_id, "shutdown requested");
                    break;
                }
                Ok(SessionEnd::Closed) => {
                    if self.session_connected {
                        delay = self.config.reconnect.initial_delay();
                    }
                }
                Err(e) => {
                    error!(instance = %self.identity.instance_id, error = %e, "session failed");
                    self.set_state(ConnectionState::Error);
                }
            }

            info!(
                instance = %self.identity.instance_id,
                delay_secs = delay.as_secs_f64(),
                "reconnecting after delay"
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = self.config.reconnect.next_delay(delay);
        }

        self.state
    }

    /// One connection attempt: connect, then consume events until the
    /// session ends.
    async fn run_session(&mut self) -> Result<SessionEnd> {
        self.set_state(ConnectionState::Connecting);

        // Fetched fresh every attempt so a service-side protocol bump does
        // not strand the instance on a stale version.
        let version = self.connector.latest_version().await?;
        debug!(version = %version, "fetched protocol version");

        let credentials = self.store.load().await?;
        let needs_pairing = self.identity.phone_number.is_some() && !credentials.registered;

        let TransportSession { handle, mut events } = self
            .connector
            .connect(ConnectOptions {
                version,
                credentials,
                message_lookup: self.cache.lookup_fn(),
            })
            .await?;
        let bot = BotTransport::new(handle.clone());

        // Pairing waits for the transport to settle before asking for a code.
        let mut pairing_timer: Option<Pin<Box<Sleep>>> = needs_pairing
            .then(|| Box::pin(tokio::time::sleep(self.config.pairing_delay())) as Pin<Box<Sleep>>);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
                _ = async { pairing_timer.as_mut().expect("guarded").await }, if pairing_timer.is_some() => {
                    pairing_timer = None;
                    if !self.request_pairing(handle.as_ref()).await {
                        // The request is not retried within the session; the
                        // reconnect loop retries the whole connection.
                        self.set_state(ConnectionState::Error);
                        return Ok(SessionEnd::Closed);
                    }
                }
                event = events.recv() => match event {
                    Some(event) => {
                        if let Some(end) = self.handle_event(&bot, event).await? {
                            return Ok(end);
                        }
                        // A session that opens inside the pairing window is
                        // already registered; the code request must not fire.
                        if self.session_connected {
                            pairing_timer = None;
                        }
                    }
                    None => {
                        // Event stream ended without a Close; treat it as a
                        // transient loss.
                        warn!(instance = %self.identity.instance_id, "event stream ended");
                        self.set_state(ConnectionState::Disconnected);
                        return Ok(SessionEnd::Closed);
                    }
                }
            }
        }
    }

    /// Request and publish a pairing code. Returns false when the request
    /// fails, which ends the session in the error state.
    async fn request_pairing(&mut self, transport: &dyn Transport) -> bool {
        let phone = match &self.identity.phone_number {
            Some(phone) => phone.clone(),
            None => return true,
        };
        match transport.request_pairing_code(&phone).await {
            Ok(raw) => {
                let code = format_pairing_code(&raw);
                info!(instance = %self.identity.instance_id, code = %code, "pairing code issued");
                self.pairing_code = Some(code);
                self.set_state(ConnectionState::Pairing);
                true
            }
            Err(e) => {
                warn!(instance = %self.identity.instance_id, error = %e, "pairing code request failed");
                false
            }
        }
    }

    /// Apply one transport event. `Some` ends the session.
    async fn handle_event(
        &mut self,
        bot: &BotTransport,
        event: TransportEvent,
    ) -> Result<Option<SessionEnd>> {
        match event {
            TransportEvent::Connecting => {
                self.set_state(ConnectionState::Connecting);
            }
            TransportEvent::Open { user } => {
                info!(instance = %self.identity.instance_id, user = %user.jid, "connection open");
                self.user = Some(user.clone());
                self.session_connected = true;
                self.set_state(ConnectionState::Connected);
                self.announce_online(bot, &user).await;
            }
            TransportEvent::Close { cause } => {
                if cause.is_logged_out() {
                    warn!(instance = %self.identity.instance_id, cause = %cause, "session logged out, purging credentials");
                    self.store.purge().await?;
                    self.user = None;
                    self.set_state(ConnectionState::LoggedOut);
                    return Ok(Some(SessionEnd::LoggedOut));
                }
                warn!(instance = %self.identity.instance_id, cause = %cause, "connection closed");
                self.set_state(ConnectionState::Disconnected);
                return Ok(Some(SessionEnd::Closed));
            }
            TransportEvent::CredentialsUpdate { credentials } => {
                // Persistence failures are not survivable: losing a rotation
                // invalidates the session, so the error restarts it.
                self.store
                    .on_update(&credentials)
                    .await
                    .map_err(HeraldError::from)?;
            }
            TransportEvent::MessagesUpsert { messages } => {
                for message in messages {
                    self.dispatch_message(bot, message).await;
                }
            }
            TransportEvent::ContactsUpsert { contacts } => {
                for contact in contacts {
                    self.cache.record(CacheEvent::Contact(contact));
                }
            }
            TransportEvent::IncomingCalls { calls } => {
                for call in calls {
                    self.handle_call(bot, call).await;
                }
            }
            TransportEvent::GroupParticipantsUpdate { update } => {
                if let Err(e) = self
                    .collaborators
                    .group_handler
                    .handle_update(bot, &update)
                    .await
                {
                    warn!(group = %update.group, error = %e, "group update handler failed");
                }
            }
        }
        Ok(None)
    }

    /// Cache, route and deliver one message. Handler failures are isolated
    /// per message.
    async fn dispatch_message(&mut self, bot: &BotTransport, message: InboundMessage) {
        bot.raw().clear_retry_counts();
        self.cache.record(CacheEvent::Message(CachedMessage {
            conversation: message.conversation.clone(),
            id: message.id.clone(),
            payload: message.payload.clone(),
        }));

        let owner = self.user.as_ref().map(|u| &u.jid);
        match route_message(&message, self.config.owner_only, owner) {
            Route::Status => {
                if let Err(e) = self
                    .collaborators
                    .status_handler
                    .handle_status(bot, &message)
                    .await
                {
                    warn!(id = %message.id, error = %e, "status handler failed");
                }
            }
            Route::Handle => {
                if let Err(e) = self
                    .collaborators
                    .message_handler
                    .handle(bot, &message)
                    .await
                {
                    warn!(id = %message.id, error = %e, "message handler failed");
                }
            }
            Route::Drop(reason) => {
                let reason = match reason {
                    DropReason::SyntheticId => "synthetic id",
                    DropReason::NotOwner => "not owner",
                };
                debug!(id = %message.id, reason, "message dropped");
            }
        }
    }

    /// Reject an incoming call; notify and block the caller when the
    /// anticall policy is on. Every step is best-effort.
    async fn handle_call(&mut self, bot: &BotTransport, call: CallOffer) {
        if !self.collaborators.anticall.anticall_enabled() {
            debug!(from = %call.from, "incoming call ignored, anticall disabled");
            return;
        }

        if let Err(e) = bot.raw().reject_call(&call).await {
            warn!(from = %call.from, error = %e, "call rejection failed");
        }

        if self.call_guard.should_notify(&call.from) {
            let notice = "Calls are not accepted on this number. Please send a text message.";
            if let Err(e) = bot.raw().send_text(&call.from, notice).await {
                warn!(from = %call.from, error = %e, "call notice failed");
            }
        }

        // Blocking too close to the rejection races the service's call
        // teardown, so it runs detached after a short delay.
        let handle = bot.raw().clone();
        let caller = call.from.clone();
        let delay = self.config.call_block_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = handle.block(&caller).await {
                debug!(caller = %caller, error = %e, "caller block failed");
            }
        });
    }

    /// Best-effort startup note to the account's own chat.
    async fn announce_online(&self, bot: &BotTransport, user: &BoundUser) {
        let note = format!("Instance {} is online.", self.identity.instance_id);
        if let Err(e) = bot.raw().send_text(&user.jid, &note).await {
            debug!(error = %e, "online announcement failed");
        }
    }

    /// Transition and publish. The pairing code only survives in the
    /// Pairing state.
    fn set_state(&mut self, state: ConnectionState) {
        if state != ConnectionState::Pairing {
            self.pairing_code = None;
        }
        self.state = state;
        self.status.send_replace(StatusSnapshot {
            instance_id: self.identity.instance_id.clone(),
            state: self.state,
            pairing_code: self.pairing_code.clone(),
            phone_number: self.identity.phone_number.clone(),
            user: self.user.clone(),
        });
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
//
// Scenario tests that drive the full loop against scripted transports live
// in tests/supervisor.rs; the unit tests here cover the transition rules in
// isolation.
