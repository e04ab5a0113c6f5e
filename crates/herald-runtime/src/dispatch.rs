//! Message routing and call-notification policy
//!
//! Pure decisions, separated from the supervisor's event loop so they can
//! be tested without a transport. `route_message` classifies one inbound
//! message; [`CallGuard`] rate-limits the "call rejected" notice per
//! caller.

use herald_core::transport::InboundMessage;
use herald_core::types::Jid;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Message-id prefix the service uses for messages it synthesizes on the
/// account's behalf. These never carry user content.
pub const SYNTHETIC_ID_PREFIX: &str = "BAE5";

// ----------------------------------------------------------------------------
// Message Routing
// ----------------------------------------------------------------------------

/// Where an inbound message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Deliver to the message handler.
    Handle,
    /// A status/broadcast post; delivered to the status handler.
    Status,
    /// Dropped before any handler sees it.
    Drop(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Service-synthesized message id.
    SyntheticId,
    /// Owner-only mode and the sender is not the owner.
    NotOwner,
}

/// Classify one inbound message.
///
/// Broadcast conversations win over every other rule; a synthetic status
/// post is still a status post. Owner-only filtering applies to direct
/// chats only; group traffic always reaches the handler, and the
/// instance's own outbound echoes count as owner traffic.
pub fn route_message(message: &InboundMessage, owner_only: bool, owner: Option<&Jid>) -> Route {
    if message.conversation.is_broadcast() {
        return Route::Status;
    }
    if message.id.as_str().starts_with(SYNTHETIC_ID_PREFIX) {
        return Route::Drop(DropReason::SyntheticId);
    }
    if owner_only && !message.conversation.is_group() && !message.from_me {
        match owner {
            Some(owner) if *owner == message.sender => {}
            _ => return Route::Drop(DropReason::NotOwner),
        }
    }
    Route::Handle
}

// ----------------------------------------------------------------------------
// Call Guard
// ----------------------------------------------------------------------------

/// Per-caller window for the rejected-call notification.
///
/// Every call offer is rejected; the guard only decides whether the caller
/// gets told again. One notice per caller per window.
pub struct CallGuard {
    window: Duration,
    notified: HashMap<Jid, Instant>,
}

impl CallGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            notified: HashMap::new(),
        }
    }

    /// True if this caller has not been notified within the window. Marks
    /// the caller as notified when it returns true.
    pub fn should_notify(&mut self, caller: &Jid) -> bool {
        let now = Instant::now();
        self.prune(now);
        match self.notified.get(caller) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                self.notified.insert(caller.clone(), now);
                true
            }
        }
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.notified
            .retain(|_, last| now.duration_since(*last) < window);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::types::MessageId;
    use serde_json::json;

    fn inbound(conversation: &str, id: &str, sender: &str, from_me: bool) -> InboundMessage {
        InboundMessage {
            conversation: Jid::normalize(conversation),
            id: MessageId::new(id),
            sender: Jid::normalize(sender),
            from_me,
            payload: json!({}),
        }
    }

    #[test]
    fn broadcast_routes_to_status() {
        let msg = inbound("status@broadcast", "M1", "15551234567", false);
        assert_eq!(route_message(&msg, false, None), Route::Status);
    }

    #[test]
    fn broadcast_wins_over_synthetic_id() {
        let msg = inbound("status@broadcast", "BAE5AAAA", "15551234567", false);
        assert_eq!(route_message(&msg, true, None), Route::Status);
    }

    #[test]
    fn synthetic_ids_are_dropped() {
        let msg = inbound("15551234567", "BAE5FFFF", "15551234567", false);
        assert_eq!(
            route_message(&msg, false, None),
            Route::Drop(DropReason::SyntheticId)
        );
    }

    #[test]
    fn owner_only_drops_strangers_in_direct_chats() {
        let owner = Jid::normalize("15550000001");
        let msg = inbound("15559999999", "M1", "15559999999", false);
        assert_eq!(
            route_message(&msg, true, Some(&owner)),
            Route::Drop(DropReason::NotOwner)
        );
    }

    #[test]
    fn owner_only_admits_the_owner() {
        let owner = Jid::normalize("15550000001");
        let msg = inbound("15550000001", "M1", "15550000001", false);
        assert_eq!(route_message(&msg, true, Some(&owner)), Route::Handle);
    }

    #[test]
    fn owner_only_admits_group_traffic() {
        let owner = Jid::normalize("15550000001");
        let msg = inbound("12345-67890@g.us", "M1", "15559999999", false);
        assert_eq!(route_message(&msg, true, Some(&owner)), Route::Handle);
    }

    #[test]
    fn owner_only_admits_own_echoes() {
        let owner = Jid::normalize("15550000001");
        let msg = inbound("15559999999", "M1", "15550000001", true);
        assert_eq!(route_message(&msg, true, Some(&owner)), Route::Handle);
    }

    #[test]
    fn owner_only_without_bound_owner_drops_direct_traffic() {
        let msg = inbound("15559999999", "M1", "15559999999", false);
        assert_eq!(
            route_message(&msg, true, None),
            Route::Drop(DropReason::NotOwner)
        );
    }

    #[test]
    fn everything_else_is_handled() {
        let msg = inbound("15559999999", "M1", "15559999999", false);
        assert_eq!(route_message(&msg, false, None), Route::Handle);
    }

    #[tokio::test(start_paused = true)]
    async fn call_guard_notifies_once_per_window() {
        let mut guard = CallGuard::new(Duration::from_secs(60));
        let caller = Jid::normalize("15551234567");

        assert!(guard.should_notify(&caller));
        assert!(!guard.should_notify(&caller));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(guard.should_notify(&caller));
    }

    #[tokio::test(start_paused = true)]
    async fn call_guard_tracks_callers_independently() {
        let mut guard = CallGuard::new(Duration::from_secs(60));
        let a = Jid::normalize("15550000001");
        let b = Jid::normalize("15550000002");

        assert!(guard.should_notify(&a));
        assert!(guard.should_notify(&b));
        assert!(!guard.should_notify(&a));
    }
}
