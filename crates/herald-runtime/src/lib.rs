//! Herald Runtime
//!
//! The supervision core of a Herald instance: the durable session store,
//! the in-memory event cache that answers transport re-delivery queries,
//! the connection supervisor state machine, and the process-wide background
//! tasks (cache flush, memory watchdog).
//!
//! The supervisor is a single task that exclusively owns the connection
//! state and the transport handle; every other component observes it
//! through a `watch` snapshot. No two state transitions ever execute
//! concurrently, so the state machine needs no locking.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod dispatch;
pub mod store;
pub mod stub;
pub mod supervisor;
pub mod tasks;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use dispatch::{route_message, CallGuard, DropReason, Route};
pub use store::cache::{CacheEvent, EventCache};
pub use store::session::SessionStore;
pub use supervisor::{Collaborators, Supervisor};
pub use tasks::{spawn_cache_flush, spawn_memory_watchdog, MemorySampler, ProcStatusSampler};
