//! Durable state for a Herald instance
//!
//! Two stores with different lifecycles: session credentials (mutated only
//! on rotation, purged on logout) and the event cache (mutated on every
//! message, checkpointed periodically).

pub mod cache;
pub mod session;
