//! In-memory event cache with periodic durable snapshots
//!
//! Records every message and contact event the transport emits, and answers
//! the transport's re-delivery lookups by (conversation, message id). The
//! cache is repopulated from its JSON snapshot at startup, before the
//! transport is created, so retry lookups succeed immediately after a
//! restart. The flush is a checkpoint, not a compaction; boundedness comes
//! from the insertion-order message cap.

use herald_core::config::CacheConfig;
use herald_core::errors::CacheError;
use herald_core::types::{CachedMessage, ContactRecord, Jid, MessageId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

// ----------------------------------------------------------------------------
// Cache Events
// ----------------------------------------------------------------------------

/// An event worth remembering.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    Message(CachedMessage),
    Contact(ContactRecord),
}

// ----------------------------------------------------------------------------
// Snapshot Format
// ----------------------------------------------------------------------------

/// On-disk representation; messages keep insertion order so eviction
/// survives a reload.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    messages: Vec<CachedMessage>,
    contacts: Vec<ContactRecord>,
}

// ----------------------------------------------------------------------------
// Event Cache
// ----------------------------------------------------------------------------

type MessageKey = (Jid, MessageId);

#[derive(Default)]
struct CacheInner {
    messages: HashMap<MessageKey, serde_json::Value>,
    // Insertion order for eviction.
    order: VecDeque<MessageKey>,
    contacts: HashMap<Jid, ContactRecord>,
    dirty: bool,
}

/// Shared between the supervisor (writes) and the flush task (snapshots).
pub struct EventCache {
    path: PathBuf,
    max_messages: usize,
    inner: Mutex<CacheInner>,
}

impl EventCache {
    /// Create an empty cache backed by the given snapshot file.
    pub fn new<P: Into<PathBuf>>(path: P, config: &CacheConfig) -> Self {
        Self {
            path: path.into(),
            max_messages: config.max_messages,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a message or contact event. Idempotent under repeated
    /// delivery of the same message id.
    pub fn record(&self, event: CacheEvent) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        match event {
            CacheEvent::Message(message) => {
                let key = (message.conversation, message.id);
                if inner.messages.contains_key(&key) {
                    return;
                }
                inner.messages.insert(key.clone(), message.payload);
                inner.order.push_back(key);
                while inner.order.len() > self.max_messages {
                    if let Some(evicted) = inner.order.pop_front() {
                        inner.messages.remove(&evicted);
                    }
                }
                inner.dirty = true;
            }
            CacheEvent::Contact(contact) => {
                inner.contacts.insert(contact.id.clone(), contact);
                inner.dirty = true;
            }
        }
    }

    /// Resolve a message payload for transport re-delivery.
    pub fn lookup(&self, conversation: &Jid, id: &MessageId) -> Option<serde_json::Value> {
        let inner = self.inner.lock().expect("cache lock poisoned");
        inner
            .messages
            .get(&(conversation.clone(), id.clone()))
            .cloned()
    }

    /// Look up a known contact by normalized jid.
    pub fn contact(&self, jid: &Jid) -> Option<ContactRecord> {
        let inner = self.inner.lock().expect("cache lock poisoned");
        inner.contacts.get(jid).cloned()
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").order.len()
    }

    /// A lookup closure suitable for handing to the transport.
    pub fn lookup_fn(self: &std::sync::Arc<Self>) -> herald_core::transport::MessageLookup {
        let cache = self.clone();
        std::sync::Arc::new(move |conversation, id| cache.lookup(conversation, id))
    }

    /// Write a durable snapshot if anything changed since the last one.
    /// Temp-then-rename, so a crash mid-flush leaves the previous snapshot
    /// intact.
    pub async fn flush(&self) -> Result<(), CacheError> {
        let snapshot = {
            let mut inner = self.inner.lock().expect("cache lock poisoned");
            if !inner.dirty {
                return Ok(());
            }
            inner.dirty = false;
            Snapshot {
                messages: inner
                    .order
                    .iter()
                    .filter_map(|key| {
                        inner.messages.get(key).map(|payload| CachedMessage {
                            conversation: key.0.clone(),
                            id: key.1.clone(),
                            payload: payload.clone(),
                        })
                    })
                    .collect(),
                contacts: inner.contacts.values().cloned().collect(),
            }
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(&snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            messages = snapshot.messages.len(),
            contacts = snapshot.contacts.len(),
            "flushed event cache snapshot"
        );
        Ok(())
    }

    /// Repopulate from the last snapshot. Called once at startup, before
    /// the transport exists. A missing snapshot is not an error.
    pub async fn load_from_disk(&self) -> Result<(), CacheError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;

        let mut inner = self.inner.lock().expect("cache lock poisoned");
        for message in snapshot.messages {
            let key = (message.conversation, message.id);
            if inner.messages.insert(key.clone(), message.payload).is_none() {
                inner.order.push_back(key);
            }
        }
        for contact in snapshot.contacts {
            inner.contacts.insert(contact.id.clone(), contact);
        }

        info!(
            messages = inner.order.len(),
            contacts = inner.contacts.len(),
            path = %self.path.display(),
            "loaded event cache from disk"
        );
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
