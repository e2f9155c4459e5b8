//! Conversation timeline store.
//!
//! Holds the ordered messages of the active session. Every mutation bumps a
//! revision counter published on a [`watch`] channel; the rendering surface
//! subscribes to it to re-render and scroll.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::debug;

use crate::message::{IdGenerator, Message, MessageId, GREETING};

/// Shared, observable conversation timeline.
#[derive(Debug)]
pub struct TimelineStore {
    messages: Mutex<Vec<Message>>,
    ids: Arc<IdGenerator>,
    greeting: String,
    revision: watch::Sender<u64>,
}

impl TimelineStore {
    /// Create a timeline holding only the default greeting.
    pub fn new(ids: Arc<IdGenerator>) -> Self {
        Self::with_greeting(ids, GREETING)
    }

    /// Create a timeline holding only a custom greeting.
    pub fn with_greeting(ids: Arc<IdGenerator>, greeting: impl Into<String>) -> Self {
        let greeting = greeting.into();
        let first = Message::greeting(ids.next_id(), greeting.clone());
        let (revision, _) = watch::channel(0);
        Self {
            messages: Mutex::new(vec![first]),
            ids,
            greeting,
            revision,
        }
    }

    /// Id generator shared with the orchestrator.
    pub fn ids(&self) -> &Arc<IdGenerator> {
        &self.ids
    }

    /// Append several entries as one update.
    ///
    /// Observers never see a prefix of `entries` without the rest.
    pub fn append(&self, entries: Vec<Message>) {
        if entries.is_empty() {
            return;
        }
        {
            let mut messages = self.lock();
            messages.extend(entries);
        }
        self.bump();
    }

    /// Swap the entry with `id` in place. Returns false if it is gone.
    pub fn replace(&self, id: MessageId, message: Message) -> bool {
        let replaced = {
            let mut messages = self.lock();
            match messages.iter_mut().find(|m| m.id == id) {
                Some(slot) => {
                    *slot = message;
                    true
                }
                None => false,
            }
        };
        if replaced {
            self.bump();
        } else {
            debug!(message_id = %id, "Replace skipped, message no longer in timeline");
        }
        replaced
    }

    /// Discard every entry and start over with a fresh greeting.
    pub fn reset(&self) {
        let greeting = Message::greeting(self.ids.next_id(), self.greeting.clone());
        {
            let mut messages = self.lock();
            messages.clear();
            messages.push(greeting);
        }
        self.bump();
    }

    /// Whether an entry with `id` exists.
    pub fn contains(&self, id: MessageId) -> bool {
        self.lock().iter().any(|m| m.id == id)
    }

    /// Clone of the entry with `id`.
    pub fn get(&self, id: MessageId) -> Option<Message> {
        self.lock().iter().find(|m| m.id == id).cloned()
    }

    /// Clone of every entry in display order.
    pub fn snapshot(&self) -> Vec<Message> {
        self.lock().clone()
    }

    /// Ids of bot messages still waiting on their backends.
    pub fn loading_ids(&self) -> Vec<MessageId> {
        self.lock()
            .iter()
            .filter(|m| m.loading)
            .map(|m| m.id)
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the timeline has no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Current revision (bumped on every mutation).
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Message>> {
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
