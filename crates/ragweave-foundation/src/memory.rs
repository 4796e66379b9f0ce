//! Conversation memory
//!
//! [`MessageWindowChatMemory`] keeps the most recent messages of one
//! conversation. [`ChatMemoryStore`] holds one window per session id, each
//! behind its own async mutex so that turns of the same session are
//! serialised while distinct sessions never contend.

use dashmap::DashMap;
use ragweave_kernel::rag::{ChatMessage, ChatRole};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub const DEFAULT_MAX_MESSAGES: usize = 10;

/// Bounded FIFO of chat messages.
///
/// A system message is kept apart from the window and is never evicted. A
/// new system message replaces the previous one. It counts against
/// `max_messages`, so `len()` never exceeds the bound.
#[derive(Debug, Clone)]
pub struct MessageWindowChatMemory {
    max_messages: usize,
    system: Option<ChatMessage>,
    messages: VecDeque<ChatMessage>,
}

impl MessageWindowChatMemory {
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages: max_messages.max(1),
            system: None,
            messages: VecDeque::new(),
        }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn add(&mut self, message: ChatMessage) {
        if message.role == ChatRole::System {
            self.system = Some(message);
        } else {
            self.messages.push_back(message);
        }
        self.evict();
    }

    fn evict(&mut self) {
        // The system message occupies one slot of the window.
        let capacity = self.max_messages - usize::from(self.system.is_some());
        while self.messages.len() > capacity {
            self.messages.pop_front();
        }
    }

    /// System message first, then the window oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.system
            .iter()
            .cloned()
            .chain(self.messages.iter().cloned())
            .collect()
    }

    /// The window without the system message.
    pub fn conversation(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len() + usize::from(self.system.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.system = None;
        self.messages.clear();
    }
}

impl Default for MessageWindowChatMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}

/// Per-session chat memories.
#[derive(Debug)]
pub struct ChatMemoryStore {
    max_messages: usize,
    sessions: DashMap<String, Arc<Mutex<MessageWindowChatMemory>>>,
}

impl ChatMemoryStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages,
            sessions: DashMap::new(),
        }
    }

    fn cell(&self, session_id: &str) -> Arc<Mutex<MessageWindowChatMemory>> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(MessageWindowChatMemory::new(self.max_messages)))
            })
            .clone()
    }

    /// Locks one session's memory. Hold the guard for the whole turn.
    pub async fn lock(&self, session_id: &str) -> OwnedMutexGuard<MessageWindowChatMemory> {
        self.cell(session_id).lock_owned().await
    }

    pub async fn messages(&self, session_id: &str) -> Vec<ChatMessage> {
        match self.sessions.get(session_id).map(|cell| cell.value().clone()) {
            Some(cell) => cell.lock().await.messages(),
            None => Vec::new(),
        }
    }

    /// Drops a session. Waits for a turn holding the session's lock to
    /// finish first, so its writes are never lost into a detached window.
    pub async fn remove(&self, session_id: &str) -> bool {
        let Some(cell) = self.sessions.get(session_id).map(|cell| cell.value().clone()) else {
            return false;
        };
        let _turn = cell.lock().await;
        // Another caller may have replaced the session while we waited.
        self.sessions
            .remove_if(session_id, |_, current| Arc::ptr_eq(current, &cell))
            .is_some()
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl Default for ChatMemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}
