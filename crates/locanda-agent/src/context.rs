// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user conversation contexts.
//!
//! [`ContextManager`] holds the append-only message history for one user,
//! with a pre-call transform hook (defaults to keep-last-N) and an append
//! observer used for session recording. [`ContextTable`] lazily creates one
//! manager per user and is the runtime's [`ContextInjector`] implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use locanda_core::{ContextInjector, Message};
use locanda_session::SessionStore;

/// Default history ceiling before the pre-call transform trims.
pub const DEFAULT_MAX_MESSAGES: usize = 40;

type Transform = Box<dyn Fn(&[Message]) -> Vec<Message> + Send + Sync>;
type Observer = Box<dyn Fn(&Message) + Send + Sync>;

/// Ordered message history for a single user.
///
/// No operation fails; the observer is invoked synchronously on append,
/// before any subsequent `prepare` can observe the new message.
pub struct ContextManager {
    messages: Vec<Message>,
    max_messages: usize,
    transform: Option<Transform>,
    observer: Option<Observer>,
}

impl ContextManager {
    pub fn new(max_messages: usize) -> Self {
        let max_messages = if max_messages == 0 {
            DEFAULT_MAX_MESSAGES
        } else {
            max_messages
        };
        Self {
            messages: Vec::new(),
            max_messages,
            transform: None,
            observer: None,
        }
    }

    /// Replaces the pre-call transform. When unset, `prepare` returns the
    /// trailing suffix of length `max_messages`.
    pub fn set_transform(&mut self, transform: impl Fn(&[Message]) -> Vec<Message> + Send + Sync + 'static) {
        self.transform = Some(Box::new(transform));
    }

    /// Sets the append observer. Absent observer means no recording.
    pub fn set_observer(&mut self, observer: impl Fn(&Message) + Send + Sync + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn append(&mut self, msg: Message) {
        if let Some(observer) = &self.observer {
            observer(&msg);
        }
        self.messages.push(msg);
    }

    /// The view to pass to the model: the transform applied to the full
    /// history.
    pub fn prepare(&self) -> Vec<Message> {
        match &self.transform {
            Some(transform) => transform(&self.messages),
            None => {
                if self.messages.len() <= self.max_messages {
                    self.messages.clone()
                } else {
                    self.messages[self.messages.len() - self.max_messages..].to_vec()
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }

    /// Defensive copy of the last `n` messages, for crash recovery.
    pub fn snapshot(&self, n: usize) -> Vec<Message> {
        let start = self.messages.len().saturating_sub(n);
        self.messages[start..].to_vec()
    }

    /// Prepends a previously captured prefix.
    pub fn restore(&mut self, prefix: Vec<Message>) {
        let mut restored = prefix;
        restored.append(&mut self.messages);
        self.messages = restored;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Lazily created per-user contexts, shared between the dispatcher and the
/// tool-facing injection capability.
pub struct ContextTable {
    max_messages: usize,
    session: Option<Arc<SessionStore>>,
    contexts: Mutex<HashMap<i64, Arc<Mutex<ContextManager>>>>,
}

impl ContextTable {
    pub fn new(max_messages: usize, session: Option<Arc<SessionStore>>) -> Self {
        Self {
            max_messages,
            session,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the context for `user_id`, creating it on first access. When
    /// a session store is configured, the new context records every
    /// appended message.
    pub fn context_for(&self, user_id: i64) -> Arc<Mutex<ContextManager>> {
        let mut contexts = self
            .contexts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(ctx) = contexts.get(&user_id) {
            return ctx.clone();
        }
        let mut manager = ContextManager::new(self.max_messages);
        if let Some(store) = &self.session {
            let store = store.clone();
            manager.set_observer(move |msg| store.record(user_id, msg));
        }
        let ctx = Arc::new(Mutex::new(manager));
        contexts.insert(user_id, ctx.clone());
        ctx
    }

    /// Defensive copy of the last `n` messages for `user_id` (empty when the
    /// user has no context yet).
    pub fn snapshot(&self, user_id: i64, n: usize) -> Vec<Message> {
        self.context_for(user_id)
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .snapshot(n)
    }
}

impl ContextInjector for ContextTable {
    fn inject(&self, user_id: i64, msg: Message) {
        self.context_for(user_id)
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .append(msg);
    }
}
