//! Bounded conversation memory.
//!
//! A fixed-capacity FIFO log of turns shared by the router (to resolve
//! referring expressions) and the orchestrator (to build prompts with
//! recent context). Capacity is counted in raw turns, not exchanges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Default memory capacity in raw turns (5 user/assistant exchanges).
pub const DEFAULT_MEMORY_TURNS: usize = 10;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One message in the conversation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// Fixed-capacity ordered log of turns.
///
/// `append` is the only mutator and is serialized; `window` returns a
/// consistent snapshot and never blocks on external work. Session-scoped:
/// nothing is persisted.
pub struct ConversationMemory {
    turns: Mutex<VecDeque<Turn>>,
    capacity: usize,
}

impl ConversationMemory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a turn, evicting the oldest when at capacity.
    pub fn append(&self, turn: Turn) {
        let mut turns = self.lock();
        if turns.len() == self.capacity {
            turns.pop_front();
        }
        turns.push_back(turn);
    }

    /// Snapshot of the stored turns, oldest first. Never longer than the
    /// configured capacity.
    pub fn window(&self) -> Vec<Turn> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Turn>> {
        // appends never panic mid-mutation, so a poisoned lock is safe to reuse
        self.turns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_TURNS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_never_exceeds_capacity() {
        let memory = ConversationMemory::new(4);
        for i in 0..20 {
            memory.append(Turn::user(format!("question {}", i)));
            assert!(memory.window().len() <= 4);
        }
        assert_eq!(memory.len(), 4);
    }

    #[test]
    fn keeps_most_recent_turns_in_order() {
        let memory = ConversationMemory::new(3);
        for i in 0..5 {
            memory.append(Turn::user(format!("q{}", i)));
        }

        let window = memory.window();
        let texts: Vec<&str> = window.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["q2", "q3", "q4"]);
    }

    #[test]
    fn alternating_roles_preserved() {
        let memory = ConversationMemory::default();
        memory.append(Turn::user("What is agent memory?"));
        memory.append(Turn::assistant("Agent memory stores prior context."));

        let window = memory.window();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].role, Role::User);
        assert_eq!(window[1].role, Role::Assistant);
    }

    #[test]
    fn clear_empties_the_log() {
        let memory = ConversationMemory::new(2);
        memory.append(Turn::user("hello"));
        assert!(!memory.is_empty());
        memory.clear();
        assert!(memory.is_empty());
    }

    #[test]
    fn concurrent_appends_stay_bounded() {
        use std::sync::Arc;
        let memory = Arc::new(ConversationMemory::new(10));
        let mut handles = Vec::new();
        for t in 0..8 {
            let memory = Arc::clone(&memory);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    memory.append(Turn::user(format!("t{}-{}", t, i)));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(memory.len(), 10);
    }
}
