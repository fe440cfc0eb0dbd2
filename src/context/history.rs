//! Bounded conversation history
//!
//! Size is approximated by whitespace-delimited word count. Eviction is
//! strictly FIFO, one turn at a time, until the total fits the budget.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in the history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

/// Ordered turns kept within a word budget
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<ConversationTurn>,
    max_tokens: usize,
}

impl ConversationHistory {
    /// Create an empty history with a word budget
    #[must_use]
    pub fn new(max_tokens: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_tokens,
        }
    }

    /// Add a turn; call [`truncate`](Self::truncate) to enforce the budget
    pub fn append(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push_back(ConversationTurn::new(role, text));
    }

    /// Evict the oldest turns until the word count fits
    ///
    /// Returns the number of turns removed.
    pub fn truncate(&mut self) -> usize {
        let mut total = self.word_count();
        let mut removed = 0;

        while total > self.max_tokens {
            let Some(oldest) = self.turns.pop_front() else {
                break;
            };
            total -= oldest.word_count();
            removed += 1;
        }

        if removed > 0 {
            tracing::debug!(removed, remaining = self.turns.len(), words = total, "truncated history");
        }
        removed
    }

    /// Total words across all turns
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.turns.iter().map(ConversationTurn::word_count).sum()
    }

    /// Turns, oldest first
    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    #[must_use]
    pub const fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
