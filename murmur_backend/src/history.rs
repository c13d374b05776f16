use crate::message::ConversationTurn;

/// Conversation log stored as (user, bot) turn pairs.
///
/// Entries are only ever appended two at a time, so the length is always even
/// and any suffix taken on a pair boundary is made of whole pairs.
#[derive(Debug, Clone, Default)]
pub struct HistoryTracker {
    turns: Vec<ConversationTurn>,
}

impl HistoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_pair(&mut self, user: impl Into<String>, bot: impl Into<String>) {
        self.turns.push(ConversationTurn::user(user));
        self.turns.push(ConversationTurn::bot(bot));
    }

    /// The last `pair_limit` pairs, or everything if the history is shorter.
    pub fn recent(&self, pair_limit: usize) -> &[ConversationTurn] {
        let wanted = pair_limit.saturating_mul(2);
        if wanted == 0 || self.turns.len() < 2 {
            return &[];
        }
        let start = self.turns.len().saturating_sub(wanted);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn pair_count(&self) -> usize {
        self.turns.len() / 2
    }
}
