//! Bounded recency window of observed chat.

use std::collections::VecDeque;

use rand::Rng;

use crate::message::ChatMessage;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SampleError {
    #[error("sample window is empty")]
    EmptyWindow,
}

/// Fixed-capacity FIFO of the most recent chat messages.
///
/// Insertion order is arrival order. Once full, every push evicts the oldest
/// entry, so the window always holds the latest `capacity` messages.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a message, returning the evicted one if the window overflowed.
    pub fn push(&mut self, msg: ChatMessage) -> Option<ChatMessage> {
        self.messages.push_back(msg);
        if self.messages.len() > self.capacity {
            self.messages.pop_front()
        } else {
            None
        }
    }

    /// Pick one message uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<ChatMessage, SampleError> {
        if self.messages.is_empty() {
            return Err(SampleError::EmptyWindow);
        }
        let index = rng.gen_range(0..self.messages.len());
        Ok(self.messages[index].clone())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn msg(text: &str) -> ChatMessage {
        ChatMessage::new("viewer", text, "#c")
    }

    fn texts(window: &SampleWindow) -> Vec<&str> {
        window.iter().map(|m| m.text.as_str()).collect()
    }

    #[test]
    fn keeps_most_recent_messages_in_arrival_order() {
        let mut window = SampleWindow::new(3);
        for text in ["A", "B", "C", "D"] {
            window.push(msg(text));
        }
        assert_eq!(texts(&window), vec!["B", "C", "D"]);
    }

    #[test]
    fn overflow_evicts_exactly_the_oldest() {
        let mut window = SampleWindow::new(2);
        assert!(window.push(msg("first")).is_none());
        assert!(window.push(msg("second")).is_none());
        let evicted = window.push(msg("third")).unwrap();
        assert_eq!(evicted.text, "first");
        assert_eq!(texts(&window), vec!["second", "third"]);
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let mut window = SampleWindow::new(5);
        for i in 0..50 {
            window.push(msg(&i.to_string()));
            assert!(window.len() <= 5);
        }
        assert_eq!(texts(&window), vec!["45", "46", "47", "48", "49"]);
    }

    #[test]
    fn sampling_empty_window_reports_empty() {
        let window = SampleWindow::new(3);
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(window.sample(&mut rng), Err(SampleError::EmptyWindow));
    }

    #[test]
    fn sampling_returns_a_member_of_the_window() {
        let mut window = SampleWindow::new(4);
        for text in ["w", "x", "y", "z"] {
            window.push(msg(text));
        }
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let picked = window.sample(&mut rng).unwrap();
            assert!(window.iter().any(|m| m == &picked));
        }
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let mut window = SampleWindow::new(10);
        for i in 0..10 {
            window.push(msg(&i.to_string()));
        }
        let picks = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..8)
                .map(|_| window.sample(&mut rng).unwrap().text)
                .collect::<Vec<_>>()
        };
        assert_eq!(picks(3), picks(3));
    }
}
