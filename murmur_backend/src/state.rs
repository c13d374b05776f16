use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

use crate::history::HistoryTracker;
use crate::window::SampleWindow;

/// Timestamps shared by the ingester and the sampler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchedulerState {
    pub last_message_time: Option<Instant>,
    pub last_sample_time: Option<Instant>,
}

impl SchedulerState {
    /// True when the bot sampled more recently than anyone spoke.
    pub fn is_stalled(&self) -> bool {
        match (self.last_sample_time, self.last_message_time) {
            (Some(sampled), Some(message)) => sampled > message,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// Session-wide mutable state. Each structure has its own lock and no code
/// path holds more than one of them at a time.
#[derive(Clone)]
pub struct SharedState {
    pub window: Arc<Mutex<SampleWindow>>,
    pub history: Arc<Mutex<HistoryTracker>>,
    pub scheduler: Arc<Mutex<SchedulerState>>,
}

impl SharedState {
    pub fn new(window_capacity: usize) -> Self {
        Self {
            window: Arc::new(Mutex::new(SampleWindow::new(window_capacity))),
            history: Arc::new(Mutex::new(HistoryTracker::new())),
            scheduler: Arc::new(Mutex::new(SchedulerState::default())),
        }
    }
}

/// Lock a buffer, recovering the data if a previous holder panicked.
/// The guarded values are plain collections that stay valid mid-update.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stall_requires_a_sample_newer_than_the_last_message() {
        let t0 = Instant::now();
        let mut state = SchedulerState::default();
        assert!(!state.is_stalled());

        state.last_message_time = Some(t0);
        assert!(!state.is_stalled());

        state.last_sample_time = Some(t0 + Duration::from_secs(1));
        assert!(state.is_stalled());

        state.last_message_time = Some(t0 + Duration::from_secs(2));
        assert!(!state.is_stalled());
    }

    #[test]
    fn sample_without_any_chat_counts_as_stalled() {
        let state = SchedulerState {
            last_message_time: None,
            last_sample_time: Some(Instant::now()),
        };
        assert!(state.is_stalled());
    }
}
