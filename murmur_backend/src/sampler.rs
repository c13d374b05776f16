//! Stall-aware sampling loop.
//!
//! Every cycle the sampler may pick one recent message at random and queue a
//! reply to it. Once the bot has sampled more recently than anyone has
//! spoken, further samples wait out a random stall delay so the bot does not
//! keep talking to itself in a quiet channel.

use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::ReplySetting;
use crate::message::ChatMessage;
use crate::queue::{EnqueueOutcome, ReplySender};
use crate::state::{lock, SharedState};
use crate::window::SampleError;

#[derive(Debug, Clone)]
pub struct SamplerSettings {
    pub min_reply_delay_secs: u64,
    pub max_reply_delay_secs: u64,
    pub min_stall_delay_secs: u64,
    pub max_stall_delay_secs: u64,
    /// Pause after a skipped cycle before checking again.
    pub poll_interval: Duration,
}

impl From<&ReplySetting> for SamplerSettings {
    fn from(setting: &ReplySetting) -> Self {
        Self {
            min_reply_delay_secs: setting.reply_min_delay_seconds,
            max_reply_delay_secs: setting.reply_max_delay_seconds,
            min_stall_delay_secs: setting.reply_min_chat_stall_delay_seconds,
            max_stall_delay_secs: setting.reply_max_chat_stall_delay_seconds,
            poll_interval: Duration::from_millis(setting.sampler_poll_interval_millis),
        }
    }
}

/// Whole seconds in `[min, min + span)`, where `span = max - min` and an empty
/// span counts as 1 so equal bounds always yield `min`.
pub fn draw_delay<R: Rng + ?Sized>(rng: &mut R, min_secs: u64, max_secs: u64) -> Duration {
    let span = max_secs.saturating_sub(min_secs).max(1);
    Duration::from_secs(min_secs + rng.gen_range(0..span))
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleDecision {
    /// Chat is quiet and the stall delay has not elapsed yet.
    StallThrottled,
    EmptyWindow,
    Sampled {
        message: ChatMessage,
        outcome: EnqueueOutcome,
        reply_delay: Duration,
        during_stall: bool,
    },
}

pub struct StallAwareSampler<R> {
    settings: SamplerSettings,
    state: SharedState,
    replies: ReplySender,
    rng: R,
}

impl<R: Rng + Send> StallAwareSampler<R> {
    pub fn new(settings: SamplerSettings, state: SharedState, replies: ReplySender, rng: R) -> Self {
        Self {
            settings,
            state,
            replies,
            rng,
        }
    }

    /// One scheduling decision at time `now`.
    ///
    /// The stall delay is redrawn on every call, whether or not the previous
    /// cycle was throttled.
    pub fn run_cycle(&mut self, now: Instant) -> CycleDecision {
        let (stalled, last_sample) = {
            let scheduler = lock(&self.state.scheduler);
            (scheduler.is_stalled(), scheduler.last_sample_time)
        };

        let stall_delay = draw_delay(
            &mut self.rng,
            self.settings.min_stall_delay_secs,
            self.settings.max_stall_delay_secs,
        );

        if stalled {
            if let Some(last_sample) = last_sample {
                if now.saturating_duration_since(last_sample) < stall_delay {
                    return CycleDecision::StallThrottled;
                }
            }
        }

        let sampled = {
            let window = lock(&self.state.window);
            window.sample(&mut self.rng)
        };
        let message = match sampled {
            Ok(message) => message,
            Err(SampleError::EmptyWindow) => return CycleDecision::EmptyWindow,
        };

        let outcome = self.replies.try_enqueue(message.clone());
        if stalled {
            tracing::debug!("Sampled during stall: {}", message);
        } else {
            tracing::debug!("Sampled: {}", message);
        }

        let reply_delay = draw_delay(
            &mut self.rng,
            self.settings.min_reply_delay_secs,
            self.settings.max_reply_delay_secs,
        );

        lock(&self.state.scheduler).last_sample_time = Some(now);

        CycleDecision::Sampled {
            message,
            outcome,
            reply_delay,
            during_stall: stalled,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            "Sampler started (reply delay {}-{}s, stall delay {}-{}s)",
            self.settings.min_reply_delay_secs,
            self.settings.max_reply_delay_secs,
            self.settings.min_stall_delay_secs,
            self.settings.max_stall_delay_secs
        );

        while !cancel.is_cancelled() {
            let pause = match self.run_cycle(Instant::now()) {
                CycleDecision::Sampled { reply_delay, .. } if !reply_delay.is_zero() => reply_delay,
                _ => self.settings.poll_interval,
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(pause) => {}
            }
        }

        tracing::info!("Sampler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{reply_queue, ReplyReceiver};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn settings(reply: (u64, u64), stall: (u64, u64)) -> SamplerSettings {
        SamplerSettings {
            min_reply_delay_secs: reply.0,
            max_reply_delay_secs: reply.1,
            min_stall_delay_secs: stall.0,
            max_stall_delay_secs: stall.1,
            poll_interval: Duration::from_millis(250),
        }
    }

    fn sampler(
        settings: SamplerSettings,
        seed: u64,
    ) -> (StallAwareSampler<StdRng>, ReplyReceiver, SharedState) {
        let state = SharedState::new(5);
        let (tx, rx) = reply_queue(10);
        let sampler = StallAwareSampler::new(settings, state.clone(), tx, StdRng::seed_from_u64(seed));
        (sampler, rx, state)
    }

    fn observe(state: &SharedState, text: &str, at: Instant) {
        lock(&state.window).push(ChatMessage::new("viewer", text, "#c"));
        lock(&state.scheduler).last_message_time = Some(at);
    }

    #[test]
    fn equal_bounds_fall_back_to_unit_span() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            assert_eq!(draw_delay(&mut rng, 7, 7), Duration::from_secs(7));
            assert_eq!(draw_delay(&mut rng, 0, 0), Duration::ZERO);
        }
    }

    #[test]
    fn delays_stay_within_bounds() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..500 {
            let delay = draw_delay(&mut rng, 3, 9).as_secs();
            assert!((3..9).contains(&delay));
        }
    }

    #[test]
    fn empty_window_is_a_quiet_no_op() {
        let (mut sampler, rx, state) = sampler(settings((1, 2), (5, 10)), 3);
        assert_eq!(sampler.run_cycle(Instant::now()), CycleDecision::EmptyWindow);
        assert!(rx.is_empty());
        assert!(lock(&state.scheduler).last_sample_time.is_none());
    }

    #[test]
    fn active_chat_is_sampled_and_queued() {
        let (mut sampler, rx, state) = sampler(settings((4, 4), (5, 10)), 4);
        let t0 = Instant::now();
        observe(&state, "hello", t0);

        let decision = sampler.run_cycle(t0 + Duration::from_secs(1));
        match decision {
            CycleDecision::Sampled {
                message,
                outcome,
                reply_delay,
                during_stall,
            } => {
                assert_eq!(message.text, "hello");
                assert_eq!(outcome, EnqueueOutcome::Queued);
                assert_eq!(reply_delay, Duration::from_secs(4));
                assert!(!during_stall);
            }
            other => panic!("unexpected decision {:?}", other),
        }
        assert_eq!(rx.try_recv().unwrap().target.text, "hello");
        assert_eq!(
            lock(&state.scheduler).last_sample_time,
            Some(t0 + Duration::from_secs(1))
        );
    }

    #[test]
    fn quiet_chat_is_throttled_until_stall_delay_passes() {
        let (mut sampler, rx, state) = sampler(settings((1, 1), (10, 10)), 5);
        let t0 = Instant::now();
        observe(&state, "only message", t0);

        let first = t0 + Duration::from_secs(1);
        assert!(matches!(sampler.run_cycle(first), CycleDecision::Sampled { .. }));

        // Nobody spoke since: stalled, and 10s have not passed.
        assert_eq!(
            sampler.run_cycle(first + Duration::from_secs(9)),
            CycleDecision::StallThrottled
        );

        match sampler.run_cycle(first + Duration::from_secs(10)) {
            CycleDecision::Sampled { during_stall, .. } => assert!(during_stall),
            other => panic!("unexpected decision {:?}", other),
        }
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn new_chat_lifts_the_stall() {
        let (mut sampler, _rx, state) = sampler(settings((1, 1), (60, 60)), 6);
        let t0 = Instant::now();
        observe(&state, "one", t0);
        let first = t0 + Duration::from_secs(1);
        sampler.run_cycle(first);

        observe(&state, "two", first + Duration::from_secs(1));
        assert!(matches!(
            sampler.run_cycle(first + Duration::from_secs(2)),
            CycleDecision::Sampled { during_stall: false, .. }
        ));
    }

    #[test]
    fn same_seed_gives_same_choices() {
        let run = |seed| {
            let (mut sampler, rx, state) = sampler(settings((0, 0), (0, 0)), seed);
            let t0 = Instant::now();
            for text in ["a", "b", "c", "d", "e"] {
                observe(&state, text, t0);
            }
            for i in 0..10 {
                sampler.run_cycle(t0 + Duration::from_secs(i + 1));
            }
            std::iter::from_fn(|| rx.try_recv())
                .map(|r| r.target.text)
                .collect::<Vec<_>>()
        };
        let first = run(99);
        assert_eq!(first.len(), 10);
        assert_eq!(first, run(99));
    }

    #[tokio::test(start_paused = true)]
    async fn loop_waits_reply_delay_between_samples() {
        let (sampler, rx, state) = sampler(settings((5, 5), (0, 0)), 7);
        observe(&state, "hi", Instant::now());

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sampler.run(cancel.clone()));

        sleep(Duration::from_secs(12)).await;
        // Samples at t=0, 5 and 10.
        assert_eq!(rx.len(), 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn loop_exits_promptly_on_cancel() {
        let (sampler, _rx, _state) = sampler(settings((100, 200), (100, 200)), 8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sampler.run(cancel.clone()));
        sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
