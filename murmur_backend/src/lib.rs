//! Reply scheduling core for a channel chat bot.
//!
//! Chat flows in through a [`transport::ChatTransport`], lands in a bounded
//! [`window::SampleWindow`], and is picked for replies either directly (the
//! bot was mentioned) or by the [`sampler::StallAwareSampler`]. Replies are
//! serialized by the [`dispatcher::Dispatcher`] through a bounded
//! [`queue`], with prompt context assembled by [`prompt::PromptCrafter`].

pub mod config;
pub mod dispatcher;
pub mod generate;
pub mod history;
pub mod ingest;
pub mod message;
pub mod prompt;
pub mod queue;
pub mod runtime;
pub mod sampler;
pub mod state;
pub mod transport;
pub mod window;
