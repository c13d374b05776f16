use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use crate::config::BotConfig;
use crate::dispatcher::Dispatcher;
use crate::generate::{EchoReply, ReplyGenerator};
use crate::ingest::MessageIngester;
use crate::prompt::{JinjaPromptFormatter, PromptCrafter, PromptFormatter};
use crate::queue::reply_queue;
use crate::sampler::{SamplerSettings, StallAwareSampler};
use crate::state::SharedState;
use crate::transport::{ChatSender, ChatTransport};

/// Buffer between the transport's read loop and the ingestion stage.
const INGEST_CHANNEL_SIZE: usize = 256;

/// One bot session: shared state plus the transport it talks through.
pub struct ChatbotRuntime {
    config: BotConfig,
    transport: Arc<dyn ChatTransport>,
    sender: Arc<dyn ChatSender>,
    formatter: Box<dyn PromptFormatter>,
    generator: Box<dyn ReplyGenerator>,
    rng: StdRng,
    state: SharedState,
}

pub struct ChatbotRuntimeBuilder {
    config: BotConfig,
    transport: Arc<dyn ChatTransport>,
    sender: Arc<dyn ChatSender>,
    formatter: Option<Box<dyn PromptFormatter>>,
    generator: Option<Box<dyn ReplyGenerator>>,
    seed: Option<u64>,
}

impl ChatbotRuntimeBuilder {
    pub fn new<T>(config: BotConfig, transport: Arc<T>) -> Self
    where
        T: ChatTransport + 'static,
    {
        let sender: Arc<dyn ChatSender> = transport.clone();
        Self {
            config,
            transport,
            sender,
            formatter: None,
            generator: None,
            seed: None,
        }
    }

    pub fn with_formatter(mut self, formatter: Box<dyn PromptFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn with_generator(mut self, generator: Box<dyn ReplyGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Fix the sampling RNG seed (reproducible runs and tests).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<ChatbotRuntime> {
        self.config.validate().context("Invalid bot configuration")?;

        let formatter = self.formatter.unwrap_or_else(|| {
            Box::new(JinjaPromptFormatter::from_setting(
                &self.config.chatbot_setting.llm_setting.prompt_setting,
            ))
        });
        let generator = self.generator.unwrap_or_else(|| Box::new(EchoReply));
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = SharedState::new(
            self.config
                .chatbot_setting
                .reply_setting
                .message_sample_queue_size,
        );

        tracing::info!(
            "Built chatbot runtime (transport: {}, generator: {}, channels: {:?})",
            self.transport.name(),
            generator.name(),
            self.config.twitch_irc.join_channels
        );

        Ok(ChatbotRuntime {
            config: self.config,
            transport: self.transport,
            sender: self.sender,
            formatter,
            generator,
            rng,
            state,
        })
    }
}

impl ChatbotRuntime {
    pub fn bootstrap<T>(config: BotConfig, transport: Arc<T>) -> Result<Self>
    where
        T: ChatTransport + 'static,
    {
        ChatbotRuntimeBuilder::new(config, transport).build()
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Run the session until the transport exits or `cancel` fires.
    ///
    /// Whatever ends the transport also stops the ingestion stage, the
    /// sampler and the dispatcher; their in-flight work finishes first.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let reply_setting = &self.config.chatbot_setting.reply_setting;
        let session = cancel.child_token();

        let (event_tx, event_rx) = flume::bounded(INGEST_CHANNEL_SIZE);
        let (reply_tx, reply_rx) = reply_queue(reply_setting.reply_queue_size);

        let ingester = MessageIngester::new(
            self.config.twitch_irc.effective_display_name(),
            reply_setting.reply_mention,
            self.state.clone(),
            reply_tx.clone(),
        );
        let sampler = StallAwareSampler::new(
            SamplerSettings::from(reply_setting),
            self.state.clone(),
            reply_tx,
            self.rng,
        );
        let crafter = PromptCrafter::new(
            self.formatter,
            self.config.chatbot_setting.llm_setting.max_context_size,
        );
        let dispatcher = Dispatcher::new(
            crafter,
            self.generator,
            self.sender.clone(),
            self.state.history.clone(),
        )
        .with_spacing(Duration::from_millis(reply_setting.dispatch_spacing_millis));

        let tasks = vec![
            tokio::spawn(ingester.run(event_rx, session.clone())),
            tokio::spawn(sampler.run(session.clone())),
            tokio::spawn(dispatcher.run(reply_rx, session.clone())),
        ];

        for channel in &self.config.twitch_irc.join_channels {
            if let Err(e) = self.transport.join_channel(channel) {
                tracing::warn!("Failed to queue join for {}: {}", channel, e);
            }
        }

        let result = self.transport.run(event_tx, session.clone()).await;
        match &result {
            Ok(()) => tracing::info!("{} transport exited", self.transport.name()),
            Err(e) => tracing::error!("{} transport failed: {:#}", self.transport.name(), e),
        }

        session.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("Session task panicked: {}", e);
            }
        }
        tracing::info!("Session ended");

        result.with_context(|| format!("{} transport ended the session", self.transport.name()))
    }
}
