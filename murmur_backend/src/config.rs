use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::queue::DEFAULT_REPLY_QUEUE_SIZE;

const CONFIG_FILE_NAME: &str = "murmur.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TwitchIrcConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Name viewers use when mentioning the bot. Falls back to `username`.
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub join_channels: Vec<String>,
}

impl Default for TwitchIrcConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            username: String::new(),
            password: String::new(),
            display_name: None,
            join_channels: Vec::new(),
        }
    }
}

impl TwitchIrcConfig {
    pub fn effective_display_name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.trim(),
            _ => &self.username,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReplySetting {
    #[serde(default = "default_true")]
    pub reply_mention: bool,
    #[serde(default = "default_reply_min_delay")]
    pub reply_min_delay_seconds: u64,
    #[serde(default = "default_reply_max_delay")]
    pub reply_max_delay_seconds: u64,
    #[serde(default = "default_sample_queue_size")]
    pub message_sample_queue_size: usize,
    #[serde(default = "default_min_stall_delay")]
    pub reply_min_chat_stall_delay_seconds: u64,
    #[serde(default = "default_max_stall_delay")]
    pub reply_max_chat_stall_delay_seconds: u64,
    #[serde(default = "default_reply_queue_size")]
    pub reply_queue_size: usize,
    /// Floor between two consecutive sends, regardless of sampler cadence.
    #[serde(default = "default_dispatch_spacing_millis")]
    pub dispatch_spacing_millis: u64,
    #[serde(default = "default_sampler_poll_interval_millis")]
    pub sampler_poll_interval_millis: u64,
}

impl Default for ReplySetting {
    fn default() -> Self {
        Self {
            reply_mention: true,
            reply_min_delay_seconds: default_reply_min_delay(),
            reply_max_delay_seconds: default_reply_max_delay(),
            message_sample_queue_size: default_sample_queue_size(),
            reply_min_chat_stall_delay_seconds: default_min_stall_delay(),
            reply_max_chat_stall_delay_seconds: default_max_stall_delay(),
            reply_queue_size: default_reply_queue_size(),
            dispatch_spacing_millis: default_dispatch_spacing_millis(),
            sampler_poll_interval_millis: default_sampler_poll_interval_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PromptSetting {
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
    #[serde(default)]
    pub bos_token: String,
    #[serde(default = "default_true")]
    pub add_generation_prompt: bool,
}

impl Default for PromptSetting {
    fn default() -> Self {
        Self {
            prompt_template: default_prompt_template(),
            bos_token: String::new(),
            add_generation_prompt: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LlmSetting {
    #[serde(default)]
    pub prompt_setting: PromptSetting,
    /// Number of (user, bot) pairs of history fed into each prompt.
    /// Zero or negative feeds none.
    #[serde(default = "default_max_context_size")]
    pub max_context_size: i64,
}

impl Default for LlmSetting {
    fn default() -> Self {
        Self {
            prompt_setting: PromptSetting::default(),
            max_context_size: default_max_context_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChatbotSetting {
    #[serde(default)]
    pub reply_setting: ReplySetting,
    #[serde(default)]
    pub llm_setting: LlmSetting,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    #[serde(default)]
    pub twitch_irc: TwitchIrcConfig,
    #[serde(default)]
    pub chatbot_setting: ChatbotSetting,
}

fn default_server_url() -> String {
    "wss://irc-ws.chat.twitch.tv:443".to_string()
}

fn default_true() -> bool {
    true
}

fn default_reply_min_delay() -> u64 {
    5
}

fn default_reply_max_delay() -> u64 {
    15
}

fn default_sample_queue_size() -> usize {
    10
}

fn default_min_stall_delay() -> u64 {
    30
}

fn default_max_stall_delay() -> u64 {
    90
}

fn default_reply_queue_size() -> usize {
    DEFAULT_REPLY_QUEUE_SIZE
}

fn default_dispatch_spacing_millis() -> u64 {
    1000
}

fn default_sampler_poll_interval_millis() -> u64 {
    250
}

fn default_max_context_size() -> i64 {
    5
}

fn default_prompt_template() -> String {
    "{{ bos_token }}{% for message in messages %}<|{{ message.role }}|>\n{{ message.content }}\n{% endfor %}{% if add_generation_prompt %}<|bot|>\n{% endif %}"
        .to_string()
}

impl BotConfig {
    /// Candidate locations searched when no explicit path is given.
    pub fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("murmur").join("config.toml"));
        }
        paths
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config")
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file {:?}", path))?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load from `path` if given, otherwise from the first default location
    /// that exists, otherwise defaults. Environment overrides apply last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => match Self::default_search_paths().into_iter().find(|p| p.is_file()) {
                Some(found) => Self::load_from(&found)?,
                None => {
                    tracing::warn!("No config file found, using defaults + env vars");
                    Self::default()
                }
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, toml_string)
            .with_context(|| format!("Failed to write config to {:?}", path))?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(username) = env::var("MURMUR_TWITCH_USERNAME") {
            if !username.trim().is_empty() {
                self.twitch_irc.username = username.trim().to_string();
            }
        }

        if let Ok(password) = env::var("MURMUR_TWITCH_PASSWORD") {
            if !password.trim().is_empty() {
                self.twitch_irc.password = password.trim().to_string();
            }
        }

        if let Ok(name) = env::var("MURMUR_DISPLAY_NAME") {
            if !name.trim().is_empty() {
                self.twitch_irc.display_name = Some(name.trim().to_string());
            }
        }

        if let Ok(channels) = env::var("MURMUR_JOIN_CHANNELS") {
            let channels: Vec<String> = channels
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
            if !channels.is_empty() {
                self.twitch_irc.join_channels = channels;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let reply = &self.chatbot_setting.reply_setting;

        if self.twitch_irc.username.trim().is_empty() {
            bail!("twitch-irc.username must be set");
        }
        if reply.message_sample_queue_size == 0 {
            bail!("message-sample-queue-size must be at least 1");
        }
        if reply.reply_queue_size == 0 {
            bail!("reply-queue-size must be at least 1");
        }
        if reply.dispatch_spacing_millis == 0 {
            bail!("dispatch-spacing-millis must be at least 1");
        }
        if reply.sampler_poll_interval_millis == 0 {
            bail!("sampler-poll-interval-millis must be at least 1");
        }
        if reply.reply_min_delay_seconds > reply.reply_max_delay_seconds {
            bail!(
                "reply-min-delay-seconds ({}) exceeds reply-max-delay-seconds ({})",
                reply.reply_min_delay_seconds,
                reply.reply_max_delay_seconds
            );
        }
        if reply.reply_min_chat_stall_delay_seconds > reply.reply_max_chat_stall_delay_seconds {
            bail!(
                "reply-min-chat-stall-delay-seconds ({}) exceeds reply-max-chat-stall-delay-seconds ({})",
                reply.reply_min_chat_stall_delay_seconds,
                reply.reply_max_chat_stall_delay_seconds
            );
        }
        Ok(())
    }
}
