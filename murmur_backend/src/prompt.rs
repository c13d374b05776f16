//! Prompt assembly: bounded history plus the selected message, rendered
//! through a chat template.

use minijinja::{context, Environment, ErrorKind};

use crate::config::PromptSetting;
use crate::history::HistoryTracker;
use crate::message::ConversationTurn;

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("failed to render prompt template: {0}")]
    Render(#[from] minijinja::Error),
}

/// Turns an ordered conversation into a single prompt string.
pub trait PromptFormatter: Send + Sync {
    fn render(&self, turns: &[ConversationTurn]) -> Result<String, PromptError>;
}

/// Renders HuggingFace-style Jinja chat templates.
///
/// The template sees `messages`, `bos_token` and `add_generation_prompt`,
/// plus a `raise_exception` helper that many published templates call.
pub struct JinjaPromptFormatter {
    env: Environment<'static>,
    template: String,
    bos_token: String,
    add_generation_prompt: bool,
}

impl JinjaPromptFormatter {
    pub fn new(
        template: impl Into<String>,
        bos_token: impl Into<String>,
        add_generation_prompt: bool,
    ) -> Self {
        let mut env = Environment::new();
        env.add_function("raise_exception", |message: String| -> Result<String, minijinja::Error> {
            Err(minijinja::Error::new(ErrorKind::InvalidOperation, message))
        });
        Self {
            env,
            template: template.into(),
            bos_token: bos_token.into(),
            add_generation_prompt,
        }
    }

    pub fn from_setting(setting: &PromptSetting) -> Self {
        Self::new(
            setting.prompt_template.clone(),
            setting.bos_token.clone(),
            setting.add_generation_prompt,
        )
    }
}

impl PromptFormatter for JinjaPromptFormatter {
    fn render(&self, turns: &[ConversationTurn]) -> Result<String, PromptError> {
        if turns.is_empty() {
            return Ok(String::new());
        }
        let rendered = self.env.render_str(
            &self.template,
            context! {
                messages => turns,
                bos_token => &self.bos_token,
                add_generation_prompt => self.add_generation_prompt,
            },
        )?;
        Ok(rendered)
    }
}

/// Result of crafting a prompt. `text` is always usable; when rendering
/// failed it is the raw message and `render_error` says why.
#[derive(Debug)]
pub struct CraftedPrompt {
    pub text: String,
    pub render_error: Option<PromptError>,
}

pub struct PromptCrafter {
    formatter: Box<dyn PromptFormatter>,
    lookup_limit: usize,
}

impl PromptCrafter {
    /// `lookup_limit` is in (user, bot) pairs; zero or negative means no history.
    pub fn new(formatter: Box<dyn PromptFormatter>, lookup_limit: i64) -> Self {
        Self {
            formatter,
            lookup_limit: usize::try_from(lookup_limit.max(0)).unwrap_or(usize::MAX),
        }
    }

    /// Recent history (whole pairs) followed by a user turn for `message`.
    pub fn build_turns(&self, history: &HistoryTracker, message: &str) -> Vec<ConversationTurn> {
        let recent = history.recent(self.lookup_limit);
        let mut turns = Vec::with_capacity(recent.len() + 1);
        turns.extend_from_slice(recent);
        turns.push(ConversationTurn::user(message));
        turns
    }

    pub fn craft(&self, history: &HistoryTracker, message: &str) -> CraftedPrompt {
        let turns = self.build_turns(history, message);
        match self.formatter.render(&turns) {
            Ok(text) => CraftedPrompt {
                text,
                render_error: None,
            },
            Err(e) => CraftedPrompt {
                text: message.to_string(),
                render_error: Some(e),
            },
        }
    }
}
