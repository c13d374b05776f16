use anyhow::Result;
use async_trait::async_trait;

use crate::message::ChatMessage;

/// Produces the reply body for a crafted prompt.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, target: &ChatMessage) -> Result<String>;
}

/// Placeholder backend: replies with the text it was asked to answer.
#[derive(Debug, Default)]
pub struct EchoReply;

#[async_trait]
impl ReplyGenerator for EchoReply {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, _prompt: &str, target: &ChatMessage) -> Result<String> {
        Ok(target.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_returns_the_target_text() {
        let target = ChatMessage::new("u", "say this", "#c");
        let body = EchoReply.generate("<prompt>", &target).await.unwrap();
        assert_eq!(body, "say this");
    }
}
