use std::fmt;

use serde::{Deserialize, Serialize};

/// A single chat line observed in (or addressed to) a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    pub channel: String,
}

impl ChatMessage {
    pub fn new(
        sender: impl Into<String>,
        text: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            channel: channel.into(),
        }
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.channel, self.sender, self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Bot => "bot",
        }
    }
}

/// One entry of conversational history, in the shape chat templates expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn bot(content: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_channel_and_sender() {
        let msg = ChatMessage::new("alice", "hi there", "#lobby");
        assert_eq!(msg.to_string(), "[#lobby] alice: hi there");
    }

    #[test]
    fn roles_serialize_lowercase() {
        let turn = ConversationTurn::bot("ok");
        let value = toml::Value::try_from(&turn).unwrap();
        assert_eq!(value.get("role").and_then(|v| v.as_str()), Some("bot"));
        assert_eq!(Role::User.as_str(), "user");
    }
}
