//! Minimal IRC line codec (RFC 1459 framing with IRCv3 message tags).

use super::{normalize_channel, ChatEvent, CommandKind};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IrcParseError {
    #[error("empty line")]
    Empty,
    #[error("missing command in {0:?}")]
    MissingCommand(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    pub nick: String,
    pub user: Option<String>,
    pub host: Option<String>,
}

impl Prefix {
    fn parse(raw: &str) -> Self {
        let (rest, host) = match raw.split_once('@') {
            Some((rest, host)) => (rest, Some(host.to_string())),
            None => (raw, None),
        };
        let (nick, user) = match rest.split_once('!') {
            Some((nick, user)) => (nick.to_string(), Some(user.to_string())),
            None => (rest.to_string(), None),
        };
        Self { nick, user, host }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub tags: Vec<(String, String)>,
    pub prefix: Option<Prefix>,
    pub command: String,
    /// Middle params followed by the trailing param, if any.
    pub params: Vec<String>,
}

impl IrcMessage {
    pub fn parse(line: &str) -> Result<Self, IrcParseError> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        if rest.trim().is_empty() {
            return Err(IrcParseError::Empty);
        }

        let mut tags = Vec::new();
        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw_tags, tail) = stripped.split_once(' ').unwrap_or((stripped, ""));
            tags = raw_tags
                .split(';')
                .filter(|t| !t.is_empty())
                .map(|t| match t.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (t.to_string(), String::new()),
                })
                .collect();
            rest = tail.trim_start();
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (raw_prefix, tail) = stripped.split_once(' ').unwrap_or((stripped, ""));
            prefix = Some(Prefix::parse(raw_prefix));
            rest = tail.trim_start();
        }

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(IrcParseError::MissingCommand(line.to_string()));
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            let (param, tail) = rest.split_once(' ').unwrap_or((rest, ""));
            params.push(param.to_string());
            rest = tail;
        }

        Ok(Self {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn sender(&self) -> &str {
        self.prefix.as_ref().map(|p| p.nick.as_str()).unwrap_or("")
    }

    /// Map to a transport event. Lines without a target (PING, numeric
    /// replies with no params) produce `None`.
    pub fn into_chat_event(self) -> Option<ChatEvent> {
        let channel = self.params.first()?.clone();
        let kind = if self.command == "PRIVMSG" {
            CommandKind::ChannelMessage
        } else {
            CommandKind::Other(self.command.clone())
        };
        let text = if self.params.len() > 1 {
            self.params.last().cloned().unwrap_or_default()
        } else {
            String::new()
        };
        Some(ChatEvent {
            sender: self.sender().to_string(),
            channel,
            text,
            kind,
        })
    }
}

fn sanitize(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

pub fn privmsg(channel: &str, text: &str) -> String {
    format!("PRIVMSG {} :{}", normalize_channel(channel), sanitize(text))
}

pub fn join(channel: &str) -> String {
    format!("JOIN {}", normalize_channel(channel))
}

pub fn pass(token: &str) -> String {
    let token = token.trim();
    if token.starts_with("oauth:") {
        format!("PASS {}", token)
    } else {
        format!("PASS oauth:{}", token)
    }
}

pub fn nick(name: &str) -> String {
    format!("NICK {}", sanitize(name.trim()).to_lowercase())
}

pub fn pong(params: &[String]) -> String {
    match params.last() {
        Some(server) => format!("PONG :{}", server),
        None => "PONG".to_string(),
    }
}
