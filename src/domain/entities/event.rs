use chrono::{DateTime, Utc};
use std::fmt;

/// Origin of an inbound line: a user mask or a server name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    User {
        nick: String,
        user: Option<String>,
        host: Option<String>,
    },
    Server(String),
}

impl Source {
    /// Parse a prefix without its leading colon
    pub fn parse(raw: &str) -> Self {
        if let Some((nick, rest)) = raw.split_once('!') {
            let (user, host) = match rest.split_once('@') {
                Some((user, host)) => (user.to_string(), Some(host.to_string())),
                None => (rest.to_string(), None),
            };
            return Source::User {
                nick: nick.to_string(),
                user: Some(user),
                host,
            };
        }

        if let Some((nick, host)) = raw.split_once('@') {
            return Source::User {
                nick: nick.to_string(),
                user: None,
                host: Some(host.to_string()),
            };
        }

        // Bare prefixes with a dot are server names; nicknames cannot contain one
        if raw.contains('.') {
            Source::Server(raw.to_string())
        } else {
            Source::User {
                nick: raw.to_string(),
                user: None,
                host: None,
            }
        }
    }

    pub fn nick(&self) -> Option<&str> {
        match self {
            Source::User { nick, .. } => Some(nick),
            Source::Server(_) => None,
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, Source::Server(_))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Server(name) => write!(f, "{}", name),
            Source::User { nick, user, host } => {
                write!(f, "{}", nick)?;
                if let Some(user) = user {
                    write!(f, "!{}", user)?;
                }
                if let Some(host) = host {
                    write!(f, "@{}", host)?;
                }
                Ok(())
            }
        }
    }
}

/// One parsed inbound protocol line
#[derive(Debug, Clone)]
pub struct ProtocolEvent {
    pub tags: Vec<(String, Option<String>)>,
    pub source: Option<Source>,
    /// Upper-cased verb or three-digit numeric
    pub command: String,
    /// Middle parameters, trailing excluded
    pub params: Vec<String>,
    pub trailing: Option<String>,
    pub raw: String,
    pub received_at: DateTime<Utc>,
}

impl ProtocolEvent {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            tags: Vec::new(),
            source: None,
            command: command.into().to_ascii_uppercase(),
            params: Vec::new(),
            trailing: None,
            raw: String::new(),
            received_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn with_trailing(mut self, trailing: impl Into<String>) -> Self {
        self.trailing = Some(trailing.into());
        self
    }

    /// The n-th argument, counting the trailing text as the last one
    pub fn arg(&self, n: usize) -> Option<&str> {
        self.params
            .get(n)
            .map(String::as_str)
            .or_else(|| (n == self.params.len()).then(|| self.trailing.as_deref()).flatten())
    }

    /// Channel or nick the line is addressed to
    pub fn target(&self) -> Option<&str> {
        self.arg(0)
    }

    /// Message body of a PRIVMSG/NOTICE-shaped line
    pub fn text(&self) -> Option<&str> {
        self.trailing.as_deref().or_else(|| self.params.last().map(String::as_str))
    }

    pub fn sender_nick(&self) -> Option<&str> {
        self.source.as_ref().and_then(Source::nick)
    }

    pub fn is_numeric(&self) -> bool {
        self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit())
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Where a reply belongs: the channel for channel traffic, the sender otherwise
    pub fn reply_target(&self) -> Option<&str> {
        match self.target() {
            Some(target) if is_channel_name(target) => Some(target),
            _ => self.sender_nick(),
        }
    }
}

/// Whether a name carries one of the channel prefixes
pub fn is_channel_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some('#' | '&' | '+' | '!') => {}
        _ => return false,
    }
    name.chars().count() <= 50 && chars.all(|c| c != ' ' && c != ',' && !c.is_control())
}
