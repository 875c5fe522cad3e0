//! Line parser - Parses raw protocol lines and in-message commands

use chrono::Utc;
use crate::application::errors::ConnectionError;
use crate::domain::entities::{irc_eq, ProtocolEvent, Source};

/// Parse one inbound line (CRLF optional) into a `ProtocolEvent`.
///
/// Grammar: `['@' tags SPACE] [':' prefix SPACE] command {SPACE param} [SPACE ':' trailing]`
pub fn parse_line(line: &str) -> Result<ProtocolEvent, ConnectionError> {
    let raw = line.trim_end_matches(['\r', '\n']);
    let mut rest = raw.trim_start_matches(' ');
    if rest.is_empty() {
        return Err(ConnectionError::InvalidLine("empty line".to_string()));
    }

    let mut tags = Vec::new();
    if let Some(tagged) = rest.strip_prefix('@') {
        let (tag_str, remainder) = tagged
            .split_once(' ')
            .ok_or_else(|| ConnectionError::InvalidLine(raw.to_string()))?;
        tags = parse_tags(tag_str);
        rest = remainder.trim_start_matches(' ');
    }

    let mut source = None;
    if let Some(prefixed) = rest.strip_prefix(':') {
        let (prefix, remainder) = prefixed
            .split_once(' ')
            .ok_or_else(|| ConnectionError::InvalidLine(raw.to_string()))?;
        if prefix.is_empty() {
            return Err(ConnectionError::InvalidLine(raw.to_string()));
        }
        source = Some(Source::parse(prefix));
        rest = remainder.trim_start_matches(' ');
    }

    let (command, mut rest) = match rest.split_once(' ') {
        Some((command, remainder)) => (command, remainder),
        None => (rest, ""),
    };
    if command.is_empty() || !command.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(ConnectionError::InvalidLine(raw.to_string()));
    }

    let mut params = Vec::new();
    let mut trailing = None;
    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }
        if let Some(text) = rest.strip_prefix(':') {
            trailing = Some(text.to_string());
            break;
        }
        match rest.split_once(' ') {
            Some((param, remainder)) => {
                params.push(param.to_string());
                rest = remainder;
            }
            None => {
                params.push(rest.to_string());
                break;
            }
        }
    }

    Ok(ProtocolEvent {
        tags,
        source,
        command: command.to_ascii_uppercase(),
        params,
        trailing,
        raw: raw.to_string(),
        received_at: Utc::now(),
    })
}

fn parse_tags(tag_str: &str) -> Vec<(String, Option<String>)> {
    tag_str
        .split(';')
        .filter(|s| !s.is_empty())
        .map(|tag| match tag.split_once('=') {
            Some((key, value)) => (key.to_string(), Some(unescape_tag_value(value))),
            None => (tag.to_string(), None),
        })
        .collect()
}

fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// A command found at the start of message text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

/// Extracts commands from message text: `!name args` or `<nick>: name args`
pub struct CommandParser {
    command_prefix: String,
    nick: String,
}

impl CommandParser {
    pub fn new(prefix: impl Into<String>, nick: impl Into<String>) -> Self {
        Self {
            command_prefix: prefix.into(),
            nick: nick.into(),
        }
    }

    pub fn parse(&self, text: &str) -> Option<ParsedCommand> {
        let text = text.trim();
        let cmd_text = if let Some(stripped) = text.strip_prefix(self.command_prefix.as_str()) {
            stripped
        } else {
            self.strip_addressed(text)?
        };

        let mut parts = cmd_text.split_whitespace();
        let name = parts.next()?.to_lowercase();
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return None;
        }

        Some(ParsedCommand {
            name: name.replace('-', "_"),
            args: parts.map(String::from).collect(),
        })
    }

    /// `mirbot: help` / `mirbot, help`
    fn strip_addressed<'a>(&self, text: &'a str) -> Option<&'a str> {
        let (head, tail) = text.split_once([':', ','])?;
        irc_eq(head.trim(), &self.nick).then_some(tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_privmsg() {
        let event = parse_line(":alice!al@host PRIVMSG #rust :Hello, world!\r\n").unwrap();
        assert_eq!(event.command, "PRIVMSG");
        assert_eq!(event.sender_nick(), Some("alice"));
        assert_eq!(event.target(), Some("#rust"));
        assert_eq!(event.text(), Some("Hello, world!"));
        assert_eq!(event.raw, ":alice!al@host PRIVMSG #rust :Hello, world!");
    }

    #[test]
    fn test_parse_ping_without_prefix() {
        let event = parse_line("PING :irc.example.org").unwrap();
        assert_eq!(event.command, "PING");
        assert!(event.source.is_none());
        assert_eq!(event.trailing.as_deref(), Some("irc.example.org"));
    }

    #[test]
    fn test_parse_numeric() {
        let event = parse_line(":irc.example.org 001 mirbot :Welcome to IRC").unwrap();
        assert!(event.is_numeric());
        assert!(event.source.as_ref().unwrap().is_server());
        assert_eq!(event.params, vec!["mirbot"]);
    }

    #[test]
    fn test_parse_tags() {
        let event = parse_line("@time=2023-01-01T00:00:00Z;msgid=abc;flag;k=a\\sb\\:c :n!u@h PRIVMSG #c :hi").unwrap();
        assert_eq!(event.tag("time"), Some("2023-01-01T00:00:00Z"));
        assert_eq!(event.tag("k"), Some("a b;c"));
        assert_eq!(event.tag("flag"), None);
        assert_eq!(event.tags.len(), 4);
    }

    #[test]
    fn test_parse_params_without_trailing() {
        let event = parse_line(":n!u@h MODE #chan +o  other").unwrap();
        assert_eq!(event.params, vec!["#chan", "+o", "other"]);
        assert!(event.trailing.is_none());
    }

    #[test]
    fn test_parse_empty_trailing() {
        let event = parse_line(":n!u@h TOPIC #chan :").unwrap();
        assert_eq!(event.trailing.as_deref(), Some(""));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_line("").is_err());
        assert!(parse_line("\r\n").is_err());
        assert!(parse_line(":prefixonly").is_err());
        assert!(parse_line(":n!u@h PRIV$MSG x").is_err());
    }

    #[test]
    fn test_command_parser_prefix() {
        let parser = CommandParser::new("!", "mirbot");
        assert_eq!(
            parser.parse("!AFK gone fishing"),
            Some(ParsedCommand {
                name: "afk".to_string(),
                args: vec!["gone".to_string(), "fishing".to_string()],
            })
        );
        assert_eq!(parser.parse("!").map(|c| c.name), None);
        assert_eq!(parser.parse("just talking"), None);
    }

    #[test]
    fn test_command_parser_addressed() {
        let parser = CommandParser::new("!", "MIRbot");
        let cmd = parser.parse("mirbot: help me").unwrap();
        assert_eq!(cmd.name, "help");
        assert_eq!(cmd.args, vec!["me"]);
        assert_eq!(parser.parse("someone: help"), None);
    }

    #[test]
    fn test_command_parser_normalizes_dashes() {
        let parser = CommandParser::new("!", "mirbot");
        assert_eq!(parser.parse("!last-seen bob").unwrap().name, "last_seen");
        assert_eq!(parser.parse("!../etc"), None);
    }
}
