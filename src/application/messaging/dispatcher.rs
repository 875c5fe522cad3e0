//! Event dispatcher - Maps protocol events to handler names

use crate::domain::entities::ProtocolEvent;
use crate::modules::HANDLER_PREFIX;
use super::parser::CommandParser;

/// Namespace for per-verb event hooks, e.g. `u_event_privmsg`
const EVENT_NAMESPACE: &str = "event_";

/// One handler invocation derived from an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerCall {
    pub name: String,
    pub args: Vec<String>,
}

/// Handler name for a protocol verb: `PRIVMSG` -> `u_event_privmsg`, `001` -> `u_event_001`
pub fn event_handler_name(verb: &str) -> String {
    format!("{}{}{}", HANDLER_PREFIX, EVENT_NAMESPACE, verb.to_ascii_lowercase())
}

/// Handler name for a chat command: `afk` -> `u_afk`
pub fn command_handler_name(command: &str) -> String {
    format!("{}{}", HANDLER_PREFIX, command)
}

/// Derives candidate handler calls for each inbound event
pub struct EventDispatcher {
    parser: CommandParser,
    prefix: String,
}

impl EventDispatcher {
    pub fn new(prefix: impl Into<String>, nick: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            parser: CommandParser::new(prefix.clone(), nick),
            prefix,
        }
    }

    /// Keep addressed-command detection in step with nick changes
    pub fn set_nick(&mut self, nick: impl Into<String>) {
        self.parser = CommandParser::new(self.prefix.clone(), nick);
    }

    /// Handler calls for an event, in invocation order: the verb hook first,
    /// then the chat command it carries, if any.
    pub fn route(&self, event: &ProtocolEvent) -> Vec<HandlerCall> {
        let mut args = event.params.clone();
        args.extend(event.trailing.clone());

        let mut calls = vec![HandlerCall {
            name: event_handler_name(&event.command),
            args,
        }];

        if let Some(call) = self.command_call(event) {
            calls.push(call);
        }
        calls
    }

    fn command_call(&self, event: &ProtocolEvent) -> Option<HandlerCall> {
        // NOTICE never triggers replies, and CTCP is not a command
        if event.command != "PRIVMSG" {
            return None;
        }
        let text = event.text()?;
        if text.starts_with('\x01') {
            return None;
        }

        let command = self.parser.parse(text)?;
        if command.name.starts_with(EVENT_NAMESPACE) {
            return None;
        }

        Some(HandlerCall {
            name: command_handler_name(&command.name),
            args: command.args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::messaging::parser::parse_line;

    fn dispatcher() -> EventDispatcher {
        EventDispatcher::new("!", "mirbot")
    }

    #[test]
    fn test_handler_names() {
        assert_eq!(event_handler_name("PRIVMSG"), "u_event_privmsg");
        assert_eq!(event_handler_name("001"), "u_event_001");
        assert_eq!(command_handler_name("help"), "u_help");
    }

    #[test]
    fn test_route_plain_event() {
        let event = parse_line(":alice!a@h JOIN #rust").unwrap();
        let calls = dispatcher().route(&event);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "u_event_join");
        assert_eq!(calls[0].args, vec!["#rust"]);
    }

    #[test]
    fn test_route_command_message() {
        let event = parse_line(":alice!a@h PRIVMSG #rust :!afk lunch").unwrap();
        let calls = dispatcher().route(&event);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "u_event_privmsg");
        assert_eq!(calls[0].args, vec!["#rust", "!afk lunch"]);
        assert_eq!(calls[1], HandlerCall { name: "u_afk".into(), args: vec!["lunch".into()] });
    }

    #[test]
    fn test_notice_and_ctcp_are_not_commands() {
        let notice = parse_line(":alice!a@h NOTICE #rust :!help").unwrap();
        assert_eq!(dispatcher().route(&notice).len(), 1);

        let ctcp = parse_line(":alice!a@h PRIVMSG mirbot :\x01VERSION\x01").unwrap();
        assert_eq!(dispatcher().route(&ctcp).len(), 1);
    }

    #[test]
    fn test_event_hooks_cannot_be_called_as_commands() {
        let event = parse_line(":alice!a@h PRIVMSG #rust :!event_privmsg").unwrap();
        assert_eq!(dispatcher().route(&event).len(), 1);
    }

    #[test]
    fn test_addressed_command_follows_nick_change() {
        let mut dispatcher = dispatcher();
        dispatcher.set_nick("mirbot_");
        let event = parse_line(":alice!a@h PRIVMSG #rust :mirbot_: ping").unwrap();
        assert_eq!(dispatcher.route(&event)[1].name, "u_ping");
    }
}
