//! Built-in handlers that live in the core rather than in a module

use crate::application::errors::ModuleError;
use crate::domain::entities::{is_channel_name, ProtocolEvent};
use crate::modules::HandlerResult;
use super::core_service::MirCore;

/// Arguments of one core handler call
pub struct Invocation<'a> {
    pub handler: &'a str,
    /// `None` for direct calls
    pub event: Option<&'a ProtocolEvent>,
    pub args: &'a [String],
}

type CoreFn = fn(&mut MirCore, &Invocation<'_>) -> HandlerResult;

/// A handler the core answers itself
pub struct CoreCommand {
    pub name: &'static str,
    pub description: &'static str,
    /// Refused for anyone but the configured owner when triggered from chat
    pub owner_only: bool,
    handler: CoreFn,
}

impl CoreCommand {
    pub fn invoke(&self, core: &mut MirCore, invocation: &Invocation<'_>) -> HandlerResult {
        if self.owner_only {
            if let Some(event) = invocation.event {
                let sender = event.sender_nick().unwrap_or_default();
                if !core.config().is_owner(sender) {
                    tracing::warn!("{} refused {} from {}", core.nick(), self.name, sender);
                    return Err(ModuleError::PermissionDenied(format!("{} for {}", self.name, sender)));
                }
            }
        }
        (self.handler)(core, invocation)
    }

    /// Command name as typed in chat
    pub fn command(&self) -> &'static str {
        self.name.trim_start_matches(crate::modules::HANDLER_PREFIX)
    }
}

static CORE_COMMANDS: &[CoreCommand] = &[
    CoreCommand { name: "u_help", description: "List commands, or describe one", owner_only: false, handler: help },
    CoreCommand { name: "u_ping", description: "Check the bot is alive", owner_only: false, handler: ping },
    CoreCommand { name: "u_version", description: "Show bot version", owner_only: false, handler: version },
    CoreCommand { name: "u_join", description: "Join a channel", owner_only: true, handler: join },
    CoreCommand { name: "u_part", description: "Leave a channel", owner_only: true, handler: part },
    CoreCommand { name: "u_rejoin", description: "Join configured channels again", owner_only: true, handler: rejoin },
    CoreCommand { name: "u_reload", description: "Reload modules and rejoin", owner_only: true, handler: reload },
    CoreCommand { name: "u_quit", description: "Disconnect", owner_only: true, handler: quit },
];

pub fn lookup(name: &str) -> Option<&'static CoreCommand> {
    CORE_COMMANDS.iter().find(|c| c.name == name)
}

pub fn all() -> &'static [CoreCommand] {
    CORE_COMMANDS
}

fn reply(core: &MirCore, invocation: &Invocation<'_>, text: &str) -> Result<(), ModuleError> {
    let Some(target) = invocation.event.and_then(|e| e.reply_target()) else {
        return Ok(());
    };
    core.handle().privmsg(target, text).map_err(|e| fail(invocation, e))
}

fn fail(invocation: &Invocation<'_>, reason: impl std::fmt::Display) -> ModuleError {
    ModuleError::Handler {
        name: invocation.handler.to_string(),
        reason: reason.to_string(),
    }
}

fn help(core: &mut MirCore, invocation: &Invocation<'_>) -> HandlerResult {
    let prefix = core.config().bot.command_prefix.clone();

    if let Some(name) = invocation.args.first() {
        let handler = format!("{}{}", crate::modules::HANDLER_PREFIX, name.trim_start_matches(prefix.as_str()));
        let text = if let Some(cmd) = lookup(&handler) {
            format!("{}{} - {}", prefix, cmd.command(), cmd.description)
        } else if let Some(record) = core.registry().owner_of(&handler) {
            format!(
                "{}{} - provided by {}{}",
                prefix,
                name,
                record.name,
                record.description.as_deref().map(|d| format!(": {}", d)).unwrap_or_default()
            )
        } else {
            format!("No such command: {}", name)
        };
        reply(core, invocation, &text)?;
        return Ok(true);
    }

    let mut names: Vec<String> = CORE_COMMANDS.iter().map(|c| c.command().to_string()).collect();
    names.extend(
        core.registry()
            .handler_names()
            .iter()
            .map(|h| h.trim_start_matches(crate::modules::HANDLER_PREFIX))
            .filter(|h| !h.starts_with("event_"))
            .map(String::from),
    );
    names.sort();
    names.dedup();

    let list: Vec<String> = names.iter().map(|n| format!("{}{}", prefix, n)).collect();
    reply(core, invocation, &format!("Commands: {}", list.join(" ")))?;
    Ok(true)
}

fn ping(core: &mut MirCore, invocation: &Invocation<'_>) -> HandlerResult {
    reply(core, invocation, "pong")?;
    Ok(true)
}

fn version(core: &mut MirCore, invocation: &Invocation<'_>) -> HandlerResult {
    reply(core, invocation, &format!("mirbot v{}", env!("CARGO_PKG_VERSION")))?;
    Ok(true)
}

fn join(core: &mut MirCore, invocation: &Invocation<'_>) -> HandlerResult {
    let Some(channel) = invocation.args.first() else {
        return Err(fail(invocation, "usage: join <#channel>"));
    };
    if !is_channel_name(channel) {
        return Err(fail(invocation, format!("not a channel: {}", channel)));
    }
    core.send(&format!("JOIN {}", channel)).map_err(|e| fail(invocation, e))?;
    Ok(true)
}

fn part(core: &mut MirCore, invocation: &Invocation<'_>) -> HandlerResult {
    let channel = invocation
        .args
        .first()
        .map(String::as_str)
        .or_else(|| invocation.event.and_then(|e| e.target()).filter(|t| is_channel_name(t)));
    let Some(channel) = channel else {
        return Err(fail(invocation, "usage: part <#channel>"));
    };
    core.send(&format!("PART {}", channel)).map_err(|e| fail(invocation, e))?;
    Ok(true)
}

fn rejoin(core: &mut MirCore, invocation: &Invocation<'_>) -> HandlerResult {
    core.rejoin().map_err(|e| fail(invocation, e))?;
    Ok(true)
}

fn reload(core: &mut MirCore, invocation: &Invocation<'_>) -> HandlerResult {
    core.clean(true);
    core.rejoin().map_err(|e| fail(invocation, e))?;
    let text = format!("Reloaded {} module(s)", core.loaded_modules().len());
    reply(core, invocation, &text)?;
    Ok(true)
}

fn quit(core: &mut MirCore, invocation: &Invocation<'_>) -> HandlerResult {
    let message = if invocation.args.is_empty() {
        "Bye".to_string()
    } else {
        invocation.args.join(" ")
    };
    core.send(&format!("QUIT :{}", message)).map_err(|e| fail(invocation, e))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert!(lookup("u_help").is_some());
        assert!(lookup("u_quit").unwrap().owner_only);
        assert!(!lookup("u_ping").unwrap().owner_only);
        assert!(lookup("help").is_none());
        assert!(lookup("u_missing").is_none());
    }

    #[test]
    fn test_command_names() {
        let names: Vec<&str> = all().iter().map(|c| c.command()).collect();
        assert!(names.contains(&"help"));
        assert!(names.contains(&"reload"));
        assert!(all().iter().all(|c| c.name.starts_with("u_")));
    }
}
