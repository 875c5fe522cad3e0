//! Core handle - What handlers may touch while they run

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use chrono::Utc;
use serde_json::Value;
use crate::application::errors::BotError;
use crate::domain::entities::irc_eq;
use crate::domain::traits::VariableStore;
use crate::infrastructure::adapters::irc::{Outbound, MAX_LINE_BYTES};

/// Seconds since the epoch. Never goes backwards within a process, even if
/// the wall clock does.
pub fn unixtime() -> i64 {
    static LAST: AtomicI64 = AtomicI64::new(0);
    let now = Utc::now().timestamp();
    LAST.fetch_max(now, Ordering::SeqCst).max(now)
}

/// Cheap, cloneable view of the core: outbound queue, variable store and identity
#[derive(Clone)]
pub struct CoreHandle {
    outbound: Option<Outbound>,
    store: Arc<dyn VariableStore>,
    nick: String,
    owner: Option<String>,
}

impl CoreHandle {
    pub fn new(
        outbound: Option<Outbound>,
        store: Arc<dyn VariableStore>,
        nick: impl Into<String>,
        owner: Option<String>,
    ) -> Self {
        Self {
            outbound,
            store,
            nick: nick.into(),
            owner,
        }
    }

    /// A handle with no connection behind it; sending fails with `NotConnected`
    pub fn detached(store: Arc<dyn VariableStore>, nick: impl Into<String>, owner: Option<String>) -> Self {
        Self::new(None, store, nick, owner)
    }

    pub fn is_connected(&self) -> bool {
        self.outbound.as_ref().is_some_and(|o| !o.is_closed())
    }

    /// Queue one raw line
    pub fn send(&self, line: &str) -> Result<(), BotError> {
        let outbound = self.outbound.as_ref().ok_or(BotError::NotConnected)?;
        outbound.send(line)?;
        Ok(())
    }

    pub fn privmsg(&self, target: &str, text: &str) -> Result<(), BotError> {
        self.say("PRIVMSG", target, text)
    }

    pub fn notice(&self, target: &str, text: &str) -> Result<(), BotError> {
        self.say("NOTICE", target, text)
    }

    /// One line per text line, each split to fit the line limit
    fn say(&self, verb: &str, target: &str, text: &str) -> Result<(), BotError> {
        let head = format!("{} {} :", verb, target);
        let room = MAX_LINE_BYTES.saturating_sub(head.len());
        if room == 0 {
            return Err(BotError::Internal(format!("target too long: {}", target)));
        }

        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            for chunk in split_at_width(line, room) {
                self.send(&format!("{}{}", head, chunk))?;
            }
        }
        Ok(())
    }

    pub fn get_variable(&self, key: &str, default: Value) -> Value {
        self.store.get(key, default)
    }

    pub fn set_variable(&self, key: &str, value: Value) -> Result<Value, BotError> {
        Ok(self.store.set(key, value)?)
    }

    pub fn unixtime(&self) -> i64 {
        unixtime()
    }

    /// Current nickname
    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn is_owner(&self, nick: &str) -> bool {
        self.owner.as_deref().is_some_and(|owner| irc_eq(owner, nick))
    }

    pub fn store(&self) -> &Arc<dyn VariableStore> {
        &self.store
    }
}

/// Split on char boundaries into pieces of at most `width` bytes, preferring spaces
fn split_at_width(text: &str, width: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;

    while rest.len() > width {
        let mut cut = width;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        } else if let Some(space) = rest[..cut].rfind(' ').filter(|&i| i > 0) {
            cut = space;
        }
        pieces.push(&rest[..cut]);
        rest = rest[cut..].trim_start_matches(' ');
    }

    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}
