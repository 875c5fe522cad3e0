use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A channel the server confirmed we are in
#[derive(Debug, Clone)]
pub struct JoinedChannel {
    pub name: String,
    pub joined_at: DateTime<Utc>,
}

/// Server-acknowledged channel membership, keyed case-insensitively
#[derive(Debug, Default, Clone)]
pub struct ChannelMembership {
    channels: HashMap<String, JoinedChannel>,
}

impl ChannelMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an acknowledged join. A repeated join keeps the first timestamp.
    pub fn join(&mut self, name: &str) -> bool {
        let key = irc_to_lower(name);
        if self.channels.contains_key(&key) {
            return false;
        }
        self.channels.insert(
            key,
            JoinedChannel {
                name: name.to_string(),
                joined_at: Utc::now(),
            },
        );
        true
    }

    pub fn part(&mut self, name: &str) -> bool {
        self.channels.remove(&irc_to_lower(name)).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(&irc_to_lower(name))
    }

    pub fn get(&self, name: &str) -> Option<&JoinedChannel> {
        self.channels.get(&irc_to_lower(name))
    }

    /// Channel names as the server spelled them, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.values().map(|c| c.name.clone()).collect();
        names.sort();
        names
    }

    pub fn clear(&mut self) -> Vec<String> {
        let names = self.names();
        self.channels.clear();
        names
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// RFC 1459 lowercase: ASCII plus `[]\~` -> `{}|^`
pub fn irc_to_lower(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '~' => '^',
            _ => c.to_ascii_lowercase(),
        })
        .collect()
}

pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && irc_to_lower(a) == irc_to_lower(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_is_case_insensitive() {
        let mut membership = ChannelMembership::new();
        assert!(membership.join("#Rust"));
        assert!(!membership.join("#rust"));
        assert_eq!(membership.len(), 1);
        assert!(membership.contains("#RUST"));
        assert_eq!(membership.names(), vec!["#Rust".to_string()]);
    }

    #[test]
    fn test_repeat_join_keeps_timestamp() {
        let mut membership = ChannelMembership::new();
        membership.join("#test");
        let first = membership.get("#test").map(|c| c.joined_at);
        membership.join("#test");
        assert_eq!(membership.get("#test").map(|c| c.joined_at), first);
    }

    #[test]
    fn test_part_and_clear() {
        let mut membership = ChannelMembership::new();
        membership.join("#a");
        membership.join("#b");
        assert!(membership.part("#A"));
        assert!(!membership.part("#a"));
        assert_eq!(membership.clear(), vec!["#b".to_string()]);
        assert!(membership.is_empty());
    }

    #[test]
    fn test_irc_casemapping() {
        assert_eq!(irc_to_lower("#Chan[1]"), "#chan{1}");
        assert!(irc_eq("Nick\\Away", "nick|away"));
        assert!(!irc_eq("nick", "nicks"));
    }
}
