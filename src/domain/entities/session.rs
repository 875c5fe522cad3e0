use chrono::{DateTime, Utc};
use std::fmt;

/// Registration progress of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RegistrationState {
    Unregistered,
    Registering,
    Registered,
    Closing,
    Closed,
}

impl RegistrationState {
    pub fn as_str(&self) -> &str {
        match self {
            RegistrationState::Unregistered => "unregistered",
            RegistrationState::Registering => "registering",
            RegistrationState::Registered => "registered",
            RegistrationState::Closing => "closing",
            RegistrationState::Closed => "closed",
        }
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One connection lifetime to the upstream server
#[derive(Debug, Clone)]
pub struct Session {
    pub address: String,
    pub nick: String,
    pub realname: String,
    state: RegistrationState,
    connected_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(address: impl Into<String>, nick: impl Into<String>, realname: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            address: address.into(),
            nick: nick.into(),
            realname: realname.into(),
            state: RegistrationState::Unregistered,
            connected_at: now,
            last_activity: now,
        }
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    pub fn is_registered(&self) -> bool {
        self.state == RegistrationState::Registered
    }

    /// Move the session forward. States never go backwards; returns false
    /// when the transition is refused.
    pub fn advance(&mut self, next: RegistrationState) -> bool {
        if next <= self.state {
            return false;
        }
        tracing::debug!("Session {}: {} -> {}", self.address, self.state, next);
        self.state = next;
        true
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }
}
