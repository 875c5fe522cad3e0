//! Application layer errors

use std::time::Duration;
use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Not connected")]
    NotConnected,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// Process exit status for an error that ends the bot
    pub fn exit_code(&self) -> i32 {
        match self {
            BotError::Config(_) => 2,
            _ => 1,
        }
    }
}

/// Transport and registration errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not resolve {0}")]
    Resolve(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Nickname already in use: {0}")]
    NicknameInUse(String),

    #[error("Registration rejected: {0}")]
    RegistrationRejected(String),

    #[error("Connection closed during registration")]
    ClosedDuringRegistration,

    #[error("Ping timeout after {0:?} of silence")]
    PingTimeout(Duration),

    #[error("Invalid line: {0}")]
    InvalidLine(String),

    #[error("Line too long: {actual} bytes (limit {limit})")]
    LineTooLong { actual: usize, limit: usize },

    #[error("Outbound writer is gone")]
    WriterClosed,
}

/// Module loading and invocation errors
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Load failed: {0}")]
    Load(String),

    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("No handler named {0}")]
    HandlerNotFound(String),

    #[error("Handler {name} failed: {reason}")]
    Handler { name: String, reason: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let config = BotError::from(ConfigError::MissingField("server.host".into()));
        assert_eq!(config.exit_code(), 2);

        let conn = BotError::from(ConnectionError::NicknameInUse("mirbot".into()));
        assert_eq!(conn.exit_code(), 1);
        assert!(conn.to_string().contains("mirbot"));
    }
}
