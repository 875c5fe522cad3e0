use serde_json::Value;
use crate::application::errors::StorageError;

/// Reserved key holding the per-installation random salt
pub const SALT_KEY: &str = "salt";

/// VariableStore trait - abstraction for key/value persistence
///
/// Implementations must make `set` atomic per key; `get` and `try_get`
/// never create records.
pub trait VariableStore: Send + Sync {
    /// Read a key, `None` when it was never written
    fn try_get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Upsert a key, returning the value that was stored
    fn set(&self, key: &str, value: Value) -> Result<Value, StorageError>;

    /// Remove a key, returning whether it existed
    fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Read a key, falling back to `default` when absent or unreadable
    fn get(&self, key: &str, default: Value) -> Value {
        match self.try_get(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                tracing::warn!("Failed to read variable '{}': {}", key, e);
                default
            }
        }
    }

    /// Prepare the store for use: makes sure a non-empty salt exists
    fn init(&self) -> Result<(), StorageError> {
        let missing = match self.try_get(SALT_KEY)? {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };

        if missing {
            self.set(SALT_KEY, Value::String(generate_salt()))?;
            tracing::info!("Generated new salt");
        }
        Ok(())
    }
}

/// Fresh random salt value
pub fn generate_salt() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_salt_is_random() {
        let a = generate_salt();
        let b = generate_salt();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
