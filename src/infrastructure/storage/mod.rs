//! In-memory storage implementation

use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::application::errors::StorageError;
use crate::domain::traits::VariableStore;

/// Non-durable store for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryStore {
    kv: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.kv.read().map(|kv| kv.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VariableStore for MemoryStore {
    fn try_get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let kv = self.kv.read().map_err(|_| StorageError::Poisoned)?;
        Ok(kv.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<Value, StorageError> {
        let mut kv = self.kv.write().map_err(|_| StorageError::Poisoned)?;
        kv.insert(key.to_string(), value.clone());
        Ok(value)
    }

    fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut kv = self.kv.write().map_err(|_| StorageError::Poisoned)?;
        Ok(kv.remove(key).is_some())
    }
}
