use std::collections::HashMap;
use std::sync::Mutex;

use serde::{de::DeserializeOwned, Serialize};
use spin_sdk::key_value::Store;

/// Byte-level key-value storage the views run against.
pub trait KvStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;
    fn keys(&self) -> anyhow::Result<Vec<String>>;

    /// Writes `value` only if `key` is absent. Returns whether it was written.
    ///
    /// Backends that can do this atomically should override it; the default
    /// is a plain read followed by a write.
    fn insert_new(&self, key: &str, value: &[u8]) -> anyhow::Result<bool> {
        if self.get(key)?.is_some() {
            return Ok(false);
        }
        self.set(key, value)?;
        Ok(true)
    }
}

pub trait StoreExt: KvStore {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        self.set(key, &serde_json::to_vec(value)?)
    }

    fn insert_json_new<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<bool> {
        self.insert_new(key, &serde_json::to_vec(value)?)
    }

    fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

impl<S: KvStore + ?Sized> StoreExt for S {}

impl KvStore for Store {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Store::get(self, key).map_err(|e| anyhow::anyhow!("key-value get {}: {:?}", key, e))
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        Store::set(self, key, value).map_err(|e| anyhow::anyhow!("key-value set {}: {:?}", key, e))
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        Store::delete(self, key).map_err(|e| anyhow::anyhow!("key-value delete {}: {:?}", key, e))
    }

    fn keys(&self) -> anyhow::Result<Vec<String>> {
        self.get_keys()
            .map_err(|e| anyhow::anyhow!("key-value list keys: {:?}", e))
    }
}

/// In-process store for the native server and tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn insert_new(&self, key: &str, value: &[u8]) -> anyhow::Result<bool> {
        let mut entries = self.lock()?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_vec());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_new_only_writes_once() {
        let store = MemoryStore::new();
        assert!(store.insert_json_new("k", &1u32).unwrap());
        assert!(!store.insert_json_new("k", &2u32).unwrap());
        assert_eq!(store.get_json::<u32>("k").unwrap(), Some(1));
    }

    #[test]
    fn keys_with_prefix_filters_and_sorts() {
        let store = MemoryStore::new();
        store.set("b:2", b"x").unwrap();
        store.set("a:1", b"x").unwrap();
        store.set("b:1", b"x").unwrap();
        assert_eq!(store.keys_with_prefix("b:").unwrap(), vec!["b:1", "b:2"]);
    }
}
