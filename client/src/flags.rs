//! Key-value flags that outlive a single scene, such as collected keys

use std::collections::HashSet;

/// Boolean flags keyed by name
pub trait FlagStore {
    fn has(&self, key: &str) -> bool;
    fn set(&mut self, key: &str);
}

/// Flag name recording that the key with this id was collected
pub fn key_flag(key_id: &str) -> String {
    format!("Key_{}_Collected", key_id)
}

/// Flags held for the lifetime of the client process
#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    flags: HashSet<String>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl FlagStore for MemoryFlagStore {
    fn has(&self, key: &str) -> bool {
        self.flags.contains(key)
    }

    fn set(&mut self, key: &str) {
        self.flags.insert(key.to_string());
    }
}
