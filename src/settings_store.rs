use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::model::Settings;

/// Holds the single live settings object.
///
/// The store never notifies anyone; callers that mutate it are responsible
/// for broadcasting the returned snapshot.
#[derive(Debug, Default)]
pub struct SettingsStore {
    current: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(initial: Settings) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    /// Snapshot of the current settings.
    pub fn get(&self) -> Settings {
        self.current.read().clone()
    }

    /// Overlay `partial` onto the current settings and return the result.
    /// No validation of value types or ranges.
    pub fn merge(&self, partial: Map<String, Value>) -> Settings {
        let mut current = self.current.write();
        current.overlay(partial);
        current.clone()
    }

    pub fn set_field(&self, key: impl Into<String>, value: Value) -> Settings {
        let mut current = self.current.write();
        current.insert(key.into(), value);
        current.clone()
    }
}
