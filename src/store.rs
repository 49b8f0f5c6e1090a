//! Durable settings persistence on top of a flat key/value store.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Serialize, de::DeserializeOwned};

use crate::lock;
use crate::settings::MeterSettings;

/// Key under which the meter settings are persisted.
///
/// All fields are written as one value, so an interrupted write leaves either
/// the old or the new settings, never a mix.
pub const SETTINGS_KEY: &str = "meter";

pub trait KeyValueStore: Send {
    fn get_str(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set_str(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore(HashMap<String, String>);

impl KeyValueStore for MemoryStore {
    fn get_str(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.0.get(key).cloned())
    }

    fn set_str(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.0.insert(key.into(), value.into());
        Ok(())
    }
}

/// Typed access to a [`KeyValueStore`]. Every access group runs inside a
/// [`SettingsStore::session`] so concurrent writers cannot interleave.
#[derive(Debug)]
pub struct SettingsStore<S: KeyValueStore> {
    store: Mutex<S>,
}

impl<S: KeyValueStore> SettingsStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    pub fn session<R>(&self, f: impl FnOnce(&mut Session<'_, S>) -> R) -> R {
        let mut guard = lock(&self.store);
        f(&mut Session { store: &mut *guard })
    }

    /// Loads the settings (with defaults for anything never stored) and
    /// writes the effective values back.
    pub fn load_settings(&self) -> anyhow::Result<MeterSettings> {
        self.session(|s| {
            let settings: MeterSettings = s.get(SETTINGS_KEY, MeterSettings::default());
            s.put(SETTINGS_KEY, &settings)?;
            Ok(settings)
        })
    }
}

pub struct Session<'a, S: KeyValueStore> {
    store: &'a mut S,
}

impl<S: KeyValueStore> Session<'_, S> {
    /// Reads a typed value, falling back to `default` when it is absent or
    /// unreadable
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.store.get_str(key) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable setting {key}: {e}");
                default
            }),
            Ok(None) => default,
            Err(e) => {
                log::warn!("Could not read setting {key}: {e}");
                default
            }
        }
    }

    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> anyhow::Result<()> {
        self.store.set_str(key, &serde_json::to_string(value)?)
    }
}
