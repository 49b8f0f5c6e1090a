//! Replacing the meter settings while the sampler and batcher keep running.

use std::sync::Arc;

use thiserror::Error;

use crate::settings::{MeterSettings, SettingsCell, SettingsError};
use crate::store::{KeyValueStore, SETTINGS_KEY, SettingsStore};

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("invalid parameters: {0}")]
    Invalid(#[from] SettingsError),
    #[error("could not persist settings: {0:#}")]
    Storage(anyhow::Error),
}

/// Sole writer of the meter settings.
///
/// An accepted update is persisted first and then published as one new
/// [`crate::settings::SettingsSnapshot`]. The sampler rebinds its calibration
/// and restarts its warm-up when it sees the new generation, and readers treat
/// measurements from older generations as unsettled right away.
pub struct SettingsUpdater<S: KeyValueStore> {
    settings: SettingsCell,
    store: Arc<SettingsStore<S>>,
}

impl<S: KeyValueStore> Clone for SettingsUpdater<S> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            store: self.store.clone(),
        }
    }
}

impl<S: KeyValueStore> SettingsUpdater<S> {
    pub fn new(settings: SettingsCell, store: Arc<SettingsStore<S>>) -> Self {
        Self { settings, store }
    }

    pub fn update_from_form(&self, body: &[u8]) -> Result<u32, UpdateError> {
        self.update(MeterSettings::from_form(body)?)
    }

    /// Returns the generation of the applied settings. Nothing changes when
    /// an error is returned.
    pub fn update(&self, settings: MeterSettings) -> Result<u32, UpdateError> {
        settings.validate()?;

        // Holding the store session makes persist + publish one step for
        // concurrent callers
        self.store.session(|s| {
            s.put(SETTINGS_KEY, &settings).map_err(UpdateError::Storage)?;
            let generation = self.settings.replace(settings);
            log::info!("Settings updated (generation {generation}): {settings:?}");
            Ok(generation)
        })
    }
}
