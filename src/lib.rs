use std::sync::{Mutex, MutexGuard, PoisonError};

use adc::Channel;
use enum_map::EnumMap;
use measurement::MeasurementCell;
use settings::{MeterSettings, SettingsCell};

pub mod adc;
pub mod api;
pub mod batch;
pub mod batcher;
pub mod clock;
pub mod current_meter;
pub mod logger;
pub mod measurement;
pub mod ota;
pub mod sampler;
pub mod schedule;
pub mod settings;
pub mod store;
pub mod update;
pub mod uplink;
pub mod watchdog;

#[cfg(target_os = "espidf")]
pub mod driver;

/// Locks a mutex, carrying on with the data if a holder panicked. Every value
/// shared here is replaced as a whole, so a poisoned lock never guards a
/// half-written value.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the sampler, the batcher and the web interface
#[derive(Clone, Debug, Default)]
pub struct MeterState {
    pub measurement: MeasurementCell,
    pub settings: SettingsCell,
}

impl MeterState {
    pub fn new(settings: MeterSettings) -> Self {
        Self {
            measurement: Default::default(),
            settings: SettingsCell::new(settings),
        }
    }

    /// Latest currents, if they are settled under the current settings
    pub fn settled_irms(&self) -> Option<EnumMap<Channel, f64>> {
        let generation = self.settings.snapshot().generation;
        let measurement = self.measurement.snapshot();
        measurement
            .is_settled_for(generation)
            .then_some(measurement.irms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use measurement::Measurement;

    #[test]
    fn replaced_settings_hide_old_readings() {
        let state = MeterState::default();
        state.measurement.publish(Measurement {
            settled: true,
            generation: 0,
            ..Default::default()
        });
        assert!(state.settled_irms().is_some());

        state.settings.replace(MeterSettings::default());
        assert_eq!(state.settled_irms(), None);
    }

    #[test]
    fn poisoned_lock_keeps_last_value() {
        let mutex = std::sync::Arc::new(Mutex::new(7));
        let m = mutex.clone();
        let _ = std::thread::spawn(move || {
            let _guard = m.lock().unwrap();
            panic!("boom");
        })
        .join();

        assert!(mutex.is_poisoned());
        assert_eq!(*lock(&mutex), 7);
    }
}
