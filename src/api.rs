//! JSON payloads served to the web interface.

use serde::Serialize;

use crate::adc::Channel;
use crate::batch::truncate_2dp;
use crate::settings::MeterSettings;
use crate::update::UpdateError;
use crate::MeterState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatusPayload {
    pub irms1: f64,
    pub irms2: f64,
    pub irms3: f64,
}

impl StatusPayload {
    /// Latest currents, or all zeros while readings are not settled
    pub fn from_state(state: &MeterState) -> Self {
        state
            .settled_irms()
            .map(|irms| Self {
                irms1: truncate_2dp(irms[Channel::Ct1]),
                irms2: truncate_2dp(irms[Channel::Ct2]),
                irms3: truncate_2dp(irms[Channel::Ct3]),
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPayload {
    pub house_voltage: f64,
    pub calibration_val1: f64,
    pub calibration_val2: f64,
    pub calibration_val3: f64,
    pub num_measurements: u32,
    pub interval: u32,
}

impl From<&MeterSettings> for SettingsPayload {
    fn from(settings: &MeterSettings) -> Self {
        Self {
            house_voltage: settings.house_voltage,
            calibration_val1: settings.calibration[Channel::Ct1],
            calibration_val2: settings.calibration[Channel::Ct2],
            calibration_val3: settings.calibration[Channel::Ct3],
            num_measurements: settings.measurements_per_batch,
            interval: settings.interval_secs,
        }
    }
}

/// Status code and plain-text body answering a settings update
pub fn update_reply(result: &Result<u32, UpdateError>) -> (u16, String) {
    match result {
        Ok(_) => (200, "Settings updated successfully".into()),
        Err(e @ UpdateError::Invalid(_)) => (400, capitalize(&e.to_string())),
        Err(e @ UpdateError::Storage(_)) => (500, capitalize(&e.to_string())),
    }
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
