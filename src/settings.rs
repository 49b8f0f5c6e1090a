//! Operating parameters of the meter and the shared cell they are published in.

use std::sync::{Arc, Mutex};

use enum_map::{EnumMap, enum_map};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adc::Channel;
use crate::lock;

pub const MAX_BATCH_SIZE: u32 = 500;
pub const MAX_INTERVAL_SECS: u32 = 86_400;

/// Largest accepted settings form body
pub const MAX_FORM_BYTES: usize = 512;

/// Intervals that are a multiple of this are phase-locked to the wall clock
pub const ALIGNMENT_MODULUS: u32 = 5;

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("missing field {0}")]
    Missing(&'static str),
    #[error("field {field} is not a number: {value:?}")]
    Malformed { field: &'static str, value: String },
    #[error("field {0} is out of range")]
    OutOfRange(&'static str),
    #[error("form body exceeds {MAX_FORM_BYTES} bytes")]
    TooLong,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterSettings {
    pub house_voltage: f64,
    pub calibration: EnumMap<Channel, f64>,
    pub measurements_per_batch: u32,
    pub interval_secs: u32,
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self {
            house_voltage: 230.0,
            calibration: enum_map! {
                Channel::Ct1 => 100.0 / 0.046288 / 27.0,
                Channel::Ct2 => 100.0 / 0.050 / 27.0,
                Channel::Ct3 => 100.0 / 0.050 / 27.0,
            },
            measurements_per_batch: 5,
            interval_secs: 60,
        }
    }
}

const HOUSE_VOLTAGE: &str = "houseVoltage";
const CALIBRATION: [&str; 3] = ["calibrationVal1", "calibrationVal2", "calibrationVal3"];
const NUM_MEASUREMENTS: &str = "numMeasurements";
const INTERVAL: &str = "interval";

impl MeterSettings {
    /// Parses a complete settings form (`application/x-www-form-urlencoded`).
    ///
    /// All six fields are mandatory, there are no partial updates. Bodies
    /// longer than [`MAX_FORM_BYTES`] are rejected whole, a truncated last
    /// field could otherwise still parse.
    pub fn from_form(body: &[u8]) -> Result<Self, SettingsError> {
        if body.len() > MAX_FORM_BYTES {
            return Err(SettingsError::TooLong);
        }

        let mut house_voltage = None;
        let mut calibration: [Option<String>; 3] = Default::default();
        let mut measurements = None;
        let mut interval = None;

        for (key, value) in form_urlencoded::parse(body) {
            match key.as_ref() {
                HOUSE_VOLTAGE => house_voltage = Some(value.into_owned()),
                NUM_MEASUREMENTS => measurements = Some(value.into_owned()),
                INTERVAL => interval = Some(value.into_owned()),
                k => match CALIBRATION.iter().position(|c| *c == k) {
                    Some(i) => calibration[i] = Some(value.into_owned()),
                    None => log::warn!("Unknown settings key: {k}"),
                },
            }
        }

        let [c1, c2, c3] = calibration;
        let settings = Self {
            house_voltage: parse_field(HOUSE_VOLTAGE, house_voltage)?,
            calibration: EnumMap::from_array([
                parse_field(CALIBRATION[0], c1)?,
                parse_field(CALIBRATION[1], c2)?,
                parse_field(CALIBRATION[2], c3)?,
            ]),
            measurements_per_batch: parse_field(NUM_MEASUREMENTS, measurements)?,
            interval_secs: parse_field(INTERVAL, interval)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.house_voltage.is_finite() || self.house_voltage <= 0.0 {
            return Err(SettingsError::OutOfRange(HOUSE_VOLTAGE));
        }
        for (channel, factor) in self.calibration {
            if !factor.is_finite() {
                return Err(SettingsError::OutOfRange(CALIBRATION[channel.number() - 1]));
            }
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.measurements_per_batch) {
            return Err(SettingsError::OutOfRange(NUM_MEASUREMENTS));
        }
        if !(1..=MAX_INTERVAL_SECS).contains(&self.interval_secs) {
            return Err(SettingsError::OutOfRange(INTERVAL));
        }
        Ok(())
    }

    /// Whether batch windows start on a multiple of the interval
    pub fn aligns_to_wall_clock(&self) -> bool {
        self.interval_secs % ALIGNMENT_MODULUS == 0
    }
}

fn parse_field<T: std::str::FromStr>(
    field: &'static str,
    value: Option<String>,
) -> Result<T, SettingsError> {
    let value = value.ok_or(SettingsError::Missing(field))?;
    value
        .trim()
        .parse()
        .map_err(|_| SettingsError::Malformed { field, value })
}

/// Settings as published to the loops, with a counter bumped on every
/// replacement so readers can tell that derived state went stale.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SettingsSnapshot {
    pub generation: u32,
    pub settings: MeterSettings,
}

/// Shared handle to the current settings. Replacement swaps the whole value
/// under the lock, readers always get a consistent copy.
#[derive(Debug, Clone, Default)]
pub struct SettingsCell(Arc<Mutex<SettingsSnapshot>>);

impl SettingsCell {
    pub fn new(settings: MeterSettings) -> Self {
        Self(Arc::new(Mutex::new(SettingsSnapshot {
            generation: 0,
            settings,
        })))
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        *lock(&self.0)
    }

    pub fn settings(&self) -> MeterSettings {
        self.snapshot().settings
    }

    /// Publishes new settings, returning their generation
    pub fn replace(&self, settings: MeterSettings) -> u32 {
        let mut current = lock(&self.0);
        *current = SettingsSnapshot {
            generation: current.generation.wrapping_add(1),
            settings,
        };
        current.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const FULL_FORM: &[u8] = b"houseVoltage=240&calibrationVal1=60.5&calibrationVal2=61&calibrationVal3=62.25&numMeasurements=10&interval=30";

    #[test]
    fn parses_a_complete_form() {
        let settings = MeterSettings::from_form(FULL_FORM).unwrap();
        assert_eq!(settings.house_voltage, 240.0);
        assert_eq!(settings.calibration[Channel::Ct1], 60.5);
        assert_eq!(settings.calibration[Channel::Ct2], 61.0);
        assert_eq!(settings.calibration[Channel::Ct3], 62.25);
        assert_eq!(settings.measurements_per_batch, 10);
        assert_eq!(settings.interval_secs, 30);
    }

    #[test]
    fn rejects_missing_interval() {
        let form = b"houseVoltage=240&calibrationVal1=60&calibrationVal2=61&calibrationVal3=62&numMeasurements=10";
        assert_eq!(
            MeterSettings::from_form(form),
            Err(SettingsError::Missing("interval"))
        );
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let form = b"houseVoltage=abc&calibrationVal1=60&calibrationVal2=61&calibrationVal3=62&numMeasurements=10&interval=60";
        assert_eq!(
            MeterSettings::from_form(form),
            Err(SettingsError::Malformed {
                field: "houseVoltage",
                value: "abc".into()
            })
        );
    }

    #[test]
    fn rejects_zero_interval_and_batch() {
        let form = b"houseVoltage=230&calibrationVal1=60&calibrationVal2=61&calibrationVal3=62&numMeasurements=0&interval=60";
        assert_eq!(
            MeterSettings::from_form(form),
            Err(SettingsError::OutOfRange("numMeasurements"))
        );

        let form = b"houseVoltage=230&calibrationVal1=60&calibrationVal2=61&calibrationVal3=62&numMeasurements=5&interval=0";
        assert_eq!(
            MeterSettings::from_form(form),
            Err(SettingsError::OutOfRange("interval"))
        );
    }

    #[test]
    fn rejects_oversized_body() {
        let mut form = FULL_FORM.to_vec();
        form.extend(std::iter::repeat_n(b' ', MAX_FORM_BYTES + 1 - form.len()));
        assert_eq!(MeterSettings::from_form(&form), Err(SettingsError::TooLong));

        form.truncate(MAX_FORM_BYTES);
        assert!(MeterSettings::from_form(&form).is_ok());
    }

    #[test]
    fn tolerates_whitespace_and_unknown_keys() {
        let form = b"houseVoltage=+230+&calibrationVal1=60&calibrationVal2=61&calibrationVal3=62&numMeasurements=5&interval=60&submit=Save";
        let settings = MeterSettings::from_form(form).unwrap();
        assert_eq!(settings.house_voltage, 230.0);
    }

    #[test]
    fn alignment_needs_a_multiple_of_five() {
        let mut settings = MeterSettings::default();
        assert!(settings.aligns_to_wall_clock());
        settings.interval_secs = 7;
        assert!(!settings.aligns_to_wall_clock());
    }

    #[test]
    fn replace_bumps_generation() {
        let cell = SettingsCell::new(MeterSettings::default());
        assert_eq!(cell.snapshot().generation, 0);

        let mut new = MeterSettings::default();
        new.house_voltage = 120.0;
        assert_eq!(cell.replace(new), 1);
        assert_eq!(cell.snapshot().generation, 1);
        assert_eq!(cell.settings().house_voltage, 120.0);
    }

    #[test]
    fn concurrent_readers_never_see_mixed_settings() {
        let uniform = |v: f64| MeterSettings {
            house_voltage: v,
            calibration: EnumMap::from_array([v, v, v]),
            measurements_per_batch: v as u32,
            interval_secs: v as u32,
        };
        let cell = SettingsCell::new(uniform(1.0));

        let writer = {
            let cell = cell.clone();
            thread::spawn(move || {
                for i in 0..20_000 {
                    cell.replace(uniform(if i % 2 == 0 { 2.0 } else { 1.0 }));
                }
            })
        };

        for _ in 0..20_000 {
            let s = cell.settings();
            let v = s.house_voltage;
            assert!(s.calibration.values().all(|c| *c == v));
            assert_eq!(s.measurements_per_batch, v as u32);
            assert_eq!(s.interval_secs, v as u32);
        }
        writer.join().unwrap();
    }
}
