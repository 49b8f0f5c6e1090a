//! In-memory batch of readings and its upload wire format.

use enum_map::EnumMap;
use serde::Serialize;
use time::{OffsetDateTime, macros::format_description};

use crate::adc::Channel;

/// Truncates (not rounds) to two decimal places
pub fn truncate_2dp(value: f64) -> f64 {
    (value * 100.0).trunc() / 100.0
}

/// Rounds to the nearest multiple, halfway values round up
pub fn round_to_nearest_multiple(value: u64, multiple: u64) -> u64 {
    if multiple == 0 {
        return value;
    }
    let remainder = value % multiple;
    if remainder == 0 {
        value
    } else if 2 * remainder < multiple {
        value - remainder
    } else {
        value + (multiple - remainder)
    }
}

/// `DD/MM/YYYY HH:MM:SS`
pub fn format_timestamp(epoch_secs: u64) -> anyhow::Result<String> {
    let datetime = OffsetDateTime::from_unix_timestamp(i64::try_from(epoch_secs)?)?;
    Ok(datetime.format(format_description!(
        "[day]/[month]/[year] [hour]:[minute]:[second]"
    ))?)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Aligned epoch seconds
    pub timestamp: u64,
    pub irms: EnumMap<Channel, f64>,
}

impl Sample {
    pub fn new(timestamp: u64, irms: EnumMap<Channel, f64>) -> Self {
        Self {
            timestamp,
            irms: irms.map(|_, v| truncate_2dp(v)),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct WireBatch {
    #[serde(rename = "Time")]
    time: Vec<String>,
    #[serde(rename = "IRMS1")]
    irms1: Vec<f64>,
    #[serde(rename = "IRMS2")]
    irms2: Vec<f64>,
    #[serde(rename = "IRMS3")]
    irms3: Vec<f64>,
}

#[derive(Debug, Default)]
pub struct Batch {
    samples: Vec<Sample>,
}

impl Batch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Column-oriented JSON, every array has one entry per sample
    pub fn to_json(&self) -> anyhow::Result<String> {
        let column = |channel: Channel| -> Vec<f64> {
            self.samples.iter().map(|s| s.irms[channel]).collect()
        };
        let wire = WireBatch {
            time: self
                .samples
                .iter()
                .map(|s| format_timestamp(s.timestamp))
                .collect::<anyhow::Result<_>>()?,
            irms1: column(Channel::Ct1),
            irms2: column(Channel::Ct2),
            irms3: column(Channel::Ct3),
        };
        Ok(serde_json::to_string(&wire)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn truncates_instead_of_rounding() {
        assert_eq!(truncate_2dp(12.3456), 12.34);
        assert_eq!(truncate_2dp(0.009), 0.0);
        assert_eq!(truncate_2dp(7.0), 7.0);
    }

    #[test]
    fn rounds_to_nearest_multiple() {
        assert_eq!(round_to_nearest_multiple(125, 60), 120);
        assert_eq!(round_to_nearest_multiple(150, 60), 180);
        assert_eq!(round_to_nearest_multiple(179, 60), 180);
        assert_eq!(round_to_nearest_multiple(240, 60), 240);
        assert_eq!(round_to_nearest_multiple(42, 0), 42);
    }

    #[test]
    fn rounds_odd_intervals_to_nearest() {
        assert_eq!(round_to_nearest_multiple(22, 15), 15);
        assert_eq!(round_to_nearest_multiple(23, 15), 30);
        assert_eq!(round_to_nearest_multiple(10, 7), 7);
        assert_eq!(round_to_nearest_multiple(11, 7), 14);
        assert_eq!(round_to_nearest_multiple(37, 25), 25);
        assert_eq!(round_to_nearest_multiple(38, 25), 50);
    }

    #[test]
    fn formats_day_first() {
        assert_eq!(format_timestamp(120).unwrap(), "01/01/1970 00:02:00");
        assert_eq!(
            format_timestamp(1_700_000_000).unwrap(),
            "14/11/2023 22:13:20"
        );
    }

    #[test]
    fn samples_are_truncated() {
        let sample = Sample::new(60, EnumMap::from_array([12.3456, 0.019, 3.999]));
        assert_eq!(sample.irms, EnumMap::from_array([12.34, 0.01, 3.99]));
    }

    #[test]
    fn serializes_columns() {
        let mut batch = Batch::default();
        batch.push(Sample::new(120, EnumMap::from_array([1.234, 2.5, 0.0])));
        batch.push(Sample::new(180, EnumMap::from_array([1.5, 2.0, 0.25])));

        let json: Value = serde_json::from_str(&batch.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            json!({
                "Time": ["01/01/1970 00:02:00", "01/01/1970 00:03:00"],
                "IRMS1": [1.23, 1.5],
                "IRMS2": [2.5, 2.0],
                "IRMS3": [0.0, 0.25],
            })
        );
    }

    #[test]
    fn clear_empties_the_batch() {
        let mut batch = Batch::with_capacity(2);
        batch.push(Sample::new(0, EnumMap::default()));
        assert_eq!(batch.len(), 1);
        batch.clear();
        assert!(batch.is_empty());
    }
}
