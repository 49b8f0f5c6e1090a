use std::sync::{Arc, Mutex};

use enum_map::EnumMap;

use crate::adc::Channel;
use crate::lock;

/// Consecutive sampling cycles required before readings are trusted
pub const WARMUP_CYCLES: u32 = 5;

/// Result of one complete sampling cycle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurement {
    pub irms: EnumMap<Channel, f64>,
    /// Instantaneous power of the first channel at the configured house voltage
    pub power: f64,
    pub settled: bool,
    /// Settings generation the cycle ran with
    pub generation: u32,
}

impl Measurement {
    /// Settled and computed with the settings that are current right now
    pub fn is_settled_for(&self, generation: u32) -> bool {
        self.settled && self.generation == generation
    }
}

/// Latest measurement, written only by the sampler. Each cycle is published
/// as a whole so readers never see values from two different cycles.
#[derive(Debug, Clone, Default)]
pub struct MeasurementCell(Arc<Mutex<Measurement>>);

impl MeasurementCell {
    pub fn publish(&self, measurement: Measurement) {
        *lock(&self.0) = measurement;
    }

    pub fn snapshot(&self) -> Measurement {
        *lock(&self.0)
    }
}

/// Warm-up counter behind the `settled` flag
#[derive(Debug, Default)]
pub struct SettledGate {
    cycles: u32,
}

impl SettledGate {
    pub fn advance(&mut self) {
        self.cycles = self.cycles.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.cycles = 0;
    }

    pub fn is_settled(&self) -> bool {
        self.cycles >= WARMUP_CYCLES
    }
}
