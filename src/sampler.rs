//! Continuous RMS sampling of the three current inputs.

use std::{thread, time::Duration};

use enum_map::EnumMap;

use crate::adc::{Channel, SampleSource};
use crate::current_meter::{CurrentMeter, SAMPLES_PER_CYCLE};
use crate::measurement::{Measurement, SettledGate};
use crate::schedule::Pacer;
use crate::MeterState;

pub const CYCLE_PERIOD: Duration = Duration::from_millis(1000);

pub struct Sampler<S: SampleSource> {
    meters: EnumMap<Channel, CurrentMeter<S>>,
    state: MeterState,
    gate: SettledGate,
    generation: Option<u32>,
    samples_per_cycle: usize,
}

impl<S: SampleSource> Sampler<S> {
    pub fn new(sources: [S; 3], state: MeterState) -> Self {
        let calibration = state.settings.settings().calibration;
        let [ct1, ct2, ct3] = sources;
        let meters = EnumMap::from_array([
            CurrentMeter::new(ct1, calibration[Channel::Ct1]),
            CurrentMeter::new(ct2, calibration[Channel::Ct2]),
            CurrentMeter::new(ct3, calibration[Channel::Ct3]),
        ]);

        Self {
            meters,
            state,
            gate: SettledGate::default(),
            generation: None,
            samples_per_cycle: SAMPLES_PER_CYCLE,
        }
    }

    pub fn with_samples_per_cycle(mut self, samples: usize) -> Self {
        self.samples_per_cycle = samples;
        self
    }

    /// Runs one sampling cycle and publishes its result.
    ///
    /// New settings are picked up here, before any channel is read, so a cycle
    /// never mixes calibration factors from two settings generations.
    pub fn cycle(&mut self) -> Measurement {
        let snapshot = self.state.settings.snapshot();
        if self.generation != Some(snapshot.generation) {
            for (channel, meter) in &mut self.meters {
                meter.set_calibration(snapshot.settings.calibration[channel]);
            }
            if self.generation.is_some() {
                log::info!(
                    "Settings generation {} applied, waiting for readings to settle",
                    snapshot.generation
                );
            }
            self.gate.reset();
            self.generation = Some(snapshot.generation);
        }

        let mut irms = EnumMap::default();
        for (channel, meter) in &mut self.meters {
            irms[channel] = meter.calc_irms(self.samples_per_cycle);
        }

        let was_settled = self.gate.is_settled();
        self.gate.advance();

        let measurement = Measurement {
            irms,
            power: irms[Channel::Ct1] * snapshot.settings.house_voltage,
            settled: self.gate.is_settled(),
            generation: snapshot.generation,
        };
        if measurement.settled && !was_settled {
            log::info!("Readings settled");
        }
        log::debug!(
            "Irms {:.3} / {:.3} / {:.3} A, {:.1} W",
            irms[Channel::Ct1],
            irms[Channel::Ct2],
            irms[Channel::Ct3],
            measurement.power
        );

        self.state.measurement.publish(measurement);
        measurement
    }

    pub fn run(mut self) -> ! {
        log::info!(
            "Sampler running, {} samples per channel every {:?}",
            self.samples_per_cycle,
            CYCLE_PERIOD
        );
        loop {
            let pacer = Pacer::start(CYCLE_PERIOD);
            self.cycle();

            let wait = pacer.remaining();
            if wait.is_zero() {
                thread::yield_now();
            } else {
                thread::sleep(wait);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adc::fake::{Flat, SquareWave};
    use crate::settings::MeterSettings;

    fn sampler(state: &MeterState) -> Sampler<Box<dyn SampleSource>> {
        let sources: [Box<dyn SampleSource>; 3] = [
            Box::new(SquareWave::new(400)),
            Box::new(SquareWave::new(200)),
            Box::new(Flat(2048)),
        ];
        Sampler::new(sources, state.clone()).with_samples_per_cycle(200)
    }

    #[test]
    fn settles_on_fifth_cycle() {
        let state = MeterState::default();
        let mut sampler = sampler(&state);

        for _ in 0..4 {
            assert!(!sampler.cycle().settled);
            assert_eq!(state.settled_irms(), None);
        }
        assert!(sampler.cycle().settled);
        assert!(state.settled_irms().is_some());
    }

    #[test]
    fn publishes_all_channels_and_power() {
        let state = MeterState::default();
        let mut sampler = sampler(&state);

        let m = sampler.cycle();
        assert_eq!(state.measurement.snapshot(), m);
        assert!(m.irms[Channel::Ct1] > m.irms[Channel::Ct2]);
        assert!(m.irms[Channel::Ct2] > 0.0);
        assert_eq!(m.irms[Channel::Ct3], 0.0);
        assert_eq!(m.power, m.irms[Channel::Ct1] * 230.0);
    }

    #[test]
    fn settings_change_rebinds_calibration_and_rewarms() {
        let state = MeterState::default();
        let mut sampler = sampler(&state);
        for _ in 0..6 {
            sampler.cycle();
        }
        let before = state.settled_irms().unwrap();

        let mut settings = MeterSettings::default();
        settings.calibration[Channel::Ct1] *= 2.0;
        settings.house_voltage = 110.0;
        state.settings.replace(settings);

        // Stale readings are hidden before the sampler even runs
        assert_eq!(state.settled_irms(), None);

        for _ in 0..4 {
            let m = sampler.cycle();
            assert!(!m.settled);
            assert_eq!(m.generation, 1);
        }
        let m = sampler.cycle();
        assert!(m.settled);
        assert_eq!(sampler.meters[Channel::Ct1].calibration(), settings.calibration[Channel::Ct1]);
        assert_eq!(m.power, m.irms[Channel::Ct1] * 110.0);

        let after = state.settled_irms().unwrap();
        let ratio = after[Channel::Ct1] / before[Channel::Ct1];
        assert!((ratio - 2.0).abs() < 0.01, "{ratio}");
    }
}
