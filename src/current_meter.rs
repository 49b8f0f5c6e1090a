use crate::adc::SampleSource;

const ADC_BITS: u32 = 12;
const ADC_COUNTS: f64 = (1 << ADC_BITS) as f64;
const SUPPLY_VOLTS: f64 = 3.3;

/// Raw ADC samples taken per channel on every sampling cycle
pub const SAMPLES_PER_CYCLE: usize = 1480;

/// RMS current estimation for one current transformer input.
///
/// The DC bias of the burden circuit is tracked with a slow low-pass filter
/// that survives between calls, so the first cycles after boot read a bit high
/// until the offset has converged.
#[derive(Debug)]
pub struct CurrentMeter<S: SampleSource> {
    source: S,
    calibration: f64,
    offset: f64,
}

impl<S: SampleSource> CurrentMeter<S> {
    pub fn new(source: S, calibration: f64) -> Self {
        Self {
            source,
            calibration,
            offset: ADC_COUNTS / 2.0,
        }
    }

    pub fn calibration(&self) -> f64 {
        self.calibration
    }

    /// Replaces the calibration factor, keeping the input and filter state
    pub fn set_calibration(&mut self, calibration: f64) {
        self.calibration = calibration;
    }

    /// Reads `samples` raw values and returns the RMS current in amperes
    pub fn calc_irms(&mut self, samples: usize) -> f64 {
        if samples == 0 {
            return 0.0;
        }

        let mut sum = 0.0;
        for _ in 0..samples {
            let sample = self.source.read() as f64;
            self.offset += (sample - self.offset) / ADC_COUNTS;
            let filtered = sample - self.offset;
            sum += filtered * filtered;
        }

        let ratio = self.calibration * (SUPPLY_VOLTS / ADC_COUNTS);
        ratio * (sum / samples as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adc::fake::{Flat, Sine, SquareWave};
    use std::f64::consts::SQRT_2;

    fn ratio(calibration: f64) -> f64 {
        calibration * SUPPLY_VOLTS / ADC_COUNTS
    }

    #[test]
    fn flat_input_reads_zero() {
        let mut meter = CurrentMeter::new(Flat(2048), 60.0);
        assert_eq!(meter.calc_irms(SAMPLES_PER_CYCLE), 0.0);
    }

    #[test]
    fn zero_samples_reads_zero() {
        let mut meter = CurrentMeter::new(Flat(4000), 60.0);
        assert_eq!(meter.calc_irms(0), 0.0);
    }

    #[test]
    fn square_wave_reads_its_amplitude() {
        let mut meter = CurrentMeter::new(SquareWave::new(500), 60.0);

        let irms = meter.calc_irms(SAMPLES_PER_CYCLE);
        let expected = 500.0 * ratio(60.0);
        assert!((irms - expected).abs() / expected < 0.01, "{irms} vs {expected}");
    }

    #[test]
    fn sine_wave_reads_peak_over_sqrt2() {
        // 1480 samples are 10 full periods
        let mut meter = CurrentMeter::new(Sine::new(1000.0, 148), 80.0);

        let irms = meter.calc_irms(SAMPLES_PER_CYCLE);
        let expected = 1000.0 / SQRT_2 * ratio(80.0);
        assert!((irms - expected).abs() / expected < 0.02, "{irms} vs {expected}");
    }

    #[test]
    fn calibration_scales_linearly() {
        let mut meter = CurrentMeter::new(SquareWave::new(100), 10.0);
        let before = meter.calc_irms(SAMPLES_PER_CYCLE);

        meter.set_calibration(30.0);
        assert_eq!(meter.calibration(), 30.0);
        let after = meter.calc_irms(SAMPLES_PER_CYCLE);
        assert!((after / before - 3.0).abs() < 0.01);
    }
}
