use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{AdcChannelDriver, AdcDriver, config::AdcChannelConfig},
    },
    gpio::ADCPin,
    peripheral::Peripheral,
};
use esp_idf_sys::EspError;

use crate::adc::SampleSource;

/// One current transformer input read through the oneshot ADC driver
pub struct OneshotSource<'d, T: ADCPin> {
    channel: AdcChannelDriver<'d, T, &'d AdcDriver<'d, T::Adc>>,
}

impl<'d, T: ADCPin> OneshotSource<'d, T> {
    pub fn new(adc: &'d AdcDriver<'d, T::Adc>, pin: impl Peripheral<P = T> + 'd) -> Result<Self, EspError> {
        let config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        Ok(Self {
            channel: AdcChannelDriver::new(adc, pin, &config)?,
        })
    }
}

impl<T: ADCPin> SampleSource for OneshotSource<'_, T> {
    fn read(&mut self) -> u16 {
        self.channel.read_raw().unwrap_or(0)
    }
}
