pub mod adc;
pub mod nvs;
pub mod uplink;
pub mod watchdog;
