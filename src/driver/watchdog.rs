use esp_idf_sys::*;

use crate::watchdog::Watchdog;

/// ESP task watchdog watching the calling thread
pub struct EspWatchdog;

impl Watchdog for EspWatchdog {
    fn init(&self, timeout: std::time::Duration) {
        let config = esp_task_wdt_config_t {
            timeout_ms: timeout.as_millis() as u32,
            idle_core_mask: 0,
            trigger_panic: true,
        };
        unsafe {
            // The bootloader may have started the watchdog already
            if esp_task_wdt_init(&config) == ESP_ERR_INVALID_STATE as esp_err_t {
                esp_task_wdt_reconfigure(&config);
            }
            if esp_task_wdt_status(std::ptr::null_mut()) == ESP_ERR_NOT_FOUND as esp_err_t {
                esp_task_wdt_add(std::ptr::null_mut());
            }
        }
    }

    fn reset(&self) {
        unsafe { esp_task_wdt_reset() };
    }
}
