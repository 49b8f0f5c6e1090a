#![allow(unexpected_cfgs)]

#[cfg(target_os = "espidf")]
mod config;
#[cfg(target_os = "espidf")]
mod httpd;

#[cfg(target_os = "espidf")]
use {
    config::DeviceConfig,
    embedded_svc::{
        ipv4::{self, DHCPClientSettings},
        wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration},
    },
    esp_idf_hal::{
        adc::{ADC1, oneshot::AdcDriver},
        gpio::{Gpio34, Gpio36, Gpio39},
    },
    esp_idf_svc::{
        eventloop::EspSystemEventLoop,
        netif::{EspNetif, NetifConfiguration, NetifStack},
        nvs::EspDefaultNvsPartition,
        sntp::EspSntp,
        wifi::{EspWifi, WifiDriver},
    },
    esp_idf_sys::*,
    powermeter::{
        MeterState,
        adc::SampleSource,
        batcher::LogBatcher,
        clock::SystemClock,
        driver::{adc::OneshotSource, nvs::NvsStore, uplink::EspUplink, watchdog::EspWatchdog},
        logger::RingLogger,
        sampler::Sampler,
        store::SettingsStore,
        update::SettingsUpdater,
    },
    std::{error::Error, ffi::CStr, sync::Arc, thread},
};

#[cfg(target_os = "espidf")]
esp_idf_sys::esp_app_desc! {}

/// Applies the pthread settings for the next spawned thread
#[cfg(target_os = "espidf")]
fn thread_config(name: &'static CStr, stack_size: usize, prio: usize, core: i32) -> Result<(), EspError> {
    unsafe {
        let mut cfg = esp_pthread_get_default_config();
        cfg.stack_size = stack_size;
        cfg.prio = prio;
        cfg.inherit_cfg = false;
        cfg.thread_name = name.as_ptr();
        cfg.pin_to_core = core;
        esp!(esp_pthread_set_cfg(&cfg))
    }
}

#[cfg(target_os = "espidf")]
fn sample(adc: ADC1, ct1: Gpio34, ct2: Gpio36, ct3: Gpio39, state: MeterState) -> anyhow::Result<()> {
    let adc = AdcDriver::new(adc)?;
    let sources: [Box<dyn SampleSource + '_>; 3] = [
        Box::new(OneshotSource::new(&adc, ct1)?),
        Box::new(OneshotSource::new(&adc, ct2)?),
        Box::new(OneshotSource::new(&adc, ct3)?),
    ];
    Sampler::new(sources, state).run()
}

#[cfg(target_os = "espidf")]
fn main() -> Result<(), Box<dyn Error>> {
    esp_idf_svc::sys::link_patches();

    // Initialize our in-memory logger
    let ring_logger = Box::new(RingLogger::new(log::LevelFilter::Info));
    let ring_buffer = ring_logger.buffer.clone();
    log::set_boxed_logger(ring_logger)?;
    log::set_max_level(log::LevelFilter::Info);
    println!("Started logger");

    let peripherals = esp_idf_hal::peripherals::Peripherals::take()?;
    let pins = peripherals.pins;

    // Device config and meter settings share one namespace
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs = NvsStore::open(nvs_partition.clone(), config::NAMESPACE)?;
    let config = DeviceConfig::load(&nvs)?;
    log::info!("{config:?}");

    let store = Arc::new(SettingsStore::new(nvs));
    let state = MeterState::new(store.load_settings()?);
    let updater = SettingsUpdater::new(state.settings.clone(), store);
    log::info!("Meter settings: {:?}", state.settings.settings());

    // Build Wifi configurations
    let mut ap_config = AccessPointConfiguration {
        ssid: config
            .ap
            .ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow::anyhow!("AP SSID too long"))?,
        ..Default::default()
    };
    if let Some(password) = &config.ap.psk {
        ap_config.auth_method = AuthMethod::WPA2Personal;
        ap_config.password = password
            .as_str()
            .try_into()
            .map_err(|_| anyhow::anyhow!("AP password too long"))?;
    }

    let wifi_config = if let Some(sta) = &config.sta {
        let mut sta_config = ClientConfiguration {
            ssid: sta
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow::anyhow!("SSID too long"))?,
            ..Default::default()
        };
        if let Some(password) = &sta.psk {
            sta_config.auth_method = AuthMethod::WPA2Personal;
            sta_config.password = password
                .as_str()
                .try_into()
                .map_err(|_| anyhow::anyhow!("password too long"))?;
        }
        embedded_svc::wifi::Configuration::Mixed(sta_config, ap_config)
    } else {
        log::warn!("No station configured, batches cannot be uploaded");
        embedded_svc::wifi::Configuration::AccessPoint(ap_config)
    };

    // Initialize Wifi
    let mut wifi_client_conf = NetifConfiguration::wifi_default_client();
    wifi_client_conf.ip_configuration = Some(ipv4::Configuration::Client(
        ipv4::ClientConfiguration::DHCP(DHCPClientSettings {
            hostname: Some(
                config
                    .hostname
                    .as_str()
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("hostname too long"))?,
            ),
        }),
    ));
    let wifi = Box::leak(Box::new(EspWifi::wrap_all(
        WifiDriver::new(peripherals.modem, EspSystemEventLoop::take()?, Some(nvs_partition))?,
        EspNetif::new_with_conf(&wifi_client_conf)?,
        EspNetif::new(NetifStack::Ap)?,
    )?));
    wifi.set_configuration(&wifi_config)?;
    wifi.start()?;
    if config.sta.is_some() {
        if let Err(e) = wifi.connect() {
            log::warn!("Wifi connect failed, retrying on first upload: {e}");
        }
    }

    // NTP
    let _ntp = EspSntp::new_default()?;

    // Sampling loop
    thread_config(c"sampler", 4096, 2, 1)?;
    let st = state.clone();
    let (adc, ct1, ct2, ct3) = (peripherals.adc1, pins.gpio34, pins.gpio36, pins.gpio39);
    thread::Builder::new().stack_size(4096).spawn(move || {
        if let Err(e) = sample(adc, ct1, ct2, ct3, st) {
            log::error!("Sampler failed: {e:#}");
            unsafe { esp_restart() };
        }
    })?;

    // Batching and upload loop
    thread_config(c"batcher", 12 * 1024, 1, 0)?;
    let batcher = LogBatcher::new(
        state.clone(),
        SystemClock::new(config.utc_offset_secs),
        EspUplink::new(wifi, config.upload_url.clone()),
        EspWatchdog,
    );
    thread::Builder::new()
        .stack_size(12 * 1024)
        .spawn(move || batcher.run())?;

    // Initialize HTTP server
    log::info!("Starting HTTPd");
    let _httpd = httpd::start(ring_buffer, state, updater)?;
    httpd::ota::confirm_running_image();
    log::info!("HTTP running");

    loop {
        thread::park();
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("powermeter is ESP32 firmware, on the host only the library tests run");
}
