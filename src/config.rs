use powermeter::driver::nvs::NvsStore;

/// NVS namespace shared by the device config and the meter settings
pub const NAMESPACE: &str = "powermeter";

const DEFAULT_HOSTNAME: &str = "powermeter";
const DEFAULT_UTC_OFFSET_SECS: i64 = 5 * 60 * 60;

#[derive(Debug)]
pub struct DeviceConfig {
    pub hostname: String,
    pub sta: Option<WifiConfig>,
    pub ap: WifiConfig,
    pub upload_url: String,
    pub utc_offset_secs: i64,
}

#[derive(Debug)]
pub struct WifiConfig {
    pub ssid: String,
    pub psk: Option<String>,
}

impl DeviceConfig {
    pub fn load(nvs: &NvsStore) -> anyhow::Result<Self> {
        let upload_url = match nvs.get_string("upload.url")? {
            Some(url) => url,
            None => option_env!("POWERMETER_UPLOAD_URL").unwrap_or_default().into(),
        };
        let utc_offset_secs = match nvs.get_string("utc.offset")? {
            Some(offset) => offset.trim().parse().unwrap_or_else(|e| {
                log::warn!("Ignoring invalid utc.offset {offset:?}: {e}");
                DEFAULT_UTC_OFFSET_SECS
            }),
            None => DEFAULT_UTC_OFFSET_SECS,
        };

        Ok(Self {
            hostname: nvs
                .get_string("hostname")?
                .unwrap_or(DEFAULT_HOSTNAME.into()),
            sta: WifiConfig::load(nvs, "sta")?,
            ap: WifiConfig::load(nvs, "ap")?.unwrap_or(WifiConfig {
                ssid: DEFAULT_HOSTNAME.into(),
                psk: None,
            }),
            upload_url,
            utc_offset_secs,
        })
    }
}

impl WifiConfig {
    fn load(nvs: &NvsStore, prefix: &str) -> anyhow::Result<Option<Self>> {
        let Some(ssid) = nvs.get_string(&format!("{prefix}.ssid"))? else {
            return Ok(None);
        };
        Ok(Some(WifiConfig {
            ssid,
            psk: nvs.get_string(&format!("{prefix}.psk"))?,
        }))
    }
}
