use std::{thread, time::Duration};

use embedded_svc::{http::client::Client, io::Write};
use esp_idf_svc::{
    http::client::{Configuration, EspHttpConnection},
    wifi::EspWifi,
};

use crate::uplink::Uplink;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_POLL: Duration = Duration::from_millis(250);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts batches over the station interface, reconnecting it when needed
pub struct EspUplink {
    wifi: &'static mut EspWifi<'static>,
    url: String,
}

impl EspUplink {
    pub fn new(wifi: &'static mut EspWifi<'static>, url: String) -> Self {
        Self { wifi, url }
    }

    fn is_up(&self) -> anyhow::Result<bool> {
        Ok(self.wifi.is_connected()? && self.wifi.sta_netif().is_up()?)
    }
}

impl Uplink for EspUplink {
    fn ensure_connected(&mut self) -> anyhow::Result<()> {
        if self.is_up()? {
            return Ok(());
        }

        log::info!("Wifi down, reconnecting");
        self.wifi.connect()?;
        let mut waited = Duration::ZERO;
        while waited < CONNECT_TIMEOUT {
            if self.is_up()? {
                log::info!("Wifi reconnected after {waited:?}");
                return Ok(());
            }
            thread::sleep(CONNECT_POLL);
            waited += CONNECT_POLL;
        }
        anyhow::bail!("no connection after {CONNECT_TIMEOUT:?}")
    }

    fn post_json(&mut self, body: &str) -> anyhow::Result<u16> {
        if self.url.is_empty() {
            anyhow::bail!("no upload URL configured");
        }

        let mut client = Client::wrap(EspHttpConnection::new(&Configuration {
            timeout: Some(REQUEST_TIMEOUT),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        })?);

        let length = body.len().to_string();
        let headers = [
            ("Content-Type", "application/json"),
            ("Content-Length", length.as_str()),
        ];
        let mut request = client.post(&self.url, &headers)?;
        request.write_all(body.as_bytes())?;
        request.flush()?;
        let response = request.submit()?;

        Ok(response.status())
    }
}
