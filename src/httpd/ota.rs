use std::{thread, time::Duration};

use embedded_svc::http::Method;
use embedded_svc::io::{Read, Write};
use esp_idf_svc::http::server::{EspHttpConnection, EspHttpServer, Request};
use esp_idf_svc::ota::EspOta;
use esp_idf_sys::EspError;
use powermeter::ota::{LogListener, OtaEvent, OtaListener};

const CHUNK_SIZE: usize = 4096;

/// Streams the request body into the inactive slot, reporting progress
fn write_image(
    req: &mut Request<&mut EspHttpConnection>,
    listener: &dyn OtaListener,
) -> anyhow::Result<u64> {
    let total = req
        .header("Content-Length")
        .and_then(|len| len.parse::<u64>().ok());
    listener.on_event(&OtaEvent::Started { total });

    let mut ota = EspOta::new()?;
    let mut update = ota.initiate_update()?;
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let read = match req.read(&mut chunk) {
            Ok(read) => read,
            Err(e) => {
                update.abort()?;
                return Err(e.into());
            }
        };
        if read == 0 {
            break;
        }
        if let Err(e) = update.write_all(&chunk[..read]) {
            update.abort()?;
            return Err(e.into());
        }
        written += read as u64;
        listener.on_event(&OtaEvent::Progress { written, total });
    }
    update.complete()?;

    Ok(written)
}

fn firmware_update(mut req: Request<&mut EspHttpConnection>) -> anyhow::Result<()> {
    let listener = LogListener::default();
    match write_image(&mut req, &listener) {
        Ok(bytes) => {
            listener.on_event(&OtaEvent::Finished { bytes });
            req.into_ok_response()?
                .write_all(b"Update complete, restarting")?;
            thread::spawn(|| {
                thread::sleep(Duration::from_secs(1));
                unsafe { esp_idf_sys::esp_restart() };
            });
        }
        Err(e) => {
            listener.on_event(&OtaEvent::Failed(format!("{e:#}")));
            req.into_status_response(500)?
                .write_all(format!("Update failed: {e:#}").as_bytes())?;
        }
    }
    Ok(())
}

/// Marks the running image as good so the bootloader keeps it
pub fn confirm_running_image() {
    match EspOta::new().and_then(|mut ota| ota.mark_running_slot_valid()) {
        Ok(()) => log::info!("Running firmware marked valid"),
        Err(e) => log::warn!("Could not mark running firmware valid: {e}"),
    }
}

pub fn register(httpd: &mut EspHttpServer<'static>) -> Result<(), EspError> {
    httpd.fn_handler("/update", Method::Post, firmware_update)?;
    Ok(())
}
