use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use askama::Template;
use embedded_svc::{http::Method, io::Write, utils::io::try_read_full};
use esp_idf_svc::http::server::{Configuration, EspHttpConnection, EspHttpServer, Request};
use powermeter::{
    MeterState,
    api::{SettingsPayload, StatusPayload, update_reply},
    driver::nvs::NvsStore,
    logger::LogRing,
    settings::MAX_FORM_BYTES,
    update::SettingsUpdater,
};
use serde::Serialize;

pub mod ota;

#[derive(Template)]
#[template(path = "log.html")]
struct LogTemplate<'a> {
    lines: Vec<&'a str>,
}

fn json(req: Request<&mut EspHttpConnection>, value: &impl Serialize) -> anyhow::Result<()> {
    let mut response = req.into_response(200, Some("OK"), &[("Content-Type", "application/json")])?;
    response.write_all(&serde_json::to_vec(value)?)?;
    Ok(())
}

fn restart(req: Request<&mut EspHttpConnection>) -> anyhow::Result<()> {
    log::info!("Restart requested");
    thread::spawn(|| {
        thread::sleep(Duration::from_secs(1));
        unsafe { esp_idf_sys::esp_restart() };
    });
    req.into_ok_response()?.write_all(b"Restarting")?;
    Ok(())
}

pub fn start(
    log_buffer: Arc<Mutex<LogRing>>,
    state: MeterState,
    updater: SettingsUpdater<NvsStore>,
) -> anyhow::Result<EspHttpServer<'static>> {
    let mut httpd = EspHttpServer::new(&Configuration::default())?;

    let st = state.clone();
    httpd.fn_handler("/status", Method::Get, move |req: Request<&mut EspHttpConnection>| {
        json(req, &StatusPayload::from_state(&st))
    })?;

    httpd.fn_handler("/settings", Method::Get, move |req: Request<&mut EspHttpConnection>| {
        json(req, &SettingsPayload::from(&state.settings.settings()))
    })?;

    httpd.fn_handler(
        "/update-settings",
        Method::Post,
        move |mut req: Request<&mut EspHttpConnection>| -> anyhow::Result<()> {
            // One byte of headroom so an oversized body is seen and rejected
            let mut data = [0u8; MAX_FORM_BYTES + 1];
            let len = try_read_full(&mut req, &mut data).map_err(|(e, _)| e)?;
            let result = updater.update_from_form(&data[..len]);
            if let Err(e) = &result {
                log::warn!("Settings update rejected: {e}");
            }

            let (status, body) = update_reply(&result);
            req.into_response(status, None, &[("Content-Type", "text/plain")])?
                .write_all(body.as_bytes())?;
            Ok(())
        },
    )?;

    httpd.fn_handler("/restart", Method::Post, restart)?;

    httpd.fn_handler(
        "/log",
        Method::Get,
        move |req: Request<&mut EspHttpConnection>| -> anyhow::Result<()> {
            let page = {
                let ring = log_buffer.lock().map_err(|e| anyhow::anyhow!("{e}"))?;
                LogTemplate {
                    lines: ring.iter().collect(),
                }
                .render()?
            };
            req.into_ok_response()?.write_all(page.as_bytes())?;
            Ok(())
        },
    )?;

    ota::register(&mut httpd)?;

    Ok(httpd)
}
