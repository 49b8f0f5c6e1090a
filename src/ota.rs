//! Firmware update lifecycle, reported as a closed set of events.

#[derive(Debug, Clone, PartialEq)]
pub enum OtaEvent {
    Started { total: Option<u64> },
    Progress { written: u64, total: Option<u64> },
    Finished { bytes: u64 },
    Failed(String),
}

pub trait OtaListener: Send + Sync {
    fn on_event(&self, event: &OtaEvent);
}

/// Whole percentage, when the size of the image is known
pub fn progress_percent(written: u64, total: Option<u64>) -> Option<u8> {
    match total {
        Some(0) | None => None,
        Some(total) => Some((written.min(total) * 100 / total) as u8),
    }
}

/// Writes update progress to the log, one line per percent
#[derive(Debug, Default)]
pub struct LogListener {
    last_percent: std::sync::Mutex<Option<u8>>,
}

impl OtaListener for LogListener {
    fn on_event(&self, event: &OtaEvent) {
        match event {
            OtaEvent::Started { total: Some(total) } => {
                log::info!("Firmware update started, {total} bytes")
            }
            OtaEvent::Started { total: None } => log::info!("Firmware update started"),
            OtaEvent::Progress { written, total } => {
                if let Some(percent) = progress_percent(*written, *total) {
                    let mut last = crate::lock(&self.last_percent);
                    if *last != Some(percent) {
                        log::info!("Firmware update {percent}%");
                        *last = Some(percent);
                    }
                }
            }
            OtaEvent::Finished { bytes } => log::info!("Firmware update written, {bytes} bytes"),
            OtaEvent::Failed(reason) => log::error!("Firmware update failed: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_needs_a_known_size() {
        assert_eq!(progress_percent(10, None), None);
        assert_eq!(progress_percent(10, Some(0)), None);
        assert_eq!(progress_percent(512, Some(1024)), Some(50));
        assert_eq!(progress_percent(2048, Some(1024)), Some(100));
    }

    #[test]
    fn listener_remembers_last_percent() {
        let listener = LogListener::default();
        listener.on_event(&OtaEvent::Progress {
            written: 10,
            total: Some(100),
        });
        listener.on_event(&OtaEvent::Progress {
            written: 20,
            total: Some(200),
        });
        assert_eq!(*listener.last_percent.lock().unwrap(), Some(10));
        listener.on_event(&OtaEvent::Progress {
            written: 99,
            total: None,
        });
        assert_eq!(*listener.last_percent.lock().unwrap(), Some(10));
    }
}
