//! Best-effort delivery of serialized batches to the remote logging endpoint.

#[cfg(test)]
use mockall::automock;

/// Network path to the logging endpoint
#[cfg_attr(test, automock)]
pub trait Uplink: Send {
    /// Brings the link up if it went down, blocking for a bounded time
    fn ensure_connected(&mut self) -> anyhow::Result<()>;

    /// POSTs a JSON document and returns the HTTP status code
    fn post_json(&mut self, body: &str) -> anyhow::Result<u16>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    NoConnection(String),
    Transport(String),
    Status(u16),
    Encoding(String),
}

/// What happened to a flushed batch. A dropped batch is gone, nothing retries it.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Delivered { status: u16 },
    Dropped(DropReason),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Redirects count as success, the upstream script answers POSTs with 302
pub fn is_success(status: u16) -> bool {
    (200..400).contains(&status)
}

/// Sends one payload, folding every failure into a [`DeliveryOutcome`]
pub fn deliver(uplink: &mut impl Uplink, body: &str) -> DeliveryOutcome {
    if let Err(e) = uplink.ensure_connected() {
        log::warn!("Network down, dropping batch: {e}");
        return DeliveryOutcome::Dropped(DropReason::NoConnection(e.to_string()));
    }

    match uplink.post_json(body) {
        Ok(status) if is_success(status) => {
            log::info!("Batch uploaded, HTTP {status}");
            DeliveryOutcome::Delivered { status }
        }
        Ok(status) => {
            log::warn!("Batch rejected, HTTP {status}");
            DeliveryOutcome::Dropped(DropReason::Status(status))
        }
        Err(e) => {
            log::warn!("Batch upload failed: {e}");
            DeliveryOutcome::Dropped(DropReason::Transport(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    #[test]
    fn delivers_on_success() {
        let mut uplink = MockUplink::new();
        uplink.expect_ensure_connected().once().returning(|| Ok(()));
        uplink
            .expect_post_json()
            .with(eq("{}"))
            .once()
            .returning(|_| Ok(302));

        assert_eq!(
            deliver(&mut uplink, "{}"),
            DeliveryOutcome::Delivered { status: 302 }
        );
    }

    #[test]
    fn drops_without_posting_when_offline() {
        let mut uplink = MockUplink::new();
        uplink
            .expect_ensure_connected()
            .once()
            .returning(|| Err(anyhow::anyhow!("no AP")));
        uplink.expect_post_json().never();

        assert_eq!(
            deliver(&mut uplink, "{}"),
            DeliveryOutcome::Dropped(DropReason::NoConnection("no AP".into()))
        );
    }

    #[test]
    fn drops_on_error_status() {
        let mut uplink = MockUplink::new();
        uplink.expect_ensure_connected().returning(|| Ok(()));
        uplink.expect_post_json().returning(|_| Ok(500));

        let outcome = deliver(&mut uplink, "{}");
        assert_eq!(outcome, DeliveryOutcome::Dropped(DropReason::Status(500)));
        assert!(!outcome.is_delivered());
    }

    #[test]
    fn drops_on_transport_error() {
        let mut uplink = MockUplink::new();
        uplink.expect_ensure_connected().returning(|| Ok(()));
        uplink
            .expect_post_json()
            .returning(|_| Err(anyhow::anyhow!("timeout")));

        assert_eq!(
            deliver(&mut uplink, "{}"),
            DeliveryOutcome::Dropped(DropReason::Transport("timeout".into()))
        );
    }
}
