use std::time::Duration;

#[cfg(test)]
use mockall::automock;

/// Supervisory timer that restarts the device unless reset in time
#[cfg_attr(test, automock)]
pub trait Watchdog: Send {
    /// Arms the watchdog for the calling task, or re-arms it with a new timeout
    fn init(&self, timeout: Duration);
    fn reset(&self);
}
