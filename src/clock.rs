use std::time::{SystemTime, UNIX_EPOCH};

/// 2020-01-01T00:00:00Z, anything earlier means SNTP has not synced yet
pub const MIN_VALID_EPOCH: u64 = 1_577_836_800;

/// Wall-clock source in epoch seconds, `None` while time is unknown
pub trait Clock: Send {
    fn epoch_seconds(&self) -> Option<u64>;
}

/// System time (set by SNTP on the device) shifted to local time.
///
/// Alignment, rounding and the uploaded timestamps all work on the shifted
/// value, so batches line up with local clock boundaries.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    utc_offset_secs: i64,
}

impl SystemClock {
    pub fn new(utc_offset_secs: i64) -> Self {
        Self { utc_offset_secs }
    }
}

impl Clock for SystemClock {
    fn epoch_seconds(&self) -> Option<u64> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
        if now < MIN_VALID_EPOCH {
            return None;
        }
        now.checked_add_signed(self.utc_offset_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_utc_offset() {
        let utc = SystemClock::new(0).epoch_seconds().unwrap();
        let local = SystemClock::new(5 * 3600).epoch_seconds().unwrap();
        assert!(utc >= MIN_VALID_EPOCH);
        assert!((local - utc).abs_diff(5 * 3600) <= 1);
    }
}
