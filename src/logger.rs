use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use log::{LevelFilter, Log};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::lock;

/// Byte budget of the in-memory log
pub const LOG_RING_BYTES: usize = 16 * 1024;

/// Most recent log lines, bounded by their total size in bytes
#[derive(Debug)]
pub struct LogRing {
    lines: VecDeque<String>,
    used: usize,
    capacity: usize,
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new(LOG_RING_BYTES)
    }
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            used: 0,
            capacity,
        }
    }

    /// Adds a line, evicting the oldest ones until it fits
    pub fn append(&mut self, line: &str) {
        if line.is_empty() || line.len() > self.capacity {
            return;
        }

        while self.used + line.len() > self.capacity {
            match self.lines.pop_front() {
                Some(old) => self.used -= old.len(),
                None => break,
            }
        }
        self.used += line.len();
        self.lines.push_back(line.to_owned());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }
}

/// Global logger echoing to the console and keeping a copy in a [`LogRing`]
pub struct RingLogger {
    pub buffer: Arc<Mutex<LogRing>>,
    level: LevelFilter,
}

impl RingLogger {
    pub fn new(level: LevelFilter) -> Self {
        Self {
            buffer: Default::default(),
            level,
        }
    }
}

impl Log for RingLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        println!("[{}] {}", record.level(), record.args());
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        lock(&self.buffer).append(&format!(
            "{} [{}:{}] {}",
            timestamp,
            record.level(),
            record.target(),
            record.args()
        ));
    }

    fn flush(&self) {}
}
