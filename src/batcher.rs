//! Wall-clock aligned accumulation of readings and their periodic upload.
//!
//! The batcher cycles through three phases:
//!
//! - **Alignment**: only for intervals that are a multiple of 5 seconds. The
//!   clock is polled until the epoch is an exact multiple of the interval while
//!   readings are settled, so windows start on clean boundaries (on the minute
//!   for a 60 s interval).
//! - **Accumulation**: every interval one sample is taken, stamped with the
//!   epoch rounded to the interval.
//! - **Flush**: once the batch holds the configured number of samples it is
//!   uploaded and cleared, whether the upload worked or not.
//!
//! The watchdog is fed on every completed tick and every alignment poll. A
//! batcher stuck for longer than `interval + 20` seconds restarts the device.

use std::{thread, time::Duration};

use thiserror::Error;

use crate::batch::{Batch, Sample, round_to_nearest_multiple};
use crate::clock::Clock;
use crate::schedule::Pacer;
use crate::uplink::{DeliveryOutcome, DropReason, Uplink, deliver};
use crate::watchdog::Watchdog;
use crate::MeterState;

pub const ALIGNMENT_POLL: Duration = Duration::from_millis(50);
pub const WATCHDOG_GRACE_SECS: u64 = 20;
const MIN_TICK_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// Readings are not (or no longer) settled, the window is over
    Unsettled,
    /// Wall-clock time is not known yet, nothing was recorded
    NoClock,
    Sampled { count: usize },
    Flushed(DeliveryOutcome),
}

#[derive(Debug, Error, PartialEq)]
#[error("no aligned instant found after {polls} polls")]
pub struct AlignmentTimeout {
    pub polls: u64,
}

/// Number of clock polls allowed before an alignment attempt is abandoned
pub fn max_alignment_polls(interval_secs: u32, poll: Duration) -> u64 {
    let budget = Duration::from_secs(2 * interval_secs as u64 + WATCHDOG_GRACE_SECS);
    (budget.as_millis() / poll.as_millis().max(1)) as u64
}

pub struct LogBatcher<C: Clock, U: Uplink, W: Watchdog> {
    state: MeterState,
    clock: C,
    uplink: U,
    watchdog: W,
    batch: Batch,
    poll_interval: Duration,
    tick_period: Option<Duration>,
    armed_interval: Option<u32>,
}

impl<C: Clock, U: Uplink, W: Watchdog> LogBatcher<C, U, W> {
    pub fn new(state: MeterState, clock: C, uplink: U, watchdog: W) -> Self {
        let capacity = state.settings.settings().measurements_per_batch as usize;
        Self {
            state,
            clock,
            uplink,
            watchdog,
            batch: Batch::with_capacity(capacity),
            poll_interval: ALIGNMENT_POLL,
            tick_period: None,
            armed_interval: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Fixed tick period instead of the configured interval
    pub fn with_tick_period(mut self, tick_period: Duration) -> Self {
        self.tick_period = Some(tick_period);
        self
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    fn arm_watchdog(&mut self, interval_secs: u32) {
        if self.armed_interval != Some(interval_secs) {
            let timeout = Duration::from_secs(interval_secs as u64 + WATCHDOG_GRACE_SECS);
            log::info!("Batcher watchdog timeout set to {timeout:?}");
            self.watchdog.init(timeout);
            self.armed_interval = Some(interval_secs);
        }
    }

    /// Polls until the epoch is a multiple of `interval_secs` and readings are
    /// settled, returning that epoch
    pub fn wait_for_alignment(&mut self, interval_secs: u32) -> Result<u64, AlignmentTimeout> {
        let polls = max_alignment_polls(interval_secs, self.poll_interval);
        for _ in 0..polls {
            self.watchdog.reset();
            if let Some(now) = self.clock.epoch_seconds() {
                if now % interval_secs as u64 == 0 && self.state.settled_irms().is_some() {
                    return Ok(now);
                }
            }
            thread::sleep(self.poll_interval);
        }
        Err(AlignmentTimeout { polls })
    }

    /// One accumulation step: records a sample and flushes a full batch
    pub fn tick(&mut self) -> Tick {
        let settings = self.state.settings.settings();
        let Some(irms) = self.state.settled_irms() else {
            return Tick::Unsettled;
        };

        let batch_size = settings.measurements_per_batch as usize;
        if self.batch.len() < batch_size {
            let Some(now) = self.clock.epoch_seconds() else {
                log::warn!("Wall clock not synchronised, skipping sample");
                return Tick::NoClock;
            };
            let timestamp = round_to_nearest_multiple(now, settings.interval_secs as u64);
            self.batch.push(Sample::new(timestamp, irms));
        }

        if self.batch.len() >= batch_size {
            Tick::Flushed(self.flush())
        } else {
            Tick::Sampled {
                count: self.batch.len(),
            }
        }
    }

    /// Uploads and clears the batch. The batch is gone afterwards even if the
    /// upload failed.
    pub fn flush(&mut self) -> DeliveryOutcome {
        let samples = self.batch.len();
        let payload = self.batch.to_json();
        self.batch.clear();

        match payload {
            Ok(body) => {
                log::debug!("Uploading {samples} samples: {body}");
                deliver(&mut self.uplink, &body)
            }
            Err(e) => {
                log::error!("Could not encode batch: {e}");
                DeliveryOutcome::Dropped(DropReason::Encoding(e.to_string()))
            }
        }
    }

    /// Ticks until readings become unsettled, returning the completed ticks.
    /// Whatever the batch still holds at that point is discarded.
    fn accumulate(&mut self) -> usize {
        let mut ticks = 0;
        loop {
            let interval = self.state.settings.settings().interval_secs;
            let period = self
                .tick_period
                .unwrap_or(Duration::from_secs(interval as u64));
            let pacer = Pacer::start(period);

            if self.tick() == Tick::Unsettled {
                if !self.batch.is_empty() {
                    log::info!("Discarding {} samples of an interrupted batch", self.batch.len());
                    self.batch.clear();
                }
                // Also keeps the unaligned path from spinning while warming up
                thread::sleep(self.poll_interval);
                return ticks;
            }

            ticks += 1;
            self.watchdog.reset();
            thread::sleep(pacer.remaining().max(MIN_TICK_DELAY));
        }
    }

    /// One logging window: arm the watchdog for the current interval, align
    /// to the wall clock when the interval allows it, then accumulate until
    /// readings unsettle
    pub fn run_window(&mut self) -> Result<usize, AlignmentTimeout> {
        let settings = self.state.settings.settings();
        self.arm_watchdog(settings.interval_secs);

        if settings.aligns_to_wall_clock() {
            let epoch = self.wait_for_alignment(settings.interval_secs)?;
            log::info!("Logging window aligned at epoch {epoch}");
        }

        Ok(self.accumulate())
    }

    pub fn run(mut self) -> ! {
        log::info!("Batcher running");
        loop {
            match self.run_window() {
                Ok(0) => {}
                Ok(ticks) => log::info!("Logging window closed after {ticks} ticks"),
                Err(e) => log::warn!("Alignment abandoned: {e}"),
            }
        }
    }
}
