//! Tick drivers.
//!
//! A driver produces the once-per-second tick that advances the engine. The
//! engine never installs or cancels a driver piecemeal: `rearm` replaces any
//! previous driver in one call, so two drivers can never run side by side.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Owner of the repeating tick.
pub trait TickDriver {
    /// Cancel the installed driver (if any) and install a fresh one.
    fn rearm(&mut self);

    /// Cancel the installed driver. No-op when nothing is installed.
    fn cancel(&mut self);

    fn is_armed(&self) -> bool;
}

impl<T: TickDriver + ?Sized> TickDriver for Box<T> {
    fn rearm(&mut self) {
        (**self).rearm()
    }

    fn cancel(&mut self) {
        (**self).cancel()
    }

    fn is_armed(&self) -> bool {
        (**self).is_armed()
    }
}

/// A tick delivered by [`IntervalDriver`], tagged with the generation of the
/// driver that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub generation: u64,
}

/// Tokio-backed driver: a spawned task sends a [`Tick`] every `period`.
///
/// Ticks arrive on the receiver returned by [`IntervalDriver::new`]; the
/// loop that owns the engine must drop ticks for which
/// [`IntervalDriver::is_current`] is false. An aborted task may already have
/// queued a tick before it died, and that tick must not reach the engine.
///
/// `rearm` spawns onto the current tokio runtime and panics outside one.
#[derive(Debug)]
pub struct IntervalDriver {
    period: Duration,
    tx: mpsc::UnboundedSender<Tick>,
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl IntervalDriver {
    pub fn new(period: Duration) -> (Self, mpsc::UnboundedReceiver<Tick>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = Self {
            period,
            tx,
            handle: None,
            generation: 0,
        };
        (driver, rx)
    }

    pub fn every_second() -> (Self, mpsc::UnboundedReceiver<Tick>) {
        Self::new(Duration::from_secs(1))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `tick` came from the currently installed driver.
    pub fn is_current(&self, tick: &Tick) -> bool {
        self.handle.is_some() && tick.generation == self.generation
    }
}

impl TickDriver for IntervalDriver {
    fn rearm(&mut self) {
        self.cancel();
        self.generation += 1;

        let generation = self.generation;
        let period = self.period;
        let tx = self.tx.clone();
        self.handle = Some(tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx.send(Tick { generation }).is_err() {
                    break;
                }
            }
        }));
        tracing::trace!(generation, "tick driver armed");
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::trace!(generation = self.generation, "tick driver cancelled");
        }
    }

    fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for IntervalDriver {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Driver that only records calls. Used where ticks are fed by hand.
#[derive(Debug, Default, Clone)]
pub struct ManualDriver {
    armed: bool,
    rearms: usize,
    cancels: usize,
}

impl ManualDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `rearm` calls so far.
    pub fn rearms(&self) -> usize {
        self.rearms
    }

    /// Number of `cancel` calls that actually removed a driver.
    pub fn cancels(&self) -> usize {
        self.cancels
    }
}

impl TickDriver for ManualDriver {
    fn rearm(&mut self) {
        self.cancel();
        self.armed = true;
        self.rearms += 1;
    }

    fn cancel(&mut self) {
        if self.armed {
            self.armed = false;
            self.cancels += 1;
        }
    }

    fn is_armed(&self) -> bool {
        self.armed
    }
}
