// Licensed under the Apache-2.0 license

//! Completion handoff from the interrupt dispatcher to the foreground.
//!
//! Each transfer arms a [`Completion`] that the dispatcher signals exactly
//! once. The foreground observes it through [`wait_for`], which polls under
//! a deadline instead of spinning forever.

use crate::i2c::common::{Error, I2cConfig};
use embedded_hal::delay::DelayNs;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Nak,
}

/// Single-slot, signal-once completion.
#[derive(Debug, Default)]
pub struct Completion {
    armed: bool,
    outcome: Option<Outcome>,
}

impl Completion {
    pub const fn new() -> Self {
        Self {
            armed: false,
            outcome: None,
        }
    }

    pub fn arm(&mut self) {
        self.armed = true;
        self.outcome = None;
    }

    /// Record the outcome. Ignored unless armed and not yet signalled.
    pub fn signal(&mut self, outcome: Outcome) {
        if self.armed && self.outcome.is_none() {
            self.outcome = Some(outcome);
        }
    }

    /// Consume the outcome, disarming on success.
    pub fn take(&mut self) -> Option<Outcome> {
        let outcome = self.outcome.take()?;
        self.armed = false;
        Some(outcome)
    }

    pub fn disarm(&mut self) {
        self.armed = false;
        self.outcome = None;
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

/// Per-bus flags shared with the dispatcher.
#[derive(Debug)]
pub struct SpinSync {
    /// Master receive in flight.
    pub request: Completion,
    /// Master transmit in flight.
    pub write: Completion,
    send_stop: bool,
}

impl Default for SpinSync {
    fn default() -> Self {
        Self::new()
    }
}

impl SpinSync {
    pub const fn new() -> Self {
        Self {
            request: Completion::new(),
            write: Completion::new(),
            send_stop: true,
        }
    }

    pub fn set_send_stop(&mut self, send_stop: bool) {
        self.send_stop = send_stop;
    }

    /// Stop policy for the transmit that just drained. Resets to `true`.
    pub fn take_send_stop(&mut self) -> bool {
        core::mem::replace(&mut self.send_stop, true)
    }

    pub fn reset(&mut self) {
        self.request.disarm();
        self.write.disarm();
        self.send_stop = true;
    }
}

/// Poll `probe` until it resolves or `config.timeout` elapses.
///
/// The delay between probes is `config.poll_interval`; the probe runs once
/// more after the final sleep.
///
/// # Errors
///
/// Returns the probe's own error, or [`Error::Timeout`] once the deadline
/// has passed.
pub fn wait_for<T, D, F>(delay: &mut D, config: &I2cConfig, mut probe: F) -> Result<T, Error>
where
    D: DelayNs,
    F: FnMut() -> nb::Result<T, Error>,
{
    let step = config.poll_interval.to_micros().max(1);
    let budget = config.timeout.to_micros();
    let mut waited: u32 = 0;
    loop {
        match probe() {
            Ok(value) => return Ok(value),
            Err(nb::Error::Other(error)) => return Err(error),
            Err(nb::Error::WouldBlock) => {}
        }
        if waited >= budget {
            return Err(Error::Timeout);
        }
        delay.delay_us(step);
        waited = waited.saturating_add(step);
    }
}
