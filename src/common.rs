// Licensed under the Apache-2.0 license

//! Crate-wide diagnostics plumbing.
//!
//! Drivers never talk to a logging backend directly. Each one carries a
//! [`Logger`] chosen by the integrator: [`NoOpLogger`] compiles the calls
//! away, [`LogFacade`] forwards them to whatever `log` implementation the
//! firmware installed.

use core::fmt;

/// Sink for driver diagnostics.
///
/// Calls may arrive from interrupt context, so implementations must not
/// block.
pub trait Logger {
    fn debug(&mut self, args: fmt::Arguments<'_>);
    fn warn(&mut self, args: fmt::Arguments<'_>);
    fn error(&mut self, args: fmt::Arguments<'_>);
}

/// Discards everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoOpLogger {}

impl Logger for NoOpLogger {
    fn debug(&mut self, _args: fmt::Arguments<'_>) {}
    fn warn(&mut self, _args: fmt::Arguments<'_>) {}
    fn error(&mut self, _args: fmt::Arguments<'_>) {}
}

/// Forwards to the `log` crate under a fixed target.
#[derive(Copy, Clone, Debug)]
pub struct LogFacade {
    target: &'static str,
}

impl LogFacade {
    #[must_use]
    pub const fn new(target: &'static str) -> Self {
        Self { target }
    }

    #[must_use]
    pub const fn target(&self) -> &'static str {
        self.target
    }
}

impl Default for LogFacade {
    fn default() -> Self {
        Self::new("irq_wire")
    }
}

impl Logger for LogFacade {
    fn debug(&mut self, args: fmt::Arguments<'_>) {
        log::debug!(target: self.target, "{args}");
    }

    fn warn(&mut self, args: fmt::Arguments<'_>) {
        log::warn!(target: self.target, "{args}");
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        log::error!(target: self.target, "{args}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_logger_accepts_every_level() {
        let mut logger = NoOpLogger {};
        logger.debug(format_args!("debug {}", 1));
        logger.warn(format_args!("warn {}", 2));
        logger.error(format_args!("error {}", 3));
    }

    #[test]
    fn log_facade_keeps_its_target() {
        let mut logger = LogFacade::new("i2c");
        assert_eq!(logger.target(), "i2c");
        assert_eq!(LogFacade::default().target(), "irq_wire");
        // No logger installed: the facade must still be callable.
        logger.warn(format_args!("bus {} idle", 0));
    }
}
