// Licensed under the Apache-2.0 license

//! Foreground handle for one bus.
//!
//! A [`BusDriver`] owns the registry slot of its bus for as long as it
//! lives. Every operation enters a critical section, mutates the
//! [`BusContext`] stored there, and then (for operations that complete
//! on the wire) waits under [`I2cConfig::timeout`] for the interrupt
//! dispatcher to signal completion.
//!
//! Master operations follow the familiar Wire-style flow:
//!
//! ```rust,ignore
//! let mut i2c = BusDriver::new(&REGISTRY, context, delay, I2cConfig::default())?;
//! i2c.begin()?;
//! i2c.begin_transmission(0x48)?;
//! i2c.write(0x01)?;
//! i2c.end_transmission(false)?;
//! let n = i2c.request_from(0x48, 2)?;
//! let msb = i2c.read()?;
//! ```

use crate::common::Logger;
use crate::i2c::common::{BusId, BusStats, BusStatus, Error, I2cConfig, I2cSpeed};
use crate::i2c::context::BusContext;
use crate::i2c::registry::BusRegistry;
use crate::i2c::sync::wait_for;
use crate::i2c::traits::{I2cHardware, Receiver, Requester};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorType, I2c, Operation, SevenBitAddress};

pub struct BusDriver<'r, H, D, Q, V, L, const TX: usize, const RX: usize> {
    registry: &'r BusRegistry<H, Q, V, L, TX, RX>,
    bus: BusId,
    delay: D,
    config: I2cConfig,
}

impl<'r, H, D, Q, V, L, const TX: usize, const RX: usize> BusDriver<'r, H, D, Q, V, L, TX, RX>
where
    H: I2cHardware,
    D: DelayNs,
    Q: Requester,
    V: Receiver,
    L: Logger,
{
    /// Register `context` and return the handle that drives it.
    ///
    /// `config.speed` replaces the speed stored in `context`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BusAlreadyBound`] if another driver holds the bus.
    pub fn new(
        registry: &'r BusRegistry<H, Q, V, L, TX, RX>,
        mut context: BusContext<H, Q, V, L, TX, RX>,
        delay: D,
        config: I2cConfig,
    ) -> Result<Self, Error> {
        let bus = context.bus();
        context.set_speed(config.speed);
        registry.register(context)?;
        Ok(Self {
            registry,
            bus,
            delay,
            config,
        })
    }

    /// Unregister and hand back the context.
    pub fn release(self) -> Option<BusContext<H, Q, V, L, TX, RX>> {
        self.registry.unregister(self.bus)
    }

    #[must_use]
    pub fn bus(&self) -> BusId {
        self.bus
    }

    #[must_use]
    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    fn with_context<R>(
        &self,
        f: impl FnOnce(&mut BusContext<H, Q, V, L, TX, RX>) -> R,
    ) -> Result<R, Error> {
        self.registry.lookup(self.bus, f).ok_or(Error::NotBound(self.bus))
    }

    fn try_with<R>(
        &self,
        f: impl FnOnce(&mut BusContext<H, Q, V, L, TX, RX>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        self.with_context(f)?
    }

    fn wait_until<T>(
        &mut self,
        mut probe: impl FnMut(&mut BusContext<H, Q, V, L, TX, RX>) -> nb::Result<T, Error>,
    ) -> Result<T, Error> {
        let registry = self.registry;
        let bus = self.bus;
        wait_for(&mut self.delay, &self.config, || {
            registry
                .lookup(bus, &mut probe)
                .unwrap_or(Err(nb::Error::Other(Error::NotBound(bus))))
        })
    }

    /// Abort the in-flight transfer after an expired wait.
    fn expire(&self) {
        let _ = self.with_context(|ctx| {
            ctx.abort();
            ctx.note_timeout();
        });
    }

    /// Become bus master using the configured speed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBound`] if the context was unregistered.
    pub fn begin(&mut self) -> Result<(), Error> {
        self.with_context(BusContext::begin_master)
    }

    /// Answer as a slave at `own_address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBound`] if the context was unregistered.
    pub fn begin_slave(&mut self, own_address: u8) -> Result<(), Error> {
        self.with_context(|ctx| ctx.begin_slave(own_address))
    }

    /// Disable the peripheral and drop the role.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBound`] if the context was unregistered.
    pub fn end(&mut self) -> Result<(), Error> {
        self.with_context(BusContext::end)
    }

    /// Select the speed applied by the next [`begin`](Self::begin).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBound`] if the context was unregistered.
    pub fn set_speed(&mut self, speed: I2cSpeed) -> Result<(), Error> {
        self.config.speed = speed;
        self.with_context(|ctx| ctx.set_speed(speed))
    }

    /// # Errors
    ///
    /// Returns [`Error::NotBound`] if the context was unregistered.
    pub fn set_standard_mode(&mut self) -> Result<(), Error> {
        self.set_speed(I2cSpeed::Standard)
    }

    /// # Errors
    ///
    /// Returns [`Error::NotBound`] if the context was unregistered.
    pub fn set_fast_mode(&mut self) -> Result<(), Error> {
        self.set_speed(I2cSpeed::Fast)
    }

    #[must_use]
    pub fn is_master(&self) -> bool {
        self.with_context(|ctx| ctx.is_master()).unwrap_or(false)
    }

    /// Replace the slave response producer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBound`] if the context was unregistered.
    pub fn on_request(&mut self, requester: Q) -> Result<(), Error> {
        self.with_context(|ctx| ctx.set_requester(requester))
    }

    /// Replace the slave delivery listener.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBound`] if the context was unregistered.
    pub fn on_receive(&mut self, receiver: V) -> Result<(), Error> {
        self.with_context(|ctx| ctx.set_receiver(receiver))
    }

    /// # Errors
    ///
    /// Returns [`Error::NotBound`] if the context was unregistered.
    pub fn status(&self) -> Result<BusStatus, Error> {
        self.with_context(|ctx| ctx.status())
    }

    /// # Errors
    ///
    /// Returns [`Error::NotBound`] if the context was unregistered.
    pub fn stats(&self) -> Result<BusStats, Error> {
        self.with_context(|ctx| ctx.stats())
    }

    /// Prepare a master write to `address`.
    ///
    /// Waits for any previous stop condition to reach the wire, then
    /// reprograms the target if it changed.
    ///
    /// # Errors
    ///
    /// [`Error::NotMaster`] outside the master role, [`Error::Timeout`] if
    /// the previous stop never completes.
    pub fn begin_transmission(&mut self, address: SevenBitAddress) -> Result<(), Error> {
        self.try_with(|ctx| ctx.require_master())?;
        self.wait_until(|ctx| {
            if ctx.hardware().is_stop_pending() {
                Err(nb::Error::WouldBlock)
            } else {
                Ok(())
            }
        })?;
        self.with_context(|ctx| ctx.retarget(address))
    }

    /// Stage one byte for the next [`end_transmission`](Self::end_transmission).
    ///
    /// # Errors
    ///
    /// [`Error::NotMaster`], [`Error::Busy`] while a transmit is still in
    /// flight, or [`Error::CapacityExceeded`] once the buffer is full.
    pub fn write(&mut self, byte: u8) -> Result<(), Error> {
        self.try_with(|ctx| ctx.stage_byte(byte))
    }

    /// Stage every byte of `bytes`, or none if they do not all fit.
    ///
    /// # Errors
    ///
    /// Same as [`write`](Self::write).
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.try_with(|ctx| {
            let staged = ctx.staged_len()?;
            if staged.saturating_add(bytes.len()) > TX {
                return Err(Error::CapacityExceeded);
            }
            bytes.iter().try_for_each(|&byte| ctx.stage_byte(byte))
        })
    }

    /// Launch the staged bytes without waiting for them to leave.
    ///
    /// With nothing staged the returned handle is already complete.
    ///
    /// # Errors
    ///
    /// [`Error::NotMaster`], [`Error::Busy`], or [`Error::Timeout`] if the
    /// bus never becomes free.
    pub fn start_transmission(
        &mut self,
        send_stop: bool,
    ) -> Result<PendingWrite<'_, 'r, H, D, Q, V, L, TX, RX>, Error> {
        self.try_with(|ctx| ctx.require_master())?;
        if self.try_with(|ctx| ctx.staged_len())? == 0 {
            return Ok(PendingWrite {
                driver: self,
                active: false,
            });
        }
        self.wait_until(|ctx| {
            if ctx.hardware().is_bus_busy() {
                Err(nb::Error::WouldBlock)
            } else {
                Ok(())
            }
        })?;
        self.try_with(|ctx| ctx.launch_write(send_stop))?;
        Ok(PendingWrite {
            driver: self,
            active: true,
        })
    }

    /// Send the staged bytes and wait until they are on the wire.
    ///
    /// With `send_stop == false` the bus is kept for a repeated start.
    ///
    /// # Errors
    ///
    /// [`Error::NoAcknowledge`] if the target refused, [`Error::Timeout`] if
    /// the transfer stalled (the bus is released), or any error of
    /// [`start_transmission`](Self::start_transmission).
    pub fn end_transmission(&mut self, send_stop: bool) -> Result<(), Error> {
        self.start_transmission(send_stop)?.wait()
    }

    /// Launch a read of `count` bytes from `address` without waiting.
    ///
    /// Staged write bytes are flushed first without a stop, so the read
    /// follows as a repeated start. A zero-byte request only flushes.
    ///
    /// # Errors
    ///
    /// [`Error::NotMaster`], [`Error::CapacityExceeded`] if `count` exceeds
    /// the receive buffer (staged bytes are discarded), or any error of the
    /// flushed write.
    pub fn start_request(
        &mut self,
        address: SevenBitAddress,
        count: usize,
    ) -> Result<PendingRead<'_, 'r, H, D, Q, V, L, TX, RX>, Error> {
        self.try_with(|ctx| ctx.require_master())?;
        if count > RX {
            self.with_context(BusContext::discard_staged)?;
            return Err(Error::CapacityExceeded);
        }
        if self.try_with(|ctx| ctx.staged_len())? > 0 {
            self.end_transmission(false)?;
        }
        if count == 0 {
            return Ok(PendingRead {
                driver: self,
                active: false,
            });
        }
        self.try_with(|ctx| ctx.launch_receive(address, count))?;
        Ok(PendingRead {
            driver: self,
            active: true,
        })
    }

    /// Read `count` bytes from `address` into the read cursor.
    ///
    /// Returns how many bytes arrived; they are consumed with
    /// [`read`](Self::read).
    ///
    /// # Errors
    ///
    /// [`Error::NotMaster`] outside the master role, [`Error::NoAcknowledge`]
    /// if the target did not answer, [`Error::Timeout`] if the transfer
    /// stalled.
    pub fn request_from(&mut self, address: SevenBitAddress, count: usize) -> Result<usize, Error> {
        self.start_request(address, count)?.wait()
    }

    /// Pop the next delivered byte, waiting for one to arrive.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if nothing is delivered in time.
    pub fn read(&mut self) -> Result<u8, Error> {
        self.wait_until(BusContext::pop_byte)
    }

    /// Pop the next delivered byte if there is one.
    pub fn try_read(&mut self) -> nb::Result<u8, Error> {
        self.with_context(BusContext::pop_byte)
            .map_err(nb::Error::Other)?
    }

    /// Unread bytes of the last delivery.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBound`] if the context was unregistered.
    pub fn available(&self) -> Result<usize, Error> {
        self.with_context(|ctx| ctx.available())
    }

    fn run_operations(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Error> {
        self.begin_transmission(address)?;

        let count = operations.len();
        let mut start = 0;
        while start < count {
            let writing = matches!(operations.get(start), Some(Operation::Write(_)));
            let mut end = start;
            while end < count
                && matches!(operations.get(end), Some(Operation::Write(_))) == writing
            {
                end += 1;
            }
            let last = end == count;
            let Some(run) = operations.get_mut(start..end) else {
                break;
            };

            if writing {
                for op in run.iter() {
                    if let Operation::Write(bytes) = op {
                        self.write_all(bytes)?;
                    }
                }
                self.end_transmission(last)?;
            } else {
                let total = run
                    .iter()
                    .map(|op| match op {
                        Operation::Read(buffer) => buffer.len(),
                        Operation::Write(_) => 0,
                    })
                    .sum();
                self.request_from(address, total)?;
                for op in run.iter_mut() {
                    if let Operation::Read(buffer) = op {
                        for slot in buffer.iter_mut() {
                            *slot = self.read()?;
                        }
                    }
                }
            }
            start = end;
        }
        Ok(())
    }
}

impl<H, D, Q, V, L, const TX: usize, const RX: usize> Drop
    for BusDriver<'_, H, D, Q, V, L, TX, RX>
{
    fn drop(&mut self) {
        let _ = self.registry.unregister(self.bus);
    }
}

impl<H, D, Q, V, L, const TX: usize, const RX: usize> ErrorType
    for BusDriver<'_, H, D, Q, V, L, TX, RX>
{
    type Error = Error;
}

impl<H, D, Q, V, L, const TX: usize, const RX: usize> I2c for BusDriver<'_, H, D, Q, V, L, TX, RX>
where
    H: I2cHardware,
    D: DelayNs,
    Q: Requester,
    V: Receiver,
    L: Logger,
{
    /// Adjacent writes share one start; adjacent reads share one request.
    ///
    /// This departs from the `embedded-hal` contract in one place: a read
    /// always ends with a stop, so an operation following a read begins
    /// with a fresh start rather than the repeated start the trait asks for.
    /// Write-then-read sequences are unaffected.
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let result = self.run_operations(address, operations);
        if result.is_err() {
            let _ = self.with_context(|ctx| ctx.discard_staged());
        }
        result
    }
}

/// A master transmit that has been started but not yet observed complete.
#[must_use = "an in-flight write must be waited on or cancelled"]
pub struct PendingWrite<'d, 'r, H, D, Q, V, L, const TX: usize, const RX: usize> {
    driver: &'d mut BusDriver<'r, H, D, Q, V, L, TX, RX>,
    active: bool,
}

impl<H, D, Q, V, L, const TX: usize, const RX: usize> PendingWrite<'_, '_, H, D, Q, V, L, TX, RX>
where
    H: I2cHardware,
    D: DelayNs,
    Q: Requester,
    V: Receiver,
    L: Logger,
{
    /// Check for completion without blocking.
    pub fn poll(&mut self) -> nb::Result<(), Error> {
        if !self.active {
            return Ok(());
        }
        let result = self
            .driver
            .with_context(BusContext::poll_write)
            .map_err(nb::Error::Other)
            .and_then(|polled| polled);
        if !matches!(result, Err(nb::Error::WouldBlock)) {
            self.active = false;
        }
        result
    }

    /// Block until the write completes or the deadline passes.
    ///
    /// # Errors
    ///
    /// [`Error::NoAcknowledge`] or [`Error::Timeout`]. On timeout the bus
    /// is released and the transfer abandoned.
    pub fn wait(self) -> Result<(), Error> {
        if !self.active {
            return Ok(());
        }
        let result = self.driver.wait_until(BusContext::poll_write);
        if result == Err(Error::Timeout) {
            self.driver.expire();
        }
        result
    }

    /// Abandon the write and release the bus.
    pub fn cancel(self) {
        if self.active {
            let _ = self.driver.with_context(BusContext::abort);
        }
    }
}

/// A master receive that has been started but not yet observed complete.
#[must_use = "an in-flight read must be waited on or cancelled"]
pub struct PendingRead<'d, 'r, H, D, Q, V, L, const TX: usize, const RX: usize> {
    driver: &'d mut BusDriver<'r, H, D, Q, V, L, TX, RX>,
    active: bool,
}

impl<H, D, Q, V, L, const TX: usize, const RX: usize> PendingRead<'_, '_, H, D, Q, V, L, TX, RX>
where
    H: I2cHardware,
    D: DelayNs,
    Q: Requester,
    V: Receiver,
    L: Logger,
{
    /// Check for completion without blocking. Yields the received length.
    pub fn poll(&mut self) -> nb::Result<usize, Error> {
        if !self.active {
            return Ok(0);
        }
        let result = self
            .driver
            .with_context(BusContext::poll_receive)
            .map_err(nb::Error::Other)
            .and_then(|polled| polled);
        if !matches!(result, Err(nb::Error::WouldBlock)) {
            self.active = false;
        }
        result
    }

    /// Block until the read completes or the deadline passes.
    ///
    /// # Errors
    ///
    /// [`Error::NoAcknowledge`] or [`Error::Timeout`]. On timeout the bus
    /// is released and the transfer abandoned.
    pub fn wait(self) -> Result<usize, Error> {
        if !self.active {
            return Ok(0);
        }
        let result = self.driver.wait_until(BusContext::poll_receive);
        if result == Err(Error::Timeout) {
            self.driver.expire();
        }
        result
    }

    /// Abandon the read and release the bus.
    pub fn cancel(self) {
        if self.active {
            let _ = self.driver.with_context(BusContext::abort);
        }
    }
}
