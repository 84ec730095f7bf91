// Licensed under the Apache-2.0 license

//! Per-bus owned state.
//!
//! A [`BusContext`] holds everything one bus needs: role, addressing,
//! both transfer buffers, the read cursor, completion flags, the slave
//! capabilities and the hardware itself. It lives in a
//! [`BusRegistry`](crate::i2c::BusRegistry) slot and is only ever touched
//! inside a critical section, either by the foreground driver or by the
//! interrupt dispatcher.

use crate::common::{Logger, NoOpLogger};
use crate::i2c::buffer::{BufferState, ReadCursor, TransferBuffer};
use crate::i2c::common::{
    BusId, BusStats, BusStatus, Error, I2cSpeed, Role, TransferMode, PAD_BYTE, RX_BUFFER_SIZE,
    TX_BUFFER_SIZE,
};
use crate::i2c::sync::{Outcome, SpinSync};
use crate::i2c::traits::{I2cHardware, InterruptFlags, Receiver, Requester};

pub struct BusContext<
    H,
    Q = (),
    V = (),
    L = NoOpLogger,
    const TX: usize = TX_BUFFER_SIZE,
    const RX: usize = RX_BUFFER_SIZE,
> {
    pub(crate) bus: BusId,
    pub(crate) hardware: H,
    pub(crate) role: Option<Role>,
    pub(crate) address: Option<u8>,
    pub(crate) speed: I2cSpeed,
    pub(crate) tx: TransferBuffer<TX>,
    pub(crate) rx: TransferBuffer<RX>,
    pub(crate) cursor: ReadCursor<RX>,
    pub(crate) sync: SpinSync,
    pub(crate) requester: Q,
    pub(crate) receiver: V,
    pub(crate) logger: L,
    pub(crate) stats: BusStats,
}

impl<H: I2cHardware> BusContext<H> {
    /// Context with no slave capabilities and no logging.
    pub fn new(bus: BusId, hardware: H) -> Self {
        Self::from_parts(bus, hardware, (), (), NoOpLogger {})
    }
}

impl<H, Q, V, L, const TX: usize, const RX: usize> BusContext<H, Q, V, L, TX, RX>
where
    H: I2cHardware,
    Q: Requester,
    V: Receiver,
    L: Logger,
{
    pub fn from_parts(bus: BusId, hardware: H, requester: Q, receiver: V, logger: L) -> Self {
        Self {
            bus,
            hardware,
            role: None,
            address: None,
            speed: I2cSpeed::Fast,
            tx: TransferBuffer::new(),
            rx: TransferBuffer::new(),
            cursor: ReadCursor::new(),
            sync: SpinSync::new(),
            requester,
            receiver,
            logger,
            stats: BusStats::default(),
        }
    }

    #[must_use]
    pub fn with_requester<Q2: Requester>(self, requester: Q2) -> BusContext<H, Q2, V, L, TX, RX> {
        BusContext {
            bus: self.bus,
            hardware: self.hardware,
            role: self.role,
            address: self.address,
            speed: self.speed,
            tx: self.tx,
            rx: self.rx,
            cursor: self.cursor,
            sync: self.sync,
            requester,
            receiver: self.receiver,
            logger: self.logger,
            stats: self.stats,
        }
    }

    #[must_use]
    pub fn with_receiver<V2: Receiver>(self, receiver: V2) -> BusContext<H, Q, V2, L, TX, RX> {
        BusContext {
            bus: self.bus,
            hardware: self.hardware,
            role: self.role,
            address: self.address,
            speed: self.speed,
            tx: self.tx,
            rx: self.rx,
            cursor: self.cursor,
            sync: self.sync,
            requester: self.requester,
            receiver,
            logger: self.logger,
            stats: self.stats,
        }
    }

    #[must_use]
    pub fn with_logger<L2: Logger>(self, logger: L2) -> BusContext<H, Q, V, L2, TX, RX> {
        BusContext {
            bus: self.bus,
            hardware: self.hardware,
            role: self.role,
            address: self.address,
            speed: self.speed,
            tx: self.tx,
            rx: self.rx,
            cursor: self.cursor,
            sync: self.sync,
            requester: self.requester,
            receiver: self.receiver,
            logger,
            stats: self.stats,
        }
    }

    #[must_use]
    pub fn bus(&self) -> BusId {
        self.bus
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    #[must_use]
    pub fn is_master(&self) -> bool {
        self.role == Some(Role::Master)
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }

    pub fn requester(&self) -> &Q {
        &self.requester
    }

    pub fn receiver(&self) -> &V {
        &self.receiver
    }

    pub fn logger(&self) -> &L {
        &self.logger
    }

    #[must_use]
    pub fn stats(&self) -> BusStats {
        self.stats
    }

    #[must_use]
    pub fn status(&self) -> BusStatus {
        BusStatus {
            bus: self.bus,
            role: self.role,
            address: self.address,
            speed: self.speed,
            unread: self.cursor.remaining(),
            tx_in_flight: self.tx.state() == BufferState::InFlight,
            stats: self.stats,
        }
    }

    /// Takes effect on the next [`begin_master`](Self::begin_master).
    pub fn set_speed(&mut self, speed: I2cSpeed) {
        self.speed = speed;
    }

    pub fn set_requester(&mut self, requester: Q) {
        self.requester = requester;
    }

    pub fn set_receiver(&mut self, receiver: V) {
        self.receiver = receiver;
    }

    fn reset_transfers(&mut self) {
        self.tx.reset();
        self.rx.reset();
        self.cursor.clear();
        self.sync.reset();
    }

    pub fn begin_master(&mut self) {
        self.role = Some(Role::Master);
        self.address = None;
        self.reset_transfers();

        self.hardware.disable_interrupt_sources(InterruptFlags::all());
        self.hardware.init_master(self.speed);
        self.hardware.set_mode(TransferMode::Transmit);
        self.hardware.enable_module();
        self.hardware.clear_interrupt_status(InterruptFlags::MASTER);
        self.hardware.enable_interrupt_sources(InterruptFlags::MASTER);
        self.logger.debug(format_args!(
            "{}: master at {} Hz",
            self.bus,
            self.speed.frequency().raw()
        ));
    }

    pub fn begin_slave(&mut self, own_address: u8) {
        self.role = Some(Role::Slave);
        self.address = Some(own_address);
        self.reset_transfers();

        self.hardware.disable_interrupt_sources(InterruptFlags::all());
        self.hardware.init_slave(own_address);
        self.hardware.enable_module();
        self.hardware.clear_interrupt_status(InterruptFlags::SLAVE);
        self.hardware.enable_interrupt_sources(InterruptFlags::SLAVE);
        self.logger
            .debug(format_args!("{}: slave at {:#04x}", self.bus, own_address));
    }

    /// Shut the peripheral down and forget the role.
    pub fn end(&mut self) {
        self.hardware.disable_interrupt_sources(InterruptFlags::all());
        self.hardware.disable_module();
        self.role = None;
        self.address = None;
        self.reset_transfers();
    }

    /// # Errors
    ///
    /// Returns [`Error::NotMaster`] outside the master role.
    pub fn require_master(&self) -> Result<(), Error> {
        if self.is_master() {
            Ok(())
        } else {
            Err(Error::NotMaster)
        }
    }

    /// Reprogram the target only when it changed.
    pub fn retarget(&mut self, address: u8) {
        if self.address != Some(address) {
            self.hardware.set_target_address(address);
            self.address = Some(address);
        }
    }

    /// # Errors
    ///
    /// [`Error::NotMaster`], [`Error::Busy`] while a transmit is in flight,
    /// or [`Error::CapacityExceeded`].
    pub fn stage_byte(&mut self, byte: u8) -> Result<(), Error> {
        self.require_master()?;
        if self.tx.state() == BufferState::InFlight {
            return Err(Error::Busy);
        }
        self.tx.push(byte)
    }

    /// Number of bytes waiting for `end_transmission`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] while a transmit is in flight.
    pub fn staged_len(&self) -> Result<usize, Error> {
        match self.tx.state() {
            BufferState::Idle => Ok(self.tx.write_index()),
            BufferState::InFlight => Err(Error::Busy),
        }
    }

    /// Drop staged bytes that were never launched.
    pub fn discard_staged(&mut self) {
        if self.tx.state() == BufferState::Idle {
            self.tx.reset();
        }
    }

    /// Start the staged transmit. The first byte leaves with the start
    /// condition; the dispatcher sends the rest.
    ///
    /// # Errors
    ///
    /// [`Error::NotMaster`], or [`Error::Busy`] when nothing is staged or a
    /// transmit is already in flight.
    pub fn launch_write(&mut self, send_stop: bool) -> Result<(), Error> {
        self.require_master()?;
        if self.tx.state() == BufferState::InFlight {
            return Err(Error::Busy);
        }
        let first = self.tx.commit_countdown().ok_or(Error::Busy)?;
        self.sync.set_send_stop(send_stop);
        self.sync.write.arm();
        self.hardware.issue_start_with_byte(first);
        Ok(())
    }

    pub fn poll_write(&mut self) -> nb::Result<(), Error> {
        match self.sync.write.take() {
            Some(Outcome::Completed) => Ok(()),
            Some(Outcome::Nak) => Err(nb::Error::Other(Error::NoAcknowledge)),
            None => Err(nb::Error::WouldBlock),
        }
    }

    /// Start a master receive of `count` bytes from `address`.
    ///
    /// # Errors
    ///
    /// [`Error::NotMaster`] or [`Error::CapacityExceeded`].
    pub fn launch_receive(&mut self, address: u8, count: usize) -> Result<(), Error> {
        self.require_master()?;
        self.rx.arm(count)?;

        self.hardware.set_target_address(address);
        self.address = Some(address);
        self.hardware.disable_interrupt_sources(InterruptFlags::TRANSMIT);
        self.hardware.set_mode(TransferMode::Receive);
        self.sync.request.arm();
        self.hardware.issue_start();
        // A one-byte read must have its stop queued before the byte lands.
        if count == 1 {
            self.hardware.issue_stop();
        }
        Ok(())
    }

    pub fn poll_receive(&mut self) -> nb::Result<usize, Error> {
        match self.sync.request.take() {
            Some(Outcome::Completed) => {
                self.finish_receive();
                Ok(self.cursor.len())
            }
            Some(Outcome::Nak) => {
                self.finish_receive();
                Err(nb::Error::Other(Error::NoAcknowledge))
            }
            None => Err(nb::Error::WouldBlock),
        }
    }

    fn finish_receive(&mut self) {
        self.hardware.set_mode(TransferMode::Transmit);
        self.hardware.enable_interrupt_sources(InterruptFlags::TRANSMIT);
        self.hardware.clear_interrupt_status(InterruptFlags::TRANSMIT);
        self.rx.reset();
    }

    /// Abandon whatever transfer is in flight and release the bus.
    pub fn abort(&mut self) {
        let receiving = self.sync.request.is_armed();
        self.hardware.issue_stop();
        self.tx.reset();
        self.sync.reset();
        if receiving {
            self.finish_receive();
        }
    }

    pub fn note_timeout(&mut self) {
        self.stats.timeouts = self.stats.timeouts.saturating_add(1);
        self.logger
            .error(format_args!("{}: transfer timed out, bus released", self.bus));
    }

    pub fn pop_byte(&mut self) -> nb::Result<u8, Error> {
        self.cursor.pop().ok_or(nb::Error::WouldBlock)
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.cursor.remaining()
    }

    /// Serve one byte to a remote master reading from this slave.
    pub fn handle_request_slave(&mut self) {
        if self.tx.write_index() == 0 {
            let mut response = self.tx.writer();
            self.requester.on_request(&mut response);
            self.tx.commit_replay();
        }

        let byte = match self.tx.next_replay() {
            Some(byte) => byte,
            None => {
                self.tx.reset();
                PAD_BYTE
            }
        };
        self.hardware.send_next_byte(byte);
    }

    /// Publish a completed slave reception to the consumer.
    ///
    /// A delivery that arrives while the previous one is still unread is
    /// discarded and counted.
    pub fn handle_receive(&mut self) {
        let count = self.rx.write_index();
        if self.cursor.has_unread() {
            self.stats.dropped_messages = self.stats.dropped_messages.saturating_add(1);
            self.logger.warn(format_args!(
                "{}: dropped {} byte message, {} bytes still unread",
                self.bus,
                count,
                self.cursor.remaining()
            ));
            self.rx.reset();
            return;
        }

        self.cursor.fill(self.rx.filled());
        self.rx.reset();
        self.receiver.on_receive(count);
    }
}
