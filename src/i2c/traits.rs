// Licensed under the Apache-2.0 license

//! # I2C Capability Traits
//!
//! The driver core never touches registers. It talks to two kinds of
//! collaborators through the traits in this module:
//!
//! ```text
//! I2cHardware (peripheral primitives, implemented per chip)
//! Requester   (slave: fills the response when a master reads)
//! Receiver    (slave: notified when a master finished writing)
//! ```
//!
//! Everything here may be called from interrupt context. Implementations
//! must not block and must not re-enter the bus registry.

use crate::i2c::buffer::ResponseWriter;
use crate::i2c::common::{I2cSpeed, TransferMode};
use bitflags::bitflags;

bitflags! {
    /// Interrupt sources of one I2C peripheral.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct InterruptFlags: u16 {
        /// A byte arrived and is waiting in the receive register.
        const RECEIVE = 1 << 0;
        /// The transmit register is ready for the next byte.
        const TRANSMIT = 1 << 1;
        /// The addressed device did not acknowledge.
        const NAK = 1 << 2;
        /// A stop condition was detected on the bus.
        const STOP = 1 << 3;

        /// Sources serviced while acting as master.
        const MASTER = Self::RECEIVE.bits() | Self::TRANSMIT.bits() | Self::NAK.bits();
        /// Sources serviced while acting as slave.
        const SLAVE = Self::RECEIVE.bits() | Self::TRANSMIT.bits() | Self::STOP.bits();
    }
}

/// Peripheral primitives the driver core is built on.
///
/// One implementation drives one physical bus. Pin muxing and clock setup
/// happen before the implementation is handed to the driver.
///
/// # Examples
///
/// ```rust,ignore
/// use irq_wire::i2c::{I2cHardware, I2cSpeed, InterruptFlags, TransferMode};
///
/// fn bring_up<H: I2cHardware>(hw: &mut H) {
///     hw.init_master(I2cSpeed::Fast);
///     hw.set_mode(TransferMode::Transmit);
///     hw.enable_module();
///     hw.clear_interrupt_status(InterruptFlags::MASTER);
///     hw.enable_interrupt_sources(InterruptFlags::MASTER);
/// }
/// ```
pub trait I2cHardware {
    /// Configure the peripheral as a bus master clocked at `speed`.
    fn init_master(&mut self, speed: I2cSpeed);

    /// Configure the peripheral to answer at `own_address`.
    fn init_slave(&mut self, own_address: u8);

    fn enable_module(&mut self);

    fn disable_module(&mut self);

    /// Select the direction of the next master transfer.
    fn set_mode(&mut self, mode: TransferMode);

    /// Program the address the next start condition will carry.
    fn set_target_address(&mut self, address: u8);

    /// Put a start (or repeated start) condition on the bus.
    fn issue_start(&mut self);

    /// Start a transmit and load its first byte.
    ///
    /// The transmit interrupt then asks for the remaining bytes. Peripherals
    /// with a combined primitive should override this.
    fn issue_start_with_byte(&mut self, first: u8) {
        self.issue_start();
        self.send_next_byte(first);
    }

    /// Request a stop condition after the byte currently on the wire.
    fn issue_stop(&mut self);

    /// Load the transmit register.
    fn send_next_byte(&mut self, byte: u8);

    /// Drain the receive register.
    fn receive_next_byte(&mut self) -> u8;

    /// Another transfer currently occupies the bus.
    fn is_bus_busy(&self) -> bool;

    /// A previously requested stop has not reached the wire yet.
    fn is_stop_pending(&self) -> bool;

    /// Latched status of the enabled sources.
    fn interrupt_status(&self) -> InterruptFlags;

    fn clear_interrupt_status(&mut self, flags: InterruptFlags);

    fn enable_interrupt_sources(&mut self, flags: InterruptFlags);

    fn disable_interrupt_sources(&mut self, flags: InterruptFlags);
}

/// Slave-side producer of response bytes.
pub trait Requester {
    /// Called once per master read, before the first byte is clocked out.
    ///
    /// Whatever is written to `response` is sent in order. If the master
    /// clocks past the end, it receives [`PAD_BYTE`](crate::i2c::PAD_BYTE).
    fn on_request(&mut self, response: &mut ResponseWriter<'_>);
}

/// Slave-side consumer notification.
pub trait Receiver {
    /// A master write of `byte_count` bytes completed and the bytes are now
    /// readable through `BusDriver::read`.
    fn on_receive(&mut self, byte_count: usize);
}

impl Requester for () {
    fn on_request(&mut self, _response: &mut ResponseWriter<'_>) {}
}

impl Receiver for () {
    fn on_receive(&mut self, _byte_count: usize) {}
}
