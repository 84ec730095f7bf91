// Licensed under the Apache-2.0 license

//! Common types and constants for the interrupt-driven I2C driver.
//!
//! This module provides shared definitions for error handling, bus
//! identification, role/mode selection and driver configuration.

use core::fmt;
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use fugit::{HertzU32, MicrosDurationU32};

/// Default transmit buffer capacity per bus.
pub const TX_BUFFER_SIZE: usize = 32;
/// Default receive buffer capacity per bus.
pub const RX_BUFFER_SIZE: usize = 32;
/// Number of independently addressable buses.
pub const MAX_BUSES: usize = 4;
/// Sent by a slave when the master clocks past the prepared response.
pub const PAD_BYTE: u8 = 0x00;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum I2cSpeed {
    Standard = 100_000,
    Fast = 400_000,
}

impl I2cSpeed {
    #[must_use]
    pub const fn frequency(self) -> HertzU32 {
        HertzU32::from_raw(self as u32)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferMode {
    Transmit,
    Receive,
}

/// One physical I2C peripheral instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BusId {
    B0 = 0,
    B1 = 1,
    B2 = 2,
    B3 = 3,
}

impl BusId {
    pub const ALL: [BusId; MAX_BUSES] = [BusId::B0, BusId::B1, BusId::B2, BusId::B3];

    /// Slot of this bus in a per-bus arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for BusId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BusId::B0),
            1 => Ok(BusId::B1),
            2 => Ok(BusId::B2),
            3 => Ok(BusId::B3),
            other => Err(Error::UnknownBus(other)),
        }
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i2c{}", self.index())
    }
}

/// Driver error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A master-only operation was attempted outside the master role.
    NotMaster,
    /// The addressed device did not acknowledge.
    NoAcknowledge,
    /// A bounded wait expired before the bus signalled completion.
    Timeout,
    /// A buffer would have been written past its capacity.
    CapacityExceeded,
    /// The transmit buffer is still owned by an in-flight transfer.
    Busy,
    /// No peripheral exists for this identifier.
    UnknownBus(u8),
    /// Another context is already registered for the bus.
    BusAlreadyBound(BusId),
    /// The bus has no registered context.
    NotBound(BusId),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotMaster => f.write_str("bus is not configured as master"),
            Error::NoAcknowledge => f.write_str("no acknowledge from target"),
            Error::Timeout => f.write_str("timed out waiting for the bus"),
            Error::CapacityExceeded => f.write_str("transfer buffer capacity exceeded"),
            Error::Busy => f.write_str("transfer already in flight"),
            Error::UnknownBus(id) => write!(f, "unknown bus identifier {id}"),
            Error::BusAlreadyBound(bus) => write!(f, "{bus} already has a registered context"),
            Error::NotBound(bus) => write!(f, "{bus} has no registered context"),
        }
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::NoAcknowledge => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            Error::CapacityExceeded => ErrorKind::Overrun,
            _ => ErrorKind::Other,
        }
    }
}

/// Counters for conditions the driver recovers from on its own.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Slave deliveries discarded because the previous one was still unread.
    pub dropped_messages: u32,
    /// Slave bytes discarded because the receive buffer was full.
    pub rx_overruns: u32,
    pub naks: u32,
    pub timeouts: u32,
}

/// Snapshot of one bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BusStatus {
    pub bus: BusId,
    /// `None` until `begin` or `begin_slave` runs.
    pub role: Option<Role>,
    /// Cached target address (master) or own address (slave).
    pub address: Option<u8>,
    pub speed: I2cSpeed,
    /// Bytes delivered but not yet consumed by `read`.
    pub unread: usize,
    /// Whether the transmit buffer is owned by the interrupt handler.
    pub tx_in_flight: bool,
    pub stats: BusStats,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct I2cConfig {
    /// Applied by the next `begin`.
    pub speed: I2cSpeed,
    /// Upper bound for every foreground wait.
    pub timeout: MicrosDurationU32,
    /// Sleep between completion probes.
    pub poll_interval: MicrosDurationU32,
}

impl Default for I2cConfig {
    fn default() -> Self {
        I2cConfigBuilder::new().build()
    }
}

pub struct I2cConfigBuilder {
    speed: I2cSpeed,
    timeout: MicrosDurationU32,
    poll_interval: MicrosDurationU32,
}

impl Default for I2cConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            speed: I2cSpeed::Fast,
            timeout: MicrosDurationU32::millis(25),
            poll_interval: MicrosDurationU32::micros(10),
        }
    }
    #[must_use]
    pub fn speed(mut self, speed: I2cSpeed) -> Self {
        self.speed = speed;
        self
    }
    #[must_use]
    pub fn timeout(mut self, timeout: MicrosDurationU32) -> Self {
        self.timeout = timeout;
        self
    }
    #[must_use]
    pub fn poll_interval(mut self, interval: MicrosDurationU32) -> Self {
        self.poll_interval = interval;
        self
    }
    #[must_use]
    pub fn build(self) -> I2cConfig {
        I2cConfig {
            speed: self.speed,
            timeout: self.timeout,
            poll_interval: self.poll_interval,
        }
    }
}
