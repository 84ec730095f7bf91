// Licensed under the Apache-2.0 license

//! Interrupt-driven I2C bus driver.
//!
//! Foreground calls stage bytes and start transfers; a per-bus interrupt
//! dispatcher moves the bytes one at a time and signals completion. Both
//! sides meet in a [`BusContext`] held by a [`BusRegistry`] slot.

pub mod buffer;
pub mod common;
pub mod context;
pub mod dispatcher;
pub mod driver;
pub mod registry;
pub mod sync;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::{BufferState, ReadCursor, ResponseWriter, TransferBuffer};
pub use common::{
    BusId, BusStats, BusStatus, Error, I2cConfig, I2cConfigBuilder, I2cSpeed, Role, TransferMode,
    MAX_BUSES, PAD_BYTE, RX_BUFFER_SIZE, TX_BUFFER_SIZE,
};
pub use context::BusContext;
pub use driver::{BusDriver, PendingRead, PendingWrite};
pub use registry::BusRegistry;
pub use traits::{I2cHardware, InterruptFlags, Receiver, Requester};
