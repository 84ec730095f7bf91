// Licensed under the Apache-2.0 license

//! # Bus registry
//!
//! A fixed arena of [`MAX_BUSES`] slots, one per [`BusId`]. Interrupt
//! vectors reach their [`BusContext`] by indexing this arena; there is no
//! other path from an interrupt to driver state.
//!
//! ## Usage
//!
//! ```rust,ignore
//! static I2C: BusRegistry<Eusci> = BusRegistry::new();
//!
//! irq_wire::bus_interrupt_handlers!(I2C, EUSCIB, [0, 1]);
//! ```
//!
//! The macro expands to `EUSCIB0_IRQHandler` and `EUSCIB1_IRQHandler`, each
//! forwarding to [`BusRegistry::on_interrupt`].
//!
//! ## Safety
//!
//! Every slot is a `critical_section::Mutex<RefCell<_>>`. A closure passed
//! to [`BusRegistry::lookup`] must not call back into the same registry.

use crate::common::{Logger, NoOpLogger};
use crate::i2c::common::{BusId, Error, MAX_BUSES, RX_BUFFER_SIZE, TX_BUFFER_SIZE};
use crate::i2c::context::BusContext;
use crate::i2c::traits::{I2cHardware, Receiver, Requester};
use core::cell::RefCell;
use critical_section::Mutex;

type Slot<H, Q, V, L, const TX: usize, const RX: usize> =
    Mutex<RefCell<Option<BusContext<H, Q, V, L, TX, RX>>>>;

pub struct BusRegistry<
    H,
    Q = (),
    V = (),
    L = NoOpLogger,
    const TX: usize = TX_BUFFER_SIZE,
    const RX: usize = RX_BUFFER_SIZE,
> {
    slots: [Slot<H, Q, V, L, TX, RX>; MAX_BUSES],
}

impl<H, Q, V, L, const TX: usize, const RX: usize> Default for BusRegistry<H, Q, V, L, TX, RX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H, Q, V, L, const TX: usize, const RX: usize> BusRegistry<H, Q, V, L, TX, RX> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [const { Mutex::new(RefCell::new(None)) }; MAX_BUSES],
        }
    }

    fn slot(&self, bus: BusId) -> Option<&Slot<H, Q, V, L, TX, RX>> {
        self.slots.get(bus.index())
    }

    /// Bind `context` to the bus it names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BusAlreadyBound`] if the slot is taken. The rejected
    /// context is dropped.
    pub fn register(&self, context: BusContext<H, Q, V, L, TX, RX>) -> Result<(), Error> {
        let bus = context.bus;
        let slot = self.slot(bus).ok_or(Error::UnknownBus(bus as u8))?;
        critical_section::with(|cs| {
            let mut entry = slot.borrow_ref_mut(cs);
            if entry.is_some() {
                return Err(Error::BusAlreadyBound(bus));
            }
            *entry = Some(context);
            Ok(())
        })
    }

    /// Clear the slot, handing back whatever was bound.
    pub fn unregister(&self, bus: BusId) -> Option<BusContext<H, Q, V, L, TX, RX>> {
        let slot = self.slot(bus)?;
        critical_section::with(|cs| slot.borrow_ref_mut(cs).take())
    }

    #[must_use]
    pub fn is_bound(&self, bus: BusId) -> bool {
        self.slot(bus)
            .is_some_and(|slot| critical_section::with(|cs| slot.borrow_ref(cs).is_some()))
    }

    /// Run `f` on the context bound to `bus`, inside a critical section.
    ///
    /// Returns `None` when nothing is bound.
    pub fn lookup<R>(
        &self,
        bus: BusId,
        f: impl FnOnce(&mut BusContext<H, Q, V, L, TX, RX>) -> R,
    ) -> Option<R> {
        let slot = self.slot(bus)?;
        critical_section::with(|cs| slot.borrow_ref_mut(cs).as_mut().map(f))
    }
}

impl<H, Q, V, L, const TX: usize, const RX: usize> BusRegistry<H, Q, V, L, TX, RX>
where
    H: I2cHardware,
    Q: Requester,
    V: Receiver,
    L: Logger,
{
    /// Interrupt entry point. Events on unbound buses are ignored.
    pub fn on_interrupt(&self, bus: BusId) {
        let _ = self.lookup(bus, |context| context.on_interrupt());
    }
}

/// Generate one `extern "C"` interrupt vector per listed bus.
///
/// `bus_interrupt_handlers!(REGISTRY, PREFIX, [0, 2])` defines
/// `PREFIX0_IRQHandler` and `PREFIX2_IRQHandler`.
#[macro_export]
macro_rules! bus_interrupt_handlers {
    ($registry:expr, $prefix:ident, [$($n:literal),+ $(,)?]) => {
        $crate::__paste::paste! {
            $(
                #[no_mangle]
                #[allow(non_snake_case)]
                pub extern "C" fn [<$prefix $n _IRQHandler>]() {
                    $registry.on_interrupt($crate::i2c::BusId::[<B $n>]);
                }
            )+
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i2c::testing::SimBus;
    use crate::i2c::traits::InterruptFlags;

    #[test]
    fn test_register_rejects_second_binding() {
        let registry: BusRegistry<SimBus> = BusRegistry::new();
        registry
            .register(BusContext::new(BusId::B1, SimBus::new()))
            .unwrap();
        assert_eq!(
            registry.register(BusContext::new(BusId::B1, SimBus::new())),
            Err(Error::BusAlreadyBound(BusId::B1))
        );
        assert!(registry.is_bound(BusId::B1));
        assert!(!registry.is_bound(BusId::B0));
    }

    #[test]
    fn test_unregister_frees_the_slot() {
        let registry: BusRegistry<SimBus> = BusRegistry::new();
        registry
            .register(BusContext::new(BusId::B2, SimBus::new()))
            .unwrap();
        let context = registry.unregister(BusId::B2).unwrap();
        assert_eq!(context.bus(), BusId::B2);
        assert!(registry.unregister(BusId::B2).is_none());
        registry.register(context).unwrap();
    }

    #[test]
    fn test_lookup_misses_unbound_bus() {
        let registry: BusRegistry<SimBus> = BusRegistry::new();
        assert_eq!(registry.lookup(BusId::B3, |ctx| ctx.bus()), None);
        // Must not panic.
        registry.on_interrupt(BusId::B3);
    }

    #[test]
    fn test_interrupts_reach_only_their_bus() {
        let registry: BusRegistry<SimBus> = BusRegistry::new();
        for bus in [BusId::B0, BusId::B1] {
            let mut context = BusContext::new(bus, SimBus::new());
            context.begin_slave(0x40);
            registry.register(context).unwrap();
        }
        registry
            .lookup(BusId::B1, |ctx| ctx.hardware_mut().latch(InterruptFlags::TRANSMIT))
            .unwrap();
        registry.on_interrupt(BusId::B1);

        let sent = |bus| registry.lookup(bus, |ctx| ctx.hardware().slave_out().len());
        assert_eq!(sent(BusId::B0), Some(0));
        assert_eq!(sent(BusId::B1), Some(1));
    }

    static VECTOR_REGISTRY: BusRegistry<SimBus> = BusRegistry::new();
    crate::bus_interrupt_handlers!(VECTOR_REGISTRY, TESTVEC, [3]);

    #[test]
    fn test_generated_vector_dispatches() {
        let mut context = BusContext::new(BusId::B3, SimBus::new());
        context.begin_slave(0x21);
        VECTOR_REGISTRY.register(context).unwrap();
        VECTOR_REGISTRY
            .lookup(BusId::B3, |ctx| ctx.hardware_mut().latch(InterruptFlags::TRANSMIT))
            .unwrap();

        TESTVEC3_IRQHandler();

        let sent = VECTOR_REGISTRY.lookup(BusId::B3, |ctx| ctx.hardware().slave_out().to_vec());
        assert_eq!(sent, Some(std::vec![crate::i2c::PAD_BYTE]));
        assert!(VECTOR_REGISTRY.unregister(BusId::B3).is_some());
    }
}
