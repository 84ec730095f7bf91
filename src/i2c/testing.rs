// Licensed under the Apache-2.0 license

//! Host-side bus simulator shared by the unit tests.
//!
//! [`SimBus`] plays both the peripheral and whatever sits on the other end
//! of the wire. Everything observable is recorded as [`WireEvent`]s and
//! [`HwCall`]s. [`SimDelay`] runs the interrupt dispatcher once per poll,
//! which is how the driver's waits make progress without real hardware.

use crate::common::Logger;
use crate::i2c::buffer::ResponseWriter;
use crate::i2c::common::{BusId, I2cSpeed, TransferMode};
use crate::i2c::registry::BusRegistry;
use crate::i2c::traits::{I2cHardware, InterruptFlags, Receiver, Requester};
use core::cell::Cell;
use core::fmt;
use embedded_hal::delay::DelayNs;
use std::collections::{HashMap, VecDeque};
use std::string::String;
use std::vec::Vec;

/// What a logic analyser on the bus would see.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WireEvent {
    Start { address: u8, read: bool },
    Byte(u8),
    Nak,
    Stop,
}

/// Primitive calls made by the driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HwCall {
    InitMaster(I2cSpeed),
    InitSlave(u8),
    Enable,
    Disable,
    SetMode(TransferMode),
    SetTarget(u8),
    Start,
    Stop,
    Send(u8),
    Receive,
}

pub struct SimBus {
    wire: Vec<WireEvent>,
    calls: Vec<HwCall>,
    pending: InterruptFlags,
    enabled: InterruptFlags,
    mode: TransferMode,
    speed: Option<I2cSpeed>,
    module_enabled: bool,
    own_address: Option<u8>,
    target: u8,
    devices: HashMap<u8, VecDeque<u8>>,
    nakked: bool,
    in_flight: Option<u8>,
    stop_requested: bool,
    bytes_clocked: usize,
    inbound: VecDeque<u8>,
    slave_out: Vec<u8>,
    stalled: bool,
    busy_polls: Cell<u32>,
    stop_pending_polls: Cell<u32>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            wire: Vec::new(),
            calls: Vec::new(),
            pending: InterruptFlags::empty(),
            enabled: InterruptFlags::empty(),
            mode: TransferMode::Transmit,
            speed: None,
            module_enabled: false,
            own_address: None,
            target: 0,
            devices: HashMap::new(),
            nakked: false,
            in_flight: None,
            stop_requested: false,
            bytes_clocked: 0,
            inbound: VecDeque::new(),
            slave_out: Vec::new(),
            stalled: false,
            busy_polls: Cell::new(0),
            stop_pending_polls: Cell::new(0),
        }
    }

    /// Put a remote slave at `address` that answers reads with `response`
    /// and then `0xff`.
    pub fn attach_device(&mut self, address: u8, response: &[u8]) {
        self.devices
            .insert(address, response.iter().copied().collect());
    }

    /// Stop raising interrupts, as if the clock line were held low.
    pub fn stall(&mut self) {
        self.stalled = true;
    }

    pub fn set_busy_polls(&mut self, polls: u32) {
        self.busy_polls.set(polls);
    }

    pub fn set_stop_pending_polls(&mut self, polls: u32) {
        self.stop_pending_polls.set(polls);
    }

    /// Latch `flags` directly, bypassing the wire model.
    pub fn latch(&mut self, flags: InterruptFlags) {
        self.pending |= flags;
    }

    /// A remote master clocked `byte` into this slave.
    pub fn inject(&mut self, byte: u8) {
        self.inbound.push_back(byte);
        self.pending |= InterruptFlags::RECEIVE;
    }

    pub fn wire(&self) -> &[WireEvent] {
        &self.wire
    }

    pub fn calls(&self) -> &[HwCall] {
        &self.calls
    }

    pub fn slave_out(&self) -> &[u8] {
        &self.slave_out
    }

    pub fn bytes_clocked(&self) -> usize {
        self.bytes_clocked
    }

    pub fn speed(&self) -> Option<I2cSpeed> {
        self.speed
    }

    pub fn module_enabled(&self) -> bool {
        self.module_enabled
    }

    pub fn enabled_sources(&self) -> InterruptFlags {
        self.enabled
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    pub fn own_address(&self) -> Option<u8> {
        self.own_address
    }

    fn raise(&mut self, flags: InterruptFlags) {
        if !self.stalled {
            self.pending |= flags;
        }
    }

    fn clock_in(&mut self) {
        let byte = self
            .devices
            .get_mut(&self.target)
            .and_then(VecDeque::pop_front)
            .unwrap_or(0xff);
        self.wire.push(WireEvent::Byte(byte));
        self.bytes_clocked += 1;
        self.in_flight = Some(byte);
        self.raise(InterruptFlags::RECEIVE);
    }

    fn countdown(cell: &Cell<u32>) -> bool {
        let left = cell.get();
        if left == 0 {
            return false;
        }
        cell.set(left - 1);
        true
    }
}

impl I2cHardware for SimBus {
    fn init_master(&mut self, speed: I2cSpeed) {
        self.calls.push(HwCall::InitMaster(speed));
        self.speed = Some(speed);
        self.own_address = None;
    }

    fn init_slave(&mut self, own_address: u8) {
        self.calls.push(HwCall::InitSlave(own_address));
        self.own_address = Some(own_address);
    }

    fn enable_module(&mut self) {
        self.calls.push(HwCall::Enable);
        self.module_enabled = true;
    }

    fn disable_module(&mut self) {
        self.calls.push(HwCall::Disable);
        self.module_enabled = false;
    }

    fn set_mode(&mut self, mode: TransferMode) {
        self.calls.push(HwCall::SetMode(mode));
        self.mode = mode;
    }

    fn set_target_address(&mut self, address: u8) {
        self.calls.push(HwCall::SetTarget(address));
        self.target = address;
    }

    fn issue_start(&mut self) {
        self.calls.push(HwCall::Start);
        self.in_flight = None;
        self.stop_requested = false;
        let read = self.mode == TransferMode::Receive;
        self.wire.push(WireEvent::Start {
            address: self.target,
            read,
        });
        if !self.devices.contains_key(&self.target) {
            self.nakked = true;
            self.wire.push(WireEvent::Nak);
            self.raise(InterruptFlags::NAK);
            return;
        }
        self.nakked = false;
        if read {
            self.clock_in();
        }
    }

    fn issue_stop(&mut self) {
        self.calls.push(HwCall::Stop);
        if self.mode == TransferMode::Receive && self.in_flight.is_some() {
            self.stop_requested = true;
        } else {
            self.wire.push(WireEvent::Stop);
        }
    }

    fn send_next_byte(&mut self, byte: u8) {
        self.calls.push(HwCall::Send(byte));
        if self.own_address.is_some() {
            self.slave_out.push(byte);
            return;
        }
        if self.nakked {
            return;
        }
        self.wire.push(WireEvent::Byte(byte));
        self.raise(InterruptFlags::TRANSMIT);
    }

    fn receive_next_byte(&mut self) -> u8 {
        self.calls.push(HwCall::Receive);
        match self.in_flight.take() {
            Some(byte) => {
                if self.stop_requested {
                    self.stop_requested = false;
                    self.wire.push(WireEvent::Stop);
                } else {
                    self.clock_in();
                }
                byte
            }
            None => self.inbound.pop_front().unwrap_or(0xff),
        }
    }

    fn is_bus_busy(&self) -> bool {
        Self::countdown(&self.busy_polls)
    }

    fn is_stop_pending(&self) -> bool {
        Self::countdown(&self.stop_pending_polls)
    }

    fn interrupt_status(&self) -> InterruptFlags {
        self.pending & self.enabled
    }

    fn clear_interrupt_status(&mut self, flags: InterruptFlags) {
        self.pending.remove(flags);
    }

    fn enable_interrupt_sources(&mut self, flags: InterruptFlags) {
        self.enabled |= flags;
    }

    fn disable_interrupt_sources(&mut self, flags: InterruptFlags) {
        self.enabled.remove(flags);
    }
}

/// Runs the dispatcher of one bus every time the driver sleeps.
pub struct SimDelay<'r, Q, V, L, const TX: usize, const RX: usize> {
    registry: &'r BusRegistry<SimBus, Q, V, L, TX, RX>,
    bus: BusId,
    pub ticks: usize,
}

impl<'r, Q, V, L, const TX: usize, const RX: usize> SimDelay<'r, Q, V, L, TX, RX> {
    pub fn new(registry: &'r BusRegistry<SimBus, Q, V, L, TX, RX>, bus: BusId) -> Self {
        Self {
            registry,
            bus,
            ticks: 0,
        }
    }
}

impl<Q, V, L, const TX: usize, const RX: usize> DelayNs for SimDelay<'_, Q, V, L, TX, RX>
where
    Q: Requester,
    V: Receiver,
    L: Logger,
{
    fn delay_ns(&mut self, _ns: u32) {
        self.ticks += 1;
        self.registry.on_interrupt(self.bus);
    }
}

fn fire<Q, V, L, const TX: usize, const RX: usize>(
    registry: &BusRegistry<SimBus, Q, V, L, TX, RX>,
    bus: BusId,
    stimulus: impl FnOnce(&mut SimBus),
) where
    Q: Requester,
    V: Receiver,
    L: Logger,
{
    registry
        .lookup(bus, |ctx| stimulus(ctx.hardware_mut()))
        .expect("bus not bound");
    registry.on_interrupt(bus);
}

/// A remote master writes `bytes` to the slave on `bus`, then stops.
pub fn remote_write<Q, V, L, const TX: usize, const RX: usize>(
    registry: &BusRegistry<SimBus, Q, V, L, TX, RX>,
    bus: BusId,
    bytes: &[u8],
) where
    Q: Requester,
    V: Receiver,
    L: Logger,
{
    for &byte in bytes {
        fire(registry, bus, |hw| hw.inject(byte));
    }
    fire(registry, bus, |hw| hw.latch(InterruptFlags::STOP));
}

/// A remote master reads `count` bytes from the slave on `bus`, then stops.
pub fn remote_read<Q, V, L, const TX: usize, const RX: usize>(
    registry: &BusRegistry<SimBus, Q, V, L, TX, RX>,
    bus: BusId,
    count: usize,
) -> Vec<u8>
where
    Q: Requester,
    V: Receiver,
    L: Logger,
{
    let sent_before = registry
        .lookup(bus, |ctx| ctx.hardware().slave_out().len())
        .expect("bus not bound");
    for _ in 0..count {
        fire(registry, bus, |hw| hw.latch(InterruptFlags::TRANSMIT));
    }
    let bytes = registry
        .lookup(bus, |ctx| ctx.hardware().slave_out()[sent_before..].to_vec())
        .expect("bus not bound");
    fire(registry, bus, |hw| hw.latch(InterruptFlags::STOP));
    bytes
}

/// Answers every master read with a fixed response.
#[derive(Default)]
pub struct Script {
    pub response: Vec<u8>,
    pub calls: usize,
}

impl Script {
    pub fn new(response: &[u8]) -> Self {
        Self {
            response: response.to_vec(),
            calls: 0,
        }
    }
}

impl Requester for Script {
    fn on_request(&mut self, response: &mut ResponseWriter<'_>) {
        self.calls += 1;
        let _ = response.write_all(&self.response);
    }
}

/// Remembers the size of every delivery.
#[derive(Default)]
pub struct Deliveries {
    pub counts: Vec<usize>,
}

impl Receiver for Deliveries {
    fn on_receive(&mut self, byte_count: usize) {
        self.counts.push(byte_count);
    }
}

#[derive(Default)]
pub struct RecordingLogger {
    pub lines: Vec<String>,
}

impl Logger for RecordingLogger {
    fn debug(&mut self, args: fmt::Arguments<'_>) {
        self.lines.push(std::format!("DEBUG {args}"));
    }

    fn warn(&mut self, args: fmt::Arguments<'_>) {
        self.lines.push(std::format!("WARN {args}"));
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        self.lines.push(std::format!("ERROR {args}"));
    }
}
