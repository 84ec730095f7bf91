// Licensed under the Apache-2.0 license

//! Interrupt-side state machine.
//!
//! [`BusContext::on_interrupt`] runs once per hardware interrupt. It latches
//! and clears the status word, then services RECEIVE, TRANSMIT, NAK and
//! STOP in that order. Several may be set in one invocation.

use crate::common::Logger;
use crate::i2c::buffer::BufferState;
use crate::i2c::common::{Role, PAD_BYTE};
use crate::i2c::context::BusContext;
use crate::i2c::sync::Outcome;
use crate::i2c::traits::{I2cHardware, InterruptFlags, Receiver, Requester};

impl<H, Q, V, L, const TX: usize, const RX: usize> BusContext<H, Q, V, L, TX, RX>
where
    H: I2cHardware,
    Q: Requester,
    V: Receiver,
    L: Logger,
{
    pub fn on_interrupt(&mut self) {
        let status = self.hardware.interrupt_status();
        self.hardware.clear_interrupt_status(status);

        if status.contains(InterruptFlags::RECEIVE) {
            self.service_receive();
        }
        if status.contains(InterruptFlags::TRANSMIT) {
            self.service_transmit();
        }
        if status.contains(InterruptFlags::NAK) {
            self.service_nak();
        }
        if status.contains(InterruptFlags::STOP) {
            self.service_stop();
        }
    }

    fn service_receive(&mut self) {
        let expected = self.rx.committed_size();
        if expected > 0 {
            let index = self.rx.write_index();
            // Queue the stop while the last byte is still being clocked in.
            if index + 1 == expected && index != 0 {
                self.hardware.issue_stop();
            }
            let byte = self.hardware.receive_next_byte();
            if index < expected && self.rx.push(byte).is_err() {
                self.stats.rx_overruns = self.stats.rx_overruns.saturating_add(1);
            }
            if self.rx.write_index() == expected {
                self.cursor.fill(self.rx.filled());
                self.sync.request.signal(Outcome::Completed);
            }
            return;
        }

        let byte = self.hardware.receive_next_byte();
        if self.role != Some(Role::Slave) {
            return;
        }
        if self.rx.push(byte).is_err() {
            self.stats.rx_overruns = self.stats.rx_overruns.saturating_add(1);
            self.logger
                .warn(format_args!("{}: receive overrun, byte discarded", self.bus));
        }
    }

    fn service_transmit(&mut self) {
        match self.role {
            Some(Role::Master) => {
                if self.tx.state() != BufferState::InFlight {
                    return;
                }
                match self.tx.next_countdown() {
                    Some(byte) => self.hardware.send_next_byte(byte),
                    None => {
                        if self.sync.take_send_stop() {
                            self.hardware.issue_stop();
                        }
                        self.tx.reset();
                        self.sync.write.signal(Outcome::Completed);
                    }
                }
            }
            Some(Role::Slave) => self.handle_request_slave(),
            None => {}
        }
    }

    fn service_nak(&mut self) {
        self.stats.naks = self.stats.naks.saturating_add(1);
        self.logger.warn(format_args!(
            "{}: no acknowledge from {:#04x}",
            self.bus,
            self.address.unwrap_or_default()
        ));

        if self.role == Some(Role::Master) {
            self.hardware.issue_stop();
            if self.tx.state() == BufferState::InFlight {
                self.tx.reset();
                self.sync.write.signal(Outcome::Nak);
            }
        }
        self.sync.request.signal(Outcome::Nak);
    }

    fn service_stop(&mut self) {
        if self.role != Some(Role::Slave) {
            return;
        }
        if self.tx.write_index() != 0 {
            // Master stopped mid-response: prime a dummy and start over.
            self.hardware.send_next_byte(PAD_BYTE);
            self.rx.reset();
            self.tx.reset();
        } else if self.rx.write_index() != 0 {
            self.handle_receive();
        }
    }
}
