//! Interrupt fan-out across ports sharing one interrupt line
//!
//! The line carries no information about which port raised it, so every signal wakes every port. Each
//! worker then reads only its own interrupt register, which keeps bus access with the owning worker.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::InputPin;
use embedded_services::{GlobalRawMutex, debug, trace};

use crate::port::{Port, PortEvent};

/// Level of the shared interrupt line
pub trait InterruptLine: Sync {
    /// Returns true while any controller holds the line asserted
    fn is_asserted(&self) -> bool;
}

/// Interrupt line on an active low input pin
pub struct ActiveLowLine<P: InputPin> {
    pin: Mutex<GlobalRawMutex, RefCell<P>>,
}

impl<P: InputPin> ActiveLowLine<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin: Mutex::new(RefCell::new(pin)),
        }
    }
}

impl<P: InputPin + Send> InterruptLine for ActiveLowLine<P> {
    fn is_asserted(&self) -> bool {
        // A pin that cannot be read is treated as idle, the next edge signals again
        self.pin.lock(|pin| pin.borrow_mut().is_low().unwrap_or(false))
    }
}

/// Wakes port workers on interrupts and controller-wide events
pub struct EventRouter<'a> {
    line: Option<&'a dyn InterruptLine>,
}

impl<'a> EventRouter<'a> {
    pub fn new(line: Option<&'a dyn InterruptLine>) -> Self {
        Self { line }
    }

    /// Post `events` to every port
    pub fn broadcast<M: RawMutex>(&self, ports: &[Port<'_, M>], events: PortEvent) {
        for port in ports {
            port.post(events);
        }
    }

    /// The shared line fired
    pub fn on_signal<M: RawMutex>(&self, ports: &[Port<'_, M>]) {
        trace!("Interrupt signal");
        self.broadcast(ports, PortEvent::IRQ);
    }

    /// Send every port back to initialization
    ///
    /// A firmware reload or controller reset invalidates the state of every port at once, not just the one
    /// that noticed it.
    pub fn reload_all<M: RawMutex>(&self, ports: &[Port<'_, M>], delayed: bool) {
        debug!("Reloading all ports, delayed: {}", delayed);
        let event = if delayed {
            PortEvent::RELOAD_DELAYED
        } else {
            PortEvent::RELOAD
        };
        self.broadcast(ports, event);
    }

    /// Signal again if the line is still asserted after an interrupt was handled
    ///
    /// Returns true if the ports were woken.
    pub fn recheck<M: RawMutex>(&self, ports: &[Port<'_, M>]) -> bool {
        let asserted = self.line.is_some_and(|line| line.is_asserted());
        if asserted {
            debug!("Interrupt line still asserted");
            self.on_signal(ports);
        }
        asserted
    }
}
