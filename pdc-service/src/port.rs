//! Shared half of a port
//!
//! Callers, the event router and the port's worker all reach a port through this type. Only the worker
//! touches the bus; everything here is plain data behind short blocking critical sections.
use core::cell::{Cell, RefCell};

use bitflags::bitflags;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_services::event::EventGroup;
use embedded_services::{debug, trace};
use embedded_usb_pd::PortId as LocalPortId;
use pdc_interface::{Callback, CciEvent, ConnectorStatus, ConnectorStatusChange, Error, PdcInfo, Request};
use portable_atomic::{AtomicBool, Ordering};

use crate::config::PortConfig;
use crate::registers::{PortConfiguration, PortControl};

/// Worker state
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortState {
    Init,
    Idle,
    ErrorRecovery,
    TaskWait,
    Suspended,
}

bitflags! {
    /// Events that wake a port's worker
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct PortEvent: u32 {
        /// The shared interrupt line fired
        const IRQ = 1 << 0;
        /// A command was queued
        const COMMAND = 1 << 1;
        /// Communication is being suspended
        const SUSPEND_REQUEST = 1 << 2;
        /// Run the current state again
        const INTERNAL = 1 << 3;
        /// A synthetic completion is waiting to be reported
        const COMMAND_COMPLETE = 1 << 4;
        /// Firmware was reloaded, reinitialize now
        const RELOAD = 1 << 5;
        /// The controller was reset, reinitialize once it had time to boot
        const RELOAD_DELAYED = 1 << 6;
    }
}

impl PortEvent {
    /// Events that wake the worker outside of idle
    pub const OUTSIDE_IDLE: Self = Self::IRQ
        .union(Self::SUSPEND_REQUEST)
        .union(Self::INTERNAL)
        .union(Self::RELOAD)
        .union(Self::RELOAD_DELAYED);

    /// Events that make the worker run its current state
    pub const RUN_STATE: Self = Self::INTERNAL
        .union(Self::SUSPEND_REQUEST)
        .union(Self::COMMAND)
        .union(Self::COMMAND_COMPLETE);
}

/// Single command slot
#[derive(Default)]
pub(crate) enum Slot<'a> {
    #[default]
    Empty,
    /// Accepted, not yet picked up by the worker
    Queued(Request<'a>),
    /// Owned by the worker until its completion is reported
    InFlight,
}

/// Last connector status plus change bits kept until acknowledged
#[derive(Copy, Clone, Debug, Default)]
struct StatusCache {
    status: Option<ConnectorStatus>,
    sticky: ConnectorStatusChange,
}

impl StatusCache {
    fn merge(&mut self, mut fresh: ConnectorStatus) -> ConnectorStatus {
        self.sticky |= fresh.change();
        fresh.set_change(self.sticky);
        self.status = Some(fresh);
        fresh
    }

    fn ack(&mut self, mask: ConnectorStatusChange) {
        self.sticky.remove(mask);
        if let Some(status) = self.status.as_mut() {
            status.set_change(self.sticky);
        }
    }
}

/// Shared state of a single port
pub struct Port<'a, M: RawMutex> {
    id: LocalPortId,
    config: PortConfig,
    pub(crate) events: EventGroup<M>,
    state: Mutex<M, Cell<PortState>>,
    init_done: AtomicBool,
    slot: Mutex<M, RefCell<Slot<'a>>>,
    callback: Mutex<M, Cell<Option<&'a dyn Callback>>>,
    connector_change_callback: Mutex<M, Cell<Option<&'a dyn Callback>>>,
    /// Pending synthetic completion, holds the requested ack flag
    ack: Mutex<M, Cell<Option<bool>>>,
    connector_status: Mutex<M, Cell<StatusCache>>,
    info: Mutex<M, Cell<Option<PdcInfo>>>,
    port_control: Mutex<M, Cell<Option<PortControl>>>,
    port_configuration: Mutex<M, Cell<Option<PortConfiguration>>>,
}

impl<'a, M: RawMutex> Port<'a, M> {
    pub fn new(id: LocalPortId, config: PortConfig) -> Self {
        Self {
            id,
            config,
            events: EventGroup::new(),
            state: Mutex::new(Cell::new(PortState::Init)),
            init_done: AtomicBool::new(false),
            slot: Mutex::new(RefCell::new(Slot::Empty)),
            callback: Mutex::new(Cell::new(None)),
            connector_change_callback: Mutex::new(Cell::new(None)),
            ack: Mutex::new(Cell::new(None)),
            connector_status: Mutex::new(Cell::new(StatusCache::default())),
            info: Mutex::new(Cell::new(None)),
            port_control: Mutex::new(Cell::new(None)),
            port_configuration: Mutex::new(Cell::new(None)),
        }
    }

    pub fn id(&self) -> LocalPortId {
        self.id
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    pub fn state(&self) -> PortState {
        self.state.lock(|state| state.get())
    }

    pub(crate) fn set_state(&self, next: PortState) {
        self.state.lock(|state| state.set(next));
    }

    pub fn is_init_done(&self) -> bool {
        self.init_done.load(Ordering::Acquire)
    }

    pub(crate) fn set_init_done(&self, done: bool) {
        self.init_done.store(done, Ordering::Release);
    }

    pub(crate) fn post(&self, events: PortEvent) {
        self.events.post(events.bits());
    }

    /// Accept a request if the port is idle and has no command outstanding
    pub(crate) fn submit(&self, request: Request<'a>, suspended: bool) -> Result<(), Error> {
        if !request.command.is_valid() {
            return Err(Error::InvalidParams);
        }

        if suspended || self.state() != PortState::Idle {
            return Err(Error::Busy);
        }

        debug!("Port{}: Submitting {:?}", self.id.0, request.command);
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            if !matches!(*slot, Slot::Empty) {
                return Err(Error::Busy);
            }
            *slot = Slot::Queued(request);
            Ok(())
        })?;

        self.post(PortEvent::COMMAND);
        Ok(())
    }

    /// Queue a request issued by the worker itself, returns any caller request it displaced
    pub(crate) fn queue_internal(&self, request: Request<'a>) -> Option<Request<'a>> {
        let displaced = self.slot.lock(|slot| slot.replace(Slot::Queued(request)));
        self.post(PortEvent::COMMAND);
        match displaced {
            Slot::Queued(request) => Some(request),
            _ => None,
        }
    }

    /// Take the queued request, the slot stays occupied until [`Self::release`]
    pub(crate) fn take_queued(&self) -> Option<Request<'a>> {
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            match core::mem::replace(&mut *slot, Slot::InFlight) {
                Slot::Queued(request) => Some(request),
                previous => {
                    *slot = previous;
                    None
                }
            }
        })
    }

    /// Take a request that was accepted but never started
    pub(crate) fn take_unstarted(&self) -> Option<Request<'a>> {
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            if matches!(*slot, Slot::Queued(_)) {
                match core::mem::take(&mut *slot) {
                    Slot::Queued(request) => Some(request),
                    _ => None,
                }
            } else {
                None
            }
        })
    }

    /// Free the slot for the next caller
    pub(crate) fn release(&self) {
        self.slot.lock(|slot| *slot.borrow_mut() = Slot::Empty);
    }

    /// Free the slot unless a request is still waiting to be picked up
    pub(crate) fn release_unless_queued(&self) {
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            if !matches!(*slot, Slot::Queued(_)) {
                *slot = Slot::Empty;
            }
        });
    }

    pub(crate) fn set_callback(&self, callback: Option<&'a dyn Callback>) {
        self.callback.lock(|cb| cb.set(callback));
    }

    pub(crate) fn set_connector_change_callback(&self, callback: Option<&'a dyn Callback>) {
        self.connector_change_callback.lock(|cb| cb.set(callback));
    }

    /// Route `cci` to its receiver
    ///
    /// Connector changes go to the connector change callback if one is set, completions go to `one_shot`
    /// if present. Everything else falls back to the persistent callback.
    pub(crate) fn deliver(&self, cci: CciEvent, one_shot: Option<&'a dyn Callback>) {
        let persistent = self.callback.lock(|cb| cb.get());
        let receiver = if cci.has_connector_change() {
            self.connector_change_callback.lock(|cb| cb.get()).or(persistent)
        } else {
            one_shot.or(persistent)
        };

        trace!("Port{}: CCI {:#x}", self.id.0, cci.raw());
        match receiver {
            Some(callback) => callback.on_cci(self.id, cci),
            None => debug!("Port{}: No receiver for CCI {:#x}", self.id.0, cci.raw()),
        }
    }

    /// Clear acknowledged change bits and schedule a synthetic completion
    pub(crate) fn ack_change_bits(&self, mask: ConnectorStatusChange, ack_command: bool) {
        self.connector_status.lock(|cache| {
            let mut status = cache.get();
            status.ack(mask);
            cache.set(status);
        });
        self.ack.lock(|ack| ack.set(Some(ack_command)));
        self.post(PortEvent::COMMAND_COMPLETE);
    }

    pub(crate) fn take_ack(&self) -> Option<bool> {
        self.ack.lock(|ack| ack.take())
    }

    /// Merge freshly read status into the cache, returns the status callers should see
    pub(crate) fn merge_connector_status(&self, fresh: ConnectorStatus) -> ConnectorStatus {
        self.connector_status.lock(|cache| {
            let mut status = cache.get();
            let merged = status.merge(fresh);
            cache.set(status);
            merged
        })
    }

    /// Last connector status read, with every unacknowledged change bit
    pub fn connector_status(&self) -> Option<ConnectorStatus> {
        self.connector_status.lock(|cache| cache.get().status)
    }

    pub(crate) fn discard_connector_status(&self) {
        self.connector_status.lock(|cache| cache.set(StatusCache::default()));
    }

    pub fn info(&self) -> Option<PdcInfo> {
        self.info.lock(|info| info.get())
    }

    pub(crate) fn set_info(&self, info: PdcInfo) {
        self.info.lock(|cached| cached.set(Some(info)));
    }

    /// Port control register as last read or written
    pub fn port_control(&self) -> Option<PortControl> {
        self.port_control.lock(|shadow| shadow.get())
    }

    pub(crate) fn set_port_control(&self, value: PortControl) {
        self.port_control.lock(|shadow| shadow.set(Some(value)));
    }

    /// Port configuration register as last read or written
    pub fn port_configuration(&self) -> Option<PortConfiguration> {
        self.port_configuration.lock(|shadow| shadow.get())
    }

    pub(crate) fn set_port_configuration(&self, value: PortConfiguration) {
        self.port_configuration.lock(|shadow| shadow.set(Some(value)));
    }
}
