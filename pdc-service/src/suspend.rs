//! Communication suspend flag shared by every port
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant, Timer};
use embedded_services::{info, warn};
use pdc_interface::Error;
use portable_atomic::{AtomicBool, Ordering};

use crate::port::{Port, PortState};

/// Set while bus traffic must stop on every port
#[derive(Debug, Default)]
pub struct SuspendFlag(AtomicBool);

impl SuspendFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Set the flag, returns true if it was already set
    pub fn set(&self) -> bool {
        self.0.swap(true, Ordering::AcqRel)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Poll every `interval` until all `ports` are suspended or `timeout` passes
pub(crate) async fn wait_suspended<M: RawMutex>(
    ports: &[Port<'_, M>],
    timeout: Duration,
    interval: Duration,
) -> Result<(), Error> {
    let deadline = Instant::now().checked_add(timeout).unwrap_or(Instant::MAX);
    loop {
        if ports.iter().all(|port| port.state() == PortState::Suspended) {
            info!("All ports suspended");
            return Ok(());
        }

        if Instant::now() >= deadline {
            for port in ports.iter().filter(|port| port.state() != PortState::Suspended) {
                warn!("Port{}: Not suspended, state {:?}", port.id().0, port.state());
            }
            return Err(Error::Timeout);
        }

        Timer::after(interval).await;
    }
}
