#![no_std]
//! Driver service for USB-C power delivery controllers
//!
//! A [`PdcManager`] owns the shared state of every port and implements [`pdc_interface::Pdc`]. Each port
//! is driven by its own [`Worker`], which must be polled continuously from a dedicated task.
pub mod bus;
pub mod config;
pub mod encoder;
pub mod manager;
pub mod port;
pub mod registers;
pub mod router;
pub mod suspend;
pub mod timing;
pub mod worker;

#[cfg(test)]
mod sim;

pub use bus::{Bus, I2cBus};
pub use config::{Config, PortConfig};
pub use manager::PdcManager;
pub use port::{Port, PortEvent, PortState};
pub use router::{ActiveLowLine, EventRouter, InterruptLine};
pub use suspend::SuspendFlag;
pub use worker::Worker;
