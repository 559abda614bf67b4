#![no_std]
//! Interface to a USB-C power delivery controller (PDC) driver
//!
//! Callers submit a [`Request`] to a port and receive the outcome through a [`CciEvent`] delivered to a
//! [`Callback`]. Submission never blocks and only fails for structural reasons, see [`Error`].
use embedded_usb_pd::PortId as LocalPortId;

pub mod buffer;
pub mod cci;
pub mod command;
pub mod connector_status;
pub mod info;
pub mod pdo;

pub use buffer::OutputBuffer;
pub use cci::CciEvent;
pub use command::Command;
pub use connector_status::{ConnectorStatus, ConnectorStatusChange};
pub use info::PdcInfo;

/// Errors returned synchronously to a caller
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A command is outstanding, the port is not idle or communication is suspended
    Busy,
    /// No port with this id
    InvalidPort,
    /// Command parameters were rejected before reaching the controller
    InvalidParams,
    /// Cached data has not been read from the controller yet
    NotReady,
    /// Ports did not reach the requested state in time
    Timeout,
}

/// Receiver for command completions and connector change notifications
pub trait Callback: Sync {
    fn on_cci(&self, port: LocalPortId, cci: CciEvent);
}

impl<F> Callback for F
where
    F: Fn(LocalPortId, CciEvent) + Sync,
{
    fn on_cci(&self, port: LocalPortId, cci: CciEvent) {
        self(port, cci)
    }
}

/// A command together with where its result goes
#[derive(Clone)]
pub struct Request<'a> {
    pub command: Command,
    /// Receives the response payload
    pub output: Option<&'a OutputBuffer>,
    /// One-shot callback, takes precedence over the port's persistent callback
    pub callback: Option<&'a dyn Callback>,
}

impl<'a> Request<'a> {
    pub fn new(command: impl Into<Command>) -> Self {
        Self {
            command: command.into(),
            output: None,
            callback: None,
        }
    }

    pub fn with_output(mut self, output: &'a OutputBuffer) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_callback(mut self, callback: &'a dyn Callback) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// Driver operations visible to callers
pub trait Pdc<'a> {
    /// Queue a command on a port
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the port is not idle, already has a command outstanding or communication
    /// is suspended. Returns [`Error::InvalidParams`] for parameters that can never succeed.
    fn submit(&self, port: LocalPortId, request: Request<'a>) -> Result<(), Error>;

    /// Clear the given sticky connector change bits and raise a synthetic completion
    fn ack_change_bits(&self, port: LocalPortId, mask: ConnectorStatusChange, ack_command: bool) -> Result<(), Error>;

    /// True once the port finished initialization, false for unknown ports
    fn is_init_done(&self, port: LocalPortId) -> bool;

    /// Bus address the port is bound to
    fn get_hw_config(&self, port: LocalPortId) -> Result<u16, Error>;

    /// Cached controller information, no bus traffic
    fn get_info(&self, port: LocalPortId) -> Result<PdcInfo, Error>;

    /// Set the persistent command completion callback
    fn set_callback(&self, port: LocalPortId, callback: Option<&'a dyn Callback>) -> Result<(), Error>;

    /// Set the callback receiving connector change notifications
    fn set_connector_change_callback(
        &self,
        port: LocalPortId,
        callback: Option<&'a dyn Callback>,
    ) -> Result<(), Error>;

    /// Suspend or resume communication with every port
    fn set_comms(&self, active: bool) -> impl Future<Output = Result<(), Error>>;
}
