//! Commands accepted by a port
pub mod ucsi;
pub mod vendor;

/// A single operation submitted to a port
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Ucsi(ucsi::Command),
    Vendor(vendor::Command),
}

impl Command {
    /// Check parameters that can be rejected before reaching the controller
    pub fn is_valid(&self) -> bool {
        match self {
            Command::Ucsi(command) => command.is_valid(),
            Command::Vendor(command) => command.is_valid(),
        }
    }
}

impl From<ucsi::Command> for Command {
    fn from(command: ucsi::Command) -> Self {
        Command::Ucsi(command)
    }
}

impl From<vendor::Command> for Command {
    fn from(command: vendor::Command) -> Self {
        Command::Vendor(command)
    }
}
