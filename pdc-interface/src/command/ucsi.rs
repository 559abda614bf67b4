//! Standard connector commands, shaped after UCSI
use heapless::Vec;

use crate::pdo::MAX_PDOS;

/// Maximum length of a raw UCSI parameter block
pub const MAX_RAW_LEN: usize = 16;

/// Maximum number of PDOs that one GET_PDOS can return
pub const MAX_GET_PDOS: u8 = 4;

/// UCSI command codes
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Opcode {
    PpmReset = 0x01,
    ConnectorReset = 0x03,
    SetNotificationEnable = 0x05,
    GetCapability = 0x06,
    GetConnectorCapability = 0x07,
    SetCcom = 0x08,
    SetUor = 0x09,
    SetPdr = 0x0B,
    GetPdos = 0x10,
    GetCableProperty = 0x11,
    GetConnectorStatus = 0x12,
    GetErrorStatus = 0x13,
    SetRetimerMode = 0x1B,
    SetPdos = 0x1D,
    ReadPowerLevel = 0x1E,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x01 => Opcode::PpmReset,
            0x03 => Opcode::ConnectorReset,
            0x05 => Opcode::SetNotificationEnable,
            0x06 => Opcode::GetCapability,
            0x07 => Opcode::GetConnectorCapability,
            0x08 => Opcode::SetCcom,
            0x09 => Opcode::SetUor,
            0x0B => Opcode::SetPdr,
            0x10 => Opcode::GetPdos,
            0x11 => Opcode::GetCableProperty,
            0x12 => Opcode::GetConnectorStatus,
            0x13 => Opcode::GetErrorStatus,
            0x1B => Opcode::SetRetimerMode,
            0x1D => Opcode::SetPdos,
            0x1E => Opcode::ReadPowerLevel,
            other => return Err(other),
        })
    }
}

/// Connector reset type
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetType {
    Soft,
    Hard,
}

/// CC operation mode
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ccom {
    Rp,
    Rd,
    Drp,
}

/// USB operation role request
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Uor {
    pub swap_to_dfp: bool,
    pub swap_to_ufp: bool,
    pub accept_dr_swap: bool,
}

/// Power direction role request
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pdr {
    pub swap_to_src: bool,
    pub swap_to_snk: bool,
    pub accept_pr_swap: bool,
}

/// GET_PDOS parameters
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GetPdos {
    /// Read the partner's PDOs instead of our own
    pub partner: bool,
    /// Index of the first PDO
    pub offset: u8,
    /// Number of PDOs, 1 to [`MAX_GET_PDOS`]
    pub count: u8,
    /// Source PDOs rather than sink PDOs
    pub source: bool,
}

/// SET_PDOS parameters
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetPdos {
    pub source: bool,
    pub pdos: Vec<u32, MAX_PDOS>,
}

/// Standard connector command
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    PpmReset,
    ConnectorReset(ResetType),
    GetCapability,
    GetConnectorCapability,
    SetCcom(Ccom),
    SetUor(Uor),
    SetPdr(Pdr),
    GetPdos(GetPdos),
    SetPdos(SetPdos),
    GetConnectorStatus,
    GetErrorStatus,
    GetCableProperty,
    ReadPowerLevel,
    SetRetimerMode(u32),
    /// Enable notifications for the given UCSI notification mask
    SetNotificationEnable(u32),
    /// Caller-built parameter block sent unmodified
    Raw(Vec<u8, MAX_RAW_LEN>),
}

impl Command {
    /// Command code, raw commands report the code in their first byte
    pub fn opcode(&self) -> u8 {
        let opcode = match self {
            Command::PpmReset => Opcode::PpmReset,
            Command::ConnectorReset(_) => Opcode::ConnectorReset,
            Command::GetCapability => Opcode::GetCapability,
            Command::GetConnectorCapability => Opcode::GetConnectorCapability,
            Command::SetCcom(_) => Opcode::SetCcom,
            Command::SetUor(_) => Opcode::SetUor,
            Command::SetPdr(_) => Opcode::SetPdr,
            Command::GetPdos(_) => Opcode::GetPdos,
            Command::SetPdos(_) => Opcode::SetPdos,
            Command::GetConnectorStatus => Opcode::GetConnectorStatus,
            Command::GetErrorStatus => Opcode::GetErrorStatus,
            Command::GetCableProperty => Opcode::GetCableProperty,
            Command::ReadPowerLevel => Opcode::ReadPowerLevel,
            Command::SetRetimerMode(_) => Opcode::SetRetimerMode,
            Command::SetNotificationEnable(_) => Opcode::SetNotificationEnable,
            Command::Raw(data) => return data.first().copied().unwrap_or(0),
        };
        opcode as u8
    }

    /// Check parameters that can be rejected before reaching the controller
    pub fn is_valid(&self) -> bool {
        match self {
            Command::GetPdos(params) => (1..=MAX_GET_PDOS).contains(&params.count),
            Command::SetPdos(params) => !params.pdos.is_empty(),
            Command::Raw(data) => !data.is_empty(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes() {
        assert_eq!(Command::GetConnectorStatus.opcode(), 0x12);
        assert_eq!(Command::SetNotificationEnable(0).opcode(), 0x05);

        let raw = Command::Raw(Vec::from_slice(&[0x06, 0x00]).unwrap());
        assert_eq!(raw.opcode(), 0x06);

        assert_eq!(Opcode::try_from(raw.opcode()), Ok(Opcode::GetCapability));
        assert_eq!(Opcode::try_from(0x15), Err(0x15));
    }

    #[test]
    fn parameter_validation() {
        let get_pdos = |count| {
            Command::GetPdos(GetPdos {
                partner: true,
                offset: 0,
                count,
                source: true,
            })
        };
        assert!(!get_pdos(0).is_valid());
        assert!(get_pdos(4).is_valid());
        assert!(!get_pdos(5).is_valid());

        assert!(!Command::Raw(Vec::new()).is_valid());
        assert!(
            !Command::SetPdos(SetPdos {
                source: false,
                pdos: Vec::new()
            })
            .is_valid()
        );
        assert!(Command::PpmReset.is_valid());
    }
}
