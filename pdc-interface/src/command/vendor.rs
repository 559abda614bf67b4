//! Controller-specific commands that have no standard connector command equivalent
use heapless::Vec;

use crate::pdo::Rdo;

/// Maximum number of VDOs returned by one [`Command::GetVdo`]
pub const MAX_VDOS: usize = 8;

/// Type-C current advertised as a source
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TypecCurrent {
    UsbDefault = 0,
    Current1A5 = 1,
    Current3A0 = 2,
}

/// Dual role toggling mode
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DrpMode {
    Normal = 0,
    TrySrc = 1,
    TrySnk = 2,
}

impl TryFrom<u8> for DrpMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DrpMode::Normal),
            1 => Ok(DrpMode::TrySrc),
            2 => Ok(DrpMode::TrySnk),
            other => Err(other),
        }
    }
}

/// Origin of identity data
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VdoOrigin {
    /// Our own identity
    Tx,
    /// Port partner
    Sop,
    /// Cable plug
    SopPrime,
}

/// Identity VDO selector
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VdoKind {
    IdHeader,
    CertState,
    Product,
    ProductType1,
    ProductType2,
    ProductType3,
}

impl VdoKind {
    /// Position of this VDO in the identity data object
    pub fn index(&self) -> usize {
        match self {
            VdoKind::IdHeader => 0,
            VdoKind::CertState => 1,
            VdoKind::Product => 2,
            VdoKind::ProductType1 => 3,
            VdoKind::ProductType2 => 4,
            VdoKind::ProductType3 => 5,
        }
    }
}

/// GET_VDO parameters
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GetVdo {
    pub origin: VdoOrigin,
    pub kinds: Vec<VdoKind, MAX_VDOS>,
}

/// SBU mux mode
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SbuMuxMode {
    Normal = 0,
    ForceDbgAcc = 1,
    ForceHiZ = 2,
}

/// Application processor sleep state
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SxState {
    S0 = 0,
    S3 = 3,
    S4 = 4,
    S5 = 5,
}

/// Vendor command
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Cold reset of the controller, every port is reinitialized afterwards
    TriggerPdcReset,
    /// Refresh the cached controller information
    GetIcStatus,
    GetRdo,
    SetRdo(Rdo),
    SetSinkPath(bool),
    GetVbusVoltage,
    SetTypecCurrent(TypecCurrent),
    SetFrs(bool),
    SetDrpMode(DrpMode),
    GetDrpMode,
    UpdateRetimer(bool),
    GetVdo(GetVdo),
    GetIdentityDiscovery(VdoOrigin),
    GetPchDataStatus,
    /// Disconnect and reconnect the port
    Reconnect,
    GetCurrentPdo,
    IsVconnSourcing,
    SetSbuMuxMode(SbuMuxMode),
    GetSbuMuxMode,
    SetApPowerState(SxState),
}

impl Command {
    /// Check parameters that can be rejected before reaching the controller
    pub fn is_valid(&self) -> bool {
        match self {
            Command::SetRdo(rdo) => rdo.object_position() != 0,
            Command::GetVdo(params) => !params.kinds.is_empty(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drp_mode_conversion() {
        assert_eq!(DrpMode::try_from(1), Ok(DrpMode::TrySrc));
        assert_eq!(DrpMode::try_from(7), Err(7));
    }

    #[test]
    fn parameter_validation() {
        assert!(!Command::SetRdo(Rdo::new(0)).is_valid());
        assert!(Command::SetRdo(Rdo::new(1 << 28)).is_valid());
        assert!(
            !Command::GetVdo(GetVdo {
                origin: VdoOrigin::Sop,
                kinds: Vec::new(),
            })
            .is_valid()
        );
    }
}
