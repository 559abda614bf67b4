//! Power and request data object views
use bitfield::bitfield;

/// Maximum number of PDOs a port advertises or caches
pub const MAX_PDOS: usize = 7;

bitfield! {
    /// Fixed supply PDO
    #[derive(Copy, Clone, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct FixedPdo(u32);
    impl Debug;
    pub u8, kind, _: 31, 30;
    pub dual_role_power, _: 29;
    /// Voltage in 50 mV units
    pub u16, voltage, _: 19, 10;
    /// Maximum current in 10 mA units
    pub u16, max_current, _: 9, 0;
}

bitfield! {
    /// Battery supply PDO
    #[derive(Copy, Clone, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct BatteryPdo(u32);
    impl Debug;
    pub u8, kind, _: 31, 30;
    /// Maximum voltage in 50 mV units
    pub u16, max_voltage, _: 29, 20;
    /// Minimum voltage in 50 mV units
    pub u16, min_voltage, _: 19, 10;
    /// Maximum power in 250 mW units
    pub u16, max_power, _: 9, 0;
}

bitfield! {
    /// Variable supply PDO
    #[derive(Copy, Clone, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct VariablePdo(u32);
    impl Debug;
    pub u8, kind, _: 31, 30;
    /// Maximum voltage in 50 mV units
    pub u16, max_voltage, _: 29, 20;
    /// Minimum voltage in 50 mV units
    pub u16, min_voltage, _: 19, 10;
    /// Maximum current in 10 mA units
    pub u16, max_current, _: 9, 0;
}

/// Decoded power data object
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pdo {
    Fixed(FixedPdo),
    Battery(BatteryPdo),
    Variable(VariablePdo),
    /// Programmable and adjustable supplies, kept raw
    Augmented(u32),
}

impl From<u32> for Pdo {
    fn from(raw: u32) -> Self {
        match raw >> 30 {
            0 => Pdo::Fixed(FixedPdo(raw)),
            1 => Pdo::Battery(BatteryPdo(raw)),
            2 => Pdo::Variable(VariablePdo(raw)),
            _ => Pdo::Augmented(raw),
        }
    }
}

impl Pdo {
    /// Maximum voltage in mV
    pub fn max_voltage_mv(&self) -> u32 {
        match self {
            Pdo::Fixed(pdo) => u32::from(pdo.voltage()) * 50,
            Pdo::Battery(pdo) => u32::from(pdo.max_voltage()) * 50,
            Pdo::Variable(pdo) => u32::from(pdo.max_voltage()) * 50,
            Pdo::Augmented(_) => 0,
        }
    }

    /// Minimum voltage in mV
    pub fn min_voltage_mv(&self) -> u32 {
        match self {
            Pdo::Fixed(pdo) => u32::from(pdo.voltage()) * 50,
            Pdo::Battery(pdo) => u32::from(pdo.min_voltage()) * 50,
            Pdo::Variable(pdo) => u32::from(pdo.min_voltage()) * 50,
            Pdo::Augmented(_) => 0,
        }
    }
}

bitfield! {
    /// Request data object
    #[derive(Copy, Clone, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Rdo(u32);
    impl Debug;
    /// 1-based index of the requested PDO
    pub u8, object_position, set_object_position: 31, 28;
    pub capability_mismatch, set_capability_mismatch: 26;
    /// Operating current in 10 mA units
    pub u16, operating_current, set_operating_current: 19, 10;
    /// Maximum operating current in 10 mA units
    pub u16, max_operating_current, set_max_operating_current: 9, 0;
}

impl Rdo {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}
