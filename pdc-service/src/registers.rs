//! Controller register map and field layouts
//!
//! Every multi-byte value is little endian. Each port is served by its own register set.
use bitfield::bitfield;
use bitflags::bitflags;

/// Size of the largest register
pub const MAX_REGISTER_LEN: usize = 64;

/// Registers accessed by the driver
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    Mode,
    CustomerUse,
    Command,
    Data,
    Version,
    InterruptEvent,
    InterruptMask,
    InterruptClear,
    Status,
    SxAppConfig,
    PowerPathStatus,
    PortConfiguration,
    PortControl,
    BootFlags,
    ActivePdo,
    ActiveRdo,
    AutonegotiateSink,
    TxIdentity,
    RxIdentitySop,
    RxIdentitySopPrime,
    DataStatus,
}

impl Register {
    /// Register address
    pub const fn address(self) -> u8 {
        match self {
            Register::Mode => 0x03,
            Register::CustomerUse => 0x06,
            Register::Command => 0x08,
            Register::Data => 0x09,
            Register::Version => 0x0F,
            Register::InterruptEvent => 0x14,
            Register::InterruptMask => 0x16,
            Register::InterruptClear => 0x18,
            Register::Status => 0x1A,
            Register::SxAppConfig => 0x20,
            Register::PowerPathStatus => 0x26,
            Register::PortConfiguration => 0x28,
            Register::PortControl => 0x29,
            Register::BootFlags => 0x2D,
            Register::ActivePdo => 0x34,
            Register::ActiveRdo => 0x35,
            Register::AutonegotiateSink => 0x37,
            Register::TxIdentity => 0x47,
            Register::RxIdentitySop => 0x48,
            Register::RxIdentitySopPrime => 0x49,
            Register::DataStatus => 0x5F,
        }
    }

    /// Register length in bytes
    pub const fn size(self) -> usize {
        match self {
            Register::Data => MAX_REGISTER_LEN,
            Register::CustomerUse | Register::AutonegotiateSink | Register::TxIdentity => 8,
            Register::RxIdentitySop | Register::RxIdentitySopPrime => IDENTITY_DATA_OBJECT_LEN,
            Register::DataStatus => 5,
            Register::SxAppConfig => 1,
            _ => 4,
        }
    }
}

/// Mode register contents while application firmware is running
pub const MODE_APP: [[u8; 4]; 2] = [*b"APP0", *b"APP1"];

/// Command register contents after the controller rejected a task
pub const UNKNOWN_COMMAND: [u8; 4] = *b"!CMD";

/// Tasks started through the command register
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Task {
    /// Standard connector command
    Ucsi,
    /// Enable the sink path
    Srdy,
    /// Disable the sink path
    Sryr,
    /// Re-evaluate the sink contract
    Aneg,
    /// Clear the dead battery flag
    Dbfg,
    /// Cold reset
    Gaid,
    /// Disconnect and reconnect
    Disc,
    /// Set the SBU mux mode
    Sbud,
    /// Report the active RDO
    Grdo,
}

impl Task {
    /// Four character code written to the command register
    pub const fn code(self) -> [u8; 4] {
        match self {
            Task::Ucsi => *b"UCSI",
            Task::Srdy => *b"SRDY",
            Task::Sryr => *b"SRYR",
            Task::Aneg => *b"ANeg",
            Task::Dbfg => *b"DBfg",
            Task::Gaid => *b"GAID",
            Task::Disc => *b"DISC",
            Task::Sbud => *b"SBUd",
            Task::Grdo => *b"GRDO",
        }
    }
}

bitflags! {
    /// Interrupt event, mask and clear registers
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Interrupt: u32 {
        const PD_HARD_RESET = 1 << 0;
        const PLUG_INSERT_OR_REMOVAL = 1 << 1;
        const POWER_SWAP_COMPLETE = 1 << 2;
        const FR_SWAP_COMPLETE = 1 << 3;
        const DATA_SWAP_COMPLETE = 1 << 4;
        const SINK_READY = 1 << 5;
        const NEW_CONTRACT_AS_CONSUMER = 1 << 6;
        const NOT_SUPPORTED_RECEIVED = 1 << 7;
        const UCSI_CONNECTOR_STATUS_CHANGE = 1 << 8;
        const POWER_EVENT_ERROR = 1 << 9;
        const EXTERNAL_DCDC_EVENT = 1 << 10;
        /// Firmware was (re)loaded, every port must be reinitialized
        const PATCH_LOADED = 1 << 11;
    }
}

impl Interrupt {
    /// Interrupts enabled during initialization
    pub const fn default_mask() -> Self {
        Self::PD_HARD_RESET
            .union(Self::PLUG_INSERT_OR_REMOVAL)
            .union(Self::POWER_SWAP_COMPLETE)
            .union(Self::FR_SWAP_COMPLETE)
            .union(Self::DATA_SWAP_COMPLETE)
            .union(Self::SINK_READY)
            .union(Self::NEW_CONTRACT_AS_CONSUMER)
            .union(Self::UCSI_CONNECTOR_STATUS_CHANGE)
            .union(Self::POWER_EVENT_ERROR)
            .union(Self::EXTERNAL_DCDC_EVENT)
            .union(Self::PATCH_LOADED)
    }
}

bitfield! {
    /// Port control register
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct PortControl(u32);
    impl Debug;
    pub u8, typec_current, set_typec_current: 1, 0;
    pub process_swap_to_sink, set_process_swap_to_sink: 2;
    pub process_swap_to_source, set_process_swap_to_source: 3;
    pub automatic_cap_request, set_automatic_cap_request: 4;
    pub auto_alert_enable, set_auto_alert_enable: 5;
    pub process_swap_to_dfp, set_process_swap_to_dfp: 6;
    pub automatic_id_request, set_automatic_id_request: 7;
    pub fr_swap_enabled, set_fr_swap_enabled: 8;
    pub retimer_fw_update, set_retimer_fw_update: 9;
    pub process_swap_to_ufp, set_process_swap_to_ufp: 10;
    pub u8, deglitch_cnt_lo, set_deglitch_cnt_lo: 15, 12;
    /// Request a data role swap to UFP after the next contract
    pub initiate_swap_to_ufp, set_initiate_swap_to_ufp: 16;
    /// Request a data role swap to DFP after the next contract
    pub initiate_swap_to_dfp, set_initiate_swap_to_dfp: 17;
}

impl PortControl {
    /// Value written during initialization
    pub fn init_default() -> Self {
        let mut control = Self(0);
        control.set_typec_current(1);
        control.set_process_swap_to_sink(true);
        control.set_process_swap_to_source(true);
        control.set_automatic_cap_request(true);
        control.set_auto_alert_enable(true);
        control.set_process_swap_to_dfp(true);
        control.set_automatic_id_request(true);
        control.set_fr_swap_enabled(true);
        control.set_deglitch_cnt_lo(6);
        control
    }
}

bitfield! {
    /// Port configuration register
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct PortConfiguration(u32);
    impl Debug;
    /// Sink, source or dual role
    pub u8, typec_state, set_typec_state: 1, 0;
    /// Dual role toggling behavior
    pub u8, typec_support_options, set_typec_support_options: 3, 2;
}

bitfield! {
    /// Power path status register
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct PowerPathStatus(u32);
    impl Debug;
    pub u8, vconn_sw, _: 1, 0;
    pub u8, ext_vbus_sw, _: 4, 2;
    pub u8, int_vbus_sw, _: 7, 5;
}

/// External VBUS switch enabled towards the system
pub const EXT_VBUS_SWITCH_ENABLED_INPUT: u8 = 3;

/// VCONN switch state bit set while sourcing VCONN
pub const VCONN_SWITCH_SOURCING: u8 = 0x2;

bitfield! {
    /// Boot flags register
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct BootFlags(u32);
    impl Debug;
    pub dead_battery_flag, _: 2;
    pub u8, active_bank, _: 5, 4;
}

bitfield! {
    /// Status register
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Status(u32);
    impl Debug;
    pub plug_present, _: 0;
    pub u8, connection_state, _: 3, 1;
    pub u8, sbu_mux_mode, _: 9, 8;
}

bitfield! {
    /// Autonegotiate sink register
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct AutonegotiateSink(u64);
    impl Debug;
    pub auto_compute_sink_min_power, set_auto_compute_sink_min_power: 0;
    pub auto_compute_sink_min_voltage, set_auto_compute_sink_min_voltage: 1;
    pub auto_compute_sink_max_voltage, set_auto_compute_sink_max_voltage: 2;
    /// 10 mA units
    pub u16, max_current, set_max_current: 17, 8;
    /// 250 mW units
    pub u16, min_required_power, set_min_required_power: 27, 18;
    /// 50 mV units
    pub u16, max_voltage, set_max_voltage: 37, 28;
    /// 50 mV units
    pub u16, min_voltage, set_min_voltage: 47, 38;
    /// 250 mW units
    pub u16, capabilities_mismatch_power, set_capabilities_mismatch_power: 57, 48;
}

impl AutonegotiateSink {
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

bitfield! {
    /// Transmitted identity register
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct TxIdentity(u64);
    impl Debug;
    pub u16, vendor_id, _: 15, 0;
    pub u16, product_id, _: 31, 16;
}

impl TxIdentity {
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }
}

/// Length of a received identity data object
pub const IDENTITY_DATA_OBJECT_LEN: usize = 25;

/// Number of VDOs in an identity data object
pub const IDENTITY_VDO_COUNT: usize = 6;

/// Identity response received from a port partner or cable
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IdentityDataObject(pub [u8; IDENTITY_DATA_OBJECT_LEN]);

/// Discover identity was acknowledged
pub const IDENTITY_RESPONSE_ACK: u8 = 1;

impl IdentityDataObject {
    pub fn response_type(&self) -> u8 {
        self.0[0] & 0x3
    }

    /// VDO at `index`, zero if out of range
    pub fn vdo(&self, index: usize) -> u32 {
        let start = 1 + index * 4;
        self.0
            .get(start..start + 4)
            .and_then(|bytes| bytes.try_into().ok())
            .map(u32::from_le_bytes)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_control_defaults() {
        let control = PortControl::init_default();
        assert_eq!(control.typec_current(), 1);
        assert!(control.fr_swap_enabled());
        assert!(!control.retimer_fw_update());
        assert_eq!(control.deglitch_cnt_lo(), 6);
        assert_eq!(control.0, 0x61FD);
    }

    #[test]
    fn autonegotiate_sink_fields() {
        let mut sink = AutonegotiateSink::default();
        sink.set_max_current(300);
        sink.set_min_required_power(60);
        sink.set_max_voltage(100);
        sink.set_min_voltage(100);
        let sink = AutonegotiateSink::from_bytes(sink.to_bytes());
        assert_eq!(sink.max_current(), 300);
        assert_eq!(sink.min_required_power(), 60);
        assert_eq!(sink.max_voltage(), 100);
        assert_eq!(sink.min_voltage(), 100);
        assert!(!sink.auto_compute_sink_min_power());
    }

    #[test]
    fn identity_vdos() {
        let mut raw = [0u8; IDENTITY_DATA_OBJECT_LEN];
        raw[0] = IDENTITY_RESPONSE_ACK;
        raw[1..5].copy_from_slice(&0xAABB_CCDDu32.to_le_bytes());
        raw[21..25].copy_from_slice(&0x1122_3344u32.to_le_bytes());
        let identity = IdentityDataObject(raw);
        assert_eq!(identity.response_type(), IDENTITY_RESPONSE_ACK);
        assert_eq!(identity.vdo(0), 0xAABB_CCDD);
        assert_eq!(identity.vdo(5), 0x1122_3344);
        assert_eq!(identity.vdo(6), 0);
    }

    #[test]
    fn tx_identity_ids() {
        let identity = TxIdentity::from_bytes([0x51, 0x04, 0x34, 0x12, 0, 0, 0, 0]);
        assert_eq!(identity.vendor_id(), 0x0451);
        assert_eq!(identity.product_id(), 0x1234);
    }

    #[test]
    fn default_interrupt_mask() {
        let mask = Interrupt::default_mask();
        assert!(mask.contains(Interrupt::PATCH_LOADED | Interrupt::SINK_READY));
        assert!(!mask.contains(Interrupt::NOT_SUPPORTED_RECEIVED));
    }
}
