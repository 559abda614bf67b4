//! Driver and per-port configuration
use embassy_time::Duration;

/// Timing configuration shared by every port
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Interval between polls of the command register while a task is running
    pub task_poll_interval: Duration,
    /// Give up on a running task after this long
    pub task_timeout: Duration,
    /// Delay between a contract interrupt and trusting the new contract
    pub contract_settle_delay: Duration,
    /// How long a gated command waits for its contract window
    pub gated_command_timeout: Duration,
    /// Delay before retrying initialization after a failure
    pub init_error_delay: Duration,
    /// Delay before reinitializing after a controller reset
    pub reset_recovery_delay: Duration,
    /// Delay before retrying interrupt processing after a bus failure
    pub irq_retry_delay: Duration,
    /// Number of initialization attempts before the port is suspended
    pub init_retry_max: u8,
    /// Maximum time to wait for every port to suspend
    pub suspend_timeout: Duration,
    pub suspend_poll_interval: Duration,
    /// Number of polls allowed for the dead battery clear task
    pub dead_battery_poll_limit: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            task_poll_interval: Duration::from_millis(10),
            task_timeout: Duration::from_millis(1000),
            contract_settle_delay: Duration::from_millis(5),
            gated_command_timeout: Duration::from_millis(1000),
            init_error_delay: Duration::from_millis(250),
            reset_recovery_delay: Duration::from_millis(1600),
            irq_retry_delay: Duration::from_millis(50),
            init_retry_max: 3,
            suspend_timeout: Duration::from_secs(3),
            suspend_poll_interval: Duration::from_millis(50),
            dead_battery_poll_limit: 10,
        }
    }
}

/// Board configuration of a single port
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortConfig {
    /// Bus address of the controller serving this port
    pub bus_address: u16,
    /// Zero-based connector number
    pub connector_number: u8,
    /// UCSI notifications enabled during initialization
    pub notification_enable: u32,
    /// Board sink current limit in mA
    pub sink_max_current_ma: u32,
    /// Minimum power required to run as a sink in mW
    pub sink_min_power_mw: u32,
    /// Board sink power limit in mW, requested on capability mismatch
    pub sink_max_power_mw: u32,
    /// Voltage used for the default sink contract in mV
    pub sink_voltage_mv: u32,
    /// Port is a closed case debug port, leave sink negotiation untouched
    pub ccd: bool,
    /// Firmware updates are not supported through this port
    pub no_fw_update: bool,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            bus_address: 0x20,
            connector_number: 0,
            notification_enable: 0x0001_FFFF,
            sink_max_current_ma: 3000,
            sink_min_power_mw: 15_000,
            sink_max_power_mw: 45_000,
            sink_voltage_mv: 5000,
            ccd: false,
            no_fw_update: false,
        }
    }
}
