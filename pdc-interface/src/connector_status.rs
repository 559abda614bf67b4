//! Connector status as reported by the controller
//!
//! Layout of the status payload:
//!
//! | Bytes  | Content                                                                 |
//! |--------|-------------------------------------------------------------------------|
//! | 0..2   | Change bits, little endian ([`ConnectorStatusChange`])                  |
//! | 2      | bits 0-2 power operation mode, bit 3 connected, bit 4 power direction   |
//! | 3      | Partner flags                                                           |
//! | 4      | bits 0-2 partner type                                                   |
//! | 5..9   | Negotiated RDO, little endian                                           |
//! | 9      | bits 0-1 battery charging status, bits 4-7 voltage scale (5 mV units)    |
//! | 10..12 | Voltage reading, little endian                                          |
//! | 12..19 | Reserved                                                                |
use bitflags::bitflags;

/// Length of the connector status payload
pub const CONNECTOR_STATUS_LEN: usize = 19;

bitflags! {
    /// Connector status change bits
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct ConnectorStatusChange: u16 {
        const EXTERNAL_SUPPLY = 1 << 1;
        const POWER_OPERATION_MODE = 1 << 2;
        const ATTENTION = 1 << 3;
        const PROVIDER_CAPABILITIES = 1 << 5;
        const NEGOTIATED_POWER_LEVEL = 1 << 6;
        const PD_RESET_COMPLETE = 1 << 7;
        const SUPPORTED_CAM = 1 << 8;
        const BATTERY_CHARGING_STATUS = 1 << 9;
        const CONNECTOR_PARTNER = 1 << 11;
        const POWER_DIRECTION = 1 << 12;
        const SINK_PATH = 1 << 13;
        const CONNECT = 1 << 14;
        const ERROR = 1 << 15;
    }
}

/// Raw connector status payload with typed accessors
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectorStatus(pub [u8; CONNECTOR_STATUS_LEN]);

impl ConnectorStatus {
    /// Build from a payload, missing bytes are zero
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut raw = [0u8; CONNECTOR_STATUS_LEN];
        for (dst, src) in raw.iter_mut().zip(bytes) {
            *dst = *src;
        }
        Self(raw)
    }

    /// Change bits, including bits unknown to [`ConnectorStatusChange`]
    pub fn change(&self) -> ConnectorStatusChange {
        ConnectorStatusChange::from_bits_retain(u16::from_le_bytes([self.0[0], self.0[1]]))
    }

    pub fn set_change(&mut self, change: ConnectorStatusChange) {
        let [lo, hi] = change.bits().to_le_bytes();
        self.0[0] = lo;
        self.0[1] = hi;
    }

    pub fn power_operation_mode(&self) -> u8 {
        self.0[2] & 0x7
    }

    pub fn is_connected(&self) -> bool {
        self.0[2] & (1 << 3) != 0
    }

    /// True when the port is acting as a power provider
    pub fn is_provider(&self) -> bool {
        self.0[2] & (1 << 4) != 0
    }

    pub fn partner_flags(&self) -> u8 {
        self.0[3]
    }

    pub fn partner_type(&self) -> u8 {
        self.0[4] & 0x7
    }

    /// Negotiated request data object
    pub fn rdo(&self) -> u32 {
        u32::from_le_bytes([self.0[5], self.0[6], self.0[7], self.0[8]])
    }

    pub fn battery_charging_status(&self) -> u8 {
        self.0[9] & 0x3
    }

    /// Voltage scale in 5 mV units
    pub fn voltage_scale(&self) -> u8 {
        self.0[9] >> 4
    }

    pub fn voltage_reading(&self) -> u16 {
        u16::from_le_bytes([self.0[10], self.0[11]])
    }

    /// VBUS voltage in mV
    pub fn vbus_voltage_mv(&self) -> u32 {
        u32::from(self.voltage_reading()) * u32::from(self.voltage_scale()) * 5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConnectorStatus {
        let mut bytes = [0u8; CONNECTOR_STATUS_LEN];
        // Connect change, connected sink
        bytes[0] = 0x00;
        bytes[1] = 0x40;
        bytes[2] = 0x0B;
        bytes[4] = 0x2;
        bytes[5..9].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        // Scale of 4 * 5 mV, reading of 1000 gives 20 V
        bytes[9] = 0x40;
        bytes[10..12].copy_from_slice(&1000u16.to_le_bytes());
        ConnectorStatus(bytes)
    }

    #[test]
    fn decode_fields() {
        let status = sample();
        assert_eq!(status.change(), ConnectorStatusChange::CONNECT);
        assert!(status.is_connected());
        assert!(!status.is_provider());
        assert_eq!(status.power_operation_mode(), 3);
        assert_eq!(status.partner_type(), 2);
        assert_eq!(status.rdo(), 0x1234_5678);
        assert_eq!(status.vbus_voltage_mv(), 20_000);
    }

    #[test]
    fn change_bits_round_trip_unknown_bits() {
        let mut status = sample();
        let change = ConnectorStatusChange::from_bits_retain(0x0011) | ConnectorStatusChange::ERROR;
        status.set_change(change);
        assert_eq!(status.change().bits(), 0x8011);
        assert!(status.is_connected());
    }

    #[test]
    fn short_payload_is_zero_padded() {
        let status = ConnectorStatus::from_bytes(&[0x02, 0x00, 0x08]);
        assert_eq!(status.change(), ConnectorStatusChange::EXTERNAL_SUPPLY);
        assert!(status.is_connected());
        assert_eq!(status.rdo(), 0);
    }
}
