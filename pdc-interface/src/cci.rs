//! Command status and connector change indication
use bitfield::bitfield;

bitfield! {
    /// Notification delivered for every completed command and every unsolicited connector event
    ///
    /// Bit layout follows the UCSI CCI register so the raw value can be forwarded to a host unchanged.
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct CciEvent(u32);
    impl Debug;
    pub end_of_message, set_end_of_message: 0;
    /// Connector number (1-based) that reported a change, zero if none
    pub u8, connector_change, set_connector_change: 7, 1;
    pub u8, data_len, set_data_len: 15, 8;
    pub vendor_defined_indicator, set_vendor_defined_indicator: 16;
    pub security_request, set_security_request: 23;
    pub fw_update_request, set_fw_update_request: 24;
    pub not_supported, set_not_supported: 25;
    pub cancel_completed, set_cancel_completed: 26;
    pub reset_completed, set_reset_completed: 27;
    pub busy, set_busy: 28;
    pub ack_command, set_ack_command: 29;
    pub error, set_error: 30;
    pub command_completed, set_command_completed: 31;
}

impl CciEvent {
    /// Successful completion carrying `data_len` bytes of response
    pub fn completed(data_len: u8) -> Self {
        let mut cci = Self::default();
        cci.set_command_completed(true);
        cci.set_data_len(data_len);
        cci
    }

    /// Failed completion
    pub fn failed() -> Self {
        let mut cci = Self::default();
        cci.set_command_completed(true);
        cci.set_error(true);
        cci
    }

    /// Raw register value
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Returns true if this event reports a connector change rather than a command completion
    pub fn has_connector_change(&self) -> bool {
        self.connector_change() != 0
    }
}
