//! Controller identity information

/// Maximum length of the project name
pub const PROJECT_NAME_LEN: usize = 12;

/// Controller information read during initialization
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PdcInfo {
    /// Firmware version
    pub fw_version: u32,
    /// USB PD specification version and revision
    pub pd_version: u16,
    pub pd_revision: u16,
    pub vid: u16,
    pub pid: u16,
    /// NUL padded ASCII project name
    pub project_name: [u8; PROJECT_NAME_LEN],
    /// The controller is running application firmware from flash
    pub is_running_flash_code: bool,
    /// Flash bank the firmware is running from
    pub running_in_flash_bank: u8,
    /// Firmware updates are not supported on this port
    pub no_fw_update: bool,
}

impl PdcInfo {
    /// Project name up to the first NUL, empty if not valid UTF-8
    pub fn project_name(&self) -> &str {
        self.project_name
            .split(|b| *b == 0)
            .next()
            .and_then(|name| core::str::from_utf8(name).ok())
            .unwrap_or("")
    }

    /// Set the project name, truncating to [`PROJECT_NAME_LEN`]
    pub fn set_project_name(&mut self, name: &[u8]) {
        self.project_name = [0; PROJECT_NAME_LEN];
        for (dst, src) in self.project_name.iter_mut().zip(name) {
            *dst = *src;
        }
    }
}
