//! Translation of commands into controller register contents
//!
//! Everything here is pure; the worker owns the bus and decides when these blocks are written.
use core::fmt::Write;

use embedded_usb_pd::PdError;
use heapless::{String, Vec};
use pdc_interface::command::ucsi::{self, Ccom, GetPdos, Opcode, ResetType};
use pdc_interface::info::PROJECT_NAME_LEN;
use pdc_interface::pdo::Pdo;

use crate::config::PortConfig;
use crate::registers::{AutonegotiateSink, MAX_REGISTER_LEN};

/// Bytes preceding the variable part of a UCSI parameter block
pub const UCSI_HEADER_LEN: usize = 8;

/// Offset of the PDOs in a SET_PDOS block
const SET_PDOS_OFFSET: usize = 8;

/// Switch selector for the sink path of connector 0
pub const SWITCH_SELECT_PP_EXT2: u8 = 3;
/// Switch selector for the sink path of any other connector
pub const SWITCH_SELECT_PP_EXT1: u8 = 2;

/// Reconnect delay passed to the disconnect task, in seconds
pub const RECONNECT_DELAY_S: u8 = 3;

/// Prefix of customer-use text that carries a project name
const PROJECT_NAME_PREFIX: &[u8] = b"GOOG";

/// A parameter block written to the data register before a task
pub type Block = Vec<u8, MAX_REGISTER_LEN>;

fn put(block: &mut [u8], offset: usize, bytes: &[u8]) {
    for (dst, src) in block.iter_mut().skip(offset).zip(bytes) {
        *dst = *src;
    }
}

/// Build the UCSI parameter block for `command` on the zero-based `connector`
pub fn ucsi_block(command: &ucsi::Command, connector: u8) -> Block {
    if let ucsi::Command::Raw(data) = command {
        let mut block = Block::new();
        // Raw blocks are bounded well below the data register size
        let _ = block.extend_from_slice(data);
        return block;
    }

    let mut raw = [0u8; MAX_REGISTER_LEN];
    raw[0] = command.opcode();
    raw[2] = connector.wrapping_add(1) & 0x7F;

    match command {
        ucsi::Command::ConnectorReset(ResetType::Hard) => raw[2] |= 0x80,
        ucsi::Command::GetPdos(params) => {
            if params.partner {
                raw[2] |= 0x80;
            }
            raw[3] = params.offset;
            raw[4] = (params.count.saturating_sub(1) & 0x3) | (u8::from(params.source) << 2);
        }
        ucsi::Command::SetCcom(ccom) => match ccom {
            Ccom::Rp => raw[2] |= 0x80,
            Ccom::Rd => raw[3] = 1,
            Ccom::Drp => raw[3] = 2,
        },
        ucsi::Command::SetUor(uor) => {
            raw[2] |= u8::from(uor.swap_to_dfp) << 7;
            raw[3] = u8::from(uor.swap_to_ufp) | (u8::from(uor.accept_dr_swap) << 1);
        }
        ucsi::Command::SetPdr(pdr) => {
            raw[2] |= u8::from(pdr.swap_to_src) << 7;
            raw[3] = u8::from(pdr.swap_to_snk) | (u8::from(pdr.accept_pr_swap) << 1);
        }
        ucsi::Command::SetPdos(params) => {
            let count = params.pdos.len() as u8;
            // Single chunk: data index 0, end of message set
            raw[4] = (count & 0x7) | (u8::from(params.source) << 3) | (1 << 4);
            for (i, pdo) in params.pdos.iter().enumerate() {
                put(&mut raw, SET_PDOS_OFFSET + i * 4, &pdo.to_le_bytes());
            }
            raw[1] = count * 4;
        }
        ucsi::Command::SetRetimerMode(mode) => put(&mut raw, 3, &mode.to_le_bytes()),
        ucsi::Command::SetNotificationEnable(mask) => put(&mut raw, 2, &mask.to_le_bytes()),
        _ => {}
    }

    let len = (UCSI_HEADER_LEN + usize::from(raw[1])).min(MAX_REGISTER_LEN);
    let mut block = Block::new();
    let _ = block.extend_from_slice(raw.get(..len).unwrap_or(&[]));
    block
}

/// Location of a UCSI result payload in the data register
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PayloadLayout {
    pub offset: usize,
    pub len: usize,
}

/// Where the payload of a completed UCSI command sits in `data`, `None` for commands without one
///
/// Raw blocks use the layout of their opcode. Raw opcodes without a known layout report their payload
/// length in `data[1]`.
pub fn ucsi_payload(command: &ucsi::Command, data: &[u8]) -> Option<PayloadLayout> {
    let reported = || usize::from(data.get(1).copied().unwrap_or(0));
    let layout = match Opcode::try_from(command.opcode()) {
        Ok(Opcode::GetCapability) => PayloadLayout { offset: 1, len: 16 },
        Ok(Opcode::GetConnectorCapability) => PayloadLayout { offset: 1, len: 8 },
        Ok(Opcode::GetConnectorStatus) => PayloadLayout {
            offset: 1,
            len: pdc_interface::connector_status::CONNECTOR_STATUS_LEN,
        },
        Ok(Opcode::GetCableProperty) => PayloadLayout { offset: 1, len: 5 },
        Ok(Opcode::ReadPowerLevel) => PayloadLayout { offset: 1, len: 4 },
        Ok(Opcode::GetErrorStatus | Opcode::GetPdos) => PayloadLayout {
            offset: 2,
            len: reported(),
        },
        _ if matches!(command, ucsi::Command::Raw(_)) => PayloadLayout {
            offset: 2,
            len: reported(),
        },
        _ => return None,
    };

    let available = data.len().saturating_sub(layout.offset);
    Some(PayloadLayout {
        offset: layout.offset,
        len: layout.len.min(available),
    })
}

/// GET_PDOS parameters of `command`, decoded from the block for raw commands
pub fn get_pdos_params(command: &ucsi::Command) -> Option<GetPdos> {
    match command {
        ucsi::Command::GetPdos(params) => Some(*params),
        ucsi::Command::Raw(data) if command.opcode() == Opcode::GetPdos as u8 => {
            let byte = |index: usize| data.get(index).copied().unwrap_or(0);
            Some(GetPdos {
                partner: byte(2) & 0x80 != 0,
                offset: byte(3),
                count: (byte(4) & 0x3) + 1,
                source: byte(4) & 0x4 != 0,
            })
        }
        _ => None,
    }
}

/// Sink negotiation settings for the board defaults
pub fn default_autoneg(config: &PortConfig) -> AutonegotiateSink {
    let mut sink = AutonegotiateSink::default();
    sink.set_max_current((config.sink_max_current_ma / 10) as u16);
    sink.set_min_required_power((config.sink_min_power_mw / 250) as u16);
    sink.set_max_voltage((config.sink_voltage_mv / 50) as u16);
    sink.set_min_voltage((config.sink_voltage_mv / 50) as u16);
    sink
}

/// Sink negotiation settings that make the controller request `pdo`
///
/// Returns `None` when `current` already holds exactly these settings and no write is needed.
pub fn autoneg_for_pdo(
    current: AutonegotiateSink,
    pdo: Pdo,
    config: &PortConfig,
) -> Result<Option<AutonegotiateSink>, PdError> {
    let (max_voltage, min_voltage, max_current, min_power) = match pdo {
        Pdo::Fixed(fixed) => {
            let voltage = fixed.voltage();
            let current_ma = config.sink_max_current_ma.min(u32::from(fixed.max_current()) * 10);
            let current = (current_ma / 10) as u16;
            let power = (u32::from(voltage) * u32::from(current) / 500) as u16;
            (voltage, voltage, current, power)
        }
        Pdo::Battery(battery) => (
            battery.max_voltage(),
            battery.min_voltage(),
            (config.sink_max_current_ma / 10) as u16,
            battery.max_power(),
        ),
        _ => return Err(PdError::InvalidParams),
    };
    let mismatch = (config.sink_max_power_mw / 250) as u16;

    let unchanged = !current.auto_compute_sink_min_power()
        && !current.auto_compute_sink_min_voltage()
        && !current.auto_compute_sink_max_voltage()
        && current.max_current() == max_current
        && current.min_required_power() == min_power
        && current.max_voltage() == max_voltage
        && current.min_voltage() == min_voltage
        && current.capabilities_mismatch_power() == mismatch;
    if unchanged {
        return Ok(None);
    }

    let mut sink = current;
    sink.set_auto_compute_sink_min_power(false);
    sink.set_auto_compute_sink_min_voltage(false);
    sink.set_auto_compute_sink_max_voltage(false);
    sink.set_max_current(max_current);
    sink.set_min_required_power(min_power);
    sink.set_max_voltage(max_voltage);
    sink.set_min_voltage(min_voltage);
    sink.set_capabilities_mismatch_power(mismatch);
    Ok(Some(sink))
}

/// Sink path switch selector for the zero-based `connector`
pub fn sink_switch_select(connector: u8) -> u8 {
    if connector == 0 {
        SWITCH_SELECT_PP_EXT2
    } else {
        SWITCH_SELECT_PP_EXT1
    }
}

/// Project name from the customer use register
///
/// Older firmware stores a configuration number in the first byte instead, reported as `TI<n>`.
pub fn project_name(customer_use: &[u8]) -> String<PROJECT_NAME_LEN> {
    let mut name = String::new();
    if customer_use.starts_with(PROJECT_NAME_PREFIX) {
        for c in customer_use
            .iter()
            .take(PROJECT_NAME_LEN)
            .take_while(|c| **c != 0)
            .map(|c| char::from(*c))
        {
            if name.push(c).is_err() {
                break;
            }
        }
    } else {
        // Cannot overflow: "TI" plus at most three digits
        let _ = write!(name, "TI{}", customer_use.first().copied().unwrap_or(0));
    }
    name
}

#[cfg(test)]
mod tests {
    use pdc_interface::command::ucsi::{SetPdos, Uor};
    use pdc_interface::pdo::Pdo;

    use super::*;

    #[test]
    fn connector_number_is_one_based() {
        let block = ucsi_block(&ucsi::Command::GetConnectorStatus, 1);
        assert_eq!(block.len(), UCSI_HEADER_LEN);
        assert_eq!(&block[..3], &[0x12, 0, 2]);

        let block = ucsi_block(&ucsi::Command::ConnectorReset(ResetType::Hard), 0);
        assert_eq!(block[2], 0x81);
    }

    #[test]
    fn get_pdos_packing() {
        let block = ucsi_block(
            &ucsi::Command::GetPdos(GetPdos {
                partner: true,
                offset: 2,
                count: 3,
                source: true,
            }),
            0,
        );
        assert_eq!(&block[..5], &[0x10, 0, 0x81, 2, 0x2 | 0x4]);
    }

    #[test]
    fn ccom_and_role_packing() {
        assert_eq!(ucsi_block(&ucsi::Command::SetCcom(Ccom::Rp), 0)[2], 0x81);
        assert_eq!(ucsi_block(&ucsi::Command::SetCcom(Ccom::Rd), 0)[3], 1);
        assert_eq!(ucsi_block(&ucsi::Command::SetCcom(Ccom::Drp), 0)[3], 2);

        let block = ucsi_block(
            &ucsi::Command::SetUor(Uor {
                swap_to_dfp: true,
                swap_to_ufp: false,
                accept_dr_swap: true,
            }),
            0,
        );
        assert_eq!(&block[2..4], &[0x81, 0x2]);
    }

    #[test]
    fn set_pdos_packing() {
        let pdos = Vec::from_slice(&[0x0001_912C, 0x0002_D12C]).unwrap();
        let block = ucsi_block(&ucsi::Command::SetPdos(SetPdos { source: true, pdos }), 0);
        assert_eq!(block.len(), UCSI_HEADER_LEN + 8);
        assert_eq!(block[1], 8);
        assert_eq!(block[4], 2 | (1 << 3) | (1 << 4));
        assert_eq!(&block[8..12], &0x0001_912Cu32.to_le_bytes());
        assert_eq!(&block[12..16], &0x0002_D12Cu32.to_le_bytes());
    }

    #[test]
    fn notification_mask_packing() {
        let block = ucsi_block(&ucsi::Command::SetNotificationEnable(0x0001_FFFF), 0);
        assert_eq!(&block[2..6], &0x0001_FFFFu32.to_le_bytes());
        // The mask overwrites the connector byte
        assert_eq!(block[0], 0x05);
    }

    #[test]
    fn raw_block_is_sent_unchanged() {
        let raw = Vec::from_slice(&[0x06, 0x00, 0x7F]).unwrap();
        let block = ucsi_block(&ucsi::Command::Raw(raw), 3);
        assert_eq!(&block[..], &[0x06, 0x00, 0x7F]);
    }

    #[test]
    fn payload_layouts() {
        let mut data = [0u8; MAX_REGISTER_LEN];
        data[1] = 8;
        let get_pdos = ucsi::Command::GetPdos(GetPdos {
            partner: true,
            offset: 0,
            count: 2,
            source: true,
        });
        assert_eq!(
            ucsi_payload(&get_pdos, &data),
            Some(PayloadLayout { offset: 2, len: 8 })
        );
        assert_eq!(
            ucsi_payload(&ucsi::Command::GetConnectorStatus, &data),
            Some(PayloadLayout { offset: 1, len: 19 })
        );
        assert_eq!(ucsi_payload(&ucsi::Command::PpmReset, &data), None);

        // Reported lengths never run past the register
        data[1] = 0xFF;
        assert_eq!(
            ucsi_payload(&ucsi::Command::GetErrorStatus, &data),
            Some(PayloadLayout {
                offset: 2,
                len: MAX_REGISTER_LEN - 2
            })
        );
    }

    #[test]
    fn raw_payload_layouts() {
        let mut data = [0u8; MAX_REGISTER_LEN];
        data[1] = 6;

        let raw = |bytes: &[u8]| ucsi::Command::Raw(Vec::from_slice(bytes).unwrap());
        assert_eq!(
            ucsi_payload(&raw(&[0x12, 0x00, 0x01]), &data),
            Some(PayloadLayout { offset: 1, len: 19 })
        );
        assert_eq!(
            ucsi_payload(&raw(&[0x06, 0x00]), &data),
            Some(PayloadLayout { offset: 1, len: 16 })
        );
        // GET_PD_MESSAGE has no typed command
        assert_eq!(
            ucsi_payload(&raw(&[0x15, 0x00, 0x01]), &data),
            Some(PayloadLayout { offset: 2, len: 6 })
        );
    }

    #[test]
    fn get_pdos_params_from_raw_block() {
        let typed = GetPdos {
            partner: true,
            offset: 2,
            count: 3,
            source: true,
        };
        let block = ucsi_block(&ucsi::Command::GetPdos(typed), 0);
        let raw = ucsi::Command::Raw(Vec::from_slice(&block[..5]).unwrap());
        assert_eq!(get_pdos_params(&raw), Some(typed));
        assert_eq!(get_pdos_params(&ucsi::Command::GetPdos(typed)), Some(typed));
        assert_eq!(get_pdos_params(&ucsi::Command::GetConnectorStatus), None);
    }

    #[test]
    fn board_default_autoneg() {
        let sink = default_autoneg(&PortConfig::default());
        assert_eq!(sink.max_current(), 300);
        assert_eq!(sink.min_required_power(), 60);
        assert_eq!(sink.max_voltage(), 100);
        assert_eq!(sink.min_voltage(), 100);
    }

    #[test]
    fn autoneg_for_fixed_pdo() {
        let config = PortConfig::default();
        // 20 V, 5 A
        let fixed = (400 << 10) | 500;

        let sink = autoneg_for_pdo(default_autoneg(&config), Pdo::from(fixed), &config)
            .unwrap()
            .unwrap();
        assert_eq!(sink.max_voltage(), 400);
        assert_eq!(sink.min_voltage(), 400);
        // Limited by the board's 3 A
        assert_eq!(sink.max_current(), 300);
        // 60 W in 250 mW units
        assert_eq!(sink.min_required_power(), 240);
        assert_eq!(sink.capabilities_mismatch_power(), 180);

        // Applying the same PDO again needs no write
        assert!(matches!(autoneg_for_pdo(sink, Pdo::from(fixed), &config), Ok(None)));
    }

    #[test]
    fn autoneg_for_battery_pdo() {
        let config = PortConfig::default();
        // 5 V to 20 V, 45 W
        let raw = (1 << 30) | (400 << 20) | (100 << 10) | 180;

        let sink = autoneg_for_pdo(AutonegotiateSink::default(), Pdo::from(raw), &config)
            .unwrap()
            .unwrap();
        assert_eq!(sink.max_voltage(), 400);
        assert_eq!(sink.min_voltage(), 100);
        assert_eq!(sink.max_current(), 300);
        assert_eq!(sink.min_required_power(), 180);
    }

    #[test]
    fn autoneg_rejects_augmented_pdo() {
        let config = PortConfig::default();
        assert!(matches!(
            autoneg_for_pdo(AutonegotiateSink::default(), Pdo::from(0xC000_0000), &config),
            Err(PdError::InvalidParams)
        ));
    }

    #[test]
    fn project_names() {
        assert_eq!(project_name(b"GOOGRZSS").as_str(), "GOOGRZSS");
        assert_eq!(project_name(b"GOOG\0\0\0\0").as_str(), "GOOG");
        assert_eq!(project_name(&[7, 0, 0, 0, 0, 0, 0, 0]).as_str(), "TI7");
        assert_eq!(project_name(&[0xFF; 8]).as_str(), "TI255");
    }

    #[test]
    fn switch_selection() {
        assert_eq!(sink_switch_select(0), SWITCH_SELECT_PP_EXT2);
        assert_eq!(sink_switch_select(1), SWITCH_SELECT_PP_EXT1);
    }
}
