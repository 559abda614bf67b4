//! Command dispatch and task results
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;
use embedded_services::{debug, info, warn};
use embedded_usb_pd::Error;
use pdc_interface::command::Command;
use pdc_interface::command::ucsi::{self, Opcode};
use pdc_interface::command::vendor::{self, DrpMode, GetVdo, VdoOrigin};
use pdc_interface::pdo::{Pdo, Rdo};
use pdc_interface::{CciEvent, ConnectorStatus};

use super::Worker;
use crate::bus::Bus;
use crate::encoder::{self, Block, RECONNECT_DELAY_S};
use crate::port::PortState;
use crate::registers::{
    AutonegotiateSink, EXT_VBUS_SWITCH_ENABLED_INPUT, IDENTITY_DATA_OBJECT_LEN, IDENTITY_RESPONSE_ACK,
    IdentityDataObject, MAX_REGISTER_LEN, PortConfiguration, PowerPathStatus, Register, Status, Task,
    VCONN_SWITCH_SOURCING,
};
use crate::timing::Gate;

/// Advertises GET_PD_MESSAGE in the optional features of GET_CAPABILITY
const GET_PD_MESSAGE_BYTE: usize = 6;
const GET_PD_MESSAGE_BIT: u8 = 1 << 0;

impl<'a, M: RawMutex, B: Bus, const N: usize> Worker<'a, M, B, N> {
    /// Start or finish the current request
    pub(super) async fn dispatch(&mut self) -> Result<(), Error<B::Error>> {
        let Some(command) = self.current.as_ref().map(|request| request.command.clone()) else {
            return Ok(());
        };

        match command {
            Command::Ucsi(command) => self.dispatch_ucsi(command).await,
            Command::Vendor(command) => self.dispatch_vendor(command).await,
        }
    }

    /// Write the optional `payload` and start `task`
    async fn start_task(&mut self, task: Task, payload: Option<&[u8]>) -> Result<(), Error<B::Error>> {
        if let Some(payload) = payload {
            self.write(Register::Data, payload).await?;
        }
        self.write(Register::Command, &task.code()).await?;
        self.task_deadline.start(Instant::now(), self.config.task_timeout);
        self.set_state(PortState::TaskWait);
        Ok(())
    }

    /// Complete the current request with `payload` as its response
    fn respond(&mut self, payload: &[u8]) {
        if let Some(output) = self.current.as_ref().and_then(|request| request.output) {
            output.write(payload);
        }
        self.complete(CciEvent::completed(payload.len() as u8), PortState::Idle);
    }

    fn respond_error(&mut self, not_supported: bool) {
        if let Some(output) = self.current.as_ref().and_then(|request| request.output) {
            output.clear();
        }
        let mut cci = CciEvent::failed();
        cci.set_not_supported(not_supported);
        self.complete(cci, PortState::Idle);
    }

    /// Keep the current request until `gate` opens
    fn defer(&mut self, gate: Gate) {
        self.timing.defer(gate, Instant::now());
    }

    async fn dispatch_ucsi(&mut self, command: ucsi::Command) -> Result<(), Error<B::Error>> {
        match command {
            // The controller has no UCSI data role command, the port control register carries the request
            ucsi::Command::SetUor(uor) => {
                self.modify_port_control(|control| {
                    control.set_initiate_swap_to_dfp(uor.swap_to_dfp);
                    control.set_initiate_swap_to_ufp(uor.swap_to_ufp);
                    control.set_process_swap_to_dfp(true);
                    control.set_process_swap_to_ufp(uor.accept_dr_swap);
                })
                .await?;
                self.respond(&[]);
                Ok(())
            }
            command => {
                let block = encoder::ucsi_block(&command, self.port.config().connector_number);
                self.start_task(Task::Ucsi, Some(&block)).await
            }
        }
    }

    async fn dispatch_vendor(&mut self, command: vendor::Command) -> Result<(), Error<B::Error>> {
        match command {
            vendor::Command::TriggerPdcReset => {
                warn!("Port{}: Resetting controller", self.id());
                self.write(Register::Command, &Task::Gaid.code()).await?;
                self.respond(&[]);
                self.manager.reload_all(true);
            }
            vendor::Command::GetIcStatus => {
                self.read_ic_status().await?;
                self.respond(&[]);
            }
            vendor::Command::GetRdo => return self.start_task(Task::Grdo, None).await,
            vendor::Command::SetRdo(rdo) => return self.set_rdo(rdo).await,
            vendor::Command::SetSinkPath(enable) => return self.set_sink_path(enable).await,
            vendor::Command::GetVbusVoltage => {
                let connector = self.port.config().connector_number;
                let block = encoder::ucsi_block(&ucsi::Command::GetConnectorStatus, connector);
                return self.start_task(Task::Ucsi, Some(&block)).await;
            }
            vendor::Command::SetTypecCurrent(current) => {
                self.modify_port_control(|control| control.set_typec_current(current as u8))
                    .await?;
                self.respond(&[]);
            }
            vendor::Command::SetFrs(enable) => {
                self.modify_port_control(|control| control.set_fr_swap_enabled(enable))
                    .await?;
                self.respond(&[]);
            }
            vendor::Command::UpdateRetimer(enable) => {
                self.modify_port_control(|control| control.set_retimer_fw_update(enable))
                    .await?;
                self.respond(&[]);
            }
            vendor::Command::SetDrpMode(DrpMode::TrySnk) => {
                info!("Port{}: Try.SNK not supported", self.id());
                self.respond_error(true);
            }
            vendor::Command::SetDrpMode(mode) => {
                self.modify_port_configuration(|configuration| configuration.set_typec_support_options(mode as u8))
                    .await?;
                self.respond(&[]);
            }
            vendor::Command::GetDrpMode => {
                let configuration = PortConfiguration(self.read_u32(Register::PortConfiguration).await?);
                self.port.set_port_configuration(configuration);
                self.respond(&[configuration.typec_support_options()]);
            }
            vendor::Command::SetApPowerState(state) => {
                self.write(Register::SxAppConfig, &[state as u8]).await?;
                self.respond(&[]);
            }
            vendor::Command::GetCurrentPdo => {
                let pdo: [u8; 4] = self.read_array(Register::ActivePdo).await?;
                self.respond(&pdo);
            }
            vendor::Command::IsVconnSourcing => {
                let status = PowerPathStatus(self.read_u32(Register::PowerPathStatus).await?);
                self.respond(&[u8::from(status.vconn_sw() & VCONN_SWITCH_SOURCING != 0)]);
            }
            vendor::Command::GetPchDataStatus => {
                let status: [u8; 5] = self.read_array(Register::DataStatus).await?;
                self.respond(&status);
            }
            vendor::Command::GetSbuMuxMode => {
                let status = Status(self.read_u32(Register::Status).await?);
                self.respond(&[status.sbu_mux_mode()]);
            }
            vendor::Command::SetSbuMuxMode(mode) => return self.start_task(Task::Sbud, Some(&[mode as u8])).await,
            vendor::Command::Reconnect => return self.start_task(Task::Disc, Some(&[RECONNECT_DELAY_S])).await,
            vendor::Command::GetVdo(params) => return self.get_vdo(params).await,
            vendor::Command::GetIdentityDiscovery(origin) => {
                let Some(identity) = self.read_identity(origin).await? else {
                    self.respond_error(true);
                    return Ok(());
                };
                self.respond(&[u8::from(identity.response_type() == IDENTITY_RESPONSE_ACK)]);
            }
        }

        Ok(())
    }

    /// Received identity for `origin`, `None` if the controller does not report it
    async fn read_identity(&mut self, origin: VdoOrigin) -> Result<Option<IdentityDataObject>, Error<B::Error>> {
        let reg = match origin {
            VdoOrigin::Sop => Register::RxIdentitySop,
            VdoOrigin::SopPrime => Register::RxIdentitySopPrime,
            VdoOrigin::Tx => return Ok(None),
        };

        let raw: [u8; IDENTITY_DATA_OBJECT_LEN] = self.read_array(reg).await?;
        Ok(Some(IdentityDataObject(raw)))
    }

    async fn get_vdo(&mut self, params: GetVdo) -> Result<(), Error<B::Error>> {
        let Some(identity) = self.read_identity(params.origin).await? else {
            self.respond_error(true);
            return Ok(());
        };

        let mut payload = Block::new();
        for kind in &params.kinds {
            // Cannot overflow, at most eight VDOs of four bytes
            let _ = payload.extend_from_slice(&identity.vdo(kind.index()).to_le_bytes());
        }
        self.respond(&payload);
        Ok(())
    }

    async fn set_rdo(&mut self, rdo: Rdo) -> Result<(), Error<B::Error>> {
        if !self.timing.is_open(Gate::SetRdo) {
            self.defer(Gate::SetRdo);
            return Ok(());
        }

        let pdo = usize::from(rdo.object_position())
            .checked_sub(1)
            .and_then(|index| self.pdos.get(index))
            .copied()
            .filter(|pdo| *pdo != 0);
        let Some(pdo) = pdo else {
            warn!("Port{}: No partner PDO at position {}", self.id(), rdo.object_position());
            self.respond_error(false);
            return Ok(());
        };

        let current = AutonegotiateSink::from_bytes(self.read_array(Register::AutonegotiateSink).await?);
        match encoder::autoneg_for_pdo(current, Pdo::from(pdo), self.port.config()) {
            Ok(Some(sink)) => {
                self.write(Register::AutonegotiateSink, &sink.to_bytes()).await?;
                self.start_task(Task::Aneg, None).await
            }
            Ok(None) => {
                debug!("Port{}: Sink settings unchanged", self.id());
                self.respond(&[]);
                Ok(())
            }
            Err(_) => {
                warn!("Port{}: Unsupported PDO {:#x}", self.id(), pdo);
                self.respond_error(false);
                Ok(())
            }
        }
    }

    async fn set_sink_path(&mut self, enable: bool) -> Result<(), Error<B::Error>> {
        let status = PowerPathStatus(self.read_u32(Register::PowerPathStatus).await?);
        let enabled = status.ext_vbus_sw() == EXT_VBUS_SWITCH_ENABLED_INPUT;

        match (enable, enabled) {
            (true, false) => {
                if !self.timing.is_open(Gate::SinkEnable) {
                    self.defer(Gate::SinkEnable);
                    return Ok(());
                }
                let select = encoder::sink_switch_select(self.port.config().connector_number);
                self.start_task(Task::Srdy, Some(&[select])).await
            }
            (false, true) => self.start_task(Task::Sryr, None).await,
            _ => {
                debug!("Port{}: Sink path already {}", self.id(), enable);
                self.respond(&[]);
                Ok(())
            }
        }
    }

    /// Side effects and response payload of a successfully finished task
    pub(super) async fn task_result(&mut self, command: &Command, data: &[u8; MAX_REGISTER_LEN]) -> Block {
        let mut payload = Block::new();
        let result = data.get(1..).unwrap_or(&[]);

        match command {
            Command::Ucsi(ucsi::Command::SetNotificationEnable(_)) => {
                info!("Port{}: Initialization done", self.id());
                self.port.set_init_done(true);
                self.init_attempt = 0;
                // Pick up anything that happened while initializing
                self.irq_pending = true;
            }
            Command::Ucsi(command) if command.opcode() == Opcode::GetConnectorStatus as u8 => {
                let status = self.port.merge_connector_status(ConnectorStatus::from_bytes(result));
                if !status.is_connected() && !self.port.config().ccd && self.reset_autoneg().await.is_err() {
                    warn!("Port{}: Failed to reset sink settings", self.id());
                }
                let _ = payload.extend_from_slice(&status.0);
            }
            Command::Ucsi(command) => {
                if let Some(layout) = encoder::ucsi_payload(command, data)
                    && let Some(bytes) = data.get(layout.offset..layout.offset + layout.len)
                {
                    let _ = payload.extend_from_slice(bytes);
                }

                if command.opcode() == Opcode::GetCapability as u8 {
                    // The controller leaves this clear, hosts need it to request discovery data
                    if let Some(byte) = payload.get_mut(GET_PD_MESSAGE_BYTE) {
                        *byte |= GET_PD_MESSAGE_BIT;
                    }
                }

                if let Some(params) = encoder::get_pdos_params(command)
                    && params.partner
                    && params.source
                {
                    for (i, pdo) in payload.chunks_exact(4).enumerate() {
                        if let (Some(slot), Ok(bytes)) =
                            (self.pdos.get_mut(usize::from(params.offset) + i), <[u8; 4]>::try_from(pdo))
                        {
                            *slot = u32::from_le_bytes(bytes);
                        }
                    }
                }
            }
            Command::Vendor(vendor::Command::GetVbusVoltage) => {
                let voltage_mv = ConnectorStatus::from_bytes(result).vbus_voltage_mv();
                let _ = payload.extend_from_slice(&u16::try_from(voltage_mv).unwrap_or(u16::MAX).to_le_bytes());
            }
            Command::Vendor(vendor::Command::GetRdo) => {
                let _ = payload.extend_from_slice(result.get(..4).unwrap_or(&[]));
            }
            Command::Vendor(vendor::Command::SetRdo(_)) => self.timing.on_rdo_applied(),
            Command::Vendor(_) => {}
        }

        payload
    }
}
