//! Port worker: the state machine that owns a port's bus
//!
//! Each call to [`Worker::process`] waits for the next wake condition (a posted [`PortEvent`] or one of
//! the worker's deadlines), handles it and runs the current state once. States re-run themselves by
//! posting [`PortEvent::INTERNAL`], so a worker never blocks in a state except for single bus
//! transactions and the bounded dead battery poll during initialization.
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant, Timer};
use embedded_services::{debug, error, info, trace, warn};
use embedded_usb_pd::{Error, PdError};
use pdc_interface::command::ucsi;
use pdc_interface::pdo::MAX_PDOS;
use pdc_interface::{CciEvent, PdcInfo, Request};

use crate::bus::Bus;
use crate::config::Config;
use crate::encoder;
use crate::manager::PdcManager;
use crate::port::{Port, PortEvent, PortState};
use crate::registers::{
    BootFlags, Interrupt, MAX_REGISTER_LEN, MODE_APP, PortConfiguration, PortControl, Register, Task, TxIdentity,
    UNKNOWN_COMMAND,
};
use crate::timing::{ContractTiming, Deadline, Outcome, earliest};

mod dispatch;

/// Drives a single port
pub struct Worker<'a, M: RawMutex, B: Bus, const N: usize> {
    manager: &'a PdcManager<'a, M, N>,
    port: &'a Port<'a, M>,
    bus: B,
    config: Config,
    init_attempt: u8,
    /// Request owned by the worker, from pickup until its completion is delivered
    current: Option<Request<'a>>,
    /// An interrupt arrived outside of idle and still has to be read
    irq_pending: bool,
    /// Partner source PDOs from the last GET_PDOS
    pdos: [u32; MAX_PDOS],
    timing: ContractTiming,
    /// Re-runs the current state, used for delayed transitions and interrupt retries
    delayed_post: Deadline,
    /// Next poll of a running task
    data_ready: Deadline,
    task_deadline: Deadline,
}

impl<'a, M: RawMutex, B: Bus, const N: usize> Worker<'a, M, B, N> {
    pub(crate) fn new(manager: &'a PdcManager<'a, M, N>, port: &'a Port<'a, M>, bus: B) -> Self {
        let config = *manager.config();
        let mut worker = Self {
            manager,
            port,
            bus,
            config,
            init_attempt: 0,
            current: None,
            irq_pending: false,
            pdos: [0; MAX_PDOS],
            timing: ContractTiming::new(config.contract_settle_delay, config.gated_command_timeout),
            delayed_post: Deadline::new(),
            data_ready: Deadline::new(),
            task_deadline: Deadline::new(),
        };
        worker.set_state(PortState::Init);
        worker
    }

    fn id(&self) -> u8 {
        self.port.id().0
    }

    pub fn state(&self) -> PortState {
        self.port.state()
    }

    /// Wait for the next event and process it
    pub async fn process(&mut self) {
        let events = self.wait_events().await;
        if self.handle_events(events).await {
            self.run_state().await;
        }
    }

    async fn wait_events(&self) -> PortEvent {
        let mask = if self.state() == PortState::Idle {
            PortEvent::all()
        } else {
            PortEvent::OUTSIDE_IDLE
        };

        let wait = self.port.events.wait_any(mask.bits());
        let deadline = earliest(
            earliest(self.delayed_post.expiry(), self.data_ready.expiry()),
            self.timing.next_deadline(),
        );

        let pending = match deadline {
            Some(deadline) => match select(wait, Timer::at(deadline)).await {
                Either::First(pending) => pending,
                Either::Second(()) => 0,
            },
            None => wait.await,
        };

        PortEvent::from_bits_truncate(pending)
    }

    /// Returns true if the current state has to run
    async fn handle_events(&mut self, events: PortEvent) -> bool {
        trace!("Port{}: Events {:#x}", self.id(), events.bits());
        self.port
            .events
            .clear((PortEvent::INTERNAL | PortEvent::SUSPEND_REQUEST).bits());

        let now = Instant::now();
        let mut run = events.intersects(PortEvent::RUN_STATE) || self.state() == PortState::Suspended;
        run |= self.delayed_post.poll(now);
        run |= self.data_ready.poll(now);

        if events.intersects(PortEvent::RELOAD | PortEvent::RELOAD_DELAYED) {
            self.port
                .events
                .clear((PortEvent::RELOAD | PortEvent::RELOAD_DELAYED).bits());
            // A controller reset wins over a plain firmware reload, the controller needs time to boot
            self.reload(events.contains(PortEvent::RELOAD_DELAYED));
            run = false;
        }

        if events.contains(PortEvent::IRQ) {
            self.port.events.clear(PortEvent::IRQ.bits());
            if !self.manager.is_suspended() {
                self.irq_pending = true;
            }
        }

        match self.timing.poll(now) {
            Some(Outcome::Retry(gate)) if self.current.is_some() => {
                debug!("Port{}: Retrying {:?}", self.id(), gate);
                if let Err(e) = self.dispatch().await {
                    self.log_error(&e, PortState::Idle);
                    self.set_state(PortState::ErrorRecovery);
                }
            }
            Some(Outcome::Abandon(gate)) if self.current.is_some() => {
                warn!("Port{}: Abandoning {:?}", self.id(), gate);
                self.complete(CciEvent::failed(), PortState::Idle);
            }
            _ => {}
        }

        if self.state() == PortState::Idle && self.irq_pending {
            match self.handle_irq().await {
                Ok(()) => self.irq_pending = false,
                Err(e) => {
                    self.log_error(&e, PortState::Idle);
                    self.delayed_post.start(Instant::now(), self.config.irq_retry_delay);
                }
            }
        }

        run
    }

    async fn run_state(&mut self) {
        let state = self.state();
        let result = match state {
            PortState::Init => self.run_init().await,
            PortState::Idle => self.run_idle().await,
            PortState::TaskWait => self.run_task_wait().await,
            PortState::ErrorRecovery => {
                self.run_error_recovery();
                Ok(())
            }
            PortState::Suspended => {
                self.run_suspended();
                Ok(())
            }
        };

        if let Err(e) = result {
            self.log_error(&e, state);
            if state == PortState::Init {
                // Give the controller time to finish booting before retrying
                self.set_state_delayed(PortState::ErrorRecovery, self.config.init_error_delay);
            } else {
                self.set_state(PortState::ErrorRecovery);
            }
        }
    }

    fn log_error(&self, e: &Error<B::Error>, state: PortState) {
        match e {
            Error::Bus(_) => error!("Port{}: Bus error in {:?}", self.id(), state),
            Error::Pd(_) => error!("Port{}: Controller error in {:?}", self.id(), state),
        }
    }

    /// Enter `next` and schedule it to run
    fn set_state(&mut self, next: PortState) {
        self.enter(next);
        if next != PortState::Idle {
            self.port.post(PortEvent::INTERNAL);
        }
    }

    /// Enter `next`, it runs once `delay` has passed
    fn set_state_delayed(&mut self, next: PortState, delay: Duration) {
        self.enter(next);
        self.delayed_post.start(Instant::now(), delay);
    }

    fn enter(&mut self, next: PortState) {
        let previous = self.state();
        if previous != next {
            debug!("Port{}: {:?} -> {:?}", self.id(), previous, next);
        }

        self.delayed_post.cancel();
        self.port.set_state(next);
        match next {
            PortState::Init => {
                self.port.set_init_done(false);
                self.init_attempt = self.init_attempt.saturating_add(1);
                self.abort_outstanding();
            }
            PortState::Idle => {
                if self.current.is_none() {
                    self.port.release_unless_queued();
                }
                // A suspend request consumed outside of idle must still be acted on here
                if self.irq_pending || self.manager.is_suspended() {
                    self.port.post(PortEvent::INTERNAL);
                }
            }
            PortState::Suspended => self.abort_outstanding(),
            PortState::TaskWait | PortState::ErrorRecovery => {}
        }
    }

    /// Fail the in-flight request and any request that was never started
    fn abort_outstanding(&mut self) {
        self.timing.reset();
        self.data_ready.cancel();
        self.task_deadline.cancel();

        let current = self.current.take();
        let unstarted = self.port.take_unstarted();
        for request in [current, unstarted].into_iter().flatten() {
            warn!("Port{}: Aborting {:?}", self.id(), request.command);
            if let Some(output) = request.output {
                output.clear();
            }
            self.port.deliver(CciEvent::failed(), request.callback);
        }
        self.port.release();
    }

    /// Finish the current request with `cci` and move to `next`
    ///
    /// The port is in `next` before the callback runs, so a callback may submit the next command.
    fn complete(&mut self, cci: CciEvent, next: PortState) {
        let request = self.current.take();
        self.port.release();
        self.set_state(next);
        debug!("Port{}: Complete {:#x}", self.id(), cci.raw());
        self.port.deliver(cci, request.and_then(|request| request.callback));
    }

    fn reload(&mut self, delayed: bool) {
        info!("Port{}: Reloading, delayed: {}", self.id(), delayed);
        self.abort_outstanding();
        self.port.discard_connector_status();
        self.pdos = [0; MAX_PDOS];
        self.port.set_init_done(false);
        self.init_attempt = 0;
        if delayed {
            self.set_state_delayed(PortState::Init, self.config.reset_recovery_delay);
        } else {
            self.set_state(PortState::Init);
        }
    }

    async fn read_array<const L: usize>(&mut self, reg: Register) -> Result<[u8; L], Error<B::Error>> {
        let mut buf = [0u8; L];
        self.bus.read(reg, &mut buf).await.map_err(Error::Bus)?;
        Ok(buf)
    }

    async fn read_u32(&mut self, reg: Register) -> Result<u32, Error<B::Error>> {
        Ok(u32::from_le_bytes(self.read_array(reg).await?))
    }

    async fn write(&mut self, reg: Register, data: &[u8]) -> Result<(), Error<B::Error>> {
        self.bus.write(reg, data).await.map_err(Error::Bus)
    }

    async fn write_u32(&mut self, reg: Register, value: u32) -> Result<(), Error<B::Error>> {
        self.write(reg, &value.to_le_bytes()).await
    }

    async fn modify_port_control(&mut self, f: impl FnOnce(&mut PortControl)) -> Result<(), Error<B::Error>> {
        let mut control = PortControl(self.read_u32(Register::PortControl).await?);
        f(&mut control);
        self.write_u32(Register::PortControl, control.0).await?;
        self.port.set_port_control(control);
        Ok(())
    }

    async fn modify_port_configuration(
        &mut self,
        f: impl FnOnce(&mut PortConfiguration),
    ) -> Result<(), Error<B::Error>> {
        let mut configuration = PortConfiguration(self.read_u32(Register::PortConfiguration).await?);
        f(&mut configuration);
        self.write_u32(Register::PortConfiguration, configuration.0).await?;
        self.port.set_port_configuration(configuration);
        Ok(())
    }

    async fn reset_autoneg(&mut self) -> Result<(), Error<B::Error>> {
        let sink = encoder::default_autoneg(self.port.config());
        self.write(Register::AutonegotiateSink, &sink.to_bytes()).await
    }

    /// Read controller information and refresh the cached copy
    async fn read_ic_status(&mut self) -> Result<PdcInfo, Error<B::Error>> {
        let mode: [u8; 4] = self.read_array(Register::Mode).await?;
        if !MODE_APP.contains(&mode) {
            error!("Port{}: Controller not running application firmware", self.id());
            return Err(Error::Pd(PdError::Failed));
        }

        let fw_version = self.read_u32(Register::Version).await?;
        let customer_use: [u8; 8] = self.read_array(Register::CustomerUse).await?;
        let identity = TxIdentity::from_bytes(self.read_array(Register::TxIdentity).await?);
        let boot_flags = BootFlags(self.read_u32(Register::BootFlags).await?);

        let mut info = PdcInfo {
            fw_version,
            vid: identity.vendor_id(),
            pid: identity.product_id(),
            is_running_flash_code: true,
            running_in_flash_bank: boot_flags.active_bank(),
            no_fw_update: self.port.config().no_fw_update,
            ..Default::default()
        };
        info.set_project_name(encoder::project_name(&customer_use).as_bytes());
        debug!("Port{}: FW version {:#x}, project {}", self.id(), fw_version, info.project_name());

        self.port.set_info(info);
        Ok(info)
    }

    /// Clear the dead battery flag if the controller booted from it
    async fn exit_dead_battery(&mut self) -> Result<(), Error<B::Error>> {
        let boot_flags = BootFlags(self.read_u32(Register::BootFlags).await?);
        if !boot_flags.dead_battery_flag() {
            return Ok(());
        }

        info!("Port{}: Clearing dead battery flag", self.id());
        self.write(Register::Command, &Task::Dbfg.code()).await?;
        for _ in 0..self.config.dead_battery_poll_limit {
            Timer::after(self.config.task_poll_interval).await;
            let command: [u8; 4] = self.read_array(Register::Command).await?;
            if command == [0; 4] {
                return Ok(());
            }
            if command == UNKNOWN_COMMAND {
                return Err(Error::Pd(PdError::Rejected));
            }
        }

        Err(Error::Pd(PdError::Timeout))
    }

    async fn run_init(&mut self) -> Result<(), Error<B::Error>> {
        if self.manager.is_suspended() {
            self.set_state(PortState::Suspended);
            return Ok(());
        }

        if self.init_attempt > self.config.init_retry_max {
            error!("Port{}: Initialization failed {} times", self.id(), self.config.init_retry_max);
            self.manager.suspend_all();
            self.set_state(PortState::Suspended);
            return Ok(());
        }

        info!("Port{}: Initializing, attempt {}", self.id(), self.init_attempt);
        if self
            .write_u32(Register::InterruptClear, Interrupt::PATCH_LOADED.bits())
            .await
            .is_err()
        {
            warn!("Port{}: Failed to clear firmware loaded interrupt", self.id());
        }

        self.read_ic_status().await?;
        self.write_u32(Register::InterruptMask, Interrupt::default_mask().bits())
            .await?;

        if !self.port.config().ccd {
            self.reset_autoneg().await?;
        }

        let control = PortControl::init_default();
        self.write_u32(Register::PortControl, control.0).await?;
        self.port.set_port_control(control);
        let configuration = PortConfiguration(self.read_u32(Register::PortConfiguration).await?);
        self.port.set_port_configuration(configuration);

        self.exit_dead_battery().await?;

        let notifications = ucsi::Command::SetNotificationEnable(self.port.config().notification_enable);
        if let Some(displaced) = self.port.queue_internal(Request::new(notifications)) {
            warn!("Port{}: Dropping {:?}", self.id(), displaced.command);
            self.port.deliver(CciEvent::failed(), displaced.callback);
        }
        self.set_state(PortState::Idle);
        Ok(())
    }

    async fn run_idle(&mut self) -> Result<(), Error<B::Error>> {
        if self.manager.is_suspended() {
            self.set_state(PortState::Suspended);
            return Ok(());
        }

        if self.port.events.test(PortEvent::COMMAND_COMPLETE.bits()) {
            self.port.events.clear(PortEvent::COMMAND_COMPLETE.bits());
            if let Some(ack_command) = self.port.take_ack() {
                let mut cci = CciEvent::completed(0);
                cci.set_ack_command(ack_command);
                self.port.deliver(cci, None);
            }
            self.set_state(PortState::Idle);
            return Ok(());
        }

        if self.port.events.test(PortEvent::COMMAND.bits()) {
            self.port.events.clear(PortEvent::COMMAND.bits());
            if let Some(request) = self.port.take_queued() {
                debug!("Port{}: Starting {:?}", self.id(), request.command);
                self.current = Some(request);
                self.dispatch().await?;
            }
        }

        Ok(())
    }

    async fn run_task_wait(&mut self) -> Result<(), Error<B::Error>> {
        let command: [u8; 4] = self.read_array(Register::Command).await?;
        let rejected = command == UNKNOWN_COMMAND;
        if command != [0; 4] && !rejected {
            let now = Instant::now();
            if self.task_deadline.poll(now) {
                error!("Port{}: Task timeout", self.id());
                return Err(Error::Pd(PdError::Timeout));
            }
            self.data_ready.start(now, self.config.task_poll_interval);
            return Ok(());
        }

        self.task_deadline.cancel();
        self.data_ready.cancel();
        let data: [u8; MAX_REGISTER_LEN] = self.read_array(Register::Data).await?;
        let status = data.first().copied().unwrap_or(0);
        let failed = rejected || status != 0;

        let Some((command, output)) = self.current.as_ref().map(|request| (request.command.clone(), request.output))
        else {
            warn!("Port{}: Task finished without a request", self.id());
            self.set_state(PortState::Idle);
            return Ok(());
        };

        let cci = if failed {
            warn!("Port{}: {:?} failed, status {:#x}", self.id(), command, status);
            if let Some(output) = output {
                output.clear();
            }
            let mut cci = CciEvent::failed();
            cci.set_not_supported(rejected);
            cci
        } else {
            let payload = self.task_result(&command, &data).await;
            if let Some(output) = output {
                output.write(&payload);
            }
            CciEvent::completed(payload.len() as u8)
        };

        let next = if self.port.is_init_done() {
            PortState::Idle
        } else {
            PortState::Init
        };
        self.complete(cci, next);
        Ok(())
    }

    fn run_error_recovery(&mut self) {
        if self.manager.is_suspended() {
            self.set_state(PortState::Suspended);
            return;
        }

        self.data_ready.cancel();
        self.task_deadline.cancel();
        let next = if self.port.is_init_done() {
            PortState::Idle
        } else {
            PortState::Init
        };
        self.complete(CciEvent::failed(), next);
    }

    fn run_suspended(&mut self) {
        if self.manager.is_suspended() {
            return;
        }

        info!("Port{}: Resuming", self.id());
        self.init_attempt = 0;
        self.set_state(PortState::Init);
    }

    /// Read, clear and report pending controller interrupts
    async fn handle_irq(&mut self) -> Result<(), Error<B::Error>> {
        let events = Interrupt::from_bits_retain(self.read_u32(Register::InterruptEvent).await?);
        if events.is_empty() {
            return Ok(());
        }

        debug!("Port{}: Interrupt {:#x}", self.id(), events.bits());
        if events.contains(Interrupt::PATCH_LOADED) {
            // Firmware reloads affect every port, initialization clears the bit
            info!("Port{}: Firmware loaded", self.id());
            self.manager.reload_all(false);
            return Ok(());
        }

        let now = Instant::now();
        if events.contains(Interrupt::PLUG_INSERT_OR_REMOVAL) {
            self.timing.on_plug();
        }
        if events.contains(Interrupt::SINK_READY) {
            self.timing.on_sink_ready(now);
        }
        if events.contains(Interrupt::NEW_CONTRACT_AS_CONSUMER) {
            self.timing.on_new_contract(now);
        }

        let mut cci = CciEvent::default();
        cci.set_vendor_defined_indicator(true);
        cci.set_not_supported(events.contains(Interrupt::NOT_SUPPORTED_RECEIVED));
        if events.contains(Interrupt::UCSI_CONNECTOR_STATUS_CHANGE) {
            cci.set_connector_change(self.port.config().connector_number.wrapping_add(1));
        }

        self.write_u32(Register::InterruptClear, events.bits()).await?;
        self.port.deliver(cci, None);
        self.manager.recheck_line();
        Ok(())
    }
}
