//! Driver manager: owns every port of the system and implements the caller-facing [`Pdc`] trait
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_services::{info, warn};
use embedded_usb_pd::PortId as LocalPortId;
use pdc_interface::{Callback, ConnectorStatusChange, Error, Pdc, PdcInfo, Request};

use crate::bus::Bus;
use crate::config::{Config, PortConfig};
use crate::port::{Port, PortEvent};
use crate::router::{EventRouter, InterruptLine};
use crate::suspend::{SuspendFlag, wait_suspended};
use crate::worker::Worker;

/// Set of ports sharing one interrupt line and one suspend flag
pub struct PdcManager<'a, M: RawMutex, const N: usize> {
    ports: [Port<'a, M>; N],
    config: Config,
    suspend: SuspendFlag,
    router: EventRouter<'a>,
}

impl<'a, M: RawMutex, const N: usize> PdcManager<'a, M, N> {
    /// Create a manager, port ids are assigned in the order of `configs`
    pub fn new(configs: [PortConfig; N], config: Config, line: Option<&'a dyn InterruptLine>) -> Self {
        let mut id = 0u8;
        let ports = configs.map(|port_config| {
            let port = Port::new(LocalPortId(id), port_config);
            id = id.wrapping_add(1);
            port
        });

        Self {
            ports,
            config,
            suspend: SuspendFlag::new(),
            router: EventRouter::new(line),
        }
    }

    pub fn port(&self, id: LocalPortId) -> Result<&Port<'a, M>, Error> {
        self.ports.get(usize::from(id.0)).ok_or(Error::InvalidPort)
    }

    pub fn ports(&self) -> &[Port<'a, M>] {
        &self.ports
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create the worker driving port `id` over `bus`
    ///
    /// Exactly one worker must run per port, it becomes the only user of `bus`.
    pub fn worker<B: Bus>(&'a self, id: LocalPortId, bus: B) -> Result<Worker<'a, M, B, N>, Error> {
        let port = self.port(id)?;
        Ok(Worker::new(self, port, bus))
    }

    /// Interrupt entry point
    ///
    /// Only posts wake events, safe to call from interrupt context.
    pub fn on_signal(&self) {
        self.router.on_signal(&self.ports);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspend.is_set()
    }

    /// Stop traffic on every port
    pub(crate) fn suspend_all(&self) {
        if !self.suspend.set() {
            info!("Suspending all ports");
        }
        self.router.broadcast(&self.ports, PortEvent::SUSPEND_REQUEST);
    }

    pub(crate) fn reload_all(&self, delayed: bool) {
        self.router.reload_all(&self.ports, delayed);
    }

    pub(crate) fn recheck_line(&self) {
        self.router.recheck(&self.ports);
    }
}

impl<'a, M: RawMutex, const N: usize> Pdc<'a> for PdcManager<'a, M, N> {
    fn submit(&self, port: LocalPortId, request: Request<'a>) -> Result<(), Error> {
        self.port(port)?.submit(request, self.suspend.is_set())
    }

    fn ack_change_bits(&self, port: LocalPortId, mask: ConnectorStatusChange, ack_command: bool) -> Result<(), Error> {
        self.port(port)?.ack_change_bits(mask, ack_command);
        Ok(())
    }

    fn is_init_done(&self, port: LocalPortId) -> bool {
        self.port(port).is_ok_and(|port| port.is_init_done())
    }

    fn get_hw_config(&self, port: LocalPortId) -> Result<u16, Error> {
        Ok(self.port(port)?.config().bus_address)
    }

    fn get_info(&self, port: LocalPortId) -> Result<PdcInfo, Error> {
        self.port(port)?.info().ok_or(Error::NotReady)
    }

    fn set_callback(&self, port: LocalPortId, callback: Option<&'a dyn Callback>) -> Result<(), Error> {
        self.port(port)?.set_callback(callback);
        Ok(())
    }

    fn set_connector_change_callback(
        &self,
        port: LocalPortId,
        callback: Option<&'a dyn Callback>,
    ) -> Result<(), Error> {
        self.port(port)?.set_connector_change_callback(callback);
        Ok(())
    }

    async fn set_comms(&self, active: bool) -> Result<(), Error> {
        if active {
            info!("Resuming communication");
            self.suspend.clear();
            // Interrupts are ignored while suspended, make every port check for missed ones
            self.router.on_signal(&self.ports);
            return Ok(());
        }

        self.suspend_all();
        let result = wait_suspended(
            &self.ports,
            self.config.suspend_timeout,
            self.config.suspend_poll_interval,
        )
        .await;
        if result.is_err() {
            warn!("Suspend timed out, communication stays disabled");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use pdc_interface::command::ucsi;

    use super::*;
    use crate::port::PortState;

    fn manager() -> PdcManager<'static, CriticalSectionRawMutex, 2> {
        let second = PortConfig {
            bus_address: 0x24,
            connector_number: 1,
            ..Default::default()
        };
        PdcManager::new([PortConfig::default(), second], Config::default(), None)
    }

    #[test]
    fn ports_are_numbered_in_order() {
        let manager = manager();
        assert_eq!(manager.ports().len(), 2);
        assert_eq!(manager.port(LocalPortId(1)).unwrap().id(), LocalPortId(1));
        assert_eq!(manager.get_hw_config(LocalPortId(1)), Ok(0x24));
        assert!(matches!(manager.port(LocalPortId(2)), Err(Error::InvalidPort)));
    }

    #[test]
    fn unknown_port() {
        let manager = manager();
        assert!(!manager.is_init_done(LocalPortId(5)));
        assert_eq!(manager.get_info(LocalPortId(5)), Err(Error::InvalidPort));
        assert_eq!(
            manager.submit(LocalPortId(5), Request::new(ucsi::Command::GetCapability)),
            Err(Error::InvalidPort)
        );
    }

    #[test]
    fn info_not_ready_before_init() {
        let manager = manager();
        assert_eq!(manager.get_info(LocalPortId(0)), Err(Error::NotReady));
    }

    #[test]
    fn suspended_submit_is_busy() {
        let manager = manager();
        manager.port(LocalPortId(0)).unwrap().set_state(PortState::Idle);
        manager.suspend_all();
        assert!(manager.is_suspended());
        assert_eq!(
            manager.submit(LocalPortId(0), Request::new(ucsi::Command::GetCapability)),
            Err(Error::Busy)
        );
        assert!(
            manager
                .ports()
                .iter()
                .all(|port| port.events.test(PortEvent::SUSPEND_REQUEST.bits()))
        );
    }

    #[tokio::test]
    async fn suspend_timeout_keeps_flag() {
        let config = Config {
            suspend_timeout: embassy_time::Duration::from_millis(20),
            suspend_poll_interval: embassy_time::Duration::from_millis(5),
            ..Default::default()
        };
        let manager: PdcManager<'_, CriticalSectionRawMutex, 1> =
            PdcManager::new([PortConfig::default()], config, None);

        // No worker is running, the port never suspends
        assert_eq!(manager.set_comms(false).await, Err(Error::Timeout));
        assert!(manager.is_suspended());

        assert_eq!(manager.set_comms(true).await, Ok(()));
        assert!(!manager.is_suspended());
        assert!(manager.ports()[0].events.test(PortEvent::IRQ.bits()));
    }
}
