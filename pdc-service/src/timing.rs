//! Power contract timing guard
//!
//! Selecting a sink RDO or enabling the sink path is only safe inside a window after the controller
//! reports a stable contract. Commands issued outside that window are deferred until the window opens
//! or a bounded timeout expires, whichever comes first.
use embassy_time::{Duration, Instant};

use embedded_services::{debug, info};

/// One-shot deadline
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Deadline {
    expiry: Option<Instant>,
}

impl Deadline {
    pub const fn new() -> Self {
        Self { expiry: None }
    }

    /// Arm the deadline `duration` after `now`, replacing any previous expiry
    pub fn start(&mut self, now: Instant, duration: Duration) {
        self.expiry = Some(now.checked_add(duration).unwrap_or(Instant::MAX));
    }

    pub fn cancel(&mut self) {
        self.expiry = None;
    }

    pub fn is_armed(&self) -> bool {
        self.expiry.is_some()
    }

    pub fn expiry(&self) -> Option<Instant> {
        self.expiry
    }

    /// Returns true once if the deadline has passed, disarming it
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(expiry) = self.expiry else {
            return false;
        };

        let expired = expiry <= now;
        if expired {
            self.cancel();
        }
        expired
    }
}

/// Earliest of two optional instants
pub(crate) fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Operations gated on the contract window
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gate {
    /// Selecting a sink RDO, opened by sink ready
    SetRdo,
    /// Enabling the sink path, opened by a new contract as consumer
    SinkEnable,
}

/// Decision on a deferred operation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// The window opened, issue the operation now
    Retry(Gate),
    /// The window did not open in time, drop the operation
    Abandon(Gate),
}

/// Per-port contract window state
#[derive(Clone, Debug)]
pub struct ContractTiming {
    set_rdo_possible: bool,
    sink_enable_possible: bool,
    /// Flags waiting for the settle delay to pass
    settling_set_rdo: bool,
    settling_sink_enable: bool,
    settle: Deadline,
    deferred: Option<Gate>,
    window: Deadline,
    settle_delay: Duration,
    window_timeout: Duration,
}

impl ContractTiming {
    pub fn new(settle_delay: Duration, window_timeout: Duration) -> Self {
        Self {
            set_rdo_possible: false,
            sink_enable_possible: false,
            settling_set_rdo: false,
            settling_sink_enable: false,
            settle: Deadline::new(),
            deferred: None,
            window: Deadline::new(),
            settle_delay,
            window_timeout,
        }
    }

    /// Returns true if `gate` may be issued right now
    pub fn is_open(&self, gate: Gate) -> bool {
        match gate {
            Gate::SetRdo => self.set_rdo_possible,
            Gate::SinkEnable => self.sink_enable_possible,
        }
    }

    /// Operation currently waiting for its window
    pub fn deferred(&self) -> Option<Gate> {
        self.deferred
    }

    /// A plug was inserted or removed, every window closes
    pub fn on_plug(&mut self) {
        self.set_rdo_possible = false;
        self.sink_enable_possible = false;
        self.settling_set_rdo = false;
        self.settling_sink_enable = false;
        self.settle.cancel();
    }

    /// Sink ready reported, the RDO window opens after the settle delay
    pub fn on_sink_ready(&mut self, now: Instant) {
        self.settling_set_rdo = true;
        self.settle.start(now, self.settle_delay);
    }

    /// New contract as consumer reported, the sink path window opens after the settle delay
    pub fn on_new_contract(&mut self, now: Instant) {
        self.settling_sink_enable = true;
        self.settle.start(now, self.settle_delay);
    }

    /// A new RDO was applied, the sink path stays closed until the renegotiated contract is reported
    pub fn on_rdo_applied(&mut self) {
        self.sink_enable_possible = false;
        self.settling_sink_enable = false;
    }

    /// Hold `gate` until its window opens or the timeout passes
    pub fn defer(&mut self, gate: Gate, now: Instant) {
        info!("Deferring {:?} until contract window opens", gate);
        self.deferred = Some(gate);
        self.window.start(now, self.window_timeout);
    }

    /// Forget everything, used when the controller is reinitialized
    pub fn reset(&mut self) {
        self.on_plug();
        self.deferred = None;
        self.window.cancel();
    }

    /// Next instant at which [`Self::poll`] has something to do
    pub fn next_deadline(&self) -> Option<Instant> {
        earliest(self.settle.expiry(), self.window.expiry())
    }

    /// Advance timers, returns a decision for the deferred operation if one is due
    pub fn poll(&mut self, now: Instant) -> Option<Outcome> {
        if self.settle.poll(now) {
            if self.settling_set_rdo {
                debug!("RDO window open");
                self.set_rdo_possible = true;
                self.settling_set_rdo = false;
            }
            if self.settling_sink_enable {
                debug!("Sink path window open");
                self.sink_enable_possible = true;
                self.settling_sink_enable = false;
            }
        }

        let gate = self.deferred?;
        if self.is_open(gate) {
            info!("Contract window open, retrying {:?}", gate);
            self.deferred = None;
            self.window.cancel();
            return Some(Outcome::Retry(gate));
        }

        if self.window.poll(now) {
            info!("Contract window timeout, abandoning {:?}", gate);
            self.deferred = None;
            return Some(Outcome::Abandon(gate));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTLE: Duration = Duration::from_millis(5);
    const WINDOW: Duration = Duration::from_millis(1000);

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn deadline_fires_once() {
        let mut deadline = Deadline::new();
        assert!(!deadline.poll(at(0)));

        deadline.start(at(0), Duration::from_millis(10));
        assert!(deadline.is_armed());
        assert!(!deadline.poll(at(9)));
        assert!(deadline.poll(at(10)));
        assert!(!deadline.poll(at(11)));
        assert!(!deadline.is_armed());
    }

    #[test]
    fn flags_wait_for_settle_delay() {
        let mut timing = ContractTiming::new(SETTLE, WINDOW);
        timing.on_sink_ready(at(100));
        assert!(!timing.is_open(Gate::SetRdo));
        assert_eq!(timing.next_deadline(), Some(at(105)));

        assert_eq!(timing.poll(at(104)), None);
        assert!(!timing.is_open(Gate::SetRdo));
        assert_eq!(timing.poll(at(105)), None);
        assert!(timing.is_open(Gate::SetRdo));
        assert!(!timing.is_open(Gate::SinkEnable));
    }

    #[test]
    fn plug_closes_both_windows() {
        let mut timing = ContractTiming::new(SETTLE, WINDOW);
        timing.on_sink_ready(at(0));
        timing.on_new_contract(at(0));
        timing.poll(at(5));
        assert!(timing.is_open(Gate::SetRdo));
        assert!(timing.is_open(Gate::SinkEnable));

        timing.on_plug();
        assert!(!timing.is_open(Gate::SetRdo));
        assert!(!timing.is_open(Gate::SinkEnable));
    }

    #[test]
    fn plug_during_settle_cancels_pending_flags() {
        let mut timing = ContractTiming::new(SETTLE, WINDOW);
        timing.on_new_contract(at(0));
        timing.on_plug();
        timing.poll(at(10));
        assert!(!timing.is_open(Gate::SinkEnable));
    }

    #[test]
    fn deferred_command_retried_when_window_opens() {
        let mut timing = ContractTiming::new(SETTLE, WINDOW);
        timing.defer(Gate::SinkEnable, at(0));
        assert_eq!(timing.poll(at(500)), None);

        timing.on_new_contract(at(500));
        assert_eq!(timing.poll(at(504)), None);
        assert_eq!(timing.poll(at(505)), Some(Outcome::Retry(Gate::SinkEnable)));
        assert_eq!(timing.deferred(), None);
        assert_eq!(timing.next_deadline(), None);
    }

    #[test]
    fn deferred_command_abandoned_on_timeout() {
        let mut timing = ContractTiming::new(SETTLE, WINDOW);
        timing.defer(Gate::SetRdo, at(0));
        // The wrong window opening does not release the command
        timing.on_new_contract(at(10));
        assert_eq!(timing.poll(at(15)), None);

        assert_eq!(timing.poll(at(999)), None);
        assert_eq!(timing.poll(at(1000)), Some(Outcome::Abandon(Gate::SetRdo)));
        assert_eq!(timing.poll(at(2000)), None);
    }

    #[test]
    fn applied_rdo_closes_sink_window() {
        let mut timing = ContractTiming::new(SETTLE, WINDOW);
        timing.on_new_contract(at(0));
        timing.poll(at(5));
        timing.on_rdo_applied();
        assert!(!timing.is_open(Gate::SinkEnable));
    }

    #[test]
    fn reset_drops_deferred_command() {
        let mut timing = ContractTiming::new(SETTLE, WINDOW);
        timing.defer(Gate::SetRdo, at(0));
        timing.reset();
        assert_eq!(timing.deferred(), None);
        assert_eq!(timing.poll(at(2000)), None);
    }
}
