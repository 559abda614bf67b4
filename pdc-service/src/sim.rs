//! Simulated controller for driving workers in tests
extern crate std;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use crate::bus::Bus;
use crate::registers::{Interrupt, Register, UNKNOWN_COMMAND};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SimError;

/// Register contents and scripted behavior of one simulated port
pub struct SimState {
    registers: BTreeMap<u8, Vec<u8>>,
    /// Number of upcoming reads that fail
    pub fail_reads: usize,
    /// Every successful write, in order
    pub writes: Vec<(Register, Vec<u8>)>,
    /// Every bus transaction, including failed ones
    pub transactions: usize,
    /// Data register contents after a task finishes, keyed by task code
    task_results: BTreeMap<[u8; 4], Vec<u8>>,
    /// Data register contents after a UCSI task finishes, keyed by opcode
    ucsi_results: BTreeMap<u8, Vec<u8>>,
    rejected: Vec<[u8; 4]>,
    /// Number of command register polls a task stays busy
    pub busy_polls: usize,
    polls_left: usize,
    running: Option<[u8; 4]>,
}

impl SimState {
    fn new() -> Self {
        let mut registers = BTreeMap::new();
        registers.insert(Register::Mode.address(), b"APP0".to_vec());
        registers.insert(Register::Version.address(), 0x0102_0304u32.to_le_bytes().to_vec());
        registers.insert(Register::CustomerUse.address(), b"GOOGTEST".to_vec());
        registers.insert(Register::TxIdentity.address(), std::vec![0x51, 0x04, 0x34, 0x12, 0, 0, 0, 0]);

        Self {
            registers,
            fail_reads: 0,
            writes: Vec::new(),
            transactions: 0,
            task_results: BTreeMap::new(),
            ucsi_results: BTreeMap::new(),
            rejected: Vec::new(),
            busy_polls: 0,
            polls_left: 0,
            running: None,
        }
    }

    pub fn set_register(&mut self, reg: Register, data: &[u8]) {
        self.registers.insert(reg.address(), data.to_vec());
    }

    pub fn register(&self, reg: Register) -> Vec<u8> {
        self.registers.get(&reg.address()).cloned().unwrap_or_default()
    }

    pub fn register_u32(&self, reg: Register) -> u32 {
        let mut bytes = [0u8; 4];
        for (dst, src) in bytes.iter_mut().zip(self.register(reg)) {
            *dst = src;
        }
        u32::from_le_bytes(bytes)
    }

    /// Data register contents once `task` completes
    pub fn set_task_result(&mut self, task: [u8; 4], data: &[u8]) {
        self.task_results.insert(task, data.to_vec());
    }

    /// Data register contents once a UCSI command with `opcode` completes
    pub fn set_ucsi_result(&mut self, opcode: u8, data: &[u8]) {
        self.ucsi_results.insert(opcode, data.to_vec());
    }

    /// Answer `task` with an unknown command indication
    pub fn reject(&mut self, task: [u8; 4]) {
        self.rejected.push(task);
    }

    pub fn raise(&mut self, interrupt: Interrupt) {
        let pending = self.register_u32(Register::InterruptEvent) | interrupt.bits();
        self.set_register(Register::InterruptEvent, &pending.to_le_bytes());
    }

    pub fn writes_to(&self, reg: Register) -> Vec<Vec<u8>> {
        self.writes
            .iter()
            .filter(|(written, _)| *written == reg)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Tasks started, in order
    pub fn tasks(&self) -> Vec<[u8; 4]> {
        self.writes_to(Register::Command)
            .iter()
            .filter_map(|data| <[u8; 4]>::try_from(data.as_slice()).ok())
            .collect()
    }

    fn finish_task(&mut self, task: [u8; 4]) {
        self.running = None;
        if self.rejected.contains(&task) {
            self.set_register(Register::Command, &UNKNOWN_COMMAND);
            return;
        }

        let result = if task == *b"UCSI" {
            let opcode = self.register(Register::Data).first().copied().unwrap_or(0);
            self.ucsi_results.get(&opcode).cloned()
        } else {
            self.task_results.get(&task).cloned()
        };
        self.set_register(Register::Data, &result.unwrap_or_else(|| std::vec![0]));
        self.set_register(Register::Command, &[0; 4]);
    }
}

/// [`Bus`] backed by a [`SimState`], clones share the same state
#[derive(Clone)]
pub struct SimBus {
    state: Arc<Mutex<SimState>>,
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new())),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SimBus {
    type Error = SimError;

    async fn read(&mut self, reg: Register, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.with(|state| {
            state.transactions += 1;
            if state.fail_reads > 0 {
                state.fail_reads -= 1;
                return Err(SimError);
            }

            if reg == Register::Command
                && let Some(task) = state.running
            {
                if state.polls_left > 0 {
                    state.polls_left -= 1;
                } else {
                    state.finish_task(task);
                }
            }

            buf.fill(0);
            for (dst, src) in buf.iter_mut().zip(state.register(reg)) {
                *dst = src;
            }
            Ok(())
        })
    }

    async fn write(&mut self, reg: Register, data: &[u8]) -> Result<(), Self::Error> {
        self.with(|state| {
            state.transactions += 1;
            state.writes.push((reg, data.to_vec()));
            match reg {
                Register::InterruptClear => {
                    let cleared = u32::from_le_bytes(data.try_into().unwrap_or([0; 4]));
                    let pending = state.register_u32(Register::InterruptEvent) & !cleared;
                    state.set_register(Register::InterruptEvent, &pending.to_le_bytes());
                }
                Register::Command => {
                    state.set_register(reg, data);
                    state.running = data.try_into().ok();
                    state.polls_left = state.busy_polls;
                }
                _ => state.set_register(reg, data),
            }
            Ok(())
        })
    }
}
