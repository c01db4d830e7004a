//! Offline Z80 conformance harness.
//!
//! Vectors are JSON files of [`Z80TestCase`]: an initial CPU+RAM
//! state, the expected final state, and the instruction's T-state
//! cost. The generator binary produces them from randomized states;
//! the replay test under `tests/` checks the interpreter against any
//! vectors found in `test_data/z80/`.

use markiii_core::core::Bus;
use serde::{Deserialize, Serialize};

// --- TracingBus: flat 64 KiB memory with access recording ---

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BusOp {
    Read,
    Write,
    In,
    Out,
}

#[derive(Clone, Debug)]
pub struct BusAccess {
    pub addr: u16,
    pub data: u8,
    pub op: BusOp,
}

pub struct TracingBus {
    pub memory: [u8; 0x10000],
    pub accesses: Vec<BusAccess>,
    /// Queued values returned by `io_read`, most recent last.
    pub input_queue: Vec<u8>,
}

impl TracingBus {
    pub fn new() -> Self {
        Self {
            memory: [0; 0x10000],
            accesses: Vec::new(),
            input_queue: Vec::new(),
        }
    }

    pub fn load(&mut self, addr: u16, data: &[u8]) {
        let start = addr as usize;
        self.memory[start..start + data.len()].copy_from_slice(data);
    }

    pub fn clear_accesses(&mut self) {
        self.accesses.clear();
    }
}

impl Default for TracingBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for TracingBus {
    fn read(&mut self, addr: u16) -> u8 {
        let data = self.memory[addr as usize];
        self.accesses.push(BusAccess { addr, data, op: BusOp::Read });
        data
    }

    fn write(&mut self, addr: u16, data: u8) {
        self.memory[addr as usize] = data;
        self.accesses.push(BusAccess { addr, data, op: BusOp::Write });
    }

    fn io_read(&mut self, port: u16) -> u8 {
        let data = self.input_queue.pop().unwrap_or(0xFF);
        self.accesses.push(BusAccess { addr: port, data, op: BusOp::In });
        data
    }

    fn io_write(&mut self, port: u16, data: u8) {
        self.accesses.push(BusAccess { addr: port, data, op: BusOp::Out });
    }
}

// --- JSON vector types ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Z80TestCase {
    pub name: String,
    pub initial: Z80CpuState,
    #[serde(rename = "final")]
    pub final_state: Z80CpuState,
    /// Total T-states the instruction must cost.
    pub cycles: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Z80CpuState {
    pub pc: u16,
    pub sp: u16,
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub i: u8,
    pub r: u8,
    pub ix: u16,
    pub iy: u16,
    pub af_prime: u16,
    pub bc_prime: u16,
    pub de_prime: u16,
    pub hl_prime: u16,
    pub iff1: u8,
    pub iff2: u8,
    pub im: u8,
    pub ram: Vec<(u16, u8)>,
}

impl Z80CpuState {
    pub fn capture(cpu: &markiii_core::cpu::Z80, ram: &[(u16, u8)]) -> Self {
        Self {
            pc: cpu.pc,
            sp: cpu.sp,
            a: cpu.a,
            f: cpu.f,
            b: cpu.b,
            c: cpu.c,
            d: cpu.d,
            e: cpu.e,
            h: cpu.h,
            l: cpu.l,
            i: cpu.i,
            r: cpu.r,
            ix: cpu.ix,
            iy: cpu.iy,
            af_prime: ((cpu.a_prime as u16) << 8) | cpu.f_prime as u16,
            bc_prime: ((cpu.b_prime as u16) << 8) | cpu.c_prime as u16,
            de_prime: ((cpu.d_prime as u16) << 8) | cpu.e_prime as u16,
            hl_prime: ((cpu.h_prime as u16) << 8) | cpu.l_prime as u16,
            iff1: cpu.iff1 as u8,
            iff2: cpu.iff2 as u8,
            im: cpu.im,
            ram: ram.to_vec(),
        }
    }

    pub fn apply(&self, cpu: &mut markiii_core::cpu::Z80) {
        cpu.pc = self.pc;
        cpu.sp = self.sp;
        cpu.a = self.a;
        cpu.f = self.f;
        cpu.b = self.b;
        cpu.c = self.c;
        cpu.d = self.d;
        cpu.e = self.e;
        cpu.h = self.h;
        cpu.l = self.l;
        cpu.i = self.i;
        cpu.r = self.r;
        cpu.ix = self.ix;
        cpu.iy = self.iy;
        cpu.a_prime = (self.af_prime >> 8) as u8;
        cpu.f_prime = self.af_prime as u8;
        cpu.b_prime = (self.bc_prime >> 8) as u8;
        cpu.c_prime = self.bc_prime as u8;
        cpu.d_prime = (self.de_prime >> 8) as u8;
        cpu.e_prime = self.de_prime as u8;
        cpu.h_prime = (self.hl_prime >> 8) as u8;
        cpu.l_prime = self.hl_prime as u8;
        cpu.iff1 = self.iff1 != 0;
        cpu.iff2 = self.iff2 != 0;
        cpu.im = self.im;
        cpu.halted = false;
        cpu.ei_delay = false;
        cpu.irq_line = false;
        cpu.nmi_pending = false;
    }
}
