mod alu;
mod bit;
mod block;
mod branch;
mod load_store;
mod stack;

use crate::core::Bus;
use crate::cpu::state::{CpuStateTrait, Z80State};

#[repr(u8)]
#[derive(Copy, Clone, Debug)]
pub enum Flag {
    C = 0x01,  // Carry
    N = 0x02,  // Add/Subtract
    PV = 0x04, // Parity/Overflow
    X = 0x08,  // Unused (copy of bit 3)
    H = 0x10,  // Half Carry
    Y = 0x20,  // Unused (copy of bit 5)
    Z = 0x40,  // Zero
    S = 0x80,  // Sign
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IndexMode {
    Hl,
    Ix,
    Iy,
}

/// Zilog Z80, stepped one whole instruction at a time.
///
/// `step` executes the next instruction (or interrupt response) against
/// a borrowed [`Bus`] and returns its cost in T-states, which is what a
/// scanline-budget scheduler consumes. Interrupt lines are pushed in by
/// the machine: `irq_line` is level-sensitive and sampled at each
/// instruction boundary, `nmi` latches an edge that is taken before the
/// next instruction.
pub struct Z80 {
    // Registers
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    // Shadow registers
    pub a_prime: u8,
    pub f_prime: u8,
    pub b_prime: u8,
    pub c_prime: u8,
    pub d_prime: u8,
    pub e_prime: u8,
    pub h_prime: u8,
    pub l_prime: u8,
    // Index & special registers
    pub ix: u16,
    pub iy: u16,
    pub i: u8,
    pub r: u8,
    pub sp: u16,
    pub pc: u16,

    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,
    pub halted: bool,

    /// Interrupt acceptance is deferred for one instruction after EI.
    pub ei_delay: bool,

    /// Level-sensitive maskable interrupt request line.
    pub irq_line: bool,

    /// Latched non-maskable interrupt request, consumed by the next step.
    pub nmi_pending: bool,

    pub(crate) index_mode: IndexMode,
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl Z80 {
    pub fn new() -> Self {
        Self {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            a_prime: 0,
            f_prime: 0,
            b_prime: 0,
            c_prime: 0,
            d_prime: 0,
            e_prime: 0,
            h_prime: 0,
            l_prime: 0,
            ix: 0,
            iy: 0,
            i: 0,
            r: 0,
            sp: 0,
            pc: 0,
            iff1: false,
            iff2: false,
            im: 0,
            halted: false,
            ei_delay: false,
            irq_line: false,
            nmi_pending: false,
            index_mode: IndexMode::Hl,
        }
    }

    pub fn reset(&mut self) {
        self.pc = 0x0000;
        self.sp = 0;
        self.i = 0;
        self.r = 0;
        self.im = 0;
        self.iff1 = false;
        self.iff2 = false;
        self.halted = false;
        self.ei_delay = false;
        self.irq_line = false;
        self.nmi_pending = false;
        self.index_mode = IndexMode::Hl;
    }

    /// Drive the maskable interrupt request line (level-sensitive).
    pub fn set_irq(&mut self, asserted: bool) {
        self.irq_line = asserted;
    }

    /// Request a non-maskable interrupt (taken before the next step).
    pub fn nmi(&mut self) {
        self.nmi_pending = true;
    }

    // --- 16-bit register pair access ---

    pub fn get_bc(&self) -> u16 { ((self.b as u16) << 8) | self.c as u16 }
    pub fn set_bc(&mut self, val: u16) { self.b = (val >> 8) as u8; self.c = val as u8; }

    pub fn get_de(&self) -> u16 { ((self.d as u16) << 8) | self.e as u16 }
    pub fn set_de(&mut self, val: u16) { self.d = (val >> 8) as u8; self.e = val as u8; }

    pub fn get_hl(&self) -> u16 { ((self.h as u16) << 8) | self.l as u16 }
    pub fn set_hl(&mut self, val: u16) { self.h = (val >> 8) as u8; self.l = val as u8; }

    pub fn get_af(&self) -> u16 { ((self.a as u16) << 8) | self.f as u16 }
    pub fn set_af(&mut self, val: u16) { self.a = (val >> 8) as u8; self.f = val as u8; }

    /// HL, or the active index register under a DD/FD prefix.
    pub(crate) fn get_hl_ix(&self) -> u16 {
        match self.index_mode {
            IndexMode::Hl => self.get_hl(),
            IndexMode::Ix => self.ix,
            IndexMode::Iy => self.iy,
        }
    }

    pub(crate) fn set_hl_ix(&mut self, val: u16) {
        match self.index_mode {
            IndexMode::Hl => self.set_hl(val),
            IndexMode::Ix => self.ix = val,
            IndexMode::Iy => self.iy = val,
        }
    }

    /// Get 16-bit register pair by index (0=BC, 1=DE, 2=HL/IX/IY, 3=SP).
    pub(crate) fn get_rp(&self, index: u8) -> u16 {
        match index {
            0 => self.get_bc(),
            1 => self.get_de(),
            2 => self.get_hl_ix(),
            3 => self.sp,
            _ => unreachable!("get_rp called with index {}", index),
        }
    }

    pub(crate) fn set_rp(&mut self, index: u8, val: u16) {
        match index {
            0 => self.set_bc(val),
            1 => self.set_de(val),
            2 => self.set_hl_ix(val),
            3 => self.sp = val,
            _ => unreachable!("set_rp called with index {}", index),
        }
    }

    /// Register pair by index for PUSH/POP (0=BC, 1=DE, 2=HL/IX/IY, 3=AF).
    pub(crate) fn get_rp_af(&self, index: u8) -> u16 {
        match index {
            3 => self.get_af(),
            _ => self.get_rp(index),
        }
    }

    pub(crate) fn set_rp_af(&mut self, index: u8, val: u16) {
        match index {
            3 => self.set_af(val),
            _ => self.set_rp(index, val),
        }
    }

    // --- 8-bit register access ---

    pub fn get_reg8(&self, index: u8) -> u8 {
        match index {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            7 => self.a,
            _ => unreachable!("get_reg8 called with index {}", index),
        }
    }

    pub fn set_reg8(&mut self, index: u8, val: u8) {
        match index {
            0 => self.b = val,
            1 => self.c = val,
            2 => self.d = val,
            3 => self.e = val,
            4 => self.h = val,
            5 => self.l = val,
            7 => self.a = val,
            _ => unreachable!("set_reg8 called with index {}", index),
        }
    }

    /// 8-bit register by index, respecting the DD/FD prefix for H/L
    /// (undocumented IXH/IXL/IYH/IYL). Index 6 is not handled here;
    /// callers route (HL)/(IX+d)/(IY+d) through `mem_operand`.
    pub fn get_reg8_ix(&self, index: u8) -> u8 {
        match (index, self.index_mode) {
            (4, IndexMode::Ix) => (self.ix >> 8) as u8,
            (5, IndexMode::Ix) => self.ix as u8,
            (4, IndexMode::Iy) => (self.iy >> 8) as u8,
            (5, IndexMode::Iy) => self.iy as u8,
            _ => self.get_reg8(index),
        }
    }

    pub fn set_reg8_ix(&mut self, index: u8, val: u8) {
        match (index, self.index_mode) {
            (4, IndexMode::Ix) => self.ix = (self.ix & 0x00FF) | ((val as u16) << 8),
            (5, IndexMode::Ix) => self.ix = (self.ix & 0xFF00) | val as u16,
            (4, IndexMode::Iy) => self.iy = (self.iy & 0x00FF) | ((val as u16) << 8),
            (5, IndexMode::Iy) => self.iy = (self.iy & 0xFF00) | val as u16,
            _ => self.set_reg8(index, val),
        }
    }

    // --- Bus helpers ---

    pub(crate) fn inc_r(&mut self) {
        self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
    }

    /// M1 opcode fetch: read at PC, advance, refresh R.
    pub(crate) fn fetch<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u8 {
        let op = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        self.inc_r();
        op
    }

    /// Immediate operand byte (no R refresh).
    pub(crate) fn read_imm<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u8 {
        let val = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        val
    }

    pub(crate) fn read_imm16<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u16 {
        let lo = self.read_imm(bus);
        let hi = self.read_imm(bus);
        u16::from_le_bytes([lo, hi])
    }

    pub(crate) fn push_word<B: Bus + ?Sized>(&mut self, bus: &mut B, val: u16) {
        self.sp = self.sp.wrapping_sub(1);
        bus.write(self.sp, (val >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        bus.write(self.sp, val as u8);
    }

    pub(crate) fn pop_word<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u16 {
        let lo = bus.read(self.sp);
        self.sp = self.sp.wrapping_add(1);
        let hi = bus.read(self.sp);
        self.sp = self.sp.wrapping_add(1);
        u16::from_le_bytes([lo, hi])
    }

    /// Effective address of a (HL)/(IX+d)/(IY+d) memory operand, plus
    /// the extra T-states the indexed forms cost. Fetches the
    /// displacement byte for the indexed forms.
    pub(crate) fn mem_operand<B: Bus + ?Sized>(&mut self, bus: &mut B) -> (u16, u32) {
        match self.index_mode {
            IndexMode::Hl => (self.get_hl(), 0),
            IndexMode::Ix => {
                let d = self.read_imm(bus) as i8;
                (self.ix.wrapping_add(d as u16), 8)
            }
            IndexMode::Iy => {
                let d = self.read_imm(bus) as i8;
                (self.iy.wrapping_add(d as u16), 8)
            }
        }
    }

    // --- Stepping ---

    /// Execute one instruction or interrupt response; returns T-states.
    pub fn step<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        // NMI: edge latch, highest priority, ignores IFF1.
        if self.nmi_pending {
            self.nmi_pending = false;
            self.halted = false;
            self.iff1 = false;
            self.inc_r();
            self.push_word(bus, self.pc);
            self.pc = 0x0066;
            return 11;
        }

        // The instruction after EI runs with the request hidden, so
        // EI; RETI-style handlers and the EI; HALT idiom work.
        let irq_visible = self.irq_line && !self.ei_delay;
        self.ei_delay = false;

        if irq_visible {
            // A pending request wakes a halted CPU even when masked.
            self.halted = false;
            if self.iff1 {
                return self.interrupt_response(bus);
            }
        }

        if self.halted {
            return 4;
        }

        self.index_mode = IndexMode::Hl;
        let mut cycles = 0u32;
        loop {
            let opcode = self.fetch(bus);
            match opcode {
                0xDD => {
                    self.index_mode = IndexMode::Ix;
                    cycles += 4;
                }
                0xFD => {
                    self.index_mode = IndexMode::Iy;
                    cycles += 4;
                }
                _ => {
                    cycles += self.execute(opcode, bus);
                    break;
                }
            }
        }
        self.index_mode = IndexMode::Hl;
        cycles
    }

    /// Run instructions until at least `budget` T-states have elapsed.
    pub fn step_until<B: Bus + ?Sized>(&mut self, bus: &mut B, budget: u32) -> u32 {
        let mut consumed = 0;
        while consumed < budget {
            consumed += self.step(bus);
        }
        consumed
    }

    /// Maskable interrupt acknowledge.
    fn interrupt_response<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        self.iff1 = false;
        self.iff2 = false;
        self.inc_r();
        self.push_word(bus, self.pc);
        match self.im {
            2 => {
                // Vector low byte comes from the data bus; nothing
                // drives it on the SMS, so it floats to $FF.
                let table = ((self.i as u16) << 8) | 0x00FF;
                let lo = bus.read(table);
                let hi = bus.read(table.wrapping_add(1));
                self.pc = u16::from_le_bytes([lo, hi]);
                19
            }
            _ => {
                // IM 0 with a floating bus executes RST 38h, same as IM 1.
                self.pc = 0x0038;
                13
            }
        }
    }

    /// Unprefixed opcode dispatch. Handlers return total T-states for
    /// the instruction (the 4-T cost of a DD/FD prefix is added by the
    /// fetch loop in `step`).
    fn execute<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        match opcode {
            // NOP — 4 T
            0x00 => 4,

            // HALT — 4 T. PC stays past HALT (already incremented).
            0x76 => {
                self.halted = true;
                4
            }

            // Prefixes
            0xCB => self.execute_cb(bus),
            0xED => {
                self.index_mode = IndexMode::Hl;
                let sub = self.fetch(bus);
                self.execute_ed(sub, bus)
            }

            // --- Load/store ---
            0x02 => { bus.write(self.get_bc(), self.a); 7 }           // LD (BC),A
            0x12 => { bus.write(self.get_de(), self.a); 7 }           // LD (DE),A
            0x0A => { self.a = bus.read(self.get_bc()); 7 }           // LD A,(BC)
            0x1A => { self.a = bus.read(self.get_de()); 7 }           // LD A,(DE)
            0x22 => self.op_ld_nn_hl(bus),                            // LD (nn),HL — 16
            0x2A => self.op_ld_hl_nn(bus),                            // LD HL,(nn) — 16
            0x32 => self.op_ld_nn_a(bus),                             // LD (nn),A — 13
            0x3A => self.op_ld_a_nn(bus),                             // LD A,(nn) — 13

            0x08 => self.op_ex_af_af(),                               // EX AF,AF' — 4
            0xEB => self.op_ex_de_hl(),                               // EX DE,HL — 4
            0xD9 => self.op_exx(),                                    // EXX — 4
            0xE3 => self.op_ex_sp_hl(bus),                            // EX (SP),HL — 19

            0xF9 => { self.sp = self.get_hl_ix(); 6 }                 // LD SP,HL — 6

            // LD rr,nn — 10 T
            op if (op & 0xCF) == 0x01 => self.op_ld_rp_nn(op, bus),
            // LD r,n — 7 T
            op if (op & 0xC7) == 0x06 => self.op_ld_r_n(op, bus),
            // LD r,r' — 4/7 T
            op if (op & 0xC0) == 0x40 => self.op_ld_r_r(op, bus),

            // --- Stack ---
            op if (op & 0xCF) == 0xC5 => self.op_push(op, bus),       // PUSH — 11
            op if (op & 0xCF) == 0xC1 => self.op_pop(op, bus),        // POP — 10

            // --- ALU ---
            op if (op & 0xC0) == 0x80 => self.op_alu_r(op, bus),      // 4/7
            op if (op & 0xC7) == 0xC6 => self.op_alu_n(op, bus),      // 7
            op if (op & 0xC6) == 0x04 => self.op_inc_dec_r(op, bus),  // 4/11
            op if (op & 0xCF) == 0x09 => self.op_add_hl_rp(op),       // 11
            op if (op & 0xCF) == 0x03 => self.op_inc_dec_rp(op),      // 6
            op if (op & 0xCF) == 0x0B => self.op_inc_dec_rp(op),      // 6

            0x07 => self.op_rlca(),
            0x0F => self.op_rrca(),
            0x17 => self.op_rla(),
            0x1F => self.op_rra(),
            0x27 => self.op_daa(),
            0x2F => self.op_cpl(),
            0x37 => self.op_scf(),
            0x3F => self.op_ccf(),

            // --- Branch/control flow ---
            0xC3 => self.op_jp_nn(bus),                               // JP nn — 10
            0xE9 => { self.pc = self.get_hl_ix(); 4 }                 // JP (HL) — 4
            0x18 => self.op_jr_e(bus),                                // JR e — 12
            0x10 => self.op_djnz(bus),                                // DJNZ — 13/8
            0xCD => self.op_call_nn(bus),                             // CALL nn — 17
            0xC9 => self.op_ret(bus),                                 // RET — 10
            0xDB => self.op_in_a_n(bus),                              // IN A,(n) — 11
            0xD3 => self.op_out_n_a(bus),                             // OUT (n),A — 11

            0xF3 => {
                // DI — 4 T
                self.iff1 = false;
                self.iff2 = false;
                4
            }
            0xFB => {
                // EI — 4 T; acceptance deferred one instruction
                self.iff1 = true;
                self.iff2 = true;
                self.ei_delay = true;
                4
            }

            op if (op & 0xC7) == 0xC2 => self.op_jp_cc_nn(op, bus),   // JP cc — 10
            op if (op & 0xE7) == 0x20 => self.op_jr_cc_e(op, bus),    // JR cc — 12/7
            op if (op & 0xC7) == 0xC4 => self.op_call_cc_nn(op, bus), // CALL cc — 17/10
            op if (op & 0xC7) == 0xC0 => self.op_ret_cc(op, bus),     // RET cc — 11/5
            op if (op & 0xC7) == 0xC7 => self.op_rst(op, bus),        // RST — 11

            _ => 4,
        }
    }

    /// ED-prefixed dispatch. Undefined ED opcodes act as 8-T NOPs.
    fn execute_ed<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        match opcode {
            0x47 => { self.i = self.a; 9 }                            // LD I,A
            0x4F => { self.r = self.a; 9 }                            // LD R,A
            0x57 => self.op_ld_a_i(),                                 // LD A,I — 9
            0x5F => self.op_ld_a_r(),                                 // LD A,R — 9
            0x67 => self.op_rrd(bus),                                 // RRD — 18
            0x6F => self.op_rld(bus),                                 // RLD — 18

            // Block transfer/compare/IO
            0xA0 | 0xA8 => self.op_ldi_ldd(opcode, bus),              // LDI/LDD — 16
            0xA1 | 0xA9 => self.op_cpi_cpd(opcode, bus),              // CPI/CPD — 16
            0xA2 | 0xAA => self.op_ini_ind(opcode, bus),              // INI/IND — 16
            0xA3 | 0xAB => self.op_outi_outd(opcode, bus),            // OUTI/OUTD — 16
            0xB0 | 0xB8 => self.op_ldir_lddr(opcode, bus),            // LDIR/LDDR — 21/16
            0xB1 | 0xB9 => self.op_cpir_cpdr(opcode, bus),            // CPIR/CPDR — 21/16
            0xB2 | 0xBA => self.op_inir_indr(opcode, bus),            // INIR/INDR — 21/16
            0xB3 | 0xBB => self.op_otir_otdr(opcode, bus),            // OTIR/OTDR — 21/16

            op if (op & 0xC7) == 0x40 => self.op_in_r_c(op, bus),     // IN r,(C) — 12
            op if (op & 0xC7) == 0x41 => self.op_out_c_r(op, bus),    // OUT (C),r — 12
            op if (op & 0xCF) == 0x42 => self.op_sbc_hl_rp(op),       // SBC HL,rr — 15
            op if (op & 0xCF) == 0x43 => self.op_ld_nn_rp_ed(op, bus), // LD (nn),rr — 20
            op if (op & 0xC7) == 0x44 => self.op_neg(),               // NEG — 8
            op if (op & 0xC7) == 0x45 => self.op_retn(bus),           // RETN/RETI — 14
            op if (op & 0xC7) == 0x46 => self.op_im(op),              // IM 0/1/2 — 8
            op if (op & 0xCF) == 0x4A => self.op_adc_hl_rp(op),       // ADC HL,rr — 15
            op if (op & 0xCF) == 0x4B => self.op_ld_rp_nn_ed(op, bus), // LD rr,(nn) — 20

            _ => 8,
        }
    }

    fn op_im(&mut self, opcode: u8) -> u32 {
        self.im = match (opcode >> 3) & 0x03 {
            0 | 1 => 0,
            2 => 1,
            _ => 2,
        };
        8
    }
}

impl CpuStateTrait for Z80 {
    type Snapshot = Z80State;

    fn snapshot(&self) -> Z80State {
        Z80State {
            a: self.a,
            f: self.f,
            b: self.b,
            c: self.c,
            d: self.d,
            e: self.e,
            h: self.h,
            l: self.l,
            a_prime: self.a_prime,
            f_prime: self.f_prime,
            b_prime: self.b_prime,
            c_prime: self.c_prime,
            d_prime: self.d_prime,
            e_prime: self.e_prime,
            h_prime: self.h_prime,
            l_prime: self.l_prime,
            ix: self.ix,
            iy: self.iy,
            sp: self.sp,
            pc: self.pc,
            i: self.i,
            r: self.r,
            iff1: self.iff1,
            iff2: self.iff2,
            im: self.im,
            halted: self.halted,
            irq_line: self.irq_line,
            nmi_pending: self.nmi_pending,
            ei_delay: self.ei_delay,
        }
    }

    fn restore(&mut self, state: &Z80State) {
        self.a = state.a;
        self.f = state.f;
        self.b = state.b;
        self.c = state.c;
        self.d = state.d;
        self.e = state.e;
        self.h = state.h;
        self.l = state.l;
        self.a_prime = state.a_prime;
        self.f_prime = state.f_prime;
        self.b_prime = state.b_prime;
        self.c_prime = state.c_prime;
        self.d_prime = state.d_prime;
        self.e_prime = state.e_prime;
        self.h_prime = state.h_prime;
        self.l_prime = state.l_prime;
        self.ix = state.ix;
        self.iy = state.iy;
        self.sp = state.sp;
        self.pc = state.pc;
        self.i = state.i;
        self.r = state.r;
        self.iff1 = state.iff1;
        self.iff2 = state.iff2;
        self.im = state.im;
        self.halted = state.halted;
        self.irq_line = state.irq_line;
        self.nmi_pending = state.nmi_pending;
        self.ei_delay = state.ei_delay;
        self.index_mode = IndexMode::Hl;
    }
}
