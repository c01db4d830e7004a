use crate::core::Bus;
use crate::cpu::z80::{Flag, Z80};

impl Z80 {
    /// Evaluate a condition code (3 bits from opcode bits 5-3).
    /// 0=NZ, 1=Z, 2=NC, 3=C, 4=PO, 5=PE, 6=P, 7=M
    pub(crate) fn eval_condition(&self, cc: u8) -> bool {
        match cc {
            0 => (self.f & Flag::Z as u8) == 0,
            1 => (self.f & Flag::Z as u8) != 0,
            2 => (self.f & Flag::C as u8) == 0,
            3 => (self.f & Flag::C as u8) != 0,
            4 => (self.f & Flag::PV as u8) == 0,
            5 => (self.f & Flag::PV as u8) != 0,
            6 => (self.f & Flag::S as u8) == 0,
            7 => (self.f & Flag::S as u8) != 0,
            _ => unreachable!(),
        }
    }

    /// JP nn — 10 T
    pub(crate) fn op_jp_nn<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        self.pc = self.read_imm16(bus);
        10
    }

    /// JP cc,nn — 10 T whether taken or not
    pub(crate) fn op_jp_cc_nn<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        let cc = (opcode >> 3) & 0x07;
        let addr = self.read_imm16(bus);
        if self.eval_condition(cc) {
            self.pc = addr;
        }
        10
    }

    /// JR e — 12 T
    pub(crate) fn op_jr_e<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let disp = self.read_imm(bus) as i8;
        self.pc = self.pc.wrapping_add(disp as u16);
        12
    }

    /// JR cc,e — 12 T taken / 7 T not taken. Only NZ/Z/NC/C.
    pub(crate) fn op_jr_cc_e<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        let cc = (opcode >> 3) & 0x03;
        let disp = self.read_imm(bus) as i8;
        if self.eval_condition(cc) {
            self.pc = self.pc.wrapping_add(disp as u16);
            12
        } else {
            7
        }
    }

    /// DJNZ e — 13 T taken / 8 T not taken
    pub(crate) fn op_djnz<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let disp = self.read_imm(bus) as i8;
        self.b = self.b.wrapping_sub(1);
        if self.b != 0 {
            self.pc = self.pc.wrapping_add(disp as u16);
            13
        } else {
            8
        }
    }

    /// CALL nn — 17 T
    pub(crate) fn op_call_nn<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let addr = self.read_imm16(bus);
        self.push_word(bus, self.pc);
        self.pc = addr;
        17
    }

    /// CALL cc,nn — 17 T taken / 10 T not taken
    pub(crate) fn op_call_cc_nn<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        let cc = (opcode >> 3) & 0x07;
        let addr = self.read_imm16(bus);
        if self.eval_condition(cc) {
            self.push_word(bus, self.pc);
            self.pc = addr;
            17
        } else {
            10
        }
    }

    /// RET — 10 T
    pub(crate) fn op_ret<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        self.pc = self.pop_word(bus);
        10
    }

    /// RET cc — 11 T taken / 5 T not taken
    pub(crate) fn op_ret_cc<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        let cc = (opcode >> 3) & 0x07;
        if self.eval_condition(cc) {
            self.pc = self.pop_word(bus);
            11
        } else {
            5
        }
    }

    /// RST p — 11 T
    pub(crate) fn op_rst<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        self.push_word(bus, self.pc);
        self.pc = (opcode & 0x38) as u16;
        11
    }
}
