use crate::core::Bus;
use crate::cpu::z80::{Flag, Z80};

impl Z80 {
    // --- Flag helpers ---

    pub(crate) fn parity(val: u8) -> bool {
        val.count_ones() % 2 == 0
    }

    fn set_flags_logic(&mut self, result: u8, is_and: bool) {
        let mut f = 0;
        if result == 0 { f |= Flag::Z as u8; }
        if (result & 0x80) != 0 { f |= Flag::S as u8; }
        if Self::parity(result) { f |= Flag::PV as u8; }
        if is_and { f |= Flag::H as u8; } // AND sets H, OR/XOR clear it
        f |= result & (Flag::X as u8 | Flag::Y as u8);
        self.f = f;
    }

    fn do_add(&mut self, val: u8, with_carry: bool) {
        let a = self.a;
        let c = if with_carry && (self.f & Flag::C as u8) != 0 { 1u8 } else { 0 };
        let wide = (a as u16) + (val as u16) + (c as u16);
        let result = wide as u8;

        let mut f = 0;
        if result == 0 { f |= Flag::Z as u8; }
        if (result & 0x80) != 0 { f |= Flag::S as u8; }
        if ((a & 0xF) + (val & 0xF) + c) > 0xF { f |= Flag::H as u8; }
        if ((a ^ result) & (val ^ result) & 0x80) != 0 { f |= Flag::PV as u8; }
        if wide > 0xFF { f |= Flag::C as u8; }
        f |= result & (Flag::X as u8 | Flag::Y as u8);

        self.a = result;
        self.f = f;
    }

    fn do_sub(&mut self, val: u8, with_carry: bool) {
        let a = self.a;
        let c = if with_carry && (self.f & Flag::C as u8) != 0 { 1u8 } else { 0 };
        let wide = (a as u16).wrapping_sub(val as u16).wrapping_sub(c as u16);
        let result = wide as u8;

        let mut f = Flag::N as u8;
        if result == 0 { f |= Flag::Z as u8; }
        if (result & 0x80) != 0 { f |= Flag::S as u8; }
        if (a & 0xF) < ((val & 0xF) + c) { f |= Flag::H as u8; }
        if ((a ^ val) & (a ^ result) & 0x80) != 0 { f |= Flag::PV as u8; }
        if wide > 0xFF { f |= Flag::C as u8; }
        f |= result & (Flag::X as u8 | Flag::Y as u8);

        self.a = result;
        self.f = f;
    }

    fn do_cp(&mut self, val: u8) {
        let a = self.a;
        let wide = (a as u16).wrapping_sub(val as u16);
        let result = wide as u8;

        let mut f = Flag::N as u8;
        if result == 0 { f |= Flag::Z as u8; }
        if (result & 0x80) != 0 { f |= Flag::S as u8; }
        if (a & 0xF) < (val & 0xF) { f |= Flag::H as u8; }
        if ((a ^ val) & (a ^ result) & 0x80) != 0 { f |= Flag::PV as u8; }
        if wide > 0xFF { f |= Flag::C as u8; }
        // CP copies X/Y from the operand, not the result
        f |= val & (Flag::X as u8 | Flag::Y as u8);
        self.f = f;
    }

    pub(crate) fn perform_alu_op(&mut self, op: u8, val: u8) {
        match op {
            0 => self.do_add(val, false),
            1 => self.do_add(val, true),
            2 => self.do_sub(val, false),
            3 => self.do_sub(val, true),
            4 => { self.a &= val; self.set_flags_logic(self.a, true); }
            5 => { self.a ^= val; self.set_flags_logic(self.a, false); }
            6 => { self.a |= val; self.set_flags_logic(self.a, false); }
            7 => self.do_cp(val),
            _ => unreachable!(),
        }
    }

    fn inc8(&mut self, val: u8) -> u8 {
        let result = val.wrapping_add(1);
        let mut f = self.f & Flag::C as u8; // C preserved
        if result == 0 { f |= Flag::Z as u8; }
        if (result & 0x80) != 0 { f |= Flag::S as u8; }
        if (val & 0xF) == 0xF { f |= Flag::H as u8; }
        if val == 0x7F { f |= Flag::PV as u8; }
        f |= result & (Flag::X as u8 | Flag::Y as u8);
        self.f = f;
        result
    }

    fn dec8(&mut self, val: u8) -> u8 {
        let result = val.wrapping_sub(1);
        let mut f = (self.f & Flag::C as u8) | Flag::N as u8;
        if result == 0 { f |= Flag::Z as u8; }
        if (result & 0x80) != 0 { f |= Flag::S as u8; }
        if (val & 0xF) == 0 { f |= Flag::H as u8; }
        if val == 0x80 { f |= Flag::PV as u8; }
        f |= result & (Flag::X as u8 | Flag::Y as u8);
        self.f = f;
        result
    }

    // --- Instructions ---

    /// ALU A, r — 4 T (reg) / 7 T ((HL)) / 19 T ((IX+d), incl. prefix)
    pub(crate) fn op_alu_r<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        let alu_op = (opcode >> 3) & 0x07;
        let r = opcode & 0x07;
        if r == 6 {
            let (addr, extra) = self.mem_operand(bus);
            let val = bus.read(addr);
            self.perform_alu_op(alu_op, val);
            7 + extra
        } else {
            let val = self.get_reg8_ix(r);
            self.perform_alu_op(alu_op, val);
            4
        }
    }

    /// ALU A, n — 7 T
    pub(crate) fn op_alu_n<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        let alu_op = (opcode >> 3) & 0x07;
        let val = self.read_imm(bus);
        self.perform_alu_op(alu_op, val);
        7
    }

    /// INC/DEC r — 4 T (reg) / 11 T ((HL)) / 23 T ((IX+d), incl. prefix)
    pub(crate) fn op_inc_dec_r<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        let r = (opcode >> 3) & 0x07;
        let is_dec = (opcode & 1) != 0;
        if r == 6 {
            let (addr, extra) = self.mem_operand(bus);
            let val = bus.read(addr);
            let result = if is_dec { self.dec8(val) } else { self.inc8(val) };
            bus.write(addr, result);
            11 + extra
        } else {
            let val = self.get_reg8_ix(r);
            let result = if is_dec { self.dec8(val) } else { self.inc8(val) };
            self.set_reg8_ix(r, result);
            4
        }
    }

    /// ADD HL,rr — 11 T. Only H/N/C (and X/Y) are affected.
    pub(crate) fn op_add_hl_rp(&mut self, opcode: u8) -> u32 {
        let rp = (opcode >> 4) & 0x03;
        let hl = self.get_hl_ix();
        let val = self.get_rp(rp);
        let wide = (hl as u32) + (val as u32);
        let result = wide as u16;

        let mut f = self.f & (Flag::S as u8 | Flag::Z as u8 | Flag::PV as u8);
        if ((hl & 0x0FFF) + (val & 0x0FFF)) > 0x0FFF { f |= Flag::H as u8; }
        if wide > 0xFFFF { f |= Flag::C as u8; }
        f |= ((result >> 8) as u8) & (Flag::X as u8 | Flag::Y as u8);
        self.f = f;

        self.set_hl_ix(result);
        11
    }

    /// ADC HL,rr (ED) — 15 T. Full flag set, Z from 16-bit result.
    pub(crate) fn op_adc_hl_rp(&mut self, opcode: u8) -> u32 {
        let rp = (opcode >> 4) & 0x03;
        let hl = self.get_hl();
        let val = self.get_rp(rp);
        let c = (self.f & Flag::C as u8) as u32;
        let wide = (hl as u32) + (val as u32) + c;
        let result = wide as u16;

        let mut f = 0;
        if result == 0 { f |= Flag::Z as u8; }
        if (result & 0x8000) != 0 { f |= Flag::S as u8; }
        if ((hl & 0x0FFF) + (val & 0x0FFF) + c as u16) > 0x0FFF { f |= Flag::H as u8; }
        if ((hl ^ result) & (val ^ result) & 0x8000) != 0 { f |= Flag::PV as u8; }
        if wide > 0xFFFF { f |= Flag::C as u8; }
        f |= ((result >> 8) as u8) & (Flag::X as u8 | Flag::Y as u8);
        self.f = f;

        self.set_hl(result);
        15
    }

    /// SBC HL,rr (ED) — 15 T.
    pub(crate) fn op_sbc_hl_rp(&mut self, opcode: u8) -> u32 {
        let rp = (opcode >> 4) & 0x03;
        let hl = self.get_hl();
        let val = self.get_rp(rp);
        let c = (self.f & Flag::C as u8) as u32;
        let wide = (hl as u32).wrapping_sub(val as u32).wrapping_sub(c);
        let result = wide as u16;

        let mut f = Flag::N as u8;
        if result == 0 { f |= Flag::Z as u8; }
        if (result & 0x8000) != 0 { f |= Flag::S as u8; }
        if (hl & 0x0FFF) < (val & 0x0FFF) + c as u16 { f |= Flag::H as u8; }
        if ((hl ^ val) & (hl ^ result) & 0x8000) != 0 { f |= Flag::PV as u8; }
        if wide > 0xFFFF { f |= Flag::C as u8; }
        f |= ((result >> 8) as u8) & (Flag::X as u8 | Flag::Y as u8);
        self.f = f;

        self.set_hl(result);
        15
    }

    /// INC/DEC rr — 6 T. No flags.
    pub(crate) fn op_inc_dec_rp(&mut self, opcode: u8) -> u32 {
        let rp = (opcode >> 4) & 0x03;
        let val = self.get_rp(rp);
        let result = if (opcode & 0x08) != 0 { val.wrapping_sub(1) } else { val.wrapping_add(1) };
        self.set_rp(rp, result);
        6
    }

    // --- Accumulator rotates — 4 T, only C/H/N (and X/Y) affected ---

    fn set_flags_acc_rotate(&mut self, carry: bool) {
        let mut f = self.f & (Flag::S as u8 | Flag::Z as u8 | Flag::PV as u8);
        if carry { f |= Flag::C as u8; }
        f |= self.a & (Flag::X as u8 | Flag::Y as u8);
        self.f = f;
    }

    pub(crate) fn op_rlca(&mut self) -> u32 {
        let carry = (self.a & 0x80) != 0;
        self.a = self.a.rotate_left(1);
        self.set_flags_acc_rotate(carry);
        4
    }

    pub(crate) fn op_rrca(&mut self) -> u32 {
        let carry = (self.a & 0x01) != 0;
        self.a = self.a.rotate_right(1);
        self.set_flags_acc_rotate(carry);
        4
    }

    pub(crate) fn op_rla(&mut self) -> u32 {
        let carry = (self.a & 0x80) != 0;
        let old_c = if (self.f & Flag::C as u8) != 0 { 1 } else { 0 };
        self.a = (self.a << 1) | old_c;
        self.set_flags_acc_rotate(carry);
        4
    }

    pub(crate) fn op_rra(&mut self) -> u32 {
        let carry = (self.a & 0x01) != 0;
        let old_c = if (self.f & Flag::C as u8) != 0 { 0x80 } else { 0 };
        self.a = (self.a >> 1) | old_c;
        self.set_flags_acc_rotate(carry);
        4
    }

    /// DAA — 4 T. BCD correction of A after ADD/SUB.
    pub(crate) fn op_daa(&mut self) -> u32 {
        let a = self.a;
        let n = (self.f & Flag::N as u8) != 0;
        let h = (self.f & Flag::H as u8) != 0;
        let c = (self.f & Flag::C as u8) != 0;

        let mut correction = 0u8;
        let mut carry_out = false;
        if h || (a & 0x0F) > 0x09 {
            correction |= 0x06;
        }
        if c || a > 0x99 {
            correction |= 0x60;
            carry_out = true;
        }
        let result = if n { a.wrapping_sub(correction) } else { a.wrapping_add(correction) };

        let mut f = self.f & Flag::N as u8;
        if result == 0 { f |= Flag::Z as u8; }
        if (result & 0x80) != 0 { f |= Flag::S as u8; }
        if ((a ^ result) & 0x10) != 0 { f |= Flag::H as u8; }
        if Self::parity(result) { f |= Flag::PV as u8; }
        if carry_out { f |= Flag::C as u8; }
        f |= result & (Flag::X as u8 | Flag::Y as u8);

        self.a = result;
        self.f = f;
        4
    }

    /// CPL — 4 T.
    pub(crate) fn op_cpl(&mut self) -> u32 {
        self.a = !self.a;
        let mut f = self.f & (Flag::S as u8 | Flag::Z as u8 | Flag::PV as u8 | Flag::C as u8);
        f |= Flag::H as u8 | Flag::N as u8;
        f |= self.a & (Flag::X as u8 | Flag::Y as u8);
        self.f = f;
        4
    }

    /// SCF — 4 T.
    pub(crate) fn op_scf(&mut self) -> u32 {
        let mut f = self.f & (Flag::S as u8 | Flag::Z as u8 | Flag::PV as u8);
        f |= Flag::C as u8;
        f |= self.a & (Flag::X as u8 | Flag::Y as u8);
        self.f = f;
        4
    }

    /// CCF — 4 T. Previous carry moves to H.
    pub(crate) fn op_ccf(&mut self) -> u32 {
        let old_c = (self.f & Flag::C as u8) != 0;
        let mut f = self.f & (Flag::S as u8 | Flag::Z as u8 | Flag::PV as u8);
        if old_c { f |= Flag::H as u8; } else { f |= Flag::C as u8; }
        f |= self.a & (Flag::X as u8 | Flag::Y as u8);
        self.f = f;
        4
    }

    /// NEG (ED) — 8 T. A = 0 - A.
    pub(crate) fn op_neg(&mut self) -> u32 {
        let val = self.a;
        self.a = 0;
        self.do_sub(val, false);
        8
    }

    /// RRD (ED) — 18 T. Rotate BCD digits right through (HL) and A.
    pub(crate) fn op_rrd<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let addr = self.get_hl();
        let mem = bus.read(addr);
        let new_mem = (mem >> 4) | (self.a << 4);
        self.a = (self.a & 0xF0) | (mem & 0x0F);
        bus.write(addr, new_mem);
        self.set_flags_digit_rotate();
        18
    }

    /// RLD (ED) — 18 T. Rotate BCD digits left through (HL) and A.
    pub(crate) fn op_rld<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let addr = self.get_hl();
        let mem = bus.read(addr);
        let new_mem = (mem << 4) | (self.a & 0x0F);
        self.a = (self.a & 0xF0) | (mem >> 4);
        bus.write(addr, new_mem);
        self.set_flags_digit_rotate();
        18
    }

    fn set_flags_digit_rotate(&mut self) {
        let mut f = self.f & Flag::C as u8;
        if self.a == 0 { f |= Flag::Z as u8; }
        if (self.a & 0x80) != 0 { f |= Flag::S as u8; }
        if Self::parity(self.a) { f |= Flag::PV as u8; }
        f |= self.a & (Flag::X as u8 | Flag::Y as u8);
        self.f = f;
    }
}
