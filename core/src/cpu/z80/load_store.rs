use crate::core::Bus;
use crate::cpu::z80::{Flag, Z80};

impl Z80 {
    /// LD rr,nn — 10 T (14 T for IX/IY incl. prefix)
    pub(crate) fn op_ld_rp_nn<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        let rp = (opcode >> 4) & 0x03;
        let val = self.read_imm16(bus);
        self.set_rp(rp, val);
        10
    }

    /// LD r,n — 7 T. LD (HL),n — 10 T. LD (IX+d),n — 19 T incl. prefix.
    pub(crate) fn op_ld_r_n<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        let r = (opcode >> 3) & 0x07;
        if r == 6 {
            // Indexed form fetches d then n; the operand reads overlap,
            // so it costs 5 extra T rather than the usual 8.
            let (addr, extra) = self.mem_operand(bus);
            let val = self.read_imm(bus);
            bus.write(addr, val);
            10 + if extra != 0 { 5 } else { 0 }
        } else {
            let val = self.read_imm(bus);
            self.set_reg8_ix(r, val);
            7
        }
    }

    /// LD r,r' — 4 T. Memory forms 7 T ((HL)) / 19 T ((IX+d) incl. prefix).
    pub(crate) fn op_ld_r_r<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        let dst = (opcode >> 3) & 0x07;
        let src = opcode & 0x07;
        match (dst, src) {
            (6, _) => {
                // LD (HL),r: the register operand is always plain H/L,
                // even under a DD/FD prefix.
                let (addr, extra) = self.mem_operand(bus);
                bus.write(addr, self.get_reg8(src));
                7 + extra
            }
            (_, 6) => {
                let (addr, extra) = self.mem_operand(bus);
                let val = bus.read(addr);
                self.set_reg8(dst, val);
                7 + extra
            }
            _ => {
                let val = self.get_reg8_ix(src);
                self.set_reg8_ix(dst, val);
                4
            }
        }
    }

    /// LD (nn),A — 13 T
    pub(crate) fn op_ld_nn_a<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let addr = self.read_imm16(bus);
        bus.write(addr, self.a);
        13
    }

    /// LD A,(nn) — 13 T
    pub(crate) fn op_ld_a_nn<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let addr = self.read_imm16(bus);
        self.a = bus.read(addr);
        13
    }

    /// LD (nn),HL — 16 T (20 T for IX/IY incl. prefix)
    pub(crate) fn op_ld_nn_hl<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let addr = self.read_imm16(bus);
        let val = self.get_hl_ix();
        bus.write(addr, val as u8);
        bus.write(addr.wrapping_add(1), (val >> 8) as u8);
        16
    }

    /// LD HL,(nn) — 16 T (20 T for IX/IY incl. prefix)
    pub(crate) fn op_ld_hl_nn<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let addr = self.read_imm16(bus);
        let lo = bus.read(addr);
        let hi = bus.read(addr.wrapping_add(1));
        self.set_hl_ix(u16::from_le_bytes([lo, hi]));
        16
    }

    /// LD (nn),rr (ED) — 20 T
    pub(crate) fn op_ld_nn_rp_ed<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        let rp = (opcode >> 4) & 0x03;
        let addr = self.read_imm16(bus);
        let val = self.get_rp(rp);
        bus.write(addr, val as u8);
        bus.write(addr.wrapping_add(1), (val >> 8) as u8);
        20
    }

    /// LD rr,(nn) (ED) — 20 T
    pub(crate) fn op_ld_rp_nn_ed<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        let rp = (opcode >> 4) & 0x03;
        let addr = self.read_imm16(bus);
        let lo = bus.read(addr);
        let hi = bus.read(addr.wrapping_add(1));
        self.set_rp(rp, u16::from_le_bytes([lo, hi]));
        20
    }

    /// LD A,I (ED) — 9 T. PV mirrors IFF2.
    pub(crate) fn op_ld_a_i(&mut self) -> u32 {
        self.a = self.i;
        self.set_flags_ld_ir();
        9
    }

    /// LD A,R (ED) — 9 T. PV mirrors IFF2.
    pub(crate) fn op_ld_a_r(&mut self) -> u32 {
        self.a = self.r;
        self.set_flags_ld_ir();
        9
    }

    fn set_flags_ld_ir(&mut self) {
        let mut f = self.f & Flag::C as u8;
        if self.a == 0 { f |= Flag::Z as u8; }
        if (self.a & 0x80) != 0 { f |= Flag::S as u8; }
        if self.iff2 { f |= Flag::PV as u8; }
        f |= self.a & (Flag::X as u8 | Flag::Y as u8);
        self.f = f;
    }

    /// EX AF,AF' — 4 T
    pub(crate) fn op_ex_af_af(&mut self) -> u32 {
        core::mem::swap(&mut self.a, &mut self.a_prime);
        core::mem::swap(&mut self.f, &mut self.f_prime);
        4
    }

    /// EX DE,HL — 4 T. Not affected by DD/FD prefixes.
    pub(crate) fn op_ex_de_hl(&mut self) -> u32 {
        core::mem::swap(&mut self.d, &mut self.h);
        core::mem::swap(&mut self.e, &mut self.l);
        4
    }

    /// EXX — 4 T
    pub(crate) fn op_exx(&mut self) -> u32 {
        core::mem::swap(&mut self.b, &mut self.b_prime);
        core::mem::swap(&mut self.c, &mut self.c_prime);
        core::mem::swap(&mut self.d, &mut self.d_prime);
        core::mem::swap(&mut self.e, &mut self.e_prime);
        core::mem::swap(&mut self.h, &mut self.h_prime);
        core::mem::swap(&mut self.l, &mut self.l_prime);
        4
    }

    /// EX (SP),HL — 19 T (23 T for IX/IY incl. prefix)
    pub(crate) fn op_ex_sp_hl<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let lo = bus.read(self.sp);
        let hi = bus.read(self.sp.wrapping_add(1));
        let old = self.get_hl_ix();
        bus.write(self.sp, old as u8);
        bus.write(self.sp.wrapping_add(1), (old >> 8) as u8);
        self.set_hl_ix(u16::from_le_bytes([lo, hi]));
        19
    }

    /// IN A,(n) — 11 T. A supplies the upper address byte.
    pub(crate) fn op_in_a_n<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let lo = self.read_imm(bus);
        let port = ((self.a as u16) << 8) | lo as u16;
        self.a = bus.io_read(port);
        11
    }

    /// OUT (n),A — 11 T
    pub(crate) fn op_out_n_a<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let lo = self.read_imm(bus);
        let port = ((self.a as u16) << 8) | lo as u16;
        bus.io_write(port, self.a);
        11
    }

    /// IN r,(C) (ED) — 12 T. r=6 sets flags only (undocumented IN (C)).
    pub(crate) fn op_in_r_c<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        let r = (opcode >> 3) & 0x07;
        let val = bus.io_read(self.get_bc());
        if r != 6 {
            self.set_reg8(r, val);
        }
        let mut f = self.f & Flag::C as u8;
        if val == 0 { f |= Flag::Z as u8; }
        if (val & 0x80) != 0 { f |= Flag::S as u8; }
        if Self::parity(val) { f |= Flag::PV as u8; }
        f |= val & (Flag::X as u8 | Flag::Y as u8);
        self.f = f;
        12
    }

    /// OUT (C),r (ED) — 12 T. r=6 outputs 0 (undocumented OUT (C),0).
    pub(crate) fn op_out_c_r<B: Bus + ?Sized>(&mut self, opcode: u8, bus: &mut B) -> u32 {
        let r = (opcode >> 3) & 0x07;
        let val = if r == 6 { 0 } else { self.get_reg8(r) };
        bus.io_write(self.get_bc(), val);
        12
    }
}
