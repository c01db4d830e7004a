use crate::core::Bus;
use crate::cpu::z80::{Flag, IndexMode, Z80};

impl Z80 {
    /// Apply a CB rotate/shift (group bits 5-3) to a value, setting flags.
    fn cb_rotate(&mut self, kind: u8, val: u8) -> u8 {
        let old_c = (self.f & Flag::C as u8) != 0;
        let (result, carry) = match kind {
            0 => (val.rotate_left(1), (val & 0x80) != 0),              // RLC
            1 => (val.rotate_right(1), (val & 0x01) != 0),             // RRC
            2 => ((val << 1) | old_c as u8, (val & 0x80) != 0),        // RL
            3 => ((val >> 1) | ((old_c as u8) << 7), (val & 0x01) != 0), // RR
            4 => (val << 1, (val & 0x80) != 0),                        // SLA
            5 => (((val as i8) >> 1) as u8, (val & 0x01) != 0),        // SRA
            6 => ((val << 1) | 1, (val & 0x80) != 0),                  // SLL (undocumented)
            7 => (val >> 1, (val & 0x01) != 0),                        // SRL
            _ => unreachable!(),
        };

        let mut f = 0;
        if result == 0 { f |= Flag::Z as u8; }
        if (result & 0x80) != 0 { f |= Flag::S as u8; }
        if Self::parity(result) { f |= Flag::PV as u8; }
        if carry { f |= Flag::C as u8; }
        f |= result & (Flag::X as u8 | Flag::Y as u8);
        self.f = f;
        result
    }

    fn cb_bit(&mut self, bit: u8, val: u8) {
        let set = val & (1 << bit) != 0;
        let mut f = (self.f & Flag::C as u8) | Flag::H as u8;
        if !set { f |= Flag::Z as u8 | Flag::PV as u8; }
        if set && bit == 7 { f |= Flag::S as u8; }
        f |= val & (Flag::X as u8 | Flag::Y as u8);
        self.f = f;
    }

    /// CB-prefixed dispatch. Register forms 8 T; (HL) forms 12 T for
    /// BIT and 15 T otherwise. DD CB / FD CB route through
    /// `execute_index_cb`.
    pub(crate) fn execute_cb<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        if self.index_mode != IndexMode::Hl {
            return self.execute_index_cb(bus);
        }

        let opcode = self.fetch(bus);
        let group = opcode >> 6;
        let y = (opcode >> 3) & 0x07;
        let r = opcode & 0x07;

        if r == 6 {
            let addr = self.get_hl();
            let val = bus.read(addr);
            match group {
                0 => {
                    let result = self.cb_rotate(y, val);
                    bus.write(addr, result);
                    15
                }
                1 => {
                    self.cb_bit(y, val);
                    12
                }
                2 => {
                    bus.write(addr, val & !(1 << y));
                    15
                }
                _ => {
                    bus.write(addr, val | (1 << y));
                    15
                }
            }
        } else {
            let val = self.get_reg8(r);
            match group {
                0 => {
                    let result = self.cb_rotate(y, val);
                    self.set_reg8(r, result);
                }
                1 => self.cb_bit(y, val),
                2 => self.set_reg8(r, val & !(1 << y)),
                _ => self.set_reg8(r, val | (1 << y)),
            }
            8
        }
    }

    /// DD CB d op / FD CB d op — 20 T for BIT, 23 T otherwise (incl.
    /// prefix). All forms operate on (IX+d); the non-BIT forms also
    /// copy the result into the register named by the low three bits
    /// (undocumented).
    fn execute_index_cb<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let d = self.read_imm(bus) as i8;
        // The sub-opcode is read as data, not an M1 cycle: no R refresh.
        let opcode = self.read_imm(bus);
        let base = match self.index_mode {
            IndexMode::Ix => self.ix,
            IndexMode::Iy => self.iy,
            IndexMode::Hl => unreachable!(),
        };
        let addr = base.wrapping_add(d as u16);
        let group = opcode >> 6;
        let y = (opcode >> 3) & 0x07;
        let r = opcode & 0x07;

        let val = bus.read(addr);
        match group {
            1 => {
                self.cb_bit(y, val);
                16
            }
            _ => {
                let result = match group {
                    0 => self.cb_rotate(y, val),
                    2 => val & !(1 << y),
                    _ => val | (1 << y),
                };
                bus.write(addr, result);
                if r != 6 {
                    self.set_reg8(r, result);
                }
                19
            }
        }
    }
}
