//! Save-state codec.
//!
//! A state is a fixed-size little-endian blob: a 22-byte header
//! (magic, version, ROM CRC-32, payload CRC-32) followed by the full
//! CPU register file, both RAMs, the mapper registers, and the VDP,
//! PSG, and controller state. The ROM CRC binds a state to the image
//! it was taken from; the payload CRC catches corruption. Decoding
//! verifies everything before any machine state is touched.

use markiii_core::cpu::Z80State;
use markiii_core::device::{PsgState, VdpState};

use crate::sms::memory::{CARTRIDGE_RAM_SIZE, MemoryState, SYSTEM_RAM_SIZE};
use crate::sms::rom_db::crc32;

pub const MAGIC: &[u8; 12] = b"eMkIIISState";
pub const VERSION: u16 = 1;

const HEADER_SIZE: usize = 12 + 2 + 4 + 4;

const VRAM_SIZE: usize = 0x4000;
const CRAM_SIZE: usize = 32;

// CPU register file incl. alternates, IFF/IM/HALT and interrupt latches
const CPU_SIZE: usize = 16 + 8 + 2 + 7;
// addr, addr latch, write latch, code, read buffer
const VDP_PORT_SIZE: usize = 2 + 1 + 1 + 1 + 1;
const VDP_SIZE: usize = VRAM_SIZE
    + 2 * CRAM_SIZE
    + 16
    + VDP_PORT_SIZE
    + 1   // status
    + 2   // v counter
    + 1   // h counter
    + 2   // line counter
    + 1   // line interrupt pending
    + 4   // per-line/per-frame latches
    + 1;  // interrupt check required
const PSG_SIZE: usize = 6 + 6 + 3 + 1 + 2 + 2 + 1 + 4 + 1 + 1 + 4 + 1;

const PAYLOAD_SIZE: usize =
    CPU_SIZE + SYSTEM_RAM_SIZE + CARTRIDGE_RAM_SIZE + 3 + 1 + VDP_SIZE + PSG_SIZE + 2;

/// Total size of a serialized state in bytes.
pub const SERIALIZED_SIZE: usize = HEADER_SIZE + PAYLOAD_SIZE;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
pub enum SaveStateError {
    /// Buffer smaller than a complete state.
    TooShort { expected: usize, actual: usize },

    /// The first 12 bytes are not the state magic.
    InvalidMagic,

    /// Stored version is newer than this codec understands.
    UnsupportedVersion { version: u16 },

    /// State was taken from a different ROM image.
    RomMismatch { expected: u32, actual: u32 },

    /// Payload CRC-32 does not match the payload bytes.
    Corrupted,
}

impl std::fmt::Display for SaveStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort { expected, actual } => {
                write!(f, "save state too short: expected {expected} bytes, got {actual}")
            }
            Self::InvalidMagic => write!(f, "not a save state (bad magic)"),
            Self::UnsupportedVersion { version } => {
                write!(f, "save state version {version} is newer than supported ({VERSION})")
            }
            Self::RomMismatch { expected, actual } => write!(
                f,
                "save state is for a different ROM (CRC 0x{actual:08X}, loaded 0x{expected:08X})"
            ),
            Self::Corrupted => write!(f, "save state data CRC mismatch"),
        }
    }
}

impl std::error::Error for SaveStateError {}

// ---------------------------------------------------------------------------
// Byte-level plumbing
// ---------------------------------------------------------------------------

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { buf: Vec::with_capacity(SERIALIZED_SIZE) }
    }

    fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn put_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }
}

/// Cursor over a length-verified payload; all reads are in bounds.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take_u8(&mut self) -> u8 {
        let v = self.buf[self.pos];
        self.pos += 1;
        v
    }

    fn take_bool(&mut self) -> bool {
        self.take_u8() != 0
    }

    fn take_u16(&mut self) -> u16 {
        u16::from_le_bytes([self.take_u8(), self.take_u8()])
    }

    fn take_u32(&mut self) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take_bytes(4));
        u32::from_le_bytes(b)
    }

    fn take_i16(&mut self) -> i16 {
        self.take_u16() as i16
    }

    fn take_f32(&mut self) -> f32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take_bytes(4));
        f32::from_le_bytes(b)
    }

    fn take_bytes(&mut self, n: usize) -> &'a [u8] {
        let v = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        v
    }
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

/// Everything a state restores. Produced whole by `decode` so the
/// machine only mutates itself after every check has passed.
pub struct StateSnapshot {
    pub cpu: Z80State,
    pub memory: MemoryState,
    pub vdp: VdpState,
    pub psg: PsgState,
    pub port1: u8,
    pub port2: u8,
}

pub fn encode(state: &StateSnapshot, rom_crc: u32) -> Vec<u8> {
    let mut w = Writer::new();
    w.put_bytes(MAGIC);
    w.put_u16(VERSION);
    w.put_u32(rom_crc);
    w.put_u32(0); // payload CRC, patched below

    let cpu = &state.cpu;
    for v in [
        cpu.a, cpu.f, cpu.b, cpu.c, cpu.d, cpu.e, cpu.h, cpu.l,
        cpu.a_prime, cpu.f_prime, cpu.b_prime, cpu.c_prime,
        cpu.d_prime, cpu.e_prime, cpu.h_prime, cpu.l_prime,
    ] {
        w.put_u8(v);
    }
    w.put_u16(cpu.ix);
    w.put_u16(cpu.iy);
    w.put_u16(cpu.sp);
    w.put_u16(cpu.pc);
    w.put_u8(cpu.i);
    w.put_u8(cpu.r);
    w.put_bool(cpu.iff1);
    w.put_bool(cpu.iff2);
    w.put_u8(cpu.im);
    w.put_bool(cpu.halted);
    w.put_bool(cpu.irq_line);
    w.put_bool(cpu.nmi_pending);
    w.put_bool(cpu.ei_delay);

    w.put_bytes(&state.memory.system_ram[..]);
    w.put_bytes(&state.memory.cart_ram[..]);
    w.put_bytes(&state.memory.bank_slots);
    w.put_u8(state.memory.ram_control);

    let vdp = &state.vdp;
    w.put_bytes(&vdp.vram[..]);
    w.put_bytes(&vdp.cram);
    w.put_bytes(&vdp.cram_latch);
    w.put_bytes(&vdp.registers);
    w.put_u16(vdp.addr);
    w.put_u8(vdp.addr_latch);
    w.put_bool(vdp.write_latch);
    w.put_u8(vdp.code);
    w.put_u8(vdp.read_buffer);
    w.put_u8(vdp.status);
    w.put_u16(vdp.v_counter);
    w.put_u8(vdp.h_counter);
    w.put_i16(vdp.line_counter);
    w.put_bool(vdp.line_int_pending);
    w.put_u8(vdp.h_scroll_latch);
    w.put_u8(vdp.reg2_latch);
    w.put_u8(vdp.reg7_latch);
    w.put_u8(vdp.v_scroll_latch);
    w.put_bool(vdp.interrupt_check_required);

    let psg = &state.psg;
    for divider in psg.tone_dividers {
        w.put_u16(divider);
    }
    for counter in psg.tone_counters {
        w.put_u16(counter);
    }
    for output in psg.tone_outputs {
        w.put_bool(output);
    }
    w.put_u8(psg.noise_control);
    w.put_u16(psg.noise_counter);
    w.put_u16(psg.noise_lfsr);
    w.put_bool(psg.noise_output);
    w.put_bytes(&psg.volumes);
    w.put_u8(psg.latched_channel);
    w.put_bool(psg.latched_volume);
    w.put_f32(psg.sample_counter);
    w.put_u8(psg.prescaler_count);

    w.put_u8(state.port1);
    w.put_u8(state.port2);

    debug_assert_eq!(w.buf.len(), SERIALIZED_SIZE);

    let data_crc = crc32(&w.buf[HEADER_SIZE..]);
    w.buf[18..22].copy_from_slice(&data_crc.to_le_bytes());
    w.buf
}

pub fn decode(bytes: &[u8], rom_crc: u32) -> Result<StateSnapshot, SaveStateError> {
    if bytes.len() < SERIALIZED_SIZE {
        return Err(SaveStateError::TooShort {
            expected: SERIALIZED_SIZE,
            actual: bytes.len(),
        });
    }
    if &bytes[0..12] != MAGIC {
        return Err(SaveStateError::InvalidMagic);
    }
    let version = u16::from_le_bytes([bytes[12], bytes[13]]);
    if version > VERSION {
        return Err(SaveStateError::UnsupportedVersion { version });
    }
    let stored_rom_crc = u32::from_le_bytes([bytes[14], bytes[15], bytes[16], bytes[17]]);
    if stored_rom_crc != rom_crc {
        return Err(SaveStateError::RomMismatch {
            expected: rom_crc,
            actual: stored_rom_crc,
        });
    }
    let stored_data_crc = u32::from_le_bytes([bytes[18], bytes[19], bytes[20], bytes[21]]);
    if crc32(&bytes[HEADER_SIZE..SERIALIZED_SIZE]) != stored_data_crc {
        return Err(SaveStateError::Corrupted);
    }

    let mut r = Reader::new(&bytes[HEADER_SIZE..SERIALIZED_SIZE]);

    let cpu = Z80State {
        a: r.take_u8(),
        f: r.take_u8(),
        b: r.take_u8(),
        c: r.take_u8(),
        d: r.take_u8(),
        e: r.take_u8(),
        h: r.take_u8(),
        l: r.take_u8(),
        a_prime: r.take_u8(),
        f_prime: r.take_u8(),
        b_prime: r.take_u8(),
        c_prime: r.take_u8(),
        d_prime: r.take_u8(),
        e_prime: r.take_u8(),
        h_prime: r.take_u8(),
        l_prime: r.take_u8(),
        ix: r.take_u16(),
        iy: r.take_u16(),
        sp: r.take_u16(),
        pc: r.take_u16(),
        i: r.take_u8(),
        r: r.take_u8(),
        iff1: r.take_bool(),
        iff2: r.take_bool(),
        im: r.take_u8(),
        halted: r.take_bool(),
        irq_line: r.take_bool(),
        nmi_pending: r.take_bool(),
        ei_delay: r.take_bool(),
    };

    let mut system_ram = Box::new([0u8; SYSTEM_RAM_SIZE]);
    system_ram.copy_from_slice(r.take_bytes(SYSTEM_RAM_SIZE));
    let mut cart_ram = Box::new([0u8; CARTRIDGE_RAM_SIZE]);
    cart_ram.copy_from_slice(r.take_bytes(CARTRIDGE_RAM_SIZE));
    let mut bank_slots = [0u8; 3];
    bank_slots.copy_from_slice(r.take_bytes(3));
    let memory = MemoryState {
        system_ram,
        cart_ram,
        bank_slots,
        ram_control: r.take_u8(),
    };

    let mut vram = Box::new([0u8; VRAM_SIZE]);
    vram.copy_from_slice(r.take_bytes(VRAM_SIZE));
    let mut cram = [0u8; CRAM_SIZE];
    cram.copy_from_slice(r.take_bytes(CRAM_SIZE));
    let mut cram_latch = [0u8; CRAM_SIZE];
    cram_latch.copy_from_slice(r.take_bytes(CRAM_SIZE));
    let mut registers = [0u8; 16];
    registers.copy_from_slice(r.take_bytes(16));
    let vdp = VdpState {
        vram,
        cram,
        cram_latch,
        registers,
        addr: r.take_u16(),
        addr_latch: r.take_u8(),
        write_latch: r.take_bool(),
        code: r.take_u8(),
        read_buffer: r.take_u8(),
        status: r.take_u8(),
        v_counter: r.take_u16(),
        h_counter: r.take_u8(),
        line_counter: r.take_i16(),
        line_int_pending: r.take_bool(),
        h_scroll_latch: r.take_u8(),
        reg2_latch: r.take_u8(),
        reg7_latch: r.take_u8(),
        v_scroll_latch: r.take_u8(),
        interrupt_check_required: r.take_bool(),
    };

    let psg = PsgState {
        tone_dividers: [r.take_u16(), r.take_u16(), r.take_u16()],
        tone_counters: [r.take_u16(), r.take_u16(), r.take_u16()],
        tone_outputs: [r.take_bool(), r.take_bool(), r.take_bool()],
        noise_control: r.take_u8(),
        noise_counter: r.take_u16(),
        noise_lfsr: r.take_u16(),
        noise_output: r.take_bool(),
        volumes: {
            let mut v = [0u8; 4];
            v.copy_from_slice(r.take_bytes(4));
            v
        },
        latched_channel: r.take_u8(),
        latched_volume: r.take_bool(),
        sample_counter: r.take_f32(),
        prescaler_count: r.take_u8(),
    };

    let port1 = r.take_u8();
    let port2 = r.take_u8();

    Ok(StateSnapshot { cpu, memory, vdp, psg, port1, port2 })
}
