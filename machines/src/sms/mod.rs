//! Sega Master System (Mark III)
//!
//! Hardware: Zilog Z80A at ~3.58 MHz, Sega 315-5124 VDP, SN76489 PSG,
//! 8 KiB work RAM, ROM cartridges of up to 2 MiB behind a banking
//! mapper. Video: 256x192 (or 256x224) mode-4 tilemap plus 64 sprites.
//!
//! The frame scheduler is scanline-granular with sub-scanline event
//! dispatch: each line's CPU budget is taken from a 16.16 fixed-point
//! accumulator, and within a line the VBlank flag, the line-interrupt
//! counter, and the CRAM/per-line register latches fire at fixed cycle
//! offsets. That ordering is what makes raster tricks (mid-screen
//! palette swaps, scroll splits, the EI; HALT frame-sync idiom) behave
//! as on hardware.

pub mod io;
pub mod memory;
pub mod rom_db;
pub mod save_state;
pub mod timing;

use markiii_core::core::{FrameView, Machine};
use markiii_core::cpu::{CpuStateTrait, Z80};
use markiii_core::device::sn76489::SAMPLE_RATE;
use markiii_core::device::{SmsVdp, Sn76489};

use crate::registry::MachineEntry;
use io::IoPorts;
use memory::{CARTRIDGE_RAM_SIZE, MapperKind, Memory};
use save_state::{SaveStateError, StateSnapshot};
use timing::Region;

// Cycle offsets within a scanline at which the VDP events fire
const VBLANK_IRQ_CYCLE: u32 = 4;
const LINE_IRQ_CYCLE: u32 = 8;
const CRAM_LATCH_CYCLE: u32 = 14;

/// Everything the CPU can see: the mapper, the VDP and PSG behind the
/// port decoder, and the controller ports. Borrowed by the Z80 for the
/// duration of each instruction step.
pub struct SmsBus {
    pub memory: Memory,
    pub vdp: SmsVdp,
    pub psg: Sn76489,
    pub ports: IoPorts,
}

pub struct MasterSystem {
    cpu: Z80,
    bus: SmsBus,
    region: Region,
    rom_crc: u32,

    crop_border: bool,

    /// Previous pause-bit state for rising-edge NMI dispatch.
    prev_pause: bool,

    // Per-frame audio: mono float scratch, then int16 stereo out
    frame_samples: Vec<f32>,
    audio_buffer: Vec<i16>,
}

impl MasterSystem {
    /// Build an emulator for a raw `.sms` image with an explicit
    /// region. The mapper comes from the ROM database (Sega fallback).
    pub fn new(rom: Vec<u8>, region: Region) -> Self {
        let rom = rom_db::strip_copier_header(rom);
        let rom_crc = rom_db::crc32(&rom);
        let mapper = rom_db::identify(rom_crc).mapper;
        Self::build(rom, rom_crc, mapper, region)
    }

    /// Build an emulator with both mapper and region taken from the
    /// ROM database; unknown images run as Sega-mapper NTSC.
    pub fn autodetect(rom: Vec<u8>) -> Self {
        let rom = rom_db::strip_copier_header(rom);
        let rom_crc = rom_db::crc32(&rom);
        let info = rom_db::identify(rom_crc);
        Self::build(rom, rom_crc, info.mapper, info.region)
    }

    fn build(rom: Vec<u8>, rom_crc: u32, mapper: MapperKind, region: Region) -> Self {
        Self {
            cpu: Z80::new(),
            bus: SmsBus {
                memory: Memory::new(rom, mapper),
                vdp: SmsVdp::new(region.scanlines()),
                psg: Sn76489::new(region.cpu_clock_hz()),
                ports: IoPorts::new(),
            },
            region,
            rom_crc,
            crop_border: false,
            prev_pause: false,
            frame_samples: Vec::with_capacity(1024),
            audio_buffer: Vec::with_capacity(2048),
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn rom_crc(&self) -> u32 {
        self.rom_crc
    }

    /// Reconfigure the scheduler and VDP for a different TV standard.
    pub fn set_region(&mut self, region: Region) {
        self.region = region;
        self.bus.vdp.set_lines_per_frame(region.scanlines());
        self.bus.psg.set_clock(region.cpu_clock_hz());
    }

    /// Runtime options. Unknown keys are a no-op.
    pub fn set_option(&mut self, key: &str, value: &str) {
        match key {
            "crop_border" => self.crop_border = value == "true",
            _ => log::warn!("unknown option {key:?} ignored"),
        }
    }

    pub fn active_height(&self) -> u16 {
        self.bus.vdp.active_height()
    }

    /// Synchronously run one full frame of emulation.
    pub fn run_frame(&mut self) {
        self.frame_samples.clear();
        self.audio_buffer.clear();

        let cycles_per_line_fp = self.region.cycles_per_scanline_fp();
        let scanlines = self.region.scanlines();

        let mut target_fp = 0u64;
        let mut prev_target = 0u64;

        for line in 0..scanlines {
            target_fp += cycles_per_line_fp;
            let target = target_fp >> timing::FP_SHIFT;
            let budget = (target - prev_target) as u32;
            prev_target = target;

            self.bus.vdp.set_v_counter(line);
            if line == 0 {
                self.bus.vdp.latch_v_scroll();
            }

            let active = self.bus.vdp.active_height();
            // The frame interrupt asserts on the line after the last
            // active one (V counter $C1 / $E1), not on the last active
            // line itself.
            let vblank_line = line == active + 1;
            let mut vblank_done = false;
            let mut line_int_done = false;
            let mut cram_latched = false;

            let mut consumed = 0u32;
            while consumed < budget {
                if !vblank_done && vblank_line && consumed >= VBLANK_IRQ_CYCLE {
                    self.bus.vdp.set_vblank();
                    vblank_done = true;
                    self.cpu.set_irq(self.bus.vdp.interrupt_pending());
                }
                if !line_int_done && consumed >= LINE_IRQ_CYCLE {
                    self.bus.vdp.update_line_counter();
                    line_int_done = true;
                    self.cpu.set_irq(self.bus.vdp.interrupt_pending());
                }
                if !cram_latched && consumed >= CRAM_LATCH_CYCLE {
                    self.bus.vdp.latch_cram();
                    self.bus.vdp.latch_line_regs();
                    cram_latched = true;
                }

                self.bus.vdp.set_h_counter(consumed);
                consumed += self.cpu.step(&mut self.bus);

                if self.bus.vdp.take_interrupt_check_required() {
                    self.cpu.set_irq(self.bus.vdp.interrupt_pending());
                }
                if self.bus.vdp.take_status_was_read() {
                    self.cpu.set_irq(self.bus.vdp.interrupt_pending());
                }
            }

            // Events whose gate cycle was overshot by the last
            // instruction still belong to this line.
            if !vblank_done && vblank_line {
                self.bus.vdp.set_vblank();
                self.cpu.set_irq(self.bus.vdp.interrupt_pending());
            }
            if !line_int_done {
                self.bus.vdp.update_line_counter();
                self.cpu.set_irq(self.bus.vdp.interrupt_pending());
            }

            if line < active {
                self.bus.vdp.render_scanline();
            }

            self.bus.psg.generate_samples(budget);
            self.frame_samples.extend_from_slice(self.bus.psg.samples());
        }

        // Mono float to int16 stereo. The 0.5 compensates for the
        // acoustic summing of the duplicated channel.
        for &sample in &self.frame_samples {
            let v = (sample * 32767.0 * 0.5) as i16;
            self.audio_buffer.push(v);
            self.audio_buffer.push(v);
        }
    }

    /// RGBA8 view of the last frame. When border cropping is enabled
    /// and the game blanks the left column, the view skips the
    /// leftmost 8 pixels (width 248 at the full 256-byte-pixel row
    /// stride).
    pub fn framebuffer(&self) -> FrameView<'_> {
        let data = self.bus.vdp.framebuffer();
        let height = self.bus.vdp.active_height() as usize;
        let stride = markiii_core::device::sms_vdp::FRAME_WIDTH * 4;
        if self.crop_border && self.bus.vdp.left_column_blanked() {
            FrameView { data: &data[8 * 4..], width: 248, height, stride }
        } else {
            FrameView { data, width: 256, height, stride }
        }
    }

    /// Interleaved stereo PCM for the last frame; valid until the next
    /// `run_frame`.
    pub fn audio_samples(&self) -> &[i16] {
        &self.audio_buffer
    }

    /// Latch controller state.
    ///
    /// Bits: 0 up, 1 down, 2 left, 3 right, 4 button 1, 5 button 2;
    /// bit 7 on player 0 is the console pause button, which fires an
    /// NMI on its rising edge.
    pub fn set_input(&mut self, player: u8, buttons: u8) {
        match player {
            0 => {
                let pause = (buttons & 0x80) != 0;
                if pause && !self.prev_pause {
                    self.cpu.nmi();
                }
                self.prev_pause = pause;
                self.bus.ports.set_player1(buttons);
            }
            1 => self.bus.ports.set_player2(buttons),
            _ => {}
        }
    }

    // --- Battery-backed cartridge RAM ---

    pub fn sram(&self) -> &[u8] {
        self.bus.memory.cart_ram()
    }

    pub fn set_sram(&mut self, data: &[u8]) {
        self.bus.memory.set_cart_ram(data);
    }

    // --- Save states ---

    pub fn serialize_size(&self) -> usize {
        save_state::SERIALIZED_SIZE
    }

    pub fn serialize(&self) -> Vec<u8> {
        let snapshot = StateSnapshot {
            cpu: self.cpu.snapshot(),
            memory: self.bus.memory.snapshot(),
            vdp: self.bus.vdp.snapshot(),
            psg: self.bus.psg.snapshot(),
            port1: self.bus.ports.port1,
            port2: self.bus.ports.port2,
        };
        save_state::encode(&snapshot, self.rom_crc)
    }

    /// Restore a serialized state. Nothing is mutated unless every
    /// header and CRC check passes; the configured region is kept.
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let snapshot = save_state::decode(bytes, self.rom_crc).inspect_err(|err| {
            log::warn!("save state rejected: {err}");
        })?;
        self.cpu.restore(&snapshot.cpu);
        self.bus.memory.restore(&snapshot.memory);
        self.bus.vdp.restore(&snapshot.vdp);
        self.bus.psg.restore(&snapshot.psg);
        self.bus.ports.port1 = snapshot.port1;
        self.bus.ports.port2 = snapshot.port2;
        Ok(())
    }

    /// Power-on reset. ROM and cartridge RAM are preserved.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.vdp.reset();
        self.bus.psg.reset();
        self.bus.memory.reset();
        self.bus.ports = IoPorts::new();
        self.prev_pause = false;
        self.frame_samples.clear();
        self.audio_buffer.clear();
    }
}

impl Machine for MasterSystem {
    fn display_size(&self) -> (u32, u32) {
        let view = MasterSystem::framebuffer(self);
        (view.width as u32, view.height as u32)
    }

    fn run_frame(&mut self) {
        MasterSystem::run_frame(self);
    }

    fn framebuffer(&self) -> FrameView<'_> {
        MasterSystem::framebuffer(self)
    }

    fn set_input(&mut self, player: u8, buttons: u8) {
        MasterSystem::set_input(self, player, buttons);
    }

    fn fill_audio(&mut self, buffer: &mut [i16]) -> usize {
        let n = buffer.len().min(self.audio_buffer.len());
        buffer[..n].copy_from_slice(&self.audio_buffer[..n]);
        n
    }

    fn audio_sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn frame_rate_hz(&self) -> f64 {
        self.region.fps() as f64
    }

    fn save_nvram(&self) -> Option<&[u8]> {
        Some(&self.bus.memory.cart_ram()[..CARTRIDGE_RAM_SIZE])
    }

    fn load_nvram(&mut self, data: &[u8]) {
        self.bus.memory.set_cart_ram(data);
    }

    fn reset(&mut self) {
        MasterSystem::reset(self);
    }
}

inventory::submit! {
    MachineEntry::new("sms", "Sega Master System / Mark III", |rom| {
        Box::new(MasterSystem::autodetect(rom.to_vec()))
    })
}
