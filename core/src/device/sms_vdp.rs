//! Sega 315-5124 VDP — mode-4 tile/sprite video display processor.
//!
//! Used in the Master System and Mark III. The VDP owns 16 KiB of VRAM
//! (patterns, name table, sprite attribute table) and 32 bytes of CRAM
//! (two 16-entry palettes, 6-bit bbggrr color), and produces a 256-wide
//! frame at 192 or 224 active lines. The machine's scheduler drives it
//! one scanline at a time: it updates the counters, fires the line and
//! frame interrupts at fixed cycle offsets, latches the per-line
//! registers, and asks for one rasterized scanline per active line.
//!
//! CPU access goes through two ports: a control port that assembles a
//! 14-bit address plus 2-bit code from two writes, and a data port with
//! a one-byte read prefetch buffer.

/// Framebuffer width in pixels. Height follows the display mode.
pub const FRAME_WIDTH: usize = 256;

/// Maximum active height (224-line mode).
pub const MAX_FRAME_HEIGHT: usize = 224;

const VRAM_SIZE: usize = 0x4000;
const CRAM_SIZE: usize = 32;

const STATUS_VBLANK: u8 = 0x80;
const STATUS_SPRITE_OVERFLOW: u8 = 0x40;
const STATUS_SPRITE_COLLISION: u8 = 0x20;

/// 2-bit SMS color channel to 8-bit expansion.
const COLOR_LEVELS: [u8; 4] = [0, 85, 170, 255];

/// H-counter value per CPU cycle offset within a scanline.
///
/// A scanline is 684 master clocks (228 CPU cycles at a 3:1 ratio).
/// The counter ramps linearly $00-$7F over the first 256 master
/// clocks, compresses to $80-$93 over the next 256, then jumps to $E9
/// and runs through $FF into $00-$08 across H-blank.
pub const H_COUNTER_TABLE: [u8; 228] = {
    let mut table = [0u8; 228];
    let mut i = 0usize;
    while i < 228 {
        let mclk = i * 3;
        table[i] = if mclk < 256 {
            (mclk / 2) as u8
        } else if mclk < 512 {
            (0x80 + (mclk - 256) * 20 / 256) as u8
        } else {
            (0xE9 + (mclk - 512) * 32 / 172) as u8
        };
        i += 1;
    }
    table
};

/// Complete serializable VDP state (framebuffer excluded; it is
/// recomputed every frame).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VdpState {
    pub vram: Box<[u8; VRAM_SIZE]>,
    pub cram: [u8; CRAM_SIZE],
    pub cram_latch: [u8; CRAM_SIZE],
    pub registers: [u8; 16],
    pub addr: u16,
    pub addr_latch: u8,
    pub write_latch: bool,
    pub code: u8,
    pub read_buffer: u8,
    pub status: u8,
    pub v_counter: u16,
    pub h_counter: u8,
    pub line_counter: i16,
    pub line_int_pending: bool,
    pub h_scroll_latch: u8,
    pub reg2_latch: u8,
    pub reg7_latch: u8,
    pub v_scroll_latch: u8,
    pub interrupt_check_required: bool,
}

pub struct SmsVdp {
    vram: Box<[u8; VRAM_SIZE]>,
    cram: [u8; CRAM_SIZE],

    /// Mid-scanline CRAM snapshot; the rasterizer reads only this, so
    /// palette writes landing later in a line take effect next line.
    cram_latch: [u8; CRAM_SIZE],

    registers: [u8; 16],

    // Control/data port state
    addr: u16,
    addr_latch: u8,
    write_latch: bool,
    code: u8,
    read_buffer: u8,

    status: u8,
    line_int_pending: bool,

    // Single-consumer edge flags, polled and cleared by the scheduler
    interrupt_check_required: bool,
    status_was_read: bool,

    v_counter: u16,
    h_counter: u8,
    line_counter: i16,

    // Per-line register latches (captured after line-interrupt handlers
    // have had time to run) and the per-frame vertical scroll latch
    h_scroll_latch: u8,
    reg2_latch: u8,
    reg7_latch: u8,
    v_scroll_latch: u8,

    lines_per_frame: u16,

    framebuffer: Box<[u8; FRAME_WIDTH * MAX_FRAME_HEIGHT * 4]>,

    // Per-scanline scratch
    bg_priority: [bool; FRAME_WIDTH],
    sprite_drawn: [bool; FRAME_WIDTH],
}

impl SmsVdp {
    pub fn new(lines_per_frame: u16) -> Self {
        Self {
            vram: Box::new([0; VRAM_SIZE]),
            cram: [0; CRAM_SIZE],
            cram_latch: [0; CRAM_SIZE],
            registers: [0; 16],
            addr: 0,
            addr_latch: 0,
            write_latch: false,
            code: 0,
            read_buffer: 0,
            status: 0,
            line_int_pending: false,
            interrupt_check_required: false,
            status_was_read: false,
            v_counter: 0,
            h_counter: 0,
            // 255 suppresses a spurious interrupt on the first frame
            line_counter: 255,
            h_scroll_latch: 0,
            reg2_latch: 0,
            reg7_latch: 0,
            v_scroll_latch: 0,
            lines_per_frame,
            framebuffer: Box::new([0; FRAME_WIDTH * MAX_FRAME_HEIGHT * 4]),
            bg_priority: [false; FRAME_WIDTH],
            sprite_drawn: [false; FRAME_WIDTH],
        }
    }

    pub fn reset(&mut self) {
        let lines = self.lines_per_frame;
        *self = Self::new(lines);
    }

    pub fn set_lines_per_frame(&mut self, lines: u16) {
        self.lines_per_frame = lines;
    }

    /// Active display height: 224 iff M2 (reg 0 bit 1) and M1 (reg 1
    /// bit 4) are both set, else 192. The 240-line mode is not
    /// supported and falls back to 192.
    pub fn active_height(&self) -> u16 {
        if (self.registers[0] & 0x02) != 0 && (self.registers[1] & 0x10) != 0 {
            224
        } else {
            192
        }
    }

    // --- Port protocol ---

    pub fn write_control(&mut self, val: u8) {
        if !self.write_latch {
            self.addr_latch = val;
            self.write_latch = true;
            return;
        }
        self.write_latch = false;
        self.addr = (((val & 0x3F) as u16) << 8) | self.addr_latch as u16;
        self.code = val >> 6;
        match self.code {
            0 => {
                // VRAM read setup: prefetch and advance
                self.read_buffer = self.vram[self.addr as usize & 0x3FFF];
                self.increment_addr();
            }
            2 => {
                let reg = (val & 0x0F) as usize;
                self.registers[reg] = self.addr_latch;
                if reg <= 1 {
                    self.interrupt_check_required = true;
                }
            }
            _ => {}
        }
    }

    pub fn write_data(&mut self, val: u8) {
        self.write_latch = false;
        if self.code == 3 {
            self.cram[(self.addr & 0x1F) as usize] = val;
        } else {
            self.vram[(self.addr & 0x3FFF) as usize] = val;
        }
        self.read_buffer = val;
        self.increment_addr();
    }

    pub fn read_data(&mut self) -> u8 {
        self.write_latch = false;
        let val = self.read_buffer;
        self.read_buffer = self.vram[self.addr as usize & 0x3FFF];
        self.increment_addr();
        val
    }

    /// Control-port read: returns the status byte, then clears the
    /// VBlank/overflow/collision bits and the line-interrupt latch.
    pub fn read_status(&mut self) -> u8 {
        let val = self.status;
        self.status = 0;
        self.line_int_pending = false;
        self.write_latch = false;
        self.status_was_read = true;
        val
    }

    fn increment_addr(&mut self) {
        self.addr = (self.addr + 1) & 0x3FFF;
    }

    // --- Counters ---

    pub fn set_v_counter(&mut self, line: u16) {
        self.v_counter = line;
    }

    /// Set the H counter from the CPU cycle offset within the current
    /// scanline. Offsets past the line clamp to the terminal entry.
    pub fn set_h_counter(&mut self, cycle: u32) {
        let index = (cycle as usize).min(H_COUNTER_TABLE.len() - 1);
        self.h_counter = H_COUNTER_TABLE[index];
    }

    pub fn read_h_counter(&self) -> u8 {
        self.h_counter
    }

    /// External 8-bit V counter: a region- and mode-dependent
    /// non-linear fold of the raw line number.
    pub fn read_v_counter(&self) -> u8 {
        let v = self.v_counter;
        match (self.lines_per_frame, self.active_height()) {
            (262, 192) => if v <= 218 { v as u8 } else { (v - 6) as u8 },
            (262, _) => if v <= 234 { v as u8 } else { (v - 6) as u8 },
            (_, 192) => if v <= 242 { v as u8 } else { (v - 57) as u8 },
            _ => if v <= 258 { v as u8 } else { (v - 57) as u8 },
        }
    }

    // --- Interrupts ---

    pub fn set_vblank(&mut self) {
        self.status |= STATUS_VBLANK;
    }

    /// Decrement or reload the line counter for the current scanline.
    /// Underflow inside the active region (plus one line) raises the
    /// line-interrupt latch.
    pub fn update_line_counter(&mut self) {
        if self.v_counter <= self.active_height() {
            self.line_counter -= 1;
            if self.line_counter < 0 {
                self.line_int_pending = true;
                self.line_counter = self.registers[10] as i16;
            }
        } else {
            self.line_counter = self.registers[10] as i16;
        }
    }

    /// Level of the shared IRQ line as seen by the CPU.
    pub fn interrupt_pending(&self) -> bool {
        let frame_int = (self.status & STATUS_VBLANK) != 0 && (self.registers[1] & 0x20) != 0;
        let line_int = self.line_int_pending && (self.registers[0] & 0x10) != 0;
        frame_int || line_int
    }

    /// Edge flag: a write to register 0 or 1 may have changed the IRQ
    /// enables. Cleared on read.
    pub fn take_interrupt_check_required(&mut self) -> bool {
        let val = self.interrupt_check_required;
        self.interrupt_check_required = false;
        val
    }

    /// Edge flag: the status port was read (which de-asserts the IRQ
    /// line). Cleared on read.
    pub fn take_status_was_read(&mut self) -> bool {
        let val = self.status_was_read;
        self.status_was_read = false;
        val
    }

    // --- Per-line latching ---

    /// Capture register 9 for the whole frame (called at scanline 0).
    pub fn latch_v_scroll(&mut self) {
        self.v_scroll_latch = self.registers[9];
    }

    pub fn latch_cram(&mut self) {
        self.cram_latch = self.cram;
    }

    pub fn latch_line_regs(&mut self) {
        self.h_scroll_latch = self.registers[8];
        self.reg2_latch = self.registers[2];
        self.reg7_latch = self.registers[7];
    }

    // --- Rasterizer ---

    /// True when register 0 bit 5 masks the leftmost 8 pixels with the
    /// backdrop color (games use it to hide ragged scroll edges).
    pub fn left_column_blanked(&self) -> bool {
        (self.registers[0] & 0x20) != 0
    }

    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer[..FRAME_WIDTH * self.active_height() as usize * 4]
    }

    fn put_pixel(&mut self, line: usize, x: usize, cram_value: u8) {
        let offset = (line * FRAME_WIDTH + x) * 4;
        self.framebuffer[offset] = COLOR_LEVELS[(cram_value & 0x03) as usize];
        self.framebuffer[offset + 1] = COLOR_LEVELS[((cram_value >> 2) & 0x03) as usize];
        self.framebuffer[offset + 2] = COLOR_LEVELS[((cram_value >> 4) & 0x03) as usize];
        self.framebuffer[offset + 3] = 0xFF;
    }

    /// Rasterize the current scanline (the raw V counter) into the
    /// framebuffer. Only call for lines inside the active region.
    pub fn render_scanline(&mut self) {
        let line = self.v_counter as usize;
        let height = self.active_height() as usize;
        if line >= height {
            return;
        }

        let backdrop = self.cram_latch[16 + (self.reg7_latch & 0x0F) as usize];

        // Display disabled: backdrop fill
        if (self.registers[1] & 0x40) == 0 {
            for x in 0..FRAME_WIDTH {
                self.put_pixel(line, x, backdrop);
            }
            return;
        }

        self.bg_priority = [false; FRAME_WIDTH];
        self.sprite_drawn = [false; FRAME_WIDTH];

        self.render_background(line);
        self.render_sprites(line);

        // Left column blank
        if (self.registers[0] & 0x20) != 0 {
            for x in 0..8 {
                self.put_pixel(line, x, backdrop);
            }
        }
    }

    fn render_background(&mut self, line: usize) {
        let mode_224 = self.active_height() == 224;
        let name_base = if mode_224 {
            ((((self.reg2_latch & 0x0C) as usize) << 10) | 0x0700) & 0x3FFF
        } else {
            ((self.reg2_latch & 0x0E) as usize) << 10
        };

        // Top two tile rows ignore horizontal scroll when locked
        let h_scroll = if (self.registers[0] & 0x40) != 0 && line < 16 {
            0
        } else {
            self.h_scroll_latch
        };

        for x in 0..FRAME_WIDTH {
            // Rightmost 8 columns ignore vertical scroll when locked
            let v_scroll = if (self.registers[0] & 0x80) != 0 && x >= 192 {
                0
            } else {
                self.v_scroll_latch
            };

            let mut y = line + v_scroll as usize;
            if mode_224 {
                y &= 0xFF;
            } else if y >= 224 {
                y -= 224;
            }

            let bg_x = (x as u8).wrapping_sub(h_scroll) as usize;
            let entry_addr = name_base + (y / 8) * 64 + (bg_x / 8) * 2;
            let entry = self.vram[entry_addr] as u16 | ((self.vram[entry_addr + 1] as u16) << 8);

            let pattern = (entry & 0x1FF) as usize;
            let h_flip = (entry & 0x200) != 0;
            let v_flip = (entry & 0x400) != 0;
            let sprite_palette = (entry & 0x800) != 0;
            let priority = (entry & 0x1000) != 0;

            let mut row = y % 8;
            if v_flip {
                row = 7 - row;
            }
            let mut col = bg_x % 8;
            if h_flip {
                col = 7 - col;
            }

            let pattern_addr = pattern * 32 + row * 4;
            let bit = 7 - col;
            let color = ((self.vram[pattern_addr] >> bit) & 1)
                | (((self.vram[pattern_addr + 1] >> bit) & 1) << 1)
                | (((self.vram[pattern_addr + 2] >> bit) & 1) << 2)
                | (((self.vram[pattern_addr + 3] >> bit) & 1) << 3);

            let cram_index = if sprite_palette { 16 + color } else { color } as usize;
            self.put_pixel(line, x, self.cram_latch[cram_index]);

            if priority && color != 0 {
                self.bg_priority[x] = true;
            }
        }
    }

    fn render_sprites(&mut self, line: usize) {
        let sat = (((self.registers[5] & 0x7E) as usize) << 7) & 0x3FFF;
        let doubled = (self.registers[1] & 0x02) != 0; // 8x16 sprites
        let zoom = if (self.registers[1] & 0x01) != 0 { 2usize } else { 1 };
        let tile_height: usize = if doubled { 16 } else { 8 };
        let sprite_height = tile_height * zoom;
        let mode_192 = self.active_height() == 192;

        // Scan the 64-entry Y table for sprites crossing this line
        let mut line_sprites = [0usize; 8];
        let mut count = 0;
        for i in 0..64 {
            let y_raw = self.vram[sat + i];
            if mode_192 && y_raw == 0xD0 {
                break; // end-of-list marker (192-line mode only)
            }
            let top = y_raw as usize + 1;
            if line >= top && line < top + sprite_height {
                if count == 8 {
                    self.status |= STATUS_SPRITE_OVERFLOW;
                    break;
                }
                line_sprites[count] = i;
                count += 1;
            }
        }

        let x_shift: i32 = if (self.registers[0] & 0x08) != 0 { -8 } else { 0 };
        let pattern_base = (((self.registers[6] & 0x04) as usize) << 11) & 0x3FFF;

        // Reverse order: sprite 0 has the highest priority and is
        // drawn last, overwriting anything beneath it.
        for idx in (0..count).rev() {
            let i = line_sprites[idx];
            let sprite_x = self.vram[sat + 0x80 + 2 * i] as i32 + x_shift;
            let mut pattern = self.vram[sat + 0x81 + 2 * i] as usize;
            if doubled {
                pattern &= 0xFE;
            }
            let top = self.vram[sat + i] as usize + 1;
            let row = (line - top) / zoom;
            let pattern_addr = pattern_base + pattern * 32 + row * 4;

            for px in 0..(8 * zoom) {
                let screen_x = sprite_x + px as i32;
                if !(0..FRAME_WIDTH as i32).contains(&screen_x) {
                    continue;
                }
                let col = px / zoom;
                let bit = 7 - col;
                let color = ((self.vram[pattern_addr] >> bit) & 1)
                    | (((self.vram[pattern_addr + 1] >> bit) & 1) << 1)
                    | (((self.vram[pattern_addr + 2] >> bit) & 1) << 2)
                    | (((self.vram[pattern_addr + 3] >> bit) & 1) << 3);
                if color == 0 {
                    continue;
                }

                let sx = screen_x as usize;
                if self.sprite_drawn[sx] {
                    self.status |= STATUS_SPRITE_COLLISION;
                }
                self.sprite_drawn[sx] = true;

                if self.bg_priority[sx] {
                    continue; // high-priority background wins
                }
                self.put_pixel(line, sx, self.cram_latch[16 + color as usize]);
            }
        }
    }

    // --- Snapshot ---

    pub fn snapshot(&self) -> VdpState {
        VdpState {
            vram: self.vram.clone(),
            cram: self.cram,
            cram_latch: self.cram_latch,
            registers: self.registers,
            addr: self.addr,
            addr_latch: self.addr_latch,
            write_latch: self.write_latch,
            code: self.code,
            read_buffer: self.read_buffer,
            status: self.status,
            v_counter: self.v_counter,
            h_counter: self.h_counter,
            line_counter: self.line_counter,
            line_int_pending: self.line_int_pending,
            h_scroll_latch: self.h_scroll_latch,
            reg2_latch: self.reg2_latch,
            reg7_latch: self.reg7_latch,
            v_scroll_latch: self.v_scroll_latch,
            interrupt_check_required: self.interrupt_check_required,
        }
    }

    pub fn restore(&mut self, state: &VdpState) {
        self.vram = state.vram.clone();
        self.cram = state.cram;
        self.cram_latch = state.cram_latch;
        self.registers = state.registers;
        self.addr = state.addr;
        self.addr_latch = state.addr_latch;
        self.write_latch = state.write_latch;
        self.code = state.code;
        self.read_buffer = state.read_buffer;
        self.status = state.status;
        self.v_counter = state.v_counter;
        self.h_counter = state.h_counter;
        self.line_counter = state.line_counter;
        self.line_int_pending = state.line_int_pending;
        self.h_scroll_latch = state.h_scroll_latch;
        self.reg2_latch = state.reg2_latch;
        self.reg7_latch = state.reg7_latch;
        self.v_scroll_latch = state.v_scroll_latch;
        self.interrupt_check_required = state.interrupt_check_required;
        self.status_was_read = false;
    }
}
