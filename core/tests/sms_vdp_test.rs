use markiii_core::device::sms_vdp::{H_COUNTER_TABLE, SmsVdp};

const NTSC_LINES: u16 = 262;
const PAL_LINES: u16 = 313;

/// Write a VDP register through the control port.
fn set_reg(vdp: &mut SmsVdp, reg: u8, val: u8) {
    vdp.write_control(val);
    vdp.write_control(0x80 | reg);
}

/// Point the address register at `addr` for VRAM writes.
fn vram_addr(vdp: &mut SmsVdp, addr: u16) {
    vdp.write_control(addr as u8);
    vdp.write_control(0x40 | ((addr >> 8) as u8 & 0x3F));
}

/// Point the address register at CRAM.
fn cram_addr(vdp: &mut SmsVdp, addr: u16) {
    vdp.write_control(addr as u8);
    vdp.write_control(0xC0 | ((addr >> 8) as u8 & 0x3F));
}

// ============================================================
// Control/data port protocol
// ============================================================

#[test]
fn test_register_write_via_code_2() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    set_reg(&mut vdp, 7, 0x05);
    // No direct register accessor; observe through behavior below.
    // Register 1 write must raise the interrupt-check edge flag.
    assert!(!vdp.take_interrupt_check_required());
    set_reg(&mut vdp, 1, 0x20);
    assert!(vdp.take_interrupt_check_required());
    assert!(!vdp.take_interrupt_check_required(), "edge flag clears on read");
}

#[test]
fn test_vram_write_read_with_autoincrement() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    vram_addr(&mut vdp, 0x1000);
    vdp.write_data(0x11);
    vdp.write_data(0x22);

    // Read setup prefetches and increments
    vdp.write_control(0x00);
    vdp.write_control(0x10); // code 0, addr 0x1000
    assert_eq!(vdp.read_data(), 0x11);
    assert_eq!(vdp.read_data(), 0x22);
}

#[test]
fn test_address_wraps_at_16k() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    vram_addr(&mut vdp, 0x3FFF);
    vdp.write_data(0xAA); // at 0x3FFF
    vdp.write_data(0xBB); // wrapped to 0x0000

    vdp.write_control(0x00);
    vdp.write_control(0x00); // read from 0x0000
    assert_eq!(vdp.read_data(), 0xBB);
}

#[test]
fn test_status_read_resets_write_latch() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    vdp.write_control(0x34); // first half of an address
    vdp.read_status(); // cancels it
    // Next control write is a first byte again; a second write with
    // 0x40 lands us at address 0x0078, not garbage.
    vram_addr(&mut vdp, 0x0078);
    vdp.write_data(0x99);
    vdp.write_control(0x78);
    vdp.write_control(0x00); // code 0: prefetch from 0x0078
    assert_eq!(vdp.read_data(), 0x99);
}

// ============================================================
// Counters
// ============================================================

#[test]
fn test_h_counter_table_boundaries() {
    assert_eq!(H_COUNTER_TABLE[0], 0x00);

    // The H-blank jump region must appear somewhere past index 170
    let hblank = H_COUNTER_TABLE[170..]
        .iter()
        .any(|&v| (0xE9..=0xFF).contains(&v) || v <= 0x08);
    assert!(hblank, "no H-blank values found in the tail");

    let terminal = H_COUNTER_TABLE[227];
    assert!(
        (0xE9..=0xFF).contains(&terminal) || terminal <= 0x08,
        "terminal value {terminal:#04X} outside the wrap region"
    );
}

#[test]
fn test_h_counter_ramp_is_monotonic_in_active_area() {
    for i in 1..85 {
        assert!(
            H_COUNTER_TABLE[i] >= H_COUNTER_TABLE[i - 1],
            "active-area ramp must not decrease at {i}"
        );
    }
}

#[test]
fn test_v_counter_ntsc_192() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    vdp.set_v_counter(218);
    assert_eq!(vdp.read_v_counter(), 218);
    vdp.set_v_counter(219);
    assert_eq!(vdp.read_v_counter(), 213);
    vdp.set_v_counter(261);
    assert_eq!(vdp.read_v_counter(), 255);
}

#[test]
fn test_v_counter_ntsc_224() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    set_reg(&mut vdp, 0, 0x02); // M2
    set_reg(&mut vdp, 1, 0x10); // M1
    assert_eq!(vdp.active_height(), 224);

    vdp.set_v_counter(234);
    assert_eq!(vdp.read_v_counter(), 234);
    vdp.set_v_counter(235);
    assert_eq!(vdp.read_v_counter(), 229);
}

#[test]
fn test_v_counter_pal() {
    let mut vdp = SmsVdp::new(PAL_LINES);
    vdp.set_v_counter(242);
    assert_eq!(vdp.read_v_counter(), 242);
    vdp.set_v_counter(243);
    assert_eq!(vdp.read_v_counter(), 186);
    vdp.set_v_counter(312);
    assert_eq!(vdp.read_v_counter(), 255);

    set_reg(&mut vdp, 0, 0x02);
    set_reg(&mut vdp, 1, 0x10);
    vdp.set_v_counter(258);
    assert_eq!(vdp.read_v_counter(), 2);
    vdp.set_v_counter(259);
    assert_eq!(vdp.read_v_counter(), 202);
}

#[test]
fn test_240_line_mode_falls_back_to_192() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    set_reg(&mut vdp, 0, 0x02); // M2 only
    assert_eq!(vdp.active_height(), 192);
}

// ============================================================
// Line counter
// ============================================================

/// Run `frames` full frames of line-counter updates and return the
/// active lines (frame, line) where the line interrupt latched.
fn collect_line_ints(vdp: &mut SmsVdp, frames: u32) -> Vec<(u32, u16)> {
    let mut fired = Vec::new();
    for frame in 0..frames {
        for line in 0..NTSC_LINES {
            vdp.set_v_counter(line);
            vdp.update_line_counter();
            if line <= vdp.active_height() && vdp.interrupt_pending() {
                fired.push((frame, line));
                vdp.read_status(); // acknowledge
            }
        }
    }
    fired
}

#[test]
fn test_line_interrupt_every_n_plus_1_lines() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    set_reg(&mut vdp, 0, 0x10); // line IRQ enable
    set_reg(&mut vdp, 10, 3);

    // Skip frame 0: the power-on counter of 255 suppresses it.
    let fired = collect_line_ints(&mut vdp, 2);
    let frame1: Vec<u16> = fired.iter().filter(|(f, _)| *f == 1).map(|(_, l)| *l).collect();

    assert!(!frame1.is_empty());
    assert_eq!(frame1[0], 3, "first underflow after n+1 active lines");
    for pair in frame1.windows(2) {
        assert_eq!(pair[1] - pair[0], 4, "then every n+1 lines");
    }
}

#[test]
fn test_line_interrupt_reg10_zero_fires_every_line() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    set_reg(&mut vdp, 0, 0x10);
    set_reg(&mut vdp, 10, 0);

    let fired = collect_line_ints(&mut vdp, 2);
    let frame1: Vec<u16> = fired.iter().filter(|(f, _)| *f == 1).map(|(_, l)| *l).collect();
    for pair in frame1.windows(2) {
        assert_eq!(pair[1] - pair[0], 1);
    }
}

#[test]
fn test_first_frame_interrupt_suppressed() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    set_reg(&mut vdp, 0, 0x10);
    set_reg(&mut vdp, 10, 0);

    // Counter starts at 255: no interrupt until it drains or reloads
    for line in 0..100 {
        vdp.set_v_counter(line);
        vdp.update_line_counter();
        assert!(!vdp.interrupt_pending(), "spurious interrupt at line {line}");
    }
}

// ============================================================
// Frame interrupt and status
// ============================================================

#[test]
fn test_vblank_and_status_clear() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    set_reg(&mut vdp, 1, 0x20); // frame IRQ enable
    vdp.take_interrupt_check_required();

    assert!(!vdp.interrupt_pending());
    vdp.set_vblank();
    assert!(vdp.interrupt_pending());

    let status = vdp.read_status();
    assert_ne!(status & 0x80, 0, "VBlank bit visible in the read");
    assert!(!vdp.interrupt_pending(), "cleared even though the enable stays set");
    assert!(vdp.take_status_was_read());
    assert_eq!(vdp.read_status() & 0x80, 0);
}

#[test]
fn test_frame_interrupt_respects_enable_bit() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    vdp.set_vblank();
    assert!(!vdp.interrupt_pending(), "masked without reg1 bit 5");
    set_reg(&mut vdp, 1, 0x20);
    assert!(vdp.interrupt_pending());
}

// ============================================================
// Rasterizer
// ============================================================

fn prepare_sprite_frame(vdp: &mut SmsVdp) {
    set_reg(vdp, 1, 0x40); // display enable
    set_reg(vdp, 7, 0x00);

    // Pattern 1: solid color index 1 (bitplane 0 all ones)
    vram_addr(vdp, 32);
    for _ in 0..8 {
        vdp.write_data(0xFF);
        vdp.write_data(0x00);
        vdp.write_data(0x00);
        vdp.write_data(0x00);
    }

    // Sprite palette entry 1: bright red (bbggrr = 000011)
    cram_addr(vdp, 17);
    vdp.write_data(0x03);
}

fn render_line(vdp: &mut SmsVdp, line: u16) {
    vdp.set_v_counter(line);
    vdp.latch_cram();
    vdp.latch_line_regs();
    vdp.render_scanline();
}

#[test]
fn test_backdrop_fill_when_display_disabled() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    // Backdrop = sprite-palette entry 2 via reg 7
    cram_addr(&mut vdp, 18);
    vdp.write_data(0x30); // blue
    set_reg(&mut vdp, 7, 0x02);

    render_line(&mut vdp, 0);
    let fb = vdp.framebuffer();
    assert_eq!(&fb[0..4], &[0, 0, 255, 255]);
    assert_eq!(&fb[255 * 4..256 * 4], &[0, 0, 255, 255]);
}

#[test]
fn test_sprite_collision_sets_status_bit5() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    prepare_sprite_frame(&mut vdp);

    // Two sprites at Y=9 (displayed from line 10) with overlapping X
    vram_addr(&mut vdp, 0x0000);
    vdp.write_data(9);
    vdp.write_data(9);
    vram_addr(&mut vdp, 0x0080);
    vdp.write_data(40); // sprite 0 X
    vdp.write_data(1);  // sprite 0 pattern
    vdp.write_data(44); // sprite 1 X overlaps 40..48
    vdp.write_data(1);

    render_line(&mut vdp, 10);
    assert_ne!(vdp.read_status() & 0x20, 0, "collision flag");
}

#[test]
fn test_no_collision_when_sprites_disjoint() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    prepare_sprite_frame(&mut vdp);

    vram_addr(&mut vdp, 0x0000);
    vdp.write_data(9);
    vdp.write_data(9);
    vram_addr(&mut vdp, 0x0080);
    vdp.write_data(40);
    vdp.write_data(1);
    vdp.write_data(60);
    vdp.write_data(1);

    render_line(&mut vdp, 10);
    assert_eq!(vdp.read_status() & 0x20, 0);
}

#[test]
fn test_sprite_overflow_renders_only_eight() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    prepare_sprite_frame(&mut vdp);

    // Nine sprites on the same line, spread across X
    vram_addr(&mut vdp, 0x0000);
    for _ in 0..9 {
        vdp.write_data(9);
    }
    vdp.write_data(0xD0); // terminate the list
    vram_addr(&mut vdp, 0x0080);
    for i in 0..9u8 {
        vdp.write_data(10 + i * 20);
        vdp.write_data(1);
    }

    render_line(&mut vdp, 10);

    let fb: Vec<u8> = vdp.framebuffer().to_vec();
    let pixel = |x: usize| &fb[(10 * 256 + x) * 4..(10 * 256 + x) * 4 + 4];
    assert_eq!(pixel(10), &[255, 0, 0, 255], "sprite 0 rendered");
    assert_eq!(pixel(150), &[255, 0, 0, 255], "sprite 7 rendered");
    assert_eq!(pixel(170), &[0, 0, 0, 255], "ninth sprite dropped");

    assert_ne!(vdp.read_status() & 0x40, 0, "overflow flag");
}

#[test]
fn test_sprite_priority_zero_wins() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    prepare_sprite_frame(&mut vdp);

    // Pattern 2: solid color index 2; palette entry 18 green
    vram_addr(&mut vdp, 64);
    for _ in 0..8 {
        vdp.write_data(0x00);
        vdp.write_data(0xFF);
        vdp.write_data(0x00);
        vdp.write_data(0x00);
    }
    cram_addr(&mut vdp, 18);
    vdp.write_data(0x0C); // green

    vram_addr(&mut vdp, 0x0000);
    vdp.write_data(9);
    vdp.write_data(9);
    vram_addr(&mut vdp, 0x0080);
    vdp.write_data(40);
    vdp.write_data(1); // sprite 0: red
    vdp.write_data(40);
    vdp.write_data(2); // sprite 1: green, same position

    render_line(&mut vdp, 10);
    let fb = vdp.framebuffer();
    let px = &fb[(10 * 256 + 42) * 4..(10 * 256 + 42) * 4 + 4];
    assert_eq!(px, &[255, 0, 0, 255], "sprite 0 overwrites sprite 1");
}

#[test]
fn test_left_column_blank() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    prepare_sprite_frame(&mut vdp);
    set_reg(&mut vdp, 0, 0x20); // left column blank

    // A sprite at X=4 straddles the blanked strip
    vram_addr(&mut vdp, 0x0000);
    vdp.write_data(9);
    vdp.write_data(0xD0);
    vram_addr(&mut vdp, 0x0080);
    vdp.write_data(4);
    vdp.write_data(1);

    render_line(&mut vdp, 10);
    let fb = vdp.framebuffer();
    assert_eq!(&fb[(10 * 256 + 5) * 4..(10 * 256 + 5) * 4 + 4], &[0, 0, 0, 255], "masked");
    assert_eq!(
        &fb[(10 * 256 + 8) * 4..(10 * 256 + 8) * 4 + 4],
        &[255, 0, 0, 255],
        "visible past the strip"
    );
    assert!(vdp.left_column_blanked());
}

#[test]
fn test_y_terminator_only_in_192_mode() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    prepare_sprite_frame(&mut vdp);

    // Terminator first, then a sprite behind it
    vram_addr(&mut vdp, 0x0000);
    vdp.write_data(0xD0);
    vdp.write_data(9);
    vram_addr(&mut vdp, 0x0082);
    vdp.write_data(50);
    vdp.write_data(1);

    render_line(&mut vdp, 10);
    let fb: Vec<u8> = vdp.framebuffer().to_vec();
    assert_eq!(
        &fb[(10 * 256 + 52) * 4..(10 * 256 + 52) * 4 + 4],
        &[0, 0, 0, 255],
        "list terminated in 192-line mode"
    );
}

#[test]
fn test_background_tile_rendering_with_palette_select() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    set_reg(&mut vdp, 1, 0x40);
    set_reg(&mut vdp, 2, 0x0E); // name table at 0x3800

    // Background palette entry 1: white; sprite palette entry 1: red
    cram_addr(&mut vdp, 1);
    vdp.write_data(0x3F);
    cram_addr(&mut vdp, 17);
    vdp.write_data(0x03);

    // Pattern 1 solid color 1
    vram_addr(&mut vdp, 32);
    for _ in 0..8 {
        vdp.write_data(0xFF);
        vdp.write_data(0x00);
        vdp.write_data(0x00);
        vdp.write_data(0x00);
    }

    // Tile (0,0): pattern 1, background palette.
    // Tile (1,0): pattern 1, sprite palette (bit 11).
    vram_addr(&mut vdp, 0x3800);
    vdp.write_data(0x01);
    vdp.write_data(0x00);
    vdp.write_data(0x01);
    vdp.write_data(0x08);

    render_line(&mut vdp, 0);
    let fb = vdp.framebuffer();
    assert_eq!(&fb[0..4], &[255, 255, 255, 255], "background palette");
    assert_eq!(&fb[8 * 4..8 * 4 + 4], &[255, 0, 0, 255], "sprite palette via bit 11");
}

#[test]
fn test_bg_priority_beats_sprite() {
    let mut vdp = SmsVdp::new(NTSC_LINES);
    prepare_sprite_frame(&mut vdp);
    set_reg(&mut vdp, 2, 0x0E);

    // White background tile with the priority bit, covering x 0..8
    cram_addr(&mut vdp, 1);
    vdp.write_data(0x3F);
    vram_addr(&mut vdp, 0x3800 + 64 * 1); // tile row 1 (covers line 10), column 0
    vdp.write_data(0x01);
    vdp.write_data(0x10); // priority bit 12

    // Sprite overlapping the same tile
    vram_addr(&mut vdp, 0x0000);
    vdp.write_data(9);
    vdp.write_data(0xD0);
    vram_addr(&mut vdp, 0x0080);
    vdp.write_data(0);
    vdp.write_data(1);

    render_line(&mut vdp, 10);
    let fb = vdp.framebuffer();
    let px = &fb[(10 * 256 + 2) * 4..(10 * 256 + 2) * 4 + 4];
    assert_eq!(px, &[255, 255, 255, 255], "priority background over sprite");
}

#[test]
fn test_cram_latch_defers_mid_frame_palette_writes() {
    // Display stays disabled so every line is a backdrop fill
    let mut vdp = SmsVdp::new(NTSC_LINES);
    set_reg(&mut vdp, 7, 0x01);

    cram_addr(&mut vdp, 17);
    vdp.write_data(0x03); // red backdrop
    vdp.latch_cram();
    vdp.latch_line_regs();

    // Palette changes after the latch do not affect this line
    cram_addr(&mut vdp, 17);
    vdp.write_data(0x0C);

    vdp.set_v_counter(5);
    vdp.render_scanline();
    let fb = vdp.framebuffer();
    assert_eq!(&fb[(5 * 256) * 4..(5 * 256) * 4 + 4], &[255, 0, 0, 255]);

    // The next latch picks it up
    vdp.latch_cram();
    vdp.set_v_counter(6);
    vdp.render_scanline();
    let fb = vdp.framebuffer();
    assert_eq!(&fb[(6 * 256) * 4..(6 * 256) * 4 + 4], &[0, 255, 0, 255]);
}
