//! Region timing.
//!
//! NTSC:  3.579545 MHz CPU, 262 scanlines, 60 frames/s
//! PAL:   3.546893 MHz CPU, 313 scanlines, 50 frames/s
//!
//! The per-scanline CPU budget is not an integer (NTSC: ~227.7
//! cycles), so the scheduler accumulates it in 16.16 fixed point and
//! takes the integer difference each line; over a frame the budgets
//! sum to the exact frame cycle count without drift.

/// Fractional bits of the fixed-point cycle accumulator.
pub const FP_SHIFT: u32 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    Ntsc,
    Pal,
}

impl Region {
    pub fn cpu_clock_hz(self) -> u32 {
        match self {
            Region::Ntsc => 3_579_545,
            Region::Pal => 3_546_893,
        }
    }

    pub fn scanlines(self) -> u16 {
        match self {
            Region::Ntsc => 262,
            Region::Pal => 313,
        }
    }

    pub fn fps(self) -> u32 {
        match self {
            Region::Ntsc => 60,
            Region::Pal => 50,
        }
    }

    /// Cycles per scanline in 16.16 fixed point.
    pub fn cycles_per_scanline_fp(self) -> u64 {
        ((self.cpu_clock_hz() as u64) << FP_SHIFT)
            / self.fps() as u64
            / self.scanlines() as u64
    }
}
