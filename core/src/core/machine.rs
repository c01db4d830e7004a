/// Borrowed view of a machine's most recent completed frame.
///
/// `data` starts at the first visible pixel; rows are `stride` bytes
/// apart and `width * 4` bytes of each row are visible (RGBA8). The
/// view stays valid until the next `run_frame` call.
#[derive(Clone, Copy)]
pub struct FrameView<'a> {
    pub data: &'a [u8],
    pub width: usize,
    pub height: usize,
    pub stride: usize,
}

/// Machine-agnostic interface for emulated systems.
///
/// The frontend is a pure presentation layer: it paces frames, blits
/// the framebuffer, pushes audio, and forwards input, without knowing
/// about the hardware behind the trait (mappers, VDP registers,
/// palette formats, etc.).
pub trait Machine {
    /// Native display resolution as (width, height) in pixels.
    /// May change between frames (e.g. display-mode switches).
    fn display_size(&self) -> (u32, u32);

    /// Run one frame of emulation (advance the clock by one frame's
    /// worth of cycles). Refreshes the framebuffer and audio buffer.
    fn run_frame(&mut self);

    /// The last completed frame as RGBA8 pixels.
    fn framebuffer(&self) -> FrameView<'_>;

    /// Latch the button state for one player. `buttons` is a
    /// machine-defined bitmask; bits are held until the next call.
    fn set_input(&mut self, player: u8, buttons: u8);

    /// Drain up to `buffer.len()` audio samples (interleaved stereo
    /// int16). Returns the number of samples written.
    fn fill_audio(&mut self, buffer: &mut [i16]) -> usize;

    fn audio_sample_rate(&self) -> u32;

    fn frame_rate_hz(&self) -> f64;

    /// Battery-backed RAM contents, if the cartridge has any.
    fn save_nvram(&self) -> Option<&[u8]>;

    fn load_nvram(&mut self, data: &[u8]);

    /// Reset the machine to its initial power-on state.
    fn reset(&mut self);
}
