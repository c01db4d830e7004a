pub mod core;
pub mod cpu;
pub mod device;

pub mod prelude {
    pub use crate::core::machine::{FrameView, Machine};
    pub use crate::core::Bus;
    pub use crate::cpu::Z80;
}
