pub mod sms_vdp;
pub mod sn76489;

pub use sms_vdp::{SmsVdp, VdpState};
pub use sn76489::{PsgState, Sn76489};
