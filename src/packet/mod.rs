pub mod codec;
pub mod flit;

pub use codec::*;
pub use flit::{DebugPacket, Flit, PacketAssembler, HEADER_FLITS};
