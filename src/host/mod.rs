//! Host side of the debug interconnect: the control client that drives the module, and the
//! bookkeeping it keeps about paths, slot reservations and reported state.

pub mod client;
pub mod events;
pub mod path;
pub mod port;
pub mod tdm;

pub use client::{ClientConfig, ControlClient};
pub use events::{EventDecoder, Report};
pub use port::HostPort;
