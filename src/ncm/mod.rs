pub mod arbiter;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod fault_detect;
pub mod fault_inject;
pub mod front_end;
pub mod header_strip;
mod report;
pub mod regs;
pub mod slot_config;
pub mod util;


pub use config::NcmConfig;
pub use domain::{connect, HostPorts, NocDomain, NocPorts, NocStats};
pub use front_end::{FrontEndPorts, FrontEndStats, RegisterFrontEnd};
