//! Collaborator interfaces between the control module and the mesh data plane.

use crate::base::behavior::ModuleBehaviors;
use serde::Serialize;

/// Flits moved on one link in one NoC cycle, per traffic class.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UtilSample {
    pub tdm: u32,
    pub be: u32,
}

pub trait FaultSource {
    /// Detected-fault bitmap of `node`, bit `l` for link `l`.
    fn fault_bitmap(&self, node: usize) -> u8;
}

pub trait UtilSource {
    fn util_sample(&self, node: usize, link: u8) -> UtilSample;

    /// External recording window for triggered utilization capture.
    fn recording(&self) -> bool {
        false
    }
}

/// Write side of the control module. Values arrive unvalidated.
pub trait ConfigSink {
    fn write_router_slot(&mut self, node: u16, table: u8, slot: u8, value: u8);
    fn write_ni_slot(&mut self, node: u16, table: u8, slot: u8, value: u8);
    fn set_link_enable(&mut self, node: u16, endpoint: u8, link: u8, enable: bool);
    fn set_fault_inject(&mut self, node: u8, mask: u8);
}

pub trait MeshFabric: FaultSource + UtilSource + ConfigSink + ModuleBehaviors + Send {}

impl<T> MeshFabric for T where T: FaultSource + UtilSource + ConfigSink + ModuleBehaviors + Send {}
