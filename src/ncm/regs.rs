use std::collections::BTreeMap;

use phf::phf_map;

use crate::mesh::topology::Topology;
use crate::ncm::config::NcmConfig;
use crate::packet::{encode_dimensions, split_window};

pub const REG_VENDOR: u16 = 0x0000;
pub const REG_TYPE: u16 = 0x0001;
pub const REG_VERSION: u16 = 0x0002;
pub const REG_EVENT_DEST: u16 = 0x0003;
pub const REG_CS: u16 = 0x0004;
pub const REG_LUT_SIZE: u16 = 0x0200;
pub const REG_DIMENSIONS: u16 = 0x0201;
pub const REG_WINDOW_LOW: u16 = 0x0202;
pub const REG_WINDOW_HIGH: u16 = 0x0203;
pub const REG_MAX_PORTS: u16 = 0x0204;
pub const REG_SIMPLE: u16 = 0x0205;

pub const VENDOR_ID: u16 = 4;
pub const MODULE_TYPE: u16 = 5;
/// Control/status bit enabling event reporting.
pub const CS_ACTIVE: u16 = 1;

static REGISTER_NAMES: phf::Map<u16, &'static str> = phf_map! {
    0x0000u16 => "vendor",
    0x0001u16 => "type",
    0x0002u16 => "version",
    0x0003u16 => "event_dest",
    0x0004u16 => "cs",
    0x0200u16 => "lut_size",
    0x0201u16 => "dimensions",
    0x0202u16 => "window_low",
    0x0203u16 => "window_high",
    0x0204u16 => "max_ports",
    0x0205u16 => "simple",
};

pub fn register_name(addr: u16) -> Option<&'static str> {
    REGISTER_NAMES.get(&addr).copied()
}

/// Register file of the module as the host sees it. Constants come from the configuration,
/// the window mirror from the NoC domain.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    version: u16,
    event_dest: u16,
    cs: u16,
    window: u32,
    lut_size: u16,
    dimensions: u16,
    max_ports: u16,
    simple: bool,
}

impl RegisterFile {
    pub fn new(config: &NcmConfig, topology: &Topology) -> Self {
        Self {
            version: config.version,
            event_dest: config.event_dest,
            cs: 0,
            window: config.max_clk_counter,
            lut_size: topology.lut_size() as u16,
            dimensions: encode_dimensions(topology.x_dim(), topology.y_dim()),
            max_ports: config.mesh.max_ports,
            simple: config.mesh.simple,
        }
    }

    /// `None` for an address that does not exist.
    pub fn read(&self, addr: u16) -> Option<u16> {
        let (window_low, window_high) = split_window(self.window);
        Some(match addr {
            REG_VENDOR => VENDOR_ID,
            REG_TYPE => MODULE_TYPE,
            REG_VERSION => self.version,
            REG_EVENT_DEST => self.event_dest,
            REG_CS => self.cs,
            REG_LUT_SIZE => self.lut_size,
            REG_DIMENSIONS => self.dimensions,
            REG_WINDOW_LOW => window_low,
            REG_WINDOW_HIGH => window_high,
            REG_MAX_PORTS => self.max_ports,
            REG_SIMPLE => self.simple as u16,
            _ => return None,
        })
    }

    /// Returns false for read-only or unknown registers.
    pub fn write(&mut self, addr: u16, value: u16) -> bool {
        match addr {
            REG_EVENT_DEST => self.event_dest = value,
            REG_CS => self.cs = value,
            _ => return false,
        }
        true
    }

    pub fn event_active(&self) -> bool {
        self.cs & CS_ACTIVE != 0
    }

    pub fn event_dest(&self) -> u16 {
        self.event_dest
    }

    pub fn set_window(&mut self, window: u32) {
        self.window = window;
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    /// Every register by name.
    pub fn snapshot(&self) -> BTreeMap<&'static str, u16> {
        REGISTER_NAMES
            .entries()
            .filter_map(|(addr, name)| self.read(*addr).map(|v| (*name, v)))
            .collect()
    }
}
