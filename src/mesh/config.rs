use crate::sim::config::Config;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MeshConfig {
    pub x: usize,
    pub y: usize,
    pub lut_size: usize,
    /// Router-to-tile links per node, reported after the mesh links.
    pub local_links: usize,
    /// TDM endpoints per network interface, as advertised to the host.
    pub max_ports: u16,
    pub simple: bool,
}

impl Config for MeshConfig {}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            x: 3,
            y: 3,
            lut_size: 16,
            local_links: 4,
            max_ports: 2,
            simple: false,
        }
    }
}

/// Synthetic load driven through the reference mesh model.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrafficConfig {
    /// Probability that an idle link starts a best-effort packet in a cycle.
    pub be_rate: f64,
    pub seed: u64,
    pub packet_flits: usize,
}

impl Config for TrafficConfig {}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            be_rate: 0.05,
            seed: 0,
            packet_flits: 4,
        }
    }
}
