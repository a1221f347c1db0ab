use serde::Deserialize;

use crate::error::ConfigError;
use crate::mesh::config::MeshConfig;
use crate::mesh::topology::Topology;
use crate::packet::HEADER_FLITS;
use crate::sim::config::Config;

/// Smallest packet that still carries one report data word: header, sub-id, one word.
pub const MIN_PKT_LEN: usize = HEADER_FLITS + 2;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UtilMode {
    /// Snapshot-and-reset every window.
    #[default]
    Continuous,
    /// Accumulate while the external recording signal is held.
    Triggered,
}

/// What happens to command streams whose sub-address no engine claims.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Unaddressed {
    Drop,
    #[default]
    Log,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NcmConfig {
    /// Debug interconnect address of the module.
    pub module_addr: u16,
    /// Default destination of report events until the host rewrites it.
    pub event_dest: u16,
    pub version: u16,
    /// Flits per report packet, header included.
    pub max_pkt_len: usize,
    pub counter_width: u32,
    /// Report window in NoC cycles at reset; 0 disables the timers.
    pub max_clk_counter: u32,
    pub util_mode: UtilMode,
    pub unaddressed: Unaddressed,
    /// Send a fault report every window even when nothing changed.
    pub periodic_fault_report: bool,
    #[serde(skip)]
    pub mesh: MeshConfig,
}

impl Config for NcmConfig {}

impl Default for NcmConfig {
    fn default() -> Self {
        Self {
            module_addr: 5,
            event_dest: 0,
            version: 1,
            max_pkt_len: 12,
            counter_width: 32,
            max_clk_counter: 0,
            util_mode: UtilMode::Continuous,
            unaddressed: Unaddressed::Log,
            periodic_fault_report: false,
            mesh: MeshConfig::default(),
        }
    }
}

impl NcmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let min = Self::min_pkt_len(&Topology::new(&self.mesh)?);
        if self.max_pkt_len < min {
            return Err(ConfigError::PacketTooShort { len: self.max_pkt_len, min });
        }
        if !(1..=32).contains(&self.counter_width) {
            return Err(ConfigError::BadCounterWidth(self.counter_width));
        }
        Ok(())
    }

    /// Utilization packets are never split, so the busiest node's packet must fit whole.
    pub fn min_pkt_len(topology: &Topology) -> usize {
        MIN_PKT_LEN.max(HEADER_FLITS + 1 + topology.max_active_links())
    }

    /// Data words that fit in one report packet after the header and sub-id flit.
    pub fn data_words_per_packet(&self) -> usize {
        self.max_pkt_len - HEADER_FLITS - 1
    }

    pub fn counter_mask(&self) -> u32 {
        u32::MAX >> (32 - self.counter_width.clamp(1, 32))
    }

    /// Longest window for which no counter can wrap; links move at most one flit per cycle.
    pub fn max_window(&self) -> u32 {
        self.counter_mask()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation() {
        assert_eq!(Ok(()), NcmConfig::default().validate());
        let short = NcmConfig { max_pkt_len: 4, ..NcmConfig::default() };
        assert_eq!(Err(ConfigError::PacketTooShort { len: 4, min: 12 }), short.validate());
        let wide = NcmConfig { counter_width: 33, ..NcmConfig::default() };
        assert_eq!(Err(ConfigError::BadCounterWidth(33)), wide.validate());
        let narrow = NcmConfig { counter_width: 0, ..NcmConfig::default() };
        assert!(narrow.validate().is_err());
    }

    #[test]
    fn util_packet_must_fit() {
        // the centre of a 3x3 mesh has four mesh and four local links
        let tight = NcmConfig { max_pkt_len: 5, max_clk_counter: 20, ..NcmConfig::default() };
        assert_eq!(Err(ConfigError::PacketTooShort { len: 5, min: 12 }), tight.validate());
        let eleven = NcmConfig { max_pkt_len: 11, ..NcmConfig::default() };
        assert!(eleven.validate().is_err());

        let mesh = MeshConfig { x: 2, y: 1, local_links: 1, ..MeshConfig::default() };
        let small = NcmConfig { max_pkt_len: 5, mesh: mesh.clone(), ..NcmConfig::default() };
        assert_eq!(Err(ConfigError::PacketTooShort { len: 5, min: 6 }), small.validate());
        assert_eq!(Ok(()), NcmConfig { max_pkt_len: 6, mesh, ..NcmConfig::default() }.validate());

        let bare = MeshConfig { x: 1, y: 1, local_links: 0, ..MeshConfig::default() };
        assert_eq!(MIN_PKT_LEN, NcmConfig::min_pkt_len(&Topology::new(&bare).unwrap()));
    }

    #[test]
    fn counter_limits() {
        let c = NcmConfig { counter_width: 10, ..NcmConfig::default() };
        assert_eq!(0x3ff, c.counter_mask());
        assert_eq!(0x3ff, c.max_window());
        assert_eq!(u32::MAX, NcmConfig::default().counter_mask());
        assert_eq!(8, NcmConfig::default().data_words_per_packet());
    }
}
