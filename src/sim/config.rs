use std::path::PathBuf;

use anyhow::Context;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::*;

use crate::error::ConfigError;

pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> anyhow::Result<Self> {
        match section {
            Some(value) => value
                .clone()
                .try_into()
                .with_context(|| format!("cannot deserialize {}", std::any::type_name::<Self>())),
            None => {
                warn!("config section for {} not found, using defaults", std::any::type_name::<Self>());
                Ok(Self::default())
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    /// NoC cycles to simulate.
    pub cycles: u64,
    pub log_level: u64,
    /// CSV trace of host-visible flits.
    pub trace: Option<PathBuf>,
    /// Run every clock domain on its own thread.
    pub threaded: bool,
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            cycles: 2000,
            log_level: 0,
            trace: None,
            threaded: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct CdcConfig {
    pub depth: usize,
}

impl Config for CdcConfig {}

impl Default for CdcConfig {
    fn default() -> Self {
        Self { depth: 16 }
    }
}

impl CdcConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ClockConfig {
    pub host_mhz: u64,
    pub debug_mhz: u64,
    pub noc_mhz: u64,
}

impl Config for ClockConfig {}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            host_mhz: 50,
            debug_mhz: 50,
            noc_mhz: 100,
        }
    }
}

/// Link fault applied at a NoC cycle, either through the host (injection command) or directly
/// on the fabric.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct FaultEvent {
    pub cycle: u64,
    pub node: usize,
    pub link: u8,
    #[serde(default = "default_true")]
    pub set: bool,
    #[serde(default = "default_true")]
    pub inject: bool,
}

/// External recording signal active for NoC cycles `start..end`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RecordWindow {
    pub start: u64,
    pub end: u64,
}

/// TDM channel requested by the host at start-up.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    pub src: usize,
    pub dest: usize,
    #[serde(default = "default_slots")]
    pub slots: usize,
}

fn default_true() -> bool {
    true
}

fn default_slots() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Window length written by the host when it activates monitoring; `None` leaves reporting
    /// inactive.
    pub window: Option<u32>,
    /// TDM endpoints per node, as the host learns them out of band.
    pub endpoints: Option<usize>,
    pub channels: Vec<ChannelRequest>,
    pub faults: Vec<FaultEvent>,
    pub records: Vec<RecordWindow>,
}

impl Config for ScenarioConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let table: Table = toml::from_str("[sim]\ncycles = 10\n").unwrap();
        let sim = SimConfig::from_section(table.get("sim")).unwrap();
        assert_eq!(10, sim.cycles);
        assert!(!sim.threaded);
        let clocks = ClockConfig::from_section(table.get("clocks")).unwrap();
        assert_eq!(100, clocks.noc_mhz);
    }

    #[test]
    fn scenario_lists_parse() {
        let text = r#"
            [scenario]
            window = 100
            [[scenario.faults]]
            cycle = 40
            node = 4
            link = 1
            [[scenario.faults]]
            cycle = 90
            node = 4
            link = 1
            set = false
            inject = false
            [[scenario.records]]
            start = 10
            end = 20
            [[scenario.channels]]
            src = 0
            dest = 8
        "#;
        let table: Table = toml::from_str(text).unwrap();
        let scenario = ScenarioConfig::from_section(table.get("scenario")).unwrap();
        assert_eq!(Some(100), scenario.window);
        assert_eq!(2, scenario.faults.len());
        assert!(scenario.faults[0].set && scenario.faults[0].inject);
        assert!(!scenario.faults[1].set && !scenario.faults[1].inject);
        assert_eq!(RecordWindow { start: 10, end: 20 }, scenario.records[0]);
        assert_eq!(1, scenario.channels[0].slots);
    }

    #[test]
    fn bad_section_is_an_error() {
        let table: Table = toml::from_str("[cdc]\ndepth = \"deep\"\n").unwrap();
        assert!(CdcConfig::from_section(table.get("cdc")).is_err());
    }
}
