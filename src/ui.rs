use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use toml::Table;

use crate::host::ClientConfig;
use crate::mesh::config::{MeshConfig, TrafficConfig};
use crate::ncm::NcmConfig;
use crate::sim::config::{CdcConfig, ClockConfig, Config, ScenarioConfig, SimConfig};
use crate::sim::top::{Sim, SimConfigs};

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct NcmArgs {
    #[arg(help = "Path to config.toml")]
    pub config_path: PathBuf,
    #[arg(long, help = "Override number of NoC cycles to simulate")]
    pub cycles: Option<u64>,
    #[arg(long, help = "Override mesh width")]
    pub x: Option<usize>,
    #[arg(long, help = "Override mesh height")]
    pub y: Option<usize>,
    #[arg(long, help = "Enable log at level (0:warn, 1:info, 2:debug)")]
    pub log: Option<u64>,
    #[arg(long, help = "Write a CSV trace of host flits to this path")]
    pub trace: Option<PathBuf>,
}

/// Reads every configuration section from the TOML text.
/// If `cli_args` is given, its options override the TOML.
pub fn load_configs(toml_string: &str, cli_args: Option<&NcmArgs>) -> anyhow::Result<SimConfigs> {
    let table: Table = toml::from_str(toml_string).context("cannot parse config toml")?;
    let mut configs = SimConfigs {
        sim: SimConfig::from_section(table.get("sim"))?,
        mesh: MeshConfig::from_section(table.get("mesh"))?,
        ncm: NcmConfig::from_section(table.get("ncm"))?,
        host: ClientConfig::from_section(table.get("host"))?,
        cdc: CdcConfig::from_section(table.get("cdc"))?,
        clocks: ClockConfig::from_section(table.get("clocks"))?,
        traffic: TrafficConfig::from_section(table.get("traffic"))?,
        scenario: ScenarioConfig::from_section(table.get("scenario"))?,
    };

    if let Some(args) = cli_args {
        configs.sim.cycles = args.cycles.unwrap_or(configs.sim.cycles);
        configs.sim.log_level = args.log.unwrap_or(configs.sim.log_level);
        configs.sim.trace = args.trace.clone().or(configs.sim.trace);
        configs.mesh.x = args.x.unwrap_or(configs.mesh.x);
        configs.mesh.y = args.y.unwrap_or(configs.mesh.y);
    }
    Ok(configs)
}

/// Make a Sim object from the TOML configuration.
pub fn make_sim(toml_string: &str, cli_args: Option<&NcmArgs>) -> anyhow::Result<Sim> {
    Sim::new(load_configs(toml_string, cli_args)?)
}

/// `env_logger` filter for a `--log` level, unless `RUST_LOG` says otherwise.
pub fn log_filter(level: u64) -> &'static str {
    match level {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}
