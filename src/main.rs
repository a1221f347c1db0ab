use std::fs;

use anyhow::Context;
use clap::Parser;
use ncm::sim::top::Sim;
use ncm::ui::{load_configs, log_filter, NcmArgs};

pub fn main() -> anyhow::Result<()> {
    let argv = NcmArgs::parse();
    let config = fs::read_to_string(&argv.config_path)
        .with_context(|| format!("failed to read config file {}", argv.config_path.display()))?;
    let configs = load_configs(&config, Some(&argv))?;

    let filter = log_filter(configs.sim.log_level);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let mut sim = Sim::new(configs)?;
    let summary = sim.simulate();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
