use super::config::{ChannelRequest, FaultEvent, RecordWindow, ScenarioConfig, SimConfig};
use super::top::{Sim, SimConfigs};
use crate::base::module::IsModule;
use crate::mesh::config::TrafficConfig;
use crate::ncm::regs::{REG_CS, REG_DIMENSIONS};
use crate::packet::encode_dimensions;

fn configs(scenario: ScenarioConfig) -> SimConfigs {
    SimConfigs {
        traffic: TrafficConfig { be_rate: 0.0, ..TrafficConfig::default() },
        scenario,
        ..SimConfigs::default()
    }
}

fn fault(cycle: u64, node: usize, link: u8, inject: bool) -> FaultEvent {
    FaultEvent { cycle, node, link, set: true, inject }
}

#[test]
fn host_learns_the_mesh_through_registers() {
    let mut sim = Sim::new(configs(ScenarioConfig::default())).unwrap();
    sim.run(1000);
    let client = sim.client();
    assert!(client.ready());
    assert_eq!(Some(encode_dimensions(3, 3)), client.register(REG_DIMENSIONS));
    assert_eq!(0, client.stats().register_errors);
    assert_eq!(1, sim.front_end().registers().event_dest());
}

#[test]
fn forced_fault_is_reported_to_the_host() {
    let scenario = ScenarioConfig {
        window: Some(100),
        faults: vec![fault(300, 4, 2, false)],
        ..ScenarioConfig::default()
    };
    let mut sim = Sim::new(configs(scenario)).unwrap();
    sim.run(1000);
    let summary = sim.summary();
    assert_eq!(0x04, summary.faults[4]);
    assert_eq!(1, summary.noc.fault_reports);
    assert_eq!(1, summary.decoder.fault_reports);
    assert_eq!(Some(1), sim.client().register(REG_CS));
}

#[test]
fn injected_fault_goes_through_the_command_path() {
    let scenario = ScenarioConfig {
        window: Some(100),
        faults: vec![fault(300, 2, 1, true)],
        ..ScenarioConfig::default()
    };
    let mut sim = Sim::new(configs(scenario)).unwrap();
    sim.run(1000);
    let summary = sim.summary();
    assert_eq!(1, summary.noc.fault_injections);
    assert_eq!(0x02, sim.noc().fabric().fault_inject(2));
    assert_eq!(0x02, summary.faults[2]);
    assert_eq!(0x02, sim.client().fault_vector()[2]);
}

#[test]
fn requested_channel_is_programmed() {
    let scenario = ScenarioConfig {
        channels: vec![ChannelRequest { src: 0, dest: 8, slots: 2 }],
        ..ScenarioConfig::default()
    };
    let mut sim = Sim::new(configs(scenario)).unwrap();
    sim.run(2000);
    let summary = sim.summary();
    assert_eq!(1, summary.channels.len());
    assert_eq!(2, summary.channels[0].paths.len());
    assert!(summary.channels[0].paths.iter().all(|p| p.slots.len() == 2));
    let mesh = sim.noc().fabric();
    assert_eq!(Some(4), mesh.read_router_slot(0, 1, 0));
    assert_eq!(Some(4), mesh.read_router_slot(0, 1, 1));
    assert!(mesh.link_enabled(0, 0, 1));
}

#[test]
fn utilization_reaches_the_host_while_recording() {
    let scenario = ScenarioConfig {
        window: Some(200),
        records: vec![RecordWindow { start: 0, end: 2000 }],
        ..ScenarioConfig::default()
    };
    let mut configs = configs(scenario);
    configs.traffic.be_rate = 0.2;
    let mut sim = Sim::new(configs).unwrap();
    sim.run(2000);
    let summary = sim.summary();
    assert!(summary.noc.util_reports > 0);
    assert!(summary.decoder.util_packets > 0);
    assert!(summary.util_be.iter().flatten().any(|&v| v > 0));
    assert!(summary.traffic.be_flits > 0);
}

#[test]
fn threaded_run_then_clocked_run_settles() {
    let mut sim = Sim::new(configs(ScenarioConfig { window: Some(100), ..ScenarioConfig::default() })).unwrap();
    sim.run_threaded(1000);
    sim.run(1000);
    assert!(sim.client().ready());
    assert_eq!(2000, sim.noc().now());
}

#[test]
fn summary_and_trace_are_written() {
    let path = std::env::temp_dir().join(format!("ncm_trace_{}.csv", std::process::id()));
    let mut configs = configs(ScenarioConfig::default());
    configs.sim = SimConfig { cycles: 500, trace: Some(path.clone()), ..SimConfig::default() };
    let mut sim = Sim::new(configs).unwrap();
    let summary = sim.simulate();
    let json = serde_json::to_string(&summary).unwrap();
    assert!(json.contains("\"registers\""));
    assert!(json.contains("\"lut_size\""));

    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(Some("cycle,domain,direction,data,last"), lines.next());
    assert!(lines.any(|l| l.contains(",host,down,")));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn bad_mesh_is_refused() {
    let mut configs = configs(ScenarioConfig::default());
    configs.mesh.x = 5;
    configs.mesh.y = 4;
    assert!(Sim::new(configs).is_err());
}
