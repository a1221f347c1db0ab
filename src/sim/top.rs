use std::collections::BTreeMap;
use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use crate::base::behavior::*;
use crate::base::module::IsModule;
use crate::host::client::{ChannelSummary, ClientConfig, ClientStats, ControlClient};
use crate::host::events::{DecoderStats, UtilTable};
use crate::host::port::HostPort;
use crate::mesh::classifier::ClassifierStats;
use crate::mesh::config::{MeshConfig, TrafficConfig};
use crate::mesh::{MeshModel, Topology};
use crate::ncm::{connect, FrontEndStats, NcmConfig, NocDomain, NocStats, RegisterFrontEnd};
use crate::packet::TrafficClass;
use crate::sim::clock::{ClockDomain, Cycle, MultiClock};
use crate::sim::config::{CdcConfig, ChannelRequest, ClockConfig, FaultEvent, RecordWindow, ScenarioConfig, SimConfig};
use crate::sim::trace::FlitTrace;

const HOST: usize = 0;
const DEBUG: usize = 1;
const NOC: usize = 2;

/// Every configuration section of a run.
#[derive(Debug, Clone, Default)]
pub struct SimConfigs {
    pub sim: SimConfig,
    pub mesh: MeshConfig,
    pub ncm: NcmConfig,
    pub host: ClientConfig,
    pub cdc: CdcConfig,
    pub clocks: ClockConfig,
    pub traffic: TrafficConfig,
    pub scenario: ScenarioConfig,
}

/// Scenario steps the host performs, keyed by NoC cycle.
struct HostScript {
    window: Option<u32>,
    channels: Vec<ChannelRequest>,
    faults: Vec<FaultEvent>,
    next: usize,
    started: bool,
}

impl HostScript {
    fn step(&mut self, client: &mut ControlClient, now: Cycle) {
        if !self.started && client.ready() {
            self.started = true;
            if let Some(window) = self.window {
                client.activate_monitoring(window);
            }
            for req in &self.channels {
                if let Err(e) = client.create_tdm_channel(req.src, req.dest, req.slots, true) {
                    warn!("channel {} -> {} not created: {}", req.src, req.dest, e);
                }
            }
        }
        // faults wait until the host knows the mesh
        while self.started && self.next < self.faults.len() && self.faults[self.next].cycle <= now {
            let f = self.faults[self.next];
            client.configure_fault(f.node, f.link, f.set);
            self.next += 1;
        }
    }
}

/// Scenario steps applied to the mesh itself.
struct NocScript {
    faults: Vec<FaultEvent>,
    records: Vec<RecordWindow>,
    next: usize,
}

impl NocScript {
    fn step(&mut self, mesh: &mut MeshModel, now: Cycle) {
        while self.next < self.faults.len() && self.faults[self.next].cycle <= now {
            let f = self.faults[self.next];
            mesh.force_fault(f.node, f.link, f.set);
            self.next += 1;
        }
        mesh.set_recording(self.records.iter().any(|r| (r.start..r.end).contains(&now)));
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub noc_cycles: Cycle,
    pub host_ready: bool,
    /// Fault bitmaps as last reported to the host.
    pub faults: Vec<u8>,
    pub util_tdm: UtilTable,
    pub util_be: UtilTable,
    pub decoder: DecoderStats,
    pub client: ClientStats,
    pub noc: NocStats,
    pub front_end: FrontEndStats,
    pub registers: BTreeMap<&'static str, u16>,
    pub traffic: ClassifierStats,
    pub channels: Vec<ChannelSummary>,
}

/// Host, module and mesh wired through their domain crossings.
pub struct Sim {
    config: SimConfig,
    clock_config: ClockConfig,
    clocks: MultiClock,
    client: ControlClient,
    host_script: HostScript,
    fe: RegisterFrontEnd,
    noc: NocDomain<MeshModel>,
    noc_script: NocScript,
    trace: Option<Arc<FlitTrace>>,
}

impl Sim {
    pub fn new(configs: SimConfigs) -> anyhow::Result<Sim> {
        let SimConfigs { sim, mesh, ncm, host, cdc, clocks, traffic, scenario } = configs;
        let topology = Arc::new(Topology::new(&mesh)?);
        let ncm = NcmConfig { mesh: mesh.clone(), ..ncm };
        ncm.validate()?;
        cdc.validate()?;
        let clock = MultiClock::new(vec![
            ClockDomain::new("host", clocks.host_mhz)?,
            ClockDomain::new("debug", clocks.debug_mhz)?,
            ClockDomain::new("noc", clocks.noc_mhz)?,
        ]);

        let trace = match &sim.trace {
            Some(path) => Some(Arc::new(FlitTrace::create(path)?)),
            None => None,
        };
        let (host_ports, fe_ports, noc_ports) = connect(cdc.depth);
        let mut port = HostPort::new(host_ports);
        if let Some(trace) = &trace {
            port = port.with_trace(trace.clone());
        }
        let host = ClientConfig {
            module_addr: ncm.module_addr,
            local_links: mesh.local_links,
            endpoints: scenario.endpoints.or(host.endpoints),
            ..host
        };

        let (mut injected, mut forced): (Vec<FaultEvent>, Vec<FaultEvent>) =
            scenario.faults.iter().partition(|f| f.inject);
        injected.sort_by_key(|f| f.cycle);
        forced.sort_by_key(|f| f.cycle);

        let ncm = Arc::new(ncm);
        let fabric = MeshModel::new(Arc::new(traffic), topology.clone());
        info!(
            "sim: {}x{} mesh, clocks host {} / debug {} / noc {} MHz",
            mesh.x, mesh.y, clocks.host_mhz, clocks.debug_mhz, clocks.noc_mhz
        );
        Ok(Sim {
            config: sim,
            clock_config: clocks,
            clocks: clock,
            client: ControlClient::new(Arc::new(host), port),
            host_script: HostScript {
                window: scenario.window,
                channels: scenario.channels,
                faults: injected,
                next: 0,
                started: false,
            },
            fe: RegisterFrontEnd::new(ncm.clone(), topology.clone(), fe_ports),
            noc: NocDomain::new(ncm, topology, fabric, noc_ports),
            noc_script: NocScript { faults: forced, records: scenario.records, next: 0 },
            trace,
        })
    }

    pub fn client(&self) -> &ControlClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut ControlClient {
        &mut self.client
    }

    pub fn front_end(&self) -> &RegisterFrontEnd {
        &self.fe
    }

    pub fn noc(&self) -> &NocDomain<MeshModel> {
        &self.noc
    }

    pub fn noc_mut(&mut self) -> &mut NocDomain<MeshModel> {
        &mut self.noc
    }

    /// Runs the configured number of NoC cycles and summarizes what the host saw.
    pub fn simulate(&mut self) -> RunSummary {
        if self.config.threaded {
            self.run_threaded(self.config.cycles);
        } else {
            self.run(self.config.cycles);
        }
        if let Some(trace) = &self.trace {
            trace.flush();
        }
        self.summary()
    }

    /// Deterministic run: every domain ticks on its own clock edges until the NoC domain has
    /// advanced by `cycles`.
    pub fn run(&mut self, cycles: Cycle) {
        let end = self.clocks.domain(NOC).cycles() + cycles;
        while self.clocks.domain(NOC).cycles() < end {
            let noc_now = self.noc.now();
            for idx in self.clocks.step() {
                match idx {
                    HOST => {
                        self.host_script.step(&mut self.client, noc_now);
                        self.client.tick_one();
                    }
                    DEBUG => self.fe.tick_one(),
                    _ => {
                        self.noc_script.step(self.noc.fabric_mut(), noc_now);
                        self.noc.tick_one();
                    }
                }
            }
        }
    }

    /// Each domain on its own thread for its share of `cycles` NoC cycles. Domains only meet in
    /// the crossing queues, so the interleaving is free but ordering within each queue holds.
    pub fn run_threaded(&mut self, cycles: Cycle) {
        let noc_mhz = self.clock_config.noc_mhz;
        let scale = |mhz: u64| cycles * mhz / noc_mhz;
        let (host_cycles, debug_cycles) = (scale(self.clock_config.host_mhz), scale(self.clock_config.debug_mhz));
        let host_mhz = self.clock_config.host_mhz;
        let noc_start = self.noc.now();
        let Sim { client, host_script, fe, noc, noc_script, .. } = self;
        std::thread::scope(|s| {
            s.spawn(move || {
                for c in 0..host_cycles {
                    host_script.step(client, noc_start + c * noc_mhz / host_mhz);
                    client.tick_one();
                }
            });
            s.spawn(move || (0..debug_cycles).for_each(|_| fe.tick_one()));
            s.spawn(move || {
                for _ in 0..cycles {
                    let now = noc.now();
                    noc_script.step(noc.fabric_mut(), now);
                    noc.tick_one();
                }
            });
        });
    }

    pub fn summary(&self) -> RunSummary {
        let events = self.client.events();
        RunSummary {
            noc_cycles: self.noc.now(),
            host_ready: self.client.ready(),
            faults: events.map(|e| e.faults().to_vec()).unwrap_or_default(),
            util_tdm: events.map(|e| e.util(TrafficClass::Tdm).clone()).unwrap_or_default(),
            util_be: events.map(|e| e.util(TrafficClass::Be).clone()).unwrap_or_default(),
            decoder: events.map(|e| e.stats()).unwrap_or_default(),
            client: self.client.stats(),
            noc: self.noc.stats(),
            front_end: self.fe.stats(),
            registers: self.fe.registers().snapshot(),
            traffic: self.noc.fabric().traffic_totals(),
            channels: self.client.channels(),
        }
    }
}

impl ModuleBehaviors for Sim {
    fn tick_one(&mut self) {
        self.run(1);
    }

    fn reset(&mut self) {
        self.client.reset();
        self.fe.reset();
        self.noc.reset();
        self.host_script.next = 0;
        self.host_script.started = false;
        self.noc_script.next = 0;
    }
}
