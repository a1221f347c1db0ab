use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::base::behavior::{ModuleBehaviors, Parameterizable};
use crate::base::module::{IsModule, ModuleBase};
use crate::cdc::{cdc_queue, CdcConsumer, CdcProducer};
use crate::mesh::fabric::MeshFabric;
use crate::mesh::topology::Topology;
use crate::ncm::arbiter::{Arbiter, Offer, Stream};
use crate::ncm::config::NcmConfig;
use crate::ncm::dispatch::{CommandDispatcher, Effect};
use crate::ncm::fault_detect::FaultDetector;
use crate::ncm::fault_inject;
use crate::ncm::front_end::FrontEndPorts;
use crate::ncm::header_strip::{HeaderStrip, Strip};
use crate::ncm::util::UtilMonitor;
use crate::packet::Flit;

/// Queue ends owned by the NoC domain.
pub struct NocPorts {
    pub rx: CdcConsumer<Flit>,
    pub tx: CdcProducer<Flit>,
    pub status_tx: CdcProducer<u32>,
}

/// Queue ends owned by the host.
pub struct HostPorts {
    pub tx: CdcProducer<Flit>,
    pub rx: CdcConsumer<Flit>,
}

/// Creates the five crossings between host, debug and NoC domains.
pub fn connect(depth: usize) -> (HostPorts, FrontEndPorts, NocPorts) {
    let (host_tx, fe_host_rx) = cdc_queue("host->debug", depth);
    let (fe_host_tx, host_rx) = cdc_queue("debug->host", depth);
    let (fe_noc_tx, noc_rx) = cdc_queue("debug->noc", depth);
    let (noc_tx, fe_noc_rx) = cdc_queue("noc->debug", depth);
    let (status_tx, status_rx) = cdc_queue("noc->debug status", depth);
    (
        HostPorts { tx: host_tx, rx: host_rx },
        FrontEndPorts {
            host_rx: fe_host_rx,
            host_tx: fe_host_tx,
            noc_tx: fe_noc_tx,
            noc_rx: fe_noc_rx,
            status_rx,
        },
        NocPorts { rx: noc_rx, tx: noc_tx, status_tx },
    )
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct NocStats {
    pub slot_commands: u64,
    pub fault_injections: u64,
    pub window_commands: u64,
    pub unaddressed_streams: u64,
    pub fault_reports: u64,
    pub util_reports: u64,
    pub util_overruns: u64,
    pub report_flits: u64,
}

/// Everything clocked by the NoC clock: the command path, both report engines, the output
/// arbiter and the mesh they observe and configure.
pub struct NocDomain<F: MeshFabric> {
    base: ModuleBase<NocStats, NcmConfig>,
    fabric: F,
    strip: HeaderStrip,
    dispatch: CommandDispatcher,
    faults: FaultDetector,
    util: UtilMonitor,
    arbiter: Arbiter,
    ports: NocPorts,
}

impl<F: MeshFabric> IsModule for NocDomain<F> {
    type StateType = NocStats;
    type ConfigType = NcmConfig;

    fn base(&mut self) -> &mut ModuleBase<NocStats, NcmConfig> {
        &mut self.base
    }

    fn base_ref(&self) -> &ModuleBase<NocStats, NcmConfig> {
        &self.base
    }
}

impl<F: MeshFabric> NocDomain<F> {
    pub fn new(config: Arc<NcmConfig>, topology: Arc<Topology>, fabric: F, ports: NocPorts) -> Self {
        let mut me = NocDomain {
            base: ModuleBase::default(),
            fabric,
            strip: HeaderStrip::new(config.clone()),
            dispatch: CommandDispatcher::new(config.clone()),
            faults: FaultDetector::new(config.clone(), topology.clone()),
            util: UtilMonitor::new(config.clone(), topology.clone()),
            arbiter: Arbiter::new(config.clone()),
            ports,
        };
        me.init_conf(config);
        let window = me.util.window();
        me.faults.set_window(window);
        me.publish_window(window);
        info!(
            "noc control module up: {}x{} mesh, window {}",
            topology.x_dim(),
            topology.y_dim(),
            window
        );
        me
    }

    pub fn fabric(&self) -> &F {
        &self.fabric
    }

    pub fn fabric_mut(&mut self) -> &mut F {
        &mut self.fabric
    }

    pub fn stats(&self) -> NocStats {
        NocStats {
            unaddressed_streams: self.dispatch.unaddressed(),
            fault_reports: self.faults.reports(),
            util_reports: self.util.reports(),
            util_overruns: self.util.overruns(),
            ..self.base.state
        }
    }

    pub fn window(&self) -> u32 {
        self.util.window()
    }

    fn publish_window(&mut self, window: u32) {
        if self.ports.status_tx.try_push(window).is_err() {
            warn!("status crossing full, window {} not mirrored", window);
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Slot(slot) => {
                debug!("slot command {:?}", slot);
                slot.apply(&mut self.fabric);
                self.base.state.slot_commands += 1;
            }
            Effect::FaultInject(word) => {
                fault_inject::inject(word, &mut self.fabric);
                self.base.state.fault_injections += 1;
            }
            Effect::Window(window) => {
                let effective = self.util.set_window(window);
                self.faults.set_window(effective);
                self.publish_window(effective);
                self.base.state.window_commands += 1;
            }
        }
    }

    /// One inbound flit through the header strip and the dispatcher. The engines never stall.
    fn command_path(&mut self) {
        let Some(&flit) = self.ports.rx.front() else {
            return;
        };
        match self.strip.step(flit, true) {
            Strip::Stall => return,
            Strip::Header => {}
            Strip::Forward(payload) => {
                if let Some(effect) = self.dispatch.step(payload) {
                    self.apply(effect);
                }
            }
        }
        self.ports.rx.pop();
    }

    fn report_path(&mut self) {
        self.faults.sample(&self.fabric);
        self.util.sample(&self.fabric);
        let ready = !self.ports.tx.full();
        let fault = self.faults.front().map(|flit| Offer { flit, closes: self.faults.closes() });
        let util = self.util.front().map(|flit| Offer { flit, closes: self.util.closes() });
        if let Some((stream, flit)) = self.arbiter.step(fault, util, ready) {
            self.ports.tx.push(flit);
            self.base.state.report_flits += 1;
            match stream {
                Stream::Fault => self.faults.accept(),
                Stream::Util => self.util.accept(),
            }
        }
    }
}

impl<F: MeshFabric> ModuleBehaviors for NocDomain<F> {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
        self.fabric.tick_one();
        self.command_path();
        self.report_path();
        self.strip.tick_one();
        self.dispatch.tick_one();
        self.faults.tick_one();
        self.util.tick_one();
        self.arbiter.tick_one();
    }

    fn reset(&mut self) {
        self.fabric.reset();
        self.strip.reset();
        self.dispatch.reset();
        self.faults.reset();
        self.util.reset();
        self.arbiter.reset();
        self.base.state = NocStats::default();
        let window = self.util.window();
        self.faults.set_window(window);
        self.publish_window(window);
    }
}
