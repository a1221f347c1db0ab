pub mod aggregator;
pub mod reporter;

use std::sync::Arc;

use log::{debug, warn};

use crate::base::behavior::{ModuleBehaviors, Parameterizable};
use crate::base::module::IsModule;
use crate::base::module::{module, ModuleBase};
use crate::mesh::fabric::UtilSource;
use crate::mesh::topology::Topology;
use crate::ncm::config::NcmConfig;
use crate::packet::Flit;

pub use aggregator::{UtilAggregator, UtilSnapshot};
pub use reporter::UtilReporter;

#[derive(Debug, Default)]
pub struct UtilState {
    aggregator: UtilAggregator,
    reporter: UtilReporter,
    window: u32,
    reports: u64,
}

/// Utilization aggregator and its report builder.
pub struct UtilMonitor {
    base: ModuleBase<UtilState, NcmConfig>,
    topology: Arc<Topology>,
}

module!(UtilMonitor, UtilState, NcmConfig,);

impl UtilMonitor {
    pub fn new(config: Arc<NcmConfig>, topology: Arc<Topology>) -> Self {
        let mut me = UtilMonitor {
            base: ModuleBase::with_state(Self::initial_state(&config, &topology)),
            topology,
        };
        me.init_conf(config);
        me
    }

    fn initial_state(config: &NcmConfig, topology: &Topology) -> UtilState {
        UtilState {
            aggregator: UtilAggregator::new(topology.num_nodes()),
            window: config.max_clk_counter.min(config.max_window()),
            ..UtilState::default()
        }
    }

    /// Sets the report window and restarts counting. Returns the window actually in effect,
    /// which is clamped so that no counter can wrap.
    pub fn set_window(&mut self, window: u32) -> u32 {
        let max = self.conf().max_window();
        let effective = if window > max {
            warn!("window {} exceeds the {}-bit counter range, clamped to {}", window, self.conf().counter_width, max);
            max
        } else {
            window
        };
        debug!("utilization window {}", effective);
        self.base.state.window = effective;
        self.base.state.aggregator.restart();
        effective
    }

    pub fn window(&self) -> u32 {
        self.base.state.window
    }

    pub fn sample(&mut self, source: &dyn UtilSource) {
        let mode = self.conf().util_mode;
        let mask = self.conf().counter_mask();
        let state = &mut self.base.state;
        if let Some(snapshot) = state.aggregator.step(&self.topology, source, mode, state.window, mask) {
            state.reporter.offer(snapshot);
        }
        state.reporter.start();
    }

    pub fn front(&self) -> Option<Flit> {
        let conf = self.conf();
        self.base.state.reporter.front(&self.topology, conf.event_dest, conf.module_addr)
    }

    /// The presented flit is the last one of the report under way.
    pub fn closes(&self) -> bool {
        self.base.state.reporter.closes(&self.topology)
    }

    pub fn accept(&mut self) {
        if self.base.state.reporter.accept(&self.topology) {
            self.base.state.reports += 1;
        }
    }

    /// A report is being sent or waits to be sent.
    pub fn pending(&self) -> bool {
        self.base.state.reporter.busy()
    }

    pub fn reports(&self) -> u64 {
        self.base.state.reports
    }

    pub fn overruns(&self) -> u64 {
        self.base.state.reporter.overruns()
    }
}

impl ModuleBehaviors for UtilMonitor {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        let state = Self::initial_state(self.conf(), &self.topology);
        self.base.state = state;
    }
}
