use std::sync::Arc;

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::base::behavior::{ModuleBehaviors, Parameterizable};
use crate::base::module::IsModule;
use crate::base::module::{module, ModuleBase};
use crate::mesh::classifier::{ClassifierStats, PacketClassifier};
use crate::mesh::config::TrafficConfig;
use crate::mesh::fabric::{ConfigSink, FaultSource, UtilSample, UtilSource};
use crate::mesh::slot_table::{NodeTables, TableKind, EMPTY_SLOT, NI_LINKS};
use crate::mesh::topology::{Topology, MAX_LINKS, MESH_LINKS};
use crate::packet::{Flit, TrafficClass};

/// First local link that carries tile-to-router traffic; lower local links are router-to-tile.
const TILE_TO_ROUTER: u8 = MESH_LINKS + NI_LINKS as u8;

#[derive(Debug, Clone, Copy, Default)]
struct OpenPacket {
    class: TrafficClass,
    sent: usize,
}

pub struct MeshState {
    tables: Vec<NodeTables>,
    inject: Vec<u8>,
    forced: Vec<u8>,
    classifiers: Vec<Vec<PacketClassifier>>,
    open: Vec<[Option<OpenPacket>; MAX_LINKS]>,
    recording: bool,
    rng: StdRng,
    seq: u16,
}

impl Default for MeshState {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            inject: Vec::new(),
            forced: Vec::new(),
            classifiers: Vec::new(),
            open: Vec::new(),
            recording: false,
            rng: StdRng::seed_from_u64(0),
            seq: 0,
        }
    }
}

/// Reference data plane: slot tables, link enables, fault state and a synthetic traffic source
/// whose transfers are observed by one classifier per link.
pub struct MeshModel {
    base: ModuleBase<MeshState, TrafficConfig>,
    topology: Arc<Topology>,
}

module!(MeshModel, MeshState, TrafficConfig,);

impl MeshModel {
    pub fn new(config: Arc<TrafficConfig>, topology: Arc<Topology>) -> Self {
        let mut me = MeshModel {
            base: ModuleBase::<MeshState, TrafficConfig> {
                state: Self::initial_state(&config, &topology),
                ..ModuleBase::default()
            },
            topology,
        };
        me.init_conf(config);
        me
    }

    fn initial_state(config: &TrafficConfig, topology: &Topology) -> MeshState {
        let n = topology.num_nodes();
        let max_flits = config.packet_flits.max(1);
        MeshState {
            tables: vec![NodeTables::new(topology.lut_size()); n],
            inject: vec![0; n],
            forced: vec![0; n],
            classifiers: vec![vec![PacketClassifier::new(max_flits); MAX_LINKS]; n],
            open: vec![[None; MAX_LINKS]; n],
            recording: false,
            rng: StdRng::seed_from_u64(config.seed),
            seq: 0,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn read_router_slot(&self, node: usize, table: u8, slot: u8) -> Option<u8> {
        let tables = self.base.state.tables.get(node)?;
        tables.table(TableKind::Router, table).map(|t| t.read(slot))
    }

    pub fn read_ni_slot(&self, node: usize, table: u8, slot: u8) -> Option<u8> {
        let tables = self.base.state.tables.get(node)?;
        tables.table(TableKind::Ni, table).map(|t| t.read(slot))
    }

    pub fn link_enabled(&self, node: usize, endpoint: u8, link: u8) -> bool {
        self.base.state.tables.get(node).is_some_and(|t| t.link_enabled(endpoint, link))
    }

    pub fn fault_inject(&self, node: usize) -> u8 {
        self.base.state.inject.get(node).copied().unwrap_or(0)
    }

    /// Marks a link faulty independent of the injection byte, as a broken wire would.
    pub fn force_fault(&mut self, node: usize, link: u8, set: bool) {
        let Some(bits) = self.base.state.forced.get_mut(node) else {
            debug!("force_fault: node {} outside the mesh", node);
            return;
        };
        let bit = 1u8.checked_shl(link as u32).unwrap_or(0);
        if set {
            *bits |= bit;
        } else {
            *bits &= !bit;
        }
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.base.state.recording = recording;
    }

    pub fn classifier_stats(&self, node: usize, link: u8) -> ClassifierStats {
        self.base.state.classifiers[node][link as usize].stats()
    }

    /// Classifier totals over every tile port of the mesh.
    pub fn traffic_totals(&self) -> ClassifierStats {
        let mut total = ClassifierStats::default();
        for s in self.base.state.classifiers.iter().flatten().map(PacketClassifier::stats) {
            total.tdm_flits += s.tdm_flits;
            total.be_flits += s.be_flits;
            total.tdm_packets += s.tdm_packets;
            total.be_packets += s.be_packets;
            total.framing_faults += s.framing_faults;
        }
        total
    }

    fn tdm_grant(&self, node: usize, link: u8) -> bool {
        let tables = &self.base.state.tables[node];
        let cycle = self.base.cycle;
        if link < TILE_TO_ROUTER {
            tables.router[link as usize].active(cycle) != EMPTY_SLOT
        } else {
            let ni_link = link - TILE_TO_ROUTER;
            tables.link_in_use(ni_link)
                && tables
                    .table(TableKind::Ni, ni_link)
                    .is_some_and(|t| t.active(cycle) != EMPTY_SLOT)
        }
    }

    fn transfer(&mut self, node: usize, link: u8) -> Option<(Flit, TrafficClass)> {
        if self.fault_bitmap(node) & (1 << link) != 0 {
            return None;
        }
        let grant = self.tdm_grant(node, link);
        let be_rate = self.conf().be_rate.clamp(0.0, 1.0);
        let packet_flits = self.conf().packet_flits.max(1);
        let state = &mut self.base.state;
        let open = state.open[node][link as usize];

        let class = match open {
            Some(p) => p.class,
            None if grant => TrafficClass::Tdm,
            None if state.rng.gen_bool(be_rate) => TrafficClass::Be,
            None => return None,
        };
        // an open TDM packet only advances in granted slots
        if class == TrafficClass::Tdm && !grant {
            return None;
        }
        let sent = open.map_or(0, |p| p.sent) + 1;
        let last = sent == packet_flits;
        state.open[node][link as usize] = (!last).then_some(OpenPacket { class, sent });
        state.seq = state.seq.wrapping_add(1);
        Some((Flit::new(state.seq, last), class))
    }
}

impl FaultSource for MeshModel {
    fn fault_bitmap(&self, node: usize) -> u8 {
        let state = &self.base.state;
        state.inject.get(node).copied().unwrap_or(0) | state.forced.get(node).copied().unwrap_or(0)
    }
}

impl UtilSource for MeshModel {
    fn util_sample(&self, node: usize, link: u8) -> UtilSample {
        self.base
            .state
            .classifiers
            .get(node)
            .and_then(|c| c.get(link as usize))
            .map(PacketClassifier::sample)
            .unwrap_or_default()
    }

    fn recording(&self) -> bool {
        self.base.state.recording
    }
}

impl ConfigSink for MeshModel {
    fn write_router_slot(&mut self, node: u16, table: u8, slot: u8, value: u8) {
        match self
            .base
            .state
            .tables
            .get_mut(node as usize)
            .and_then(|t| t.table_mut(TableKind::Router, table))
        {
            Some(t) => t.write(slot, value),
            None => trace!("router slot write to node {} table {} ignored", node, table),
        }
    }

    fn write_ni_slot(&mut self, node: u16, table: u8, slot: u8, value: u8) {
        match self
            .base
            .state
            .tables
            .get_mut(node as usize)
            .and_then(|t| t.table_mut(TableKind::Ni, table))
        {
            Some(t) => t.write(slot, value),
            None => trace!("ni slot write to node {} table {} ignored", node, table),
        }
    }

    fn set_link_enable(&mut self, node: u16, endpoint: u8, link: u8, enable: bool) {
        match self.base.state.tables.get_mut(node as usize) {
            Some(t) => t.set_link_enable(endpoint, link, enable),
            None => trace!("link enable for node {} ignored", node),
        }
    }

    fn set_fault_inject(&mut self, node: u8, mask: u8) {
        match self.base.state.inject.get_mut(node as usize) {
            Some(bits) => *bits = mask,
            None => trace!("fault injection for node {} ignored", node),
        }
    }
}

impl ModuleBehaviors for MeshModel {
    fn tick_one(&mut self) {
        let topology = self.topology.clone();
        for info in topology.nodes() {
            for &link in &info.active_links {
                let transfer = self.transfer(info.id, link);
                self.base.state.classifiers[info.id][link as usize].observe(transfer);
            }
        }
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        let state = Self::initial_state(self.conf(), &self.topology);
        self.base.state = state;
        self.base.cycle = 0;
    }
}
