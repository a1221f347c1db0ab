use std::collections::{BTreeMap, VecDeque};
use std::iter::once;
use std::sync::Arc;

use log::{debug, info, warn};
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::error::TdmError;
use crate::host::events::{EventDecoder, Report};
use crate::host::path::{find_path_b, find_path_xy, is_valid_path};
use crate::host::port::HostPort;
use crate::host::tdm::{path_entries, EndpointDir, TableEntry, TdmChannel, TdmInfo, TdmPath};
use crate::mesh::config::MeshConfig;
use crate::mesh::slot_table::{EMPTY_SLOT, NI_LINKS};
use crate::mesh::topology::Topology;
use crate::ncm::regs::*;
use crate::packet::{
    decode_dimensions, split_window, DebugPacket, FaultWord, PacketType, RegSubtype, SlotWord, SubAddress,
    TargetWord,
};
use crate::sim::config::Config;

/// Table entries carried by one slot-configuration packet; keeps it within a 12-flit packet.
const ENTRIES_PER_PACKET: usize = 4;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug interconnect address of the host.
    pub addr: u16,
    pub module_addr: u16,
    /// Router-to-tile links per node; not readable from the module.
    pub local_links: usize,
    /// TDM endpoints per node; the advertised max-ports register when unset.
    pub endpoints: Option<usize>,
}

impl Config for ClientConfig {}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: 1,
            module_addr: 5,
            local_links: 4,
            endpoints: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegOp {
    Read(u16),
    Write(u16, u16),
}

/// Mesh parameters learned from the module's registers.
#[derive(Debug, Clone)]
pub struct Layout {
    pub topology: Arc<Topology>,
    pub max_ports: u16,
    pub simple: bool,
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct ClientStats {
    pub commands: u64,
    pub register_ops: u64,
    pub register_errors: u64,
    pub events: u64,
    pub rejected_events: u64,
    pub foreign_packets: u64,
}

#[derive(Default)]
pub struct ClientState {
    /// Register requests waiting for their response; the module answers in order.
    pending: VecDeque<RegOp>,
    registers: BTreeMap<u16, u16>,
    layout: Option<Layout>,
    tdm: Option<TdmInfo>,
    decoder: Option<EventDecoder>,
    paths: Vec<Option<TdmPath>>,
    channels: Vec<Option<TdmChannel>>,
    /// Fault-injection bytes last sent to each node.
    fault_vector: Vec<u8>,
    stats: ClientStats,
}

#[derive(Debug, Serialize)]
pub struct ChannelSummary {
    pub id: usize,
    #[serde(flatten)]
    pub channel: TdmChannel,
    pub paths: Vec<TdmPath>,
}

/// Host-side driver of the NoC control module: register access, slot-table programming,
/// fault injection, monitoring control, TDM channel management and report decoding.
pub struct ControlClient {
    base: ModuleBase<ClientState, ClientConfig>,
    port: HostPort,
}

module!(ControlClient, ClientState, ClientConfig,);

impl ModuleBehaviors for ControlClient {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
        self.port.tick(self.base.cycle);
        while let Some(packet) = self.port.recv() {
            self.receive(packet);
        }
    }

    fn reset(&mut self) {
        self.port.reset();
        self.base.state = ClientState::default();
        self.start();
    }
}

impl ControlClient {
    pub fn new(config: Arc<ClientConfig>, port: HostPort) -> Self {
        let mut me = ControlClient { base: ModuleBase::default(), port };
        me.init_conf(config);
        me.start();
        me
    }

    /// Reads the mesh layout and claims the report events.
    fn start(&mut self) {
        for addr in [REG_LUT_SIZE, REG_DIMENSIONS, REG_MAX_PORTS, REG_SIMPLE] {
            self.read_register(addr);
        }
        let addr = self.conf().addr;
        self.write_register(REG_EVENT_DEST, addr);
    }

    /// Layout known and every register request answered.
    pub fn ready(&self) -> bool {
        self.base.state.layout.is_some() && self.base.state.pending.is_empty()
    }

    pub fn idle(&self) -> bool {
        self.base.state.pending.is_empty() && self.port.idle()
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.base.state.layout.as_ref()
    }

    pub fn stats(&self) -> ClientStats {
        self.base.state.stats
    }

    pub fn events(&self) -> Option<&EventDecoder> {
        self.base.state.decoder.as_ref()
    }

    pub fn tdm(&self) -> Option<&TdmInfo> {
        self.base.state.tdm.as_ref()
    }

    pub fn fault_vector(&self) -> &[u8] {
        &self.base.state.fault_vector
    }

    /// Last value read from or acknowledged for `addr`.
    pub fn register(&self, addr: u16) -> Option<u16> {
        self.base.state.registers.get(&addr).copied()
    }

    pub fn read_register(&mut self, addr: u16) {
        self.register_op(RegOp::Read(addr));
    }

    pub fn write_register(&mut self, addr: u16, value: u16) {
        self.register_op(RegOp::Write(addr, value));
    }

    fn register_op(&mut self, op: RegOp) {
        let (subtype, payload) = match op {
            RegOp::Read(addr) => (RegSubtype::ReadReq16, vec![addr]),
            RegOp::Write(addr, value) => (RegSubtype::WriteReq16, vec![addr, value]),
        };
        let conf = self.conf();
        let packet = DebugPacket::new(conf.module_addr, conf.addr, PacketType::Reg, subtype as u8)
            .with_payload(payload);
        self.port.send(&packet);
        self.base.state.pending.push_back(op);
        self.base.state.stats.register_ops += 1;
    }

    fn send_command(&mut self, payload: impl IntoIterator<Item = u16>) {
        let conf = self.conf();
        let packet = DebugPacket::event(conf.module_addr, conf.addr, false).with_payload(payload);
        self.port.send(&packet);
        self.base.state.stats.commands += 1;
    }

    fn receive(&mut self, packet: DebugPacket) {
        if packet.dest != self.conf().addr {
            self.base.state.stats.foreign_packets += 1;
            debug!("host ignores packet for {:#06x}", packet.dest);
            return;
        }
        match packet.packet_type() {
            Some(PacketType::Reg) => self.register_response(&packet),
            Some(PacketType::Event) => self.event(packet),
            _ => warn!("host cannot handle {}", packet),
        }
    }

    fn register_response(&mut self, packet: &DebugPacket) {
        let Some(op) = self.base.state.pending.pop_front() else {
            warn!("register response without a request: {}", packet);
            return;
        };
        match (op, RegSubtype::from_u8(packet.subtype()), packet.payload.first()) {
            (RegOp::Read(addr), Some(RegSubtype::ReadRespSuccess16), Some(&value)) => {
                self.base.state.registers.insert(addr, value);
                self.learn_layout();
            }
            (RegOp::Write(addr, value), Some(RegSubtype::WriteRespSuccess), _) => {
                self.base.state.registers.insert(addr, value);
            }
            (op, subtype, _) => {
                self.base.state.stats.register_errors += 1;
                warn!("register {:x?} answered with {:?}", op, subtype);
            }
        }
    }

    /// Builds the host's view of the mesh once every layout register has been read.
    fn learn_layout(&mut self) {
        if self.base.state.layout.is_some() {
            return;
        }
        let regs = &self.base.state.registers;
        let (Some(&lut), Some(&dims), Some(&max_ports), Some(&simple)) = (
            regs.get(&REG_LUT_SIZE),
            regs.get(&REG_DIMENSIONS),
            regs.get(&REG_MAX_PORTS),
            regs.get(&REG_SIMPLE),
        ) else {
            return;
        };
        let (x, y) = decode_dimensions(dims);
        let mesh = MeshConfig {
            x,
            y,
            lut_size: lut as usize,
            local_links: self.conf().local_links,
            max_ports,
            simple: simple != 0,
        };
        let topology = match Topology::new(&mesh) {
            Ok(t) => Arc::new(t),
            Err(e) => {
                warn!("module reports an unusable layout: {}", e);
                return;
            }
        };
        let endpoints = self.conf().endpoints.unwrap_or(max_ports as usize);
        let n = topology.num_nodes();
        let module_addr = self.conf().module_addr;
        let state = &mut self.base.state;
        state.tdm = Some(TdmInfo::new(x, y, &vec![endpoints; n], mesh.lut_size));
        state.decoder = Some(EventDecoder::new(module_addr, topology.clone()));
        state.fault_vector = vec![0; n];
        state.layout = Some(Layout { topology, max_ports, simple: simple != 0 });
        info!("host sees a {}x{} mesh, {} slots, {} endpoints per node", x, y, mesh.lut_size, endpoints);
    }

    fn event(&mut self, packet: DebugPacket) {
        let Some(decoder) = self.base.state.decoder.as_mut() else {
            self.base.state.stats.rejected_events += 1;
            debug!("event before the layout is known: {}", packet);
            return;
        };
        match decoder.handle(packet) {
            Ok(reports) => {
                self.base.state.stats.events += 1;
                if reports.iter().any(|r| matches!(r, Report::Fault { .. })) {
                    self.refresh_path_errors();
                }
            }
            Err(_) => self.base.state.stats.rejected_events += 1,
        }
    }

    /// Flags every channel path that crosses a link the last fault report marked faulty.
    fn refresh_path_errors(&mut self) {
        let state = &mut self.base.state;
        let (Some(decoder), Some(tdm)) = (&state.decoder, &state.tdm) else {
            return;
        };
        let faults = decoder.faults();
        for channel in state.channels.iter_mut().flatten() {
            for idx in 0..NI_LINKS {
                let Some(path) = channel.pids[idx].and_then(|pid| state.paths.get(pid)).and_then(Option::as_ref)
                else {
                    continue;
                };
                let broken = path_entries(tdm.x_dim(), tdm.lut_size(), &path.path, 0, path.link, 0, 0)
                    .iter()
                    .filter(|e| !e.ni)
                    .any(|e| faults.get(e.node).is_some_and(|&bits| bits & (1 << e.port) != 0));
                if broken && !channel.errors[idx] {
                    warn!("channel {}->{} path {} crosses a faulty link", channel.src, channel.dest, idx);
                }
                channel.set_error(idx, broken);
            }
        }
    }

    /// Slot-table writes, packed several to a command.
    fn write_entries(&mut self, entries: &[TableEntry]) {
        for chunk in entries.chunks(ENTRIES_PER_PACKET) {
            let words = chunk.iter().flat_map(|e| {
                [
                    SlotWord { slot: e.slot as u8, data: e.value, sel: e.port }.encode(),
                    TargetWord { ni_sel: e.ni, link_en: false, node: e.node as u16 }.encode(),
                ]
            });
            self.send_command(once(SubAddress::SlotConfig as u16).chain(words));
        }
    }

    /// Enables or disables the link from endpoint `ep` onto NI link `link` of `node`.
    pub fn set_link_enable(&mut self, node: usize, ep: u8, link: u8, enable: bool) {
        let slot = SlotWord { slot: link, data: enable as u8, sel: ep }.encode();
        let target = TargetWord { ni_sel: false, link_en: true, node: node as u16 }.encode();
        self.send_command([SubAddress::SlotConfig as u16, slot, target]);
    }

    pub fn write_router_slot(&mut self, node: usize, port: u8, slot: usize, value: u8) {
        self.write_entries(&[TableEntry { node, ni: false, port, slot, value }]);
    }

    pub fn write_ni_slot(&mut self, node: usize, port: u8, slot: usize, value: u8) {
        self.write_entries(&[TableEntry { node, ni: true, port, slot, value }]);
    }

    /// Sets or clears the injected fault of one link and sends the node's new fault byte.
    pub fn configure_fault(&mut self, node: usize, link: u8, set: bool) {
        if node >= self.base.state.fault_vector.len() || link >= 8 {
            warn!("no link {} at node {}", link, node);
            return;
        }
        let bits = &mut self.base.state.fault_vector[node];
        if set {
            *bits |= 1 << link;
        } else {
            *bits &= !(1 << link);
        }
        let mask = *bits;
        self.send_command([SubAddress::FaultInject as u16, FaultWord { node: node as u8, mask }.encode()]);
    }

    /// Clears the injected faults of every node.
    pub fn reset_faults(&mut self) {
        let n = self.base.state.fault_vector.len();
        for node in 0..n {
            self.send_command([SubAddress::FaultInject as u16, FaultWord { node: node as u8, mask: 0 }.encode()]);
        }
        self.base.state.fault_vector.fill(0);
    }

    pub fn set_window(&mut self, window: u32) {
        let (low, high) = split_window(window);
        self.send_command([SubAddress::ClockConfig as u16, low, high]);
    }

    pub fn activate_monitoring(&mut self, window: u32) {
        self.set_window(window);
        self.write_register(REG_CS, CS_ACTIVE);
    }

    pub fn deactivate_monitoring(&mut self) {
        self.set_window(0);
        self.write_register(REG_CS, 0);
    }

    /// Programs `path` for one start slot without any channel bookkeeping.
    pub fn configure_tdm_path_raw(
        &mut self,
        path: &[usize],
        start_slot: usize,
        link: u8,
        ep_src: u8,
        ep_dest: u8,
    ) -> Result<(), TdmError> {
        let tdm = self.base.state.tdm.as_ref().ok_or(TdmError::NotReady)?;
        if !is_valid_path(tdm.x_dim(), tdm.y_dim(), path) {
            let (src, dest) = (path.first().copied().unwrap_or(0), path.last().copied().unwrap_or(0));
            return Err(TdmError::NoPath { src, dest });
        }
        let entries = path_entries(tdm.x_dim(), tdm.lut_size(), path, start_slot, link, ep_src, ep_dest);
        self.program(&entries, None);
        self.set_link_enable(path[0], ep_src, link, true);
        Ok(())
    }

    /// Writes entries to the module and the mirror.
    fn program(&mut self, entries: &[TableEntry], pid: Option<usize>) {
        if let Some(tdm) = self.base.state.tdm.as_mut() {
            entries.iter().for_each(|e| tdm.set_table_entry(e, pid));
        }
        self.write_entries(entries);
    }

    fn path_table_entries(&self, path: &TdmPath) -> Vec<TableEntry> {
        let Some(tdm) = self.base.state.tdm.as_ref() else {
            return Vec::new();
        };
        path.slots
            .iter()
            .flat_map(|&slot| {
                path_entries(tdm.x_dim(), tdm.lut_size(), &path.path, slot, path.link, path.ep_src, path.ep_dest)
            })
            .collect()
    }

    fn configure_path(&mut self, path: TdmPath) -> usize {
        let pid = self.base.state.paths.len();
        let entries = self.path_table_entries(&path);
        self.program(&entries, Some(pid));
        self.set_link_enable(path.path[0], path.ep_src, path.link, true);
        debug!("path {} {:?} slots {:?} on link {}", pid, path.path, path.slots, path.link);
        self.base.state.paths.push(Some(path));
        pid
    }

    /// Disables the path's link, then empties its table entries.
    fn clear_path(&mut self, pid: usize) {
        let Some(path) = self.base.state.paths.get_mut(pid).and_then(Option::take) else {
            return;
        };
        self.set_link_enable(path.path[0], path.ep_src, path.link, false);
        let entries: Vec<TableEntry> = self
            .path_table_entries(&path)
            .into_iter()
            .map(|e| TableEntry { value: EMPTY_SLOT, ..e })
            .collect();
        self.program(&entries, None);
    }

    /// Slots for `path` on NI link `link`, or the reason there are none.
    fn reserve(
        &self,
        path: Vec<usize>,
        link: u8,
        ep_src: u8,
        ep_dest: u8,
        numslots: usize,
    ) -> Result<TdmPath, TdmError> {
        let tdm = self.base.state.tdm.as_ref().ok_or(TdmError::NotReady)?;
        let slots = tdm.free_slots(&path, ep_src, ep_dest, link, numslots);
        if slots.is_empty() {
            return Err(TdmError::NoFreeSlots);
        }
        Ok(TdmPath::new(path, slots, link, ep_src, ep_dest))
    }

    /// Creates a channel from `src` to `dest` with `numslots` slots per path. With `autopaths`
    /// an X-Y path and a disjoint alternative are reserved right away.
    pub fn create_tdm_channel(
        &mut self,
        src: usize,
        dest: usize,
        numslots: usize,
        autopaths: bool,
    ) -> Result<usize, TdmError> {
        let tdm = self.base.state.tdm.as_ref().ok_or(TdmError::NotReady)?;
        let (x_dim, y_dim) = (tdm.x_dim(), tdm.y_dim());
        if src >= x_dim * y_dim || dest >= x_dim * y_dim {
            return Err(TdmError::NoPath { src, dest });
        }
        let ep_src = tdm.free_endpoint(src, EndpointDir::Out).ok_or(TdmError::NoFreeEndpoint(src))?;
        let ep_dest = tdm.free_endpoint(dest, EndpointDir::In).ok_or(TdmError::NoFreeEndpoint(dest))?;

        let paths = if autopaths {
            let a = self.reserve(find_path_xy(x_dim, src, dest), 0, ep_src, ep_dest, numslots)?;
            let b_path = find_path_b(x_dim, y_dim, src, dest).ok_or(TdmError::NoPath { src, dest })?;
            let b = self.reserve(b_path, 1, ep_src, ep_dest, numslots)?;
            if !a.valid_alternative_path(&b) {
                return Err(TdmError::NotDisjoint);
            }
            vec![a, b]
        } else {
            Vec::new()
        };

        let chid = self.base.state.channels.len();
        self.base.state.channels.push(Some(TdmChannel::new(src, dest, ep_src, ep_dest, numslots)));
        if let Some(tdm) = self.base.state.tdm.as_mut() {
            tdm.assign_endpoints(src, dest, ep_src, ep_dest, chid);
        }
        for (idx, mut path) in paths.into_iter().enumerate() {
            path.assign_channel(chid, idx);
            self.attach(chid, path);
        }
        info!("channel {}: {} -> {}, endpoints {}/{}, {} slots", chid, src, dest, ep_src, ep_dest, numslots);
        Ok(chid)
    }

    fn attach(&mut self, chid: usize, path: TdmPath) -> usize {
        let pid = self.configure_path(path.clone());
        if let Some(channel) = self.base.state.channels.get_mut(chid).and_then(Option::as_mut) {
            channel.add_path(&path, pid);
        }
        pid
    }

    fn channel(&self, chid: usize) -> Result<&TdmChannel, TdmError> {
        self.base
            .state
            .channels
            .get(chid)
            .and_then(Option::as_ref)
            .ok_or(TdmError::UnknownChannel(chid))
    }

    /// Reserves `path` as half `path_idx` of channel `chid`, on the NI link of the same index.
    pub fn add_path_to_channel(
        &mut self,
        chid: usize,
        path_idx: usize,
        path: Vec<usize>,
    ) -> Result<usize, TdmError> {
        let channel = self.channel(chid)?.clone();
        if path_idx >= NI_LINKS || channel.pids[path_idx].is_some() {
            return Err(TdmError::PathIndexTaken(path_idx));
        }
        if path.first() != Some(&channel.src) || path.last() != Some(&channel.dest) {
            return Err(TdmError::NoPath { src: channel.src, dest: channel.dest });
        }
        let mut candidate = self.reserve(path, path_idx as u8, channel.ep_src, channel.ep_dest, channel.numslots)?;
        let other = channel.pids[1 - path_idx]
            .and_then(|pid| self.base.state.paths.get(pid))
            .and_then(Option::as_ref);
        if other.is_some_and(|other| !candidate.valid_alternative_path(other)) {
            return Err(TdmError::NotDisjoint);
        }
        candidate.assign_channel(chid, path_idx);
        Ok(self.attach(chid, candidate))
    }

    pub fn remove_path_from_channel(&mut self, chid: usize, path_idx: usize) -> Result<(), TdmError> {
        self.channel(chid)?;
        let pid = self.base.state.channels[chid]
            .as_mut()
            .and_then(|c| c.clear_path(path_idx))
            .ok_or(TdmError::NoPathAtIndex(path_idx))?;
        self.clear_path(pid);
        Ok(())
    }

    /// Tears down both paths and frees the channel's endpoints.
    pub fn delete_tdm_channel(&mut self, chid: usize) -> Result<(), TdmError> {
        let channel = self.channel(chid)?.clone();
        for pid in channel.pids.into_iter().flatten() {
            self.clear_path(pid);
        }
        if let Some(tdm) = self.base.state.tdm.as_mut() {
            tdm.release_endpoints(chid);
        }
        self.base.state.channels[chid] = None;
        info!("channel {} deleted", chid);
        Ok(())
    }

    pub fn path(&self, pid: usize) -> Option<&TdmPath> {
        self.base.state.paths.get(pid)?.as_ref()
    }

    pub fn channels(&self) -> Vec<ChannelSummary> {
        let state = &self.base.state;
        state
            .channels
            .iter()
            .enumerate()
            .filter_map(|(id, c)| c.as_ref().map(|c| (id, c)))
            .map(|(id, channel)| ChannelSummary {
                id,
                channel: channel.clone(),
                paths: channel
                    .pids
                    .iter()
                    .flatten()
                    .filter_map(|&pid| state.paths.get(pid).cloned().flatten())
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests;
