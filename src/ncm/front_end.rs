use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, trace, warn};
use num_traits::FromPrimitive;
use serde::Serialize;
use smallvec::SmallVec;

use crate::base::behavior::{ModuleBehaviors, Parameterizable};
use crate::base::module::IsModule;
use crate::base::module::{module, ModuleBase};
use crate::cdc::{CdcConsumer, CdcProducer};
use crate::mesh::topology::Topology;
use crate::ncm::config::NcmConfig;
use crate::ncm::regs::{register_name, RegisterFile};
use crate::packet::{decode_flags, DebugPacket, EventSubtype, Flit, PacketType, RegSubtype, HEADER_FLITS};

/// Queue ends owned by the debug domain.
pub struct FrontEndPorts {
    /// Flits from the host.
    pub host_rx: CdcConsumer<Flit>,
    /// Flits to the host.
    pub host_tx: CdcProducer<Flit>,
    /// Event packets towards the NoC domain.
    pub noc_tx: CdcProducer<Flit>,
    /// Report packets from the NoC domain.
    pub noc_rx: CdcConsumer<Flit>,
    /// Effective window length, published by the NoC domain.
    pub status_rx: CdcConsumer<u32>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
enum Inbound {
    #[default]
    Header,
    Forward,
    Register { src: u16, subtype: u8, payload: SmallVec<[u16; 2]> },
    Discard,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Outbound {
    #[default]
    Idle,
    /// Passing a report event through, `flit` flits into the current packet. `drop` is fixed at
    /// the event's first flit and holds over every NOTLAST fragment.
    Event { flit: usize, drop: bool, continued: bool },
    Response,
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct FrontEndStats {
    pub responses: u64,
    pub events_in: u64,
    pub events_out: u64,
    pub events_discarded: u64,
    pub foreign_packets: u64,
}

#[derive(Debug)]
pub struct FrontEndState {
    regs: RegisterFile,
    header: SmallVec<[u16; HEADER_FLITS]>,
    inbound: Inbound,
    outbound: Outbound,
    /// Event flits waiting for room in the inbound crossing.
    to_noc: VecDeque<Flit>,
    responses: VecDeque<DebugPacket>,
    sending: VecDeque<Flit>,
    stats: FrontEndStats,
}

impl FrontEndState {
    fn new(config: &NcmConfig, topology: &Topology) -> Self {
        Self {
            regs: RegisterFile::new(config, topology),
            header: SmallVec::new(),
            inbound: Inbound::default(),
            outbound: Outbound::default(),
            to_noc: VecDeque::new(),
            responses: VecDeque::new(),
            sending: VecDeque::new(),
            stats: FrontEndStats::default(),
        }
    }

    /// One flit from the host.
    fn accept(&mut self, flit: Flit, module_addr: u16) {
        let inbound = std::mem::take(&mut self.inbound);
        let next = match inbound {
            Inbound::Header => {
                self.header.push(flit.data);
                if self.header.len() < HEADER_FLITS {
                    if flit.last {
                        warn!("host packet cut short after {} flits", self.header.len());
                        self.header.clear();
                    }
                    Inbound::Header
                } else {
                    let next = self.route(flit.last, module_addr);
                    self.header.clear();
                    next
                }
            }
            Inbound::Forward => {
                self.to_noc.push_back(flit);
                Inbound::Forward
            }
            Inbound::Register { src, subtype, mut payload } => {
                payload.push(flit.data);
                if flit.last {
                    self.answer(src, subtype, &payload, module_addr);
                }
                Inbound::Register { src, subtype, payload }
            }
            Inbound::Discard => Inbound::Discard,
        };
        self.inbound = if flit.last { Inbound::Header } else { next };
    }

    /// Decides what to do with a packet once its header is complete.
    fn route(&mut self, last: bool, module_addr: u16) -> Inbound {
        let (dest, src, flags) = (self.header[0], self.header[1], self.header[2]);
        if dest != module_addr {
            self.stats.foreign_packets += 1;
            debug!("packet for {:#06x} from {:#06x} dropped", dest, src);
            return Inbound::Discard;
        }
        let (ty, subtype) = decode_flags(flags);
        match PacketType::from_u8(ty) {
            Some(PacketType::Event) => {
                self.stats.events_in += 1;
                let n = self.header.len();
                for (i, &word) in self.header.iter().enumerate() {
                    self.to_noc.push_back(Flit::new(word, last && i + 1 == n));
                }
                Inbound::Forward
            }
            Some(PacketType::Reg) => {
                if last {
                    self.answer(src, subtype, &[], module_addr);
                }
                Inbound::Register { src, subtype, payload: SmallVec::new() }
            }
            _ => {
                warn!("packet type {} from {:#06x} not handled", ty, src);
                Inbound::Discard
            }
        }
    }

    fn answer(&mut self, src: u16, subtype: u8, payload: &[u16], module_addr: u16) {
        let (resp, data) = match RegSubtype::from_u8(subtype) {
            Some(RegSubtype::ReadReq16) => {
                match payload.first().and_then(|&addr| self.regs.read(addr).map(|v| (addr, v))) {
                    Some((addr, value)) => {
                        trace!("read {} = {:#06x}", register_name(addr).unwrap_or("?"), value);
                        (RegSubtype::ReadRespSuccess16, Some(value))
                    }
                    None => {
                        debug!("read of {:x?} failed", payload.first());
                        (RegSubtype::ReadRespError, None)
                    }
                }
            }
            Some(RegSubtype::WriteReq16) => match payload {
                [addr, value, ..] if self.regs.write(*addr, *value) => {
                    debug!("write {} = {:#06x}", register_name(*addr).unwrap_or("?"), value);
                    (RegSubtype::WriteRespSuccess, None)
                }
                _ => {
                    debug!("write {:x?} rejected", payload);
                    (RegSubtype::WriteRespError, None)
                }
            },
            _ => {
                warn!("register subtype {:#x} from {:#06x} not a request, ignored", subtype, src);
                return;
            }
        };
        let packet = DebugPacket::new(src, module_addr, PacketType::Reg, resp as u8).with_payload(data);
        self.responses.push_back(packet);
    }
}

/// Debug-domain side of the module: the register file, host packet routing and the host end of
/// the report path.
pub struct RegisterFrontEnd {
    base: ModuleBase<FrontEndState, NcmConfig>,
    topology: Arc<Topology>,
    ports: FrontEndPorts,
}

module!(RegisterFrontEnd, FrontEndState, NcmConfig,);

impl RegisterFrontEnd {
    pub fn new(config: Arc<NcmConfig>, topology: Arc<Topology>, ports: FrontEndPorts) -> Self {
        let mut me = RegisterFrontEnd {
            base: ModuleBase::with_state(FrontEndState::new(&config, &topology)),
            topology,
            ports,
        };
        me.init_conf(config);
        me
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.base.state.regs
    }

    pub fn stats(&self) -> FrontEndStats {
        self.base.state.stats
    }

    fn mirror_status(&mut self) {
        while let Some(window) = self.ports.status_rx.pop() {
            trace!("window mirror {}", window);
            self.base.state.regs.set_window(window);
        }
    }

    /// At most one flit towards the host. A response only starts between report packets.
    fn drive_host(&mut self) {
        let state = &mut self.base.state;
        if state.outbound == Outbound::Idle {
            if let Some(packet) = state.responses.pop_front() {
                state.sending.extend(packet.to_flits());
                state.outbound = Outbound::Response;
                state.stats.responses += 1;
            } else if self.ports.noc_rx.front().is_some() {
                let drop = !state.regs.event_active();
                state.outbound = Outbound::Event { flit: 0, drop, continued: false };
            }
        }

        match state.outbound {
            Outbound::Idle => {}
            Outbound::Response => {
                if self.ports.host_tx.full() {
                    return;
                }
                if let Some(flit) = state.sending.pop_front() {
                    self.ports.host_tx.push(flit);
                }
                if state.sending.is_empty() {
                    state.outbound = Outbound::Idle;
                }
            }
            Outbound::Event { flit: n, drop, mut continued } => {
                if !drop && self.ports.host_tx.full() {
                    return;
                }
                let Some(mut flit) = self.ports.noc_rx.pop() else {
                    return;
                };
                if n == 0 {
                    flit.data = state.regs.event_dest();
                }
                if n == HEADER_FLITS - 1 {
                    let (ty, subtype) = decode_flags(flit.data);
                    continued = ty == PacketType::Event as u8 && subtype == EventSubtype::NotLast as u8;
                }
                let closes = flit.last && !continued;
                if drop {
                    if closes {
                        state.stats.events_discarded += 1;
                    }
                } else {
                    self.ports.host_tx.push(flit);
                    if closes {
                        state.stats.events_out += 1;
                    }
                }
                state.outbound = match (flit.last, continued) {
                    (true, false) => Outbound::Idle,
                    (true, true) => Outbound::Event { flit: 0, drop, continued: false },
                    (false, _) => Outbound::Event { flit: n + 1, drop, continued },
                };
            }
        }
    }

    fn drive_noc(&mut self) {
        let state = &mut self.base.state;
        if !self.ports.noc_tx.full() {
            if let Some(flit) = state.to_noc.pop_front() {
                self.ports.noc_tx.push(flit);
            }
        }
    }

    fn accept_host(&mut self) {
        let module_addr = self.conf().module_addr;
        let state = &mut self.base.state;
        if state.to_noc.len() > HEADER_FLITS {
            return;
        }
        if let Some(flit) = self.ports.host_rx.pop() {
            state.accept(flit, module_addr);
        }
    }
}

impl ModuleBehaviors for RegisterFrontEnd {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
        self.mirror_status();
        self.drive_host();
        self.drive_noc();
        self.accept_host();
    }

    fn reset(&mut self) {
        let state = FrontEndState::new(self.conf(), &self.topology);
        self.base.state = state;
    }
}
