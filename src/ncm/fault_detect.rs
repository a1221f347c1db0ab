//! Fault detection in two stages: a sampler that watches the per-node fault bitmaps and a
//! report builder that serializes snapshots into event packets. The stages meet in a
//! single-entry mailbox where a newer snapshot replaces an unsent older one.

use std::sync::Arc;

use log::{debug, trace};

use crate::base::behavior::{ModuleBehaviors, Parameterizable};
use crate::base::module::IsModule;
use crate::base::module::{module, ModuleBase};
use crate::mesh::fabric::FaultSource;
use crate::mesh::topology::Topology;
use crate::ncm::config::NcmConfig;
use crate::ncm::report::{Phase, ReportHeader};
use crate::packet::{encode_flags, pack_fault_pair, EventSubtype, Flit, PacketType, ReportId};

#[derive(Debug, Default, Clone)]
pub struct FaultSampler {
    prev: Vec<u8>,
    current: Vec<u8>,
    /// A change has not been fully transmitted yet.
    pending: bool,
    mailbox: Option<Vec<u8>>,
    timer: u32,
}

impl FaultSampler {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            prev: vec![0; num_nodes],
            current: vec![0; num_nodes],
            ..Self::default()
        }
    }

    /// One NoC cycle: read every bitmap, compare against the previous cycle and run the window
    /// timer. `in_flight` tells whether the builder is currently transmitting.
    pub fn sample(
        &mut self,
        source: &dyn FaultSource,
        window: u32,
        in_flight: bool,
        heartbeat: bool,
    ) {
        for (node, bits) in self.current.iter_mut().enumerate() {
            *bits = source.fault_bitmap(node);
        }
        if self.current != self.prev {
            trace!("fault bitmap change {:x?} -> {:x?}", self.prev, self.current);
            self.pending = true;
            self.mailbox = Some(self.current.clone());
            self.prev.copy_from_slice(&self.current);
        }

        if window == 0 {
            self.timer = 0;
            return;
        }
        self.timer += 1;
        if self.timer >= window {
            self.timer = 0;
            if heartbeat {
                self.pending = true;
            }
            // flush once more with the bitmap seen at the window boundary
            if in_flight || (heartbeat && self.mailbox.is_none()) {
                self.mailbox = Some(self.current.clone());
            }
        }
    }

    pub fn take(&mut self) -> Option<Vec<u8>> {
        self.mailbox.take()
    }

    /// The builder finished a snapshot; anything deposited meanwhile keeps the flag up.
    pub fn complete(&mut self) {
        self.pending = self.mailbox.is_some();
    }

    pub fn pending(&self) -> bool {
        self.pending
    }
}

#[derive(Debug, Default, Clone)]
pub struct FaultBuilder {
    phase: Phase,
    snapshot: Vec<u8>,
    /// Index of the next data word in the whole snapshot.
    word: usize,
    /// First word of the current packet.
    packet_start: usize,
}

impl FaultBuilder {
    fn total_words(&self) -> usize {
        self.snapshot.len().div_ceil(2)
    }

    fn packet_end(&self, words_per_packet: usize) -> usize {
        (self.packet_start + words_per_packet).min(self.total_words())
    }

    pub fn start(&mut self, snapshot: Vec<u8>) {
        assert_eq!(Phase::Idle, self.phase, "snapshot captured during transmission");
        self.snapshot = snapshot;
        self.word = 0;
        self.packet_start = 0;
        self.phase = Phase::Dest;
    }

    pub fn front(&self, config: &NcmConfig) -> Option<Flit> {
        let per_packet = config.data_words_per_packet();
        let end = self.packet_end(per_packet);
        if self.phase == Phase::Xfer {
            let lo = self.snapshot[2 * self.word];
            let hi = self.snapshot.get(2 * self.word + 1).copied().unwrap_or(0);
            return Some(Flit::new(pack_fault_pair(lo, hi), self.word + 1 == end));
        }
        let more = end < self.total_words();
        let subtype = if more { EventSubtype::NotLast } else { EventSubtype::Last };
        let header = ReportHeader {
            dest: config.event_dest,
            src: config.module_addr,
            flags: encode_flags(PacketType::Event, subtype as u8),
            id: ReportId::Fault { start_node: (2 * self.packet_start) as u16 }.encode(),
        };
        self.phase.header_flit(&header)
    }

    /// The presented flit is the final one of the snapshot.
    pub fn closes(&self) -> bool {
        self.phase == Phase::Xfer && self.word + 1 == self.total_words()
    }

    /// The presented flit was taken. Returns true when the final flit of the snapshot went out.
    pub fn accept(&mut self, words_per_packet: usize) -> bool {
        if self.phase != Phase::Xfer {
            self.phase = self.phase.advance();
            return false;
        }
        let end = self.packet_end(words_per_packet);
        self.word += 1;
        if self.word < end {
            return false;
        }
        if self.word < self.total_words() {
            self.packet_start = self.word;
            self.phase = Phase::Dest;
            return false;
        }
        self.phase = Phase::Idle;
        true
    }

    pub fn busy(&self) -> bool {
        self.phase.busy()
    }
}

#[derive(Debug, Default)]
pub struct FaultDetectorState {
    pub sampler: FaultSampler,
    pub builder: FaultBuilder,
    pub window: u32,
    pub reports: u64,
}

pub struct FaultDetector {
    base: ModuleBase<FaultDetectorState, NcmConfig>,
    num_nodes: usize,
}

module!(FaultDetector, FaultDetectorState, NcmConfig,);

impl FaultDetector {
    pub fn new(config: Arc<NcmConfig>, topology: Arc<Topology>) -> Self {
        let num_nodes = topology.num_nodes();
        let mut me = FaultDetector {
            base: ModuleBase::with_state(FaultDetectorState {
                sampler: FaultSampler::new(num_nodes),
                window: config.max_clk_counter,
                ..FaultDetectorState::default()
            }),
            num_nodes,
        };
        me.init_conf(config);
        me
    }

    pub fn set_window(&mut self, window: u32) {
        self.base.state.window = window;
    }

    /// Sampler and timer for this cycle, then the builder picks up a waiting snapshot.
    pub fn sample(&mut self, source: &dyn FaultSource) {
        let heartbeat = self.conf().periodic_fault_report;
        let state = &mut self.base.state;
        state.sampler.sample(source, state.window, state.builder.busy(), heartbeat);
        if !state.builder.busy() {
            if let Some(snapshot) = state.sampler.take() {
                debug!("fault report #{} starts at cycle {}: {:x?}", state.reports, self.base.cycle, snapshot);
                state.builder.start(snapshot);
            }
        }
    }

    pub fn front(&self) -> Option<Flit> {
        self.base.state.builder.front(self.conf())
    }

    pub fn closes(&self) -> bool {
        self.base.state.builder.closes()
    }

    pub fn accept(&mut self) {
        let per_packet = self.conf().data_words_per_packet();
        let state = &mut self.base.state;
        if state.builder.accept(per_packet) {
            state.sampler.complete();
            state.reports += 1;
        }
    }

    pub fn pending(&self) -> bool {
        self.base.state.sampler.pending()
    }

    pub fn reports(&self) -> u64 {
        self.base.state.reports
    }
}

impl ModuleBehaviors for FaultDetector {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        let window = self.conf().max_clk_counter;
        self.base.state = FaultDetectorState {
            sampler: FaultSampler::new(self.num_nodes),
            window,
            ..FaultDetectorState::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::config::MeshConfig;
    use crate::packet::{unpack_fault_pair, DebugPacket, PacketAssembler};
    use std::cell::RefCell;

    struct Bitmaps(RefCell<Vec<u8>>);

    impl FaultSource for Bitmaps {
        fn fault_bitmap(&self, node: usize) -> u8 {
            self.0.borrow()[node]
        }
    }

    fn detector(x: usize, y: usize, max_pkt_len: usize, window: u32) -> FaultDetector {
        let mesh = MeshConfig { x, y, ..MeshConfig::default() };
        let topo = Arc::new(Topology::new(&mesh).unwrap());
        let config = NcmConfig { max_pkt_len, max_clk_counter: window, mesh, ..NcmConfig::default() };
        FaultDetector::new(Arc::new(config), topo)
    }

    /// Runs `cycles` cycles with an always-ready consumer and returns the packets sent.
    /// `edit` may change the bitmaps before each cycle.
    fn run(
        fd: &mut FaultDetector,
        src: &Bitmaps,
        cycles: usize,
        mut edit: impl FnMut(usize, &mut Vec<u8>),
    ) -> Vec<DebugPacket> {
        let mut asm = PacketAssembler::default();
        let mut out = Vec::new();
        for cycle in 0..cycles {
            edit(cycle, &mut src.0.borrow_mut());
            fd.sample(src);
            if let Some(flit) = fd.front() {
                let (before, closes) = (fd.reports(), fd.closes());
                fd.accept();
                // only the very last flit of a fragmented report closes it
                assert_eq!(closes, fd.reports() > before);
                if let Some(pkt) = asm.push(flit) {
                    out.push(pkt.unwrap());
                }
            }
            fd.tick_one();
        }
        out
    }

    fn quiet(_: usize, _: &mut Vec<u8>) {}

    #[test]
    fn change_produces_one_report_with_two_nodes_per_word() {
        let mut fd = detector(3, 3, 12, 0);
        let src = Bitmaps(RefCell::new(vec![0; 9]));
        src.0.borrow_mut()[4] = 0b100;
        src.0.borrow_mut()[8] = 0x11;
        let pkts = run(&mut fd, &src, 20, quiet);
        assert_eq!(1, pkts.len());
        let pkt = &pkts[0];
        assert_eq!(5, pkt.src);
        assert!(pkt.is_event() && !pkt.has_continuation());
        assert_eq!(ReportId::Fault { start_node: 0 }.encode(), pkt.payload[0]);
        assert_eq!(6, pkt.payload.len());
        assert_eq!((0b100, 0), unpack_fault_pair(pkt.payload[3]));
        assert_eq!((0x11, 0), unpack_fault_pair(pkt.payload[5]));
        assert!(!fd.pending());
        assert_eq!(1, fd.reports());
    }

    #[test]
    fn long_snapshot_is_split_into_fragments() {
        // 18 nodes = 9 words, one data word per packet
        let mut fd = detector(6, 3, 5, 0);
        let src = Bitmaps(RefCell::new((0..18).collect()));
        let pkts = run(&mut fd, &src, 60, quiet);
        assert_eq!(9, pkts.len());
        for (k, pkt) in pkts.iter().enumerate() {
            assert_eq!(k + 1 < 9, pkt.has_continuation());
            assert_eq!(ReportId::Fault { start_node: 2 * k as u16 }.encode(), pkt.payload[0]);
            assert_eq!((2 * k as u8, 2 * k as u8 + 1), unpack_fault_pair(pkt.payload[1]));
        }
        assert_eq!(1, fd.reports());
    }

    #[test]
    fn change_during_transmission_is_reported_afterwards() {
        let mut fd = detector(3, 3, 12, 0);
        let src = Bitmaps(RefCell::new(vec![0; 9]));
        let pkts = run(&mut fd, &src, 40, |cycle, bits| match cycle {
            0 => bits[0] = 1,
            3 => bits[0] = 3,
            _ => {}
        });
        assert_eq!(2, pkts.len());
        assert_eq!((1, 0), unpack_fault_pair(pkts[0].payload[1]));
        assert_eq!((3, 0), unpack_fault_pair(pkts[1].payload[1]));
        assert!(!fd.pending());
    }

    #[test]
    fn quiet_window_sends_nothing_unless_heartbeat() {
        let mut fd = detector(2, 2, 12, 10);
        let src = Bitmaps(RefCell::new(vec![0; 4]));
        assert!(run(&mut fd, &src, 55, quiet).is_empty());

        let mesh = MeshConfig { x: 2, y: 2, ..MeshConfig::default() };
        let topo = Arc::new(Topology::new(&mesh).unwrap());
        let config = NcmConfig {
            max_clk_counter: 10,
            periodic_fault_report: true,
            mesh,
            ..NcmConfig::default()
        };
        let mut fd = FaultDetector::new(Arc::new(config), topo);
        // expiries on cycles 9, 19, .., 49; a report is six flits
        assert_eq!(5, run(&mut fd, &src, 55, quiet).len());
    }

    #[test]
    fn window_expiry_during_transmission_flushes_again() {
        let mut fd = detector(3, 3, 12, 12);
        let src = Bitmaps(RefCell::new(vec![0; 9]));
        // the report runs on cycles 5..=13, the window elapses on cycle 11
        let pkts = run(&mut fd, &src, 40, |cycle, bits| {
            if cycle == 5 {
                bits[2] = 1;
            }
        });
        assert_eq!(2, pkts.len());
        assert_eq!(pkts[0].payload, pkts[1].payload);
    }
}
