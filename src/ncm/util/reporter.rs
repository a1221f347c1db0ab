use log::warn;

use crate::mesh::topology::Topology;
use crate::ncm::report::{Phase, ReportHeader};
use crate::ncm::util::aggregator::UtilSnapshot;
use crate::packet::{encode_flags, CounterWord, EventSubtype, Flit, PacketType, ReportId, TrafficClass};

/// Position inside a report: mode, then node, then counter half, then link.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    class: usize,
    node: usize,
    word: usize,
    link: usize,
}

const CLASSES: [TrafficClass; 2] = [TrafficClass::Tdm, TrafficClass::Be];
const WORDS: [CounterWord; 2] = [CounterWord::Low, CounterWord::High];

impl Cursor {
    /// Next packet of the report, `None` after the BE high word of the last node.
    fn next_packet(self, num_nodes: usize) -> Option<Self> {
        let mut next = Cursor { link: 0, ..self };
        next.word += 1;
        if next.word == WORDS.len() {
            next.word = 0;
            next.node += 1;
        }
        if next.node == num_nodes {
            next.node = 0;
            next.class += 1;
        }
        (next.class < CLASSES.len()).then_some(next)
    }
}

/// Serializes utilization snapshots, one packet per (mode, node, counter half).
#[derive(Debug, Default, Clone)]
pub struct UtilReporter {
    phase: Phase,
    current: UtilSnapshot,
    queued: Option<UtilSnapshot>,
    cursor: Cursor,
    overruns: u64,
}

impl UtilReporter {
    /// Hands a finished window over. An unsent queued snapshot is replaced.
    pub fn offer(&mut self, snapshot: UtilSnapshot) {
        if self.queued.replace(snapshot).is_some() {
            self.overruns += 1;
            warn!("utilization report overrun #{}, queued snapshot replaced", self.overruns);
        }
    }

    /// Starts the queued snapshot when idle.
    pub fn start(&mut self) {
        if self.phase == Phase::Idle {
            if let Some(snapshot) = self.queued.take() {
                self.current = snapshot;
                self.cursor = Cursor::default();
                self.phase = Phase::Dest;
            }
        }
    }

    fn active_links<'a>(&self, topology: &'a Topology) -> &'a [u8] {
        &topology.node(self.cursor.node).active_links
    }

    pub fn front(&self, topology: &Topology, dest: u16, src: u16) -> Option<Flit> {
        let Cursor { class, node, word, link } = self.cursor;
        let links = self.active_links(topology);
        match self.phase {
            Phase::Idle => None,
            Phase::Xfer => {
                let value = self.current.get(node, CLASSES[class], links[link]);
                Some(Flit::new(WORDS[word].extract(value), link + 1 == links.len()))
            }
            phase => {
                let header = ReportHeader {
                    dest,
                    src,
                    flags: encode_flags(PacketType::Event, EventSubtype::Last as u8),
                    id: ReportId::Util { node: node as u16, word: WORDS[word], class: CLASSES[class] }
                        .encode(),
                };
                // a node without links closes its packet on the id flit
                phase
                    .header_flit(&header)
                    .map(|f| Flit::new(f.data, phase == Phase::Id && links.is_empty()))
            }
        }
    }

    /// The presented flit ends the last packet of the report.
    pub fn closes(&self, topology: &Topology) -> bool {
        let links = self.active_links(topology).len();
        let packet_ends = match self.phase {
            Phase::Xfer => self.cursor.link + 1 == links,
            Phase::Id => links == 0,
            _ => false,
        };
        packet_ends && self.cursor.next_packet(topology.num_nodes()).is_none()
    }

    /// The presented flit was taken. Returns true when the report is complete.
    pub fn accept(&mut self, topology: &Topology) -> bool {
        let links = self.active_links(topology).len();
        match self.phase {
            Phase::Idle => return false,
            Phase::Xfer => self.cursor.link += 1,
            Phase::Id if links > 0 => {
                self.phase = Phase::Xfer;
                return false;
            }
            Phase::Id => {}
            phase => {
                self.phase = phase.advance();
                return false;
            }
        }
        if self.cursor.link < links {
            return false;
        }
        match self.cursor.next_packet(topology.num_nodes()) {
            Some(next) => {
                self.cursor = next;
                self.phase = Phase::Dest;
                false
            }
            None => {
                self.phase = Phase::Idle;
                true
            }
        }
    }

    pub fn busy(&self) -> bool {
        self.phase.busy() || self.queued.is_some()
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::config::MeshConfig;
    use crate::packet::{DebugPacket, PacketAssembler};

    fn drain(rep: &mut UtilReporter, topo: &Topology) -> Vec<DebugPacket> {
        let mut asm = PacketAssembler::default();
        let mut out = Vec::new();
        rep.start();
        while let Some(flit) = rep.front(topo, 0, 5) {
            let closes = rep.closes(topo);
            let done = rep.accept(topo);
            assert_eq!(done, closes);
            out.extend(asm.push(flit).map(Result::unwrap));
            if done {
                break;
            }
        }
        assert!(!asm.in_progress());
        out
    }

    #[test]
    fn packet_order_and_sizes() {
        let topo = Topology::new(&MeshConfig { x: 2, y: 2, ..MeshConfig::default() }).unwrap();
        let mut rep = UtilReporter::default();
        rep.offer(UtilSnapshot::new(4));
        let pkts = drain(&mut rep, &topo);
        // 2 modes * 4 nodes * 2 words
        assert_eq!(16, pkts.len());
        let ids: Vec<_> = pkts.iter().map(|p| ReportId::decode(p.payload[0])).collect();
        assert_eq!(
            Some(ReportId::Util { node: 0, word: CounterWord::Low, class: TrafficClass::Tdm }),
            ids[0]
        );
        assert_eq!(
            Some(ReportId::Util { node: 0, word: CounterWord::High, class: TrafficClass::Tdm }),
            ids[1]
        );
        assert_eq!(
            Some(ReportId::Util { node: 1, word: CounterWord::Low, class: TrafficClass::Tdm }),
            ids[2]
        );
        assert_eq!(
            Some(ReportId::Util { node: 3, word: CounterWord::High, class: TrafficClass::Be }),
            ids[15]
        );
        // corner nodes of a 2x2 mesh: two mesh links plus four local links
        assert!(pkts.iter().all(|p| p.payload.len() == 1 + 6));
        assert!(!rep.busy());
    }

    #[test]
    fn newer_snapshot_replaces_queued_one() {
        let mut rep = UtilReporter::default();
        rep.offer(UtilSnapshot::new(1));
        rep.offer(UtilSnapshot::new(1));
        assert_eq!(1, rep.overruns());
    }

    #[test]
    fn node_without_links_sends_header_only() {
        let topo = Topology::new(&MeshConfig { x: 1, y: 1, local_links: 0, ..MeshConfig::default() })
            .unwrap();
        let mut rep = UtilReporter::default();
        rep.offer(UtilSnapshot::new(1));
        let pkts = drain(&mut rep, &topo);
        assert_eq!(4, pkts.len());
        assert!(pkts.iter().all(|p| p.payload.len() == 1));
    }
}
