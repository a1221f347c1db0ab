use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;

use crate::error::PacketError;
use crate::mesh::topology::{Topology, MAX_LINKS};
use crate::packet::{decode_flags, unpack_fault_pair, CounterWord, DebugPacket, ReportId, TrafficClass};

/// What a decoded event updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    /// Fault vector entries `start..end` were refreshed.
    Fault { start: usize, end: usize },
    Util { node: usize, class: TrafficClass, word: CounterWord },
}

/// Per-link counters of one traffic class, indexed by node then link.
pub type UtilTable = Vec<[u32; MAX_LINKS]>;

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct DecoderStats {
    pub fault_reports: u64,
    pub util_packets: u64,
    pub rejected: u64,
}

/// Host view of the module's reports: the last reported fault bitmap of every node and the
/// last utilization counters of every link.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    module_addr: u16,
    topology: Arc<Topology>,
    faults: Vec<u8>,
    tdm: UtilTable,
    be: UtilTable,
    /// Fragments of a multi-packet event waiting for their final packet.
    partial: Vec<DebugPacket>,
    stats: DecoderStats,
}

impl EventDecoder {
    pub fn new(module_addr: u16, topology: Arc<Topology>) -> Self {
        let n = topology.num_nodes();
        Self {
            module_addr,
            topology,
            faults: vec![0; n],
            tdm: vec![[0; MAX_LINKS]; n],
            be: vec![[0; MAX_LINKS]; n],
            partial: Vec::new(),
            stats: DecoderStats::default(),
        }
    }

    pub fn faults(&self) -> &[u8] {
        &self.faults
    }

    pub fn util(&self, class: TrafficClass) -> &UtilTable {
        match class {
            TrafficClass::Tdm => &self.tdm,
            TrafficClass::Be => &self.be,
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Takes one event packet from the module. Fragments are held back until the final packet
    /// of their event arrives; the reports of the whole event are then returned in order.
    pub fn handle(&mut self, packet: DebugPacket) -> Result<Vec<Report>, PacketError> {
        let checked = self.check(&packet);
        if let Err(e) = checked {
            self.stats.rejected += 1;
            warn!("event rejected: {}", e);
            return Err(e);
        }
        if packet.has_continuation() {
            self.partial.push(packet);
            return Ok(Vec::new());
        }
        self.partial.push(packet);
        let fragments = std::mem::take(&mut self.partial);
        fragments.iter().map(|p| self.decode(p)).collect()
    }

    fn check(&self, packet: &DebugPacket) -> Result<(), PacketError> {
        if packet.src != self.module_addr {
            return Err(PacketError::UnexpectedSource { got: packet.src, expected: self.module_addr });
        }
        if !packet.is_event() {
            return Err(PacketError::UnexpectedType(decode_flags(packet.flags).0));
        }
        if packet.payload.len() < 2 {
            return Err(PacketError::ShortPayload(packet.payload.len()));
        }
        Ok(())
    }

    fn decode(&mut self, packet: &DebugPacket) -> Result<Report, PacketError> {
        let id = packet.payload[0];
        match ReportId::decode(id) {
            Some(ReportId::Fault { start_node }) => Ok(self.decode_faults(start_node as usize, &packet.payload[1..])),
            Some(ReportId::Util { node, word, class }) => self.decode_util(node as usize, word, class, &packet.payload[1..]),
            None => Err(PacketError::UnknownSubId(id)),
        }
    }

    fn decode_faults(&mut self, start: usize, words: &[u16]) -> Report {
        let n = self.faults.len();
        let mut node = start;
        for &word in words {
            let (lo, hi) = unpack_fault_pair(word);
            for bits in [lo, hi] {
                if node < n {
                    self.faults[node] = bits;
                    node += 1;
                }
            }
        }
        self.stats.fault_reports += 1;
        debug!("fault vector {:x?}", self.faults);
        Report::Fault { start, end: node.min(n) }
    }

    fn decode_util(
        &mut self,
        node: usize,
        word: CounterWord,
        class: TrafficClass,
        values: &[u16],
    ) -> Result<Report, PacketError> {
        if node >= self.topology.num_nodes() {
            return Err(PacketError::UnknownSubId(ReportId::Util { node: node as u16, word, class }.encode()));
        }
        let links = &self.topology.node(node).active_links;
        let table = match class {
            TrafficClass::Tdm => &mut self.tdm,
            TrafficClass::Be => &mut self.be,
        };
        for (&link, &value) in links.iter().zip(values) {
            let counter = &mut table[node][link as usize];
            match word {
                CounterWord::Low => *counter = value as u32,
                CounterWord::High => *counter |= (value as u32) << 16,
            }
        }
        if values.len() != links.len() {
            debug!("node {} util packet has {} values for {} links", node, values.len(), links.len());
        }
        self.stats.util_packets += 1;
        Ok(Report::Util { node, class, word })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::config::MeshConfig;
    use crate::packet::pack_fault_pair;

    fn decoder() -> EventDecoder {
        let topo = Topology::new(&MeshConfig::default()).unwrap();
        EventDecoder::new(5, Arc::new(topo))
    }

    fn fault_packet(start: u16, more: bool, words: &[u16]) -> DebugPacket {
        DebugPacket::event(1, 5, more)
            .with_payload([ReportId::Fault { start_node: start }.encode()])
            .with_payload(words.iter().copied())
    }

    #[test]
    fn fault_vector_from_a_report() {
        let mut d = decoder();
        let words = [pack_fault_pair(0, 1), pack_fault_pair(2, 3), pack_fault_pair(4, 5), 0, 0x0008];
        let reports = d.handle(fault_packet(0, false, &words)).unwrap();
        assert_eq!(vec![Report::Fault { start: 0, end: 9 }], reports);
        assert_eq!(&[0, 1, 2, 3, 4, 5, 0, 0, 8], d.faults());
    }

    #[test]
    fn fragments_are_merged() {
        let mut d = decoder();
        assert!(d.handle(fault_packet(0, true, &[0x0101, 0x0101])).unwrap().is_empty());
        assert_eq!(&[0; 9], d.faults());
        let reports = d.handle(fault_packet(4, false, &[0x0202, 0x0202, 0x0002])).unwrap();
        assert_eq!(2, reports.len());
        assert_eq!(&[1, 1, 1, 1, 2, 2, 2, 2, 2], d.faults());
    }

    #[test]
    fn utilization_words_combine() {
        let mut d = decoder();
        // node 0 of a 3x3 mesh: east, south and four local links
        let id = |word| ReportId::Util { node: 0, word, class: TrafficClass::Be }.encode();
        let low = DebugPacket::event(1, 5, false).with_payload([id(CounterWord::Low), 1, 2, 3, 4, 5, 6]);
        let high = DebugPacket::event(1, 5, false).with_payload([id(CounterWord::High), 0, 1, 0, 0, 0, 0]);
        d.handle(low).unwrap();
        d.handle(high).unwrap();
        let be = &d.util(TrafficClass::Be)[0];
        assert_eq!(1, be[1]);
        assert_eq!(0x0001_0002, be[2]);
        assert_eq!(6, be[7]);
        assert_eq!(0, d.util(TrafficClass::Tdm)[0][1]);
    }

    #[test]
    fn foreign_and_short_packets_are_rejected() {
        let mut d = decoder();
        let foreign = DebugPacket::event(1, 6, false).with_payload([0, 0]);
        assert_eq!(
            Err(PacketError::UnexpectedSource { got: 6, expected: 5 }),
            d.handle(foreign)
        );
        let short = DebugPacket::event(1, 5, false).with_payload([0]);
        assert_eq!(Err(PacketError::ShortPayload(1)), d.handle(short));
        assert_eq!(2, d.stats().rejected);
    }
}
