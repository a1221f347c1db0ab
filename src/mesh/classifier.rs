use crate::mesh::fabric::UtilSample;
use crate::packet::{Flit, TrafficClass};
use log::trace;
use serde::Serialize;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassifierStats {
    pub tdm_flits: u64,
    pub be_flits: u64,
    pub tdm_packets: u64,
    pub be_packets: u64,
    /// Packets that ran past the maximum length or were cut by a flit of the other class.
    pub framing_faults: u64,
}

/// Watches the flits crossing one tile port, validates packet framing per traffic class and
/// turns every transfer into a utilization sample.
#[derive(Debug, Clone)]
pub struct PacketClassifier {
    max_flits: usize,
    /// Class and length so far of the packet being transferred.
    open: Option<(TrafficClass, usize)>,
    sample: UtilSample,
    stats: ClassifierStats,
}

impl PacketClassifier {
    pub fn new(max_flits: usize) -> Self {
        Self {
            max_flits,
            open: None,
            sample: UtilSample::default(),
            stats: ClassifierStats::default(),
        }
    }

    /// Called once per NoC cycle with whatever moved across the port.
    pub fn observe(&mut self, transfer: Option<(Flit, TrafficClass)>) {
        self.sample = UtilSample::default();
        let Some((flit, class)) = transfer else {
            return;
        };
        match class {
            TrafficClass::Tdm => {
                self.sample.tdm = 1;
                self.stats.tdm_flits += 1;
            }
            TrafficClass::Be => {
                self.sample.be = 1;
                self.stats.be_flits += 1;
            }
        }

        let len = match self.open {
            Some((open_class, _)) if open_class != class => {
                trace!("{:?} flit inside an open {:?} packet", class, open_class);
                self.stats.framing_faults += 1;
                1
            }
            Some((_, len)) => len + 1,
            None => 1,
        };
        if flit.last {
            self.open = None;
            match class {
                TrafficClass::Tdm => self.stats.tdm_packets += 1,
                TrafficClass::Be => self.stats.be_packets += 1,
            }
        } else if len >= self.max_flits {
            self.stats.framing_faults += 1;
            self.open = None;
        } else {
            self.open = Some((class, len));
        }
    }

    pub fn sample(&self) -> UtilSample {
        self.sample
    }

    pub fn stats(&self) -> ClassifierStats {
        self.stats
    }

    pub fn reset(&mut self) {
        self.open = None;
        self.sample = UtilSample::default();
        self.stats = ClassifierStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_packets_per_class() {
        let mut c = PacketClassifier::new(8);
        c.observe(Some((Flit::body(1), TrafficClass::Be)));
        assert_eq!(UtilSample { tdm: 0, be: 1 }, c.sample());
        c.observe(Some((Flit::tail(2), TrafficClass::Tdm)));
        assert_eq!(UtilSample { tdm: 1, be: 0 }, c.sample());
        c.observe(None);
        assert_eq!(UtilSample::default(), c.sample());
        c.observe(Some((Flit::tail(3), TrafficClass::Be)));
        let s = c.stats();
        assert_eq!((1, 1), (s.tdm_packets, s.be_packets));
        assert_eq!((1, 2), (s.tdm_flits, s.be_flits));
        assert_eq!(0, s.framing_faults);
    }

    #[test]
    fn class_switch_inside_packet_is_a_framing_fault() {
        let mut c = PacketClassifier::new(8);
        c.observe(Some((Flit::body(1), TrafficClass::Tdm)));
        c.observe(Some((Flit::tail(2), TrafficClass::Be)));
        assert_eq!(1, c.stats().framing_faults);
        assert_eq!(1, c.stats().be_packets);
        assert_eq!(0, c.stats().tdm_packets);
    }

    #[test]
    fn overlong_packet_is_a_framing_fault() {
        let mut c = PacketClassifier::new(2);
        for _ in 0..3 {
            c.observe(Some((Flit::body(0), TrafficClass::Be)));
        }
        assert_eq!(1, c.stats().framing_faults);
        assert_eq!(0, c.stats().be_packets);
    }
}
