use log::trace;

use crate::mesh::fabric::UtilSource;
use crate::mesh::topology::{Topology, MAX_LINKS};
use crate::ncm::config::UtilMode;
use crate::packet::TrafficClass;

/// Counter values of one window, indexed `[node][class][link]`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UtilSnapshot {
    counters: Vec<[[u32; MAX_LINKS]; 2]>,
}

impl UtilSnapshot {
    pub fn new(num_nodes: usize) -> Self {
        Self { counters: vec![[[0; MAX_LINKS]; 2]; num_nodes] }
    }

    pub fn get(&self, node: usize, class: TrafficClass, link: u8) -> u32 {
        self.counters[node][class as usize][link as usize]
    }

    pub fn num_nodes(&self) -> usize {
        self.counters.len()
    }

    fn add(&mut self, node: usize, class: TrafficClass, link: u8, value: u32, mask: u32) {
        let c = &mut self.counters[node][class as usize][link as usize];
        *c = ((*c as u64 + value as u64) & mask as u64) as u32;
    }

    fn clear(&mut self) {
        self.counters.iter_mut().for_each(|node| *node = [[0; MAX_LINKS]; 2]);
    }
}

/// Per-link TDM/BE counters of every active link, in either accumulation policy.
#[derive(Debug, Default, Clone)]
pub struct UtilAggregator {
    counters: UtilSnapshot,
    elapsed: u32,
    recording: bool,
}

impl UtilAggregator {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            counters: UtilSnapshot::new(num_nodes),
            ..Self::default()
        }
    }

    /// Starts a fresh window.
    pub fn restart(&mut self) {
        self.counters.clear();
        self.elapsed = 0;
    }

    fn accumulate(&mut self, topology: &Topology, source: &dyn UtilSource, mask: u32) {
        for info in topology.nodes() {
            for &link in &info.active_links {
                let sample = source.util_sample(info.id, link);
                self.counters.add(info.id, TrafficClass::Tdm, link, sample.tdm, mask);
                self.counters.add(info.id, TrafficClass::Be, link, sample.be, mask);
            }
        }
    }

    /// One NoC cycle. Returns the snapshot to report when a window closes.
    pub fn step(
        &mut self,
        topology: &Topology,
        source: &dyn UtilSource,
        mode: UtilMode,
        window: u32,
        mask: u32,
    ) -> Option<UtilSnapshot> {
        match mode {
            UtilMode::Continuous => {
                if window == 0 {
                    return None;
                }
                self.accumulate(topology, source, mask);
                self.elapsed += 1;
                if self.elapsed < window {
                    return None;
                }
                let snapshot = self.counters.clone();
                self.restart();
                Some(snapshot)
            }
            UtilMode::Triggered => {
                let recording = source.recording();
                if recording && !self.recording {
                    trace!("recording starts, counters cleared");
                    self.counters.clear();
                }
                if recording {
                    self.accumulate(topology, source, mask);
                }
                let stopped = self.recording && !recording;
                self.recording = recording;
                stopped.then(|| self.counters.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::config::MeshConfig;
    use crate::mesh::fabric::UtilSample;
    use std::cell::Cell;

    struct Constant {
        sample: UtilSample,
        recording: Cell<bool>,
    }

    impl UtilSource for Constant {
        fn util_sample(&self, _: usize, _: u8) -> UtilSample {
            self.sample
        }

        fn recording(&self) -> bool {
            self.recording.get()
        }
    }

    fn topo() -> Topology {
        Topology::new(&MeshConfig::default()).unwrap()
    }

    fn source(tdm: u32, be: u32) -> Constant {
        Constant { sample: UtilSample { tdm, be }, recording: Cell::new(false) }
    }

    #[test]
    fn continuous_window_counts_w_times_u() {
        let topo = topo();
        let src = source(1, 0);
        let mut agg = UtilAggregator::new(9);
        let mut snaps = Vec::new();
        for _ in 0..250 {
            snaps.extend(agg.step(&topo, &src, UtilMode::Continuous, 100, u32::MAX));
        }
        assert_eq!(2, snaps.len());
        for snap in &snaps {
            assert_eq!(100, snap.get(4, TrafficClass::Tdm, 0));
            assert_eq!(0, snap.get(4, TrafficClass::Be, 0));
            // node 0 has no north link
            assert_eq!(0, snap.get(0, TrafficClass::Tdm, 0));
            assert_eq!(100, snap.get(0, TrafficClass::Tdm, 1));
        }
    }

    #[test]
    fn zero_window_suspends() {
        let topo = topo();
        let src = source(1, 1);
        let mut agg = UtilAggregator::new(9);
        for _ in 0..10 {
            assert_eq!(None, agg.step(&topo, &src, UtilMode::Continuous, 0, u32::MAX));
        }
        let snap = (0..5).filter_map(|_| agg.step(&topo, &src, UtilMode::Continuous, 5, u32::MAX)).next();
        assert_eq!(Some(5), snap.map(|s| s.get(1, TrafficClass::Be, 4)));
    }

    #[test]
    fn triggered_counts_while_recording() {
        let topo = topo();
        let src = source(0, 1);
        let mut agg = UtilAggregator::new(9);
        let mut snaps = Vec::new();
        for cycle in 0..100 {
            src.recording.set((10..40).contains(&cycle) || (60..65).contains(&cycle));
            snaps.extend(agg.step(&topo, &src, UtilMode::Triggered, 0, u32::MAX));
        }
        assert_eq!(2, snaps.len());
        assert_eq!(30, snaps[0].get(3, TrafficClass::Be, 5));
        assert_eq!(5, snaps[1].get(3, TrafficClass::Be, 5));
    }

    #[test]
    fn counters_wrap_at_width() {
        let topo = topo();
        let src = source(1, 0);
        let mut agg = UtilAggregator::new(9);
        let snap = (0..20).find_map(|_| agg.step(&topo, &src, UtilMode::Continuous, 20, 0xf));
        assert_eq!(Some(4), snap.map(|s| s.get(4, TrafficClass::Tdm, 1)));
    }
}
