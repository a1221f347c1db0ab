use crate::error::ConfigError;
use smallvec::SmallVec;

pub type Cycle = u64;

const PS_PER_US: u64 = 1_000_000;

/// One independently clocked domain; edges are tracked in picoseconds.
#[derive(Debug, Clone)]
pub struct ClockDomain {
    name: &'static str,
    period_ps: u64,
    next_edge_ps: u64,
    cycles: Cycle,
}

impl ClockDomain {
    pub fn new(name: &'static str, freq_mhz: u64) -> Result<Self, ConfigError> {
        if freq_mhz == 0 {
            return Err(ConfigError::ZeroFrequency(name));
        }
        Ok(Self {
            name,
            period_ps: (PS_PER_US / freq_mhz).max(1),
            next_edge_ps: 0,
            cycles: 0,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn period_ps(&self) -> u64 {
        self.period_ps
    }

    pub fn next_edge(&self) -> u64 {
        self.next_edge_ps
    }

    /// Cycles elapsed in this domain.
    pub fn cycles(&self) -> Cycle {
        self.cycles
    }

    fn advance(&mut self) {
        self.next_edge_ps += self.period_ps;
        self.cycles += 1;
    }
}

/// Deterministic scheduler over several clock domains.
#[derive(Debug, Clone, Default)]
pub struct MultiClock {
    domains: Vec<ClockDomain>,
    now_ps: u64,
}

impl MultiClock {
    pub fn new(domains: Vec<ClockDomain>) -> Self {
        Self { domains, now_ps: 0 }
    }

    pub fn domain(&self, idx: usize) -> &ClockDomain {
        &self.domains[idx]
    }

    pub fn now_ps(&self) -> u64 {
        self.now_ps
    }

    /// Moves time to the earliest pending edge and returns the domains that tick on it, in
    /// registration order. Coincident edges tick together.
    pub fn step(&mut self) -> SmallVec<[usize; 4]> {
        let Some(edge) = self.domains.iter().map(ClockDomain::next_edge).min() else {
            return SmallVec::new();
        };
        self.now_ps = edge;
        let mut fired = SmallVec::new();
        for (idx, domain) in self.domains.iter_mut().enumerate() {
            if domain.next_edge() == edge {
                domain.advance();
                fired.push(idx);
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_frequency_is_rejected() {
        assert_eq!(Err(ConfigError::ZeroFrequency("noc")), ClockDomain::new("noc", 0).map(|_| ()));
    }

    #[test]
    fn faster_domain_ticks_proportionally() {
        let fast = ClockDomain::new("fast", 100).unwrap();
        let slow = ClockDomain::new("slow", 50).unwrap();
        let mut clk = MultiClock::new(vec![fast, slow]);
        let mut counts = [0u32; 2];
        while clk.domain(1).cycles() < 10 {
            for idx in clk.step() {
                counts[idx] += 1;
            }
        }
        assert_eq!([19, 10], counts);
    }

    #[test]
    fn coincident_edges_fire_together() {
        let a = ClockDomain::new("a", 10).unwrap();
        let b = ClockDomain::new("b", 10).unwrap();
        let mut clk = MultiClock::new(vec![a, b]);
        assert_eq!(&[0, 1], clk.step().as_slice());
        assert_eq!(&[0, 1], clk.step().as_slice());
        assert_eq!(100_000, clk.now_ps());
    }
}
