use std::collections::VecDeque;
use std::sync::Arc;

use log::warn;

use crate::ncm::HostPorts;
use crate::packet::{DebugPacket, Flit, PacketAssembler};
use crate::sim::clock::Cycle;
use crate::sim::trace::{Direction, FlitTrace};

/// Host end of the debug interconnect: serializes outgoing packets one flit per cycle and
/// frames incoming flits back into packets.
pub struct HostPort {
    ports: HostPorts,
    outbox: VecDeque<Flit>,
    asm: PacketAssembler,
    inbox: VecDeque<DebugPacket>,
    trace: Option<Arc<FlitTrace>>,
}

impl HostPort {
    pub fn new(ports: HostPorts) -> Self {
        Self {
            ports,
            outbox: VecDeque::new(),
            asm: PacketAssembler::default(),
            inbox: VecDeque::new(),
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: Arc<FlitTrace>) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn send(&mut self, packet: &DebugPacket) {
        self.outbox.extend(packet.to_flits());
    }

    pub fn recv(&mut self) -> Option<DebugPacket> {
        self.inbox.pop_front()
    }

    /// Nothing left to send and no packet half received.
    pub fn idle(&self) -> bool {
        self.outbox.is_empty() && !self.asm.in_progress()
    }

    /// Moves at most one flit in each direction.
    pub fn tick(&mut self, cycle: Cycle) {
        if !self.ports.tx.full() {
            if let Some(flit) = self.outbox.pop_front() {
                if let Some(trace) = &self.trace {
                    trace.record(cycle, "host", Direction::Down, &flit);
                }
                self.ports.tx.push(flit);
            }
        }
        if let Some(flit) = self.ports.rx.pop() {
            if let Some(trace) = &self.trace {
                trace.record(cycle, "host", Direction::Up, &flit);
            }
            match self.asm.push(flit) {
                Some(Ok(packet)) => self.inbox.push_back(packet),
                Some(Err(e)) => warn!("host dropped a malformed packet: {}", e),
                None => {}
            }
        }
    }

    pub fn reset(&mut self) {
        self.outbox.clear();
        self.asm.clear();
        self.inbox.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ncm::connect;

    #[test]
    fn one_flit_per_cycle_each_way() {
        let (host, mut fe, _noc) = connect(8);
        let mut port = HostPort::new(host);
        port.send(&DebugPacket::event(5, 1, false).with_payload([7]));
        port.tick(0);
        assert!(!port.idle());
        assert_eq!(1, fe.host_rx.len());

        for flit in DebugPacket::event(1, 5, false).with_payload([9]).to_flits() {
            fe.host_tx.push(flit);
        }
        (1..4).for_each(|c| port.tick(c));
        assert!(port.idle());
        assert_eq!(4, fe.host_rx.len());
        let got = port.recv().unwrap();
        assert_eq!(vec![9], got.payload);
        assert_eq!(None, port.recv());
    }
}
