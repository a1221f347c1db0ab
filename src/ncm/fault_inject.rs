use log::debug;

use crate::mesh::fabric::ConfigSink;
use crate::packet::FaultWord;

/// Stateless: every payload word of a fault-injection stream replaces one node's enable byte.
pub fn inject(word: u16, sink: &mut dyn ConfigSink) -> FaultWord {
    let cmd = FaultWord::decode(word);
    debug!("fault injection: node {} links {:#010b}", cmd.node, cmd.mask);
    sink.set_fault_inject(cmd.node, cmd.mask);
    cmd
}
