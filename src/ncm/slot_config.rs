use log::trace;

use crate::mesh::fabric::ConfigSink;
use crate::packet::{Flit, SlotWord, TargetWord};

/// Exactly one of these is asserted per decoded command. Values are passed on unvalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotEffect {
    RouterSlot { node: u16, table: u8, slot: u8, value: u8 },
    NiSlot { node: u16, table: u8, slot: u8, value: u8 },
    LinkEnable { node: u16, endpoint: u8, link: u8, enable: bool },
}

impl SlotEffect {
    pub fn decode(first: SlotWord, target: TargetWord) -> Self {
        let SlotWord { slot, data, sel } = first;
        let node = target.node;
        if target.link_en {
            SlotEffect::LinkEnable { node, endpoint: sel, link: slot, enable: data & 1 == 1 }
        } else if target.ni_sel {
            SlotEffect::NiSlot { node, table: sel, slot, value: data }
        } else {
            SlotEffect::RouterSlot { node, table: sel, slot, value: data }
        }
    }

    pub fn apply(&self, sink: &mut dyn ConfigSink) {
        match *self {
            SlotEffect::RouterSlot { node, table, slot, value } => {
                sink.write_router_slot(node, table, slot, value)
            }
            SlotEffect::NiSlot { node, table, slot, value } => {
                sink.write_ni_slot(node, table, slot, value)
            }
            SlotEffect::LinkEnable { node, endpoint, link, enable } => {
                sink.set_link_enable(node, endpoint, link, enable)
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SlotConfigState {
    #[default]
    Idle,
    Latched(SlotWord),
}

impl SlotConfigState {
    /// One payload flit of a slot-configuration stream. The effect of a command appears on the
    /// flit that completes it; a stream ending after a first flit drops the half command.
    pub fn next(self, flit: Flit) -> (Self, Option<SlotEffect>) {
        match self {
            SlotConfigState::Idle if flit.last => {
                trace!("slot config: stream ended with half a command");
                (SlotConfigState::Idle, None)
            }
            SlotConfigState::Idle => (SlotConfigState::Latched(SlotWord::decode(flit.data)), None),
            SlotConfigState::Latched(first) => {
                let effect = SlotEffect::decode(first, TargetWord::decode(flit.data));
                (SlotConfigState::Idle, Some(effect))
            }
        }
    }
}
