use std::sync::Arc;

use log::trace;

use crate::base::behavior::{ModuleBehaviors, Parameterizable};
use crate::base::module::IsModule;
use crate::base::module::{module, ModuleBase};
use crate::ncm::config::NcmConfig;
use crate::packet::{decode_flags, EventSubtype, Flit, PacketType, HEADER_FLITS};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStripState {
    #[default]
    Dest,
    Src,
    Flags,
    /// `continued`: the packet is a non-final fragment of a multi-packet event.
    Payload { continued: bool },
    /// Dropping the rest of an event cut by a reset; `seen` header flits of the current packet
    /// have gone by.
    Skip { seen: usize, continued: bool },
}

/// What the stage did with the flit at its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strip {
    /// Header flit consumed, nothing forwarded.
    Header,
    /// Payload flit consumed and handed downstream.
    Forward(Flit),
    /// Downstream not ready, input left in place.
    Stall,
}

fn is_continued(flags: u16) -> bool {
    let (ty, subtype) = decode_flags(flags);
    ty == PacketType::Event as u8 && subtype == EventSubtype::NotLast as u8
}

impl HeaderStripState {
    pub fn next(self, flit: Flit, ready: bool) -> (Self, Strip) {
        use HeaderStripState::*;
        let next = match self {
            Skip { seen, continued } => {
                let continued = if seen == HEADER_FLITS - 1 { is_continued(flit.data) } else { continued };
                let next = match (flit.last, continued) {
                    (true, true) => Skip { seen: 0, continued: false },
                    (true, false) => Dest,
                    (false, _) => Skip { seen: (seen + 1).min(HEADER_FLITS), continued },
                };
                return (next, Strip::Header);
            }
            Payload { continued } => {
                if !ready {
                    return (self, Strip::Stall);
                }
                let out = Flit::new(flit.data, flit.last && !continued);
                let next = if flit.last { Dest } else { self };
                return (next, Strip::Forward(out));
            }
            // a header cut short by `last` carries nothing
            _ if flit.last => Dest,
            Dest => Src,
            Src => Flags,
            Flags => Payload { continued: is_continued(flit.data) },
        };
        (next, Strip::Header)
    }
}

/// Turns inbound debug packets into one payload stream per logical event.
pub struct HeaderStrip {
    base: ModuleBase<HeaderStripState, NcmConfig>,
}

module!(HeaderStrip, HeaderStripState, NcmConfig,);

impl HeaderStrip {
    pub fn new(config: Arc<NcmConfig>) -> Self {
        let mut me = HeaderStrip { base: ModuleBase::default() };
        me.init_conf(config);
        me
    }

    pub fn step(&mut self, flit: Flit, ready: bool) -> Strip {
        let (next, out) = self.base.state.next(flit, ready);
        if next != self.base.state {
            trace!("header strip {:?} -> {:?} on {}", self.base.state, next, flit);
        }
        self.base.state = next;
        out
    }

}

impl ModuleBehaviors for HeaderStrip {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    /// Resumes on the next event boundary; whatever is left of an event under way is dropped.
    fn reset(&mut self) {
        use HeaderStripState::*;
        self.base.state = match self.base.state {
            Dest => Dest,
            Src => Skip { seen: 1, continued: false },
            Flags => Skip { seen: 2, continued: false },
            Payload { continued } => Skip { seen: HEADER_FLITS, continued },
            skip @ Skip { .. } => skip,
        };
    }
}
