use std::sync::Arc;

use log::trace;

use crate::base::behavior::{ModuleBehaviors, Parameterizable};
use crate::base::module::IsModule;
use crate::base::module::{module, ModuleBase};
use crate::ncm::config::NcmConfig;
use crate::packet::Flit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Fault,
    Util,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    #[default]
    Idle,
    FdOut,
    UtilOut,
}

/// A flit presented by a report builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offer {
    pub flit: Flit,
    /// Last flit of the whole report, not just of its packet.
    pub closes: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterState {
    pub owner: Owner,
}

impl ArbiterState {
    /// One cycle: `fault` and `util` are what the two builders present, `ready` is the
    /// outbound channel's acceptance. Returns the flit forwarded and its stream.
    pub fn next(
        self,
        fault: Option<Offer>,
        util: Option<Offer>,
        ready: bool,
    ) -> (Self, Option<(Stream, Flit)>) {
        let stream = match self.owner {
            Owner::FdOut => Stream::Fault,
            Owner::UtilOut => Stream::Util,
            Owner::Idle if fault.is_some() => Stream::Fault,
            Owner::Idle if util.is_some() => Stream::Util,
            Owner::Idle => return (self, None),
        };
        let (owner, offered, other) = match stream {
            Stream::Fault => (Owner::FdOut, fault, util),
            Stream::Util => (Owner::UtilOut, util, fault),
        };
        let mut next = ArbiterState { owner };
        let Some(offer) = offered.filter(|_| ready) else {
            return (next, None);
        };
        if offer.closes {
            next.owner = match (stream, other.is_some()) {
                (Stream::Fault, true) => Owner::UtilOut,
                (Stream::Util, true) => Owner::FdOut,
                _ => Owner::Idle,
            };
        }
        (next, Some((stream, offer.flit)))
    }
}

/// Puts the fault and utilization report streams on the one outbound channel, a whole report
/// at a time, fault reports first.
pub struct Arbiter {
    base: ModuleBase<ArbiterState, NcmConfig>,
}

module!(Arbiter, ArbiterState, NcmConfig,);

impl Arbiter {
    pub fn new(config: Arc<NcmConfig>) -> Self {
        let mut me = Arbiter { base: ModuleBase::default() };
        me.init_conf(config);
        me
    }

    pub fn step(&mut self, fault: Option<Offer>, util: Option<Offer>, ready: bool) -> Option<(Stream, Flit)> {
        let (next, out) = self.base.state.next(fault, util, ready);
        if next.owner != self.base.state.owner {
            trace!("arbiter {:?} -> {:?}", self.base.state.owner, next.owner);
        }
        self.base.state = next;
        out
    }
}

impl ModuleBehaviors for Arbiter {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        self.base.state = ArbiterState::default();
    }
}
