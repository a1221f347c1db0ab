use std::sync::Arc;

use log::{debug, trace, warn};

use crate::base::behavior::{ModuleBehaviors, Parameterizable};
use crate::base::module::IsModule;
use crate::base::module::{module, ModuleBase};
use crate::ncm::config::{NcmConfig, Unaddressed};
use crate::ncm::slot_config::{SlotConfigState, SlotEffect};
use crate::packet::{join_window, Flit, SubAddress};

/// Work for the NoC domain produced by one inbound payload flit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Slot(SlotEffect),
    /// Raw fault-injection word.
    FaultInject(u16),
    Window(u32),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Stream {
    /// Waiting for the sub-address word.
    #[default]
    Select,
    FaultInject,
    SlotConfig(SlotConfigState),
    Window { low: Option<u16> },
    /// Rest of a stream nobody claims.
    Absorb,
}

#[derive(Debug, Default)]
pub struct DispatchState {
    stream: Stream,
    unaddressed: u64,
    effects: u64,
}

/// Routes each inbound event stream to the engine named by its first payload word.
pub struct CommandDispatcher {
    base: ModuleBase<DispatchState, NcmConfig>,
}

module!(CommandDispatcher, DispatchState, NcmConfig,);

impl CommandDispatcher {
    pub fn new(config: Arc<NcmConfig>) -> Self {
        let mut me = CommandDispatcher { base: ModuleBase::default() };
        me.init_conf(config);
        me
    }

    pub fn step(&mut self, flit: Flit) -> Option<Effect> {
        let stream = self.base.state.stream;
        let (next, effect) = match stream {
            Stream::Select => (self.select(flit.data), None),
            Stream::FaultInject => (Stream::FaultInject, Some(Effect::FaultInject(flit.data))),
            Stream::SlotConfig(slot) => {
                let (slot, effect) = slot.next(flit);
                (Stream::SlotConfig(slot), effect.map(Effect::Slot))
            }
            Stream::Window { low: None } => (Stream::Window { low: Some(flit.data) }, None),
            Stream::Window { low: Some(low) } => {
                (Stream::Absorb, Some(Effect::Window(join_window(low, flit.data))))
            }
            Stream::Absorb => (Stream::Absorb, None),
        };
        if flit.last {
            if let Stream::Window { low: Some(_) } = next {
                trace!("window command without high word dropped");
            }
        }
        self.base.state.stream = if flit.last { Stream::Select } else { next };
        if effect.is_some() {
            self.base.state.effects += 1;
        }
        effect
    }

    fn select(&mut self, word: u16) -> Stream {
        match SubAddress::decode(word) {
            Some(SubAddress::FaultInject) => Stream::FaultInject,
            Some(SubAddress::SlotConfig) => Stream::SlotConfig(SlotConfigState::Idle),
            Some(SubAddress::ClockConfig) => Stream::Window { low: None },
            None => {
                self.base.state.unaddressed += 1;
                match self.conf().unaddressed {
                    Unaddressed::Log => warn!("no engine claims sub-address {:#06x}, stream absorbed", word),
                    Unaddressed::Drop => debug!("sub-address {:#06x} dropped", word),
                }
                Stream::Absorb
            }
        }
    }

    /// Streams whose sub-address no engine claimed.
    pub fn unaddressed(&self) -> u64 {
        self.base.state.unaddressed
    }

    pub fn effects(&self) -> u64 {
        self.base.state.effects
    }
}

impl ModuleBehaviors for CommandDispatcher {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        self.base.state.stream = Stream::Select;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{SlotWord, TargetWord};

    fn feed(d: &mut CommandDispatcher, words: &[u16]) -> Vec<Effect> {
        let n = words.len();
        words
            .iter()
            .enumerate()
            .filter_map(|(i, &w)| d.step(Flit::new(w, i + 1 == n)))
            .collect()
    }

    fn dispatcher() -> CommandDispatcher {
        CommandDispatcher::new(Arc::new(NcmConfig::default()))
    }

    #[test]
    fn window_command_joins_two_words() {
        let mut d = dispatcher();
        assert_eq!(vec![Effect::Window(0x0001_0002)], feed(&mut d, &[2, 0x0002, 0x0001]));
        assert_eq!(Vec::<Effect>::new(), feed(&mut d, &[2, 0x0002]));
    }

    #[test]
    fn fault_stream_words_are_independent() {
        let mut d = dispatcher();
        assert_eq!(
            vec![Effect::FaultInject(0x0104), Effect::FaultInject(0x0200)],
            feed(&mut d, &[0, 0x0104, 0x0200])
        );
    }

    #[test]
    fn slot_stream() {
        let mut d = dispatcher();
        let first = SlotWord { slot: 3, data: 5, sel: 2 }.encode();
        let second = TargetWord { ni_sel: false, link_en: false, node: 4 }.encode();
        assert_eq!(
            vec![Effect::Slot(SlotEffect::RouterSlot { node: 4, table: 2, slot: 3, value: 5 })],
            feed(&mut d, &[1, first, second])
        );
    }

    #[test]
    fn unaddressed_stream_is_absorbed_until_last() {
        let mut d = dispatcher();
        assert!(feed(&mut d, &[7, 0, 0x0104]).is_empty());
        assert_eq!(1, d.unaddressed());
        // the next stream is routed normally
        assert_eq!(vec![Effect::FaultInject(0x0104)], feed(&mut d, &[0, 0x0104]));
        assert_eq!(1, d.effects());
    }
}
