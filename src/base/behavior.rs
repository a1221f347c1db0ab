use std::sync::Arc;

/// Per-cycle behavior shared by every module of a clock domain.
pub trait ModuleBehaviors {
    /// Advance the module by one cycle of the clock it belongs to.
    fn tick_one(&mut self) {}

    /// Synchronous reset: drop every latched command and report state.
    fn reset(&mut self) {}
}

pub trait Parameterizable {
    type ConfigType;

    fn conf(&self) -> &Self::ConfigType;

    fn init_conf(&mut self, conf: Arc<Self::ConfigType>);
}
