use thiserror::Error;

/// Startup configuration violations. The module refuses to come up with any of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("mesh dimension {axis} = {value} out of range 1..=255")]
    BadDimension { axis: char, value: usize },
    #[error("mesh has {nodes} nodes, fault report encoding supports at most {max}")]
    TooManyNodes { nodes: usize, max: usize },
    #[error("slot table size {0} is not a power of two in 1..=256")]
    BadLutSize(usize),
    #[error("max packet length {len} below minimum {min}")]
    PacketTooShort { len: usize, min: usize },
    #[error("counter width {0} out of range 1..=32")]
    BadCounterWidth(u32),
    #[error("{0} local links requested, a node has at most 4")]
    TooManyLocalLinks(usize),
    #[error("cdc queue depth must be non-zero")]
    ZeroQueueDepth,
    #[error("clock frequency of domain `{0}` must be non-zero")]
    ZeroFrequency(&'static str),
}

/// Malformed packets seen by host-side decoders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("packet of {0} flits has no complete header")]
    Truncated(usize),
    #[error("event payload of {0} words is too short")]
    ShortPayload(usize),
    #[error("unexpected source {got:#06x}, expected {expected:#06x}")]
    UnexpectedSource { got: u16, expected: u16 },
    #[error("unknown report sub-module id {0:#06x}")]
    UnknownSubId(u16),
    #[error("register access to {addr:#06x} failed")]
    RegisterError { addr: u16 },
    #[error("unexpected packet type {0}")]
    UnexpectedType(u8),
}

/// Reasons a TDM channel or path request is refused by the host client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TdmError {
    #[error("host client has not read the mesh layout yet")]
    NotReady,
    #[error("node {0} has no free endpoint")]
    NoFreeEndpoint(usize),
    #[error("no path from {src} to {dest}")]
    NoPath { src: usize, dest: usize },
    #[error("not enough free slots along the path")]
    NoFreeSlots,
    #[error("path is not disjoint from the other half of the channel")]
    NotDisjoint,
    #[error("unknown channel {0}")]
    UnknownChannel(usize),
    #[error("path index {0} of the channel is taken or out of range")]
    PathIndexTaken(usize),
    #[error("channel has no path at index {0}")]
    NoPathAtIndex(usize),
}
