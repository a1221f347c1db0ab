//! Bit-level layout of every field carried in debug packet flits.
//!
//! Nothing outside this module shifts or masks wire words.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

pub trait BitSelect {
    /// Inclusive bit range `[hi:lo]`, shifted down to bit 0.
    fn sel(&self, hi: u32, lo: u32) -> u32;
}

impl BitSelect for u16 {
    fn sel(&self, hi: u32, lo: u32) -> u32 {
        assert!(hi >= lo && hi < 16, "bad bit range [{}:{}]", hi, lo);
        ((*self as u32) >> lo) & ((1u32 << (hi - lo + 1)) - 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum PacketType {
    Reg = 0,
    Plain = 1,
    Event = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum EventSubtype {
    Last = 0,
    NotLast = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum RegSubtype {
    ReadReq16 = 0b0000,
    WriteReq16 = 0b0100,
    ReadRespSuccess16 = 0b1000,
    ReadRespError = 0b1100,
    WriteRespSuccess = 0b1110,
    WriteRespError = 0b1111,
}

pub fn encode_flags(ty: PacketType, subtype: u8) -> u16 {
    ((ty as u16 & 0x3) << 14) | ((subtype as u16 & 0xf) << 10)
}

/// Returns `(type, subtype)`; the reserved low ten bits are ignored.
pub fn decode_flags(flags: u16) -> (u8, u8) {
    (flags.sel(15, 14) as u8, flags.sel(13, 10) as u8)
}

/// First payload word of a host command: which engine claims the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum SubAddress {
    FaultInject = 0,
    SlotConfig = 1,
    ClockConfig = 2,
}

impl SubAddress {
    pub fn decode(word: u16) -> Option<Self> {
        Self::from_u16(word)
    }
}

/// First flit of a slot-table command: `{slot:8, data:4, sel:4}`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SlotWord {
    pub slot: u8,
    pub data: u8,
    pub sel: u8,
}

impl SlotWord {
    pub fn encode(&self) -> u16 {
        ((self.slot as u16) << 8) | ((self.data as u16 & 0xf) << 4) | (self.sel as u16 & 0xf)
    }

    pub fn decode(word: u16) -> Self {
        Self {
            slot: word.sel(15, 8) as u8,
            data: word.sel(7, 4) as u8,
            sel: word.sel(3, 0) as u8,
        }
    }
}

/// Second flit of a slot-table command: `{ni_sel:1, link_en:1, node:14}`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TargetWord {
    pub ni_sel: bool,
    pub link_en: bool,
    pub node: u16,
}

impl TargetWord {
    pub const NODE_MASK: u16 = 0x3fff;

    pub fn encode(&self) -> u16 {
        ((self.ni_sel as u16) << 15) | ((self.link_en as u16) << 14) | (self.node & Self::NODE_MASK)
    }

    pub fn decode(word: u16) -> Self {
        Self {
            ni_sel: word.sel(15, 15) == 1,
            link_en: word.sel(14, 14) == 1,
            node: word.sel(13, 0) as u16,
        }
    }
}

/// Fault-injection command: `{node:8, link_mask:8}`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FaultWord {
    pub node: u8,
    pub mask: u8,
}

impl FaultWord {
    pub fn encode(&self) -> u16 {
        ((self.node as u16) << 8) | self.mask as u16
    }

    pub fn decode(word: u16) -> Self {
        Self {
            node: word.sel(15, 8) as u8,
            mask: word.sel(7, 0) as u8,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficClass {
    #[default]
    Tdm = 0,
    Be = 1,
}

/// Which half of a 32-bit utilization counter a report packet carries.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum CounterWord {
    #[default]
    Low = 0,
    High = 1,
}

impl CounterWord {
    pub fn extract(&self, value: u32) -> u16 {
        match self {
            CounterWord::Low => (value & 0xffff) as u16,
            CounterWord::High => (value >> 16) as u16,
        }
    }
}

pub const SUB_ID_FD: u16 = 0;
pub const SUB_ID_UTIL: u16 = 1;

/// The sub-module id flit that opens every report payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportId {
    Fault { start_node: u16 },
    Util { node: u16, word: CounterWord, class: TrafficClass },
}

impl ReportId {
    pub fn encode(&self) -> u16 {
        match *self {
            ReportId::Fault { start_node } => (start_node << 2) | SUB_ID_FD,
            ReportId::Util { node, word, class } => {
                (node << 5) | ((word as u16) << 4) | ((class as u16) << 2) | SUB_ID_UTIL
            }
        }
    }

    pub fn decode(word: u16) -> Option<Self> {
        match word.sel(1, 0) as u16 {
            SUB_ID_FD => Some(ReportId::Fault { start_node: word.sel(15, 2) as u16 }),
            SUB_ID_UTIL => Some(ReportId::Util {
                node: word.sel(15, 5) as u16,
                word: CounterWord::from_u32(word.sel(4, 4))?,
                class: TrafficClass::from_u32(word.sel(3, 2))?,
            }),
            _ => None,
        }
    }
}

/// Two node fault bitmaps per data word, the lower node index in the low byte.
pub fn pack_fault_pair(lo: u8, hi: u8) -> u16 {
    ((hi as u16) << 8) | lo as u16
}

pub fn unpack_fault_pair(word: u16) -> (u8, u8) {
    (word.sel(7, 0) as u8, word.sel(15, 8) as u8)
}

pub fn split_window(period: u32) -> (u16, u16) {
    ((period & 0xffff) as u16, (period >> 16) as u16)
}

pub fn join_window(low: u16, high: u16) -> u32 {
    ((high as u32) << 16) | low as u32
}

pub fn encode_dimensions(x: usize, y: usize) -> u16 {
    ((y as u16 & 0xff) << 8) | (x as u16 & 0xff)
}

pub fn decode_dimensions(word: u16) -> (usize, usize) {
    (word.sel(7, 0) as usize, word.sel(15, 8) as usize)
}
