use crate::error::PacketError;
use crate::packet::codec::{decode_flags, encode_flags, EventSubtype, PacketType};
use num_traits::FromPrimitive;
use std::fmt::{Display, Formatter};

/// dest, src, flags
pub const HEADER_FLITS: usize = 3;

/// One 16-bit word of a debug packet. A flit that exists is valid; `last` closes the packet.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flit {
    pub data: u16,
    pub last: bool,
}

impl Flit {
    pub fn new(data: u16, last: bool) -> Self {
        Self { data, last }
    }

    pub fn body(data: u16) -> Self {
        Self { data, last: false }
    }

    pub fn tail(data: u16) -> Self {
        Self { data, last: true }
    }
}

impl Display for Flit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}{}", self.data, if self.last { " (last)" } else { "" })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugPacket {
    pub dest: u16,
    pub src: u16,
    pub flags: u16,
    pub payload: Vec<u16>,
}

impl DebugPacket {
    pub fn new(dest: u16, src: u16, ty: PacketType, subtype: u8) -> Self {
        Self {
            dest,
            src,
            flags: encode_flags(ty, subtype),
            payload: Vec::new(),
        }
    }

    /// Event packet; `more` marks a non-final fragment of a multi-packet event.
    pub fn event(dest: u16, src: u16, more: bool) -> Self {
        let subtype = if more { EventSubtype::NotLast } else { EventSubtype::Last };
        Self::new(dest, src, PacketType::Event, subtype as u8)
    }

    pub fn with_payload(mut self, payload: impl IntoIterator<Item = u16>) -> Self {
        self.payload.extend(payload);
        self
    }

    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_u8(decode_flags(self.flags).0)
    }

    pub fn subtype(&self) -> u8 {
        decode_flags(self.flags).1
    }

    pub fn is_event(&self) -> bool {
        self.packet_type() == Some(PacketType::Event)
    }

    /// Event fragment that is continued by a following packet.
    pub fn has_continuation(&self) -> bool {
        self.is_event() && self.subtype() == EventSubtype::NotLast as u8
    }

    /// Number of flits on the wire.
    pub fn num_flits(&self) -> usize {
        HEADER_FLITS + self.payload.len()
    }

    pub fn to_flits(&self) -> Vec<Flit> {
        let words = [self.dest, self.src, self.flags]
            .into_iter()
            .chain(self.payload.iter().copied())
            .collect::<Vec<_>>();
        let n = words.len();
        words
            .into_iter()
            .enumerate()
            .map(|(i, data)| Flit::new(data, i + 1 == n))
            .collect()
    }

    pub fn from_words(words: &[u16]) -> Result<Self, PacketError> {
        if words.len() < HEADER_FLITS {
            return Err(PacketError::Truncated(words.len()));
        }
        Ok(Self {
            dest: words[0],
            src: words[1],
            flags: words[2],
            payload: words[HEADER_FLITS..].to_vec(),
        })
    }
}

impl Display for DebugPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DebugPacket {{ dest: {:#06x}, src: {:#06x}, flags: {:#06x}, payload: {:x?} }}",
            self.dest, self.src, self.flags, self.payload
        )
    }
}

/// Collects flits until `last` and yields the framed packet.
#[derive(Debug, Default)]
pub struct PacketAssembler {
    words: Vec<u16>,
}

impl PacketAssembler {
    pub fn push(&mut self, flit: Flit) -> Option<Result<DebugPacket, PacketError>> {
        self.words.push(flit.data);
        if !flit.last {
            return None;
        }
        let packet = DebugPacket::from_words(&self.words);
        self.words.clear();
        Some(packet)
    }

    pub fn in_progress(&self) -> bool {
        !self.words.is_empty()
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flits_mark_only_the_final_word() {
        let pkt = DebugPacket::event(0x0001, 0x0005, false).with_payload([7, 8]);
        let flits = pkt.to_flits();
        assert_eq!(5, flits.len());
        assert_eq!(vec![false, false, false, false, true], flits.iter().map(|f| f.last).collect::<Vec<_>>());
        assert_eq!(0x0001, flits[0].data);
        assert_eq!(8, flits[4].data);
    }

    #[test]
    fn assembler_rebuilds_packets_back_to_back() {
        let a = DebugPacket::event(1, 2, true).with_payload([3]);
        let b = DebugPacket::new(1, 2, PacketType::Reg, 0).with_payload([0x200]);
        let mut asm = PacketAssembler::default();
        let mut out = Vec::new();
        for flit in a.to_flits().into_iter().chain(b.to_flits()) {
            if let Some(pkt) = asm.push(flit) {
                out.push(pkt.unwrap());
            }
        }
        assert_eq!(vec![a.clone(), b], out);
        assert!(a.has_continuation());
        assert!(!asm.in_progress());
    }

    #[test]
    fn short_packet_is_rejected() {
        let mut asm = PacketAssembler::default();
        assert!(asm.push(Flit::body(1)).is_none());
        assert_eq!(Some(Err(PacketError::Truncated(2))), asm.push(Flit::tail(2)));
    }
}
