use crate::packet::Flit;

/// Shared framing walk of the report builders: three header flits, the sub-module id, then
/// data words until the builder closes the packet.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Dest,
    Src,
    Flags,
    Id,
    Xfer,
}

/// Header words of one report packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportHeader {
    pub dest: u16,
    pub src: u16,
    pub flags: u16,
    pub id: u16,
}

impl Phase {
    /// Flit presented in a framing phase; `Idle` and `Xfer` are up to the builder.
    pub fn header_flit(self, header: &ReportHeader) -> Option<Flit> {
        let data = match self {
            Phase::Dest => header.dest,
            Phase::Src => header.src,
            Phase::Flags => header.flags,
            Phase::Id => header.id,
            Phase::Idle | Phase::Xfer => return None,
        };
        Some(Flit::body(data))
    }

    /// Phase after an accepted framing flit.
    pub fn advance(self) -> Self {
        match self {
            Phase::Dest => Phase::Src,
            Phase::Src => Phase::Flags,
            Phase::Flags => Phase::Id,
            Phase::Id => Phase::Xfer,
            other => other,
        }
    }

    pub fn busy(self) -> bool {
        self != Phase::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_walk() {
        let header = ReportHeader { dest: 1, src: 2, flags: 3, id: 4 };
        let mut phase = Phase::Dest;
        let mut words = Vec::new();
        while let Some(flit) = phase.header_flit(&header) {
            assert!(!flit.last);
            words.push(flit.data);
            phase = phase.advance();
        }
        assert_eq!(vec![1, 2, 3, 4], words);
        assert_eq!(Phase::Xfer, phase);
        assert_eq!(Phase::Idle, Phase::Idle.advance());
    }
}
