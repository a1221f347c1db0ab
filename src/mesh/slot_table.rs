use crate::sim::clock::Cycle;

/// Entry value of a slot nobody is granted.
pub const EMPTY_SLOT: u8 = 15;
/// Network-interface links per tile; the NI keeps one outgoing and one incoming table per link.
pub const NI_LINKS: usize = 2;
pub const ROUTER_TABLES: usize = 4 + NI_LINKS;
pub const NI_TABLES: usize = 2 * NI_LINKS;
pub const MAX_ENDPOINTS: usize = 16;

/// Circular table granting one input port per time slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTable {
    entries: Vec<u8>,
}

impl SlotTable {
    pub fn new(lut_size: usize) -> Self {
        assert!(lut_size.is_power_of_two(), "slot table size must be a power of two");
        Self { entries: vec![EMPTY_SLOT; lut_size] }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn index(&self, slot: usize) -> usize {
        slot & (self.entries.len() - 1)
    }

    /// Only the low `log2(len)` bits of the slot address reach the table.
    pub fn write(&mut self, slot: u8, value: u8) {
        let idx = self.index(slot as usize);
        self.entries[idx] = value & 0xf;
    }

    pub fn read(&self, slot: u8) -> u8 {
        self.entries[self.index(slot as usize)]
    }

    /// Grant of the slot that is active in NoC cycle `cycle`.
    pub fn active(&self, cycle: Cycle) -> u8 {
        self.entries[self.index(cycle as usize)]
    }

    pub fn clear(&mut self) {
        self.entries.fill(EMPTY_SLOT);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Router,
    Ni,
}

/// All slot tables and endpoint link enables of one node.
#[derive(Debug, Clone)]
pub struct NodeTables {
    pub router: Vec<SlotTable>,
    pub ni: Vec<SlotTable>,
    /// Per endpoint, bit `l` enables NI link `l` for that endpoint's out queue.
    pub link_enable: [u8; MAX_ENDPOINTS],
}

impl NodeTables {
    pub fn new(lut_size: usize) -> Self {
        Self {
            router: vec![SlotTable::new(lut_size); ROUTER_TABLES],
            ni: vec![SlotTable::new(lut_size); NI_TABLES],
            link_enable: [0; MAX_ENDPOINTS],
        }
    }

    pub fn table(&self, kind: TableKind, sel: u8) -> Option<&SlotTable> {
        match kind {
            TableKind::Router => self.router.get(sel as usize),
            TableKind::Ni => self.ni.get(sel as usize),
        }
    }

    pub fn table_mut(&mut self, kind: TableKind, sel: u8) -> Option<&mut SlotTable> {
        match kind {
            TableKind::Router => self.router.get_mut(sel as usize),
            TableKind::Ni => self.ni.get_mut(sel as usize),
        }
    }

    pub fn set_link_enable(&mut self, endpoint: u8, link: u8, enable: bool) {
        let Some(mask) = self.link_enable.get_mut(endpoint as usize) else {
            return;
        };
        let bit = 1u8.checked_shl(link as u32).unwrap_or(0);
        if enable {
            *mask |= bit;
        } else {
            *mask &= !bit;
        }
    }

    pub fn link_enabled(&self, endpoint: u8, link: u8) -> bool {
        self.link_enable
            .get(endpoint as usize)
            .is_some_and(|mask| (mask >> (link & 7)) & 1 == 1 && link < 8)
    }

    /// Any endpoint sends on NI link `link`.
    pub fn link_in_use(&self, link: u8) -> bool {
        link < 8 && self.link_enable.iter().any(|mask| (mask >> link) & 1 == 1)
    }

    pub fn clear(&mut self) {
        self.router.iter_mut().chain(self.ni.iter_mut()).for_each(SlotTable::clear);
        self.link_enable = [0; MAX_ENDPOINTS];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_wraps_with_the_noc_cycle() {
        let mut t = SlotTable::new(4);
        t.write(1, 3);
        assert_eq!(3, t.active(1));
        assert_eq!(3, t.active(5));
        assert_eq!(EMPTY_SLOT, t.active(2));
    }

    #[test]
    fn out_of_range_slot_aliases() {
        let mut t = SlotTable::new(8);
        t.write(9, 4);
        assert_eq!(4, t.read(1));
    }

    #[test]
    fn link_enable_bits() {
        let mut n = NodeTables::new(8);
        n.set_link_enable(1, 0, true);
        n.set_link_enable(1, 1, true);
        n.set_link_enable(1, 0, false);
        assert!(!n.link_enabled(1, 0));
        assert!(n.link_enabled(1, 1));
        assert!(n.link_in_use(1));
        assert!(!n.link_in_use(0));
        // nonexistent endpoints and links are absorbed
        n.set_link_enable(40, 0, true);
        n.set_link_enable(0, 12, true);
        assert!(!n.link_enabled(0, 12));
    }

    #[test]
    fn missing_tables() {
        let n = NodeTables::new(8);
        assert!(n.table(TableKind::Router, ROUTER_TABLES as u8).is_none());
        assert!(n.table(TableKind::Ni, 3).is_some());
        assert!(n.table(TableKind::Ni, 4).is_none());
    }
}
