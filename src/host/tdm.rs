//! Host-side bookkeeping of TDM slot reservations: a mirror of every slot table, endpoint
//! ownership, and the paths and channels built from them.

use serde::Serialize;

use crate::host::path::is_valid_path;
use crate::mesh::slot_table::{EMPTY_SLOT, NI_LINKS, NI_TABLES, ROUTER_TABLES};
use crate::mesh::topology::MESH_LINKS;

/// One slot-table write of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableEntry {
    pub node: usize,
    pub ni: bool,
    pub port: u8,
    pub slot: usize,
    pub value: u8,
}

/// Router output port leading from `cur` to the neighbour `next`.
fn out_port(x_dim: usize, cur: usize, next: usize) -> u8 {
    if next + x_dim == cur {
        0
    } else if cur + 1 == next {
        1
    } else if cur + x_dim == next {
        2
    } else {
        3
    }
}

/// Input port of the next router for a flit that left through `out`.
fn in_port_after(out: u8) -> u8 {
    match out {
        2 => 0,
        3 => 1,
        0 => 2,
        _ => 3,
    }
}

/// Table writes reserving `path` for one start slot on NI link `link`: the source NI out
/// table, one router table per hop with the slot advancing by one per hop, and the destination
/// NI in table.
pub fn path_entries(
    x_dim: usize,
    lut_size: usize,
    path: &[usize],
    start_slot: usize,
    link: u8,
    ep_src: u8,
    ep_dest: u8,
) -> Vec<TableEntry> {
    let (Some(&first), Some(&last)) = (path.first(), path.last()) else {
        return Vec::new();
    };
    let mut entries = Vec::with_capacity(path.len() + 2);
    entries.push(TableEntry { node: first, ni: true, port: link, slot: start_slot, value: ep_src });
    let mut slot = start_slot;
    let mut in_port = link + MESH_LINKS;
    for (hop, &node) in path.iter().enumerate() {
        let out = match path.get(hop + 1) {
            Some(&next) => out_port(x_dim, node, next),
            None => link + MESH_LINKS,
        };
        entries.push(TableEntry { node, ni: false, port: out, slot, value: in_port });
        slot = (slot + 1) % lut_size;
        in_port = in_port_after(out);
    }
    entries.push(TableEntry { node: last, ni: true, port: link + NI_LINKS as u8, slot, value: ep_dest });
    entries
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reservation {
    value: u8,
    pid: Option<usize>,
}

const FREE: Reservation = Reservation { value: EMPTY_SLOT, pid: None };

#[derive(Debug, Clone)]
struct NodeMirror {
    router: [Vec<Reservation>; ROUTER_TABLES],
    ni: [Vec<Reservation>; NI_TABLES],
    /// Channel owning each endpoint, sending and receiving side.
    endpoints: Vec<[Option<usize>; 2]>,
}

impl NodeMirror {
    fn new(lut_size: usize, endpoints: usize) -> Self {
        Self {
            router: std::array::from_fn(|_| vec![FREE; lut_size]),
            ni: std::array::from_fn(|_| vec![FREE; lut_size]),
            endpoints: vec![[None; 2]; endpoints],
        }
    }

    fn entry(&self, ni: bool, port: u8, slot: usize) -> Option<&Reservation> {
        let tables: &[Vec<Reservation>] = if ni { &self.ni } else { &self.router };
        tables.get(port as usize)?.get(slot)
    }
}

/// Direction of an endpoint relative to its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointDir {
    Out = 0,
    In = 1,
}

/// Mirror of the slot tables the host has written, with the path owning each entry.
#[derive(Debug, Clone)]
pub struct TdmInfo {
    x_dim: usize,
    y_dim: usize,
    lut_size: usize,
    nodes: Vec<NodeMirror>,
}

impl TdmInfo {
    /// `endpoints[n]` is the number of TDM endpoints of node `n`.
    pub fn new(x_dim: usize, y_dim: usize, endpoints: &[usize], lut_size: usize) -> Self {
        assert_eq!(x_dim * y_dim, endpoints.len(), "one endpoint count per node");
        Self {
            x_dim,
            y_dim,
            lut_size,
            nodes: endpoints.iter().map(|&n| NodeMirror::new(lut_size, n)).collect(),
        }
    }

    pub fn x_dim(&self) -> usize {
        self.x_dim
    }

    pub fn y_dim(&self) -> usize {
        self.y_dim
    }

    pub fn lut_size(&self) -> usize {
        self.lut_size
    }

    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            *node = NodeMirror::new(self.lut_size, node.endpoints.len());
        }
    }

    pub fn set_table_entry(&mut self, entry: &TableEntry, pid: Option<usize>) {
        let Some(node) = self.nodes.get_mut(entry.node) else {
            return;
        };
        let tables: &mut [Vec<Reservation>] = if entry.ni { &mut node.ni } else { &mut node.router };
        if let Some(r) = tables.get_mut(entry.port as usize).and_then(|t| t.get_mut(entry.slot)) {
            *r = Reservation { value: entry.value, pid };
        }
    }

    /// Value mirrored for one table entry.
    pub fn table_entry(&self, node: usize, ni: bool, port: u8, slot: usize) -> Option<(u8, Option<usize>)> {
        self.nodes.get(node)?.entry(ni, port, slot).map(|r| (r.value, r.pid))
    }

    pub fn free_endpoint(&self, node: usize, dir: EndpointDir) -> Option<u8> {
        self.nodes
            .get(node)?
            .endpoints
            .iter()
            .position(|owners| owners[dir as usize].is_none())
            .map(|ep| ep as u8)
    }

    /// Claims the sending endpoint of `src` and the receiving endpoint of `dest` for `chid`.
    pub fn assign_endpoints(&mut self, src: usize, dest: usize, ep_src: u8, ep_dest: u8, chid: usize) -> bool {
        let out_free = self.endpoint_owner(src, ep_src, EndpointDir::Out) == Some(None);
        let in_free = self.endpoint_owner(dest, ep_dest, EndpointDir::In) == Some(None);
        if !(out_free && in_free) {
            return false;
        }
        self.nodes[src].endpoints[ep_src as usize][EndpointDir::Out as usize] = Some(chid);
        self.nodes[dest].endpoints[ep_dest as usize][EndpointDir::In as usize] = Some(chid);
        true
    }

    pub fn release_endpoints(&mut self, chid: usize) {
        self.nodes
            .iter_mut()
            .flat_map(|n| n.endpoints.iter_mut())
            .flat_map(|owners| owners.iter_mut())
            .filter(|owner| **owner == Some(chid))
            .for_each(|owner| *owner = None);
    }

    /// `None` when the endpoint does not exist.
    fn endpoint_owner(&self, node: usize, ep: u8, dir: EndpointDir) -> Option<Option<usize>> {
        self.nodes.get(node)?.endpoints.get(ep as usize).map(|o| o[dir as usize])
    }

    /// Every table entry the path needs for `start_slot` is unreserved.
    pub fn check_path(&self, path: &[usize], start_slot: usize, link: u8, ep_src: u8, ep_dest: u8) -> bool {
        let (Some(&first), Some(&last)) = (path.first(), path.last()) else {
            return false;
        };
        if !is_valid_path(self.x_dim, self.y_dim, path)
            || ep_src as usize >= self.nodes[first].endpoints.len()
            || ep_dest as usize >= self.nodes[last].endpoints.len()
            || link as usize >= NI_LINKS
            || start_slot >= self.lut_size
        {
            return false;
        }
        path_entries(self.x_dim, self.lut_size, path, start_slot, link, ep_src, ep_dest)
            .iter()
            .all(|e| self.nodes[e.node].entry(e.ni, e.port, e.slot).is_some_and(|r| r.value == EMPTY_SLOT))
    }

    /// The first `numslots` start slots with a free path, or nothing if there are fewer.
    pub fn free_slots(&self, path: &[usize], ep_src: u8, ep_dest: u8, link: u8, numslots: usize) -> Vec<usize> {
        let slots: Vec<usize> = (0..self.lut_size)
            .filter(|&slot| self.check_path(path, slot, link, ep_src, ep_dest))
            .take(numslots)
            .collect();
        if slots.len() == numslots {
            slots
        } else {
            Vec::new()
        }
    }
}

/// Reserved route between two endpoints; one of the two halves of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TdmPath {
    pub path: Vec<usize>,
    pub slots: Vec<usize>,
    pub link: u8,
    pub ep_src: u8,
    pub ep_dest: u8,
    pub channel: Option<usize>,
    pub path_idx: Option<usize>,
}

impl TdmPath {
    pub fn new(path: Vec<usize>, slots: Vec<usize>, link: u8, ep_src: u8, ep_dest: u8) -> Self {
        Self { path, slots, link, ep_src, ep_dest, channel: None, path_idx: None }
    }

    pub fn assign_channel(&mut self, chid: usize, path_idx: usize) {
        self.channel = Some(chid);
        self.path_idx = Some(path_idx);
    }

    fn hops(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.path.windows(2).map(|w| (w[0], w[1]))
    }

    /// Same endpoints and slot count, the other NI link, and no directed hop in common.
    pub fn valid_alternative_path(&self, other: &TdmPath) -> bool {
        if self.slots.len() != other.slots.len()
            || self.link == other.link
            || self.ep_src != other.ep_src
            || self.ep_dest != other.ep_dest
            || self.path.first() != other.path.first()
            || self.path.last() != other.path.last()
        {
            return false;
        }
        !self.hops().any(|hop| other.hops().any(|o| o == hop))
    }
}

/// Protected connection from `src` to `dest` over two disjoint paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TdmChannel {
    pub pids: [Option<usize>; 2],
    pub errors: [bool; 2],
    pub src: usize,
    pub dest: usize,
    pub ep_src: u8,
    pub ep_dest: u8,
    pub numslots: usize,
}

impl TdmChannel {
    pub fn new(src: usize, dest: usize, ep_src: u8, ep_dest: u8, numslots: usize) -> Self {
        Self { pids: [None; 2], errors: [false; 2], src, dest, ep_src, ep_dest, numslots }
    }

    fn matches(&self, path: &TdmPath) -> bool {
        path.path.first() == Some(&self.src)
            && path.path.last() == Some(&self.dest)
            && path.ep_src == self.ep_src
            && path.ep_dest == self.ep_dest
            && path.slots.len() == self.numslots
    }

    /// Index the path was stored under: the one it was assigned, or else the first free one.
    /// `None` if it does not fit or that index is taken.
    pub fn add_path(&mut self, path: &TdmPath, pid: usize) -> Option<usize> {
        if !self.matches(path) {
            return None;
        }
        let idx = path.path_idx.or_else(|| self.free_path_idx())?;
        if self.pids.get(idx)?.is_some() {
            return None;
        }
        self.pids[idx] = Some(pid);
        self.errors[idx] = false;
        Some(idx)
    }

    pub fn clear_path(&mut self, idx: usize) -> Option<usize> {
        let pid = self.pids.get_mut(idx)?.take();
        self.errors[idx] = false;
        pid
    }

    pub fn free_path_idx(&self) -> Option<usize> {
        self.pids.iter().position(Option::is_none)
    }

    pub fn set_error(&mut self, idx: usize, error: bool) {
        if let Some(e) = self.errors.get_mut(idx) {
            *e = error;
        }
    }

    /// `other` runs the opposite way over the same endpoints.
    pub fn valid_return_channel(&self, other: &TdmChannel) -> bool {
        other.src == self.dest
            && other.dest == self.src
            && other.ep_src == self.ep_dest
            && other.ep_dest == self.ep_src
    }
}
