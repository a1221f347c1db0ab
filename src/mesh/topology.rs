use crate::error::ConfigError;
use crate::mesh::config::MeshConfig;
use smallvec::SmallVec;

/// Nodes per mesh that the single-word fault report layout can address.
pub const MAX_NODES: usize = 18;
pub const MAX_LINKS: usize = 8;
pub const MESH_LINKS: u8 = 4;
pub const MAX_LOCAL_LINKS: usize = 4;

pub const NORTH: u8 = 0;
pub const EAST: u8 = 1;
pub const SOUTH: u8 = 2;
pub const WEST: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileKind {
    /// Low-criticality compute tile
    Lct,
    /// High-criticality compute tile
    Hct,
    Io,
}

/// Tile placement used by the demonstrator boards; other mesh sizes are all low-criticality.
fn tile_kind(x_dim: usize, y_dim: usize, node: usize) -> TileKind {
    use TileKind::*;
    let map: &[TileKind] = match (x_dim, y_dim) {
        (2, 2) => &[Lct, Hct, Io, Lct],
        (3, 3) => &[Lct, Hct, Hct, Io, Lct, Lct, Lct, Hct, Lct],
        (4, 4) => &[
            Hct, Lct, Hct, Lct, Lct, Hct, Lct, Hct, Io, Lct, Hct, Lct, Lct, Hct, Lct, Lct,
        ],
        _ => &[],
    };
    map.get(node).copied().unwrap_or(Lct)
}

#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: usize,
    pub x: usize,
    pub y: usize,
    pub kind: TileKind,
    /// Link indices with a counterpart, ascending.
    pub active_links: SmallVec<[u8; MAX_LINKS]>,
}

impl NodeInfo {
    pub fn num_active_links(&self) -> usize {
        self.active_links.len()
    }

    pub fn has_link(&self, link: u8) -> bool {
        self.active_links.contains(&link)
    }
}

/// Runtime node descriptors of an `x * y` mesh, computed once from the dimensions.
#[derive(Debug, Clone)]
pub struct Topology {
    x_dim: usize,
    y_dim: usize,
    lut_size: usize,
    nodes: Vec<NodeInfo>,
}

impl Topology {
    pub fn new(config: &MeshConfig) -> Result<Self, ConfigError> {
        if config.x == 0 || config.x > 255 {
            return Err(ConfigError::BadDimension { axis: 'x', value: config.x });
        }
        if config.y == 0 || config.y > 255 {
            return Err(ConfigError::BadDimension { axis: 'y', value: config.y });
        }
        let num_nodes = config.x * config.y;
        if num_nodes > MAX_NODES {
            return Err(ConfigError::TooManyNodes { nodes: num_nodes, max: MAX_NODES });
        }
        if !config.lut_size.is_power_of_two() || config.lut_size > 256 {
            return Err(ConfigError::BadLutSize(config.lut_size));
        }
        if config.local_links > MAX_LOCAL_LINKS {
            return Err(ConfigError::TooManyLocalLinks(config.local_links));
        }

        let nodes = (0..num_nodes)
            .map(|id| {
                let (x, y) = (id % config.x, id / config.x);
                let mut active_links = SmallVec::new();
                if y != 0 {
                    active_links.push(NORTH);
                }
                if x != config.x - 1 {
                    active_links.push(EAST);
                }
                if y != config.y - 1 {
                    active_links.push(SOUTH);
                }
                if x != 0 {
                    active_links.push(WEST);
                }
                active_links.extend((0..config.local_links as u8).map(|l| MESH_LINKS + l));
                NodeInfo { id, x, y, kind: tile_kind(config.x, config.y, id), active_links }
            })
            .collect();

        Ok(Self {
            x_dim: config.x,
            y_dim: config.y,
            lut_size: config.lut_size,
            nodes,
        })
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

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    pub fn node(&self, id: usize) -> &NodeInfo {
        &self.nodes[id]
    }

    /// Neighbour across a mesh link, `None` for local links and mesh edges.
    pub fn neighbor(&self, node: usize, link: u8) -> Option<usize> {
        let info = self.nodes.get(node)?;
        if link >= MESH_LINKS || !info.has_link(link) {
            return None;
        }
        Some(match link {
            NORTH => node - self.x_dim,
            EAST => node + 1,
            SOUTH => node + self.x_dim,
            _ => node - 1,
        })
    }

    /// Largest active link count of any node.
    pub fn max_active_links(&self) -> usize {
        self.nodes.iter().map(NodeInfo::num_active_links).max().unwrap_or(0)
    }
}
