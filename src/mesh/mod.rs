pub mod classifier;
pub mod config;
pub mod fabric;
pub mod model;
pub mod slot_table;
pub mod topology;

pub use fabric::{ConfigSink, FaultSource, MeshFabric, UtilSample, UtilSource};
pub use model::MeshModel;
pub use topology::{NodeInfo, Topology};
