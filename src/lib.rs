pub mod base;
pub mod cdc;
pub mod error;
pub mod host;
pub mod mesh;
pub mod ncm;
pub mod packet;
pub mod sim;
pub mod ui;
