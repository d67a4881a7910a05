// src/node/mod.rs

//! Node Role Driver with its configuration, topology and in-process transport.

pub mod config;
pub mod driver;
pub mod network;
pub mod topology;

pub use config::NodeConfig;
pub use driver::{Initiator, NodeProgram, Responder, Session, run};
pub use network::LocalNetwork;
pub use topology::{Endpoint, Topology};
