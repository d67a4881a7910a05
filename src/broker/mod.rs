// src/broker/mod.rs

//! Remote Reference Broker: the RPC-facing layer of a node.
//!
//! A [`Broker`] translates requests into operations on its bound
//! [`VirtualRegister`](crate::simulation::VirtualRegister), or forwards them to
//! the virtual node holding that register. A [`BrokerServer`] runs it as a
//! task, and a [`BrokerClient`] is how every other component reaches it.

mod client;
pub mod message;
mod server;
mod service;

pub use client::BrokerClient;
pub use message::{Envelope, Reply, Request, Trigger};
pub use server::{BrokerServer, REQUEST_QUEUE_DEPTH};
pub use service::Broker;
