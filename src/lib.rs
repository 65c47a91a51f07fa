//! A RESP2/RESP3 client core for Redis/Valkey-compatible servers: the wire codec, a single
//! connection's state machine (pipelining, transactions, subscriptions, reconnection), and a
//! pool-fronted client that can target one connection, a primary/replica pair, or a cluster.

pub mod cluster;
pub mod commands;
pub mod constant;
pub mod error;
mod opts;
pub mod protocol;
pub mod replication;
pub mod value;

#[cfg(feature = "tokio")]
pub mod tokio;

#[cfg(feature = "tokio")]
pub mod client;

pub use opts::Opts;
pub use value::Value;

#[cfg(feature = "tokio")]
pub use client::Client;
