//! Core of the locus application server herd: a small set of
//! statically configured members that share the freshest reported
//! location per client by flooding AT lines over a fixed neighbor
//! graph, and enrich stored positions with nearby places on demand.

pub mod config;
pub mod context;
pub mod flood;
pub mod handler;
pub mod links;
pub mod metrics;
pub mod node;
pub mod places;
pub mod proto;
pub mod store;
pub mod utils;

pub use context::Context;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error(transparent)]
    Node(#[from] node::Error),
    #[error(transparent)]
    Places(#[from] places::Error),
    #[error(transparent)]
    Proto(#[from] proto::Error),
}
