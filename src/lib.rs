//! Content ordering and ranking engine: series membership, keyset post
//! listing and the trending score ledger.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
