//! Domain layer types and invariants.

pub mod entities;
pub mod error;
pub mod ranking;
pub mod scoring;
pub mod series;
pub mod types;
