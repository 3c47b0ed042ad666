//! Application services layer.

pub mod context;
pub mod engagement;
pub mod error;
pub mod listing;
pub mod loader;
pub mod pagination;
pub mod repos;
pub mod series;
pub mod sinks;
pub mod trending;
