//! Interface definitions for the storage seams.
//!
//! This module defines the abstract `SinkAdapter` and `DedupStore` traits so
//! the pipeline never depends on a concrete storage technology.

mod dedup_store;
mod sink_adapter;

pub use dedup_store::DedupStore;
pub use sink_adapter::SinkAdapter;
