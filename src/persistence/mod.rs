//! Persistence layer
//!
//! Durable storage for the quads of a [`Dataset`](crate::rdf::Dataset). Committed transaction
//! deltas are written as one RocksDB write batch and replayed in insertion order on open.

pub mod storage;

pub use storage::{QuadChange, QuadStorage, StorageError, StorageResult};
