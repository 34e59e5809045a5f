//! Task state storage for berth.
//!
//! This crate provides a trait-based store for launched task descriptors and
//! their latest status reports, with in-memory and JSON-file implementations.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;
pub mod json_storage;

pub use trait_::{StateStore, StorageError, Result};
pub use memory::MemoryStateStore;
pub use json_storage::JsonStateStore;
