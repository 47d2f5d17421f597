//! Storage abstraction and implementations for labflow.
//!
//! This crate provides a trait-based storage interface for execution
//! contexts with an in-memory and a file system implementation.

#![warn(missing_docs)]

pub mod trait_;
pub mod records;
pub mod memory;
pub mod file_storage;

pub use trait_::{StorageService, StorageError, Result};
pub use records::{retrieve_json, store_json};
pub use memory::MemoryStorage;
pub use file_storage::FileStorage;
