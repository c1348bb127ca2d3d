//! Shared helpers for tests and hosts that embed the index in their own test suites.

pub mod memory_fs;

pub use memory_fs::MemoryFileSystem;
