// lib.rs - Library surface of kickindex
//
// The `kickindex` binary in main.rs is a thin wrapper over `cli`; hosts
// embed `source_index::SourceIndexer` directly.

pub mod cli;
pub mod perf;
pub mod source_index;
pub mod tokenizer;
// test_utils is available in test builds and when the `test-support` feature is enabled.
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
