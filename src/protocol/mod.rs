// src/protocol/mod.rs

//! Register Merge Protocol and the verdict it ends in.

mod merge;
mod verdict;

pub use merge::{MergeFailure, MergeOutcome, MergeProtocol, MergeStep};
pub use verdict::Verdict;
