//! Frequent sequence mining with pattern expressions over item taxonomies.
//!
//! Inputs are sequences of dictionary items arranged in a hierarchy. A
//! pattern expression (see [`patex`]) selects and optionally generalizes
//! subsequences; the [`miner`] enumerates all expressed patterns whose
//! weighted support reaches a threshold.

pub mod dfa;
pub mod dictionary;
pub mod error;
pub mod fst;
pub mod miner;
pub mod ops;
pub mod patex;
pub mod posting;

pub use dictionary::Dictionary;
pub use error::{Error, Result};
pub use miner::{MemoryPatternSink, MinerConf, MiningStats, PatternSink, SequenceMiner};
