//! Error types
//!
//! `Error` covers everything a strategy or a transport can fail with. `ConfigError` is kept
//! apart: configuration problems are diagnostics that never stop a run.

use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;

use thiserror::Error;

use crate::{Count, Rank};

/// Result type for all-reduce operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by strategies and transports
#[derive(Error, Debug)]
pub enum Error {
    /// A process group needs a positive size and a rank inside it
    #[error("invalid process group: rank {rank} of size {size}")]
    InvalidGroup {
        /// Rank of the calling process
        rank: Rank,
        /// Size of the group
        size: Rank,
    },

    /// A message was addressed to a rank outside the group
    #[error("rank {rank} is outside the process group of size {size}")]
    InvalidRank {
        /// The offending rank
        rank: Rank,
        /// Size of the group
        size: Rank,
    },

    /// The aggregator of the naive strategy is outside the group
    #[error("aggregator rank {root} is outside the process group of size {size}")]
    InvalidRoot {
        /// Configured aggregator rank
        root: Rank,
        /// Size of the group
        size: Rank,
    },

    /// Send and receive buffers must have the same length
    #[error("send buffer holds {send} elements but receive buffer holds {receive}")]
    BufferLengthMismatch {
        /// Length of the send buffer
        send: Count,
        /// Length of the receive buffer
        receive: Count,
    },

    /// Ring all-reduce needs a vector length divisible by the group size
    #[error("ring all-reduce requires data size ({len}) to be divisible by group size ({size})")]
    IndivisibleBuffer {
        /// Vector length
        len: Count,
        /// Size of the group
        size: Rank,
    },

    /// An incoming message did not match the length of the receive buffer
    #[error("expected a message of {expected} elements, received {received}")]
    Truncated {
        /// Length of the receive buffer
        expected: Count,
        /// Length of the incoming message
        received: Count,
    },

    /// The message passing library was initialized before
    #[error("message passing library has already been initialized")]
    AlreadyInitialized,

    /// Algorithm names are `naive`, `ring` and `tree`
    #[error("unknown algorithm `{0}`")]
    UnknownAlgorithm(String),
}

impl Error {
    /// Whether the whole process group has to be torn down after this error.
    ///
    /// Only a ring precondition violation qualifies: continuing on a subset of ranks would leave
    /// the survivors waiting on a ring that is never closed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::IndivisibleBuffer { .. })
    }
}

/// Diagnostics produced while loading a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read, defaults are used
    #[error("could not open {}, using defaults", path.display())]
    Unreadable {
        /// Path that was tried
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A numeric key carried a value that is not an integer
    #[error("invalid number format in config for key {key}: `{value}`")]
    InvalidNumber {
        /// The key
        key: String,
        /// The raw value
        value: String,
        /// Underlying parse error
        #[source]
        source: ParseIntError,
    },

    /// `NAIVE_RECEIVE_ORDER` must be `any` or `rank`
    #[error("invalid receive order in config: `{0}` (expected `any` or `rank`)")]
    InvalidReceiveOrder(String),
}
