//! Collective communication
//!
//! The all-reduce strategies, expressed as default methods of the `AllReduce` trait. Every
//! `Transport` gets them through a blanket implementation, so a backend only has to supply the
//! point to point primitives.
//!
//! All strategies share the same contract: on every rank `sendbuf` holds the local vector and
//! `recvbuf` receives the element-wise sum over all ranks. The buffers must have equal length
//! on every rank. Preconditions are checked before the first message is sent, and since they
//! only depend on values that agree across the group, either all ranks fail or none does.

use std::fmt;
use std::str::FromStr;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::point_to_point::Transport;
use crate::topology::{Communicator, ProcessGroup};

pub mod naive;
pub mod ring;
pub mod tree;

/// Collective communication traits
pub mod traits {
    pub use super::{AllReduce, ReferenceAllReduce};
}

/// Selects one of the all-reduce strategies.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Centralized: gather to an aggregator, sum, send back
    Naive,
    /// Scatter-reduce and all-gather around a ring
    Ring,
    /// Binomial tree reduce and broadcast
    Tree,
}

impl Algorithm {
    /// All strategies, in benchmark order
    pub const ALL: [Algorithm; 3] = [Algorithm::Naive, Algorithm::Ring, Algorithm::Tree];

    /// The strategy that actually runs when `self` is requested on `group`.
    ///
    /// `Tree` degrades to `Naive` on groups whose size is not a power of two.
    pub fn effective(self, group: &ProcessGroup) -> Algorithm {
        match self {
            Algorithm::Tree if !group.is_power_of_two() => Algorithm::Naive,
            other => other,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Algorithm::Naive => "naive",
            Algorithm::Ring => "ring",
            Algorithm::Tree => "tree",
        })
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "naive" => Ok(Algorithm::Naive),
            "ring" => Ok(Algorithm::Ring),
            "tree" => Ok(Algorithm::Tree),
            _ => Err(Error::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// All-reduce (sum) built from point to point messages
pub trait AllReduce: Transport {
    /// Centralized all-reduce.
    ///
    /// Every rank sends its vector to `config.master_rank`, which accumulates them and sends the
    /// sum back to every other rank.
    ///
    /// Fails with `InvalidRoot` if the aggregator is not a member of the group.
    fn naive_all_reduce_into(
        &self,
        config: &Config,
        sendbuf: &[f32],
        recvbuf: &mut [f32],
    ) -> Result<()> {
        naive::all_reduce_into(self, config, sendbuf, recvbuf)
    }

    /// Ring all-reduce.
    ///
    /// Fails with `IndivisibleBuffer` unless the vector length is a multiple of the group size.
    /// That error is fatal for the group: the caller is expected to abort.
    fn ring_all_reduce_into(
        &self,
        config: &Config,
        sendbuf: &[f32],
        recvbuf: &mut [f32],
    ) -> Result<()> {
        ring::all_reduce_into(self, config, sendbuf, recvbuf)
    }

    /// Tree all-reduce.
    ///
    /// Falls back to `naive_all_reduce_into` on groups whose size is not a power of two.
    fn tree_all_reduce_into(
        &self,
        config: &Config,
        sendbuf: &[f32],
        recvbuf: &mut [f32],
    ) -> Result<()> {
        tree::all_reduce_into(self, config, sendbuf, recvbuf)
    }

    /// Runs the strategy selected by `algorithm` and returns the strategy that actually ran.
    fn all_reduce_into(
        &self,
        algorithm: Algorithm,
        config: &Config,
        sendbuf: &[f32],
        recvbuf: &mut [f32],
    ) -> Result<Algorithm> {
        match algorithm {
            Algorithm::Naive => self.naive_all_reduce_into(config, sendbuf, recvbuf)?,
            Algorithm::Ring => self.ring_all_reduce_into(config, sendbuf, recvbuf)?,
            Algorithm::Tree => self.tree_all_reduce_into(config, sendbuf, recvbuf)?,
        }
        Ok(algorithm.effective(&self.group()))
    }
}

impl<T: Transport + ?Sized> AllReduce for T {}

/// The library-provided all-reduce a backend offers, used to validate the strategies
pub trait ReferenceAllReduce: Communicator {
    /// Element-wise sum of `sendbuf` over all ranks, stored into `recvbuf` on every rank.
    fn reference_all_reduce_into(&self, sendbuf: &[f32], recvbuf: &mut [f32]) -> Result<()>;
}

/// Adds `input` to `inout` element-wise.
///
/// Only the common prefix of the two slices is touched.
pub fn reduce_local_into(input: &[f32], inout: &mut [f32]) {
    for (acc, x) in inout.iter_mut().zip(input) {
        *acc += *x;
    }
}

/// Fails with `BufferLengthMismatch` unless both buffers have the same length.
pub(crate) fn check_buffers(sendbuf: &[f32], recvbuf: &[f32]) -> Result<()> {
    if sendbuf.len() != recvbuf.len() {
        return Err(Error::BufferLengthMismatch {
            send: sendbuf.len(),
            receive: recvbuf.len(),
        });
    }
    Ok(())
}
