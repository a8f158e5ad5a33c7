#![deny(missing_docs)]
#![warn(missing_copy_implementations)]
#![warn(trivial_casts)]
#![warn(trivial_numeric_casts)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_qualifications)]

//! All-reduce over point-to-point message passing
//!
//! An all-reduce takes one vector per participant of a fixed-size process group and leaves the
//! element-wise sum of all vectors at every participant. This crate builds it from nothing but
//! blocking point-to-point primitives, in three flavours:
//!
//! - **Naive**: every rank ships its vector to one aggregator, which sums and sends the result
//!   back. `O(size)` sequential messages of full length at the aggregator.
//! - **Ring**: scatter-reduce followed by all-gather around a logical ring. Every rank moves
//!   about `2 (size - 1) / size` vectors worth of data, independent of the group size.
//! - **Tree**: recursive doubling reduce to rank 0 followed by recursive halving broadcast.
//!   `O(log2 size)` message rounds each way.
//!
//! The strategies only depend on the `Transport` trait, which can be backed by the in-process
//! `local` fabric (one thread per rank) or, with the `mpi` feature, by a real MPI library.
//!
//! # Usage
//!
//! ```no_run
//! use allreduce::traits::*;
//! use allreduce::{local, Config};
//!
//! let config = Config::default();
//! let sums = local::run(4, |comm| {
//!     let input = vec![1.0f32; 8];
//!     let mut output = vec![0.0f32; 8];
//!     comm.ring_all_reduce_into(&config, &input, &mut output).map(|_| output)
//! })
//! .unwrap();
//!
//! for sum in sums {
//!     assert_eq!(sum.unwrap(), vec![4.0f32; 8]);
//! }
//! ```
//!
//! # Features
//!
//! - `mpi`: enables `system::MpiWorld`, a transport over `MPI_COMM_WORLD`.

pub mod bench;
pub mod collective;
pub mod config;
pub mod error;
pub mod local;
pub mod point_to_point;
#[cfg(feature = "mpi")]
pub mod system;
pub mod topology;

pub use crate::collective::Algorithm;
pub use crate::config::{Config, ReceiveOrder};
pub use crate::error::{ConfigError, Error, Result};
pub use crate::topology::ProcessGroup;

/// Identifies a process within a process group.
pub type Rank = i32;
/// Can be used to tag messages on the sender side and match on the receiver side.
pub type Tag = i32;
/// Encodes number of values in multi-value messages.
pub type Count = usize;

/// Re-exports all traits.
pub mod traits {
    pub use crate::collective::traits::*;
    pub use crate::point_to_point::traits::*;
    pub use crate::topology::traits::*;
}
