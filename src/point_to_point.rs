//! Point to point communication
//!
//! The strategies in `collective` are written against the `Transport` trait only: a blocking
//! send, a blocking receive and a symmetric send-receive, all moving `f32` buffers between two
//! members of a `ProcessGroup`. Any backing implementation that honours the contract below can
//! carry an all-reduce.
//!
//! # Contract
//!
//! - Messages from one rank to another with the same tag arrive in the order they were sent.
//!   There is no ordering across different pairs of ranks.
//! - A receive blocks until a matching message is available. There is no timeout: a message that
//!   is never sent blocks the receiver forever.
//! - The incoming message must have exactly the length of the receive buffer.
//! - `send_receive_into_with_tag` must not deadlock when every rank of a cycle calls it at the
//!   same time.

use std::fmt;

use crate::error::Result;
use crate::topology::Communicator;
use crate::{Count, Rank, Tag};

/// Point to point communication traits
pub mod traits {
    pub use super::Transport;
}

/// Something that can be used as the source in a point to point receive operation
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Source {
    /// Receive only from the identified process.
    Process(Rank),
    /// Receive from whichever process has a matching message first.
    AnyProcess,
}

impl Source {
    /// Whether a message sent by `rank` matches this source
    pub fn matches(&self, rank: Rank) -> bool {
        match *self {
            Source::Process(source) => source == rank,
            Source::AnyProcess => true,
        }
    }
}

impl From<Rank> for Source {
    fn from(rank: Rank) -> Source {
        Source::Process(rank)
    }
}

/// Describes the result of a point to point receive operation.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Status {
    source_rank: Rank,
    tag: Tag,
    count: Count,
}

impl Status {
    /// Assembles a status from its parts.
    pub fn new(source_rank: Rank, tag: Tag, count: Count) -> Status {
        Status {
            source_rank,
            tag,
            count,
        }
    }

    /// The rank of the message source
    pub fn source_rank(&self) -> Rank {
        self.source_rank
    }

    /// The message tag
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Number of elements contained in the message
    pub fn count(&self) -> Count {
        self.count
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Status {{ source_rank: {}, tag: {}, count: {} }}",
            self.source_rank(),
            self.tag(),
            self.count()
        )
    }
}

/// Blocking point to point primitives between members of a process group
pub trait Transport: Communicator {
    /// Send the contents of `buf` to `destination` and tag it.
    ///
    /// May return before the message has been received.
    fn send_with_tag(&self, destination: Rank, buf: &[f32], tag: Tag) -> Result<()>;

    /// Receive a message tagged `tag` from `source` into `buf`.
    fn receive_into_with_tag(&self, source: Source, buf: &mut [f32], tag: Tag) -> Result<Status>;

    /// Sends the contents of `msg` to `destination` and simultaneously receives a message from
    /// `source` into `buf`, both tagged `tag`.
    fn send_receive_into_with_tag(
        &self,
        msg: &[f32],
        destination: Rank,
        buf: &mut [f32],
        source: Source,
        tag: Tag,
    ) -> Result<Status>;
}
