//! Tree all-reduce
//!
//! A binomial tree rooted at rank 0, walked twice:
//!
//! 1. **Reduce** (recursive doubling): for `step = 1, 2, 4, ...` every rank with
//!    `rank % (2 step) == step` sends its running sum to `rank - step` and drops out, while every
//!    rank with `rank % (2 step) == 0` adds what it receives from `rank + step`. Rank 0 ends up
//!    with the complete sum.
//! 2. **Broadcast** (recursive halving): the same pairs in reverse step order, with the sum now
//!    flowing from parent to child.
//!
//! Both phases take `log2 size` message rounds, which makes this the latency-optimal strategy.
//! Every round moves the full vector, so it loses to the ring on large vectors.
//!
//! A rank's part in any round is a pure function of `(rank, size, step)` (see `role`), so no
//! coordination beyond the messages themselves is needed.
//!
//! Only groups whose size is a power of two are handled; other groups fall back to the naive
//! strategy.

use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::collective::{check_buffers, naive, reduce_local_into};
use crate::config::Config;
use crate::error::Result;
use crate::point_to_point::{Source, Transport};
use crate::Rank;

/// Step sizes of one tree phase
pub type Steps = SmallVec<[Rank; 32]>;

/// What a rank does in one round of the tree
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    /// Combines with `child`, if that rank exists.
    Parent {
        /// `rank + step`, when inside the group
        child: Option<Rank>,
    },
    /// Exchanges with `parent`.
    Child {
        /// `rank - step`
        parent: Rank,
    },
    /// Sits this round out.
    Idle,
}

/// The role of `rank` in the round with step size `step`, in a group of `size`.
pub fn role(rank: Rank, size: Rank, step: Rank) -> Role {
    let offset = rank % step.saturating_mul(2);
    if offset == 0 {
        Role::Parent {
            child: rank.checked_add(step).filter(|&child| child < size),
        }
    } else if offset == step {
        Role::Child {
            parent: rank - step,
        }
    } else {
        Role::Idle
    }
}

/// Step sizes of the reduce phase: `1, 2, 4, ...` while below `size`
pub fn reduce_steps(size: Rank) -> Steps {
    let mut steps = Steps::new();
    let mut step: Rank = 1;
    while step < size {
        steps.push(step);
        match step.checked_mul(2) {
            Some(next) => step = next,
            None => break,
        }
    }
    steps
}

/// Step sizes of the broadcast phase: the reduce steps, largest first
pub fn broadcast_steps(size: Rank) -> Steps {
    let mut steps = reduce_steps(size);
    steps.reverse();
    steps
}

pub(crate) fn all_reduce_into<C>(
    comm: &C,
    config: &Config,
    sendbuf: &[f32],
    recvbuf: &mut [f32],
) -> Result<()>
where
    C: Transport + ?Sized,
{
    check_buffers(sendbuf, recvbuf)?;
    let group = comm.group();
    if !group.is_power_of_two() {
        if group.rank() == config.reporting_rank() {
            warn!(
                size = group.size(),
                "Tree algo requires Power-of-2 processes. Switching to Naive."
            );
        }
        return naive::all_reduce_into(comm, config, sendbuf, recvbuf);
    }

    recvbuf.copy_from_slice(sendbuf);
    let (rank, size) = (group.rank(), group.size());
    let tag = config.data_tag;
    let mut incoming = vec![0.0f32; sendbuf.len()];

    for step in reduce_steps(size) {
        match role(rank, size, step) {
            Role::Parent { child: Some(child) } => {
                trace!(step, child, "tree: reduce");
                comm.receive_into_with_tag(Source::Process(child), &mut incoming, tag)?;
                reduce_local_into(&incoming, recvbuf);
            }
            Role::Child { parent } => {
                trace!(step, parent, "tree: reduce");
                comm.send_with_tag(parent, recvbuf, tag)?;
                break;
            }
            Role::Parent { child: None } | Role::Idle => {}
        }
    }

    for step in broadcast_steps(size) {
        match role(rank, size, step) {
            Role::Parent { child: Some(child) } => {
                trace!(step, child, "tree: broadcast");
                comm.send_with_tag(child, recvbuf, tag)?;
            }
            Role::Child { parent } => {
                trace!(step, parent, "tree: broadcast");
                comm.receive_into_with_tag(Source::Process(parent), recvbuf, tag)?;
            }
            Role::Parent { child: None } | Role::Idle => {}
        }
    }

    Ok(())
}
