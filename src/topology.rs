//! Organizing processes as groups
//!
//! Every participant of an all-reduce belongs to a fixed-size process group and is addressed by
//! its `Rank` within that group. The group is established once, before any collective is called,
//! and never changes afterwards.

use conv::ConvUtil;

use crate::error::{Error, Result};
use crate::Rank;

/// Topology traits
pub mod traits {
    pub use super::Communicator;
}

/// The calling process' view of its process group
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProcessGroup {
    rank: Rank,
    size: Rank,
}

impl ProcessGroup {
    /// Describes process `rank` of a group with `size` members.
    ///
    /// Fails unless `size > 0` and `0 <= rank < size`.
    pub fn new(rank: Rank, size: Rank) -> Result<ProcessGroup> {
        if size < 1 || rank < 0 || rank >= size {
            return Err(Error::InvalidGroup { rank, size });
        }
        Ok(ProcessGroup { rank, size })
    }

    /// The `Rank` that identifies the calling process
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Number of processes in the group
    pub fn size(&self) -> Rank {
        self.size
    }

    /// The calling process' rank, as an index
    pub fn index(&self) -> usize {
        // rank is non-negative by construction
        self.rank.value_as::<usize>().unwrap_or(0)
    }

    /// Number of processes in the group, as an index bound
    pub fn len(&self) -> usize {
        self.size.value_as::<usize>().unwrap_or(0)
    }

    /// A group always holds at least the calling process.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `rank` addresses a member of this group
    pub fn contains(&self, rank: Rank) -> bool {
        (0..self.size).contains(&rank)
    }

    /// Fails with `InvalidRank` unless `rank` is a member of this group.
    pub fn check_rank(&self, rank: Rank) -> Result<()> {
        if self.contains(rank) {
            Ok(())
        } else {
            Err(Error::InvalidRank {
                rank,
                size: self.size,
            })
        }
    }

    /// Predecessor on the logical ring, `(rank - 1 + size) % size`
    pub fn left(&self) -> Rank {
        if self.rank == 0 {
            self.size - 1
        } else {
            self.rank - 1
        }
    }

    /// Successor on the logical ring, `(rank + 1) % size`
    pub fn right(&self) -> Rank {
        (self.rank + 1) % self.size
    }

    /// Whether the group size is a power of two
    pub fn is_power_of_two(&self) -> bool {
        self.size & (self.size - 1) == 0
    }
}

/// Communicators are contexts for communication
///
/// A `Communicator` knows the calling process' place in its group and offers the two
/// group-wide operations that are not point-to-point: barrier synchronization and abort.
pub trait Communicator {
    /// The calling process' view of the group
    fn group(&self) -> ProcessGroup;

    /// The `Rank` that identifies the calling process within this communicator
    fn rank(&self) -> Rank {
        self.group().rank()
    }

    /// Number of processes in this communicator
    fn size(&self) -> Rank {
        self.group().size()
    }

    /// Barrier synchronization among all processes in the communicator
    ///
    /// Blocks until every process of the group has entered the barrier.
    fn barrier(&self) -> Result<()>;

    /// Abort program execution
    ///
    /// Terminates every process of the group with exit status `errorcode`.
    fn abort(&self, errorcode: i32) -> !;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ranks_outside_the_group() {
        assert!(ProcessGroup::new(0, 0).is_err());
        assert!(ProcessGroup::new(-1, 4).is_err());
        assert!(ProcessGroup::new(4, 4).is_err());
        assert!(ProcessGroup::new(3, 4).is_ok());
    }

    #[test]
    fn ring_neighbours_wrap_around() {
        let first = ProcessGroup::new(0, 3).unwrap();
        assert_eq!(first.left(), 2);
        assert_eq!(first.right(), 1);

        let last = ProcessGroup::new(2, 3).unwrap();
        assert_eq!(last.left(), 1);
        assert_eq!(last.right(), 0);

        let alone = ProcessGroup::new(0, 1).unwrap();
        assert_eq!(alone.left(), 0);
        assert_eq!(alone.right(), 0);
    }

    #[test]
    fn power_of_two_sizes() {
        let pow2: Vec<Rank> = (1..=16)
            .filter(|&size| ProcessGroup::new(0, size).unwrap().is_power_of_two())
            .collect();
        assert_eq!(pow2, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn check_rank_reports_group_size() {
        let group = ProcessGroup::new(1, 4).unwrap();
        match group.check_rank(9) {
            Err(Error::InvalidRank { rank: 9, size: 4 }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
