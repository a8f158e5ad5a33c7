//! In-process transport
//!
//! A `LocalFabric` simulates a process group inside one process: every rank is a thread with its
//! own mailbox, and a message is a copy of the sender's buffer pushed into the receiver's
//! mailbox. Sends never block, so the symmetric send-receive cannot deadlock around a ring.
//!
//! # Examples
//!
//! ```
//! use allreduce::traits::*;
//! use allreduce::local;
//!
//! let ranks = local::run(3, |comm| comm.rank()).unwrap();
//! assert_eq!(ranks, vec![0, 1, 2]);
//! ```
//!
//! A rank that panics inside `run` has its panic re-raised once all ranks have finished. Ranks
//! that wait on a message from a panicked rank wait forever, so keep assertions outside the
//! per-rank closure.

use std::collections::VecDeque;
use std::panic;
use std::process;
use std::sync::{Arc, Barrier};
use std::thread;

use conv::ConvUtil;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::collective::{check_buffers, reduce_local_into, ReferenceAllReduce};
use crate::error::{Error, Result};
use crate::point_to_point::{Source, Status, Transport};
use crate::topology::{Communicator, ProcessGroup};
use crate::{Rank, Tag};

struct Envelope {
    source: Rank,
    tag: Tag,
    payload: Vec<f32>,
}

#[derive(Default)]
struct Mailbox {
    queue: Mutex<VecDeque<Envelope>>,
    arrived: Condvar,
}

impl Mailbox {
    fn deliver(&self, envelope: Envelope) {
        self.queue.lock().push_back(envelope);
        self.arrived.notify_all();
    }

    /// Removes the oldest envelope matching `source` and `tag`, waiting for one if necessary.
    fn take(&self, source: Source, tag: Tag) -> Envelope {
        let mut queue = self.queue.lock();
        loop {
            let position = queue
                .iter()
                .position(|envelope| envelope.tag == tag && source.matches(envelope.source));
            if let Some(envelope) = position.and_then(|position| queue.remove(position)) {
                return envelope;
            }
            self.arrived.wait(&mut queue);
        }
    }

    fn len(&self) -> usize {
        self.queue.lock().len()
    }
}

/// Shared state of an in-process group: one mailbox per rank plus a barrier
pub struct LocalFabric {
    size: Rank,
    mailboxes: Vec<Mailbox>,
    barrier: Barrier,
    reference: Mutex<Vec<f32>>,
}

impl LocalFabric {
    /// Creates the fabric for a group of `size` ranks.
    pub fn new(size: Rank) -> Result<Arc<LocalFabric>> {
        let group = ProcessGroup::new(0, size)?;
        Ok(Arc::new(LocalFabric {
            size,
            mailboxes: (0..group.len()).map(|_| Mailbox::default()).collect(),
            barrier: Barrier::new(group.len()),
            reference: Mutex::new(Vec::new()),
        }))
    }

    /// Number of ranks
    pub fn size(&self) -> Rank {
        self.size
    }

    /// The communicator of rank `rank`.
    ///
    /// Every rank must be driven by its own thread, or barriers and receives will never complete.
    pub fn communicator(self: &Arc<Self>, rank: Rank) -> Result<LocalCommunicator> {
        Ok(LocalCommunicator {
            group: ProcessGroup::new(rank, self.size)?,
            fabric: Arc::clone(self),
        })
    }

    /// Number of messages that were sent but not yet received
    pub fn undelivered(&self) -> usize {
        self.mailboxes.iter().map(Mailbox::len).sum()
    }

    /// Runs `f` once per rank, each on its own thread, and collects the results in rank order.
    pub fn run<F, R>(self: &Arc<Self>, f: F) -> Result<Vec<R>>
    where
        F: Fn(LocalCommunicator) -> R + Sync,
        R: Send,
    {
        let comms = (0..self.size)
            .map(|rank| self.communicator(rank))
            .collect::<Result<Vec<_>>>()?;

        let f = &f;
        let results = thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| scope.spawn(move || f(comm)))
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(payload) => panic::resume_unwind(payload),
                })
                .collect()
        });
        Ok(results)
    }

    fn mailbox(&self, rank: Rank) -> Result<&Mailbox> {
        rank.value_as::<usize>()
            .ok()
            .and_then(|index| self.mailboxes.get(index))
            .ok_or(Error::InvalidRank {
                rank,
                size: self.size,
            })
    }
}

/// Runs `f` on a fresh group of `size` ranks.
///
/// See `LocalFabric::run`.
pub fn run<F, R>(size: Rank, f: F) -> Result<Vec<R>>
where
    F: Fn(LocalCommunicator) -> R + Sync,
    R: Send,
{
    LocalFabric::new(size)?.run(f)
}

/// One rank's handle to a `LocalFabric`
pub struct LocalCommunicator {
    group: ProcessGroup,
    fabric: Arc<LocalFabric>,
}

impl LocalCommunicator {
    /// The fabric this communicator belongs to
    pub fn fabric(&self) -> &Arc<LocalFabric> {
        &self.fabric
    }
}

impl Communicator for LocalCommunicator {
    fn group(&self) -> ProcessGroup {
        self.group
    }

    fn barrier(&self) -> Result<()> {
        self.fabric.barrier.wait();
        Ok(())
    }

    fn abort(&self, errorcode: i32) -> ! {
        // every rank lives in this process
        process::exit(errorcode)
    }
}

impl Transport for LocalCommunicator {
    fn send_with_tag(&self, destination: Rank, buf: &[f32], tag: Tag) -> Result<()> {
        let mailbox = self.fabric.mailbox(destination)?;
        trace!(
            source = self.group.rank(),
            destination,
            tag,
            count = buf.len(),
            "send"
        );
        mailbox.deliver(Envelope {
            source: self.group.rank(),
            tag,
            payload: buf.to_vec(),
        });
        Ok(())
    }

    fn receive_into_with_tag(&self, source: Source, buf: &mut [f32], tag: Tag) -> Result<Status> {
        if let Source::Process(rank) = source {
            self.group.check_rank(rank)?;
        }
        let envelope = self.fabric.mailbox(self.group.rank())?.take(source, tag);
        if envelope.payload.len() != buf.len() {
            return Err(Error::Truncated {
                expected: buf.len(),
                received: envelope.payload.len(),
            });
        }
        buf.copy_from_slice(&envelope.payload);
        Ok(Status::new(envelope.source, envelope.tag, envelope.payload.len()))
    }

    fn send_receive_into_with_tag(
        &self,
        msg: &[f32],
        destination: Rank,
        buf: &mut [f32],
        source: Source,
        tag: Tag,
    ) -> Result<Status> {
        self.send_with_tag(destination, msg, tag)?;
        self.receive_into_with_tag(source, buf, tag)
    }
}

impl ReferenceAllReduce for LocalCommunicator {
    /// Sums through a shared accumulator, one rank at a time under a lock.
    fn reference_all_reduce_into(&self, sendbuf: &[f32], recvbuf: &mut [f32]) -> Result<()> {
        check_buffers(sendbuf, recvbuf)?;

        self.barrier()?;
        if self.group.rank() == 0 {
            let mut acc = self.fabric.reference.lock();
            acc.clear();
            acc.resize(sendbuf.len(), 0.0);
        }
        self.barrier()?;
        reduce_local_into(sendbuf, &mut self.fabric.reference.lock());
        self.barrier()?;
        recvbuf.copy_from_slice(&self.fabric.reference.lock());
        self.barrier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_between_a_pair_arrive_in_order() {
        let received = run(2, |comm| {
            if comm.rank() == 0 {
                for value in 0..5 {
                    comm.send_with_tag(1, &[value as f32], 7).unwrap();
                }
                Vec::new()
            } else {
                let mut buf = [0.0f32];
                (0..5)
                    .map(|_| {
                        comm.receive_into_with_tag(Source::Process(0), &mut buf, 7)
                            .unwrap();
                        buf[0]
                    })
                    .collect()
            }
        })
        .unwrap();
        assert_eq!(received[1], vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn receive_matches_on_tag() {
        let received = run(2, |comm| {
            if comm.rank() == 0 {
                comm.send_with_tag(1, &[1.0], 1).unwrap();
                comm.send_with_tag(1, &[2.0], 2).unwrap();
                None
            } else {
                let mut buf = [0.0f32];
                let status = comm
                    .receive_into_with_tag(Source::AnyProcess, &mut buf, 2)
                    .unwrap();
                let second = buf[0];
                comm.receive_into_with_tag(Source::AnyProcess, &mut buf, 1)
                    .unwrap();
                Some((status.tag(), status.source_rank(), second, buf[0]))
            }
        })
        .unwrap();
        assert_eq!(received[1], Some((2, 0, 2.0, 1.0)));
    }

    #[test]
    fn length_mismatch_is_truncation() {
        let results = run(2, |comm| {
            if comm.rank() == 0 {
                comm.send_with_tag(1, &[1.0, 2.0, 3.0], 1).map(|_| ())
            } else {
                let mut buf = [0.0f32; 2];
                comm.receive_into_with_tag(Source::Process(0), &mut buf, 1)
                    .map(|_| ())
            }
        })
        .unwrap();
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(Error::Truncated {
                expected: 2,
                received: 3
            })
        ));
    }

    #[test]
    fn sending_outside_the_group_fails() {
        let results = run(1, |comm| comm.send_with_tag(3, &[1.0], 1)).unwrap();
        assert!(matches!(results[0], Err(Error::InvalidRank { rank: 3, size: 1 })));
    }

    #[test]
    fn reference_sum() {
        let fabric = LocalFabric::new(4).unwrap();
        let sums = fabric
            .run(|comm| {
                let input = vec![comm.rank() as f32; 3];
                let mut output = vec![0.0f32; 3];
                comm.reference_all_reduce_into(&input, &mut output)
                    .map(|_| output)
            })
            .unwrap();
        for sum in sums {
            assert_eq!(sum.unwrap(), vec![6.0, 6.0, 6.0]);
        }
        assert_eq!(fabric.undelivered(), 0);
    }

    #[test]
    fn empty_group_is_rejected() {
        assert!(matches!(
            LocalFabric::new(0),
            Err(Error::InvalidGroup { rank: 0, size: 0 })
        ));
    }
}
