//! Ring all-reduce
//!
//! Ranks form a logical ring, each talking only to its `left` and `right` neighbour. The vector
//! is cut into `size` equal chunks and the reduction runs in two phases of `size - 1` rounds:
//!
//! 1. **Scatter-reduce**: every round each rank passes one chunk to the right and adds the chunk
//!    coming from the left into its own copy. Afterwards rank `r` owns the complete sum of chunk
//!    `(r + 1) % size`.
//! 2. **All-gather**: the finished chunks travel once more around the ring, this time overwriting
//!    instead of accumulating, until every rank holds every chunk.
//!
//! Each rank sends and receives `2 (size - 1) / size` times the vector length in total, which
//! makes this the bandwidth-optimal strategy for large vectors.
//!
//! Every round is a symmetric `send_receive_into_with_tag`; a plain send followed by a receive
//! would deadlock around the cycle.

use std::ops::Range;

use tracing::trace;

use crate::collective::{check_buffers, reduce_local_into};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::point_to_point::{Source, Transport};

/// Chunk indices `(send, receive)` of scatter-reduce round `round` on rank `rank`
///
/// The chunk sent is `(rank - round) mod size`, the chunk received `(rank - round - 1) mod size`.
pub fn scatter_reduce_chunks(rank: usize, size: usize, round: usize) -> (usize, usize) {
    let round = round % size;
    (
        (rank + size - round) % size,
        (rank + 2 * size - round - 1) % size,
    )
}

/// Chunk indices `(send, receive)` of all-gather round `round` on rank `rank`
///
/// The chunk sent is `(rank - round + 1) mod size`, the chunk received `(rank - round) mod size`.
pub fn all_gather_chunks(rank: usize, size: usize, round: usize) -> (usize, usize) {
    let round = round % size;
    ((rank + size + 1 - round) % size, (rank + size - round) % size)
}

fn chunk(index: usize, chunk_len: usize) -> Range<usize> {
    index * chunk_len..(index + 1) * chunk_len
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
    let size = group.len();
    if sendbuf.len() % size != 0 {
        return Err(Error::IndivisibleBuffer {
            len: sendbuf.len(),
            size: group.size(),
        });
    }

    recvbuf.copy_from_slice(sendbuf);
    let rank = group.index();
    let chunk_len = sendbuf.len() / size;
    let left = Source::Process(group.left());
    let right = group.right();
    let tag = config.data_tag;
    let mut incoming = vec![0.0f32; chunk_len];

    for round in 0..size - 1 {
        let (send, receive) = scatter_reduce_chunks(rank, size, round);
        trace!(round, send, receive, "ring: scatter-reduce");
        comm.send_receive_into_with_tag(
            &recvbuf[chunk(send, chunk_len)],
            right,
            &mut incoming,
            left,
            tag,
        )?;
        reduce_local_into(&incoming, &mut recvbuf[chunk(receive, chunk_len)]);
    }

    for round in 0..size - 1 {
        let (send, receive) = all_gather_chunks(rank, size, round);
        trace!(round, send, receive, "ring: all-gather");
        comm.send_receive_into_with_tag(
            &recvbuf[chunk(send, chunk_len)],
            right,
            &mut incoming,
            left,
            tag,
        )?;
        recvbuf[chunk(receive, chunk_len)].copy_from_slice(&incoming);
    }

    Ok(())
}
