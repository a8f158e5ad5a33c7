//! Centralized all-reduce
//!
//! One rank, the aggregator, collects every other rank's vector, sums them into its own copy and
//! sends the finished sum back to each of them in turn. The aggregator handles `size - 1`
//! full-length messages in each direction, so cost grows linearly with the group. This is the
//! baseline the other strategies are measured against.

use tracing::debug;

use crate::collective::{check_buffers, reduce_local_into};
use crate::config::{Config, ReceiveOrder};
use crate::error::{Error, Result};
use crate::point_to_point::{Source, Transport};

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
    let root = config.master_rank;
    if !group.contains(root) {
        return Err(Error::InvalidRoot {
            root,
            size: group.size(),
        });
    }

    let tag = config.data_tag;
    recvbuf.copy_from_slice(sendbuf);

    if group.rank() != root {
        comm.send_with_tag(root, sendbuf, tag)?;
        comm.receive_into_with_tag(Source::Process(root), recvbuf, tag)?;
        return Ok(());
    }

    let workers = || (0..group.size()).filter(move |&rank| rank != root);
    let mut incoming = vec![0.0f32; sendbuf.len()];
    match config.receive_order {
        ReceiveOrder::AnySource => {
            for _ in workers() {
                let status = comm.receive_into_with_tag(Source::AnyProcess, &mut incoming, tag)?;
                debug!(source = status.source_rank(), "naive: accumulating");
                reduce_local_into(&incoming, recvbuf);
            }
        }
        ReceiveOrder::RankOrder => {
            for source in workers() {
                comm.receive_into_with_tag(Source::Process(source), &mut incoming, tag)?;
                debug!(source, "naive: accumulating");
                reduce_local_into(&incoming, recvbuf);
            }
        }
    }

    for destination in workers() {
        comm.send_with_tag(destination, recvbuf, tag)?;
    }
    Ok(())
}
