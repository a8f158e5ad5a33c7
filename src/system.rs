//! Transport over an MPI library
//!
//! Available with the `mpi` feature. `MpiWorld` wraps the world communicator of the `mpi` crate,
//! so the strategies run across real processes started by `mpiexec`. The reference all-reduce is
//! the library's own `MPI_Allreduce`.
//!
//! ```no_run
//! use allreduce::system::MpiWorld;
//! use allreduce::traits::*;
//! use allreduce::Config;
//!
//! let world = MpiWorld::initialize().unwrap();
//! let input = vec![1.0f32; 1024];
//! let mut output = vec![0.0f32; 1024];
//! world
//!     .tree_all_reduce_into(&Config::default(), &input, &mut output)
//!     .unwrap();
//! ```

use conv::ConvUtil;
use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::point_to_point as p2p;
use mpi::topology::SimpleCommunicator;
use mpi::traits::{
    Communicator as _, CommunicatorCollectives as _, Destination as _, Equivalence,
    Source as _,
};

use crate::collective::{check_buffers, ReferenceAllReduce};
use crate::error::{Error, Result};
use crate::point_to_point::{Source, Status, Transport};
use crate::topology::{Communicator, ProcessGroup};
use crate::{Rank, Tag};

/// The MPI world communicator
///
/// MPI is finalized when this value is dropped.
pub struct MpiWorld {
    world: SimpleCommunicator,
    group: ProcessGroup,
    _universe: Universe,
}

impl MpiWorld {
    /// Initializes MPI and wraps the world communicator.
    ///
    /// Fails with `AlreadyInitialized` if MPI has been initialized before.
    pub fn initialize() -> Result<MpiWorld> {
        let universe = mpi::initialize().ok_or(Error::AlreadyInitialized)?;
        let world = universe.world();
        let group = ProcessGroup::new(world.rank(), world.size())?;
        Ok(MpiWorld {
            world,
            group,
            _universe: universe,
        })
    }

    /// Version of the MPI library found at build time, if it could be probed
    pub fn library_version() -> Option<&'static str> {
        option_env!("ALLREDUCE_MPI_VERSION")
    }
}

fn status_of(status: p2p::Status, expected: usize) -> Result<Status> {
    let received = status
        .count(f32::equivalent_datatype())
        .value_as::<usize>()
        .unwrap_or_default();
    if received != expected {
        return Err(Error::Truncated { expected, received });
    }
    Ok(Status::new(status.source_rank(), status.tag(), received))
}

impl Communicator for MpiWorld {
    fn group(&self) -> ProcessGroup {
        self.group
    }

    fn barrier(&self) -> Result<()> {
        self.world.barrier();
        Ok(())
    }

    fn abort(&self, errorcode: i32) -> ! {
        self.world.abort(errorcode)
    }
}

impl Transport for MpiWorld {
    fn send_with_tag(&self, destination: Rank, buf: &[f32], tag: Tag) -> Result<()> {
        self.group.check_rank(destination)?;
        self.world.process_at_rank(destination).send_with_tag(buf, tag);
        Ok(())
    }

    fn receive_into_with_tag(&self, source: Source, buf: &mut [f32], tag: Tag) -> Result<Status> {
        let status = match source {
            Source::Process(rank) => {
                self.group.check_rank(rank)?;
                self.world
                    .process_at_rank(rank)
                    .receive_into_with_tag(buf, tag)
            }
            Source::AnyProcess => self.world.any_process().receive_into_with_tag(buf, tag),
        };
        status_of(status, buf.len())
    }

    fn send_receive_into_with_tag(
        &self,
        msg: &[f32],
        destination: Rank,
        buf: &mut [f32],
        source: Source,
        tag: Tag,
    ) -> Result<Status> {
        self.group.check_rank(destination)?;
        let destination = self.world.process_at_rank(destination);
        let status = match source {
            Source::Process(rank) => {
                self.group.check_rank(rank)?;
                let source = self.world.process_at_rank(rank);
                p2p::send_receive_into_with_tags(msg, &destination, tag, buf, &source, tag)
            }
            Source::AnyProcess => {
                let source = self.world.any_process();
                p2p::send_receive_into_with_tags(msg, &destination, tag, buf, &source, tag)
            }
        };
        status_of(status, buf.len())
    }
}

impl ReferenceAllReduce for MpiWorld {
    fn reference_all_reduce_into(&self, sendbuf: &[f32], recvbuf: &mut [f32]) -> Result<()> {
        check_buffers(sendbuf, recvbuf)?;
        self.world
            .all_reduce_into(sendbuf, recvbuf, SystemOperation::sum());
        Ok(())
    }
}
