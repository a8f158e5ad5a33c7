//! Benchmark driver
//!
//! Runs each selected strategy once on an all-ones vector, times it between two barriers and
//! checks the result against the group size. The reference all-reduce of the backend can be
//! timed alongside as a baseline.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::collective::{AllReduce, Algorithm, ReferenceAllReduce};
use crate::config::Config;
use crate::error::Result;
use crate::topology::Communicator;
use crate::Rank;

/// Smallest vector length the benchmark is run with by default
pub const DEFAULT_MIN_LEN: usize = 1_000_000;

/// Largest accepted deviation from the expected sum, per element
pub const TOLERANCE: f32 = 1e-5;

/// The largest multiple of `size` not above `min_len`.
///
/// Guarantees the ring strategy's divisibility precondition.
pub fn vector_len(min_len: usize, size: usize) -> usize {
    if size == 0 {
        return 0;
    }
    (min_len / size) * size
}

/// Something the benchmark can time
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Contender {
    /// One of the point to point strategies
    Strategy(Algorithm),
    /// The backend's own all-reduce
    Reference,
}

impl Contender {
    /// Label used in the report
    pub fn label(&self) -> &'static str {
        match self {
            Contender::Strategy(Algorithm::Naive) => "1. Naive Implementation",
            Contender::Strategy(Algorithm::Ring) => "2. Ring Implementation ",
            Contender::Strategy(Algorithm::Tree) => "3. Tree Implementation ",
            Contender::Reference => "4. Library (Ref)       ",
        }
    }

    /// Runs the contender once.
    pub fn invoke<C>(
        &self,
        comm: &C,
        config: &Config,
        sendbuf: &[f32],
        recvbuf: &mut [f32],
    ) -> Result<()>
    where
        C: AllReduce + ReferenceAllReduce + ?Sized,
    {
        match *self {
            Contender::Strategy(algorithm) => {
                comm.all_reduce_into(algorithm, config, sendbuf, recvbuf)?;
                Ok(())
            }
            Contender::Reference => comm.reference_all_reduce_into(sendbuf, recvbuf),
        }
    }
}

impl fmt::Display for Contender {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label().trim_end())
    }
}

/// Runs `call` between two barriers and measures how long it took on this rank.
pub fn time_call<C, F, R>(comm: &C, call: F) -> Result<(R, Duration)>
where
    C: Communicator + ?Sized,
    F: FnOnce() -> Result<R>,
{
    comm.barrier()?;
    let start = Instant::now();
    let result = call()?;
    comm.barrier()?;
    Ok((result, start.elapsed()))
}

/// Outcome of one contender
#[derive(Copy, Clone, Debug)]
pub struct Outcome {
    /// What was run
    pub contender: Contender,
    /// Time between the barriers, on this rank
    pub elapsed: Duration,
    /// Largest deviation of any element from the expected sum
    pub max_error: f32,
}

impl Outcome {
    /// Whether every element was within `TOLERANCE` of the expected sum
    pub fn passed(&self) -> bool {
        self.max_error < TOLERANCE
    }
}

/// Outcomes of a benchmark run on one rank
#[derive(Clone, Debug)]
pub struct Report {
    /// Group size
    pub size: Rank,
    /// Vector length
    pub len: usize,
    /// One entry per contender, in the order they ran
    pub outcomes: Vec<Outcome>,
}

impl Report {
    /// Whether every contender produced the expected sum
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(Outcome::passed)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const RULE: &str = "------------------------------------------------";
        writeln!(f, "{}", RULE)?;
        writeln!(
            f,
            "Distributed Training Benchmark (Processes: {})",
            self.size
        )?;
        writeln!(f, "{}", RULE)?;
        for outcome in &self.outcomes {
            writeln!(
                f,
                "{} Time: {} ms",
                outcome.contender.label(),
                outcome.elapsed.as_micros() as f64 / 1000.0
            )?;
        }
        writeln!(f, "{}", RULE)?;
        writeln!(
            f,
            "Correctness Check: {}",
            if self.passed() { "PASSED" } else { "FAILED" }
        )?;
        write!(f, "{}", RULE)
    }
}

/// Runs every contender once on an all-ones vector of length `len`.
///
/// Must be called on every rank of the group. The first error aborts the run; a ring
/// precondition violation surfaces here as `Error::IndivisibleBuffer`.
pub fn run<C>(comm: &C, config: &Config, len: usize, contenders: &[Contender]) -> Result<Report>
where
    C: AllReduce + ReferenceAllReduce + ?Sized,
{
    let group = comm.group();
    let data = vec![1.0f32; len];
    let expected = group.size() as f32;
    let mut outcomes = Vec::with_capacity(contenders.len());

    for &contender in contenders {
        let mut result = vec![0.0f32; len];
        let ((), elapsed) =
            time_call(comm, || contender.invoke(comm, config, &data, &mut result))?;
        let max_error = result
            .iter()
            .map(|x| (x - expected).abs())
            .map(|err| if err.is_nan() { f32::INFINITY } else { err })
            .fold(0.0f32, f32::max);
        debug!(%contender, ?elapsed, max_error, "benchmark: done");
        outcomes.push(Outcome {
            contender,
            elapsed,
            max_error,
        });
    }

    Ok(Report {
        size: group.size(),
        len,
        outcomes,
    })
}
