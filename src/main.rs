//! Benchmarks the all-reduce strategies against each other and against the backend's own
//! all-reduce.
//!
//! ```text
//! allreduce-bench --ranks 8
//! mpiexec -n 8 allreduce-bench --backend mpi
//! ```
//!
//! Set `RUST_LOG=allreduce=debug` to follow the protocols round by round.

use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn, Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use allreduce::bench::{self, Contender};
use allreduce::config::{self, Config};
use allreduce::local;
#[cfg(feature = "mpi")]
use allreduce::system::MpiWorld;
use allreduce::traits::*;
use allreduce::{Algorithm, ConfigError, Rank};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// One thread per rank inside this process
    Local,
    /// Processes started by mpiexec
    #[cfg(feature = "mpi")]
    Mpi,
}

#[derive(Parser, Debug)]
#[command(version, about = "Benchmark naive, ring and tree all-reduce")]
struct Args {
    /// Configuration file
    #[arg(long, default_value = config::DEFAULT_PATH)]
    config: PathBuf,

    /// Message passing backend
    #[arg(long, value_enum, default_value_t = Backend::Local)]
    backend: Backend,

    /// Group size of the local backend
    #[arg(long, default_value_t = 4)]
    ranks: Rank,

    /// Vector length, rounded down to a multiple of the group size
    #[arg(long, default_value_t = bench::DEFAULT_MIN_LEN)]
    min_len: usize,

    /// Exact vector length, overrides --min-len
    #[arg(long)]
    len: Option<usize>,

    /// Strategies to run, in order
    #[arg(long, value_delimiter = ',', default_values_t = Algorithm::ALL.to_vec())]
    algorithms: Vec<Algorithm>,

    /// Do not time the backend's own all-reduce
    #[arg(long)]
    skip_reference: bool,
}

impl Args {
    fn contenders(&self) -> Vec<Contender> {
        let mut contenders: Vec<_> = self
            .algorithms
            .iter()
            .map(|&algorithm| Contender::Strategy(algorithm))
            .collect();
        if !self.skip_reference {
            contenders.push(Contender::Reference);
        }
        contenders
    }
}

/// Prints `[Warning] message` style lines
struct SeverityPrefix;

impl<S, N> FormatEvent<S, N> for SeverityPrefix
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let severity = match *event.metadata().level() {
            Level::ERROR => "Error",
            Level::WARN => "Warning",
            Level::INFO => "Info",
            Level::DEBUG => "Debug",
            Level::TRACE => "Trace",
        };
        write!(writer, "[{}] ", severity)?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .event_format(SeverityPrefix)
        .init();
}

/// Runs the benchmark on one rank.
fn drive<C>(comm: &C, args: &Args) -> allreduce::Result<()>
where
    C: AllReduce + ReferenceAllReduce + ?Sized,
{
    let group = comm.group();
    let (config, diagnostics) = Config::load(&args.config);
    let reporter = if group.contains(config.reporting_rank()) {
        config.reporting_rank()
    } else {
        0
    };
    let reporting = group.rank() == reporter;

    if reporting {
        for diagnostic in &diagnostics {
            match diagnostic {
                ConfigError::Unreadable { .. } => warn!("{}", diagnostic),
                _ => error!("{}", diagnostic),
            }
        }
        info!(?config, "configuration");
    }

    let len = args
        .len
        .unwrap_or_else(|| bench::vector_len(args.min_len, group.len()));
    match bench::run(comm, &config, len, &args.contenders()) {
        Ok(report) => {
            if reporting {
                println!("{}", report);
            }
            Ok(())
        }
        Err(err) if err.is_fatal() => {
            if reporting {
                error!("{}", err);
                comm.abort(1);
            }
            Err(err)
        }
        Err(err) => {
            // exit status is left alone
            if reporting {
                error!("{}", err);
            }
            Ok(())
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logging();

    match args.backend {
        Backend::Local => {
            let results = local::run(args.ranks, |comm| drive(&comm, &args))
                .context("failed to set up the local process group")?;
            for result in results {
                result?;
            }
        }
        #[cfg(feature = "mpi")]
        Backend::Mpi => {
            if let Some(version) = MpiWorld::library_version() {
                info!(version, "MPI library");
            }
            let world = MpiWorld::initialize().context("failed to initialize MPI")?;
            drive(&world, &args)?;
        }
    }

    Ok(())
}
