//! Run configuration
//!
//! A `Config` is loaded once, before any collective runs, and then handed to every strategy call
//! by reference. The file format is one `KEY=VALUE` pair per line:
//!
//! ```text
//! # aggregator of the naive strategy
//! MASTER_RANK = 0
//! DATA_TAG    = 1
//! NAIVE_RECEIVE_ORDER = rank
//! ```
//!
//! Whitespace anywhere on a line is ignored, as are blank lines and lines starting with `#`.
//! Problems never abort loading: they are returned next to the resulting `Config` so the caller
//! can decide which rank reports them.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::error::ConfigError;
use crate::{Rank, Tag};

/// Default configuration file, relative to the working directory
pub const DEFAULT_PATH: &str = "config.txt";

/// Order in which the naive aggregator collects the workers' vectors
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReceiveOrder {
    /// Take vectors as they arrive, from any worker.
    #[default]
    AnySource,
    /// Take vectors from rank 0, 1, 2, ... in turn. Summation order, and thus rounding, is the
    /// same on every run.
    RankOrder,
}

impl FromStr for ReceiveOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" | "any_source" => Ok(ReceiveOrder::AnySource),
            "rank" | "rank_order" => Ok(ReceiveOrder::RankOrder),
            _ => Err(ConfigError::InvalidReceiveOrder(s.to_string())),
        }
    }
}

impl fmt::Display for ReceiveOrder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReceiveOrder::AnySource => f.write_str("any"),
            ReceiveOrder::RankOrder => f.write_str("rank"),
        }
    }
}

/// Settings shared by all strategies
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Aggregator of the naive strategy. Also the rank that reports diagnostics.
    pub master_rank: Rank,
    /// Tag attached to every data message
    pub data_tag: Tag,
    /// How the naive aggregator collects vectors
    pub receive_order: ReceiveOrder,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            master_rank: 0,
            data_tag: 1,
            receive_order: ReceiveOrder::AnySource,
        }
    }
}

impl Config {
    /// The rank that prints reports and logs group-wide diagnostics
    pub fn reporting_rank(&self) -> Rank {
        self.master_rank
    }

    /// Replaces the aggregator rank.
    pub fn with_master_rank(mut self, master_rank: Rank) -> Self {
        self.master_rank = master_rank;
        self
    }

    /// Replaces the data tag.
    pub fn with_data_tag(mut self, data_tag: Tag) -> Self {
        self.data_tag = data_tag;
        self
    }

    /// Replaces the naive receive order.
    pub fn with_receive_order(mut self, receive_order: ReceiveOrder) -> Self {
        self.receive_order = receive_order;
        self
    }

    /// Reads a configuration file.
    ///
    /// A file that cannot be read yields the defaults plus a `ConfigError::Unreadable`.
    pub fn load<P: AsRef<Path>>(path: P) -> (Config, Vec<ConfigError>) {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => Config::parse(&text),
            Err(source) => (
                Config::default(),
                vec![ConfigError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                }],
            ),
        }
    }

    /// Parses configuration text on top of the defaults.
    ///
    /// A malformed value leaves the previous value of its key in place.
    pub fn parse(text: &str) -> (Config, Vec<ConfigError>) {
        let mut config = Config::default();
        let mut diagnostics = Vec::new();

        for line in text.lines() {
            let line: String = line.chars().filter(|c| !c.is_whitespace()).collect();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };

            let applied = match key {
                "MASTER_RANK" => parse_number(key, value).map(|v| config.master_rank = v),
                "DATA_TAG" => parse_number(key, value).map(|v| config.data_tag = v),
                "NAIVE_RECEIVE_ORDER" => value
                    .parse::<ReceiveOrder>()
                    .map(|v| config.receive_order = v),
                _ => {
                    debug!(key, "ignoring unknown configuration key");
                    Ok(())
                }
            };
            if let Err(err) = applied {
                diagnostics.push(err);
            }
        }

        (config, diagnostics)
    }
}

fn parse_number(key: &str, value: &str) -> Result<i32, ConfigError> {
    value.parse().map_err(|source| ConfigError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
        source,
    })
}
