//! Command-line argument definitions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args as ClapArgs, Parser, Subcommand, ValueEnum};

use pcapflow_core::{
    CaptureFilter, ExtractConfig, NegativeInterval, SizeMode, SortDirection, SortKey, SortOrder,
    SpliceField, SplitConfig,
};

use super::OutputStyle;

/// Turn packet captures into flow-indexed binary records.
#[derive(Parser, Debug)]
#[command(name = "pcapflow")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output (repeat for more)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract flow and packet records from captures
    Extract(ExtractArgs),
    /// Sort packet files in place
    Sort(SortArgs),
    /// Print records from flow or packet files
    Index(IndexArgs),
    /// Renumber flow ids of packet files densely, in place
    Reindex(ReindexArgs),
    /// Split captures into one pcap file per flow
    Split(SplitArgs),
    /// Overwrite packet sizes or intervals of a packet file, in place
    Splice(SpliceArgs),
}

#[derive(ClapArgs, Debug)]
#[command(group(ArgGroup::new("size").args(["packet", "ip_payload", "transport", "application"])))]
pub struct ExtractArgs {
    /// Capture filter expression (tcpdump syntax subset)
    #[arg(short = 'f', long = "filter", value_name = "FILTER")]
    pub filter: Option<String>,

    /// Record the IP packet length (default)
    #[arg(short = 'P', long = "packet")]
    pub packet: bool,

    /// Record the IP payload length
    #[arg(short = 'I', long = "ip-payload")]
    pub ip_payload: bool,

    /// Record the transport payload length
    #[arg(short = 'T', long = "transport")]
    pub transport: bool,

    /// Record new application bytes (TCP retransmissions count as zero)
    #[arg(short = 'A', long = "application")]
    pub application: bool,

    /// Do not write packets smaller than this
    #[arg(short = 'm', long = "min-size", value_name = "BYTES", default_value_t = 0)]
    pub min_size: u16,

    /// Start a new flow after this many seconds of silence
    #[arg(short = 'x', long = "max-interval", value_name = "SECONDS")]
    pub max_interval: Option<f64>,

    /// Id of the first flow
    #[arg(short = 'i', long = "first-id", value_name = "ID", default_value_t = 0)]
    pub first_id: u32,

    /// How to handle packets older than the previous packet of their flow
    #[arg(long = "negative", value_enum, default_value_t = NegativePolicy::Keep)]
    pub negative: NegativePolicy,

    /// Largest forward TCP sequence gap treated as new data
    #[arg(long = "max-skip", value_name = "BYTES")]
    pub max_skip: Option<u32>,

    /// Flow record output file
    #[arg(short = 'F', long = "flows", value_name = "FLOWS")]
    pub flows: PathBuf,

    /// Packet record output file
    #[arg(short = 'o', long = "packets", value_name = "PACKETS")]
    pub packets: PathBuf,

    /// Capture files (`-` for stdin)
    #[arg(value_name = "FILE", default_value = "-")]
    pub files: Vec<PathBuf>,
}

impl ExtractArgs {
    pub fn size_mode(&self) -> SizeMode {
        if self.ip_payload {
            SizeMode::IpPayload
        } else if self.transport {
            SizeMode::Transport
        } else if self.application {
            SizeMode::Application
        } else {
            SizeMode::Packet
        }
    }

    pub fn to_config(&self) -> Result<ExtractConfig> {
        let filter = self
            .filter
            .as_deref()
            .map(CaptureFilter::parse)
            .transpose()
            .context("invalid capture filter")?;

        let defaults = ExtractConfig::default();
        let config = ExtractConfig {
            size_mode: self.size_mode(),
            min_size: self.min_size,
            max_interval: self.max_interval,
            first_flow_id: self.first_id,
            negative_interval: self.negative.into(),
            max_skip: self.max_skip.unwrap_or(defaults.max_skip),
            filter,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NegativePolicy {
    /// Drop the packet
    Discard,
    /// Record the negative interval
    Keep,
    /// Record its absolute value
    Absolute,
    /// Record zero
    Zero,
}

impl From<NegativePolicy> for NegativeInterval {
    fn from(policy: NegativePolicy) -> Self {
        match policy {
            NegativePolicy::Discard => NegativeInterval::Discard,
            NegativePolicy::Keep => NegativeInterval::Keep,
            NegativePolicy::Absolute => NegativeInterval::Absolute,
            NegativePolicy::Zero => NegativeInterval::Zero,
        }
    }
}

/// Sort key names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyArg {
    Flow,
    Time,
    Size,
}

impl From<KeyArg> for SortKey {
    fn from(key: KeyArg) -> Self {
        match key {
            KeyArg::Flow => SortKey::Flow,
            KeyArg::Time => SortKey::Time,
            KeyArg::Size => SortKey::Size,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct SortArgs {
    /// Primary sort key
    #[arg(short = '1', long = "primary", value_enum, default_value_t = KeyArg::Flow)]
    pub primary: KeyArg,

    /// Secondary sort key
    #[arg(short = '2', long = "secondary", value_enum, default_value_t = KeyArg::Time)]
    pub secondary: KeyArg,

    /// Sort the primary and secondary keys in descending order
    #[arg(short = 'd', long = "descending")]
    pub descending: bool,

    /// Sort files concurrently, one thread per file
    #[arg(short = 'p', long = "parallel")]
    pub parallel: bool,

    /// Packet files to sort in place
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,
}

impl SortArgs {
    pub fn order(&self) -> SortOrder {
        let direction = if self.descending {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        };
        SortOrder::from_keys(&[
            (self.primary.into(), direction),
            (self.secondary.into(), direction),
        ])
    }
}

#[derive(ClapArgs, Debug)]
#[command(group(ArgGroup::new("input").args(["flows", "packets"]).required(true)))]
#[command(group(ArgGroup::new("mode").args(["head", "tail", "lookup"])))]
#[command(group(ArgGroup::new("style").args(["tab", "csv", "format"])))]
pub struct IndexArgs {
    /// Input files hold flow records
    #[arg(short = 'f', long = "flows")]
    pub flows: bool,

    /// Input files hold packet records
    #[arg(short = 'p', long = "packets")]
    pub packets: bool,

    /// Print only the first N records
    #[arg(short = 'H', long = "head", value_name = "N")]
    pub head: Option<usize>,

    /// Print only the last N records
    #[arg(short = 'T', long = "tail", value_name = "N")]
    pub tail: Option<usize>,

    /// Print the flows whose ids are listed in this file (`-` for stdin)
    #[arg(short = 'L', long = "lookup", value_name = "LIST")]
    pub lookup: Option<PathBuf>,

    /// With --lookup, renumber flows 0, 1, 2, ... in list order
    #[arg(short = 'r', long = "reindex", requires = "lookup")]
    pub reindex: bool,

    /// Tab-separated output (default)
    #[arg(short = 't', long = "tab")]
    pub tab: bool,

    /// Comma-separated output
    #[arg(short = 'c', long = "csv")]
    pub csv: bool,

    /// Custom output format with {placeholders} and C escapes
    #[arg(short = 'F', long = "format", value_name = "FORMAT")]
    pub format: Option<String>,

    /// Added to every printed flow id
    #[arg(short = 'o', long = "offset", value_name = "OFFSET", default_value_t = 0)]
    pub offset: u32,

    /// Record files (`-` for stdin in full-scan mode)
    #[arg(value_name = "FILE", default_value = "-")]
    pub files: Vec<PathBuf>,
}

/// What an index invocation prints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexMode {
    Scan,
    Head(usize),
    Tail(usize),
    Lookup { list: PathBuf, reindex: bool },
}

impl IndexArgs {
    pub fn mode(&self) -> IndexMode {
        if let Some(n) = self.head {
            IndexMode::Head(n)
        } else if let Some(n) = self.tail {
            IndexMode::Tail(n)
        } else if let Some(list) = &self.lookup {
            IndexMode::Lookup {
                list: list.clone(),
                reindex: self.reindex,
            }
        } else {
            IndexMode::Scan
        }
    }

    pub fn style(&self) -> OutputStyle {
        match (&self.format, self.csv) {
            (Some(format), _) => OutputStyle::Custom(format.clone()),
            (None, true) => OutputStyle::Csv,
            (None, false) => OutputStyle::Tab,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct ReindexArgs {
    /// Renumber files concurrently, one thread per file
    #[arg(short = 'p', long = "parallel")]
    pub parallel: bool,

    /// Packet files to renumber in place
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct SplitArgs {
    /// Capture filter expression (tcpdump syntax subset)
    #[arg(short = 'f', long = "filter", value_name = "FILTER")]
    pub filter: Option<String>,

    /// Root directory of the per-flow files
    #[arg(short = 'd', long = "dir", value_name = "DIR", default_value = "flows")]
    pub dir: PathBuf,

    /// Most files held open at once
    #[arg(short = 'm', long = "max-open", value_name = "N", default_value_t = 1000)]
    pub max_open: usize,

    /// Fraction of open files closed when the limit is reached
    #[arg(short = 'c', long = "cleanup", value_name = "FACTOR", default_value_t = 1.0)]
    pub cleanup_factor: f64,

    /// Use one directory level per address octet
    #[arg(short = 's', long = "split-ips")]
    pub split_ips: bool,

    /// Capture files (`-` for stdin)
    #[arg(value_name = "FILE", default_value = "-")]
    pub files: Vec<PathBuf>,
}

impl SplitArgs {
    pub fn to_config(&self) -> Result<SplitConfig> {
        let filter = self
            .filter
            .as_deref()
            .map(CaptureFilter::parse)
            .transpose()
            .context("invalid capture filter")?;
        let config = SplitConfig {
            dir: self.dir.clone(),
            max_open: self.max_open,
            cleanup_factor: self.cleanup_factor,
            split_ips: self.split_ips,
            filter,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(ClapArgs, Debug)]
#[command(group(ArgGroup::new("field").args(["sizes", "intervals"]).required(true)))]
pub struct SpliceArgs {
    /// Replace the size of every packet
    #[arg(short = 'Z', long = "sizes")]
    pub sizes: bool,

    /// Re-time every packet after the first of its flow run
    #[arg(short = 'V', long = "intervals")]
    pub intervals: bool,

    /// Packet file to modify in place
    #[arg(value_name = "PACKETS")]
    pub packets: PathBuf,

    /// Files of whitespace-separated values (`-` for stdin)
    #[arg(value_name = "VALUES", default_value = "-")]
    pub values: Vec<PathBuf>,
}

impl SpliceArgs {
    pub fn field(&self) -> SpliceField {
        if self.sizes {
            SpliceField::Size
        } else {
            SpliceField::Interval
        }
    }
}
