//! Command-line interface module.
//!
//! This module handles:
//! - Argument parsing via clap
//! - Text rendering of records (tab, CSV, custom templates)

mod args;
mod output;

pub use args::{
    Args, Command, ExtractArgs, IndexArgs, IndexMode, KeyArg, NegativePolicy, ReindexArgs,
    SortArgs, SpliceArgs, SplitArgs,
};
pub use output::{unescape, FlowFormat, OutputStyle, PacketFormat};
