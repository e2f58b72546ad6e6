//! pcapflow - flow-indexed binary records from packet captures.
//!
//! The binary is a thin layer over [`pcapflow_core`]: argument parsing and
//! text rendering live here, everything else in the core crate.
//!
//! # Example
//!
//! ```no_run
//! use clap::Parser;
//! use pcapflow::cli::{Args, Command};
//!
//! let args = Args::parse_from(["pcapflow", "sort", "-p", "a.bin", "b.bin"]);
//! if let Command::Sort(sort) = args.command {
//!     pcapflow_core::sort_files(&sort.files, &sort.order(), sort.parallel)?;
//! }
//! # Ok::<(), pcapflow_core::Error>(())
//! ```

pub mod cli;

pub use pcapflow_core::{Error, Result};
