//! Convenient re-exports for common usage.
//!
//! # Example
//!
//! ```rust,no_run
//! use pcapflow_core::prelude::*;
//!
//! let index = PacketIndex::open("packets.bin")?;
//! println!("{} records, max flow {:?}", index.len(), index.max_flow());
//! # Ok::<(), pcapflow_core::Error>(())
//! ```

// Record types
pub use crate::record::{FlowRecord, PacketRecord, Record, Timestamp, WirePacketRecord};

// Extraction
pub use crate::extract::{run_extract, ExtractConfig, NegativeInterval, SizeMode};
pub use crate::filter::CaptureFilter;

// Sorting and indexing
pub use crate::index::{FlowIndex, PacketIndex};
pub use crate::sort::{sort_file, SortKey, SortOrder};

// Error types
pub use crate::error::{Error, Result};
