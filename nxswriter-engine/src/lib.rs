//! nxswriter-engine: Growing-field write engine for NeXus files.
//!
//! This crate turns a declarative entry layout plus per-step records into
//! writes on the node tree:
//! - **growth** - shape reconciliation and slot placement per growth axis
//! - **fill** - type-maximum sentinels for steps without usable data
//! - **field** - the per-field state machine with can-fail recovery
//! - **writer** - the file/entry session driver
//!

mod config;
mod field;
pub mod fill;
pub mod growth;
mod layout;
mod writer;

pub use config::WriterConfig;
pub use field::{FieldWriter, StepOutcome, StepState};
pub use growth::{FieldLayout, MAX_GROWING_RANK};
pub use layout::{CompressionConfig, EntryLayout, FieldConfig, GroupLayout, LinkLayout, Strategy};
pub use writer::{NexusWriter, StepRecord, StepReport};

// Re-export the pieces callers need to feed a session
pub use nxswriter_core::{DataFormat, DataHolder, DecoderPool, Error, Result, TypeCode, Value};
