//! nxswriter-io: NeXus node tree over pluggable container backends.
//!
//! Files, groups, fields, links and attributes are exclusive handles into a
//! per-file node arena. The arena tracks parent/child relations so closing
//! a node closes its subtree and reopening a file rebinds every live handle.
//!

pub mod backend;
#[cfg(feature = "hdf5")]
pub mod hdf5;
pub mod memory;
pub mod node;
mod tree;

pub use backend::{Backend, Deflate, FieldSpec, FileAccess, LibVersion, LinkTarget};
#[cfg(feature = "hdf5")]
pub use hdf5::Hdf5Backend;
pub use memory::MemoryBackend;
pub use node::{
    create_file, create_file_with_version, deflate_filter, link, open_file, Attribute,
    AttributeManager, Entry, Field, File, Group, Link, Node,
};
pub use nxswriter_core::{Error, Result};
