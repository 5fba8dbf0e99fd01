//! nxswriter-core: Core types for the nxswriter growing-field writer.
//!
//! This crate provides the pieces shared by the node abstraction, the
//! backends and the write engine:
//! - the [`Error`] taxonomy,
//! - portable element-type tags ([`TypeCode`]),
//! - dynamically typed n-dimensional values ([`Value`]),
//! - slice specifications and their hyperslab translation,
//! - per-step payloads ([`DataHolder`]) and the decoder registry.
//!

pub mod decoder;
mod error;
pub mod holder;
pub mod selection;
pub mod types;
pub mod value;

pub use decoder::{Decoder, DecoderPool, Utf8Decoder};
pub use error::{Error, Result};
pub use holder::{DataFormat, DataHolder};
pub use selection::{Dim, Hyperslab, Slice};
pub use types::TypeCode;
pub use value::{Element, Scalar, Value};
