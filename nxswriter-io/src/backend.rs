//! The contract a container library must satisfy to back the node tree.
//!
//! Backends deal in native handles only. Ownership, liveness and the
//! close/reopen fan-out are handled once, in the node layer, on top of
//! these calls.

use nxswriter_core::{Error, Hyperslab, Result, TypeCode, Value};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// File-format compatibility bound requested on open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LibVersion {
    #[default]
    Earliest,
    Latest,
}

/// Access mode for opening or reopening a file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileAccess {
    pub readonly: bool,
    /// Single-writer/multiple-reader mode; implies the latest file format.
    pub swmr: bool,
    pub libver: LibVersion,
}

impl FileAccess {
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            readonly: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn read_write() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn swmr_write() -> Self {
        Self {
            readonly: false,
            swmr: true,
            libver: LibVersion::Latest,
        }
    }
}

/// Deflate compression filter: level 0-9 plus an optional byte shuffle
/// applied before deflate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Deflate {
    rate: u8,
    shuffle: bool,
}

impl Default for Deflate {
    fn default() -> Self {
        Self {
            rate: 5,
            shuffle: true,
        }
    }
}

impl Deflate {
    /// # Errors
    /// Returns [`Error::ObjectCreate`] for a rate above 9.
    pub fn new(rate: u8, shuffle: bool) -> Result<Self> {
        if rate > 9 {
            return Err(Error::ObjectCreate {
                kind: "filter",
                name: "deflate".to_string(),
                message: format!("compression rate {rate} outside 0-9"),
            });
        }
        Ok(Self { rate, shuffle })
    }

    #[must_use]
    pub fn rate(&self) -> u8 {
        self.rate
    }

    #[must_use]
    pub fn shuffle(&self) -> bool {
        self.shuffle
    }
}

/// Everything needed to create a field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    pub dtype: TypeCode,
    pub shape: Vec<usize>,
    pub chunk: Option<Vec<usize>>,
    pub filter: Option<Deflate>,
    /// A growth axis is declared but not engaged yet.
    pub growing: bool,
}

impl FieldSpec {
    #[must_use]
    pub fn new(dtype: TypeCode, shape: &[usize]) -> Self {
        Self {
            dtype,
            shape: shape.to_vec(),
            chunk: None,
            filter: None,
            growing: false,
        }
    }

    #[must_use]
    pub fn with_chunk(mut self, chunk: &[usize]) -> Self {
        self.chunk = Some(chunk.to_vec());
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Option<Deflate>) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn growing(mut self, growing: bool) -> Self {
        self.growing = growing;
        self
    }

    /// Concrete initial extent: an empty shape becomes `[1]`, or `[0]` for a
    /// field whose growth is declared but not engaged.
    #[must_use]
    pub fn initial_shape(&self) -> Vec<usize> {
        if self.shape.is_empty() {
            vec![usize::from(!self.growing)]
        } else {
            self.shape.clone()
        }
    }

    /// Chunk lengths, at least 1 per dimension, defaulting to the extent.
    #[must_use]
    pub fn chunk_shape(&self) -> Vec<usize> {
        let shape = self.initial_shape();
        match &self.chunk {
            Some(chunk) if chunk.len() == shape.len() => chunk.iter().map(|&c| c.max(1)).collect(),
            _ => shape.iter().map(|&s| s.max(1)).collect(),
        }
    }
}

/// Link destination, optionally in another file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkTarget {
    pub file: Option<String>,
    pub path: String,
}

impl LinkTarget {
    #[must_use]
    pub fn internal(path: &str) -> Self {
        Self {
            file: None,
            path: path.to_string(),
        }
    }
}

impl FromStr for LinkTarget {
    type Err = Error;

    /// Parses `"/object/path"` or `"file.nxs:/object/path"`.
    fn from_str(s: &str) -> Result<Self> {
        let (file, path) = match s.rfind(":/") {
            Some(pos) => (Some(&s[..pos]), &s[pos + 1..]),
            None => (None, s),
        };
        if !path.starts_with('/') {
            return Err(Error::InvalidSelection(format!(
                "link target '{s}' is not an absolute path"
            )));
        }
        Ok(Self {
            file: file.filter(|f| !f.is_empty()).map(str::to_string),
            path: path.to_string(),
        })
    }
}

impl fmt::Display for LinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{file}:{}", self.path),
            None => f.write_str(&self.path),
        }
    }
}

/// Object found under a name in a group.
pub enum RawEntry<B: Backend + ?Sized> {
    Group(B::Group),
    Field(B::Field),
    Link(B::Link),
}

/// Owner of an attribute set.
pub enum Location<'a, B: Backend + ?Sized> {
    Group(&'a B::Group),
    Field(&'a B::Field),
}

/// Operations a container library provides on native handles.
pub trait Backend: Send + Sync + 'static {
    type File: Send;
    type Group: Send;
    type Field: Send;
    type Link: Send;
    type Attribute: Send;

    /// Short backend name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Creates a file; `overwrite` truncates an existing one, otherwise
    /// creation fails if the file exists. `libver` bounds the file format.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    fn create_file(&self, path: &Path, overwrite: bool, libver: LibVersion) -> Result<Self::File>;

    /// # Errors
    /// Returns an error if the file cannot be opened with `access`.
    fn open_file(&self, path: &Path, access: FileAccess) -> Result<Self::File>;

    /// # Errors
    /// Returns an error if pending data cannot be written.
    fn close_file(&self, file: Self::File) -> Result<()>;

    /// # Errors
    /// Returns an error if pending data cannot be written.
    fn flush(&self, file: &Self::File) -> Result<()>;

    fn is_readonly(&self, file: &Self::File) -> bool;

    /// File-format bound in effect for the open handle.
    ///
    /// # Errors
    /// Returns an error if the access properties cannot be read.
    fn libver(&self, file: &Self::File) -> Result<LibVersion>;

    /// # Errors
    /// Returns an error if the root group cannot be opened.
    fn root(&self, file: &Self::File) -> Result<Self::Group>;

    /// # Errors
    /// Returns an error if the group cannot be created.
    fn create_group(&self, parent: &Self::Group, name: &str) -> Result<Self::Group>;

    /// Opens a child, following links inside the file.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown name.
    fn open(&self, parent: &Self::Group, name: &str) -> Result<RawEntry<Self>>;

    /// # Errors
    /// Returns an error if the field cannot be created.
    fn create_field(&self, parent: &Self::Group, name: &str, spec: &FieldSpec)
        -> Result<Self::Field>;

    /// Child names in backend order.
    ///
    /// # Errors
    /// Returns an error if the group cannot be listed.
    fn names(&self, group: &Self::Group) -> Result<Vec<String>>;

    /// Names of the children that are links.
    ///
    /// # Errors
    /// Returns an error if the group cannot be listed.
    fn link_names(&self, group: &Self::Group) -> Result<Vec<String>>;

    /// # Errors
    /// Returns an error if the link cannot be created.
    fn create_link(&self, parent: &Self::Group, name: &str, target: &LinkTarget)
        -> Result<Self::Link>;

    /// # Errors
    /// Returns [`Error::NotFound`] if `name` is not a link.
    fn open_link(&self, parent: &Self::Group, name: &str) -> Result<Self::Link>;

    /// Target as stored; `file` is `None` for a link inside the same file.
    ///
    /// # Errors
    /// Returns an error if the link cannot be queried.
    fn link_target(&self, link: &Self::Link) -> Result<LinkTarget>;

    /// # Errors
    /// Returns an error if the field cannot be queried.
    fn field_dtype(&self, field: &Self::Field) -> Result<TypeCode>;

    /// # Errors
    /// Returns an error if the field cannot be queried.
    fn field_shape(&self, field: &Self::Field) -> Result<Vec<usize>>;

    /// # Errors
    /// Returns an error if the field cannot be queried.
    fn field_chunk(&self, field: &Self::Field) -> Result<Option<Vec<usize>>>;

    /// # Errors
    /// Returns an error if the field cannot be queried.
    fn field_filter(&self, field: &Self::Field) -> Result<Option<Deflate>>;

    /// Resizes the field to `shape`; callers only ever enlarge.
    ///
    /// # Errors
    /// Returns an error if the extent cannot be changed.
    fn resize(&self, field: &Self::Field, shape: &[usize]) -> Result<()>;

    /// # Errors
    /// Returns an error if the read fails.
    fn read_field(&self, field: &Self::Field, selection: Option<&Hyperslab>) -> Result<Value>;

    /// Writes `value`, already cast to the field type.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    fn write_field(
        &self,
        field: &Self::Field,
        selection: Option<&Hyperslab>,
        value: &Value,
    ) -> Result<()>;

    /// Re-reads cached metadata.
    ///
    /// # Errors
    /// Returns an error if the field cannot be refreshed.
    fn refresh_field(&self, _field: &Self::Field) -> Result<()> {
        Ok(())
    }

    /// # Errors
    /// Returns an error if the owner cannot be listed.
    fn attribute_names(&self, owner: Location<'_, Self>) -> Result<Vec<String>>;

    /// # Errors
    /// Returns an error if the attribute cannot be created.
    fn create_attribute(
        &self,
        owner: Location<'_, Self>,
        name: &str,
        dtype: TypeCode,
        shape: &[usize],
    ) -> Result<Self::Attribute>;

    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown name.
    fn open_attribute(&self, owner: Location<'_, Self>, name: &str) -> Result<Self::Attribute>;

    /// # Errors
    /// Returns an error if the attribute cannot be removed.
    fn delete_attribute(&self, owner: Location<'_, Self>, name: &str) -> Result<()>;

    /// # Errors
    /// Returns an error if the attribute cannot be queried.
    fn attribute_dtype(&self, attribute: &Self::Attribute) -> Result<TypeCode>;

    /// # Errors
    /// Returns an error if the attribute cannot be queried.
    fn attribute_shape(&self, attribute: &Self::Attribute) -> Result<Vec<usize>>;

    /// # Errors
    /// Returns an error if the read fails.
    fn read_attribute(
        &self,
        attribute: &Self::Attribute,
        selection: Option<&Hyperslab>,
    ) -> Result<Value>;

    /// Writes `value`, already cast to the attribute type.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    fn write_attribute(
        &self,
        attribute: &Self::Attribute,
        selection: Option<&Hyperslab>,
        value: &Value,
    ) -> Result<()>;

    /// Default compression filter for new fields.
    fn deflate_filter(&self) -> Deflate {
        Deflate::default()
    }
}
