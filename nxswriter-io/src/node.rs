//! Backend-independent node handles.
//!
//! Handles are exclusive owners of their node: they are not `Clone`, and
//! dropping one releases it. Every handle of a file shares that file's
//! session, whose mutex serializes all backend calls.

use crate::backend::{Backend, Deflate, FieldSpec, FileAccess, LibVersion, LinkTarget, RawEntry};
use crate::tree::{Binding, Kind, NodeId, Session, Tree, FILE_ID};
use log::{debug, warn};
use nxswriter_core::{Error, Hyperslab, Result, Slice, TypeCode, Value};
use std::path::Path;
use std::sync::{Arc, MutexGuard};

/// Operations shared by every node.
pub trait Node {
    /// Name under the parent (the file path for a [`File`]).
    fn name(&self) -> String;

    /// Absolute object path inside the file.
    fn path(&self) -> String;

    /// Whether the node is usable. Never fails.
    fn is_valid(&self) -> bool;

    /// Closes the node and its children, children first. Idempotent.
    ///
    /// # Errors
    /// Returns an error only if closing the native file fails.
    fn close(&self) -> Result<()>;

    /// Rebinds the backend handle by name from the parent, then the children.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] if the parent is not open, or the
    /// backend error if the object is gone.
    fn reopen(&self) -> Result<()>;
}

struct Handle<B: Backend> {
    session: Arc<Session<B>>,
    id: NodeId,
}

impl<B: Backend> Handle<B> {
    fn lock(&self) -> MutexGuard<'_, Tree<B>> {
        self.session.lock()
    }

    fn backend(&self) -> &B {
        &self.session.backend
    }

    fn child(&self, id: NodeId) -> Handle<B> {
        Handle {
            session: Arc::clone(&self.session),
            id,
        }
    }

    fn name(&self) -> String {
        self.lock()
            .slot(self.id)
            .map(|slot| slot.name.clone())
            .unwrap_or_default()
    }

    fn path(&self) -> String {
        self.lock()
            .slot(self.id)
            .map(|slot| slot.path.clone())
            .unwrap_or_default()
    }

    fn is_valid(&self) -> bool {
        self.lock().is_valid(self.id)
    }

    fn close(&self) -> Result<()> {
        self.lock().close(self.backend(), self.id)
    }

    fn reopen(&self) -> Result<()> {
        self.lock().rebind(self.backend(), self.id)
    }

    fn attributes(&self) -> Result<AttributeManager<B>> {
        let mut tree = self.lock();
        tree.slot(self.id)?;
        let id = tree.insert(self.id, Kind::Attributes, "", Binding::Attributes)?;
        Ok(AttributeManager {
            handle: self.child(id),
        })
    }
}

impl<B: Backend> Drop for Handle<B> {
    fn drop(&mut self) {
        self.session.lock().release(self.id);
    }
}

macro_rules! impl_node {
    ($($ty:ident),*) => {$(
        impl<B: Backend> Node for $ty<B> {
            fn name(&self) -> String {
                self.handle.name()
            }

            fn path(&self) -> String {
                self.handle.path()
            }

            fn is_valid(&self) -> bool {
                self.handle.is_valid()
            }

            fn close(&self) -> Result<()> {
                self.handle.close()
            }

            fn reopen(&self) -> Result<()> {
                self.handle.reopen()
            }
        }
    )*};
}

impl_node!(Group, Field, Link, AttributeManager, Attribute);

/// Creates a file; `overwrite` truncates an existing one.
///
/// # Errors
/// Returns [`Error::ObjectCreate`] if the backend refuses.
pub fn create_file<B: Backend>(
    backend: &Arc<B>,
    path: impl AsRef<Path>,
    overwrite: bool,
) -> Result<File<B>> {
    create_file_with_version(backend, path, overwrite, LibVersion::default())
}

/// [`create_file`] with an explicit file-format bound.
///
/// # Errors
/// Returns [`Error::ObjectCreate`] if the backend refuses.
pub fn create_file_with_version<B: Backend>(
    backend: &Arc<B>,
    path: impl AsRef<Path>,
    overwrite: bool,
    libver: LibVersion,
) -> Result<File<B>> {
    let path = path.as_ref();
    let native = backend
        .create_file(path, overwrite, libver)
        .map_err(|e| Error::creation("file", &path.display().to_string(), e))?;
    let access = FileAccess {
        libver,
        ..FileAccess::read_write()
    };
    Ok(File::from_native(backend, path, native, access))
}

/// Opens an existing file.
///
/// # Errors
/// Returns the backend error if the file cannot be opened.
pub fn open_file<B: Backend>(
    backend: &Arc<B>,
    path: impl AsRef<Path>,
    readonly: bool,
) -> Result<File<B>> {
    let path = path.as_ref();
    let access = FileAccess {
        readonly,
        ..FileAccess::default()
    };
    let native = backend.open_file(path, access)?;
    Ok(File::from_native(backend, path, native, access))
}

/// Creates a link called `name` in `parent` pointing at `target`
/// (`"/path"` or `"file:/path"`).
///
/// # Errors
/// Returns [`Error::ObjectCreate`] if the link cannot be created.
pub fn link<B: Backend>(target: &str, parent: &Group<B>, name: &str) -> Result<Link<B>> {
    parent.link(target, name)
}

/// Default compression filter of a backend.
pub fn deflate_filter<B: Backend>(backend: &B) -> Deflate {
    backend.deflate_filter()
}

/// Top of a node tree. Dropping the handle closes the file.
pub struct File<B: Backend> {
    handle: Handle<B>,
}

impl<B: Backend> File<B> {
    fn from_native(backend: &Arc<B>, path: &Path, native: B::File, access: FileAccess) -> Self {
        let session = Session::new(Arc::clone(backend), path.to_path_buf(), native, access);
        Self {
            handle: Handle {
                session: Arc::new(session),
                id: FILE_ID,
            },
        }
    }

    /// Path the file was opened with.
    #[must_use]
    pub fn name(&self) -> String {
        self.handle.session.file_name()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    /// Root group.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed file.
    pub fn root(&self) -> Result<Group<B>> {
        let mut tree = self.handle.lock();
        let native = self.handle.backend().root(tree.native_file()?)?;
        let id = tree.insert(FILE_ID, Kind::Root, "/", Binding::Group(native))?;
        Ok(Group {
            handle: self.handle.child(id),
        })
    }

    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed file or the backend error.
    pub fn flush(&self) -> Result<()> {
        let tree = self.handle.lock();
        self.handle.backend().flush(tree.native_file()?)
    }

    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed file.
    pub fn readonly(&self) -> Result<bool> {
        let tree = self.handle.lock();
        Ok(self.handle.backend().is_readonly(tree.native_file()?))
    }

    /// File-format bound of the open handle.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed file.
    pub fn libver(&self) -> Result<LibVersion> {
        let tree = self.handle.lock();
        self.handle.backend().libver(tree.native_file()?)
    }

    /// Closes every node, then the file. Idempotent.
    ///
    /// # Errors
    /// Returns the backend error if pending data cannot be written.
    pub fn close(&self) -> Result<()> {
        self.handle.close()
    }

    /// Reopens the file with a new access mode and rebinds every live node.
    ///
    /// Must not be called while a write is in flight. Nodes whose object no
    /// longer exists stay stale.
    ///
    /// # Errors
    /// Returns the backend error if the file cannot be reopened.
    pub fn reopen(&self, access: FileAccess) -> Result<()> {
        let session = &self.handle.session;
        debug!(
            "reopening {} (readonly={}, swmr={})",
            session.file_name(),
            access.readonly,
            access.swmr
        );
        session
            .lock()
            .reopen_file(&session.backend, &session.path, access)
    }

    /// Access mode of the last open or reopen.
    #[must_use]
    pub fn access(&self) -> FileAccess {
        self.handle.lock().access()
    }
}

impl<B: Backend> Node for File<B> {
    fn name(&self) -> String {
        File::name(self)
    }

    fn path(&self) -> String {
        "/".to_string()
    }

    fn is_valid(&self) -> bool {
        File::is_valid(self)
    }

    fn close(&self) -> Result<()> {
        File::close(self)
    }

    /// Reopens with the access mode of the last open.
    fn reopen(&self) -> Result<()> {
        File::reopen(self, self.access())
    }
}

impl<B: Backend> Drop for File<B> {
    fn drop(&mut self) {
        if let Err(err) = self.handle.close() {
            warn!("closing {} failed: {err}", self.name());
        }
    }
}

/// Object found under a name.
pub enum Entry<B: Backend> {
    Group(Group<B>),
    Field(Field<B>),
    Link(Link<B>),
}

impl<B: Backend> Entry<B> {
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Entry::Group(group) => group.name(),
            Entry::Field(field) => field.name(),
            Entry::Link(link) => link.name(),
        }
    }

    /// # Errors
    /// Returns [`Error::NotFound`] if the entry is not a group.
    pub fn into_group(self) -> Result<Group<B>> {
        match self {
            Entry::Group(group) => Ok(group),
            other => Err(Error::NotFound(format!("{} is not a group", other.name()))),
        }
    }

    /// # Errors
    /// Returns [`Error::NotFound`] if the entry is not a field.
    pub fn into_field(self) -> Result<Field<B>> {
        match self {
            Entry::Field(field) => Ok(field),
            other => Err(Error::NotFound(format!("{} is not a field", other.name()))),
        }
    }
}

/// Container of named fields, groups and links.
pub struct Group<B: Backend> {
    handle: Handle<B>,
}

impl<B: Backend> Group<B> {
    /// Opens a child; soft links are followed to their target.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown name.
    pub fn open(&self, name: &str) -> Result<Entry<B>> {
        let mut tree = self.handle.lock();
        let raw = self.handle.backend().open(tree.group(self.handle.id)?, name)?;
        let (kind, binding) = match raw {
            RawEntry::Group(group) => (Kind::Group, Binding::Group(group)),
            RawEntry::Field(field) => (Kind::Field, Binding::Field(field)),
            RawEntry::Link(link) => (Kind::Link, Binding::Link(link)),
        };
        let handle = self.handle.child(tree.insert(self.handle.id, kind, name, binding)?);
        Ok(match kind {
            Kind::Group => Entry::Group(Group { handle }),
            Kind::Field => Entry::Field(Field { handle }),
            _ => Entry::Link(Link { handle }),
        })
    }

    /// Creates a sub-group, writing `NX_class` when `nxclass` is not empty.
    ///
    /// # Errors
    /// Returns [`Error::ObjectCreate`] if the backend refuses.
    pub fn create_group(&self, name: &str, nxclass: &str) -> Result<Group<B>> {
        let group = {
            let mut tree = self.handle.lock();
            let native = self
                .handle
                .backend()
                .create_group(tree.group(self.handle.id)?, name)
                .map_err(|e| Error::creation("group", name, e))?;
            let id = tree.insert(self.handle.id, Kind::Group, name, Binding::Group(native))?;
            Group {
                handle: self.handle.child(id),
            }
        };
        if !nxclass.is_empty() {
            group.attributes()?.write_str("NX_class", nxclass)?;
        }
        Ok(group)
    }

    /// Creates a field.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedType`] for a type the backend cannot store,
    /// [`Error::ObjectCreate`] for any other refusal.
    pub fn create_field(&self, name: &str, spec: &FieldSpec) -> Result<Field<B>> {
        let mut tree = self.handle.lock();
        let native = self
            .handle
            .backend()
            .create_field(tree.group(self.handle.id)?, name, spec)
            .map_err(|e| Error::creation("field", name, e))?;
        let id = tree.insert(self.handle.id, Kind::Field, name, Binding::Field(native))?;
        Ok(Field {
            handle: self.handle.child(id),
        })
    }

    /// Creates a link to `target` (`"/path"` or `"file:/path"`).
    ///
    /// # Errors
    /// Returns [`Error::ObjectCreate`] if the backend refuses.
    pub fn link(&self, target: &str, name: &str) -> Result<Link<B>> {
        let target: LinkTarget = target
            .parse()
            .map_err(|e| Error::creation("link", name, e))?;
        let mut tree = self.handle.lock();
        let native = self
            .handle
            .backend()
            .create_link(tree.group(self.handle.id)?, name, &target)
            .map_err(|e| Error::creation("link", name, e))?;
        let id = tree.insert(self.handle.id, Kind::Link, name, Binding::Link(native))?;
        Ok(Link {
            handle: self.handle.child(id),
        })
    }

    /// Every link stored directly in this group.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed group or the backend error.
    pub fn links(&self) -> Result<Vec<Link<B>>> {
        let names = {
            let tree = self.handle.lock();
            self.handle.backend().link_names(tree.group(self.handle.id)?)?
        };
        names.iter().map(|name| self.open_link(name)).collect()
    }

    /// Opens the link `name` itself rather than its target.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if `name` is not a link.
    pub fn open_link(&self, name: &str) -> Result<Link<B>> {
        let mut tree = self.handle.lock();
        let native = self
            .handle
            .backend()
            .open_link(tree.group(self.handle.id)?, name)?;
        let id = tree.insert(self.handle.id, Kind::Link, name, Binding::Link(native))?;
        Ok(Link {
            handle: self.handle.child(id),
        })
    }

    /// Child names in backend order.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed group or the backend error.
    pub fn names(&self) -> Result<Vec<String>> {
        let tree = self.handle.lock();
        self.handle.backend().names(tree.group(self.handle.id)?)
    }

    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed group or the backend error.
    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.names()?.iter().any(|n| n == name))
    }

    /// Number of children.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed group or the backend error.
    pub fn size(&self) -> Result<usize> {
        Ok(self.names()?.len())
    }

    /// Opens every child in backend order.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed group or the backend error.
    pub fn iter(&self) -> Result<impl Iterator<Item = Result<Entry<B>>> + '_> {
        Ok(self.names()?.into_iter().map(move |name| self.open(&name)))
    }

    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed group.
    pub fn attributes(&self) -> Result<AttributeManager<B>> {
        self.handle.attributes()
    }
}

/// Typed, shaped dataset.
pub struct Field<B: Backend> {
    handle: Handle<B>,
}

impl<B: Backend> Field<B> {
    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed field or the backend error.
    pub fn dtype(&self) -> Result<TypeCode> {
        let tree = self.handle.lock();
        self.handle.backend().field_dtype(tree.field(self.handle.id)?)
    }

    /// Current extent of every dimension.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed field or the backend error.
    pub fn shape(&self) -> Result<Vec<usize>> {
        let tree = self.handle.lock();
        self.handle.backend().field_shape(tree.field(self.handle.id)?)
    }

    /// Number of elements.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed field or the backend error.
    pub fn size(&self) -> Result<usize> {
        Ok(self.shape()?.iter().product())
    }

    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed field or the backend error.
    pub fn chunk(&self) -> Result<Option<Vec<usize>>> {
        let tree = self.handle.lock();
        self.handle.backend().field_chunk(tree.field(self.handle.id)?)
    }

    /// Compression filter fixed at creation.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed field or the backend error.
    pub fn filter(&self) -> Result<Option<Deflate>> {
        let tree = self.handle.lock();
        self.handle.backend().field_filter(tree.field(self.handle.id)?)
    }

    /// Lengthens dimension `dim` by `extent`. Never shrinks.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSelection`] for a dimension beyond the rank,
    /// [`Error::StaleHandle`] on a closed field or the backend error.
    pub fn grow(&self, dim: usize, extent: usize) -> Result<()> {
        let tree = self.handle.lock();
        let backend = self.handle.backend();
        let field = tree.field(self.handle.id)?;
        let mut shape = backend.field_shape(field)?;
        let rank = shape.len();
        let len = shape.get_mut(dim).ok_or_else(|| {
            Error::InvalidSelection(format!("cannot grow dimension {dim} of a rank {rank} field"))
        })?;
        if extent == 0 {
            return Ok(());
        }
        *len += extent;
        debug!("growing {} to {shape:?}", tree.slot(self.handle.id)?.path);
        backend.resize(field, &shape)
    }

    /// Whole-field read.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed field or the backend error.
    pub fn read(&self) -> Result<Value> {
        self.read_slice(&Slice::All)
    }

    /// Whole-field write; a single-element value fills the field.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if the element counts differ,
    /// [`Error::Conversion`] if the value cannot be cast to the field type.
    pub fn write(&self, value: &Value) -> Result<()> {
        self.write_slice(&Slice::All, value)
    }

    /// # Errors
    /// Returns [`Error::InvalidSelection`] for a selection outside the extent.
    pub fn read_slice(&self, slice: &Slice) -> Result<Value> {
        let tree = self.handle.lock();
        let backend = self.handle.backend();
        let field = tree.field(self.handle.id)?;
        let selection = checked_selection(slice, &backend.field_shape(field)?)?;
        backend.read_field(field, selection.as_ref())
    }

    /// Writes `value`, cast to the field type, into the selected region.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSelection`] for a selection outside the extent,
    /// [`Error::ShapeMismatch`] if the element counts differ and
    /// [`Error::Conversion`] if the cast fails.
    pub fn write_slice(&self, slice: &Slice, value: &Value) -> Result<()> {
        let tree = self.handle.lock();
        let backend = self.handle.backend();
        let field = tree.field(self.handle.id)?;
        let shape = backend.field_shape(field)?;
        let selection = checked_selection(slice, &shape)?;
        let selected = selection
            .as_ref()
            .map_or_else(|| shape.iter().product(), Hyperslab::len);
        check_count(selected, value)?;
        let value = value.cast(backend.field_dtype(field)?)?;
        backend.write_field(field, selection.as_ref(), &value)
    }

    /// Re-reads cached metadata.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed field or the backend error.
    pub fn refresh(&self) -> Result<()> {
        let tree = self.handle.lock();
        self.handle.backend().refresh_field(tree.field(self.handle.id)?)
    }

    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed field.
    pub fn attributes(&self) -> Result<AttributeManager<B>> {
        self.handle.attributes()
    }
}

fn checked_selection(slice: &Slice, shape: &[usize]) -> Result<Option<Hyperslab>> {
    let selection = Hyperslab::from_slice(slice, shape)?;
    if let Some(selection) = &selection {
        selection.check_bounds(shape)?;
    }
    Ok(selection)
}

fn check_count(selected: usize, value: &Value) -> Result<()> {
    if value.len() == selected || value.len() == 1 {
        Ok(())
    } else {
        Err(Error::ShapeMismatch(format!(
            "cannot write {} elements into a selection of {selected}",
            value.len()
        )))
    }
}

/// Named reference to an object, possibly in another file.
pub struct Link<B: Backend> {
    handle: Handle<B>,
}

impl<B: Backend> Link<B> {
    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed link or the backend error.
    pub fn target(&self) -> Result<LinkTarget> {
        let tree = self.handle.lock();
        self.handle.backend().link_target(tree.link(self.handle.id)?)
    }

    /// Target as `"<filename>:/<object_path>"`, using this file's name for
    /// links inside the same file.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed link or the backend error.
    pub fn target_path(&self) -> Result<String> {
        let target = self.target()?;
        let file = target
            .file
            .unwrap_or_else(|| self.handle.session.file_name());
        Ok(format!("{file}:{}", target.path))
    }
}

/// Named attributes of a group or field.
pub struct AttributeManager<B: Backend> {
    handle: Handle<B>,
}

impl<B: Backend> AttributeManager<B> {
    /// Creates an attribute; an existing one is replaced only with `overwrite`.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateAttribute`] if `name` exists and `overwrite`
    /// is false, [`Error::ObjectCreate`] if the backend refuses.
    pub fn create(
        &self,
        name: &str,
        dtype: TypeCode,
        shape: &[usize],
        overwrite: bool,
    ) -> Result<Attribute<B>> {
        let mut tree = self.handle.lock();
        let backend = self.handle.backend();
        let exists = backend
            .attribute_names(tree.location(self.handle.id)?)?
            .iter()
            .any(|n| n == name);
        if exists {
            if !overwrite {
                return Err(Error::DuplicateAttribute(name.to_string()));
            }
            backend.delete_attribute(tree.location(self.handle.id)?, name)?;
        }
        let native = backend
            .create_attribute(tree.location(self.handle.id)?, name, dtype, shape)
            .map_err(|e| Error::creation("attribute", name, e))?;
        let id = tree.insert(self.handle.id, Kind::Attribute, name, Binding::Attribute(native))?;
        Ok(Attribute {
            handle: self.handle.child(id),
        })
    }

    /// Attribute names in backend order.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] when the owner is not open.
    pub fn names(&self) -> Result<Vec<String>> {
        let tree = self.handle.lock();
        self.handle
            .backend()
            .attribute_names(tree.location(self.handle.id)?)
    }

    /// # Errors
    /// Returns [`Error::StaleHandle`] when the owner is not open.
    pub fn len(&self) -> Result<usize> {
        Ok(self.names()?.len())
    }

    /// # Errors
    /// Returns [`Error::StaleHandle`] when the owner is not open.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// # Errors
    /// Returns [`Error::StaleHandle`] when the owner is not open.
    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.names()?.iter().any(|n| n == name))
    }

    /// Opens an attribute by name.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown name.
    pub fn get(&self, name: &str) -> Result<Attribute<B>> {
        let mut tree = self.handle.lock();
        let native = self
            .handle
            .backend()
            .open_attribute(tree.location(self.handle.id)?, name)?;
        let id = tree.insert(self.handle.id, Kind::Attribute, name, Binding::Attribute(native))?;
        Ok(Attribute {
            handle: self.handle.child(id),
        })
    }

    /// Opens the attribute at `index` in backend order.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an index past the end.
    pub fn get_at(&self, index: usize) -> Result<Attribute<B>> {
        let names = self.names()?;
        let name = names.get(index).ok_or_else(|| {
            Error::NotFound(format!("attribute index {index} of {}", names.len()))
        })?;
        self.get(name)
    }

    /// Reads an attribute by name.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown name.
    pub fn read(&self, name: &str) -> Result<Value> {
        self.get(name)?.read()
    }

    /// Reads a string attribute, if present.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] when the owner is not open.
    pub fn read_str(&self, name: &str) -> Result<Option<String>> {
        if !self.exists(name)? {
            return Ok(None);
        }
        Ok(self.read(name)?.first().map(|scalar| scalar.to_string()))
    }

    /// Creates or replaces `name` with the type and shape of `value`.
    ///
    /// # Errors
    /// Returns [`Error::ObjectCreate`] if the backend refuses.
    pub fn set(&self, name: &str, value: &Value) -> Result<()> {
        let attribute = self.create(name, value.type_code(), value.shape(), true)?;
        attribute.write(value)
    }

    /// Creates or replaces a scalar string attribute.
    ///
    /// # Errors
    /// Returns [`Error::ObjectCreate`] if the backend refuses.
    pub fn write_str(&self, name: &str, value: &str) -> Result<()> {
        self.set(name, &Value::from(value))
    }
}

/// Named, typed scalar or small array attached to a group or field.
pub struct Attribute<B: Backend> {
    handle: Handle<B>,
}

impl<B: Backend> Attribute<B> {
    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed attribute or the backend error.
    pub fn dtype(&self) -> Result<TypeCode> {
        let tree = self.handle.lock();
        self.handle
            .backend()
            .attribute_dtype(tree.attribute(self.handle.id)?)
    }

    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed attribute or the backend error.
    pub fn shape(&self) -> Result<Vec<usize>> {
        let tree = self.handle.lock();
        self.handle
            .backend()
            .attribute_shape(tree.attribute(self.handle.id)?)
    }

    /// # Errors
    /// Returns [`Error::StaleHandle`] on a closed attribute or the backend error.
    pub fn read(&self) -> Result<Value> {
        self.read_slice(&Slice::All)
    }

    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if the element counts differ.
    pub fn write(&self, value: &Value) -> Result<()> {
        self.write_slice(&Slice::All, value)
    }

    /// # Errors
    /// Returns [`Error::InvalidSelection`] for a selection outside the extent.
    pub fn read_slice(&self, slice: &Slice) -> Result<Value> {
        let tree = self.handle.lock();
        let backend = self.handle.backend();
        let attribute = tree.attribute(self.handle.id)?;
        let selection = checked_selection(slice, &backend.attribute_shape(attribute)?)?;
        backend.read_attribute(attribute, selection.as_ref())
    }

    /// # Errors
    /// Returns [`Error::InvalidSelection`] for a selection outside the extent,
    /// [`Error::ShapeMismatch`] if the element counts differ.
    pub fn write_slice(&self, slice: &Slice, value: &Value) -> Result<()> {
        let tree = self.handle.lock();
        let backend = self.handle.backend();
        let attribute = tree.attribute(self.handle.id)?;
        let shape = backend.attribute_shape(attribute)?;
        let selection = checked_selection(slice, &shape)?;
        let selected = selection
            .as_ref()
            .map_or_else(|| shape.iter().product(), Hyperslab::len);
        check_count(selected, value)?;
        let value = value.cast(backend.attribute_dtype(attribute)?)?;
        backend.write_attribute(attribute, selection.as_ref(), &value)
    }

    /// Owning group's or field's path.
    #[must_use]
    pub fn owner_path(&self) -> Option<String> {
        let tree = self.handle.lock();
        let manager = tree.parent(self.handle.id)?;
        tree.slot(manager).ok().map(|slot| slot.path.clone())
    }
}
