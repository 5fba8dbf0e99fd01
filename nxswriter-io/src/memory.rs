//! In-memory container backend.
//!
//! Files live in a store shared by clones of the backend, so a file closed
//! and opened again keeps its content for the lifetime of the store. Type
//! tags go through a native class/size table the same way a library-backed
//! adapter would.

use crate::backend::{
    Backend, Deflate, FieldSpec, FileAccess, LibVersion, LinkTarget, Location, RawEntry,
};
use crate::tree::child_path;
use nxswriter_core::{Error, Hyperslab, Result, TypeCode, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Storage class of a native type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeClass {
    Integer,
    Unsigned,
    Float,
    Boolean,
    String,
}

/// Native element type: class plus width in bytes (0 for variable-length strings).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NativeType {
    pub class: TypeClass,
    pub size: u8,
}

const fn native(class: TypeClass, size: u8) -> NativeType {
    NativeType { class, size }
}

/// Concrete tags come first so the reverse lookup never yields an alias.
const NATIVE_TYPES: [(TypeCode, NativeType); 16] = [
    (TypeCode::String, native(TypeClass::String, 0)),
    (TypeCode::Bool, native(TypeClass::Boolean, 1)),
    (TypeCode::Int8, native(TypeClass::Integer, 1)),
    (TypeCode::Int16, native(TypeClass::Integer, 2)),
    (TypeCode::Int32, native(TypeClass::Integer, 4)),
    (TypeCode::Int64, native(TypeClass::Integer, 8)),
    (TypeCode::UInt8, native(TypeClass::Unsigned, 1)),
    (TypeCode::UInt16, native(TypeClass::Unsigned, 2)),
    (TypeCode::UInt32, native(TypeClass::Unsigned, 4)),
    (TypeCode::UInt64, native(TypeClass::Unsigned, 8)),
    (TypeCode::Float16, native(TypeClass::Float, 2)),
    (TypeCode::Float32, native(TypeClass::Float, 4)),
    (TypeCode::Float64, native(TypeClass::Float, 8)),
    (TypeCode::Long, native(TypeClass::Integer, 8)),
    (TypeCode::UInt, native(TypeClass::Unsigned, 8)),
    (TypeCode::Float, native(TypeClass::Float, 8)),
];

/// Native type for a portable tag.
///
/// # Errors
/// Returns [`Error::UnsupportedType`] for a tag missing from the table.
pub fn native_type(code: TypeCode) -> Result<NativeType> {
    NATIVE_TYPES
        .iter()
        .find(|(tag, _)| *tag == code)
        .map(|(_, native)| *native)
        .ok_or_else(|| Error::UnsupportedType(code.to_string()))
}

/// Portable tag for a native type.
///
/// # Errors
/// Returns [`Error::UnsupportedType`] for a type missing from the table.
pub fn portable_type(native: NativeType) -> Result<TypeCode> {
    NATIVE_TYPES
        .iter()
        .find(|(_, n)| *n == native)
        .map(|(tag, _)| *tag)
        .ok_or_else(|| Error::UnsupportedType(format!("{native:?}")))
}

struct MemAttribute {
    dtype: NativeType,
    data: Value,
}

#[derive(Default)]
struct Attributes {
    entries: Vec<(String, MemAttribute)>,
}

impl Attributes {
    fn get(&self, name: &str) -> Option<&MemAttribute> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut MemAttribute> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a)
    }
}

enum Object {
    Group {
        children: Vec<String>,
        attributes: Attributes,
    },
    Dataset {
        dtype: NativeType,
        data: Value,
        chunk: Vec<usize>,
        filter: Option<Deflate>,
        attributes: Attributes,
    },
    Link(LinkTarget),
}

impl Object {
    fn new_group() -> Self {
        Object::Group {
            children: Vec::new(),
            attributes: Attributes::default(),
        }
    }

    fn attributes(&self) -> Option<&Attributes> {
        match self {
            Object::Group { attributes, .. } | Object::Dataset { attributes, .. } => {
                Some(attributes)
            }
            Object::Link(_) => None,
        }
    }

    fn attributes_mut(&mut self) -> Option<&mut Attributes> {
        match self {
            Object::Group { attributes, .. } | Object::Dataset { attributes, .. } => {
                Some(attributes)
            }
            Object::Link(_) => None,
        }
    }
}

struct MemFile {
    objects: BTreeMap<String, Object>,
}

impl MemFile {
    fn new() -> Self {
        let mut objects = BTreeMap::new();
        objects.insert("/".to_string(), Object::new_group());
        Self { objects }
    }

    fn object(&self, path: &str) -> Result<&Object> {
        self.objects
            .get(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    fn object_mut(&mut self, path: &str) -> Result<&mut Object> {
        self.objects
            .get_mut(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    fn children(&self, path: &str) -> Result<&Vec<String>> {
        match self.object(path)? {
            Object::Group { children, .. } => Ok(children),
            _ => Err(Error::NotFound(format!("{path} is not a group"))),
        }
    }

    /// Adds a new object under `parent`, failing if the name is taken.
    fn add_child(&mut self, parent: &str, name: &str, object: Object) -> Result<String> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::Backend(format!("invalid object name '{name}'")));
        }
        let path = child_path(parent, name);
        if self.objects.contains_key(&path) {
            return Err(Error::Backend(format!("{path} already exists")));
        }
        match self.object_mut(parent)? {
            Object::Group { children, .. } => children.push(name.to_string()),
            _ => return Err(Error::NotFound(format!("{parent} is not a group"))),
        }
        self.objects.insert(path.clone(), object);
        Ok(path)
    }

    /// Follows soft links inside this file.
    fn resolve(&self, path: &str) -> Result<String> {
        let mut current = path.to_string();
        for _ in 0..16 {
            match self.object(&current)? {
                Object::Link(LinkTarget { file: None, path }) => current.clone_from(path),
                _ => return Ok(current),
            }
        }
        Err(Error::NotFound(format!("link cycle at {path}")))
    }
}

type SharedFile = Arc<Mutex<MemFile>>;

fn lock(file: &SharedFile) -> MutexGuard<'_, MemFile> {
    file.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Open file handle.
pub struct MemoryFile {
    file: SharedFile,
    readonly: bool,
    libver: LibVersion,
}

/// Group or field handle.
pub struct MemoryObject {
    file: SharedFile,
    path: String,
    readonly: bool,
}

impl MemoryObject {
    fn child(&self, path: String) -> Self {
        Self {
            file: Arc::clone(&self.file),
            path,
            readonly: self.readonly,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            Err(Error::ReadOnly(self.path.clone()))
        } else {
            Ok(())
        }
    }
}

/// Link handle.
pub struct MemoryLink {
    file: SharedFile,
    path: String,
}

/// Attribute handle.
pub struct MemoryAttribute {
    file: SharedFile,
    owner: String,
    name: String,
    readonly: bool,
}

/// Container backend holding every file in memory.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    store: Arc<Mutex<HashMap<PathBuf, SharedFile>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a file exists in the store.
    #[must_use]
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path.as_ref())
    }

    /// Drops a file from the store.
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path.as_ref())
            .is_some()
    }
}

fn owner_of<'a>(owner: &Location<'a, MemoryBackend>) -> &'a MemoryObject {
    match owner {
        Location::Group(group) => group,
        Location::Field(field) => field,
    }
}

fn read_value(data: &Value, selection: Option<&Hyperslab>) -> Result<Value> {
    match selection {
        None => Ok(data.clone()),
        Some(selection) => data.gather(&selection.all_positions()),
    }
}

fn write_value(data: &mut Value, selection: Option<&Hyperslab>, value: &Value) -> Result<()> {
    let selection = selection
        .cloned()
        .unwrap_or_else(|| Hyperslab::whole(data.shape()));
    data.scatter(&selection.all_positions(), value)
}

impl Backend for MemoryBackend {
    type File = MemoryFile;
    type Group = MemoryObject;
    type Field = MemoryObject;
    type Link = MemoryLink;
    type Attribute = MemoryAttribute;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn create_file(&self, path: &Path, overwrite: bool, libver: LibVersion) -> Result<MemoryFile> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        if store.contains_key(path) && !overwrite {
            return Err(Error::Backend(format!("{} already exists", path.display())));
        }
        let file = Arc::new(Mutex::new(MemFile::new()));
        store.insert(path.to_path_buf(), Arc::clone(&file));
        Ok(MemoryFile {
            file,
            readonly: false,
            libver,
        })
    }

    fn open_file(&self, path: &Path, access: FileAccess) -> Result<MemoryFile> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let file = store
            .get(path)
            .ok_or_else(|| Error::NotFound(format!("file {}", path.display())))?;
        let libver = if access.swmr {
            LibVersion::Latest
        } else {
            access.libver
        };
        Ok(MemoryFile {
            file: Arc::clone(file),
            readonly: access.readonly,
            libver,
        })
    }

    fn close_file(&self, _file: MemoryFile) -> Result<()> {
        Ok(())
    }

    fn flush(&self, _file: &MemoryFile) -> Result<()> {
        Ok(())
    }

    fn is_readonly(&self, file: &MemoryFile) -> bool {
        file.readonly
    }

    fn libver(&self, file: &MemoryFile) -> Result<LibVersion> {
        Ok(file.libver)
    }

    fn root(&self, file: &MemoryFile) -> Result<MemoryObject> {
        Ok(MemoryObject {
            file: Arc::clone(&file.file),
            path: "/".to_string(),
            readonly: file.readonly,
        })
    }

    fn create_group(&self, parent: &MemoryObject, name: &str) -> Result<MemoryObject> {
        parent.check_writable()?;
        let path = lock(&parent.file).add_child(&parent.path, name, Object::new_group())?;
        Ok(parent.child(path))
    }

    fn open(&self, parent: &MemoryObject, name: &str) -> Result<RawEntry<Self>> {
        let path = child_path(&parent.path, name);
        let file = lock(&parent.file);
        if let Object::Link(target) = file.object(&path)? {
            if target.file.is_some() || file.resolve(&path).is_err() {
                return Ok(RawEntry::Link(MemoryLink {
                    file: Arc::clone(&parent.file),
                    path,
                }));
            }
        }
        let resolved = file.resolve(&path)?;
        Ok(match file.object(&resolved)? {
            Object::Group { .. } => RawEntry::Group(parent.child(resolved)),
            Object::Dataset { .. } => RawEntry::Field(parent.child(resolved)),
            Object::Link(_) => RawEntry::Link(MemoryLink {
                file: Arc::clone(&parent.file),
                path,
            }),
        })
    }

    fn create_field(&self, parent: &MemoryObject, name: &str, spec: &FieldSpec) -> Result<MemoryObject> {
        parent.check_writable()?;
        let dtype = native_type(spec.dtype)?;
        let shape = spec.initial_shape();
        let dataset = Object::Dataset {
            dtype,
            data: Value::zeros(spec.dtype, &shape),
            chunk: spec.chunk_shape(),
            filter: spec.filter,
            attributes: Attributes::default(),
        };
        let path = lock(&parent.file).add_child(&parent.path, name, dataset)?;
        Ok(parent.child(path))
    }

    fn names(&self, group: &MemoryObject) -> Result<Vec<String>> {
        Ok(lock(&group.file).children(&group.path)?.clone())
    }

    fn link_names(&self, group: &MemoryObject) -> Result<Vec<String>> {
        let file = lock(&group.file);
        Ok(file
            .children(&group.path)?
            .iter()
            .filter(|name| {
                matches!(
                    file.objects.get(&child_path(&group.path, name)),
                    Some(Object::Link(_))
                )
            })
            .cloned()
            .collect())
    }

    fn create_link(&self, parent: &MemoryObject, name: &str, target: &LinkTarget) -> Result<MemoryLink> {
        parent.check_writable()?;
        let path = lock(&parent.file).add_child(&parent.path, name, Object::Link(target.clone()))?;
        Ok(MemoryLink {
            file: Arc::clone(&parent.file),
            path,
        })
    }

    fn open_link(&self, parent: &MemoryObject, name: &str) -> Result<MemoryLink> {
        let path = child_path(&parent.path, name);
        match lock(&parent.file).object(&path)? {
            Object::Link(_) => Ok(MemoryLink {
                file: Arc::clone(&parent.file),
                path,
            }),
            _ => Err(Error::NotFound(format!("{path} is not a link"))),
        }
    }

    fn link_target(&self, link: &MemoryLink) -> Result<LinkTarget> {
        match lock(&link.file).object(&link.path)? {
            Object::Link(target) => Ok(target.clone()),
            _ => Err(Error::NotFound(format!("{} is not a link", link.path))),
        }
    }

    fn field_dtype(&self, field: &MemoryObject) -> Result<TypeCode> {
        match lock(&field.file).object(&field.path)? {
            Object::Dataset { dtype, .. } => portable_type(*dtype),
            _ => Err(Error::NotFound(format!("{} is not a field", field.path))),
        }
    }

    fn field_shape(&self, field: &MemoryObject) -> Result<Vec<usize>> {
        match lock(&field.file).object(&field.path)? {
            Object::Dataset { data, .. } => Ok(data.shape().to_vec()),
            _ => Err(Error::NotFound(format!("{} is not a field", field.path))),
        }
    }

    fn field_chunk(&self, field: &MemoryObject) -> Result<Option<Vec<usize>>> {
        match lock(&field.file).object(&field.path)? {
            Object::Dataset { chunk, .. } => Ok(Some(chunk.clone())),
            _ => Err(Error::NotFound(format!("{} is not a field", field.path))),
        }
    }

    fn field_filter(&self, field: &MemoryObject) -> Result<Option<Deflate>> {
        match lock(&field.file).object(&field.path)? {
            Object::Dataset { filter, .. } => Ok(*filter),
            _ => Err(Error::NotFound(format!("{} is not a field", field.path))),
        }
    }

    fn resize(&self, field: &MemoryObject, shape: &[usize]) -> Result<()> {
        field.check_writable()?;
        match lock(&field.file).object_mut(&field.path)? {
            Object::Dataset { data, .. } => {
                if data.ndim() != shape.len() {
                    return Err(Error::Backend(format!(
                        "cannot resize a rank {} field to {shape:?}",
                        data.ndim()
                    )));
                }
                *data = data.resized(shape);
                Ok(())
            }
            _ => Err(Error::NotFound(format!("{} is not a field", field.path))),
        }
    }

    fn read_field(&self, field: &MemoryObject, selection: Option<&Hyperslab>) -> Result<Value> {
        match lock(&field.file).object(&field.path)? {
            Object::Dataset { data, .. } => read_value(data, selection),
            _ => Err(Error::NotFound(format!("{} is not a field", field.path))),
        }
    }

    fn write_field(&self, field: &MemoryObject, selection: Option<&Hyperslab>, value: &Value) -> Result<()> {
        field.check_writable()?;
        match lock(&field.file).object_mut(&field.path)? {
            Object::Dataset { data, .. } => write_value(data, selection, value),
            _ => Err(Error::NotFound(format!("{} is not a field", field.path))),
        }
    }

    fn attribute_names(&self, owner: Location<'_, Self>) -> Result<Vec<String>> {
        let owner = owner_of(&owner);
        let file = lock(&owner.file);
        let attributes = file
            .object(&owner.path)?
            .attributes()
            .ok_or_else(|| Error::NotFound(format!("{} has no attributes", owner.path)))?;
        Ok(attributes.entries.iter().map(|(name, _)| name.clone()).collect())
    }

    fn create_attribute(
        &self,
        owner: Location<'_, Self>,
        name: &str,
        dtype: TypeCode,
        shape: &[usize],
    ) -> Result<MemoryAttribute> {
        let owner = owner_of(&owner);
        owner.check_writable()?;
        let native = native_type(dtype)?;
        let mut file = lock(&owner.file);
        let attributes = file
            .object_mut(&owner.path)?
            .attributes_mut()
            .ok_or_else(|| Error::NotFound(format!("{} has no attributes", owner.path)))?;
        if attributes.get(name).is_some() {
            return Err(Error::Backend(format!("attribute {name} already exists")));
        }
        attributes.entries.push((
            name.to_string(),
            MemAttribute {
                dtype: native,
                data: Value::zeros(dtype, shape),
            },
        ));
        Ok(MemoryAttribute {
            file: Arc::clone(&owner.file),
            owner: owner.path.clone(),
            name: name.to_string(),
            readonly: owner.readonly,
        })
    }

    fn open_attribute(&self, owner: Location<'_, Self>, name: &str) -> Result<MemoryAttribute> {
        let owner = owner_of(&owner);
        let file = lock(&owner.file);
        file.object(&owner.path)?
            .attributes()
            .and_then(|attributes| attributes.get(name))
            .ok_or_else(|| Error::NotFound(format!("attribute {name} of {}", owner.path)))?;
        Ok(MemoryAttribute {
            file: Arc::clone(&owner.file),
            owner: owner.path.clone(),
            name: name.to_string(),
            readonly: owner.readonly,
        })
    }

    fn delete_attribute(&self, owner: Location<'_, Self>, name: &str) -> Result<()> {
        let owner = owner_of(&owner);
        owner.check_writable()?;
        let mut file = lock(&owner.file);
        if let Some(attributes) = file.object_mut(&owner.path)?.attributes_mut() {
            attributes.entries.retain(|(n, _)| n != name);
        }
        Ok(())
    }

    fn attribute_dtype(&self, attribute: &MemoryAttribute) -> Result<TypeCode> {
        with_attribute(attribute, |a| portable_type(a.dtype))
    }

    fn attribute_shape(&self, attribute: &MemoryAttribute) -> Result<Vec<usize>> {
        with_attribute(attribute, |a| Ok(a.data.shape().to_vec()))
    }

    fn read_attribute(&self, attribute: &MemoryAttribute, selection: Option<&Hyperslab>) -> Result<Value> {
        with_attribute(attribute, |a| read_value(&a.data, selection))
    }

    fn write_attribute(
        &self,
        attribute: &MemoryAttribute,
        selection: Option<&Hyperslab>,
        value: &Value,
    ) -> Result<()> {
        if attribute.readonly {
            return Err(Error::ReadOnly(format!("{}@{}", attribute.owner, attribute.name)));
        }
        let mut file = lock(&attribute.file);
        let target = file
            .object_mut(&attribute.owner)?
            .attributes_mut()
            .and_then(|attributes| attributes.get_mut(&attribute.name))
            .ok_or_else(|| Error::NotFound(format!("attribute {}", attribute.name)))?;
        write_value(&mut target.data, selection, value)
    }
}

fn with_attribute<T>(attribute: &MemoryAttribute, f: impl FnOnce(&MemAttribute) -> Result<T>) -> Result<T> {
    let file = lock(&attribute.file);
    let found = file
        .object(&attribute.owner)?
        .attributes()
        .and_then(|attributes| attributes.get(&attribute.name))
        .ok_or_else(|| Error::NotFound(format!("attribute {}", attribute.name)))?;
    f(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_table_roundtrip() {
        for code in TypeCode::ALL {
            let native = native_type(code).unwrap();
            assert_eq!(portable_type(native).unwrap(), code.canonical());
        }
    }

    #[test]
    fn test_unknown_native_type() {
        let err = portable_type(native(TypeClass::Float, 16)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType(_)));
    }

    #[test]
    fn test_store_survives_close() {
        let backend = MemoryBackend::new();
        let path = Path::new("scan.nxs");
        let file = backend.create_file(path, false, LibVersion::Earliest).unwrap();
        backend.close_file(file).unwrap();
        assert!(backend.contains(path));
        assert!(backend.create_file(path, false, LibVersion::Earliest).is_err());
        assert!(backend.create_file(path, true, LibVersion::Earliest).is_ok());
        assert!(backend.open_file(Path::new("other.nxs"), FileAccess::default()).is_err());
    }
}
