//! HDF5 container backend.

use crate::backend::{
    Backend, Deflate, FieldSpec, FileAccess, LibVersion, LinkTarget, Location, RawEntry,
};
use crate::tree::child_path;
use half::f16;
use hdf5::filters::Filter;
use hdf5::plist::file_access::LibraryVersion;
use hdf5::types::{FloatSize, H5Type, IntSize, TypeDescriptor, VarLenUnicode};
use hdf5::{Container, Dataset, Extent, Extents, LinkType, LocationType, SimpleExtents, SliceOrIndex};
use log::debug;
use ndarray::{ArrayD, IxDyn};
use nxswriter_core::{Error, Hyperslab, Result, TypeCode, Value};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

fn h5(err: hdf5::Error) -> Error {
    Error::Backend(err.to_string())
}

/// Link handle: the group holding the link and the link name.
pub struct Hdf5Link {
    parent: hdf5::Group,
    name: String,
}

impl Hdf5Link {
    fn key(&self) -> (String, String) {
        (self.parent.filename(), child_path(&self.parent.name(), &self.name))
    }
}

/// Backend writing HDF5 files through the `hdf5` crate.
///
/// The high-level library cannot read a link value back, so targets of
/// links created through this backend are remembered per file.
#[derive(Default)]
pub struct Hdf5Backend {
    links: Mutex<HashMap<(String, String), LinkTarget>>,
}

impl Hdf5Backend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn remembered(&self, key: &(String, String)) -> Option<LinkTarget> {
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

fn file_builder(libver: LibVersion) -> hdf5::FileBuilder {
    let mut builder = hdf5::File::with_options();
    match libver {
        LibVersion::Earliest => builder.with_fapl(|p| p.libver_earliest()),
        LibVersion::Latest => builder.with_fapl(|p| p.libver_latest()),
    };
    builder
}

fn owner<'a>(owner: &Location<'a, Hdf5Backend>) -> &'a hdf5::Location {
    match owner {
        Location::Group(group) => group,
        Location::Field(field) => field,
    }
}

fn extents(shape: &[usize], resizable: bool) -> Extents {
    if shape.is_empty() {
        Extents::Scalar
    } else if resizable {
        Extents::Simple(SimpleExtents::from_vec(
            shape.iter().map(|&n| Extent::resizable(n)).collect(),
        ))
    } else {
        Extents::from(shape.to_vec())
    }
}

fn type_of(container: &Container) -> Result<TypeCode> {
    let descriptor = container.dtype().and_then(|t| t.to_descriptor()).map_err(h5)?;
    match descriptor {
        TypeDescriptor::Boolean => Ok(TypeCode::Bool),
        TypeDescriptor::Integer(IntSize::U1) => Ok(TypeCode::Int8),
        TypeDescriptor::Integer(IntSize::U2) => Ok(TypeCode::Int16),
        TypeDescriptor::Integer(IntSize::U4) => Ok(TypeCode::Int32),
        TypeDescriptor::Integer(IntSize::U8) => Ok(TypeCode::Int64),
        TypeDescriptor::Unsigned(IntSize::U1) => Ok(TypeCode::UInt8),
        TypeDescriptor::Unsigned(IntSize::U2) => Ok(TypeCode::UInt16),
        TypeDescriptor::Unsigned(IntSize::U4) => Ok(TypeCode::UInt32),
        TypeDescriptor::Unsigned(IntSize::U8) => Ok(TypeCode::UInt64),
        TypeDescriptor::Float(FloatSize::U2) => Ok(TypeCode::Float16),
        TypeDescriptor::Float(FloatSize::U4) => Ok(TypeCode::Float32),
        TypeDescriptor::Float(FloatSize::U8) => Ok(TypeCode::Float64),
        TypeDescriptor::VarLenUnicode => Ok(TypeCode::String),
        other => Err(Error::UnsupportedType(format!("{other:?}"))),
    }
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::Conversion(format!("invalid utf-8 string: {e}")))
}

fn selection(slab: &Hyperslab) -> hdf5::Selection {
    let dims: Vec<SliceOrIndex> = (0..slab.rank())
        .map(|d| SliceOrIndex::SliceCount {
            start: slab.offset[d],
            step: slab.block[d] + slab.stride[d],
            count: slab.count[d],
            block: slab.block[d],
        })
        .collect();
    hdf5::Selection::from(hdf5::Hyperslab::from(dims))
}

/// Dispatches `$body` with `$t` bound to the HDF5 element type of `$code`.
macro_rules! with_h5_type {
    ($code:expr, $t:ident => $body:expr) => {
        match $code.canonical() {
            TypeCode::Bool => {
                type $t = bool;
                $body
            }
            TypeCode::Int8 => {
                type $t = i8;
                $body
            }
            TypeCode::Int16 => {
                type $t = i16;
                $body
            }
            TypeCode::Int32 => {
                type $t = i32;
                $body
            }
            TypeCode::Int64 => {
                type $t = i64;
                $body
            }
            TypeCode::UInt8 => {
                type $t = u8;
                $body
            }
            TypeCode::UInt16 => {
                type $t = u16;
                $body
            }
            TypeCode::UInt32 => {
                type $t = u32;
                $body
            }
            TypeCode::UInt64 => {
                type $t = u64;
                $body
            }
            TypeCode::Float16 => {
                type $t = f16;
                $body
            }
            TypeCode::Float32 => {
                type $t = f32;
                $body
            }
            TypeCode::Float64 => {
                type $t = f64;
                $body
            }
            TypeCode::String => {
                type $t = VarLenUnicode;
                $body
            }
            other => Err(Error::UnsupportedType(other.to_string())),
        }
    };
}

fn read_array<T: H5Type>(container: &Container, slab: Option<&Hyperslab>) -> Result<ArrayD<T>> {
    match slab {
        None => container.read_dyn::<T>(),
        Some(slab) => container.read_slice::<T, _, IxDyn>(selection(slab)),
    }
    .map_err(h5)
}

fn read_container(container: &Container, slab: Option<&Hyperslab>) -> Result<Value> {
    let code = type_of(container)?;
    let shape = slab.map_or_else(|| container.shape(), Hyperslab::selected_shape);
    if shape.iter().product::<usize>() == 0 {
        return Ok(Value::zeros(code, &shape));
    }
    Ok(match code {
        TypeCode::Bool => Value::from(read_array::<bool>(container, slab)?),
        TypeCode::Int8 => Value::from(read_array::<i8>(container, slab)?),
        TypeCode::Int16 => Value::from(read_array::<i16>(container, slab)?),
        TypeCode::Int32 => Value::from(read_array::<i32>(container, slab)?),
        TypeCode::Int64 => Value::from(read_array::<i64>(container, slab)?),
        TypeCode::UInt8 => Value::from(read_array::<u8>(container, slab)?),
        TypeCode::UInt16 => Value::from(read_array::<u16>(container, slab)?),
        TypeCode::UInt32 => Value::from(read_array::<u32>(container, slab)?),
        TypeCode::UInt64 => Value::from(read_array::<u64>(container, slab)?),
        TypeCode::Float16 => Value::from(read_array::<f16>(container, slab)?.mapv(f32::from)),
        TypeCode::Float32 => Value::from(read_array::<f32>(container, slab)?),
        TypeCode::Float64 => Value::from(read_array::<f64>(container, slab)?),
        TypeCode::String => Value::from(
            read_array::<VarLenUnicode>(container, slab)?.mapv(|s| s.as_str().to_string()),
        ),
        other => return Err(Error::UnsupportedType(other.to_string())),
    })
}

fn write_array<T: H5Type>(container: &Container, slab: Option<&Hyperslab>, array: &ArrayD<T>) -> Result<()> {
    match slab {
        None => container.write(array.view()),
        Some(slab) => container.write_slice(array.view(), selection(slab)),
    }
    .map_err(h5)
}

/// Reshapes (or broadcasts a single element) to the target region before
/// handing the array to the library, which requires exact shapes.
fn write_container(container: &Container, slab: Option<&Hyperslab>, value: &Value) -> Result<()> {
    let shape = slab.map_or_else(|| container.shape(), Hyperslab::selected_shape);
    let len: usize = shape.iter().product();
    if len == 0 {
        return Ok(());
    }
    let value = if value.len() == len {
        value.reshape(&shape)?
    } else {
        let first = value
            .first()
            .ok_or_else(|| Error::ShapeMismatch("cannot broadcast an empty value".to_string()))?;
        Value::full(value.type_code(), &shape, &first)?
    };
    let half_precision = type_of(container)? == TypeCode::Float16;
    match &value {
        Value::Bool(a) => write_array(container, slab, a),
        Value::Int8(a) => write_array(container, slab, a),
        Value::Int16(a) => write_array(container, slab, a),
        Value::Int32(a) => write_array(container, slab, a),
        Value::Int64(a) => write_array(container, slab, a),
        Value::UInt8(a) => write_array(container, slab, a),
        Value::UInt16(a) => write_array(container, slab, a),
        Value::UInt32(a) => write_array(container, slab, a),
        Value::UInt64(a) => write_array(container, slab, a),
        Value::Float32(a) if half_precision => {
            write_array(container, slab, &a.mapv(f16::from_f32))
        }
        Value::Float32(a) => write_array(container, slab, a),
        Value::Float64(a) => write_array(container, slab, a),
        Value::String(a) => {
            let strings = a
                .iter()
                .map(|s| to_var_len_unicode(s))
                .collect::<Result<Vec<_>>>()?;
            let array = ArrayD::from_shape_vec(a.raw_dim(), strings)
                .map_err(|e| Error::ShapeMismatch(e.to_string()))?;
            write_array(container, slab, &array)
        }
    }
}

impl Backend for Hdf5Backend {
    type File = hdf5::File;
    type Group = hdf5::Group;
    type Field = Dataset;
    type Link = Hdf5Link;
    type Attribute = hdf5::Attribute;

    fn name(&self) -> &'static str {
        "hdf5"
    }

    fn create_file(&self, path: &Path, overwrite: bool, libver: LibVersion) -> Result<hdf5::File> {
        let builder = file_builder(libver);
        if overwrite {
            builder.create(path)
        } else {
            builder.create_excl(path)
        }
        .map_err(h5)
    }

    fn open_file(&self, path: &Path, access: FileAccess) -> Result<hdf5::File> {
        let libver = if access.swmr {
            LibVersion::Latest
        } else {
            access.libver
        };
        if access.swmr {
            debug!("{} opened with the latest file format for SWMR", path.display());
        }
        let builder = file_builder(libver);
        if access.readonly {
            builder.open(path)
        } else {
            builder.open_rw(path)
        }
        .map_err(h5)
    }

    fn close_file(&self, file: hdf5::File) -> Result<()> {
        let name = file.filename();
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(file_name, _), _| *file_name != name);
        file.close().map_err(h5)
    }

    fn flush(&self, file: &hdf5::File) -> Result<()> {
        file.flush().map_err(h5)
    }

    fn is_readonly(&self, file: &hdf5::File) -> bool {
        file.is_read_only()
    }

    fn libver(&self, file: &hdf5::File) -> Result<LibVersion> {
        let bounds = file.access_plist().map_err(h5)?.libver_bounds();
        Ok(if bounds.low == LibraryVersion::Earliest {
            LibVersion::Earliest
        } else {
            LibVersion::Latest
        })
    }

    fn root(&self, file: &hdf5::File) -> Result<hdf5::Group> {
        file.group("/").map_err(h5)
    }

    fn create_group(&self, parent: &hdf5::Group, name: &str) -> Result<hdf5::Group> {
        parent.create_group(name).map_err(h5)
    }

    fn open(&self, parent: &hdf5::Group, name: &str) -> Result<RawEntry<Self>> {
        let link = Hdf5Link {
            parent: parent.clone(),
            name: name.to_string(),
        };
        let external = self
            .remembered(&link.key())
            .is_some_and(|target| target.file.is_some());
        if external {
            return Ok(RawEntry::Link(link));
        }
        match parent.loc_type_by_name(name) {
            Ok(LocationType::Group) => Ok(RawEntry::Group(parent.group(name).map_err(h5)?)),
            Ok(LocationType::Dataset) => Ok(RawEntry::Field(parent.dataset(name).map_err(h5)?)),
            Ok(other) => Err(Error::UnsupportedType(format!("{other:?} object {name}"))),
            Err(_) if parent.link_exists(name) => Ok(RawEntry::Link(link)),
            Err(e) => Err(Error::NotFound(format!("{name}: {e}"))),
        }
    }

    fn create_field(&self, parent: &hdf5::Group, name: &str, spec: &FieldSpec) -> Result<Dataset> {
        let shape = spec.initial_shape();
        let chunk = spec.chunk_shape();
        with_h5_type!(spec.dtype, T => {
            let mut builder = parent
                .new_dataset::<T>()
                .shape(extents(&shape, true))
                .chunk(chunk.clone());
            if let Some(filter) = spec.filter {
                builder = builder.deflate(filter.rate());
                if filter.shuffle() {
                    builder = builder.shuffle();
                }
            }
            builder.create(name).map_err(h5)
        })
    }

    fn names(&self, group: &hdf5::Group) -> Result<Vec<String>> {
        group.member_names().map_err(h5)
    }

    fn link_names(&self, group: &hdf5::Group) -> Result<Vec<String>> {
        group
            .iter_visit_default(Vec::new(), |_, name, info, names: &mut Vec<String>| {
                if info.link_type != LinkType::Hard {
                    names.push(name.to_string());
                }
                true
            })
            .map_err(h5)
    }

    fn create_link(&self, parent: &hdf5::Group, name: &str, target: &LinkTarget) -> Result<Hdf5Link> {
        match &target.file {
            Some(file) => parent.link_external(file, &target.path, name),
            None => parent.link_soft(&target.path, name),
        }
        .map_err(h5)?;
        let link = Hdf5Link {
            parent: parent.clone(),
            name: name.to_string(),
        };
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(link.key(), target.clone());
        Ok(link)
    }

    fn open_link(&self, parent: &hdf5::Group, name: &str) -> Result<Hdf5Link> {
        if !self.link_names(parent)?.iter().any(|n| n == name) {
            return Err(Error::NotFound(format!("{name} is not a link")));
        }
        Ok(Hdf5Link {
            parent: parent.clone(),
            name: name.to_string(),
        })
    }

    fn link_target(&self, link: &Hdf5Link) -> Result<LinkTarget> {
        self.remembered(&link.key()).ok_or_else(|| {
            Error::Backend(format!(
                "target of {} was not created in this session",
                link.name
            ))
        })
    }

    fn field_dtype(&self, field: &Dataset) -> Result<TypeCode> {
        type_of(field)
    }

    fn field_shape(&self, field: &Dataset) -> Result<Vec<usize>> {
        Ok(field.shape())
    }

    fn field_chunk(&self, field: &Dataset) -> Result<Option<Vec<usize>>> {
        Ok(field.chunk())
    }

    fn field_filter(&self, field: &Dataset) -> Result<Option<Deflate>> {
        let filters = field.filters();
        let shuffle = filters.iter().any(|f| matches!(f, Filter::Shuffle));
        filters
            .iter()
            .find_map(|f| match f {
                Filter::Deflate(rate) => Some(Deflate::new(*rate, shuffle)),
                _ => None,
            })
            .transpose()
    }

    fn resize(&self, field: &Dataset, shape: &[usize]) -> Result<()> {
        field.resize(shape.to_vec()).map_err(h5)
    }

    fn read_field(&self, field: &Dataset, selection: Option<&Hyperslab>) -> Result<Value> {
        read_container(field, selection)
    }

    fn write_field(&self, field: &Dataset, selection: Option<&Hyperslab>, value: &Value) -> Result<()> {
        write_container(field, selection, value)
    }

    fn attribute_names(&self, location: Location<'_, Self>) -> Result<Vec<String>> {
        owner(&location).attr_names().map_err(h5)
    }

    fn create_attribute(
        &self,
        location: Location<'_, Self>,
        name: &str,
        dtype: TypeCode,
        shape: &[usize],
    ) -> Result<hdf5::Attribute> {
        let location = owner(&location);
        with_h5_type!(dtype, T => location
            .new_attr::<T>()
            .shape(extents(shape, false))
            .create(name)
            .map_err(h5))
    }

    fn open_attribute(&self, location: Location<'_, Self>, name: &str) -> Result<hdf5::Attribute> {
        owner(&location)
            .attr(name)
            .map_err(|e| Error::NotFound(format!("attribute {name}: {e}")))
    }

    fn delete_attribute(&self, location: Location<'_, Self>, name: &str) -> Result<()> {
        owner(&location).delete_attr(name).map_err(h5)
    }

    fn attribute_dtype(&self, attribute: &hdf5::Attribute) -> Result<TypeCode> {
        type_of(attribute)
    }

    fn attribute_shape(&self, attribute: &hdf5::Attribute) -> Result<Vec<usize>> {
        Ok(attribute.shape())
    }

    fn read_attribute(&self, attribute: &hdf5::Attribute, selection: Option<&Hyperslab>) -> Result<Value> {
        read_container(attribute, selection)
    }

    fn write_attribute(
        &self,
        attribute: &hdf5::Attribute,
        selection: Option<&Hyperslab>,
        value: &Value,
    ) -> Result<()> {
        write_container(attribute, selection, value)
    }
}
