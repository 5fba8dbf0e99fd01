//! Portable element-type tags.
//!
//! Tags are the backend-independent names used at field and attribute
//! creation. Backends translate them through their own tables; this module
//! only owns the tag spelling and the NeXus schema aliases.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Portable element type of a field or attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub enum TypeCode {
    String,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    /// Platform-width signed integer.
    Long,
    /// Platform-width unsigned integer.
    UInt,
    /// Platform-width float.
    Float,
}

const TAGS: [(&str, TypeCode); 16] = [
    ("string", TypeCode::String),
    ("bool", TypeCode::Bool),
    ("int8", TypeCode::Int8),
    ("int16", TypeCode::Int16),
    ("int32", TypeCode::Int32),
    ("int64", TypeCode::Int64),
    ("uint8", TypeCode::UInt8),
    ("uint16", TypeCode::UInt16),
    ("uint32", TypeCode::UInt32),
    ("uint64", TypeCode::UInt64),
    ("float16", TypeCode::Float16),
    ("float32", TypeCode::Float32),
    ("float64", TypeCode::Float64),
    ("long", TypeCode::Long),
    ("uint", TypeCode::UInt),
    ("float", TypeCode::Float),
];

const NEXUS_TYPES: [(&str, TypeCode); 21] = [
    ("NX_FLOAT", TypeCode::Float64),
    ("NX_FLOAT32", TypeCode::Float32),
    ("NX_FLOAT64", TypeCode::Float64),
    ("NX_NUMBER", TypeCode::Float64),
    ("NX_INT", TypeCode::Int64),
    ("NX_INT8", TypeCode::Int8),
    ("NX_INT16", TypeCode::Int16),
    ("NX_INT32", TypeCode::Int32),
    ("NX_INT64", TypeCode::Int64),
    ("NX_POSINT", TypeCode::Int64),
    ("NX_UINT", TypeCode::UInt64),
    ("NX_UINT8", TypeCode::UInt8),
    ("NX_UINT16", TypeCode::UInt16),
    ("NX_UINT32", TypeCode::UInt32),
    ("NX_UINT64", TypeCode::UInt64),
    ("NX_CHAR", TypeCode::String),
    ("NX_DATE_TIME", TypeCode::String),
    ("ISO8601", TypeCode::String),
    ("NX_BOOLEAN", TypeCode::Bool),
    ("NX_BINARY", TypeCode::UInt8),
    ("NX_BOOL", TypeCode::Bool),
];

impl TypeCode {
    /// Every portable tag, in table order.
    pub const ALL: [TypeCode; 16] = [
        TypeCode::String,
        TypeCode::Bool,
        TypeCode::Int8,
        TypeCode::Int16,
        TypeCode::Int32,
        TypeCode::Int64,
        TypeCode::UInt8,
        TypeCode::UInt16,
        TypeCode::UInt32,
        TypeCode::UInt64,
        TypeCode::Float16,
        TypeCode::Float32,
        TypeCode::Float64,
        TypeCode::Long,
        TypeCode::UInt,
        TypeCode::Float,
    ];

    /// Tag spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        TAGS.iter()
            .find(|(_, code)| *code == self)
            .map_or("string", |(tag, _)| tag)
    }

    /// Resolves platform-width aliases to their concrete width.
    #[must_use]
    pub fn canonical(self) -> Self {
        match self {
            TypeCode::Long => TypeCode::Int64,
            TypeCode::UInt => TypeCode::UInt64,
            TypeCode::Float => TypeCode::Float64,
            other => other,
        }
    }

    /// Tag of the in-memory element type used to hold values of this type.
    ///
    /// `float16` values are held with 32-bit precision.
    #[must_use]
    pub fn storage(self) -> Self {
        match self.canonical() {
            TypeCode::Float16 => TypeCode::Float32,
            other => other,
        }
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(
            self.canonical(),
            TypeCode::Float16 | TypeCode::Float32 | TypeCode::Float64
        )
    }

    #[must_use]
    pub fn is_signed(self) -> bool {
        matches!(
            self.canonical(),
            TypeCode::Int8 | TypeCode::Int16 | TypeCode::Int32 | TypeCode::Int64
        )
    }

    #[must_use]
    pub fn is_unsigned(self) -> bool {
        matches!(
            self.canonical(),
            TypeCode::UInt8 | TypeCode::UInt16 | TypeCode::UInt32 | TypeCode::UInt64
        )
    }

    /// Maps a NeXus schema type name (`NX_FLOAT`, `NX_INT32`, ...) to a tag.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedType`] for unknown names.
    pub fn from_nexus(name: &str) -> Result<Self> {
        NEXUS_TYPES
            .iter()
            .find(|(nx, _)| *nx == name)
            .map(|(_, code)| *code)
            .ok_or_else(|| Error::UnsupportedType(name.to_string()))
    }

    /// Accepts either a portable tag or a NeXus schema type name.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedType`] when the name is neither.
    pub fn resolve(name: &str) -> Result<Self> {
        name.parse().or_else(|_| Self::from_nexus(name))
    }
}

impl FromStr for TypeCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TAGS.iter()
            .find(|(tag, _)| *tag == s)
            .map(|(_, code)| *code)
            .ok_or_else(|| Error::UnsupportedType(s.to_string()))
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for TypeCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::resolve(&value)
    }
}

impl From<TypeCode> for String {
    fn from(code: TypeCode) -> Self {
        code.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_roundtrip() {
        for code in TypeCode::ALL {
            let parsed: TypeCode = code.as_str().parse().unwrap();
            assert_eq!(parsed, code);
        }
    }

    #[test]
    fn test_unknown_tag() {
        let err = "complex128".parse::<TypeCode>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedType(ref t) if t == "complex128"));
    }

    #[test]
    fn test_platform_aliases() {
        assert_eq!(TypeCode::Long.canonical(), TypeCode::Int64);
        assert_eq!(TypeCode::UInt.canonical(), TypeCode::UInt64);
        assert_eq!(TypeCode::Float.canonical(), TypeCode::Float64);
        assert_eq!(TypeCode::Float16.storage(), TypeCode::Float32);
        assert_eq!(TypeCode::Int8.storage(), TypeCode::Int8);
    }

    #[test]
    fn test_nexus_names() {
        assert_eq!(TypeCode::from_nexus("NX_FLOAT").unwrap(), TypeCode::Float64);
        assert_eq!(TypeCode::from_nexus("NX_UINT32").unwrap(), TypeCode::UInt32);
        assert_eq!(TypeCode::from_nexus("NX_CHAR").unwrap(), TypeCode::String);
        assert_eq!(TypeCode::resolve("int16").unwrap(), TypeCode::Int16);
        assert_eq!(TypeCode::resolve("NX_BOOLEAN").unwrap(), TypeCode::Bool);
        assert!(TypeCode::from_nexus("NX_QUATERNION").is_err());
    }
}
