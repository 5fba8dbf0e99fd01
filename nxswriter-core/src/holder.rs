//! Per-step payloads tagged with their logical format.

use crate::{Element, Error, Result, TypeCode, Value};
use ndarray::Array2;
use std::fmt;
use std::str::FromStr;

/// Logical shape of one step of data, independent of the field rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum DataFormat {
    #[default]
    Scalar,
    Spectrum,
    Image,
}

impl DataFormat {
    /// Format matching a payload rank.
    ///
    /// # Errors
    /// Returns [`Error::RankMismatch`] for ranks above 2.
    pub fn from_rank(rank: usize) -> Result<Self> {
        match rank {
            0 => Ok(DataFormat::Scalar),
            1 => Ok(DataFormat::Spectrum),
            2 => Ok(DataFormat::Image),
            other => Err(Error::RankMismatch(format!(
                "no data format for payload rank {other}"
            ))),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DataFormat::Scalar => "SCALAR",
            DataFormat::Spectrum => "SPECTRUM",
            DataFormat::Image => "IMAGE",
        }
    }
}

impl FromStr for DataFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // accepts qualified names such as "DataFormat.SPECTRUM"
        let name = s.rsplit('.').next().unwrap_or(s);
        match name.to_ascii_uppercase().as_str() {
            "SCALAR" => Ok(DataFormat::Scalar),
            "SPECTRUM" => Ok(DataFormat::Spectrum),
            "IMAGE" => Ok(DataFormat::Image),
            _ => Err(Error::RankMismatch(format!("unknown data format {s}"))),
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of data: a value plus its declared format.
#[derive(Clone, Debug, PartialEq)]
pub struct DataHolder {
    format: DataFormat,
    value: Value,
}

impl DataHolder {
    /// Wraps a value, checking that its rank fits the format.
    ///
    /// A scalar may arrive as any single-element array; it is stored 0-dimensional.
    ///
    /// # Errors
    /// Returns [`Error::RankMismatch`] when value and format disagree.
    pub fn new(format: DataFormat, value: Value) -> Result<Self> {
        let value = match format {
            DataFormat::Scalar if value.ndim() == 0 => value,
            DataFormat::Scalar if value.len() == 1 => value.reshape(&[])?,
            DataFormat::Spectrum if value.ndim() == 1 => value,
            DataFormat::Image if value.ndim() == 2 => value,
            _ => {
                return Err(Error::RankMismatch(format!(
                    "{format} payload with shape {:?}",
                    value.shape()
                )))
            }
        };
        Ok(Self { format, value })
    }

    /// Wraps a value, deriving the format from its rank.
    ///
    /// # Errors
    /// Returns [`Error::RankMismatch`] for ranks above 2.
    pub fn from_value(value: Value) -> Result<Self> {
        let format = DataFormat::from_rank(value.ndim())?;
        Ok(Self { format, value })
    }

    pub fn scalar<T: Element>(value: T) -> Self {
        Self {
            format: DataFormat::Scalar,
            value: Value::scalar(value),
        }
    }

    pub fn spectrum<T: Element>(values: Vec<T>) -> Self {
        Self {
            format: DataFormat::Spectrum,
            value: Value::from_vec(values),
        }
    }

    pub fn image<T: Element>(image: Array2<T>) -> Self {
        Self {
            format: DataFormat::Image,
            value: T::wrap(image.into_dyn()),
        }
    }

    #[must_use]
    pub fn format(&self) -> DataFormat {
        self.format
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Per-step shape: `[]`, `[len]` or `[rows, cols]`.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    /// Payload converted to the element type of a field.
    ///
    /// # Errors
    /// Returns [`Error::Conversion`] if an element has no representation.
    pub fn cast(&self, code: TypeCode) -> Result<Value> {
        self.value.cast(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names() {
        assert_eq!("SPECTRUM".parse::<DataFormat>().unwrap(), DataFormat::Spectrum);
        assert_eq!("DataFormat.IMAGE".parse::<DataFormat>().unwrap(), DataFormat::Image);
        assert!("VOLUME".parse::<DataFormat>().is_err());
    }

    #[test]
    fn test_scalar_unwraps_single_element() {
        let holder = DataHolder::new(DataFormat::Scalar, Value::from(vec![4.5f64])).unwrap();
        assert!(holder.shape().is_empty());
    }

    #[test]
    fn test_rank_checked_against_format() {
        let err = DataHolder::new(DataFormat::Image, Value::from(vec![1i32, 2])).unwrap_err();
        assert!(matches!(err, Error::RankMismatch(_)));

        let holder = DataHolder::from_value(Value::zeros(TypeCode::UInt8, &[4, 5])).unwrap();
        assert_eq!(holder.format(), DataFormat::Image);
        assert_eq!(holder.shape(), &[4, 5]);

        assert!(DataHolder::from_value(Value::zeros(TypeCode::UInt8, &[2, 2, 2])).is_err());
    }
}
