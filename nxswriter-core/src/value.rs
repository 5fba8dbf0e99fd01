//! Dynamically typed n-dimensional values.
//!
//! A [`Value`] is what flows between the write engine and the backends: one
//! `ndarray` array per element type. Conversions go through [`Scalar`] so every
//! element type converts to every other one with the same rules.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_lossless
)]

use crate::{Error, Result, TypeCode};
use ndarray::{Array1, ArrayD, Dimension, IxDyn};
use std::fmt;

/// Single element, widened to the largest type of its kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::UInt(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Str(v) => f.write_str(v),
        }
    }
}

/// Element types a [`Value`] can hold.
pub trait Element: Clone + Default + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Tag of the array variant holding this element type.
    const TYPE: TypeCode;

    fn to_scalar(&self) -> Scalar;

    /// # Errors
    /// Returns [`Error::Conversion`] when the scalar has no representation.
    fn from_scalar(scalar: &Scalar) -> Result<Self>;

    fn wrap(array: ArrayD<Self>) -> Value;

    fn view_of(value: &Value) -> Option<&ArrayD<Self>>;
}

/// N-dimensional array of one element type.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(ArrayD<bool>),
    Int8(ArrayD<i8>),
    Int16(ArrayD<i16>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    UInt8(ArrayD<u8>),
    UInt16(ArrayD<u16>),
    UInt32(ArrayD<u32>),
    UInt64(ArrayD<u64>),
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
    String(ArrayD<String>),
}

macro_rules! dispatch {
    ($value:expr, $arr:ident => $body:expr) => {
        match $value {
            Value::Bool($arr) => $body,
            Value::Int8($arr) => $body,
            Value::Int16($arr) => $body,
            Value::Int32($arr) => $body,
            Value::Int64($arr) => $body,
            Value::UInt8($arr) => $body,
            Value::UInt16($arr) => $body,
            Value::UInt32($arr) => $body,
            Value::UInt64($arr) => $body,
            Value::Float32($arr) => $body,
            Value::Float64($arr) => $body,
            Value::String($arr) => $body,
        }
    };
}

macro_rules! map_array {
    ($value:expr, $arr:ident => $body:expr) => {
        match $value {
            Value::Bool($arr) => Value::Bool($body),
            Value::Int8($arr) => Value::Int8($body),
            Value::Int16($arr) => Value::Int16($body),
            Value::Int32($arr) => Value::Int32($body),
            Value::Int64($arr) => Value::Int64($body),
            Value::UInt8($arr) => Value::UInt8($body),
            Value::UInt16($arr) => Value::UInt16($body),
            Value::UInt32($arr) => Value::UInt32($body),
            Value::UInt64($arr) => Value::UInt64($body),
            Value::Float32($arr) => Value::Float32($body),
            Value::Float64($arr) => Value::Float64($body),
            Value::String($arr) => Value::String($body),
        }
    };
}

/// Binds `$t` to the element type holding values of `$code`.
macro_rules! with_element_type {
    ($code:expr, $t:ident => $body:expr) => {
        match $code {
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
            TypeCode::Int64 | TypeCode::Long => {
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
            TypeCode::UInt64 | TypeCode::UInt => {
                type $t = u64;
                $body
            }
            TypeCode::Float16 | TypeCode::Float32 => {
                type $t = f32;
                $body
            }
            TypeCode::Float64 | TypeCode::Float => {
                type $t = f64;
                $body
            }
            TypeCode::String => {
                type $t = String;
                $body
            }
        }
    };
}

fn conversion_error(text: &str, code: TypeCode) -> Error {
    Error::Conversion(format!("cannot convert '{text}' to {code}"))
}

macro_rules! int_element {
    ($($t:ty => $variant:ident, $scalar:ident, $wide:ty;)*) => {$(
        impl Element for $t {
            const TYPE: TypeCode = TypeCode::$variant;

            fn to_scalar(&self) -> Scalar {
                Scalar::$scalar(<$wide>::from(*self))
            }

            fn from_scalar(scalar: &Scalar) -> Result<Self> {
                Ok(match scalar {
                    Scalar::Bool(v) => <$t>::from(*v),
                    Scalar::Int(v) => *v as $t,
                    Scalar::UInt(v) => *v as $t,
                    Scalar::Float(v) => *v as $t,
                    Scalar::Str(text) => {
                        let trimmed = text.trim();
                        match trimmed.parse::<$t>() {
                            Ok(v) => v,
                            Err(_) => trimmed
                                .parse::<f64>()
                                .map(|v| v as $t)
                                .map_err(|_| conversion_error(text, Self::TYPE))?,
                        }
                    }
                })
            }

            fn wrap(array: ArrayD<Self>) -> Value {
                Value::$variant(array)
            }

            fn view_of(value: &Value) -> Option<&ArrayD<Self>> {
                match value {
                    Value::$variant(array) => Some(array),
                    _ => None,
                }
            }
        }
    )*};
}

int_element! {
    i8 => Int8, Int, i64;
    i16 => Int16, Int, i64;
    i32 => Int32, Int, i64;
    i64 => Int64, Int, i64;
    u8 => UInt8, UInt, u64;
    u16 => UInt16, UInt, u64;
    u32 => UInt32, UInt, u64;
    u64 => UInt64, UInt, u64;
}

macro_rules! float_element {
    ($($t:ty => $variant:ident;)*) => {$(
        impl Element for $t {
            const TYPE: TypeCode = TypeCode::$variant;

            fn to_scalar(&self) -> Scalar {
                Scalar::Float(f64::from(*self))
            }

            fn from_scalar(scalar: &Scalar) -> Result<Self> {
                Ok(match scalar {
                    Scalar::Bool(v) => {
                        if *v {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    Scalar::Int(v) => *v as $t,
                    Scalar::UInt(v) => *v as $t,
                    Scalar::Float(v) => *v as $t,
                    Scalar::Str(text) => text
                        .trim()
                        .parse::<$t>()
                        .map_err(|_| conversion_error(text, Self::TYPE))?,
                })
            }

            fn wrap(array: ArrayD<Self>) -> Value {
                Value::$variant(array)
            }

            fn view_of(value: &Value) -> Option<&ArrayD<Self>> {
                match value {
                    Value::$variant(array) => Some(array),
                    _ => None,
                }
            }
        }
    )*};
}

float_element! {
    f32 => Float32;
    f64 => Float64;
}

impl Element for bool {
    const TYPE: TypeCode = TypeCode::Bool;

    fn to_scalar(&self) -> Scalar {
        Scalar::Bool(*self)
    }

    fn from_scalar(scalar: &Scalar) -> Result<Self> {
        match scalar {
            Scalar::Bool(v) => Ok(*v),
            Scalar::Int(v) => Ok(*v != 0),
            Scalar::UInt(v) => Ok(*v != 0),
            Scalar::Float(v) => Ok(*v != 0.0),
            Scalar::Str(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" | "" => Ok(false),
                _ => Err(conversion_error(text, Self::TYPE)),
            },
        }
    }

    fn wrap(array: ArrayD<Self>) -> Value {
        Value::Bool(array)
    }

    fn view_of(value: &Value) -> Option<&ArrayD<Self>> {
        match value {
            Value::Bool(array) => Some(array),
            _ => None,
        }
    }
}

impl Element for String {
    const TYPE: TypeCode = TypeCode::String;

    fn to_scalar(&self) -> Scalar {
        Scalar::Str(self.clone())
    }

    fn from_scalar(scalar: &Scalar) -> Result<Self> {
        Ok(scalar.to_string())
    }

    fn wrap(array: ArrayD<Self>) -> Value {
        Value::String(array)
    }

    fn view_of(value: &Value) -> Option<&ArrayD<Self>> {
        match value {
            Value::String(array) => Some(array),
            _ => None,
        }
    }
}

fn code_of<T: Element>(_: &ArrayD<T>) -> TypeCode {
    T::TYPE
}

impl Value {
    /// 0-dimensional value.
    pub fn scalar<T: Element>(value: T) -> Self {
        T::wrap(ArrayD::from_elem(IxDyn(&[]), value))
    }

    /// 1-dimensional value.
    pub fn from_vec<T: Element>(values: Vec<T>) -> Self {
        T::wrap(Array1::from(values).into_dyn())
    }

    /// Row-major value of the given shape.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if `values` does not fill `shape`.
    pub fn from_shape_vec<T: Element>(shape: &[usize], values: Vec<T>) -> Result<Self> {
        Ok(T::wrap(from_shape(shape, values)?))
    }

    /// Default-initialised value (zero, `false`, empty string).
    #[must_use]
    pub fn zeros(code: TypeCode, shape: &[usize]) -> Self {
        with_element_type!(code, T => T::wrap(ArrayD::<T>::default(IxDyn(shape))))
    }

    /// Value of `shape` with every element set to `fill`.
    ///
    /// # Errors
    /// Returns [`Error::Conversion`] if `fill` cannot be represented as `code`.
    pub fn full(code: TypeCode, shape: &[usize], fill: &Scalar) -> Result<Self> {
        with_element_type!(code, T => {
            let element = T::from_scalar(fill)?;
            Ok(T::wrap(ArrayD::from_elem(IxDyn(shape), element)))
        })
    }

    /// Tag of the element type held.
    #[must_use]
    pub fn type_code(&self) -> TypeCode {
        dispatch!(self, array => code_of(array))
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        dispatch!(self, array => array.shape())
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        dispatch!(self, array => array.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, if in range.
    #[must_use]
    pub fn get(&self, index: &[usize]) -> Option<Scalar> {
        dispatch!(self, array => array.get(index).map(Element::to_scalar))
    }

    /// First element in logical order.
    #[must_use]
    pub fn first(&self) -> Option<Scalar> {
        dispatch!(self, array => array.iter().next().map(Element::to_scalar))
    }

    /// Borrow the underlying array if it holds `T`.
    #[must_use]
    pub fn as_array<T: Element>(&self) -> Option<&ArrayD<T>> {
        T::view_of(self)
    }

    /// Converts every element to the storage type of `code`.
    ///
    /// # Errors
    /// Returns [`Error::Conversion`] if an element has no representation.
    pub fn cast(&self, code: TypeCode) -> Result<Self> {
        let target = code.storage();
        if self.type_code() == target {
            return Ok(self.clone());
        }
        with_element_type!(target, T => {
            let converted: ArrayD<T> = dispatch!(self, array => convert_array(array)?);
            Ok(T::wrap(converted))
        })
    }

    /// Elements in logical order, converted to `T`.
    ///
    /// # Errors
    /// Returns [`Error::Conversion`] if an element has no representation.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let cast = self.cast(T::TYPE)?;
        T::view_of(&cast)
            .map(|array| array.iter().cloned().collect())
            .ok_or_else(|| Error::Conversion(format!("cannot view value as {}", T::TYPE)))
    }

    /// Same elements with a new shape.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if the element counts differ.
    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        Ok(map_array!(self, array => reshape_array(array, shape)?))
    }

    /// Copy with a new extent; the overlapping region is kept, new
    /// elements are default-initialised.
    #[must_use]
    pub fn resized(&self, shape: &[usize]) -> Self {
        map_array!(self, array => resize_array(array, shape))
    }

    /// Sub-array picking `positions[d]` along each dimension `d`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSelection`] for a rank mismatch or an index out of range.
    pub fn gather(&self, positions: &[Vec<usize>]) -> Result<Self> {
        Ok(map_array!(self, array => gather_array(array, positions)?))
    }

    /// Writes `source` into the cells picked by `positions`.
    ///
    /// `source` is cast to this value's element type. A single-element source
    /// is broadcast over the selection.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSelection`] for a bad selection,
    /// [`Error::ShapeMismatch`] when the element counts differ and
    /// [`Error::Conversion`] when the cast fails.
    pub fn scatter(&mut self, positions: &[Vec<usize>], source: &Value) -> Result<()> {
        let source = source.cast(self.type_code())?;
        dispatch!(self, array => scatter_array(array, positions, view_or_err(&source)?))
    }
}

fn view_or_err<T: Element>(value: &Value) -> Result<&ArrayD<T>> {
    T::view_of(value)
        .ok_or_else(|| Error::Conversion(format!("expected {} value, got {}", T::TYPE, value.type_code())))
}

fn from_shape<T>(shape: &[usize], values: Vec<T>) -> Result<ArrayD<T>> {
    ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|e| Error::ShapeMismatch(e.to_string()))
}

fn convert_array<S: Element, T: Element>(array: &ArrayD<S>) -> Result<ArrayD<T>> {
    let values = array
        .iter()
        .map(|element| T::from_scalar(&element.to_scalar()))
        .collect::<Result<Vec<T>>>()?;
    from_shape(array.shape(), values)
}

fn reshape_array<T: Clone>(array: &ArrayD<T>, shape: &[usize]) -> Result<ArrayD<T>> {
    let len: usize = shape.iter().product();
    if len != array.len() {
        return Err(Error::ShapeMismatch(format!(
            "cannot reshape {} elements into {shape:?}",
            array.len()
        )));
    }
    from_shape(shape, array.iter().cloned().collect())
}

fn resize_array<T: Clone + Default>(array: &ArrayD<T>, shape: &[usize]) -> ArrayD<T> {
    let mut resized = ArrayD::<T>::default(IxDyn(shape));
    if array.ndim() != shape.len() {
        return resized;
    }
    for (index, element) in array.indexed_iter() {
        if index.slice().iter().zip(shape).all(|(i, n)| i < n) {
            resized[index] = element.clone();
        }
    }
    resized
}

fn check_positions(shape: &[usize], positions: &[Vec<usize>]) -> Result<()> {
    if shape.len() != positions.len() {
        return Err(Error::InvalidSelection(format!(
            "selection of rank {} on a value of rank {}",
            positions.len(),
            shape.len()
        )));
    }
    for (dim, (list, &len)) in positions.iter().zip(shape).enumerate() {
        if let Some(&index) = list.iter().find(|&&index| index >= len) {
            return Err(Error::InvalidSelection(format!(
                "index {index} out of range for dimension {dim} of length {len}"
            )));
        }
    }
    Ok(())
}

/// Calls `f` with every index of the cartesian product of `positions`, row-major.
fn for_each_position(positions: &[Vec<usize>], mut f: impl FnMut(&[usize])) {
    if positions.iter().any(Vec::is_empty) {
        return;
    }
    let mut cursor = vec![0usize; positions.len()];
    let mut index: Vec<usize> = positions.iter().map(|list| list[0]).collect();
    loop {
        f(&index);
        let mut dim = positions.len();
        loop {
            if dim == 0 {
                return;
            }
            dim -= 1;
            cursor[dim] += 1;
            if cursor[dim] < positions[dim].len() {
                index[dim] = positions[dim][cursor[dim]];
                break;
            }
            cursor[dim] = 0;
            index[dim] = positions[dim][0];
        }
    }
}

fn gather_array<T: Clone>(array: &ArrayD<T>, positions: &[Vec<usize>]) -> Result<ArrayD<T>> {
    check_positions(array.shape(), positions)?;
    let shape: Vec<usize> = positions.iter().map(Vec::len).collect();
    let mut values = Vec::with_capacity(shape.iter().product());
    for_each_position(positions, |index| values.push(array[index].clone()));
    from_shape(&shape, values)
}

fn scatter_array<T: Clone>(
    array: &mut ArrayD<T>,
    positions: &[Vec<usize>],
    source: &ArrayD<T>,
) -> Result<()> {
    check_positions(array.shape(), positions)?;
    let count: usize = positions.iter().map(Vec::len).product();
    let broadcast = source.len() == 1 && count != 1;
    if !broadcast && source.len() != count {
        return Err(Error::ShapeMismatch(format!(
            "cannot write {} elements into a selection of {count}",
            source.len()
        )));
    }
    let first = source.iter().next().cloned();
    let mut elements = source.iter();
    for_each_position(positions, |index| {
        let element = if broadcast {
            first.clone()
        } else {
            elements.next().cloned()
        };
        if let Some(element) = element {
            array[index] = element;
        }
    });
    Ok(())
}

macro_rules! value_from {
    ($($t:ty),*) => {$(
        impl From<$t> for Value {
            fn from(value: $t) -> Self {
                Value::scalar(value)
            }
        }

        impl From<Vec<$t>> for Value {
            fn from(values: Vec<$t>) -> Self {
                Value::from_vec(values)
            }
        }

        impl From<ArrayD<$t>> for Value {
            fn from(array: ArrayD<$t>) -> Self {
                <$t as Element>::wrap(array)
            }
        }
    )*};
}

value_from!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::scalar(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cast_numeric() {
        let value = Value::from(vec![1.7f64, -2.2, 3.0]);
        let cast = value.cast(TypeCode::Int32).unwrap();
        assert_eq!(cast.type_code(), TypeCode::Int32);
        assert_eq!(cast.to_vec::<i32>().unwrap(), vec![1, -2, 3]);

        let back = cast.cast(TypeCode::Float).unwrap();
        assert_eq!(back.type_code(), TypeCode::Float64);
    }

    #[test]
    fn test_cast_strings() {
        let value = Value::from(vec!["1".to_string(), " 2 ".to_string(), "3.5".to_string()]);
        assert_eq!(value.to_vec::<i64>().unwrap(), vec![1, 2, 3]);
        let floats = value.to_vec::<f64>().unwrap();
        assert_relative_eq!(floats[2], 3.5);

        let bad = Value::from("abc");
        assert!(matches!(bad.cast(TypeCode::Int8), Err(Error::Conversion(_))));

        let text = Value::from(0.25f64).cast(TypeCode::String).unwrap();
        assert_eq!(text.to_vec::<String>().unwrap(), vec!["0.25".to_string()]);
    }

    #[test]
    fn test_float16_held_as_f32() {
        let value = Value::from(1.5f64).cast(TypeCode::Float16).unwrap();
        assert_eq!(value.type_code(), TypeCode::Float32);
    }

    #[test]
    fn test_resized_keeps_overlap() {
        let value = Value::from_shape_vec(&[2, 2], vec![1i32, 2, 3, 4]).unwrap();
        let grown = value.resized(&[3, 2]);
        assert_eq!(grown.shape(), &[3, 2]);
        assert_eq!(grown.to_vec::<i32>().unwrap(), vec![1, 2, 3, 4, 0, 0]);

        let wider = value.resized(&[2, 3]);
        assert_eq!(wider.to_vec::<i32>().unwrap(), vec![1, 2, 0, 3, 4, 0]);
    }

    #[test]
    fn test_gather_and_scatter() {
        let mut value = Value::zeros(TypeCode::Float64, &[3, 4]);
        let positions = vec![vec![1], vec![0, 1, 2, 3]];
        value
            .scatter(&positions, &Value::from(vec![1.0f64, 2.0, 3.0, 4.0]))
            .unwrap();
        let row = value.gather(&positions).unwrap();
        assert_eq!(row.shape(), &[1, 4]);
        assert_eq!(row.to_vec::<f64>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);

        let column = value.gather(&[vec![0, 1, 2], vec![2]]).unwrap();
        assert_eq!(column.to_vec::<f64>().unwrap(), vec![0.0, 3.0, 0.0]);
    }

    #[test]
    fn test_scatter_broadcast_and_mismatch() {
        let mut value = Value::zeros(TypeCode::UInt16, &[4]);
        value.scatter(&[vec![0, 2]], &Value::from(7u16)).unwrap();
        assert_eq!(value.to_vec::<u16>().unwrap(), vec![7, 0, 7, 0]);

        let err = value
            .scatter(&[vec![0, 1, 2]], &Value::from(vec![1u16, 2]))
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));

        let err = value.scatter(&[vec![4]], &Value::from(1u16)).unwrap_err();
        assert!(matches!(err, Error::InvalidSelection(_)));
    }

    #[test]
    fn test_full_and_first() {
        let value = Value::full(TypeCode::Int8, &[2, 2], &Scalar::Int(i64::from(i8::MAX))).unwrap();
        assert_eq!(value.first(), Some(Scalar::Int(127)));
        assert_eq!(value.get(&[1, 1]), Some(Scalar::Int(127)));
        assert_eq!(value.get(&[2, 0]), None);
    }

    #[test]
    fn test_reshape() {
        let value = Value::from(vec![1u8, 2, 3, 4, 5, 6]);
        let image = value.reshape(&[2, 3]).unwrap();
        assert_eq!(image.get(&[1, 0]), Some(Scalar::UInt(4)));
        assert!(value.reshape(&[4, 2]).is_err());
    }
}
