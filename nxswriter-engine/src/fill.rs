//! Placeholder values for steps without usable data.

use nxswriter_core::{Result, Scalar, TypeCode, Value};

/// Largest finite half-precision value.
pub const FLOAT16_MAX: f64 = 65504.0;

/// Type maximum for numbers, `false` for booleans, `""` for strings.
///
/// `uint64` fields take the `int64` maximum so readers that go through a
/// signed 64-bit type still see the sentinel unchanged.
#[must_use]
pub fn sentinel(dtype: TypeCode) -> Scalar {
    match dtype.canonical() {
        TypeCode::String => Scalar::Str(String::new()),
        TypeCode::Bool => Scalar::Bool(false),
        TypeCode::Int8 => Scalar::Int(i8::MAX.into()),
        TypeCode::Int16 => Scalar::Int(i16::MAX.into()),
        TypeCode::Int32 => Scalar::Int(i32::MAX.into()),
        TypeCode::UInt8 => Scalar::UInt(u8::MAX.into()),
        TypeCode::UInt16 => Scalar::UInt(u16::MAX.into()),
        TypeCode::UInt32 => Scalar::UInt(u32::MAX.into()),
        TypeCode::UInt64 | TypeCode::UInt => Scalar::UInt(i64::MAX.unsigned_abs()),
        TypeCode::Float16 => Scalar::Float(FLOAT16_MAX),
        TypeCode::Float32 => Scalar::Float(f32::MAX.into()),
        TypeCode::Float64 | TypeCode::Float => Scalar::Float(f64::MAX),
        TypeCode::Int64 | TypeCode::Long => Scalar::Int(i64::MAX),
    }
}

/// Sentinel payload of `shape`; an empty shape gives a 0-d value.
///
/// # Errors
/// Returns [`nxswriter_core::Error::Conversion`] if the sentinel cannot be
/// represented, which does not happen for the supported tags.
pub fn sentinel_value(dtype: TypeCode, shape: &[usize]) -> Result<Value> {
    Value::full(dtype, shape, &sentinel(dtype))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sentinels() {
        assert_eq!(sentinel(TypeCode::Int32), Scalar::Int(2_147_483_647));
        assert_eq!(sentinel(TypeCode::UInt64), Scalar::UInt(9_223_372_036_854_775_807));
        assert_eq!(sentinel(TypeCode::Long), Scalar::Int(i64::MAX));
        assert_eq!(sentinel(TypeCode::Bool), Scalar::Bool(false));
        assert_eq!(sentinel(TypeCode::String), Scalar::Str(String::new()));
    }

    #[test]
    fn test_sentinel_values() {
        let value = sentinel_value(TypeCode::Float32, &[2]).unwrap();
        assert_eq!(value.to_vec::<f32>().unwrap(), vec![f32::MAX, f32::MAX]);

        let value = sentinel_value(TypeCode::Float16, &[]).unwrap();
        assert_eq!(value.ndim(), 0);
        assert_relative_eq!(value.to_vec::<f32>().unwrap()[0], 65504.0);

        let value = sentinel_value(TypeCode::UInt16, &[2, 2]).unwrap();
        assert_eq!(value.to_vec::<u16>().unwrap(), vec![u16::MAX; 4]);
    }
}
