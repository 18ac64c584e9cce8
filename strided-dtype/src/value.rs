//! Dynamically typed element values.

use num_complex::Complex64;

use crate::object::Object;
use crate::{DTypeError, Result};

/// A single element value as produced by [`DType::read`](crate::DType::read)
/// and consumed by [`DType::store`](crate::DType::store).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Complex(Complex64),
    /// A managed reference; `None` is the null reference of a zeroed slot.
    Object(Option<Object>),
    /// Field values of a compound element, in field order.
    Record(Vec<Value>),
}

impl Value {
    fn coerce_err(&self, target: &'static str) -> DTypeError {
        DTypeError::Coerce {
            value: format!("{self:?}"),
            target,
        }
    }

    /// Truthiness, following the usual numeric convention (zero is false).
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(v) => Ok(*v != 0),
            Value::UInt(v) => Ok(*v != 0),
            Value::Float(v) => Ok(*v != 0.0),
            Value::Complex(c) => Ok(c.re != 0.0 || c.im != 0.0),
            _ => Err(self.coerce_err("bool")),
        }
    }

    /// Signed integer view. Floats truncate toward zero.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Bool(b) => Ok(*b as i64),
            Value::Int(v) => Ok(*v),
            Value::UInt(v) => i64::try_from(*v).map_err(|_| DTypeError::Overflow {
                value: v.to_string(),
                target: "i64",
            }),
            Value::Float(v) => float_to_int(*v, "i64"),
            Value::Complex(c) if c.im == 0.0 => float_to_int(c.re, "i64"),
            _ => Err(self.coerce_err("i64")),
        }
    }

    /// Unsigned integer view. Negative values are out of range.
    pub fn as_u64(&self) -> Result<u64> {
        let overflow = |v: String| DTypeError::Overflow {
            value: v,
            target: "u64",
        };
        match self {
            Value::Bool(b) => Ok(*b as u64),
            Value::Int(v) => u64::try_from(*v).map_err(|_| overflow(v.to_string())),
            Value::UInt(v) => Ok(*v),
            Value::Float(v) => {
                let i = float_to_int(*v, "u64")?;
                u64::try_from(i).map_err(|_| overflow(v.to_string()))
            }
            _ => Err(self.coerce_err("u64")),
        }
    }

    /// Floating point view. Complex values must have a zero imaginary part.
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Int(v) => Ok(*v as f64),
            Value::UInt(v) => Ok(*v as f64),
            Value::Float(v) => Ok(*v),
            Value::Complex(c) if c.im == 0.0 => Ok(c.re),
            _ => Err(self.coerce_err("f64")),
        }
    }

    /// Complex view of any numeric value.
    pub fn as_complex(&self) -> Result<Complex64> {
        match self {
            Value::Complex(c) => Ok(*c),
            other => Ok(Complex64::new(other.as_f64()?, 0.0)),
        }
    }

    /// The referenced object, if this is a reference value.
    pub fn as_object(&self) -> Result<Option<&Object>> {
        match self {
            Value::Object(o) => Ok(o.as_ref()),
            _ => Err(self.coerce_err("object")),
        }
    }
}

fn float_to_int(v: f64, target: &'static str) -> Result<i64> {
    num_traits::cast::<f64, i64>(v.trunc()).ok_or(DTypeError::Overflow {
        value: v.to_string(),
        target,
    })
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Complex64> for Value {
    fn from(v: Complex64) -> Self {
        Value::Complex(v)
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        Value::Object(Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_coercions() {
        assert_eq!(Value::Float(3.9).as_i64().unwrap(), 3);
        assert_eq!(Value::Float(-3.9).as_i64().unwrap(), -3);
        assert_eq!(Value::Bool(true).as_f64().unwrap(), 1.0);
        assert_eq!(Value::UInt(7).as_i64().unwrap(), 7);
        assert!(Value::Int(0).as_bool().is_ok_and(|b| !b));
    }

    #[test]
    fn test_negative_to_unsigned_overflows() {
        let err = Value::Int(-1).as_u64().unwrap_err();
        assert!(matches!(err, DTypeError::Overflow { target: "u64", .. }));
    }

    #[test]
    fn test_complex_with_imaginary_part_does_not_narrow() {
        let c = Value::Complex(Complex64::new(1.0, 2.0));
        assert!(c.as_f64().is_err());
        let real = Value::Complex(Complex64::new(4.0, 0.0));
        assert_eq!(real.as_f64().unwrap(), 4.0);
    }

    #[test]
    fn test_record_is_not_numeric() {
        let r = Value::Record(vec![Value::Int(1)]);
        assert!(matches!(r.as_f64(), Err(DTypeError::Coerce { .. })));
    }
}
