//! The element type capability trait and built-in element types.
//!
//! A [`DType`] only ever sees the bytes of a single element: the storage
//! engine slices the element out of its buffer and hands it over, so
//! implementations never deal with strides or offsets except in [`DType::fill`].

use std::fmt;
use std::sync::Arc;

use num_complex::Complex64;

use crate::object::{self, SLOT_SIZE};
use crate::record::Field;
use crate::value::Value;
use crate::{DTypeError, Result};

/// Broad classification of an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DTypeKind {
    Bool,
    Int,
    UInt,
    Float,
    Complex,
    Object,
    Record,
}

/// Shared handle to an element type.
pub type DTypeRef = Arc<dyn DType>;

/// Byte-level element codec consumed by the storage engine.
pub trait DType: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> DTypeKind;

    /// Size of one element in bytes.
    fn elsize(&self) -> usize;

    fn alignment(&self) -> usize {
        self.elsize().clamp(1, 16)
    }

    fn is_complex(&self) -> bool {
        self.kind() == DTypeKind::Complex
    }

    fn is_record(&self) -> bool {
        self.kind() == DTypeKind::Record
    }

    /// Whether elements embed managed references that a tracer must visit.
    fn is_reference(&self) -> bool {
        self.kind() == DTypeKind::Object
    }

    /// Decode the element held in `bytes` (exactly `elsize()` long).
    fn read(&self, bytes: &[u8]) -> Value;

    /// Encode `value` into `bytes` (exactly `elsize()` long).
    fn store(&self, bytes: &mut [u8], value: &Value) -> Result<()>;

    /// Store `value` into `count` elements of `buf`, the first at byte `start`
    /// and each following one `step` bytes further.
    fn fill(&self, buf: &mut [u8], value: &Value, start: usize, count: usize, step: usize) -> Result<()> {
        let elsize = self.elsize();
        for i in 0..count {
            let at = start + i * step;
            self.store(&mut buf[at..at + elsize], value)?;
        }
        Ok(())
    }

    /// The value a zero-filled element decodes to.
    fn zero(&self) -> Value;

    /// Named fields of a record type.
    fn fields(&self) -> Option<&[Field]> {
        None
    }

    /// Component type of a complex element (the float type of `re` and `im`).
    fn component_dtype(&self) -> Option<DTypeRef> {
        None
    }

    /// Drop whatever the element owns and leave it zeroed.
    fn release_slot(&self, bytes: &mut [u8]) {
        bytes.fill(0);
    }
}

// ---------------------------------------------------------------------------
// Numeric element types
// ---------------------------------------------------------------------------

macro_rules! impl_int_dtype {
    ($name:ident, $t:ty, $label:literal, $kind:ident, $variant:ident, $getter:ident) => {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl DType for $name {
            fn name(&self) -> &str {
                $label
            }

            fn kind(&self) -> DTypeKind {
                DTypeKind::$kind
            }

            fn elsize(&self) -> usize {
                std::mem::size_of::<$t>()
            }

            fn read(&self, bytes: &[u8]) -> Value {
                Value::$variant(bytemuck::pod_read_unaligned::<$t>(bytes) as _)
            }

            fn store(&self, bytes: &mut [u8], value: &Value) -> Result<()> {
                let wide = value.$getter()?;
                let v: $t = num_traits::cast(wide).ok_or(DTypeError::Overflow {
                    value: wide.to_string(),
                    target: $label,
                })?;
                bytes.copy_from_slice(bytemuck::bytes_of(&v));
                Ok(())
            }

            fn zero(&self) -> Value {
                Value::$variant(0)
            }
        }
    };
}

impl_int_dtype!(Int8, i8, "int8", Int, Int, as_i64);
impl_int_dtype!(Int16, i16, "int16", Int, Int, as_i64);
impl_int_dtype!(Int32, i32, "int32", Int, Int, as_i64);
impl_int_dtype!(Int64, i64, "int64", Int, Int, as_i64);
impl_int_dtype!(UInt8, u8, "uint8", UInt, UInt, as_u64);
impl_int_dtype!(UInt16, u16, "uint16", UInt, UInt, as_u64);
impl_int_dtype!(UInt32, u32, "uint32", UInt, UInt, as_u64);
impl_int_dtype!(UInt64, u64, "uint64", UInt, UInt, as_u64);

macro_rules! impl_float_dtype {
    ($name:ident, $t:ty, $label:literal) => {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl DType for $name {
            fn name(&self) -> &str {
                $label
            }

            fn kind(&self) -> DTypeKind {
                DTypeKind::Float
            }

            fn elsize(&self) -> usize {
                std::mem::size_of::<$t>()
            }

            fn read(&self, bytes: &[u8]) -> Value {
                Value::Float(bytemuck::pod_read_unaligned::<$t>(bytes) as f64)
            }

            fn store(&self, bytes: &mut [u8], value: &Value) -> Result<()> {
                let v = value.as_f64()? as $t;
                bytes.copy_from_slice(bytemuck::bytes_of(&v));
                Ok(())
            }

            fn zero(&self) -> Value {
                Value::Float(0.0)
            }
        }
    };
}

impl_float_dtype!(Float32, f32, "float32");
impl_float_dtype!(Float64, f64, "float64");

macro_rules! impl_complex_dtype {
    ($name:ident, $t:ty, $label:literal, $component:ident) => {
        /// Complex element stored as `[re, im]`.
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl DType for $name {
            fn name(&self) -> &str {
                $label
            }

            fn kind(&self) -> DTypeKind {
                DTypeKind::Complex
            }

            fn elsize(&self) -> usize {
                2 * std::mem::size_of::<$t>()
            }

            fn alignment(&self) -> usize {
                std::mem::align_of::<$t>()
            }

            fn read(&self, bytes: &[u8]) -> Value {
                let half = std::mem::size_of::<$t>();
                let re = bytemuck::pod_read_unaligned::<$t>(&bytes[..half]);
                let im = bytemuck::pod_read_unaligned::<$t>(&bytes[half..]);
                Value::Complex(Complex64::new(re as f64, im as f64))
            }

            fn store(&self, bytes: &mut [u8], value: &Value) -> Result<()> {
                let c = value.as_complex()?;
                let half = std::mem::size_of::<$t>();
                let (re, im) = (c.re as $t, c.im as $t);
                bytes[..half].copy_from_slice(bytemuck::bytes_of(&re));
                bytes[half..].copy_from_slice(bytemuck::bytes_of(&im));
                Ok(())
            }

            fn zero(&self) -> Value {
                Value::Complex(Complex64::new(0.0, 0.0))
            }

            fn component_dtype(&self) -> Option<DTypeRef> {
                Some(Arc::new($component))
            }
        }
    };
}

impl_complex_dtype!(Complex64Type, f32, "complex64", Float32);
impl_complex_dtype!(Complex128Type, f64, "complex128", Float64);

#[derive(Debug, Clone, Copy, Default)]
pub struct Bool;

impl DType for Bool {
    fn name(&self) -> &str {
        "bool"
    }

    fn kind(&self) -> DTypeKind {
        DTypeKind::Bool
    }

    fn elsize(&self) -> usize {
        1
    }

    fn read(&self, bytes: &[u8]) -> Value {
        Value::Bool(bytes[0] != 0)
    }

    fn store(&self, bytes: &mut [u8], value: &Value) -> Result<()> {
        bytes[0] = value.as_bool()? as u8;
        Ok(())
    }

    fn zero(&self) -> Value {
        Value::Bool(false)
    }
}

// ---------------------------------------------------------------------------
// Reference element type
// ---------------------------------------------------------------------------

/// Generic object element: each slot holds one [`Object`](crate::Object) reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectDType;

impl DType for ObjectDType {
    fn name(&self) -> &str {
        "object"
    }

    fn kind(&self) -> DTypeKind {
        DTypeKind::Object
    }

    fn elsize(&self) -> usize {
        SLOT_SIZE
    }

    fn read(&self, bytes: &[u8]) -> Value {
        // SAFETY: object slots are only ever written through `store`/`release_slot`
        // or zero-initialized by the storage engine.
        Value::Object(unsafe { object::load_slot(bytes) })
    }

    fn store(&self, bytes: &mut [u8], value: &Value) -> Result<()> {
        let obj = value.as_object()?;
        // SAFETY: see `read`.
        unsafe { object::store_slot(bytes, obj) };
        Ok(())
    }

    fn zero(&self) -> Value {
        Value::Object(None)
    }

    fn release_slot(&self, bytes: &mut [u8]) {
        // SAFETY: see `read`.
        unsafe { object::release_slot(bytes) };
    }
}

/// Constructors for the built-in element types.
pub mod dtypes {
    use super::*;

    pub fn bool_() -> DTypeRef {
        Arc::new(Bool)
    }

    pub fn int8() -> DTypeRef {
        Arc::new(Int8)
    }

    pub fn int16() -> DTypeRef {
        Arc::new(Int16)
    }

    pub fn int32() -> DTypeRef {
        Arc::new(Int32)
    }

    pub fn int64() -> DTypeRef {
        Arc::new(Int64)
    }

    pub fn uint8() -> DTypeRef {
        Arc::new(UInt8)
    }

    pub fn uint16() -> DTypeRef {
        Arc::new(UInt16)
    }

    pub fn uint32() -> DTypeRef {
        Arc::new(UInt32)
    }

    pub fn uint64() -> DTypeRef {
        Arc::new(UInt64)
    }

    pub fn float32() -> DTypeRef {
        Arc::new(Float32)
    }

    pub fn float64() -> DTypeRef {
        Arc::new(Float64)
    }

    pub fn complex64() -> DTypeRef {
        Arc::new(Complex64Type)
    }

    pub fn complex128() -> DTypeRef {
        Arc::new(Complex128Type)
    }

    pub fn object() -> DTypeRef {
        Arc::new(ObjectDType)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Object;
    use approx::assert_relative_eq;

    #[test]
    fn test_int_store_read() {
        let dt = Int16;
        let mut buf = [0u8; 2];
        dt.store(&mut buf, &Value::Int(-300)).unwrap();
        assert_eq!(dt.read(&buf), Value::Int(-300));
    }

    #[test]
    fn test_int_overflow_rejected() {
        let mut buf = [0u8; 1];
        let err = Int8.store(&mut buf, &Value::Int(200)).unwrap_err();
        assert!(matches!(err, DTypeError::Overflow { target: "int8", .. }));
        assert!(UInt8.store(&mut buf, &Value::Int(-1)).is_err());
    }

    #[test]
    fn test_float32_roundtrip_precision() {
        let mut buf = [0u8; 4];
        Float32.store(&mut buf, &Value::Float(0.1)).unwrap();
        match Float32.read(&buf) {
            Value::Float(v) => assert_relative_eq!(v, 0.1, epsilon = 1e-7),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_complex_layout() {
        let dt = Complex128Type;
        let mut buf = [0u8; 16];
        dt.store(&mut buf, &Value::Complex(Complex64::new(1.5, -2.0)))
            .unwrap();
        assert_eq!(Float64.read(&buf[..8]), Value::Float(1.5));
        assert_eq!(Float64.read(&buf[8..]), Value::Float(-2.0));
        assert_eq!(dt.component_dtype().unwrap().elsize(), 8);
        assert_eq!(Complex64Type.component_dtype().unwrap().elsize(), 4);
    }

    #[test]
    fn test_fill_with_step() {
        let mut buf = [0u8; 32];
        Int32.fill(&mut buf, &Value::Int(7), 4, 3, 8).unwrap();
        let words: Vec<i32> = buf
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<i32>)
            .collect();
        assert_eq!(words, vec![0, 7, 0, 7, 0, 7, 0, 0]);
    }

    #[test]
    fn test_object_dtype_retains_references() {
        let dt = ObjectDType;
        let obj = Object::new(String::from("payload"));
        let mut slot = [0u8; SLOT_SIZE];
        assert_eq!(dt.read(&slot), Value::Object(None));
        dt.store(&mut slot, &Value::from(obj.clone())).unwrap();
        assert_eq!(obj.strong_count(), 2);
        assert_eq!(dt.read(&slot), Value::Object(Some(obj.clone())));
        dt.release_slot(&mut slot);
        assert_eq!(obj.strong_count(), 1);
        assert!(dt.store(&mut slot, &Value::Int(1)).is_err());
    }

    #[test]
    fn test_kind_queries() {
        assert!(dtypes::complex64().is_complex());
        assert!(dtypes::object().is_reference());
        assert!(!dtypes::float64().is_reference());
        assert_eq!(dtypes::bool_().elsize(), 1);
    }
}
