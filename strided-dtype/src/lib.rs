//! Element type capability interface for the strided-store ecosystem.
//!
//! This crate holds the trait through which the storage engine reads and
//! writes individual elements, so external type systems can implement
//! [`DType`] without depending on the engine itself.
//!
//! # Core Types
//!
//! - [`DType`]: byte-level element codec (`read`, `store`, `fill`) plus kind queries
//! - [`Value`]: dynamically typed element value exchanged with a [`DType`]
//! - [`Object`]: shared managed reference stored in reference-kind slots
//! - [`RecordDType`] / [`Field`]: compound element types with named fields
//!
//! # Built-in dtypes
//!
//! Constructors in [`dtypes`] return shared [`DTypeRef`] handles:
//! `bool_()`, `int8()` .. `int64()`, `uint8()` .. `uint64()`, `float32()`,
//! `float64()`, `complex64()`, `complex128()`, `object()`.

pub mod dtype;
pub mod object;
pub mod record;
pub mod value;

pub use dtype::{dtypes, DType, DTypeKind, DTypeRef};
pub use object::Object;
pub use record::{Field, RecordDType};
pub use value::Value;

/// Errors raised while converting values to or from element bytes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DTypeError {
    /// The value cannot be represented by the target element kind.
    #[error("cannot coerce {value} to {target}")]
    Coerce { value: String, target: &'static str },

    /// The value is out of range for the target integer type.
    #[error("{value} out of range for {target}")]
    Overflow { value: String, target: &'static str },

    /// A record value has the wrong number of fields.
    #[error("record arity mismatch: expected {expected} fields, found {found}")]
    RecordArity { expected: usize, found: usize },

    /// Two fields of a record share a name.
    #[error("duplicate field name {0:?}")]
    DuplicateField(String),

    /// Reference-kind fields cannot be embedded in records.
    #[error("field {0:?} has a reference element kind")]
    ReferenceField(String),
}

/// Result type for dtype operations.
pub type Result<T> = std::result::Result<T, DTypeError>;
