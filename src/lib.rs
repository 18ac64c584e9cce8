//! Strided N-dimensional array storage.
//!
//! An array is a flat byte buffer plus shape/stride metadata. Slicing,
//! transposing, reshaping and component projection produce new views over
//! the same buffer without copying; the buffer is shared by every view rooted
//! at it and freed when the last one goes away.
//!
//! # Core Types
//!
//! - [`Storage`]: reference-counted raw byte buffer, optionally carrying a
//!   [`ScanDescriptor`] for buffers of managed references
//! - [`ArrayView`]: storage + dtype + start offset + shape/strides/backstrides,
//!   in one of the [`ViewKind`] variants (owning, non-owning, slice)
//! - [`ArrayIter`] / [`IterState`]: restartable offset iteration, with
//!   broadcasting
//! - [`Chunk`]: primitive index components consumed by [`ArrayView::resolve`]
//! - [`ArrayBuffer`]: byte-level access for buffer-protocol consumers
//!
//! Element types come from the [`strided_dtype`] crate through the [`DType`]
//! trait; values cross the boundary as [`Value`].
//!
//! # Stride Arithmetic
//!
//! - [`default_strides`]: C/F default layout for a shape
//! - [`derive_strides_for_reshape`]: regroup axes without copying
//! - [`classify_contiguity`]: C / F / both / none
//! - [`broadcast_shape`], [`broadcast_strides`]: broadcasting
//!
//! All strides are in bytes and may be negative or zero.
//!
//! # Example
//!
//! ```rust
//! use strided_store::{dtypes, ArrayView, Chunk, Order, Resolved, Value};
//!
//! let a = ArrayView::from_fn(&[2, 3], dtypes::float64(), Order::C, |ix| {
//!     Value::Float((ix[0] * 3 + ix[1]) as f64)
//! })
//! .unwrap();
//!
//! // Zero-copy transpose
//! let t = a.transpose().unwrap();
//! assert_eq!(t.shape(), &[3, 2]);
//! assert_eq!(t.get_at(&[2, 1]).unwrap(), Value::Float(5.0));
//!
//! // Writes through a view are visible through the base array
//! let row = match a.resolve(&[Chunk::Index(1)]).unwrap() {
//!     Resolved::View(v) => v,
//!     Resolved::Offset(_) => unreachable!(),
//! };
//! row.fill(&Value::Float(0.0)).unwrap();
//! assert_eq!(a.get_at(&[1, 2]).unwrap(), Value::Float(0.0));
//! ```

pub mod assign;
pub mod broadcast;
pub mod buffer;
pub mod flags;
pub mod index;
pub mod iter;
pub mod storage;
pub mod strides;
pub mod trace;
pub mod transform;
pub mod view;

// ============================================================================
// Element types
// ============================================================================
pub use strided_dtype::{dtypes, DType, DTypeError, DTypeKind, DTypeRef, Object, RecordDType, Value};

// ============================================================================
// Stride arithmetic
// ============================================================================
pub use broadcast::{broadcast_shape, broadcast_strides};
pub use strides::{
    calc_backstrides, calc_start, classify_contiguity, default_strides,
    derive_strides_for_reshape, is_c_contiguous, is_f_contiguous, Contiguity, Order,
};

// ============================================================================
// Storage and tracing
// ============================================================================
pub use storage::{alloc_stats, allocate, AllocStats, BytesRef, Storage};
pub use trace::{CollectStats, ScanDescriptor, Tracer, GLOBAL_TRACER};

// ============================================================================
// Views, iteration and indexing
// ============================================================================
pub use buffer::ArrayBuffer;
pub use flags::ArrayFlags;
pub use index::{normalize_slice, Chunk, Item, Resolved, SliceBounds};
pub use iter::{ArrayIter, IterState, Offsets};
pub use view::{ArrayView, ViewKind};

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur during strided array operations.
#[derive(Debug, thiserror::Error)]
pub enum StridedError {
    /// Allocation of a buffer failed.
    #[error("out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },

    /// Integer index outside an axis.
    #[error("index {index} is out of bounds for axis {axis} with size {extent}")]
    IndexOutOfBounds {
        axis: usize,
        index: isize,
        extent: usize,
    },

    /// Shapes cannot be broadcast or reshaped into one another.
    #[error("shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    /// Write attempted through a read-only view.
    #[error("assignment destination is read-only")]
    ReadOnlyViolation,

    /// The layout cannot be regrouped into the new shape without a copy.
    #[error("cannot reshape {from:?} into {to:?} without copying")]
    IncompatibleReshape { from: Vec<usize>, to: Vec<usize> },

    /// Array ranks do not match.
    #[error("rank mismatch: {0} vs {1}")]
    RankMismatch(usize, usize),

    /// Invalid axis index for the given array rank.
    #[error("invalid axis {axis} for rank {rank}")]
    InvalidAxis { axis: usize, rank: usize },

    #[error("too many indices: {given} for rank {rank}")]
    TooManyIndices { given: usize, rank: usize },

    #[error("field named {0} not found")]
    FieldNotFound(String),

    #[error("field index {0:?} cannot be combined with other indices")]
    FieldNotAlone(String),

    #[error("0-d arrays can't be indexed")]
    ZeroDimIndex,

    #[error("cannot slice a 0-d array")]
    ZeroDimSlice,

    /// New dtype has a different element size.
    #[error("dtype size mismatch: expected {expected}, found {found}")]
    DTypeSizeMismatch { expected: usize, found: usize },

    /// Reference slots reinterpreted as plain data or the other way round.
    #[error("cannot reinterpret {from} as {to}")]
    ReferenceReinterpret { from: String, to: String },

    /// Reference elements off the traced slot grid of their storage, or
    /// plain elements over traced slots.
    #[error("{dtype} elements do not line up with the traced reference slots of the storage")]
    ReferenceLayout { dtype: String },

    #[error("slice step cannot be zero")]
    InvalidStep,

    /// Stride array length doesn't match dimensions.
    #[error("stride and dims length mismatch")]
    StrideLengthMismatch,

    /// Integer overflow while computing array offset, or offset outside the buffer.
    #[error("offset overflow while computing pointer")]
    OffsetOverflow,

    /// Byte access requested while a conflicting access is live.
    #[error("storage is already borrowed")]
    AlreadyBorrowed,

    #[error(transparent)]
    DType(#[from] DTypeError),
}

/// Result type for strided array operations.
pub type Result<T> = std::result::Result<T, StridedError>;
