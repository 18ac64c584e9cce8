//! Compound ("record") element types.

use crate::dtype::{DType, DTypeKind, DTypeRef};
use crate::value::Value;
use crate::{DTypeError, Result};

/// A named field of a record, located `offset` bytes into the element.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub offset: usize,
    pub dtype: DTypeRef,
}

/// Packed record type: fields laid out back to back in declaration order.
#[derive(Debug, Clone)]
pub struct RecordDType {
    name: String,
    fields: Vec<Field>,
    elsize: usize,
}

impl RecordDType {
    /// Build a packed record from `(name, dtype)` pairs.
    ///
    /// Reference-kind fields are rejected: a reference slot inside a record
    /// would not be visible to a per-element scan.
    pub fn new<S: Into<String>>(fields: Vec<(S, DTypeRef)>) -> Result<Self> {
        let mut out: Vec<Field> = Vec::with_capacity(fields.len());
        let mut offset = 0usize;
        for (name, dtype) in fields {
            let name = name.into();
            if out.iter().any(|f| f.name == name) {
                return Err(DTypeError::DuplicateField(name));
            }
            if dtype.is_reference() {
                return Err(DTypeError::ReferenceField(name));
            }
            let size = dtype.elsize();
            out.push(Field {
                name,
                offset,
                dtype,
            });
            offset += size;
        }
        let name = format!(
            "record[{}]",
            out.iter()
                .map(|f| format!("{}:{}", f.name, f.dtype.name()))
                .collect::<Vec<_>>()
                .join(",")
        );
        Ok(Self {
            name,
            fields: out,
            elsize: offset,
        })
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl DType for RecordDType {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DTypeKind {
        DTypeKind::Record
    }

    fn elsize(&self) -> usize {
        self.elsize
    }

    fn alignment(&self) -> usize {
        1
    }

    fn read(&self, bytes: &[u8]) -> Value {
        Value::Record(
            self.fields
                .iter()
                .map(|f| f.dtype.read(&bytes[f.offset..f.offset + f.dtype.elsize()]))
                .collect(),
        )
    }

    fn store(&self, bytes: &mut [u8], value: &Value) -> Result<()> {
        match value {
            Value::Record(values) => {
                if values.len() != self.fields.len() {
                    return Err(DTypeError::RecordArity {
                        expected: self.fields.len(),
                        found: values.len(),
                    });
                }
                for (f, v) in self.fields.iter().zip(values) {
                    f.dtype
                        .store(&mut bytes[f.offset..f.offset + f.dtype.elsize()], v)?;
                }
                Ok(())
            }
            other => Err(DTypeError::Coerce {
                value: format!("{other:?}"),
                target: "record",
            }),
        }
    }

    fn zero(&self) -> Value {
        Value::Record(self.fields.iter().map(|f| f.dtype.zero()).collect())
    }

    fn fields(&self) -> Option<&[Field]> {
        Some(&self.fields)
    }
}
