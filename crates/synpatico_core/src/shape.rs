//! Shape extraction.
//!
//! A [`Shape`] describes the skeleton of a value: object keys, array
//! item shapes, and leaf kinds, with no leaf content. Both peers derive
//! the same shape from the same response body and index it under the
//! structural fingerprint, which is what lets a values-only packet be
//! reconstructed without transmitting structure.

use crate::err::{ProtocolError, ProtocolResult};
use crate::value::Value;
use crate::DEFAULT_DEPTH_CAP;

/// Kind tag for a leaf position.
///
/// `Bigint`, `Undefined` and `Symbol` are reserved: they have fixed
/// type bits in the fingerprint table but no wire representation, and
/// the value model never produces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    Null,
    Bool,
    Number,
    String,
    Bigint,
    Undefined,
    Symbol,
    /// Any rich scalar. Opaque to shape; the envelope self-describes
    /// the concrete kind on the wire.
    SpecialValue,
}

/// Recursive description of a value's structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Leaf(LeafKind),
    /// Positional item shapes; the length is part of the shape.
    Array { items: Vec<Shape> },
    /// Fields in lexicographic key order. This is the canonical
    /// traversal order for every component that walks a shape.
    Object { fields: Vec<(String, Shape)> },
}

impl Shape {
    /// Number of leaf slots a linearized value of this shape occupies.
    pub fn leaf_count(&self) -> usize {
        match self {
            Shape::Leaf(_) => 1,
            Shape::Array { items } => items.iter().map(Shape::leaf_count).sum(),
            Shape::Object { fields } => fields.iter().map(|(_, s)| s.leaf_count()).sum(),
        }
    }
}

/// Leaf kind of a non-container value.
fn leaf_kind(value: &Value) -> LeafKind {
    match value {
        Value::Null => LeafKind::Null,
        Value::Bool(_) => LeafKind::Bool,
        Value::Number(_) => LeafKind::Number,
        Value::String(_) => LeafKind::String,
        Value::Date(_) | Value::Map(_) | Value::Set(_) | Value::Error(_) => LeafKind::SpecialValue,
        Value::Array(_) | Value::Object(_) => unreachable!("containers have no leaf kind"),
    }
}

/// Derive the shape of a value with the default depth cap.
pub fn extract_shape(value: &Value) -> ProtocolResult<Shape> {
    extract_shape_with_cap(value, DEFAULT_DEPTH_CAP)
}

/// Derive the shape of a value, bounding recursion at `depth_cap`.
pub fn extract_shape_with_cap(value: &Value, depth_cap: usize) -> ProtocolResult<Shape> {
    walk(value, 0, depth_cap)
}

fn walk(value: &Value, depth: usize, cap: usize) -> ProtocolResult<Shape> {
    if depth >= cap {
        return Err(ProtocolError::DepthExceeded(cap));
    }

    match value {
        Value::Array(items) => {
            let items = items
                .iter()
                .map(|item| walk(item, depth + 1, cap))
                .collect::<ProtocolResult<Vec<_>>>()?;

            Ok(Shape::Array { items })
        }
        Value::Object(entries) => {
            let mut fields = entries
                .iter()
                .map(|(key, child)| Ok((key.clone(), walk(child, depth + 1, cap)?)))
                .collect::<ProtocolResult<Vec<_>>>()?;

            fields.sort_by(|a, b| a.0.cmp(&b.0));

            Ok(Shape::Object { fields })
        }
        other => Ok(Shape::Leaf(leaf_kind(other))),
    }
}
