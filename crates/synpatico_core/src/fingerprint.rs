//! Structural fingerprinting.
//!
//! Maps a value to a [`StructureId`](crate::state::StructureId): a
//! string both peers can derive independently from the same response
//! body, with no prior coordination. The id must be stable under object
//! key reordering, sensitive to array order and length, sensitive to
//! every leaf kind, and cheap enough to run on every response.
//!
//! The scheme is stateless by construction: per-key contributions come
//! from hashing the key string, never from a shared counter, so two
//! processes that have never exchanged a byte agree on every id.

use crate::err::{ProtocolError, ProtocolResult};
use crate::hash::key_bit;
use crate::value::Value;
use crate::DEFAULT_DEPTH_CAP;

/// Id of the empty record.
pub const EMPTY_OBJECT_ID: &str = "{}";
/// Id of the empty sequence.
pub const EMPTY_ARRAY_ID: &str = "[]";

// Fixed type bits. These are protocol constants: changing any of them
// changes every fingerprint ever produced. The bigint, undefined and
// symbol bits are reserved and currently unproduced; all rich scalars
// share the special bit so the id stays a pure function of the shape.
pub const TYPE_BIT_NULL: u64 = 1 << 0;
pub const TYPE_BIT_UNDEFINED: u64 = 1 << 1;
pub const TYPE_BIT_BOOL: u64 = 1 << 2;
pub const TYPE_BIT_NUMBER: u64 = 1 << 3;
pub const TYPE_BIT_STRING: u64 = 1 << 4;
pub const TYPE_BIT_BIGINT: u64 = 1 << 5;
pub const TYPE_BIT_SYMBOL: u64 = 1 << 6;
pub const TYPE_BIT_OBJECT: u64 = 1 << 7;
pub const TYPE_BIT_ARRAY: u64 = 1 << 8;
pub const TYPE_BIT_SPECIAL: u64 = 1 << 9;

/// Reserved sigil prefixing array index keys, so they share no
/// namespace with record keys of the form `[i]`.
const INDEX_SIGIL: char = '#';

/// The result of fingerprinting one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// The structure id, e.g. `L0:9c41-L1:58f22a1`.
    pub id: String,
    /// Depth levels past the root that contributed hash parts.
    pub levels: u32,
    /// Sequence number assigned in collision mode; 0 otherwise.
    pub collision_count: u64,
}

/// Per-level accumulators before rendering, or one of the two fixed
/// ids. Kept separate so collision mode can swap out the `L0` part
/// without re-traversing.
#[derive(Debug, Clone)]
pub(crate) enum RawFingerprint {
    EmptyObject,
    EmptyArray,
    Levels(Vec<u64>),
}

pub(crate) fn type_bit(value: &Value) -> u64 {
    match value {
        Value::Null => TYPE_BIT_NULL,
        Value::Bool(_) => TYPE_BIT_BOOL,
        Value::Number(_) => TYPE_BIT_NUMBER,
        Value::String(_) => TYPE_BIT_STRING,
        Value::Object(_) => TYPE_BIT_OBJECT,
        Value::Array(_) => TYPE_BIT_ARRAY,
        Value::Date(_) | Value::Map(_) | Value::Set(_) | Value::Error(_) => TYPE_BIT_SPECIAL,
    }
}

/// Fingerprint a value with the default depth cap.
///
/// Pure: the id is a function of structure alone. Collision-mode ids
/// are handled by [`Engine`](crate::state::Engine), which owns the
/// counter state.
pub fn fingerprint(value: &Value) -> ProtocolResult<Fingerprint> {
    fingerprint_with_cap(value, DEFAULT_DEPTH_CAP)
}

/// Fingerprint a value, bounding recursion at `depth_cap`.
pub fn fingerprint_with_cap(value: &Value, depth_cap: usize) -> ProtocolResult<Fingerprint> {
    let raw = raw_fingerprint(value, depth_cap)?;

    Ok(match raw {
        RawFingerprint::EmptyObject => Fingerprint {
            id: EMPTY_OBJECT_ID.to_string(),
            levels: 0,
            collision_count: 0,
        },
        RawFingerprint::EmptyArray => Fingerprint {
            id: EMPTY_ARRAY_ID.to_string(),
            levels: 0,
            collision_count: 0,
        },
        RawFingerprint::Levels(levels) => Fingerprint {
            levels: (levels.len() - 1) as u32,
            id: render_full(&levels),
            collision_count: 0,
        },
    })
}

pub(crate) fn raw_fingerprint(value: &Value, depth_cap: usize) -> ProtocolResult<RawFingerprint> {
    match value {
        Value::Object(entries) if entries.is_empty() => Ok(RawFingerprint::EmptyObject),
        Value::Array(items) if items.is_empty() => Ok(RawFingerprint::EmptyArray),
        Value::Object(_) | Value::Array(_) => {
            let mut levels = Vec::new();
            visit(value, 0, depth_cap, &mut levels)?;

            Ok(RawFingerprint::Levels(levels))
        }
        // primitives and rich scalars short-circuit to L0:T-L1:T
        other => {
            let bit = type_bit(other);
            Ok(RawFingerprint::Levels(vec![bit, bit]))
        }
    }
}

/// Render the full id, `L0:…` onward.
pub(crate) fn render_full(levels: &[u64]) -> String {
    render_from(levels, 0)
}

/// Render the signature: levels past the root, `L1:…` onward. This is
/// the collision-counter key.
pub(crate) fn render_signature(levels: &[u64]) -> String {
    render_from(levels, 1)
}

fn render_from(levels: &[u64], start: usize) -> String {
    levels[start..]
        .iter()
        .enumerate()
        .map(|(offset, part)| format!("L{}:{:x}", start + offset, part))
        .collect::<Vec<_>>()
        .join("-")
}

fn visit(value: &Value, depth: usize, cap: usize, levels: &mut Vec<u64>) -> ProtocolResult<()> {
    if depth >= cap {
        return Err(ProtocolError::DepthExceeded(cap));
    }

    // accumulators start at 1 << d on first touch of a depth; the
    // shift wraps past 64 levels, which is deterministic on every
    // platform
    while levels.len() <= depth {
        let d = levels.len() as u32;
        levels.push(1u64.wrapping_shl(d));
    }

    levels[depth] = levels[depth].wrapping_add(type_bit(value));

    match value {
        Value::Object(entries) => {
            let mut sorted: Vec<&(String, Value)> = entries.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));

            for (position, (key, child)) in sorted.iter().enumerate() {
                let multiplier = (position + 1) as u64;
                let contribution = key_bit(key)
                    .wrapping_mul(multiplier)
                    .wrapping_add(type_bit(child).wrapping_mul(multiplier));

                levels[depth] = levels[depth].wrapping_add(contribution);
                visit(child, depth + 1, cap, levels)?;
            }
        }
        Value::Array(items) => {
            let length_key = format!("length:{}", items.len());
            levels[depth] = levels[depth].wrapping_add(key_bit(&length_key));

            for (index, child) in items.iter().enumerate() {
                let multiplier = (index + 1) as u64;
                let index_key = format!("{}[{}]", INDEX_SIGIL, index);
                let contribution = key_bit(&index_key)
                    .wrapping_mul(multiplier)
                    .wrapping_add(type_bit(child).wrapping_mul(multiplier));

                levels[depth] = levels[depth].wrapping_add(contribution);
                visit(child, depth + 1, cap, levels)?;
            }
        }
        _ => (),
    }

    Ok(())
}
