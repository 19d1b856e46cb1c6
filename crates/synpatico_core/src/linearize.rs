//! Value linearization and reconstruction.
//!
//! [`linearize`] flattens a value into the canonical traversal order
//! (objects by lexicographic key, arrays by index), producing the slot
//! sequence a packet carries. [`reconstruct`] is the inverse: it walks
//! a [`Shape`] in the same order, consuming one slot per leaf. The two
//! sides agree because both derive their order from the same shape
//! rules; the decoder validates nothing beyond slot exhaustion.

use crate::err::{ProtocolError, ProtocolResult};
use crate::shape::Shape;
use crate::value::Value;
use crate::DEFAULT_DEPTH_CAP;

/// Flatten a value into its canonical leaf sequence. Rich scalars are
/// emitted as single slots regardless of internal complexity.
pub fn linearize(value: &Value) -> ProtocolResult<Vec<Value>> {
    let mut slots = Vec::new();
    flatten(value, 0, DEFAULT_DEPTH_CAP, &mut slots)?;

    Ok(slots)
}

fn flatten(value: &Value, depth: usize, cap: usize, slots: &mut Vec<Value>) -> ProtocolResult<()> {
    if depth >= cap {
        return Err(ProtocolError::DepthExceeded(cap));
    }

    match value {
        Value::Array(items) => {
            for item in items {
                flatten(item, depth + 1, cap, slots)?;
            }
        }
        Value::Object(entries) => {
            let mut sorted: Vec<&(String, Value)> = entries.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));

            for (_, child) in sorted {
                flatten(child, depth + 1, cap, slots)?;
            }
        }
        leaf => slots.push(leaf.clone()),
    }

    Ok(())
}

/// Rebuild a value from a slot sequence and the shape that produced
/// it. Surplus slots are ignored; running out of slots is a
/// [`ProtocolError::ShapeMismatch`].
pub fn reconstruct(slots: &[Value], shape: &Shape) -> ProtocolResult<Value> {
    let mut cursor = SlotCursor { slots, position: 0 };

    rebuild(&mut cursor, shape)
}

struct SlotCursor<'a> {
    slots: &'a [Value],
    position: usize,
}

impl<'a> SlotCursor<'a> {
    fn next(&mut self) -> ProtocolResult<&'a Value> {
        let slot = self.slots.get(self.position).ok_or_else(|| {
            ProtocolError::ShapeMismatch(format!(
                "value sequence exhausted at slot {}",
                self.position
            ))
        })?;

        self.position += 1;
        Ok(slot)
    }
}

fn rebuild(cursor: &mut SlotCursor, shape: &Shape) -> ProtocolResult<Value> {
    match shape {
        Shape::Leaf(_) => Ok(cursor.next()?.clone()),
        Shape::Array { items } => {
            let rebuilt = items
                .iter()
                .map(|item| rebuild(cursor, item))
                .collect::<ProtocolResult<Vec<_>>>()?;

            Ok(Value::Array(rebuilt))
        }
        Shape::Object { fields } => {
            let rebuilt = fields
                .iter()
                .map(|(key, field)| Ok((key.clone(), rebuild(cursor, field)?)))
                .collect::<ProtocolResult<Vec<_>>>()?;

            Ok(Value::Object(rebuilt))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::extract_shape;

    fn num(n: i64) -> Value {
        Value::Number(serde_json::Number::from(n))
    }

    fn s(v: &str) -> Value {
        Value::String(v.into())
    }

    #[test]
    fn test_canonical_order_is_sorted_keys() {
        let value = Value::Object(vec![
            ("b".into(), num(2)),
            ("a".into(), num(1)),
            ("c".into(), num(3)),
        ]);

        let slots = linearize(&value).unwrap();

        assert_eq!(slots, vec![num(1), num(2), num(3)]);
    }

    #[test]
    fn test_arrays_keep_index_order() {
        let value = Value::Array(vec![s("z"), s("a"), s("m")]);

        let slots = linearize(&value).unwrap();

        assert_eq!(slots, vec![s("z"), s("a"), s("m")]);
    }

    #[test]
    fn test_rich_scalar_occupies_one_slot() {
        let value = Value::Object(vec![
            ("id".into(), num(7)),
            (
                "attrs".into(),
                Value::Map(vec![(s("k1"), num(1)), (s("k2"), num(2))]),
            ),
        ]);

        let slots = linearize(&value).unwrap();

        assert_eq!(slots.len(), 2);
        assert!(matches!(slots[0], Value::Map(_)));
        assert_eq!(slots[1], num(7));
    }

    #[test]
    fn test_round_trip_against_shape() {
        let value = Value::Object(vec![
            (
                "users".into(),
                Value::Array(vec![
                    Value::Object(vec![("name".into(), s("a")), ("age".into(), num(1))]),
                    Value::Object(vec![("name".into(), s("b")), ("age".into(), num(2))]),
                ]),
            ),
            ("total".into(), num(2)),
        ]);

        let shape = extract_shape(&value).unwrap();
        let slots = linearize(&value).unwrap();
        let rebuilt = reconstruct(&slots, &shape).unwrap();

        assert_eq!(rebuilt, value);
    }

    #[test]
    fn test_exhausted_slots_is_shape_mismatch() {
        let value = Value::Object(vec![("a".into(), num(1)), ("b".into(), num(2))]);
        let shape = extract_shape(&value).unwrap();

        let short = vec![num(1)];

        assert!(matches!(
            reconstruct(&short, &shape),
            Err(ProtocolError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_surplus_slots_are_ignored() {
        let value = num(5);
        let shape = extract_shape(&value).unwrap();

        let slots = vec![num(5), num(6), num(7)];

        assert_eq!(reconstruct(&slots, &shape).unwrap(), num(5));
    }
}
