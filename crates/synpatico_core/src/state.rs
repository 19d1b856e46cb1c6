//! Engine-owned structure state.
//!
//! All caches live in an explicit [`Engine`] value rather than process
//! globals: the shape cache, the endpoint map, and the collision
//! counter. State is per-process and never persisted; [`Engine::reset_state`]
//! recreates everything. Learned definitions are insert-only, so
//! concurrent learners that compute the same id converge on identical
//! entries.

use std::collections::HashMap;

use crate::err::ProtocolResult;
use crate::fingerprint::{self, Fingerprint, RawFingerprint, EMPTY_ARRAY_ID, EMPTY_OBJECT_ID};
use crate::shape::{extract_shape_with_cap, Shape};
use crate::value::Value;
use crate::DEFAULT_DEPTH_CAP;

/// Deterministic string identifier of a value's structure.
pub type StructureId = String;

/// A learned structure: the id and the shape it indexes. Identical by
/// construction on both peers.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureDefinition {
    pub id: StructureId,
    pub shape: Shape,
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Recursion bound for fingerprinting, shape extraction and
    /// linearization.
    pub depth_cap: usize,
    /// When set, every fingerprint of an equal-structure value gets a
    /// fresh `L0` part from the collision counter. Off by default; the
    /// id is then a pure function of structure.
    pub new_id_on_collision: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            depth_cap: DEFAULT_DEPTH_CAP,
            new_id_on_collision: false,
        }
    }
}

/// Request identity: method plus full URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    method: String,
    url: String,
}

impl EndpointKey {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// One peer's view of the learned structure state.
#[derive(Debug, Default)]
pub struct Engine {
    options: EngineOptions,
    shapes: HashMap<StructureId, StructureDefinition>,
    endpoints: HashMap<EndpointKey, StructureId>,
    collisions: HashMap<String, u64>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Fingerprint a value under this engine's options. In collision
    /// mode the `L0` part is the per-signature call sequence number;
    /// otherwise this is the pure structural id.
    pub fn fingerprint(&mut self, value: &Value) -> ProtocolResult<Fingerprint> {
        let raw = fingerprint::raw_fingerprint(value, self.options.depth_cap)?;

        let levels = match raw {
            RawFingerprint::EmptyObject => {
                return Ok(Fingerprint {
                    id: EMPTY_OBJECT_ID.to_string(),
                    levels: 0,
                    collision_count: 0,
                })
            }
            RawFingerprint::EmptyArray => {
                return Ok(Fingerprint {
                    id: EMPTY_ARRAY_ID.to_string(),
                    levels: 0,
                    collision_count: 0,
                })
            }
            RawFingerprint::Levels(levels) => levels,
        };

        if self.options.new_id_on_collision {
            let signature = fingerprint::render_signature(&levels);
            let counter = self.collisions.entry(signature.clone()).or_insert(0);
            let sequence = *counter;
            *counter += 1;

            Ok(Fingerprint {
                id: format!("L0:{}-{}", sequence, signature),
                levels: (levels.len() - 1) as u32,
                collision_count: sequence,
            })
        } else {
            Ok(Fingerprint {
                levels: (levels.len() - 1) as u32,
                id: fingerprint::render_full(&levels),
                collision_count: 0,
            })
        }
    }

    /// Fingerprint a value, extract its shape, and cache both. The
    /// endpoint mapping, when given, is updated to the fresh id
    /// (drifted endpoints relearn); the shape cache itself is
    /// insert-only.
    ///
    /// Everything is computed before either cache is touched, so a
    /// partially learned definition is never observable.
    pub fn learn(
        &mut self,
        endpoint: Option<&EndpointKey>,
        value: &Value,
    ) -> ProtocolResult<Fingerprint> {
        let fp = self.fingerprint(value)?;
        let shape = extract_shape_with_cap(value, self.options.depth_cap)?;

        if !self.shapes.contains_key(&fp.id) {
            self.shapes.insert(
                fp.id.clone(),
                StructureDefinition {
                    id: fp.id.clone(),
                    shape,
                },
            );
        }

        if let Some(endpoint) = endpoint {
            log::debug!("learned {} -> {}", endpoint, fp.id);
            self.endpoints.insert(endpoint.clone(), fp.id.clone());
        }

        Ok(fp)
    }

    pub fn definition(&self, id: &str) -> Option<&StructureDefinition> {
        self.shapes.get(id)
    }

    pub fn known_id(&self, endpoint: &EndpointKey) -> Option<&StructureId> {
        self.endpoints.get(endpoint)
    }

    /// Drop the learned mapping for one endpoint. The shape itself
    /// stays cached; other endpoints may still resolve to it.
    pub fn forget_endpoint(&mut self, endpoint: &EndpointKey) {
        if self.endpoints.remove(endpoint).is_some() {
            log::debug!("discarded learned state for {}", endpoint);
        }
    }

    /// Number of learned structure definitions.
    pub fn structure_count(&self) -> usize {
        self.shapes.len()
    }

    /// Recreate all caches.
    pub fn reset_state(&mut self) {
        self.shapes = HashMap::new();
        self.endpoints = HashMap::new();
        self.collisions = HashMap::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: i64) -> Value {
        Value::Number(serde_json::Number::from(n))
    }

    fn sample() -> Value {
        Value::Object(vec![
            ("id".into(), num(1)),
            ("name".into(), Value::String("first".into())),
        ])
    }

    #[test]
    fn test_learn_and_lookup() {
        let mut engine = Engine::new();
        let endpoint = EndpointKey::new("get", "https://api.example.com/users/1");

        let fp = engine.learn(Some(&endpoint), &sample()).unwrap();

        assert_eq!(engine.known_id(&endpoint), Some(&fp.id));
        assert_eq!(engine.definition(&fp.id).unwrap().id, fp.id);
        assert_eq!(engine.structure_count(), 1);

        // method is normalized
        let upper = EndpointKey::new("GET", "https://api.example.com/users/1");
        assert_eq!(engine.known_id(&upper), Some(&fp.id));
    }

    #[test]
    fn test_relearn_overwrites_endpoint_not_shapes() {
        let mut engine = Engine::new();
        let endpoint = EndpointKey::new("GET", "https://api.example.com/items");

        let first = engine.learn(Some(&endpoint), &sample()).unwrap();
        let drifted = Value::Object(vec![("totally".into(), Value::Bool(true))]);
        let second = engine.learn(Some(&endpoint), &drifted).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(engine.known_id(&endpoint), Some(&second.id));
        // both definitions remain resolvable
        assert!(engine.definition(&first.id).is_some());
        assert!(engine.definition(&second.id).is_some());
    }

    #[test]
    fn test_forget_endpoint() {
        let mut engine = Engine::new();
        let endpoint = EndpointKey::new("GET", "https://api.example.com/users");

        let fp = engine.learn(Some(&endpoint), &sample()).unwrap();
        engine.forget_endpoint(&endpoint);

        assert_eq!(engine.known_id(&endpoint), None);
        assert!(engine.definition(&fp.id).is_some());
    }

    #[test]
    fn test_reset_state() {
        let mut engine = Engine::new();
        let endpoint = EndpointKey::new("GET", "https://api.example.com/users");

        engine.learn(Some(&endpoint), &sample()).unwrap();
        engine.reset_state();

        assert_eq!(engine.structure_count(), 0);
        assert_eq!(engine.known_id(&endpoint), None);
    }

    #[test]
    fn test_collision_mode_sequences_l0() {
        let mut engine = Engine::with_options(EngineOptions {
            new_id_on_collision: true,
            ..Default::default()
        });

        let a = engine.fingerprint(&sample()).unwrap();
        let b = engine.fingerprint(&sample()).unwrap();
        let c = engine.fingerprint(&sample()).unwrap();

        assert!(a.id.starts_with("L0:0-L1:"));
        assert!(b.id.starts_with("L0:1-L1:"));
        assert!(c.id.starts_with("L0:2-L1:"));
        assert_eq!(a.collision_count, 0);
        assert_eq!(c.collision_count, 2);

        // the signature past L0 is identical
        let tail = |id: &str| id.splitn(2, '-').nth(1).unwrap().to_string();
        assert_eq!(tail(&a.id), tail(&b.id));
        assert_eq!(tail(&b.id), tail(&c.id));

        // a different structure starts its own sequence
        let other = Value::Object(vec![("x".into(), Value::Null)]);
        let d = engine.fingerprint(&other).unwrap();
        assert!(d.id.starts_with("L0:0-"));
    }

    #[test]
    fn test_pure_mode_matches_free_function() {
        let mut engine = Engine::new();
        let value = sample();

        assert_eq!(
            engine.fingerprint(&value).unwrap(),
            crate::fingerprint::fingerprint(&value).unwrap()
        );
    }
}
