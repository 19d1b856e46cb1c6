//! HTTP negotiation, transport-free.
//!
//! Both peers run a small per-request state machine. The agent side is
//! RECV → DECODE_REQ? → FETCH → LEARN → ENCODE? → EMIT; the client
//! side mirrors it. The functions here implement every decision in
//! those machines against an [`Engine`], leaving only socket work to
//! the adapters: the proxy binary and the client middleware feed
//! bodies and header values in, and forward whatever comes out.
//!
//! Structural failures never propagate to the wire as errors. The
//! agent falls back to standard JSON on any mismatch; only the state
//! conflict (an optimized *request* body the agent cannot decode) has
//! a status code of its own.

use crate::codec;
use crate::envelope;
use crate::err::{ProtocolError, ProtocolResult};
use crate::state::{Engine, EndpointKey, StructureId};
use crate::value::Value;

/// Negotiation header names, lowercase as they appear on the wire.
pub mod headers {
    /// Request: client offers to accept a packet for this structure id.
    pub const ACCEPT_ID: &str = "x-synpatico-accept-id";
    /// Response: structure id of the packet body.
    pub const STRUCTURE_ID: &str = "x-synpatico-id";
    /// Response: non-empty when the origin runs an agent.
    pub const AGENT: &str = "x-synpatico-agent";
}

/// Content type identifying a packet body.
pub const CONTENT_TYPE_PACKET: &str = "application/synpatico-packet+json";
/// Content type of a standard JSON body.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Value the agent sends in its capability header.
pub const AGENT_HEADER_VALUE: &str = "1";

/// Response body for HTTP 409.
pub const STATE_CONFLICT_BODY: &str = r#"{"error":"State Conflict"}"#;
/// Response body for a synthesized HTTP 500.
pub const INTERNAL_ERROR_BODY: &str = r#"{"error":"Internal Proxy Error"}"#;

/// Hop-by-hop headers stripped before emitting a proxied response.
pub const HOP_BY_HOP_HEADERS: &[&str] = &["content-encoding", "transfer-encoding", "connection"];

/// True when a `Content-Type` value names the packet media type.
pub fn is_packet_content_type(content_type: &str) -> bool {
    media_type(content_type).eq_ignore_ascii_case(CONTENT_TYPE_PACKET)
}

/// True when a `Content-Type` value names standard JSON.
pub fn is_json_content_type(content_type: &str) -> bool {
    media_type(content_type).eq_ignore_ascii_case(CONTENT_TYPE_JSON)
}

fn media_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}

/// What the agent emits for one upstream response body.
#[derive(Debug)]
pub enum AgentOutcome {
    /// A values-only packet, strictly smaller than the raw body. Emit
    /// with the packet content type and the structure id header.
    Optimized {
        body: Vec<u8>,
        structure_id: StructureId,
    },
    /// Forward the raw upstream bytes untouched.
    Standard,
}

/// The agent's LEARN + ENCODE steps for one upstream JSON body.
///
/// Total: every failure inside (unparsable body, depth overflow,
/// structural drift, a packet that would not shrink the response)
/// recovers to [`AgentOutcome::Standard`].
pub fn mediate_response(
    engine: &mut Engine,
    endpoint: &EndpointKey,
    accept_id: Option<&str>,
    raw_body: &[u8],
) -> AgentOutcome {
    let json: serde_json::Value = match serde_json::from_slice(raw_body) {
        Ok(json) => json,
        Err(_) => return AgentOutcome::Standard,
    };

    let value = envelope::from_wire(json);

    // only object bodies are learned; arrays and primitives always
    // pass through
    if !matches!(value, Value::Object(_)) {
        return AgentOutcome::Standard;
    }

    let fp = match engine.learn(Some(endpoint), &value) {
        Ok(fp) => fp,
        Err(e) => {
            log::warn!("not learning {}: {}", endpoint, e);
            return AgentOutcome::Standard;
        }
    };

    let Some(accept_id) = accept_id else {
        return AgentOutcome::Standard;
    };

    if fp.id != accept_id {
        let drift = ProtocolError::StructureMismatch {
            expected: accept_id.to_string(),
            actual: fp.id.clone(),
        };
        log::info!("{} on {}, falling back to json", drift, endpoint);
        return AgentOutcome::Standard;
    }

    let packet = match codec::encode(&value, &fp) {
        Ok(packet) => packet,
        Err(e) => {
            log::warn!("encode failed for {}: {}", fp.id, e);
            return AgentOutcome::Standard;
        }
    };

    let body = match serde_json::to_vec(&packet) {
        Ok(body) => body,
        Err(e) => {
            log::warn!("packet serialization failed: {}", e);
            return AgentOutcome::Standard;
        }
    };

    // size safety: an optimized body must actually be smaller
    if body.len() >= raw_body.len() {
        log::debug!(
            "packet for {} is {} bytes vs {} raw, keeping json",
            endpoint,
            body.len(),
            raw_body.len()
        );
        return AgentOutcome::Standard;
    }

    AgentOutcome::Optimized {
        body,
        structure_id: fp.id,
    }
}

/// The agent's DECODE_REQ step: replace an optimized request body with
/// the JSON it stands for.
///
/// A structure id missing from the cache is a
/// [`ProtocolError::StateConflict`], which the adapter maps to HTTP
/// 409 with [`STATE_CONFLICT_BODY`].
pub fn decode_request_body(engine: &Engine, raw_body: &[u8]) -> ProtocolResult<Vec<u8>> {
    let packet = codec::parse_packet(raw_body)?;

    let definition = engine
        .definition(&packet.structure_id)
        .ok_or_else(|| ProtocolError::StateConflict(packet.structure_id.clone()))?;

    let value = codec::decode(&packet, definition)?;

    serde_json::to_vec(&envelope::to_wire(&value))
        .map_err(|e| ProtocolError::MalformedPacket(e.to_string()))
}

/// What the client does with one response.
#[derive(Debug)]
pub enum ClientOutcome {
    /// Response from a non-synpatico origin, or a body with nothing to
    /// learn. Hand it to the caller untouched.
    Passthrough,
    /// Standard JSON learned for future negotiation; body passes
    /// through untouched.
    Learned { structure_id: StructureId },
    /// Packet decoded back into standard JSON for the caller.
    Decoded {
        body: Vec<u8>,
        structure_id: StructureId,
    },
}

/// The client's receive path.
///
/// `agent_present` is whether the response carried the capability
/// header; without it nothing is learned or decoded. Packet bodies
/// referencing an id this engine never learned surface
/// [`ProtocolError::UnknownStructure`], which the middleware reports
/// as a request failure.
pub fn interpret_response(
    engine: &mut Engine,
    endpoint: &EndpointKey,
    agent_present: bool,
    content_type: Option<&str>,
    body: &[u8],
) -> ProtocolResult<ClientOutcome> {
    if !agent_present {
        return Ok(ClientOutcome::Passthrough);
    }

    match content_type {
        Some(ct) if is_packet_content_type(ct) => {
            let packet = codec::parse_packet(body)?;

            let definition = engine
                .definition(&packet.structure_id)
                .ok_or_else(|| ProtocolError::UnknownStructure(packet.structure_id.clone()))?;

            let value = codec::decode(&packet, definition)?;
            let body = serde_json::to_vec(&envelope::to_wire(&value))
                .map_err(|e| ProtocolError::MalformedPacket(e.to_string()))?;

            Ok(ClientOutcome::Decoded {
                body,
                structure_id: packet.structure_id,
            })
        }
        Some(ct) if is_json_content_type(ct) => {
            let json: serde_json::Value = match serde_json::from_slice(body) {
                Ok(json) => json,
                Err(_) => return Ok(ClientOutcome::Passthrough),
            };

            let value = envelope::from_wire(json);
            if !matches!(value, Value::Object(_)) {
                return Ok(ClientOutcome::Passthrough);
            }

            let fp = engine.learn(Some(endpoint), &value)?;

            Ok(ClientOutcome::Learned {
                structure_id: fp.id,
            })
        }
        _ => Ok(ClientOutcome::Passthrough),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::from_wire;

    fn endpoint() -> EndpointKey {
        EndpointKey::new("GET", "https://api.example.com/users/2")
    }

    /// A body wide enough that dropping its keys pays for the packet
    /// overhead.
    fn wide_body() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "organization_identifier": "org-4481",
            "organization_display_name": "Weaver Industries",
            "primary_contact_email_address": "janet.weaver@reqres.in",
            "primary_contact_full_name": "Janet Weaver",
            "subscription_plan_identifier": "enterprise-annual",
            "subscription_renewal_timestamp": "2025-01-01T00:00:00Z",
            "billing_address_country_code": "SG",
            "billing_address_postal_code": "048624",
            "feature_flags_enabled_count": 23,
            "seats_licensed_total": 500,
            "seats_active_last_30_days": 412,
            "account_manager_employee_id": 90211
        }))
        .unwrap()
    }

    fn learn_id(engine: &mut Engine, body: &[u8]) -> String {
        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        engine.learn(Some(&endpoint()), &from_wire(json)).unwrap().id
    }

    #[test]
    fn test_cold_request_is_standard_and_learns() {
        let mut agent = Engine::new();

        let outcome = mediate_response(&mut agent, &endpoint(), None, &wide_body());

        assert!(matches!(outcome, AgentOutcome::Standard));
        assert_eq!(agent.structure_count(), 1);
    }

    #[test]
    fn test_warm_request_round_trip() {
        let mut agent = Engine::new();
        let mut client = Engine::new();
        let body = wide_body();

        // request 1: cold on both sides
        mediate_response(&mut agent, &endpoint(), None, &body);
        let learned = interpret_response(
            &mut client,
            &endpoint(),
            true,
            Some(CONTENT_TYPE_JSON),
            &body,
        )
        .unwrap();
        let id = match learned {
            ClientOutcome::Learned { structure_id } => structure_id,
            other => panic!("expected learn, got {:?}", other),
        };
        assert_eq!(client.known_id(&endpoint()), Some(&id));

        // request 2: client offers the id, agent optimizes
        let outcome = mediate_response(&mut agent, &endpoint(), Some(&id), &body);
        let (packet_body, packet_id) = match outcome {
            AgentOutcome::Optimized { body, structure_id } => (body, structure_id),
            AgentOutcome::Standard => panic!("expected an optimized response"),
        };
        assert_eq!(packet_id, id);
        assert!(packet_body.len() < body.len());

        // client reconstructs the original
        let decoded = interpret_response(
            &mut client,
            &endpoint(),
            true,
            Some(CONTENT_TYPE_PACKET),
            &packet_body,
        )
        .unwrap();
        let decoded_body = match decoded {
            ClientOutcome::Decoded { body, .. } => body,
            other => panic!("expected decode, got {:?}", other),
        };

        let original = from_wire(serde_json::from_slice(&body).unwrap());
        let rebuilt = from_wire(serde_json::from_slice(&decoded_body).unwrap());
        assert_eq!(original, rebuilt);
    }

    #[test]
    fn test_drift_falls_back_to_json() {
        let mut agent = Engine::new();
        let body = wide_body();
        let negotiated = learn_id(&mut agent, &body);

        let drifted =
            serde_json::to_vec(&serde_json::json!({ "replaced": true, "version": 2 })).unwrap();

        let outcome = mediate_response(&mut agent, &endpoint(), Some(&negotiated), &drifted);

        assert!(matches!(outcome, AgentOutcome::Standard));
        // the fresh structure was still learned
        assert_eq!(agent.structure_count(), 2);
    }

    #[test]
    fn test_small_payload_keeps_json() {
        let mut agent = Engine::new();
        let body = br#"{"a":1}"#.to_vec();
        let id = learn_id(&mut agent, &body);

        let outcome = mediate_response(&mut agent, &endpoint(), Some(&id), &body);

        assert!(matches!(outcome, AgentOutcome::Standard));
    }

    #[test]
    fn test_non_object_bodies_are_not_learned() {
        let mut agent = Engine::new();

        for body in [&b"[1,2,3]"[..], &b"42"[..], &b"\"hello\""[..], &b"not json"[..]] {
            let outcome = mediate_response(&mut agent, &endpoint(), None, body);
            assert!(matches!(outcome, AgentOutcome::Standard));
        }

        assert_eq!(agent.structure_count(), 0);
    }

    #[test]
    fn test_unknown_request_packet_is_state_conflict() {
        let engine = Engine::new();
        let body = br#"{
            "type": "values-only",
            "structureId": "L0:dead-L1:beef",
            "values": [1],
            "metadata": { "collisionCount": 0, "levels": 1 }
        }"#;

        assert!(matches!(
            decode_request_body(&engine, body),
            Err(ProtocolError::StateConflict(_))
        ));
    }

    #[test]
    fn test_request_packet_decodes_when_cached() {
        let mut engine = Engine::new();
        let body = wide_body();
        let id = learn_id(&mut engine, &body);

        let value = from_wire(serde_json::from_slice::<serde_json::Value>(&body).unwrap());
        let fp = engine.fingerprint(&value).unwrap();
        assert_eq!(fp.id, id);

        let packet = crate::codec::encode(&value, &fp).unwrap();
        let packet_bytes = serde_json::to_vec(&packet).unwrap();

        let decoded = decode_request_body(&engine, &packet_bytes).unwrap();
        let rebuilt = from_wire(serde_json::from_slice(&decoded).unwrap());
        assert_eq!(rebuilt, value);
    }

    #[test]
    fn test_client_ignores_origins_without_agent() {
        let mut client = Engine::new();

        let outcome = interpret_response(
            &mut client,
            &endpoint(),
            false,
            Some(CONTENT_TYPE_JSON),
            &wide_body(),
        )
        .unwrap();

        assert!(matches!(outcome, ClientOutcome::Passthrough));
        assert_eq!(client.structure_count(), 0);
    }

    #[test]
    fn test_client_unknown_packet_id_surfaces() {
        let mut client = Engine::new();
        let body = br#"{
            "type": "values-only",
            "structureId": "L0:1234-L1:abcd",
            "values": [],
            "metadata": { "collisionCount": 0, "levels": 1 }
        }"#;

        assert!(matches!(
            interpret_response(
                &mut client,
                &endpoint(),
                true,
                Some(CONTENT_TYPE_PACKET),
                body
            ),
            Err(ProtocolError::UnknownStructure(_))
        ));
    }

    #[test]
    fn test_content_type_matching_tolerates_parameters() {
        assert!(is_json_content_type("application/json; charset=utf-8"));
        assert!(is_packet_content_type("Application/Synpatico-Packet+JSON"));
        assert!(!is_json_content_type("text/html"));
    }
}
