//! The values-only packet and its codec.
//!
//! A [`Packet`] is what replaces a JSON body once both peers know the
//! shape: the structure id, the flat slot sequence (rich scalars in
//! envelopes), and a little metadata. Readers ignore unknown fields.

use serde::{Deserialize, Serialize};

use crate::envelope;
use crate::err::{ProtocolError, ProtocolResult};
use crate::fingerprint::Fingerprint;
use crate::linearize::{linearize, reconstruct};
use crate::state::StructureDefinition;
use crate::value::Value;

/// The only packet type this revision speaks.
pub const PACKET_TYPE: &str = "values-only";

/// Wire form of an optimized body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    #[serde(rename = "type")]
    pub packet_type: String,
    #[serde(rename = "structureId")]
    pub structure_id: String,
    pub values: Vec<serde_json::Value>,
    pub metadata: PacketMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketMetadata {
    #[serde(rename = "collisionCount")]
    pub collision_count: u64,
    pub levels: u32,
}

/// Encode a value into a packet under a known structure id.
///
/// The caller is responsible for having verified that `fingerprint` is
/// the id of this value's structure; the encoder only composes.
pub fn encode(value: &Value, fingerprint: &Fingerprint) -> ProtocolResult<Packet> {
    let slots = linearize(value)?;
    let values = slots.iter().map(envelope::to_wire).collect();

    Ok(Packet {
        packet_type: PACKET_TYPE.to_string(),
        structure_id: fingerprint.id.clone(),
        values,
        metadata: PacketMetadata {
            collision_count: fingerprint.collision_count,
            levels: fingerprint.levels,
        },
    })
}

/// Decode a packet against the structure definition its id resolved
/// to. Never panics on wire input; every failure is typed.
pub fn decode(packet: &Packet, definition: &StructureDefinition) -> ProtocolResult<Value> {
    if packet.packet_type != PACKET_TYPE {
        return Err(ProtocolError::MalformedPacket(format!(
            "unsupported packet type {:?}",
            packet.packet_type
        )));
    }

    let slots: Vec<Value> = packet
        .values
        .iter()
        .cloned()
        .map(envelope::from_wire)
        .collect();

    reconstruct(&slots, &definition.shape)
}

/// Parse packet bytes received from the wire.
pub fn parse_packet(bytes: &[u8]) -> ProtocolResult<Packet> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::MalformedPacket(e.to_string()))
}
