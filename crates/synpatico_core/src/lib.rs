//! Protocol engine for the synpatico wire optimizer.
//!
//! This crate contains everything both peers compute locally: the
//! structural fingerprinter, the shape extractor, the rich-type
//! envelope, the value linearizer, the packet codec, and the
//! negotiation decision logic. Nothing here performs I/O; the agent
//! and client crates adapt these pieces to HTTP.

pub mod codec;
pub mod envelope;
pub mod err;
pub mod fingerprint;
pub mod hash;
pub mod linearize;
pub mod negotiate;
pub mod shape;
pub mod state;
pub mod value;

/// Default recursion bound for fingerprinting, shape extraction and
/// linearization.
pub const DEFAULT_DEPTH_CAP: usize = 256;

pub use codec::{decode, encode, parse_packet, Packet, PacketMetadata};
pub use err::{ProtocolError, ProtocolResult};
pub use fingerprint::{fingerprint, Fingerprint};
pub use shape::{extract_shape, LeafKind, Shape};
pub use state::{Engine, EngineOptions, EndpointKey, StructureDefinition, StructureId};
pub use value::{ErrorValue, Value};
