//! Error implementations

use thiserror::Error;

/// Result alias used throughout the protocol engine.
pub type ProtocolResult<R> = Result<R, ProtocolError>;

/// Failures the protocol engine can surface.
///
/// None of these are fatal to a peer: every structural failure has a
/// defined local recovery (fall back to standard JSON), and the engine
/// never panics on bytes received from the wire.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An optimized request body referenced a structure id that is not
    /// in the local cache. Maps to HTTP 409 on the agent side.
    #[error("state conflict: structure {0} is not cached")]
    StateConflict(String),

    /// The freshly computed fingerprint of an upstream body does not
    /// match the id the client offered to accept.
    #[error("structure mismatch: negotiated {expected}, body fingerprints to {actual}")]
    StructureMismatch { expected: String, actual: String },

    /// An optimized response referenced a structure id the client has
    /// never learned.
    #[error("unknown structure id {0}")]
    UnknownStructure(String),

    /// The value sequence of a packet is inconsistent with the shape it
    /// is being reconstructed against.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Value nesting exceeded the recursion bound.
    #[error("value nesting exceeds the depth cap of {0}")]
    DepthExceeded(usize),

    /// Bytes that claim to be a packet but do not parse as one.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
}
