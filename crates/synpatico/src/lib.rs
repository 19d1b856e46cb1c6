//! Shared surface between the synpatico agent and client.

pub use synpatico_core::{
    codec, envelope, err, fingerprint, hash, linearize, negotiate, shape, state, value,
};

pub use synpatico_core::{
    Engine, EngineOptions, EndpointKey, Fingerprint, Packet, ProtocolError, ProtocolResult, Shape,
    StructureDefinition, StructureId, Value,
};

pub use synpatico_core::negotiate::{
    headers, AGENT_HEADER_VALUE, CONTENT_TYPE_JSON, CONTENT_TYPE_PACKET,
};

/// Default constants shared by the agent and client binaries.
pub mod defaults {
    /// The default port the agent listens on.
    pub const DEFAULT_PORT: u16 = 4015;

    /// The default upstream request timeout.
    pub const DEFAULT_TIMEOUT: &str = "30s";

    /// Recursion bound, re-exported for CLI help text.
    pub const DEFAULT_DEPTH_CAP: usize = synpatico_core::DEFAULT_DEPTH_CAP;
}
