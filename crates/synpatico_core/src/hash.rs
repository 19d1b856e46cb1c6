//! Deterministic 32-bit byte hashing.
//!
//! Both peers derive key bits by hashing key strings, so the hash is a
//! protocol constant: identical input bytes must yield identical output
//! on every platform and in every process. Nothing here is
//! cryptographic.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Selects one of the two supported mixing schedules.
///
/// Only [`HashFlavor::Fnv1a`] is used by the fingerprinter; the
/// alternate schedule exists for callers that want a second independent
/// 32-bit hash over the same bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HashFlavor {
    #[default]
    Fnv1a,
    Djb2,
}

/// FNV-1a over an octet sequence. The empty input hashes to the offset
/// basis.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut state = FNV_OFFSET_BASIS;

    for byte in bytes {
        state ^= *byte as u32;
        state = state.wrapping_mul(FNV_PRIME);
    }

    state
}

/// djb2 over an octet sequence.
pub fn djb2_32(bytes: &[u8]) -> u32 {
    let mut state: u32 = 5381;

    for byte in bytes {
        state = state.wrapping_mul(33) ^ *byte as u32;
    }

    state
}

/// Hash a sequence of bytes with the selected flavor.
pub fn hash_bytes(flavor: HashFlavor, bytes: &[u8]) -> u32 {
    match flavor {
        HashFlavor::Fnv1a => fnv1a_32(bytes),
        HashFlavor::Djb2 => djb2_32(bytes),
    }
}

/// Hash a sequence of bytes and render the result as lowercase hex,
/// 1 to 8 digits, leading zeros omitted.
pub fn hash_hex(flavor: HashFlavor, bytes: &[u8]) -> String {
    format!("{:x}", hash_bytes(flavor, bytes))
}

/// The per-key contribution used by the structural fingerprinter.
///
/// The same key on any machine yields the same bit; this is what keeps
/// the fingerprint computable on two peers that have never
/// communicated.
pub fn key_bit(key: &str) -> u64 {
    fnv1a_32(key.as_bytes()) as u64
}
