//! Stable 32-bit hash of fully-qualified service names.
//!
//! The bind handshake never transmits service names; both peers refer to a
//! service by the FNV-1a hash of its UTF-8 fully-qualified name. The hash is
//! a pure function of the name, so it is stable across processes and across
//! registration order. Collisions are not tolerated by the registry — the
//! last registrant silently wins (see the registry tests).

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Returns the FNV-1a hash of the service name.
pub fn service_hash(name: &str) -> u32 {
    let mut h = FNV_OFFSET_BASIS;
    for b in name.as_bytes() {
        h ^= u32::from(*b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_hash_empty_is_offset_basis() {
        assert_eq!(service_hash(""), 0x811c_9dc5);
    }

    #[test]
    fn test_service_hash_known_vector() {
        // Published FNV-1a test vector.
        assert_eq!(service_hash("a"), 0xe40c_292c);
    }

    #[test]
    fn test_service_hash_deterministic() {
        let name = "bnet.protocol.connection.ConnectionService";
        assert_eq!(service_hash(name), service_hash(name));
    }

    #[test]
    fn test_service_hash_distinguishes_names() {
        assert_ne!(
            service_hash("bnet.protocol.connection.ConnectionService"),
            service_hash("bnet.protocol.authentication.AuthenticationServer"),
        );
    }
}
