//! Canonical serialization for deterministic fingerprints.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: struct fields serialize in declaration order
//! - Stable Vec order: vectors serialize in index order
//! - No HashMap allowed: use BTreeMap for maps in hashed data

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes for hashing.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<u64, serde_json::Error> {
    let bytes = to_canonical_bytes(value)?;
    Ok(xxh64(&bytes, 0))
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(format!("{:016x}", canonical_hash(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Program {
        imports: Vec<String>,
        defs: Vec<(String, String)>,
    }

    #[test]
    fn test_determinism() {
        let p = Program {
            imports: vec!["import numpy".into()],
            defs: vec![("a".into(), "[1]".into())],
        };
        assert_eq!(canonical_hash(&p).unwrap(), canonical_hash(&p).unwrap());
        assert_eq!(canonical_hash_hex(&p).unwrap().len(), 16);
    }

    #[test]
    fn test_map_order_is_stable() {
        let a = BTreeMap::from([("x", 1), ("y", 2)]);
        let b = BTreeMap::from([("y", 2), ("x", 1)]);
        assert_eq!(to_canonical_bytes(&a).unwrap(), to_canonical_bytes(&b).unwrap());
    }
}
