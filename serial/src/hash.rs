//! Canonical object hashing (§4.2): `Keccak256(encode(value))`.

use sha3::{Digest, Keccak256};

use crate::io::Encode;

#[must_use]
pub fn object_hash<T: Encode>(value: &T) -> [u8; 32] {
    let encoded = value.encode_to_vec();
    let mut hasher = Keccak256::new();
    hasher.update(&encoded);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy(u64);

    impl Encode for Dummy {
        fn encode(&self, out: &mut Vec<u8>) {
            self.0.encode(out);
        }
    }

    #[test]
    fn object_hash_is_deterministic() {
        assert_eq!(object_hash(&Dummy(42)), object_hash(&Dummy(42)));
    }

    #[test]
    fn object_hash_differs_on_content_change() {
        assert_ne!(object_hash(&Dummy(1)), object_hash(&Dummy(2)));
    }
}
