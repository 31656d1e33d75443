// Shared Rust library
pub mod hash;
pub mod stats;
pub mod workbench_messages;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{Signed, Zero};

pub use hash::{InfoHash, NodeId, Value, HASH_LEN};

pub fn hash_to_biguint(hash: &InfoHash) -> BigUint {
    BigUint::from_bytes_be(hash.as_bytes())
}

pub fn biguint_to_hash(n: &BigUint) -> InfoHash {
    let bytes = n.to_bytes_be();
    let mut id = [0u8; HASH_LEN];
    // Keep the low 160 bits; to_bytes_be never has leading zeros.
    let take = bytes.len().min(HASH_LEN);
    id[HASH_LEN - take..].copy_from_slice(&bytes[bytes.len() - take..]);
    InfoHash::new(id)
}

// Adds a signed offset to a hash in the circular 2^160 space.
pub fn offset_hash(hash: &InfoHash, delta: i64) -> InfoHash {
    let modulus = BigInt::from(2u32).pow(160);
    let mut n = BigInt::from_biguint(Sign::Plus, hash_to_biguint(hash)) + BigInt::from(delta);
    n %= &modulus;
    if n.is_negative() {
        n += &modulus;
    }
    let magnitude = n.to_biguint().unwrap_or_else(BigUint::zero);
    biguint_to_hash(&magnitude)
}

// Kademlia distance between two hashes, comparable as a big-endian byte array.
pub fn xor_distance(a: &InfoHash, b: &InfoHash) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    for (o, (x, y)) in out
        .iter_mut()
        .zip(a.as_bytes().iter().zip(b.as_bytes().iter()))
    {
        *o = x ^ y;
    }
    out
}
