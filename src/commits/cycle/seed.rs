//! Deterministic cycle seeds and snapshot selection.
use pallas_crypto::hash::Hasher;

use crate::constants::SNAPSHOT_SEED_SUFFIX;
use crate::error::invariant;
use crate::error::Error;

pub type Seed = [u8; 32];

fn blake2b(parts: &[&[u8]]) -> Seed {
    let digest = Hasher::<256>::hash(&parts.concat());
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest[..]);
    seed
}

/// Seed of the cycle following one seeded with `seed`, given the nonces
/// revealed for the relevant cycle, in revelation level order.
pub fn next_seed(seed: &[u8], nonces: &[Vec<u8>]) -> Seed {
    let zero = [0u8; 32];
    nonces
        .iter()
        .fold(blake2b(&[seed, &zero[..]]), |acc, nonce| {
            blake2b(&[&acc[..], &nonce[..]])
        })
}

/// Draws the snapshot index in `0..bound` from a cycle seed.
///
/// Draws are 31-bit big-endian words of successive hashes of the seed,
/// rejecting values that would bias the modulo.
pub fn snapshot_index(seed: &[u8], bound: i32) -> Result<i32, Error> {
    if bound < 1 {
        return Err(invariant(format!("cannot draw a snapshot index below {bound}")));
    }
    let drop_if_over = i32::MAX - (i32::MAX % bound);
    let mut state = blake2b(&[seed, SNAPSHOT_SEED_SUFFIX]);
    loop {
        state = blake2b(&[&state[..]]);
        let word = i32::from_be_bytes([state[0], state[1], state[2], state[3]]);
        let r = word.wrapping_abs();
        if r >= 0 && r < drop_if_over {
            return Ok(r % bound);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn next_seed_is_deterministic() {
        let seed = [7u8; 32];
        let nonces = vec![vec![1u8; 32], vec![2u8; 32]];
        assert_eq!(next_seed(&seed, &nonces), next_seed(&seed, &nonces));
    }

    #[test]
    fn next_seed_depends_on_nonces_and_their_order() {
        let seed = [7u8; 32];
        let a = vec![1u8; 32];
        let b = vec![2u8; 32];
        let none = next_seed(&seed, &[]);
        let ab = next_seed(&seed, &[a.clone(), b.clone()]);
        let ba = next_seed(&seed, &[b, a]);
        assert_ne!(none, ab);
        assert_ne!(ab, ba);
    }

    #[test]
    fn next_seed_without_nonces_hashes_padded_seed() {
        let seed = [3u8; 32];
        let expected = blake2b(&[&seed[..], &[0u8; 32][..]]);
        assert_eq!(next_seed(&seed, &[]), expected);
    }

    #[test]
    fn snapshot_index_is_in_range_and_reproducible() {
        for i in 0..64u8 {
            let seed = [i; 32];
            let index = snapshot_index(&seed, 16).unwrap();
            assert!((0..16).contains(&index));
            assert_eq!(index, snapshot_index(&seed, 16).unwrap());
        }
    }

    #[test]
    fn snapshot_index_with_single_snapshot() {
        assert_eq!(snapshot_index(&[9u8; 32], 1).unwrap(), 0);
    }

    #[test]
    fn snapshot_index_without_snapshots_is_an_error() {
        let err = snapshot_index(&[9u8; 32], 0).unwrap_err();
        assert!(err.is_fatal());
        assert!(snapshot_index(&[9u8; 32], -3).is_err());
    }
}
