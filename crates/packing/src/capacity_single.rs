//! Single-threaded entropy chunk generation: a seeded sha-256 chain fills
//! the chunk, then keeps folding segments in place until the iteration
//! budget is spent.

use datalith_types::Address;
use sha2::Digest as _;

pub const SHA_HASH_SIZE: usize = 32;

/// Hash backend for the entropy chain. Backends must produce identical
/// output; [`RustCryptoSha256`] exists to cross-check the platform backend
/// at runtime.
pub trait Sha256Backend {
    fn hash_parts(parts: &[&[u8]]) -> [u8; SHA_HASH_SIZE];
}

/// Platform sha-256 (openssl), the default backend.
pub struct OpensslSha256;

impl Sha256Backend for OpensslSha256 {
    fn hash_parts(parts: &[&[u8]]) -> [u8; SHA_HASH_SIZE] {
        let mut hasher = openssl::sha::Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finish()
    }
}

/// Pure-Rust sha-256 via the `sha2` crate.
pub struct RustCryptoSha256;

impl Sha256Backend for RustCryptoSha256 {
    fn hash_parts(parts: &[&[u8]]) -> [u8; SHA_HASH_SIZE] {
        let mut hasher = sha2::Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().into()
    }
}

/// Derives the 32 byte seed anchoring a chunk's entropy chain to the packing
/// address, partition, and partition-relative chunk offset.
pub fn compute_seed_hash(
    mining_address: Address,
    chunk_offset: u64,
    partition_hash: [u8; SHA_HASH_SIZE],
    chain_id: u64,
) -> [u8; SHA_HASH_SIZE] {
    compute_seed_hash_with::<OpensslSha256>(mining_address, chunk_offset, partition_hash, chain_id)
}

pub fn compute_seed_hash_with<B: Sha256Backend>(
    mining_address: Address,
    chunk_offset: u64,
    partition_hash: [u8; SHA_HASH_SIZE],
    chain_id: u64,
) -> [u8; SHA_HASH_SIZE] {
    B::hash_parts(&[
        mining_address.as_slice(),
        &partition_hash,
        &chain_id.to_le_bytes(),
        &chunk_offset.to_le_bytes(),
    ])
}

/// Performs the entropy packing for the specified chunk offset, partition,
/// and mining address, filling `entropy_chunk` with `chunk_size` bytes.
///
/// Phase 1 always fills the whole chunk from the seed chain; phase 2 only
/// runs while `iterations` exceeds the segment count.
pub fn compute_entropy_chunk(
    mining_address: Address,
    chunk_offset: u64,
    partition_hash: [u8; SHA_HASH_SIZE],
    iterations: u32,
    chunk_size: usize,
    entropy_chunk: &mut Vec<u8>,
    chain_id: u64,
) {
    compute_entropy_chunk_with::<OpensslSha256>(
        mining_address,
        chunk_offset,
        partition_hash,
        iterations,
        chunk_size,
        entropy_chunk,
        chain_id,
    );
}

pub fn compute_entropy_chunk_with<B: Sha256Backend>(
    mining_address: Address,
    chunk_offset: u64,
    partition_hash: [u8; SHA_HASH_SIZE],
    iterations: u32,
    chunk_size: usize,
    entropy_chunk: &mut Vec<u8>,
    chain_id: u64,
) {
    debug_assert!(chunk_size.is_multiple_of(SHA_HASH_SIZE));
    let num_segments = chunk_size / SHA_HASH_SIZE;
    let mut previous_segment =
        compute_seed_hash_with::<B>(mining_address, chunk_offset, partition_hash, chain_id);

    // Phase 1: sequential hash chain from the seed fills the whole chunk.
    entropy_chunk.clear();
    for _ in 0..num_segments {
        previous_segment = B::hash_parts(&[&previous_segment]);
        entropy_chunk.extend_from_slice(&previous_segment);
    }

    // Phase 2: fold each segment with its predecessor in place, wrapping to
    // the chunk tail at segment 0, until the iteration budget is spent.
    let mut hash_count = num_segments;
    while hash_count < iterations as usize {
        let i = (hash_count % num_segments) * SHA_HASH_SIZE;
        let previous = if i == 0 {
            &entropy_chunk[chunk_size - SHA_HASH_SIZE..]
        } else {
            &entropy_chunk[i - SHA_HASH_SIZE..i]
        };
        let hash = B::hash_parts(&[previous, &entropy_chunk[i..i + SHA_HASH_SIZE]]);
        entropy_chunk[i..i + SHA_HASH_SIZE].copy_from_slice(&hash);
        hash_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TEST_CHAIN_ID: u64 = 1275;

    fn test_address() -> Address {
        "0x1234567890abcdef1234567890abcdef12345678"
            .parse()
            .unwrap()
    }

    #[test]
    fn seed_hash_matches_pinned_vector() {
        let seed = compute_seed_hash(test_address(), 3, [7_u8; SHA_HASH_SIZE], TEST_CHAIN_ID);
        assert_eq!(
            hex::encode(seed),
            "0f00a7cf16eca99c751c3f5d62bc638eb243ba82a792acb2b037677f212ee186"
        );

        let cross_check = compute_seed_hash_with::<RustCryptoSha256>(
            test_address(),
            3,
            [7_u8; SHA_HASH_SIZE],
            TEST_CHAIN_ID,
        );
        assert_eq!(seed, cross_check);
    }

    #[test]
    fn entropy_chunk_matches_pinned_vector() {
        // two segments of phase 1, five folds of phase 2
        let mut entropy_chunk = Vec::with_capacity(64);
        compute_entropy_chunk(
            test_address(),
            3,
            [7_u8; SHA_HASH_SIZE],
            7,
            64,
            &mut entropy_chunk,
            TEST_CHAIN_ID,
        );
        assert_eq!(
            hex::encode(&entropy_chunk),
            "a40905aaed7b434724d2381f7649d91c328b917c143c128239069040548274ef\
             69fe9a8b4d42f3c10ef6c24f10f56ab087f5dc13f8d136f1a6fe1b59cb067d0c"
        );
    }

    #[test]
    fn iteration_budget_below_segment_count_still_fills_the_chunk() {
        let mut sparse = Vec::with_capacity(64);
        compute_entropy_chunk(
            test_address(),
            3,
            [7_u8; SHA_HASH_SIZE],
            1,
            64,
            &mut sparse,
            TEST_CHAIN_ID,
        );
        assert_eq!(sparse.len(), 64);

        // an iteration budget equal to the segment count also runs no folds
        let mut exact = Vec::with_capacity(64);
        compute_entropy_chunk(
            test_address(),
            3,
            [7_u8; SHA_HASH_SIZE],
            2,
            64,
            &mut exact,
            TEST_CHAIN_ID,
        );
        assert_eq!(sparse, exact);
    }

    #[test]
    fn seed_inputs_change_the_whole_chain() {
        let mut base = Vec::with_capacity(64);
        compute_entropy_chunk(
            test_address(),
            3,
            [7_u8; SHA_HASH_SIZE],
            7,
            64,
            &mut base,
            TEST_CHAIN_ID,
        );

        let mut other_offset = Vec::with_capacity(64);
        compute_entropy_chunk(
            test_address(),
            4,
            [7_u8; SHA_HASH_SIZE],
            7,
            64,
            &mut other_offset,
            TEST_CHAIN_ID,
        );
        assert_ne!(base, other_offset);

        let mut other_chain = Vec::with_capacity(64);
        compute_entropy_chunk(
            test_address(),
            3,
            [7_u8; SHA_HASH_SIZE],
            7,
            64,
            &mut other_chain,
            TEST_CHAIN_ID + 1,
        );
        assert_ne!(base, other_chain);
    }

    #[test]
    fn backends_agree_on_random_inputs() {
        use rand::Rng as _;

        let mut rng = rand::thread_rng();
        let mining_address = Address::random();
        let chunk_offset = rng.gen_range(0..=10_000);
        let mut partition_hash = [0_u8; SHA_HASH_SIZE];
        rng.fill(&mut partition_hash[..]);

        let mut platform = Vec::with_capacity(96);
        compute_entropy_chunk_with::<OpensslSha256>(
            mining_address,
            chunk_offset,
            partition_hash,
            11,
            96,
            &mut platform,
            TEST_CHAIN_ID,
        );
        let mut native = Vec::with_capacity(96);
        compute_entropy_chunk_with::<RustCryptoSha256>(
            mining_address,
            chunk_offset,
            partition_hash,
            11,
            96,
            &mut native,
            TEST_CHAIN_ID,
        );
        assert_eq!(platform, native);
    }

    #[test]
    fn reference_chunk_hashes_to_pinned_digest() {
        // full-size chunk at the reference parameters
        let mut entropy_chunk = Vec::with_capacity(262144);
        compute_entropy_chunk(
            test_address(),
            7,
            [2_u8; SHA_HASH_SIZE],
            1_000_000,
            262144,
            &mut entropy_chunk,
            TEST_CHAIN_ID,
        );
        assert_eq!(entropy_chunk.len(), 262144);
        assert_eq!(
            hex::encode(&entropy_chunk[..16]),
            "533ea0cbbf21095947fb86a564156d7b"
        );
        assert_eq!(
            hex::encode(OpensslSha256::hash_parts(&[&entropy_chunk])),
            "a85eb02bc621e720885a5513817bc4cf275c27240853cd3f8207fbae972dd2e8"
        );

        let mut native = Vec::with_capacity(262144);
        compute_entropy_chunk_with::<RustCryptoSha256>(
            test_address(),
            7,
            [2_u8; SHA_HASH_SIZE],
            1_000_000,
            262144,
            &mut native,
            TEST_CHAIN_ID,
        );
        assert_eq!(entropy_chunk, native);
    }
}
