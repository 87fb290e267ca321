//! XOR entropy packing over chunk payloads: pack primitives, single-chunk
//! unpacking, and the batch worker pool.

pub mod capacity_single;
pub mod pool;

use crate::capacity_single::compute_entropy_chunk;
use datalith_types::{Base64, PackedChunk, UnpackedChunk};
use eyre::ensure;

/// XORs `data` into the entropy chunk, truncating the result to the data
/// length. `data` longer than the entropy is a programmer error.
pub fn packing_xor_vec_u8(mut entropy: Vec<u8>, data: &[u8]) -> Vec<u8> {
    assert!(data.len() <= entropy.len());
    for i in 0..data.len() {
        entropy[i] ^= data[i];
    }
    entropy.truncate(data.len());
    entropy
}

/// Equal-length in-place XOR, the self-inverse pack primitive.
pub fn xor_vec_u8_arrays_in_place(a: &mut [u8], b: &[u8]) {
    debug_assert_eq!(a.len(), b.len());
    for i in 0..a.len() {
        a[i] ^= b[i];
    }
}

/// Unpacks a packed chunk: recomputes its entropy from the packing fields,
/// reverses the XOR, and trims a trailing partial chunk back to its original
/// length.
pub fn unpack(
    packed_chunk: &PackedChunk,
    entropy_packing_iterations: u32,
    chunk_size: usize,
    chain_id: u64,
) -> eyre::Result<UnpackedChunk> {
    let mut entropy: Vec<u8> = Vec::with_capacity(chunk_size);
    compute_entropy_chunk(
        packed_chunk.packing_address,
        u64::from(*packed_chunk.partition_offset),
        packed_chunk.partition_hash.0,
        entropy_packing_iterations,
        chunk_size,
        &mut entropy,
        chain_id,
    );

    let unpacked_data = unpack_with_entropy(packed_chunk, entropy, chunk_size as u64)?;

    Ok(UnpackedChunk {
        data_root: packed_chunk.data_root,
        data_size: packed_chunk.data_size,
        data_path: packed_chunk.data_path.clone(),
        bytes: Base64(unpacked_data),
        tx_offset: packed_chunk.tx_offset,
    })
}

/// Reverses the entropy XOR with an already-computed entropy chunk.
pub fn unpack_with_entropy(
    packed_chunk: &PackedChunk,
    entropy: Vec<u8>,
    chunk_size: u64,
) -> eyre::Result<Vec<u8>> {
    ensure!(
        entropy.len() as u64 == chunk_size,
        "entropy length {} does not match the chunk size {}",
        entropy.len(),
        chunk_size
    );
    ensure!(
        packed_chunk.bytes.0.len() as u64 <= chunk_size,
        "packed payload of {} bytes exceeds the chunk size {}",
        packed_chunk.bytes.0.len(),
        chunk_size
    );

    let mut unpacked_data = packing_xor_vec_u8(entropy, &packed_chunk.bytes.0);

    // trim if this is the last chunk & if data_size isn't aligned to chunk_size
    let num_chunks_in_tx = packed_chunk.data_size.div_ceil(chunk_size);
    if u64::from(*packed_chunk.tx_offset) + 1 == num_chunks_in_tx {
        let trailing_bytes = packed_chunk.data_size % chunk_size;
        // 0 means the last chunk is exactly chunk_size
        if trailing_bytes != 0 {
            unpacked_data.truncate(trailing_bytes as usize);
        }
    }

    Ok(unpacked_data)
}
