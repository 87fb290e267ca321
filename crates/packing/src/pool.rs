//! Bounded CPU worker pool for batch packing operations.
//!
//! - Pack/unpack chunk ranges on a dedicated Rayon thread pool
//! - Automatic parallel/sequential mode selection per batch
//! - Chunk-granularity cancellation through a caller-owned interrupt flag

use std::sync::atomic::{AtomicBool, Ordering};

use datalith_types::{
    generate_leaf, Address, ChunkBytes, Node, PackedChunk, PartitionChunkOffset, PartitionHash,
    UnpackedChunk,
};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capacity_single::compute_entropy_chunk;
use crate::{packing_xor_vec_u8, unpack};

/// Errors that can occur during unpacking
#[derive(Debug, Error)]
pub enum UnpackingError {
    #[error("Unpacking failed: {0}")]
    UnpackingFailed(String),
}

/// Outcome of a cancellable range operation. `Interrupted` is a normal
/// outcome: the flag was raised mid-range and the partial results were
/// discarded.
#[derive(Debug, PartialEq, Eq)]
pub enum RangeOutcome<T> {
    Completed(T),
    Interrupted,
}

/// A dedicated Rayon pool for CPU-bound chunk work. Batches no larger than
/// the worker count run sequentially on the caller's thread.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    num_threads: usize,
}

impl WorkerPool {
    pub fn new(num_threads: usize) -> Self {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|idx| format!("pack-cpu-{}", idx))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!(
                    target: "datalith::packing",
                    error = %e,
                    "Failed to create packing thread pool with {} threads, using a single thread instead",
                    num_threads
                );
                rayon::ThreadPoolBuilder::new()
                    .num_threads(1)
                    .build()
                    .unwrap_or_else(|_| {
                        panic!("Critical: Unable to create even a single-threaded Rayon pool");
                    })
            }
        };

        info!(
            target: "datalith::packing",
            "Initialized packing pool with {} threads",
            num_threads
        );

        Self { pool, num_threads }
    }

    /// Hashes `chunks` into merkle leaves, in chunk order. Byte ranges are
    /// derived from the chunk lengths, so the output matches the sequential
    /// leaf builder exactly.
    pub fn generate_leaves(&self, chunks: &[ChunkBytes]) -> Vec<Node> {
        // each leaf hash binds the chunk's absolute starting byte
        let mut min_byte_ranges = Vec::with_capacity(chunks.len());
        let mut min_byte_range = 0_usize;
        for chunk in chunks {
            min_byte_ranges.push(min_byte_range);
            min_byte_range += chunk.len();
        }

        if chunks.len() <= self.num_threads {
            chunks
                .iter()
                .zip(min_byte_ranges)
                .map(|(chunk, min)| generate_leaf(chunk, min))
                .collect()
        } else {
            self.pool.install(|| {
                chunks
                    .par_iter()
                    .zip(min_byte_ranges)
                    .map(|(chunk, min)| generate_leaf(chunk, min))
                    .collect()
            })
        }
    }

    /// Computes entropy chunks for `num_chunks` consecutive partition
    /// offsets starting at `start_offset`. The flag is checked before each
    /// chunk; raising it abandons the rest of the range.
    pub fn compute_entropy_range(
        &self,
        mining_address: Address,
        start_offset: PartitionChunkOffset,
        num_chunks: usize,
        partition_hash: PartitionHash,
        iterations: u32,
        chunk_size: usize,
        chain_id: u64,
        interrupt: &AtomicBool,
    ) -> RangeOutcome<Vec<ChunkBytes>> {
        let entropy_at = |index: usize| {
            if interrupt.load(Ordering::Relaxed) {
                return None;
            }
            let mut entropy_chunk = Vec::with_capacity(chunk_size);
            compute_entropy_chunk(
                mining_address,
                u64::from(*start_offset) + index as u64,
                partition_hash.0,
                iterations,
                chunk_size,
                &mut entropy_chunk,
                chain_id,
            );
            Some(entropy_chunk)
        };

        let chunks: Option<Vec<ChunkBytes>> = if num_chunks <= self.num_threads {
            (0..num_chunks).map(entropy_at).collect()
        } else {
            self.pool
                .install(|| (0..num_chunks).into_par_iter().map(entropy_at).collect())
        };

        match chunks {
            Some(chunks) => RangeOutcome::Completed(chunks),
            None => RangeOutcome::Interrupted,
        }
    }

    /// Packs `data` against the entropy of consecutive partition offsets,
    /// chunk `i` at `start_offset + i`. Cancellable like
    /// [`Self::compute_entropy_range`].
    pub fn pack_range(
        &self,
        mining_address: Address,
        start_offset: PartitionChunkOffset,
        partition_hash: PartitionHash,
        iterations: u32,
        chunk_size: usize,
        chain_id: u64,
        data: Vec<ChunkBytes>,
        interrupt: &AtomicBool,
    ) -> RangeOutcome<Vec<ChunkBytes>> {
        let pack_at = |(index, chunk): (usize, ChunkBytes)| {
            if interrupt.load(Ordering::Relaxed) {
                return None;
            }
            let mut entropy_chunk = Vec::with_capacity(chunk_size);
            compute_entropy_chunk(
                mining_address,
                u64::from(*start_offset) + index as u64,
                partition_hash.0,
                iterations,
                chunk_size,
                &mut entropy_chunk,
                chain_id,
            );
            Some(packing_xor_vec_u8(entropy_chunk, &chunk))
        };

        let batch_size = data.len();
        let packed: Option<Vec<ChunkBytes>> = if batch_size <= self.num_threads {
            data.into_iter().enumerate().map(pack_at).collect()
        } else {
            self.pool
                .install(|| data.into_par_iter().enumerate().map(pack_at).collect())
        };

        match packed {
            Some(packed) => RangeOutcome::Completed(packed),
            None => RangeOutcome::Interrupted,
        }
    }

    /// Unpacks a batch of packed chunks, reporting per-chunk failures.
    pub fn unpack_range(
        &self,
        chunks: &[PackedChunk],
        iterations: u32,
        chunk_size: usize,
        chain_id: u64,
        interrupt: &AtomicBool,
    ) -> RangeOutcome<Vec<Result<UnpackedChunk, UnpackingError>>> {
        let unpack_one = |chunk: &PackedChunk| {
            if interrupt.load(Ordering::Relaxed) {
                return None;
            }
            Some(
                unpack(chunk, iterations, chunk_size, chain_id)
                    .map_err(|e| UnpackingError::UnpackingFailed(e.to_string())),
            )
        };

        let batch_size = chunks.len();
        let results: Option<Vec<_>> = if batch_size <= self.num_threads {
            debug!(
                target: "datalith::unpacking",
                "Using sequential unpacking for small batch (size: {} <= threads: {})",
                batch_size,
                self.num_threads
            );

            chunks.iter().map(unpack_one).collect()
        } else {
            debug!(
                target: "datalith::unpacking",
                "Using parallel unpacking for large batch (size: {} > threads: {})",
                batch_size,
                self.num_threads
            );

            self.pool
                .install(|| chunks.par_iter().map(unpack_one).collect())
        };

        match results {
            Some(results) => RangeOutcome::Completed(results),
            None => RangeOutcome::Interrupted,
        }
    }
}
