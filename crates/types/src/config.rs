use serde::{Deserialize, Serialize};

/// Protocol parameters that every peer on a network must agree on. Loaded
/// from TOML for named networks; the constructors below pin the values for
/// local development and the public testnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsensusConfig {
    /// Unique identifier for the network, mixed into every entropy seed so
    /// chunks packed for one network can never be replayed on another
    pub chain_id: u64,
    /// Size of each data chunk in bytes
    pub chunk_size: u64,
    /// Number of chunks that make up a single partition
    pub num_chunks_in_partition: u64,
    /// Number of chunks that can be recalled in each partition by a mining step
    pub num_chunks_in_recall_range: u64,
    /// Number of replica partitions in each storage slot
    pub num_partitions_in_slot: u64,
    /// Number of iterations for the entropy packing algorithm
    pub entropy_packing_iterations: u32,
}

impl ConsensusConfig {
    // This is hardcoded here so packing code can size buffers without a
    // config in hand. Altering `chunk_size` in a network config while
    // keeping this constant is a consensus break.
    pub const CHUNK_SIZE: u64 = 256 * 1024;

    // 20TB, with ~10% overhead, aligned to the nearest recall range (400 chunks)
    pub const CHUNKS_PER_PARTITION_20TB: u64 = 75_534_400;

    pub fn testing() -> Self {
        const TEST_NUM_CHUNKS_IN_PARTITION: u64 = 10;
        const TEST_NUM_CHUNKS_IN_RECALL_RANGE: u64 = 2;

        Self {
            chain_id: 1275,
            chunk_size: Self::CHUNK_SIZE,
            num_chunks_in_partition: TEST_NUM_CHUNKS_IN_PARTITION,
            num_chunks_in_recall_range: TEST_NUM_CHUNKS_IN_RECALL_RANGE,
            num_partitions_in_slot: 1,
            entropy_packing_iterations: 1000,
        }
    }

    pub fn testnet() -> Self {
        Self {
            chain_id: 1270,
            chunk_size: Self::CHUNK_SIZE,
            num_chunks_in_partition: Self::CHUNKS_PER_PARTITION_20TB,
            num_chunks_in_recall_range: 400,
            num_partitions_in_slot: 10,
            // roughly 1.5 seconds of sequential sha-256 on one core
            entropy_packing_iterations: 22_500_000,
        }
    }
}
