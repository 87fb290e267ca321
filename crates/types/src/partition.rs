use crate::H256;
use derive_more::{Add, From, Into};
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

/// Identifies a storage partition. Mixed into the entropy seed of every chunk
/// the partition holds, so two partitions never share packed bytes.
pub type PartitionHash = H256;

/// The offset of a chunk relative to the start (0th chunk) of a partition
#[derive(
    Default,
    Debug,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Add,
    From,
    Into,
)]
pub struct PartitionChunkOffset(pub u32);

impl PartitionChunkOffset {
    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }
}

impl std::hash::Hash for PartitionChunkOffset {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Deref for PartitionChunkOffset {
    type Target = u32;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PartitionChunkOffset {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<u64> for PartitionChunkOffset {
    fn from(value: u64) -> Self {
        Self(value as u32)
    }
}

impl std::fmt::Display for PartitionChunkOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
