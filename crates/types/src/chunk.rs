use crate::{
    hash_sha256, partition::PartitionHash, string_u64, Base64, PartitionChunkOffset, H256,
};
use alloy_primitives::Address;
use core::fmt;
use derive_more::{Add, From, Into};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::ops::{Deref, DerefMut};

/// A chunk in either of its two wire states. The serde tag folds the enum
/// into the payload object as `"type": "packed" | "unpacked"` instead of an
/// outer `{ "Packed": {...} }` wrapper.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChunkFormat {
    Unpacked(UnpackedChunk),
    Packed(PackedChunk),
}

impl ChunkFormat {
    pub fn as_packed(self) -> Option<PackedChunk> {
        match self {
            Self::Packed(chunk) => Some(chunk),
            Self::Unpacked(_) => None,
        }
    }

    pub fn as_unpacked(self) -> Option<UnpackedChunk> {
        match self {
            Self::Unpacked(chunk) => Some(chunk),
            Self::Packed(_) => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnpackedChunk {
    /// Root of the chunk tree this chunk belongs to, the same root the
    /// transaction header commits to. Receiving nodes key cached-chunk
    /// lookups on it.
    pub data_root: DataRoot,
    /// Byte length of the whole transaction body under this data_root.
    /// Identifies the trailing chunk, the only one allowed to fall short
    /// of CHUNK_SIZE.
    #[serde(with = "string_u64")]
    pub data_size: u64,
    /// Merkle proof bytes tying this chunk's hash back to the data_root
    pub data_path: Base64,
    /// The chunk payload itself, CHUNK_SIZE bytes long except for a
    /// trailing partial chunk
    pub bytes: Base64,
    /// Zero-based index of this chunk within the transaction
    pub tx_offset: TxChunkOffset,
}

impl UnpackedChunk {
    /// Hash of this chunk's proof bytes, used as a chunk cache key.
    pub fn chunk_path_hash(&self) -> ChunkPathHash {
        Self::hash_data_path(&self.data_path.0)
    }

    pub fn hash_data_path(data_path: &ChunkDataPath) -> ChunkPathHash {
        hash_sha256(data_path).into()
    }

    /// The transaction-relative offset of this chunk's final byte.
    ///
    /// The chunk tree addresses chunks by where they end, not where they
    /// start: chunk 0 ends at `chunk_size - 1`, chunk 1 at
    /// `2 * chunk_size - 1`, and a partial trailing chunk at
    /// `data_size - 1`. Offsets are counts minus one, for chunks and for
    /// bytes alike.
    pub fn end_byte_offset(&self, chunk_size: u64) -> u64 {
        if self.data_size == 0 {
            return 0;
        }

        let index = u64::from(self.tx_offset.0);
        let last_index = self.data_size.div_ceil(chunk_size) - 1;

        if index == last_index {
            self.data_size - 1
        } else {
            // interior chunks always end one byte short of a boundary
            (index + 1) * chunk_size - 1
        }
    }

    /// The largest tx_offset this chunk's data_size admits, or `None` when
    /// data_size is 0 (an empty body has no chunks at all).
    pub fn max_valid_offset(&self, chunk_size: u64) -> Option<u64> {
        (self.data_size != 0).then(|| self.data_size.div_ceil(chunk_size) - 1)
    }

    /// Whether tx_offset addresses a chunk that can exist under the claimed
    /// data_size. Zero-size data admits only offset 0.
    pub fn is_valid_offset(&self, chunk_size: u64) -> bool {
        let offset = u64::from(self.tx_offset.0);
        self.max_valid_offset(chunk_size)
            .map_or(offset == 0, |max| offset <= max)
    }

    /// [`Self::end_byte_offset`] with the offset validated against
    /// data_size and the arithmetic overflow-checked.
    pub fn end_byte_offset_checked(&self, chunk_size: u64) -> Option<u64> {
        if self.data_size == 0 {
            return Some(0);
        }

        let index = u64::from(self.tx_offset.0);
        let last_index = self.max_valid_offset(chunk_size)?;

        if index > last_index {
            None
        } else if index == last_index {
            Some(self.data_size - 1)
        } else {
            index
                .checked_add(1)?
                .checked_mul(chunk_size)?
                .checked_sub(1)
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PackedChunk {
    /// Root of the chunk tree this chunk belongs to, the same root the
    /// transaction header commits to. Receiving nodes key cached-chunk
    /// lookups on it.
    pub data_root: DataRoot,
    /// Byte length of the whole transaction body under this data_root.
    /// Identifies the trailing chunk, the only one allowed to fall short
    /// of CHUNK_SIZE.
    pub data_size: u64,
    /// Merkle proof bytes tying this chunk's hash back to the data_root
    pub data_path: Base64,
    /// The entropy-XORed payload, always a full CHUNK_SIZE bytes
    pub bytes: Base64,
    /// The address whose entropy this chunk was packed with
    pub packing_address: Address,
    /// Offset of the chunk within its partition
    pub partition_offset: PartitionChunkOffset,
    /// Zero-based index of this chunk within the transaction
    pub tx_offset: TxChunkOffset,
    /// Hash of the partition holding this chunk
    pub partition_hash: PartitionHash,
}

/// Raw payload bytes of one chunk. A `Vec` rather than a fixed array:
/// trailing chunks (and test fixtures) run shorter than `CHUNK_SIZE`.
pub type ChunkBytes = Vec<u8>;

/// sha256(chunk_data_path)
pub type ChunkPathHash = H256;

/// Root id of the merkle tree spanning a transaction's chunks
pub type DataRoot = H256;

/// Zero-based index of a chunk inside its transaction's data tree.
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
pub struct TxChunkOffset(pub u32);
impl TxChunkOffset {
    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }
}

impl Hash for TxChunkOffset {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Deref for TxChunkOffset {
    type Target = u32;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl DerefMut for TxChunkOffset {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<u64> for TxChunkOffset {
    fn from(value: u64) -> Self {
        Self(value as u32)
    }
}

impl fmt::Display for TxChunkOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chunk's raw proof bytes
pub type ChunkDataPath = Vec<u8>;

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_at(data_size: u64, tx_offset: u32) -> UnpackedChunk {
        UnpackedChunk {
            data_size,
            tx_offset: TxChunkOffset(tx_offset),
            ..Default::default()
        }
    }

    #[test]
    fn end_byte_offset_of_empty_data_is_zero() {
        assert_eq!(chunk_at(0, 0).end_byte_offset(64), 0);
    }

    #[test]
    fn interior_chunks_end_one_byte_before_a_boundary() {
        // 200 bytes in 64-byte chunks, chunk 0 of 4
        assert_eq!(chunk_at(200, 0).end_byte_offset(64), 63);
        assert_eq!(chunk_at(200, 1).end_byte_offset(64), 127);
    }

    #[test]
    fn a_partial_trailing_chunk_ends_at_the_data_size() {
        // chunk 3 holds the final 8 bytes of 200
        assert_eq!(chunk_at(200, 3).end_byte_offset(64), 199);
    }

    #[test]
    fn an_exactly_full_trailing_chunk_also_ends_at_the_data_size() {
        assert_eq!(chunk_at(128, 1).end_byte_offset(64), 127);
    }

    #[test]
    fn chunk_format_json_is_tagged_and_camel_cased() {
        let chunk = UnpackedChunk {
            data_root: DataRoot::zero(),
            data_size: 1024,
            data_path: Base64(vec![1, 2, 3]),
            bytes: Base64(vec![4, 5, 6]),
            tx_offset: TxChunkOffset(2),
        };
        let json = serde_json::to_value(ChunkFormat::Unpacked(chunk.clone())).unwrap();
        assert_eq!(json["type"], "unpacked");
        // sizes travel as strings, offsets as numbers
        assert_eq!(json["dataSize"], "1024");
        assert_eq!(json["txOffset"], 2);
        let decoded: ChunkFormat = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.as_unpacked().unwrap(), chunk);
    }

    mod offset_validation {
        use super::*;
        use rstest::rstest;

        const CHUNK_SIZE: u64 = 256 * 1024;

        #[rstest]
        #[case(0, None)]
        #[case(1000, Some(0))]
        #[case(CHUNK_SIZE * 10, Some(9))]
        #[case(CHUNK_SIZE * 10 + CHUNK_SIZE / 2, Some(10))]
        fn max_valid_offset_cases(#[case] data_size: u64, #[case] expected: Option<u64>) {
            assert_eq!(chunk_at(data_size, 0).max_valid_offset(CHUNK_SIZE), expected);
        }

        #[rstest]
        #[case(0, 0, true)]
        #[case(0, 1, false)]
        #[case(1000, 0, true)]
        #[case(1000, 1, false)]
        #[case(CHUNK_SIZE * 10, 0, true)]
        #[case(CHUNK_SIZE * 10, 9, true)]
        #[case(CHUNK_SIZE * 10, 10, false)]
        #[case(CHUNK_SIZE * 10, u32::MAX, false)]
        #[case(CHUNK_SIZE * 2 + CHUNK_SIZE / 2, 0, true)]
        #[case(CHUNK_SIZE * 2 + CHUNK_SIZE / 2, 2, true)]
        #[case(CHUNK_SIZE * 2 + CHUNK_SIZE / 2, 3, false)]
        fn is_valid_offset_cases(
            #[case] data_size: u64,
            #[case] tx_offset: u32,
            #[case] expected: bool,
        ) {
            assert_eq!(
                chunk_at(data_size, tx_offset).is_valid_offset(CHUNK_SIZE),
                expected
            );
        }

        #[rstest]
        #[case(1000, 5, None)]
        #[case(CHUNK_SIZE * 3, 0, Some(CHUNK_SIZE - 1))]
        #[case(CHUNK_SIZE * 3, 2, Some(CHUNK_SIZE * 3 - 1))]
        #[case(0, 0, Some(0))]
        fn end_byte_offset_checked_cases(
            #[case] data_size: u64,
            #[case] tx_offset: u32,
            #[case] expected: Option<u64>,
        ) {
            assert_eq!(
                chunk_at(data_size, tx_offset).end_byte_offset_checked(CHUNK_SIZE),
                expected
            );
        }
    }
}
