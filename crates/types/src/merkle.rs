//! Builds merkle chunk trees over transaction data and validates the
//! resulting chunk proofs.

use crate::chunked::ChunkedIterator;
use crate::Base64;
use crate::ChunkBytes;
use crate::DataRoot;
use crate::UnpackedChunk;
use crate::H256;
use borsh::BorshDeserialize as _;
use borsh_derive::BorshDeserialize;
use eyre::eyre;
use eyre::Error;
use eyre::OptionExt as _;
use openssl::sha;
use tracing::debug;

/// A node of the chunk tree: either an original data chunk (leaf) or the
/// hash of a pair of child nodes (branch).
#[derive(Debug, PartialEq, Clone)]
pub enum Node {
    Leaf(LeafNode),
    Branch(BranchNode),
}

/// An original data chunk covering `[min_byte_range, max_byte_range)`.
#[derive(Debug, PartialEq, Clone)]
pub struct LeafNode {
    pub id: [u8; HASH_SIZE],
    pub data_hash: [u8; HASH_SIZE],
    pub min_byte_range: usize,
    pub max_byte_range: usize,
}

/// The hash of a pair of child nodes.
#[derive(Debug, PartialEq, Clone)]
pub struct BranchNode {
    pub id: [u8; HASH_SIZE],
    /// The left child's exclusive upper bound, the pivot hashed into `id`.
    pub byte_range: usize,
    pub max_byte_range: usize,
    pub left_child: Box<Node>,
    pub right_child: Box<Node>,
}

impl Node {
    pub fn id(&self) -> [u8; HASH_SIZE] {
        match self {
            Self::Leaf(leaf) => leaf.id,
            Self::Branch(branch) => branch.id,
        }
    }

    pub fn max_byte_range(&self) -> usize {
        match self {
            Self::Leaf(leaf) => leaf.max_byte_range,
            Self::Branch(branch) => branch.max_byte_range,
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafNode> {
        match self {
            Self::Leaf(leaf) => Some(leaf),
            Self::Branch(_) => None,
        }
    }
}

/// Concatenated ids and max byte ranges for full set of nodes for an original data chunk, starting with the root.
#[derive(Debug, PartialEq, Clone)]
pub struct Proof {
    pub last_byte_index: usize,
    pub proof: Vec<u8>,
}

/// Populated with data from deserialized [`Proof`] for original data chunk (Leaf [`Node`]).
#[repr(C)]
#[derive(BorshDeserialize, Debug, PartialEq, Clone)]
pub struct LeafProof {
    data_hash: [u8; HASH_SIZE],
    notepad: [u8; NOTE_SIZE - 8],
    offset: [u8; 8],
}

/// Populated with data from deserialized [`Proof`] for branch [`Node`] (hash of pair of child nodes).
#[derive(BorshDeserialize, Debug, PartialEq, Clone)]
pub struct BranchProof {
    left_id: [u8; HASH_SIZE],
    right_id: [u8; HASH_SIZE],
    notepad: [u8; NOTE_SIZE - 8],
    offset: [u8; 8],
}

/// Includes methods to deserialize [`Proof`]s.
pub trait ProofDeserialize<T> {
    fn try_from_proof_slice(slice: &[u8]) -> Result<T, Error>;
    fn offset(&self) -> usize;
    /// The raw 32 note bytes exactly as they appear in the proof. Candidate
    /// ids hash these bytes, not a re-encoding of the decoded offset.
    fn note(&self) -> [u8; NOTE_SIZE];
    fn hash(&self) -> Option<[u8; HASH_SIZE]>;
}

impl ProofDeserialize<Self> for LeafProof {
    fn try_from_proof_slice(slice: &[u8]) -> Result<Self, Error> {
        let proof = Self::try_from_slice(slice)?;
        Ok(proof)
    }
    fn offset(&self) -> usize {
        usize::from_be_bytes(self.offset)
    }
    fn note(&self) -> [u8; NOTE_SIZE] {
        let mut note = [0_u8; NOTE_SIZE];
        note[..NOTE_SIZE - 8].copy_from_slice(&self.notepad);
        note[NOTE_SIZE - 8..].copy_from_slice(&self.offset);
        note
    }
    fn hash(&self) -> Option<[u8; HASH_SIZE]> {
        Some(self.data_hash)
    }
}

impl ProofDeserialize<Self> for BranchProof {
    fn try_from_proof_slice(slice: &[u8]) -> Result<Self, Error> {
        let proof = Self::try_from_slice(slice)?;
        Ok(proof)
    }
    fn offset(&self) -> usize {
        usize::from_be_bytes(self.offset)
    }
    fn note(&self) -> [u8; NOTE_SIZE] {
        let mut note = [0_u8; NOTE_SIZE];
        note[..NOTE_SIZE - 8].copy_from_slice(&self.notepad);
        note[NOTE_SIZE - 8..].copy_from_slice(&self.offset);
        note
    }
    fn hash(&self) -> Option<[u8; HASH_SIZE]> {
        None
    }
}

pub const MAX_CHUNK_SIZE: usize = 256 * 1024;
pub const MIN_CHUNK_SIZE: usize = 32 * 1024;
pub const HASH_SIZE: usize = 32;
const NOTE_SIZE: usize = 32;

/// Includes a function to convert a number to a Vec of 32 bytes per the wire format.
pub trait Helpers<T> {
    fn to_note_vec(&self) -> Vec<u8>;
}

impl Helpers<Self> for usize {
    fn to_note_vec(&self) -> Vec<u8> {
        let mut note = vec![0; NOTE_SIZE - 8];
        note.extend((*self as u64).to_be_bytes());
        note
    }
}

/// Outcome of walking a chunk proof: either the byte window the proof binds
/// to the root, or a mismatch somewhere along the path.
///
/// Only malformed proofs are errors; a proof that simply does not hash to
/// the claimed root is a normal [`PathVerdict::Invalid`].
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PathVerdict {
    Valid(ValidatedPath),
    Invalid,
}

/// The chunk window attested by a valid proof.
///
/// Out-of-range targets are clamped (see [`validate_path`]) by pinching
/// `left_bound` against an unchanged `right_bound`, so `chunk_size` can come
/// out negative. Callers that need a real window must check their target is
/// inside `[0, data_size)` themselves, which is what [`validate_chunk`] does.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ValidatedPath {
    pub offset: i128,
    pub left_bound: i128,
    pub right_bound: i128,
    pub chunk_size: i128,
}

pub fn get_leaf_proof(path_buff: &Base64) -> Result<LeafProof, Error> {
    // Basic size checks to avoid underflow and malformed proofs
    let total_len = path_buff.len();
    let leaf_len = HASH_SIZE + NOTE_SIZE;
    eyre::ensure!(total_len >= leaf_len, "Invalid proof: too short");
    let (_, leaf) = path_buff.split_at(total_len - leaf_len);
    let leaf_proof = LeafProof::try_from_proof_slice(leaf)?;
    Ok(leaf_proof)
}

/// Walks a chunk proof from `root_id` down to its leaf, bisecting on the
/// branch pivots until the path bottoms out, and reports the byte window the
/// leaf covers.
///
/// `target_byte_position` picks which child to descend into at every branch;
/// positions past `right_bound` or below zero are clamped and re-run against
/// the leftmost reachable chunk rather than rejected.
pub fn validate_path(
    root_id: [u8; HASH_SIZE],
    path_buff: &Base64,
    target_byte_position: i128,
    left_bound: i128,
    right_bound: i128,
) -> Result<PathVerdict, Error> {
    // Basic size checks to avoid underflow and malformed proofs
    let total_len = path_buff.len();
    let leaf_len = HASH_SIZE + NOTE_SIZE;
    eyre::ensure!(total_len >= leaf_len, "Invalid proof: too short");

    let branches_len = total_len - leaf_len;
    let branch_item_len = HASH_SIZE * 2 + NOTE_SIZE;
    eyre::ensure!(
        branches_len.is_multiple_of(branch_item_len),
        "Invalid proof: misaligned branch length"
    );

    // Split proof into branches and leaf. Leaf is the final proof and branches
    // are ordered from root to leaf.
    let (branches, leaf) = path_buff.split_at(branches_len);

    // Deserialize proof.
    let branch_proofs: Vec<BranchProof> = branches
        .chunks(branch_item_len)
        .map(BranchProof::try_from_proof_slice)
        .collect::<Result<Vec<_>, _>>()?;
    let leaf_proof = LeafProof::try_from_proof_slice(leaf)?;

    Ok(validate_path_inner(
        root_id,
        target_byte_position,
        left_bound,
        right_bound,
        &branch_proofs,
        &leaf_proof,
    ))
}

fn validate_path_inner(
    id: [u8; HASH_SIZE],
    dest: i128,
    left_bound: i128,
    right_bound: i128,
    branches: &[BranchProof],
    leaf: &LeafProof,
) -> PathVerdict {
    if right_bound <= 0 {
        return PathVerdict::Invalid;
    }
    // Out-of-range targets re-run against the leftmost chunk. Past the right
    // bound the left bound is pinched to right_bound - 1 first, which is why
    // the verdict fields are signed.
    if dest >= right_bound {
        return validate_path_inner(id, 0, right_bound - 1, right_bound, branches, leaf);
    }
    if dest < 0 {
        return validate_path_inner(id, 0, 0, right_bound, branches, leaf);
    }

    let Some((branch, rest)) = branches.split_first() else {
        // Terminal segment: the leaf must hash to the id claimed one level up.
        let candidate = hash_all_sha256(vec![&leaf.data_hash, &leaf.note()]);
        debug!(
            "  LeafProof: data_hash: {}, max_byte_range: {}",
            base64_url::encode(&leaf.data_hash),
            leaf.offset()
        );
        if candidate != id {
            return PathVerdict::Invalid;
        }
        return PathVerdict::Valid(ValidatedPath {
            offset: right_bound - 1,
            left_bound,
            right_bound,
            chunk_size: right_bound - left_bound,
        });
    };

    // Calculate the path_hash from the proof elements.
    let candidate = hash_all_sha256(vec![&branch.left_id, &branch.right_id, &branch.note()]);
    if candidate != id {
        return PathVerdict::Invalid;
    }

    let pivot = branch.offset() as i128;
    debug!(
        "BranchProof: left: {}{}, right: {}{},pivot: {} => path_hash: {}",
        if dest < pivot { "✅" } else { "" },
        base64_url::encode(&branch.left_id),
        if dest < pivot { "" } else { "✅" },
        base64_url::encode(&branch.right_id),
        pivot,
        base64_url::encode(&candidate)
    );

    // Descend into the child covering the target, narrowing the bound on the
    // side the pivot cuts off.
    if dest < pivot {
        validate_path_inner(
            branch.left_id,
            dest,
            left_bound,
            right_bound.min(pivot),
            rest,
            leaf,
        )
    } else {
        validate_path_inner(
            branch.right_id,
            dest,
            left_bound.max(pivot),
            right_bound,
            rest,
            leaf,
        )
    }
}

/// Validates an [`UnpackedChunk`] against the `data_root` it claims to belong
/// to: the data_path must prove a byte window at the chunk's end byte offset,
/// and the chunk bytes themselves must hash to the proof's leaf.
pub fn validate_chunk(root_id: DataRoot, chunk: &UnpackedChunk, chunk_size: u64) -> Result<(), Error> {
    eyre::ensure!(
        chunk.is_valid_offset(chunk_size),
        "Invalid chunk: tx_offset {} exceeds the chunk count implied by data_size {}",
        chunk.tx_offset,
        chunk.data_size
    );

    let target = chunk.end_byte_offset(chunk_size);
    let verdict = validate_path(
        root_id.0,
        &chunk.data_path,
        target as i128,
        0,
        chunk.data_size as i128,
    )?;
    let PathVerdict::Valid(validated) = verdict else {
        return Err(eyre!(
            "Invalid data_path for chunk at tx_offset {}",
            chunk.tx_offset
        ));
    };

    // The leaf must commit to exactly the bytes we were handed.
    let leaf_proof = get_leaf_proof(&chunk.data_path)?;
    let data_hash = hash_sha256(&chunk.bytes.0);
    eyre::ensure!(
        leaf_proof.hash() == Some(data_hash),
        "Invalid chunk: data does not hash to the proof's data_hash"
    );
    eyre::ensure!(
        validated.chunk_size == chunk.bytes.0.len() as i128,
        "Invalid chunk: length {} does not match the {} byte window the proof attests",
        chunk.bytes.0.len(),
        validated.chunk_size
    );

    Ok(())
}

/// Hashes a single data chunk into a leaf node anchored at `min_byte_range`.
pub fn generate_leaf(chunk: &[u8], min_byte_range: usize) -> Node {
    let data_hash = hash_sha256(chunk);
    let max_byte_range = min_byte_range + chunk.len();
    let id = hash_all_sha256(vec![&data_hash, &max_byte_range.to_note_vec()]);
    Node::Leaf(LeafNode {
        id,
        data_hash,
        min_byte_range,
        max_byte_range,
    })
}

/// Generates data chunks from which the calculation of root id starts.
/// does NOT need to be passed in correctly sized data chunks
pub fn generate_leaves(
    data: impl Iterator<Item = eyre::Result<Vec<u8>>>,
    chunk_size: usize,
) -> Result<Vec<Node>, Error> {
    let data_chunks = ChunkedIterator::new(data, chunk_size);
    generate_leaves_from_chunks(data_chunks)
}

/// Generates merkle leaves from chunks
pub fn generate_leaves_from_chunks(
    chunks: impl Iterator<Item = eyre::Result<ChunkBytes>>,
) -> Result<Vec<Node>, Error> {
    let mut leaves = Vec::<Node>::new();
    let mut min_byte_range = 0;
    for chunk in chunks {
        let chunk = chunk?;
        leaves.push(generate_leaf(&chunk, min_byte_range));
        min_byte_range += chunk.len();
    }
    Ok(leaves)
}

pub struct DataRootLeaf {
    pub data_root: H256,
    pub tx_size: usize,
}

/// Generates merkle leaves from data roots. The data_root bytes stand in for
/// the leaf data_hash unhashed, so the tree commits to the roots themselves.
pub fn generate_leaves_from_data_roots(data_roots: &[DataRootLeaf]) -> Vec<Node> {
    let mut leaves = Vec::<Node>::new();
    let mut min_byte_range = 0;
    for data_root in data_roots.iter() {
        let data_root_hash = data_root.data_root.0;
        let max_byte_range = min_byte_range + data_root.tx_size;
        let id = hash_all_sha256(vec![&data_root_hash, &max_byte_range.to_note_vec()]);

        leaves.push(Node::Leaf(LeafNode {
            id,
            data_hash: data_root_hash,
            min_byte_range,
            max_byte_range,
        }));

        min_byte_range = max_byte_range;
    }
    leaves
}

/// Hashes together a single branch node from a pair of child nodes.
pub fn hash_branch(left: Node, right: Node) -> Node {
    // pivot = left child's exclusive upper bound used in branch hashing
    let byte_range = left.max_byte_range();
    let max_byte_range = right.max_byte_range();
    let pivot_note = byte_range.to_note_vec();
    let id = hash_all_sha256(vec![&left.id(), &right.id(), &pivot_note]);
    Node::Branch(BranchNode {
        id,
        byte_range,
        max_byte_range,
        left_child: Box::new(left),
        right_child: Box::new(right),
    })
}

/// Builds one layer of branch nodes from a layer of child nodes. An odd
/// trailing node is carried into the next layer unchanged.
pub fn build_layer(nodes: Vec<Node>) -> Vec<Node> {
    let mut layer =
        Vec::<Node>::with_capacity(nodes.len() / 2 + !nodes.len().is_multiple_of(2) as usize);
    let mut nodes_iter = nodes.into_iter();
    while let Some(left) = nodes_iter.next() {
        if let Some(right) = nodes_iter.next() {
            layer.push(hash_branch(left, right));
        } else {
            layer.push(left);
        }
    }
    layer
}

/// Builds all layers from leaves up to single root node.
pub fn generate_data_root(mut nodes: Vec<Node>) -> Result<Node, Error> {
    while nodes.len() > 1 {
        nodes = build_layer(nodes);
    }
    let root = nodes
        .pop()
        .ok_or_eyre("At least one data node is required")?;
    Ok(root)
}

/// Calculates [`Proof`] for each data chunk contained in root [`Node`].
pub fn resolve_proofs(node: Node, proof: Option<Proof>) -> Vec<Proof> {
    let mut proof = proof.unwrap_or_else(|| Proof {
        last_byte_index: 0,
        proof: Vec::new(),
    });
    match node {
        Node::Leaf(leaf) => {
            proof.last_byte_index = leaf.max_byte_range - 1;
            proof.proof.extend(leaf.data_hash);
            proof.proof.extend(leaf.max_byte_range.to_note_vec());
            vec![proof]
        }
        Node::Branch(branch) => {
            proof.proof.extend(branch.left_child.id());
            proof.proof.extend(branch.right_child.id());
            proof.proof.extend(branch.byte_range.to_note_vec());

            let mut left_proofs = resolve_proofs(*branch.left_child, Some(proof.clone()));
            let right_proofs = resolve_proofs(*branch.right_child, Some(proof));
            left_proofs.extend(right_proofs);
            left_proofs
        }
    }
}

/// A single chunk's byte window and content hash, captured before the tree
/// nodes are consumed by proof extraction.
#[derive(Debug, PartialEq, Clone)]
pub struct ChunkNode {
    pub data_hash: [u8; HASH_SIZE],
    pub min_byte_range: usize,
    pub max_byte_range: usize,
}

/// Everything a client needs to upload a transaction chunk by chunk: the
/// data_root the network indexes it under, the chunk byte windows, and one
/// proof per chunk, in leaf order.
#[derive(Debug, PartialEq, Clone)]
pub struct ChunkBundle {
    pub data_root: DataRoot,
    pub chunks: Vec<ChunkNode>,
    pub proofs: Vec<Proof>,
}

/// Builds a merkle tree over `data`, with a root, including the proofs for
/// each chunk.
pub fn prepare_chunks(
    data: impl Iterator<Item = eyre::Result<Vec<u8>>>,
    chunk_size: usize,
) -> Result<ChunkBundle, Error> {
    let leaves = generate_leaves(data, chunk_size)?;
    let chunks: Vec<ChunkNode> = leaves
        .iter()
        .filter_map(Node::as_leaf)
        .map(|leaf| ChunkNode {
            data_hash: leaf.data_hash,
            min_byte_range: leaf.min_byte_range,
            max_byte_range: leaf.max_byte_range,
        })
        .collect();
    let root = generate_data_root(leaves)?;
    let data_root = H256(root.id());
    let proofs = resolve_proofs(root, None);

    Ok(ChunkBundle {
        data_root,
        chunks,
        proofs,
    })
}

pub fn hash_sha256(message: &[u8]) -> [u8; 32] {
    let mut hasher = sha::Sha256::new();
    hasher.update(message);
    hasher.finish()
}

/// Returns a SHA256 hash of the the concatenated SHA256 hashes of a vector of messages.
pub fn hash_all_sha256(messages: Vec<&[u8]>) -> [u8; 32] {
    let hash: Vec<u8> = messages.into_iter().flat_map(hash_sha256).collect();
    hash_sha256(&hash)
}
