use std::collections::BTreeSet;

use erde_chain::{Address, U256};
use rayon::prelude::*;
use tiny_keccak::{Hasher, Keccak};

use crate::{domain::UserReward, error::ErdeError};

/// Below this many recipients, hashing sequentially avoids rayon's
/// thread-pool dispatch overhead; above it, leaf hashing is parallelized —
/// this is CPU-bound, not I/O-bound, so it's the one stage that benefits
/// from `rayon` rather than `futures`.
const PARALLEL_HASH_THRESHOLD: usize = 4_096;

/// A distribution with more than this many recipients is rejected.
pub const MAX_RECIPIENTS: usize = 1 << 20;

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut out = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut out);
    out
}

/// `keccak256(keccak256(abi.encode(address, uint256)))` — the OpenZeppelin
/// `StandardMerkleTree` leaf encoding. Double-hashing eliminates
/// second-preimage attacks against the tree's internal nodes.
pub fn leaf_hash(address: Address, amount: U256) -> [u8; 32] {
    let mut encoded = [0u8; 64];
    encoded[12..32].copy_from_slice(address.as_bytes());
    amount.to_big_endian(&mut encoded[32..64]);
    keccak256(&keccak256(&encoded))
}

/// Hashes two sibling nodes after sorting them lexicographically, so the
/// proof path is independent of left/right position.
fn hash_pair(a: [u8; 32], b: [u8; 32]) -> [u8; 32] {
    let mut buf = [0u8; 64];
    if a <= b {
        buf[..32].copy_from_slice(&a);
        buf[32..].copy_from_slice(&b);
    } else {
        buf[..32].copy_from_slice(&b);
        buf[32..].copy_from_slice(&a);
    }
    keccak256(&buf)
}

/// Builds a complete binary tree over `leaves` (already hashed) using the
/// OpenZeppelin `merkle-tree` package's array layout: a `2n - 1`-element
/// array with leaves placed at the tail in reverse order, parents folded
/// in from the end. `tree[0]` is the root. This construction handles
/// non-power-of-two leaf counts without leaf duplication.
fn build_tree(leaves: &[[u8; 32]]) -> Vec<[u8; 32]> {
    let n = leaves.len();
    let mut tree = vec![[0u8; 32]; 2 * n - 1];
    for (i, leaf) in leaves.iter().enumerate() {
        tree[tree.len() - 1 - i] = *leaf;
    }
    let mut i = tree.len() as isize - 2;
    while i >= 0 {
        let idx = i as usize;
        let parent = (idx - 1) / 2;
        tree[parent] = hash_pair(tree[idx], tree[idx + 1]);
        i -= 2;
    }
    tree
}

fn sibling_index(i: usize) -> usize {
    if i % 2 == 0 { i - 1 } else { i + 1 }
}

fn parent_index(i: usize) -> usize {
    (i - 1) / 2
}

/// Sibling-hash path from a leaf's position in the tree array up to (but
/// excluding) the root.
fn proof_for(tree: &[[u8; 32]], mut leaf_tree_index: usize) -> Vec<[u8; 32]> {
    let mut proof = Vec::new();
    while leaf_tree_index > 0 {
        proof.push(tree[sibling_index(leaf_tree_index)]);
        leaf_tree_index = parent_index(leaf_tree_index);
    }
    proof
}

/// Recomputes the root a `(leaf, proof)` pair would produce.
pub fn process_proof(leaf: [u8; 32], proof: &[[u8; 32]]) -> [u8; 32] {
    proof.iter().fold(leaf, |acc, sibling| hash_pair(acc, *sibling))
}

/// Builds the root and a proof per recipient. Validates before
/// building: non-empty, well-formed/unique addresses, budget ceiling, and
/// capacity; then performs an internal round-trip, re-verifying every
/// recipient's proof against the produced root (a failure here is a fatal
/// logic error, never a caller input error).
pub fn build_distribution(
    recipients: Vec<UserReward>,
    weekly_budget: U256,
) -> Result<(
    [u8; 32],
    Vec<UserReward>,
), ErdeError> {
    if recipients.is_empty() {
        return Err(ErdeError::PolicyViolation {
            stage: "merkle",
            detail: "no recipients in distribution (NoRecipients)".to_string(),
        });
    }
    if recipients.len() > MAX_RECIPIENTS {
        return Err(ErdeError::PolicyViolation {
            stage: "merkle",
            detail: format!(
                "recipient count {} exceeds capacity {MAX_RECIPIENTS}",
                recipients.len()
            ),
        });
    }

    let mut seen = BTreeSet::new();
    for r in &recipients {
        if !seen.insert(r.address) {
            return Err(ErdeError::PolicyViolation {
                stage: "merkle",
                detail: format!("duplicate recipient address {:#x}", r.address),
            });
        }
    }

    let total: U256 = recipients
        .iter()
        .try_fold(U256::zero(), |acc, r| acc.checked_add(r.total_reward))
        .ok_or_else(|| ErdeError::IntegrityMismatch {
            stage: "merkle",
            detail: "U256 overflow summing recipient totals".to_string(),
        })?;
    if total > weekly_budget {
        return Err(ErdeError::PolicyViolation {
            stage: "merkle",
            detail: format!("total rewards {total} exceed weekly budget {weekly_budget}"),
        });
    }

    // Canonical leaf order: sort by hashed leaf value, independent of
    // input ordering.
    let mut ordered: Vec<(usize, [u8; 32])> = if recipients.len() >= PARALLEL_HASH_THRESHOLD {
        recipients
            .par_iter()
            .enumerate()
            .map(|(i, r)| (i, leaf_hash(r.address, r.total_reward)))
            .collect()
    } else {
        recipients
            .iter()
            .enumerate()
            .map(|(i, r)| (i, leaf_hash(r.address, r.total_reward)))
            .collect()
    };
    ordered.sort_by(|a, b| a.1.cmp(&b.1));

    let hashed_leaves: Vec<[u8; 32]> = ordered.iter().map(|(_, h)| *h).collect();
    let tree = build_tree(&hashed_leaves);
    let root = tree[0];

    let mut recipients = recipients;
    for (sorted_pos, (original_index, leaf)) in ordered.into_iter().enumerate() {
        let leaf_tree_index = tree.len() - 1 - sorted_pos;
        let proof = proof_for(&tree, leaf_tree_index);

        // Internal round-trip: a failure here is a logic bug, never surfaced
        // as a caller-facing policy error.
        if process_proof(leaf, &proof) != root {
            return Err(ErdeError::IntegrityMismatch {
                stage: "merkle",
                detail: format!(
                    "proof round-trip failed for recipient {:#x}",
                    recipients[original_index].address
                ),
            });
        }
        recipients[original_index].proof = proof;
    }

    Ok((root, recipients))
}
