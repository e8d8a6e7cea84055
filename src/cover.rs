// 6.0 cover.rs: what a pool sells and what it pays out on. insurance records,
// incident reports, and the proof check that decides who may redeem.

use crate::types::{AccountId, Amount, Hash32, InsuranceId, Timestamp};
use alloy_primitives::keccak256;
use serde::{Deserialize, Serialize};
use std::fmt;

// one written cover. `active` drops on unlock or redeem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insurance {
    pub id: InsuranceId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub amount: Amount,
    pub target: Hash32,
    pub insured: AccountId,
    pub agent: AccountId,
    pub active: bool,
}

impl Insurance {
    pub fn covers(&self, at: Timestamp) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Parameters of an `insure` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverRequest {
    pub amount: Amount,
    pub max_cost: Amount,
    pub span_secs: u64,
    pub target: Hash32,
    pub insured: AccountId,
}

/// Premium split recorded when cover is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverReceipt {
    pub insurance: Insurance,
    pub premium: Amount,
    pub protocol_fee: Amount,
    pub reserve_premium: Amount,
}

// 6.1: an approved incident. payouts are amount * numerator / denominator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub payout_numerator: u128,
    pub payout_denominator: u128,
    pub incident_timestamp: Timestamp,
    pub merkle_root: Hash32,
    pub raw_data: String,
    pub memo: String,
}

/// Leaf a claim proves membership for. A null `insured` approves every holder of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimLeaf {
    pub target: Hash32,
    pub insured: AccountId,
}

/// Merkle membership check for claims. The proof format belongs to the implementor.
pub trait ClaimVerifier: fmt::Debug {
    fn verify(&self, proof: &[Hash32], root: Hash32, leaf: ClaimLeaf) -> bool;
}

/// Accepts a claim if either the holder specific or the target wide leaf verifies.
pub fn claim_is_approved(
    verifier: &dyn ClaimVerifier,
    proof: &[Hash32],
    root: Hash32,
    target: Hash32,
    insured: AccountId,
) -> bool {
    verifier.verify(proof, root, ClaimLeaf { target, insured })
        || verifier.verify(
            proof,
            root,
            ClaimLeaf {
                target,
                insured: AccountId::NULL,
            },
        )
}

// 6.2: keccak merkle tree with sorted pairs, so a proof is just the sibling list.
impl ClaimLeaf {
    pub fn hash(&self) -> Hash32 {
        let mut packed = [0u8; 40];
        packed[..32].copy_from_slice(&self.target.0);
        packed[32..].copy_from_slice(&self.insured.0.to_be_bytes());
        Hash32(keccak256(packed).0)
    }
}

fn hash_pair(a: Hash32, b: Hash32) -> Hash32 {
    let (lo, hi) = if a.0 <= b.0 { (a, b) } else { (b, a) };
    let mut packed = [0u8; 64];
    packed[..32].copy_from_slice(&lo.0);
    packed[32..].copy_from_slice(&hi.0);
    Hash32(keccak256(packed).0)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MerkleVerifier;

impl ClaimVerifier for MerkleVerifier {
    fn verify(&self, proof: &[Hash32], root: Hash32, leaf: ClaimLeaf) -> bool {
        proof.iter().fold(leaf.hash(), |node, sibling| hash_pair(node, *sibling)) == root
    }
}

/// Builds the tree an incident report commits to. Odd nodes are promoted unchanged.
#[derive(Debug, Clone)]
pub struct ClaimTree {
    levels: Vec<Vec<Hash32>>,
}

impl ClaimTree {
    pub fn new(leaves: &[ClaimLeaf]) -> Self {
        let mut levels = vec![leaves.iter().map(ClaimLeaf::hash).collect::<Vec<_>>()];
        while levels.last().map_or(false, |level| level.len() > 1) {
            let next = levels
                .last()
                .map(|level| {
                    level
                        .chunks(2)
                        .map(|pair| match pair {
                            [a, b] => hash_pair(*a, *b),
                            [a] => *a,
                            _ => Hash32::ZERO,
                        })
                        .collect()
                })
                .unwrap_or_default();
            levels.push(next);
        }
        Self { levels }
    }

    pub fn root(&self) -> Hash32 {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(Hash32::ZERO)
    }

    pub fn proof(&self, leaf: usize) -> Vec<Hash32> {
        let mut proof = Vec::new();
        let mut position = leaf;
        for level in &self.levels[..self.levels.len().saturating_sub(1)] {
            if let Some(sibling) = level.get(position ^ 1) {
                proof.push(*sibling);
            }
            position /= 2;
        }
        proof
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TargetWide;

    impl ClaimVerifier for TargetWide {
        fn verify(&self, _proof: &[Hash32], _root: Hash32, leaf: ClaimLeaf) -> bool {
            leaf.insured.is_null()
        }
    }

    #[test]
    fn target_wide_leaf_approves_any_holder() {
        let target = Hash32([7u8; 32]);
        assert!(claim_is_approved(&TargetWide, &[], Hash32::ZERO, target, AccountId(3)));
    }

    #[test]
    fn cover_window_is_inclusive() {
        let ins = Insurance {
            id: InsuranceId(0),
            start: Timestamp(100),
            end: Timestamp(200),
            amount: 1,
            target: Hash32::ZERO,
            insured: AccountId(1),
            agent: AccountId(1),
            active: true,
        };
        assert!(ins.covers(Timestamp(100)));
        assert!(ins.covers(Timestamp(200)));
        assert!(!ins.covers(Timestamp(201)));
    }

    #[test]
    fn merkle_proofs_verify() {
        let leaves: Vec<ClaimLeaf> = (1..=5)
            .map(|i| ClaimLeaf {
                target: Hash32([i as u8; 32]),
                insured: AccountId(i),
            })
            .collect();
        let tree = ClaimTree::new(&leaves);
        for (i, leaf) in leaves.iter().enumerate() {
            assert!(MerkleVerifier.verify(&tree.proof(i), tree.root(), *leaf));
        }
        let stranger = ClaimLeaf {
            target: Hash32([1u8; 32]),
            insured: AccountId(9),
        };
        assert!(!MerkleVerifier.verify(&tree.proof(0), tree.root(), stranger));
    }

    #[test]
    fn single_leaf_tree_is_its_own_root() {
        let leaf = ClaimLeaf {
            target: Hash32([3u8; 32]),
            insured: AccountId::NULL,
        };
        let tree = ClaimTree::new(&[leaf]);
        assert_eq!(tree.root(), leaf.hash());
        assert!(tree.proof(0).is_empty());
        assert!(claim_is_approved(&MerkleVerifier, &[], tree.root(), leaf.target, AccountId(4)));
    }
}
