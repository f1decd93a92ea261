//! Commit-reveal protocol for server seeds.
//!
//! A 256-bit server seed is generated at commit time and held only in the
//! vault; the player sees its SHA-256 hash immediately. The hash binds the
//! server before the player acts, and the post-reveal check proves the
//! outcome was not steered after the fact.

use crate::errors::{EngineError, EngineResult};
use crate::round::OutcomeDescriptor;
use crate::selector;
use dashmap::DashMap;
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// SHA-256 hex digest of a seed string.
pub fn seed_hash_hex(server_seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(server_seed.as_bytes());
    hex::encode(hasher.finalize())
}

/// Published part of a commitment.
#[derive(Debug, Clone)]
pub struct Commitment {
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
}

struct SealedSeed {
    server_seed: String,
    revealed: bool,
}

/// Holds server seeds between commit and reveal.
///
/// Only the hash leaves the vault until `reveal` is called; reveal is
/// idempotent and never regenerates a seed.
pub struct SeedVault {
    seeds: DashMap<Uuid, SealedSeed>,
    /// Guards against commitment reuse per (identity, nonce). Callers with
    /// separate nonce sequences must pass identities from disjoint
    /// namespaces.
    committed_nonces: DashMap<String, Uuid>,
}

impl SeedVault {
    pub fn new() -> Self {
        Self {
            seeds: DashMap::new(),
            committed_nonces: DashMap::new(),
        }
    }

    /// Generate and seal a server seed for `round_id`, binding it to the
    /// caller's `(user, nonce)` pair. Returns the public commitment.
    pub fn commit(
        &self,
        round_id: Uuid,
        user_id: &str,
        nonce: u64,
        client_seed: String,
    ) -> EngineResult<Commitment> {
        let nonce_key = format!("{}:{}", user_id, nonce);
        if self.committed_nonces.contains_key(&nonce_key) {
            return Err(EngineError::DuplicateCommitment {
                user_id: user_id.to_string(),
                nonce,
            });
        }

        let mut raw = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut raw);
        let server_seed = hex::encode(raw);
        let server_seed_hash = seed_hash_hex(&server_seed);

        self.committed_nonces.insert(nonce_key, round_id);
        self.seeds.insert(
            round_id,
            SealedSeed {
                server_seed,
                revealed: false,
            },
        );

        Ok(Commitment {
            server_seed_hash,
            client_seed,
            nonce,
        })
    }

    /// Disclose the server seed for a committed round. Idempotent: repeated
    /// reveals return the same cached seed.
    pub fn reveal(&self, round_id: Uuid) -> EngineResult<String> {
        let mut entry = self
            .seeds
            .get_mut(&round_id)
            .ok_or(EngineError::NotCommitted(round_id))?;
        entry.revealed = true;
        Ok(entry.server_seed.clone())
    }

    pub fn is_committed(&self, round_id: Uuid) -> bool {
        self.seeds.contains_key(&round_id)
    }
}

impl Default for SeedVault {
    fn default() -> Self {
        Self::new()
    }
}

/// Independent post-hoc verification: recompute the commitment hash and the
/// outcome from first principles and compare against what was published.
///
/// Any mismatch is an integrity fault the caller must treat as fatal.
pub fn verify_outcome(
    server_seed: &str,
    server_seed_hash: &str,
    client_seed: &str,
    nonce: u64,
    candidates: &VerifyCandidates<'_>,
    published: &OutcomeDescriptor,
) -> EngineResult<bool> {
    if seed_hash_hex(server_seed) != server_seed_hash {
        return Ok(false);
    }

    let recomputed = match candidates {
        VerifyCandidates::Segments(segments) => {
            let draw = selector::uniform_draw(server_seed, client_seed, nonce, 0);
            let index = selector::select_segment(segments, draw)?;
            match published {
                OutcomeDescriptor::Segment {
                    index: published_index,
                    ..
                } => index == *published_index,
                OutcomeDescriptor::Winners { .. } => false,
            }
        }
        VerifyCandidates::Tickets(ticket_ids) => {
            match published {
                OutcomeDescriptor::Winners { winners } => {
                    let recomputed_winners = selector::draw_winners(
                        ticket_ids,
                        winners.len(),
                        server_seed,
                        client_seed,
                        nonce,
                    )?;
                    winners
                        .iter()
                        .zip(recomputed_winners.iter())
                        .all(|(w, t)| &w.ticket_id == t)
                }
                OutcomeDescriptor::Segment { .. } => false,
            }
        }
    };

    Ok(recomputed)
}

/// Candidate material for verification, borrowed from the round record.
pub enum VerifyCandidates<'a> {
    Segments(&'a [selector::Segment]),
    Tickets(&'a [String]),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::selector::Segment;

    #[test]
    fn test_commit_publishes_hash_only() {
        let vault = SeedVault::new();
        let round_id = Uuid::new_v4();
        let commitment = vault
            .commit(round_id, "alice", 1, "client-seed".to_string())
            .unwrap();

        // 32-byte digest, hex encoded.
        assert_eq!(commitment.server_seed_hash.len(), 64);

        let seed = vault.reveal(round_id).unwrap();
        assert_eq!(seed_hash_hex(&seed), commitment.server_seed_hash);
    }

    #[test]
    fn test_duplicate_commitment_rejected() {
        let vault = SeedVault::new();
        vault
            .commit(Uuid::new_v4(), "alice", 1, "c".to_string())
            .unwrap();

        let err = vault
            .commit(Uuid::new_v4(), "alice", 1, "c".to_string())
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateCommitment { .. }));

        // Different nonce or different user is fine.
        vault
            .commit(Uuid::new_v4(), "alice", 2, "c".to_string())
            .unwrap();
        vault
            .commit(Uuid::new_v4(), "bob", 1, "c".to_string())
            .unwrap();
    }

    #[test]
    fn test_reveal_before_commit() {
        let vault = SeedVault::new();
        let err = vault.reveal(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, EngineError::NotCommitted(_)));
    }

    #[test]
    fn test_reveal_idempotent() {
        let vault = SeedVault::new();
        let round_id = Uuid::new_v4();
        vault.commit(round_id, "alice", 1, "c".to_string()).unwrap();

        let first = vault.reveal(round_id).unwrap();
        let second = vault.reveal(round_id).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_verify_detects_tampered_seed() {
        let segments = vec![
            Segment {
                weight: 1,
                multiplier: Amount::ZERO,
            },
            Segment {
                weight: 1,
                multiplier: Amount::from_whole(2),
            },
        ];

        let server_seed = "a-server-seed";
        let hash = seed_hash_hex(server_seed);
        let draw = selector::uniform_draw(server_seed, "client", 5, 0);
        let index = selector::select_segment(&segments, draw).unwrap();
        let outcome = OutcomeDescriptor::Segment {
            index,
            multiplier: segments[index].multiplier,
        };

        let ok = verify_outcome(
            server_seed,
            &hash,
            "client",
            5,
            &VerifyCandidates::Segments(&segments),
            &outcome,
        )
        .unwrap();
        assert!(ok);

        // Substituting a different seed fails the hash check.
        let tampered = verify_outcome(
            "another-seed",
            &hash,
            "client",
            5,
            &VerifyCandidates::Segments(&segments),
            &outcome,
        )
        .unwrap();
        assert!(!tampered);

        // A forged outcome index fails the recomputation check.
        let forged = OutcomeDescriptor::Segment {
            index: 1 - index,
            multiplier: segments[1 - index].multiplier,
        };
        let forged_ok = verify_outcome(
            server_seed,
            &hash,
            "client",
            5,
            &VerifyCandidates::Segments(&segments),
            &forged,
        )
        .unwrap();
        assert!(!forged_ok);
    }

    #[test]
    fn test_verify_draw_winners() {
        let tickets: Vec<String> = (0..6).map(|i| format!("t{}", i)).collect();
        let server_seed = "draw-seed";
        let hash = seed_hash_hex(server_seed);

        let winner_ids = selector::draw_winners(&tickets, 3, server_seed, "cs", 9).unwrap();
        let outcome = OutcomeDescriptor::Winners {
            winners: winner_ids
                .iter()
                .enumerate()
                .map(|(rank, ticket_id)| crate::round::WinnerPlace {
                    rank: rank as u32,
                    ticket_id: ticket_id.clone(),
                    user_id: "u".to_string(),
                    prize: Amount::ZERO,
                })
                .collect(),
        };

        let ok = verify_outcome(
            server_seed,
            &hash,
            "cs",
            9,
            &VerifyCandidates::Tickets(&tickets),
            &outcome,
        )
        .unwrap();
        assert!(ok);
    }
}
