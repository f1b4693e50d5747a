//! Proof Classifier, spec.md §4.B.
//!
//! Routes a decoded `InnerProof` plus its matching off-chain payload bytes
//! by proof kind into a closed sum type, extracting the commitment,
//! nullifier, and kind-specific side data each handler needs. Per design
//! note §9, this is a tagged-variant dispatch rather than an open-ended
//! class hierarchy.

use crate::error::Result;
use crate::types::{AliasId, BridgeId, Bytes32, InnerProof, ProofId, ViewingKey};
use crate::wire;
use num_bigint::BigUint;

#[derive(Debug, Clone)]
pub enum ClassifiedProof {
    JoinSplit(JoinSplitProof),
    Account(AccountProof),
    DefiDeposit(DefiDepositProof),
    DefiClaim(DefiClaimProof),
    /// Padding proofs are skipped (spec.md §4.B).
    Padding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSplitKind {
    Deposit,
    Withdraw,
    Send,
}

#[derive(Debug, Clone)]
pub struct JoinSplitProof {
    pub kind: JoinSplitKind,
    pub note_commitment_1: Bytes32,
    pub note_commitment_2: Bytes32,
    pub nullifier_1: Bytes32,
    pub nullifier_2: Bytes32,
    pub viewing_key_1: ViewingKey,
    pub viewing_key_2: ViewingKey,
    pub asset_id_raw: Bytes32,
    pub public_value: BigUint,
    pub public_owner: Bytes32,
    pub tx_id: Bytes32,
}

#[derive(Debug, Clone)]
pub struct AccountProof {
    pub note_commitment_1: Bytes32,
    pub note_commitment_2: Bytes32,
    pub nullifier_1: Bytes32,
    pub account_public_key: Bytes32,
    pub account_alias_id: AliasId,
    pub spending_key_1: Bytes32,
    pub spending_key_2: Bytes32,
    pub tx_id: Bytes32,
}

#[derive(Debug, Clone)]
pub struct DefiDepositProof {
    pub note_commitment_1: Bytes32,
    pub note_commitment_2: Bytes32,
    pub nullifier_1: Bytes32,
    pub nullifier_2: Bytes32,
    pub viewing_key: ViewingKey,
    pub bridge_id: BridgeId,
    pub deposit_value: BigUint,
    pub partial_state_secret_eph_pub_key: Bytes32,
    pub tx_id: Bytes32,
}

#[derive(Debug, Clone)]
pub struct DefiClaimProof {
    pub note_commitment_1: Bytes32,
    pub note_commitment_2: Bytes32,
    pub nullifier_1: Bytes32,
    pub nullifier_2: Bytes32,
    pub tx_id: Bytes32,
}

/// Classifies one inner proof. `offchain_payload` is the matching entry of
/// `Block::offchain_tx_data`, empty for `DEFI_CLAIM` and padding proofs.
pub fn classify(proof: &InnerProof, offchain_payload: &[u8]) -> Result<ClassifiedProof> {
    match proof.proof_id {
        ProofId::Deposit | ProofId::Withdraw | ProofId::Send => {
            let decoded = wire::decode_join_split_offchain(offchain_payload)?;
            let kind = match proof.proof_id {
                ProofId::Deposit => JoinSplitKind::Deposit,
                ProofId::Withdraw => JoinSplitKind::Withdraw,
                ProofId::Send => JoinSplitKind::Send,
                _ => unreachable!(),
            };
            Ok(ClassifiedProof::JoinSplit(JoinSplitProof {
                kind,
                note_commitment_1: proof.note_commitment_1,
                note_commitment_2: proof.note_commitment_2,
                nullifier_1: proof.nullifier_1,
                nullifier_2: proof.nullifier_2,
                viewing_key_1: decoded.viewing_key_1,
                viewing_key_2: decoded.viewing_key_2,
                asset_id_raw: proof.asset_id,
                public_value: proof.public_value.clone(),
                public_owner: proof.public_owner,
                tx_id: proof.tx_id,
            }))
        }
        ProofId::Account => {
            let decoded = wire::decode_account_offchain(offchain_payload)?;
            Ok(ClassifiedProof::Account(AccountProof {
                note_commitment_1: proof.note_commitment_1,
                note_commitment_2: proof.note_commitment_2,
                nullifier_1: proof.nullifier_1,
                account_public_key: decoded.account_public_key,
                account_alias_id: decoded.account_alias_id,
                spending_key_1: decoded.spending_key_1,
                spending_key_2: decoded.spending_key_2,
                tx_id: proof.tx_id,
            }))
        }
        ProofId::DefiDeposit => {
            let decoded = wire::decode_defi_deposit_offchain(offchain_payload)?;
            Ok(ClassifiedProof::DefiDeposit(DefiDepositProof {
                note_commitment_1: proof.note_commitment_1,
                note_commitment_2: proof.note_commitment_2,
                nullifier_1: proof.nullifier_1,
                nullifier_2: proof.nullifier_2,
                viewing_key: decoded.viewing_key,
                bridge_id: decoded.bridge_id,
                deposit_value: decoded.deposit_value,
                partial_state_secret_eph_pub_key: decoded.partial_state_secret_eph_pub_key,
                tx_id: proof.tx_id,
            }))
        }
        // No off-chain payload consumption; routed downstream by whether
        // nullifier1 matches a stored claim owned by this user.
        ProofId::DefiClaim => Ok(ClassifiedProof::DefiClaim(DefiClaimProof {
            note_commitment_1: proof.note_commitment_1,
            note_commitment_2: proof.note_commitment_2,
            nullifier_1: proof.nullifier_1,
            nullifier_2: proof.nullifier_2,
            tx_id: proof.tx_id,
        })),
        ProofId::Padding => Ok(ClassifiedProof::Padding),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProofId;

    fn base_proof(proof_id: ProofId) -> InnerProof {
        InnerProof {
            proof_id,
            note_commitment_1: [1u8; 32],
            note_commitment_2: [2u8; 32],
            nullifier_1: [3u8; 32],
            nullifier_2: [4u8; 32],
            public_value: BigUint::from(0u32),
            public_owner: [0u8; 32],
            asset_id: [0u8; 32],
            tx_id: [9u8; 32],
        }
    }

    #[test]
    fn padding_proofs_need_no_payload() {
        let proof = base_proof(ProofId::Padding);
        let classified = classify(&proof, &[]).unwrap();
        assert!(matches!(classified, ClassifiedProof::Padding));
    }

    #[test]
    fn defi_claim_needs_no_payload() {
        let proof = base_proof(ProofId::DefiClaim);
        let classified = classify(&proof, &[]).unwrap();
        assert!(matches!(classified, ClassifiedProof::DefiClaim(_)));
    }

    #[test]
    fn join_split_extracts_both_viewing_keys() {
        let proof = base_proof(ProofId::Send);
        let payload = vec![0u8; wire::VIEWING_KEY_SIZE * 2];
        let classified = classify(&proof, &payload).unwrap();
        match classified {
            ClassifiedProof::JoinSplit(js) => {
                assert_eq!(js.kind, JoinSplitKind::Send);
                assert_eq!(js.viewing_key_1.len(), wire::VIEWING_KEY_SIZE);
                assert_eq!(js.viewing_key_2.len(), wire::VIEWING_KEY_SIZE);
            }
            _ => panic!("expected join split"),
        }
    }

    #[test]
    fn truncated_payload_is_a_protocol_error_not_a_panic() {
        let proof = base_proof(ProofId::Deposit);
        assert!(classify(&proof, &[0u8; 4]).is_err());
    }
}
