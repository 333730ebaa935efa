// =============================================================================
// Signed operator proposal envelope (§4.6.1)
// =============================================================================
//
// Every operator command that changes runtime behaviour — a parameter
// update, a model promotion, or an emergency action — arrives as an Ed25519-
// signed envelope rather than a bare API call. Verification is over the
// canonical JSON encoding of `(payload, metadata)`: serde_json's struct-
// declaration-order field output, no key sorting (§6 resolved open
// question) — so the payload enum's variant order and field order are part
// of the wire contract and must not be reordered casually.
// =============================================================================

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmergencyAction {
    HaltTrading,
    CancelAll,
    ReduceOnly,
    DisableVenue { venue: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalPayload {
    ParamUpdate { patch: serde_json::Value },
    ModelPromotion { model_id: String, version: String },
    EmergencyAction { action: EmergencyAction },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalMetadata {
    pub proposal_id: String,
    pub operator: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedProposal {
    pub payload: ProposalPayload,
    pub metadata: ProposalMetadata,
    /// Hex-encoded Ed25519 signature over the canonical JSON of
    /// `(payload, metadata)`.
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Valid,
    InvalidSignature,
    Malformed,
}

/// Verify a proposal's signature against the operator's known public key.
/// Returns `Valid` only when the signature matches exactly; any parse or
/// signature failure is `InvalidSignature`/`Malformed`, never a panic — a
/// malformed signed envelope is adversarial input by definition.
pub fn verify_proposal(proposal: &SignedProposal, verifying_key: &VerifyingKey) -> VerifyOutcome {
    let canonical = match canonical_bytes(proposal) {
        Ok(bytes) => bytes,
        Err(_) => return VerifyOutcome::Malformed,
    };

    let sig_bytes = match hex::decode(&proposal.signature) {
        Ok(b) => b,
        Err(_) => return VerifyOutcome::InvalidSignature,
    };
    let sig_array: [u8; 64] = match sig_bytes.try_into() {
        Ok(a) => a,
        Err(_) => return VerifyOutcome::InvalidSignature,
    };
    let signature = Signature::from_bytes(&sig_array);

    match verifying_key.verify(&canonical, &signature) {
        Ok(()) => VerifyOutcome::Valid,
        Err(_) => VerifyOutcome::InvalidSignature,
    }
}

/// Sign a `(payload, metadata)` pair — used by the operator tooling that
/// produces proposals, and by tests.
pub fn sign_proposal(
    payload: ProposalPayload,
    metadata: ProposalMetadata,
    signing_key: &ed25519_dalek::SigningKey,
) -> anyhow::Result<SignedProposal> {
    use ed25519_dalek::Signer;

    let unsigned = SignedProposal {
        payload,
        metadata,
        signature: String::new(),
    };
    let canonical = canonical_bytes(&unsigned)?;
    let signature = signing_key.sign(&canonical);

    Ok(SignedProposal {
        signature: hex::encode(signature.to_bytes()),
        ..unsigned
    })
}

fn canonical_bytes(proposal: &SignedProposal) -> anyhow::Result<Vec<u8>> {
    #[derive(Serialize)]
    struct Canonical<'a> {
        payload: &'a ProposalPayload,
        metadata: &'a ProposalMetadata,
    }
    Ok(serde_json::to_vec(&Canonical {
        payload: &proposal.payload,
        metadata: &proposal.metadata,
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    fn test_keypair() -> (SigningKey, VerifyingKey) {
        let mut rng = rand::rngs::OsRng;
        let signing_key = SigningKey::generate(&mut rng);
        let verifying_key = signing_key.verifying_key();
        (signing_key, verifying_key)
    }

    #[test]
    fn round_trips_a_valid_signature() {
        let (signing_key, verifying_key) = test_keypair();
        let proposal = sign_proposal(
            ProposalPayload::EmergencyAction { action: EmergencyAction::HaltTrading },
            ProposalMetadata {
                proposal_id: "p1".to_string(),
                operator: "ops".to_string(),
                issued_at: Utc::now(),
            },
            &signing_key,
        )
        .unwrap();

        assert_eq!(verify_proposal(&proposal, &verifying_key), VerifyOutcome::Valid);
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let (signing_key, verifying_key) = test_keypair();
        let mut proposal = sign_proposal(
            ProposalPayload::ParamUpdate { patch: serde_json::json!({"armed": true}) },
            ProposalMetadata {
                proposal_id: "p2".to_string(),
                operator: "ops".to_string(),
                issued_at: Utc::now(),
            },
            &signing_key,
        )
        .unwrap();

        proposal.payload = ProposalPayload::ParamUpdate { patch: serde_json::json!({"armed": false}) };

        assert_eq!(verify_proposal(&proposal, &verifying_key), VerifyOutcome::InvalidSignature);
    }

    #[test]
    fn rejects_a_malformed_signature_without_panicking() {
        let (signing_key, verifying_key) = test_keypair();
        let mut proposal = sign_proposal(
            ProposalPayload::EmergencyAction { action: EmergencyAction::CancelAll },
            ProposalMetadata {
                proposal_id: "p3".to_string(),
                operator: "ops".to_string(),
                issued_at: Utc::now(),
            },
            &signing_key,
        )
        .unwrap();
        proposal.signature = "not-hex".to_string();

        assert_eq!(verify_proposal(&proposal, &verifying_key), VerifyOutcome::InvalidSignature);
    }
}
