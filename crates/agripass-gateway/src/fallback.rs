// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Local fallback used when the credential authority cannot be reached.
//
// Issuance attaches an unsigned proof block that is syntactically complete
// but recognisably not a signature: its type is `LocalFallbackSignature2024`
// and its JWS declares `alg: none`. Verification only checks that the token
// parses as a credential or a certificate badge and marks every trust check
// as skipped.

use agripass_codec::CompactToken;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use uuid::Uuid;

use crate::credential::{IssueResponse, Proof, VerifiableCredential, wire_timestamp};
use crate::verdict::{CheckOutcome, VerdictDetails, VerifyResponse};

pub const FALLBACK_PROOF_TYPE: &str = "LocalFallbackSignature2024";

/// 1x1 transparent PNG, used as the proof image of a fallback credential.
pub const PLACEHOLDER_PROOF_IMAGE: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

const UNSIGNED_JWS_HEADER: &str = r#"{"alg":"none","b64":false,"crit":["b64"]}"#;

/// Whether a proof block came from the local fallback.
pub fn is_fallback_proof(proof: &Proof) -> bool {
    proof.proof_type == FALLBACK_PROOF_TYPE
}

/// Attach an unsigned proof to `credential`.
pub fn issue_locally(credential: VerifiableCredential) -> IssueResponse {
    let header = URL_SAFE_NO_PAD.encode(UNSIGNED_JWS_HEADER);
    let proof = Proof {
        proof_type: FALLBACK_PROOF_TYPE.into(),
        created: wire_timestamp(&Utc::now()),
        verification_method: format!("{}#key-1", credential.issuer.id),
        jws: format!("{header}..unsigned-{}", Uuid::new_v4()),
    };
    IssueResponse {
        vc: VerifiableCredential {
            proof: Some(proof),
            ..credential
        },
        qr: PLACEHOLDER_PROOF_IMAGE.into(),
    }
}

/// Structural check of a scanned token. Never claims trust.
pub fn verify_locally(qr_content: &str) -> VerifyResponse {
    let recognised = agripass_codec::decode(qr_content)
        .ok()
        .map(|decoded| serde_json::Value::Object(decoded.record))
        .filter(|value| {
            serde_json::from_value::<VerifiableCredential>(value.clone()).is_ok()
                || serde_json::from_value::<CompactToken>(value.clone()).is_ok()
        });

    match recognised {
        Some(credential) => VerifyResponse {
            is_valid: true,
            message: "Structure valid; the credential authority was unavailable, so nothing was cryptographically checked".into(),
            details: Some(VerdictDetails {
                trusted_issuer: false,
                integrity_check: CheckOutcome::Skipped,
                expiration_check: CheckOutcome::Skipped,
                credential: Some(credential),
            }),
        },
        None => VerifyResponse {
            is_valid: false,
            message: "Invalid credential format".into(),
            details: Some(VerdictDetails {
                trusted_issuer: false,
                integrity_check: CheckOutcome::Fail,
                expiration_check: CheckOutcome::Fail,
                credential: None,
            }),
        },
    }
}
