// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Verification verdicts, as spoken by the verify endpoint and as handed to
// callers (tagged with the authority that produced them).

use agripass_core::types::Authority;
use serde::{Deserialize, Serialize};

/// Result of one sub-check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckOutcome {
    Pass,
    Fail,
    /// Not performed (local fallback).
    Skipped,
    /// The authority reported something else, or nothing.
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VerdictDetails {
    pub trusted_issuer: bool,
    pub integrity_check: CheckOutcome,
    pub expiration_check: CheckOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<serde_json::Value>,
}

/// Body returned by the verify endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<VerdictDetails>,
}

/// A verification verdict plus who produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub valid: bool,
    pub message: String,
    pub details: VerdictDetails,
    pub authority: Authority,
}

impl Verdict {
    pub fn from_response(response: VerifyResponse, authority: Authority) -> Self {
        Self {
            valid: response.is_valid,
            message: response.message,
            details: response.details.unwrap_or_default(),
            authority,
        }
    }

    /// Valid, confirmed by the remote authority, from a trusted issuer.
    pub fn is_trusted(&self) -> bool {
        self.valid && self.authority.is_authoritative() && self.details.trusted_issuer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_verdict_parses() {
        let raw = r#"{
            "isValid": true,
            "message": "Credential verified",
            "details": {
                "trustedIssuer": true,
                "integrityCheck": "PASS",
                "expirationCheck": "PASS"
            }
        }"#;
        let response: VerifyResponse = serde_json::from_str(raw).unwrap();
        let verdict = Verdict::from_response(response, Authority::Remote);
        assert!(verdict.is_trusted());
        assert_eq!(verdict.details.integrity_check, CheckOutcome::Pass);
    }

    #[test]
    fn unfamiliar_check_values_read_as_unknown() {
        let raw = r#"{"isValid": false, "details": {"integrityCheck": "PARTIAL"}}"#;
        let response: VerifyResponse = serde_json::from_str(raw).unwrap();
        let details = response.details.unwrap();
        assert_eq!(details.integrity_check, CheckOutcome::Unknown);
        assert_eq!(details.expiration_check, CheckOutcome::Unknown);
        assert!(!details.trusted_issuer);
    }

    #[test]
    fn fallback_is_never_trusted() {
        let verdict = Verdict {
            valid: true,
            message: String::new(),
            details: VerdictDetails {
                trusted_issuer: true,
                ..VerdictDetails::default()
            },
            authority: Authority::LocalFallback,
        };
        assert!(!verdict.is_trusted());
    }
}
