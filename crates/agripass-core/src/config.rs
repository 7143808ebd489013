// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use serde::{Deserialize, Serialize};

/// Where the remote credential authority lives and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Base URL of the issuing service (`/v1/certify`, `/health`).
    pub certify_url: String,
    /// Full URL of the verification endpoint.
    pub verify_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Probe `/health` before each call and go straight to the local
    /// fallback when the probe fails.
    pub probe_before_call: bool,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            certify_url: "http://localhost:8080".into(),
            verify_url: "https://verify.inji.io/verify".into(),
            timeout_secs: 15,
            probe_before_call: false,
        }
    }
}

/// Persistent application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub authority: AuthorityConfig,
    /// Issuer display name written into credentials and certificates.
    pub issuer_name: String,
    /// Issuer DID; derived from the issuer name when absent.
    pub issuer_did: Option<String>,
    /// Validity period for newly issued certificates.
    pub default_validity_days: u32,
    /// Enable audit trail logging.
    pub audit_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            authority: AuthorityConfig::default(),
            issuer_name: "National Agricultural Quality Agency".into(),
            issuer_did: None,
            default_validity_days: 365,
            audit_enabled: true,
        }
    }
}
