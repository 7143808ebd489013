// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CredentialGateway: remote-first issuance and verification with a single,
// synchronous fallback decision per call. Calls are never retried and never
// fail; a degraded result is tagged `Authority::LocalFallback`.

use std::sync::Arc;

use agripass_core::config::AuthorityConfig;
use agripass_core::types::Authority;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::credential::VerifiableCredential;
use crate::fallback;
use crate::transport::CredentialTransport;
use crate::verdict::Verdict;

/// A credential as issued, with its proof image and who signed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuanceOutcome {
    pub credential: VerifiableCredential,
    pub proof_image: String,
    pub authority: Authority,
}

#[derive(Clone)]
pub struct CredentialGateway {
    transport: Arc<dyn CredentialTransport>,
    probe_before_call: bool,
}

impl CredentialGateway {
    pub fn new(transport: Arc<dyn CredentialTransport>) -> Self {
        Self {
            transport,
            probe_before_call: false,
        }
    }

    pub fn from_config(transport: Arc<dyn CredentialTransport>, config: &AuthorityConfig) -> Self {
        Self::new(transport).with_probe(config.probe_before_call)
    }

    /// Probe health before each call and skip straight to the fallback when
    /// the probe fails.
    pub fn with_probe(mut self, probe_before_call: bool) -> Self {
        self.probe_before_call = probe_before_call;
        self
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// `false` only when the optional pre-call probe ran and failed.
    async fn probe_allows_remote(&self) -> bool {
        if !self.probe_before_call {
            return true;
        }
        let healthy = self.check_health().await;
        if !healthy {
            warn!(transport = self.transport.name(), "health probe failed, skipping remote call");
        }
        healthy
    }

    /// Issue a credential through the authority, or locally if it is down.
    #[instrument(skip_all, fields(credential_id = %credential.id, transport = self.transport.name()))]
    pub async fn issue_credential(&self, credential: VerifiableCredential) -> IssuanceOutcome {
        if self.probe_allows_remote().await {
            match self.transport.issue(&credential).await {
                Ok(response) => {
                    info!(authority = %Authority::Remote, "credential issued");
                    return IssuanceOutcome {
                        credential: response.vc,
                        proof_image: response.qr,
                        authority: Authority::Remote,
                    };
                }
                Err(e) => {
                    warn!(error = %e, "credential authority unavailable, issuing locally");
                }
            }
        }

        let response = fallback::issue_locally(credential);
        info!(authority = %Authority::LocalFallback, "credential issued");
        IssuanceOutcome {
            credential: response.vc,
            proof_image: response.qr,
            authority: Authority::LocalFallback,
        }
    }

    /// Verify a scanned token or credential JSON.
    #[instrument(skip_all, fields(len = qr_content.len(), transport = self.transport.name()))]
    pub async fn verify_credential(&self, qr_content: &str) -> Verdict {
        if self.probe_allows_remote().await {
            match self.transport.verify(qr_content).await {
                Ok(response) => {
                    let verdict = Verdict::from_response(response, Authority::Remote);
                    info!(valid = verdict.valid, authority = %verdict.authority, "credential verified");
                    return verdict;
                }
                Err(e) => {
                    warn!(error = %e, "credential authority unavailable, verifying locally");
                }
            }
        }

        let verdict = Verdict::from_response(
            fallback::verify_locally(qr_content),
            Authority::LocalFallback,
        );
        info!(valid = verdict.valid, authority = %verdict.authority, "credential verified");
        verdict
    }

    /// Liveness of the remote authority. Transport errors read as `false`.
    pub async fn check_health(&self) -> bool {
        match self.transport.health().await {
            Ok(up) => {
                debug!(up, "authority health");
                up
            }
            Err(e) => {
                debug!(error = %e, "authority health probe failed");
                false
            }
        }
    }
}
