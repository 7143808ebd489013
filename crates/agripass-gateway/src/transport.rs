// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transports to the remote credential authority.
//
//   POST {certify_url}/v1/certify   credential JSON      -> {vc, qr}
//   POST {verify_url}               {"qrContent": "..."} -> verdict JSON
//   GET  {certify_url}/health                            -> 2xx when up
//
// Transports report failures as `GatewayUnavailable`; deciding what to do
// about them is the gateway's job.

use std::time::Duration;

use agripass_core::config::AuthorityConfig;
use agripass_core::error::{AgripassError, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::credential::{IssueResponse, VerifiableCredential};
use crate::verdict::VerifyResponse;

#[async_trait]
pub trait CredentialTransport: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    async fn issue(&self, credential: &VerifiableCredential) -> Result<IssueResponse>;

    async fn verify(&self, qr_content: &str) -> Result<VerifyResponse>;

    async fn health(&self) -> Result<bool>;
}

fn unavailable(detail: impl Into<String>) -> AgripassError {
    AgripassError::GatewayUnavailable(detail.into())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    qr_content: &'a str,
}

/// JSON-over-HTTP transport.
pub struct HttpTransport {
    client: reqwest::Client,
    certify_url: String,
    verify_url: String,
}

impl HttpTransport {
    pub fn new(config: &AuthorityConfig) -> Result<Self> {
        for (field, url) in [("certify_url", &config.certify_url), ("verify_url", &config.verify_url)] {
            reqwest::Url::parse(url)
                .map_err(|e| AgripassError::Config(format!("{field} `{url}`: {e}")))?;
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| AgripassError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            certify_url: config.certify_url.trim_end_matches('/').to_owned(),
            verify_url: config.verify_url.clone(),
        })
    }

    fn certify_endpoint(&self) -> String {
        format!("{}/v1/certify", self.certify_url)
    }

    fn health_endpoint(&self) -> String {
        format!("{}/health", self.certify_url)
    }

    async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| unavailable(format!("POST {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(unavailable(format!("POST {url} returned {status}: {text}")));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| unavailable(format!("POST {url}: malformed response: {e}")))
    }
}

#[async_trait]
impl CredentialTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    #[instrument(skip_all, fields(credential_id = %credential.id))]
    async fn issue(&self, credential: &VerifiableCredential) -> Result<IssueResponse> {
        let url = self.certify_endpoint();
        debug!(%url, "requesting credential issuance");
        self.post_json(&url, credential).await
    }

    #[instrument(skip_all, fields(len = qr_content.len()))]
    async fn verify(&self, qr_content: &str) -> Result<VerifyResponse> {
        debug!(url = %self.verify_url, "requesting credential verification");
        self.post_json(&self.verify_url, &VerifyRequest { qr_content })
            .await
    }

    async fn health(&self) -> Result<bool> {
        let url = self.health_endpoint();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(format!("GET {url}: {e}")))?;
        Ok(response.status().is_success())
    }
}

/// Transport for machines with no route to the authority. Every call fails,
/// so the gateway always takes its local fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTransport;

#[async_trait]
impl CredentialTransport for OfflineTransport {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn issue(&self, _credential: &VerifiableCredential) -> Result<IssueResponse> {
        Err(unavailable("offline mode"))
    }

    async fn verify(&self, _qr_content: &str) -> Result<VerifyResponse> {
        Err(unavailable("offline mode"))
    }

    async fn health(&self) -> Result<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_joined_without_double_slash() {
        let cfg = AuthorityConfig {
            certify_url: "http://inji.local:8090/".into(),
            ..AuthorityConfig::default()
        };
        let transport = HttpTransport::new(&cfg).unwrap();
        assert_eq!(transport.certify_endpoint(), "http://inji.local:8090/v1/certify");
        assert_eq!(transport.health_endpoint(), "http://inji.local:8090/health");
    }

    #[test]
    fn malformed_url_is_a_config_error() {
        let cfg = AuthorityConfig {
            verify_url: "not a url".into(),
            ..AuthorityConfig::default()
        };
        assert!(matches!(
            HttpTransport::new(&cfg),
            Err(AgripassError::Config(_))
        ));
    }

    #[test]
    fn verify_request_uses_camel_case() {
        let body = serde_json::to_value(VerifyRequest { qr_content: "AGQ1:XYZ" }).unwrap();
        assert_eq!(body, serde_json::json!({"qrContent": "AGQ1:XYZ"}));
    }

    #[tokio::test]
    async fn offline_transport_always_fails() {
        let transport = OfflineTransport;
        assert!(matches!(
            transport.verify("AGQ1:XYZ").await,
            Err(AgripassError::GatewayUnavailable(_))
        ));
        assert!(!transport.health().await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_authority_is_unavailable() {
        // Port 9 (discard) is closed on any sane test host.
        let cfg = AuthorityConfig {
            certify_url: "http://127.0.0.1:9".into(),
            verify_url: "http://127.0.0.1:9/verify".into(),
            timeout_secs: 2,
            probe_before_call: false,
        };
        let transport = HttpTransport::new(&cfg).unwrap();
        assert!(matches!(
            transport.verify("AGQ1:XYZ").await,
            Err(AgripassError::GatewayUnavailable(_))
        ));
        assert!(transport.health().await.is_err());
    }
}
