// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CompactToken: the minimal certificate summary printed as an offline QR
// badge. Derived from a Certificate + Batch pair on demand, never stored.

use agripass_core::error::{AgripassError, Result};
use agripass_core::types::{Batch, Certificate, CertificateStatus};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compact;

/// Marker of the legacy pipe-delimited badge (`AGRI:` + base64).
pub const LEGACY_PREFIX: &str = "AGRI:";

pub const PRODUCT_MAX_CHARS: usize = 20;
pub const ISSUER_MAX_CHARS: usize = 15;
pub const HASH_PREFIX_CHARS: usize = 8;

/// Single-character certificate status carried in a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusFlag {
    #[serde(rename = "V")]
    Valid,
    #[serde(rename = "R")]
    Revoked,
    #[serde(rename = "E")]
    Expired,
}

impl StatusFlag {
    pub fn as_char(&self) -> char {
        match self {
            Self::Valid => 'V',
            Self::Revoked => 'R',
            Self::Expired => 'E',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'V' => Some(Self::Valid),
            'R' => Some(Self::Revoked),
            'E' => Some(Self::Expired),
            _ => None,
        }
    }
}

impl From<CertificateStatus> for StatusFlag {
    fn from(status: CertificateStatus) -> Self {
        match status {
            CertificateStatus::Valid => Self::Valid,
            CertificateStatus::Revoked => Self::Revoked,
            CertificateStatus::Expired => Self::Expired,
        }
    }
}

impl From<StatusFlag> for CertificateStatus {
    fn from(flag: StatusFlag) -> Self {
        match flag {
            StatusFlag::Valid => Self::Valid,
            StatusFlag::Revoked => Self::Revoked,
            StatusFlag::Expired => Self::Expired,
        }
    }
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactToken {
    /// Certificate id.
    pub id: String,
    /// Product type, truncated.
    pub prod: String,
    pub grade: String,
    pub stat: StatusFlag,
    /// Issuance date, `YYYY-MM-DD`.
    pub date: String,
    /// Expiry date, `YYYY-MM-DD`. Absent in legacy badges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<String>,
    /// Issuer name, truncated.
    pub iss: String,
    /// Leading hex characters of the integrity hash.
    pub h: String,
}

impl CompactToken {
    /// Project a certificate and its batch. `now` decides whether the status
    /// flag reads as expired.
    pub fn from_certificate(cert: &Certificate, batch: &Batch, now: DateTime<Utc>) -> Result<Self> {
        if cert.batch_id != batch.id {
            return Err(AgripassError::InvalidField {
                field: "batch_id",
                reason: format!(
                    "certificate {} belongs to batch {}, not {}",
                    cert.id, cert.batch_id, batch.id
                ),
            });
        }
        let inspection = batch
            .inspection
            .as_ref()
            .ok_or(AgripassError::MissingField("inspection"))?;
        if cert.hash.trim().is_empty() {
            return Err(AgripassError::MissingField("hash"));
        }

        Ok(Self {
            id: cert.id.to_string(),
            prod: truncate_chars(&batch.product_type, PRODUCT_MAX_CHARS),
            grade: inspection.grade.as_str().to_owned(),
            stat: cert.effective_status(now).into(),
            date: cert.issued_at.format("%Y-%m-%d").to_string(),
            exp: Some(cert.expires_at.format("%Y-%m-%d").to_string()),
            iss: truncate_chars(&cert.issuer, ISSUER_MAX_CHARS),
            h: truncate_chars(cert.hash.trim(), HASH_PREFIX_CHARS),
        })
    }

    /// Render as a compact (`AGQ1:`) token.
    pub fn to_token(&self) -> Result<String> {
        compact::encode(self)
    }

    /// Read a scanned badge: compact token, plain JSON, or legacy `AGRI:`.
    pub fn from_token(input: &str) -> Result<Self> {
        let raw = input.trim();
        if let Some(legacy) = raw.strip_prefix(LEGACY_PREFIX) {
            return Self::from_legacy(legacy);
        }
        let decoded = compact::decode(raw)?;
        serde_json::from_value(serde_json::Value::Object(decoded.record))
            .map_err(|e| AgripassError::Decode(format!("not a certificate badge: {e}")))
    }

    /// Parse the body of a legacy badge:
    /// base64(`id|product|grade|V/R|issuedAt|issuer|hash8`).
    fn from_legacy(body: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(body.trim())
            .map_err(|e| AgripassError::Decode(format!("legacy badge: {e}")))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| AgripassError::Decode(format!("legacy badge: {e}")))?;

        let parts: Vec<&str> = text.split('|').collect();
        let [id, prod, grade, stat, issued_at, iss, h] = parts.as_slice() else {
            return Err(AgripassError::Decode(format!(
                "legacy badge: expected 7 fields, found {}",
                parts.len()
            )));
        };
        let stat = stat
            .chars()
            .next()
            .and_then(StatusFlag::from_char)
            .ok_or_else(|| AgripassError::Decode(format!("legacy badge: bad status {stat:?}")))?;
        let date = issued_at.split('T').next().unwrap_or_default().to_owned();
        if id.is_empty() || date.is_empty() {
            return Err(AgripassError::Decode(
                "legacy badge: missing id or date".into(),
            ));
        }

        debug!(certificate_id = %id, "legacy badge decoded");
        Ok(Self {
            id: (*id).to_owned(),
            prod: (*prod).to_owned(),
            grade: (*grade).to_owned(),
            stat,
            date,
            exp: None,
            iss: (*iss).to_owned(),
            h: (*h).to_owned(),
        })
    }

    /// Whether the carried hash prefix agrees with a full stored hash.
    pub fn hash_matches(&self, full_hash: &str) -> bool {
        !self.h.is_empty()
            && full_hash
                .get(..self.h.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(&self.h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agripass_core::types::{
        Authority, BatchId, CertificateId, Exporter, HeavyMetalOutcome, InspectionResult,
        NewBatch, PesticideLevel, QualityGrade,
    };
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap()
    }

    fn batch() -> Batch {
        let mut batch = Batch::submit(NewBatch {
            exporter: Exporter {
                name: "Punjab Grains Co-op".into(),
                id: None,
                contact: None,
            },
            product_type: "Basmati Rice (Extra Long Grain, Aged)".into(),
            quantity: "18 t".into(),
            origin: "Amritsar, IN".into(),
            destination: "Rotterdam, NL".into(),
            notes: None,
            documents: vec![],
        });
        batch.id = BatchId::from("BATCH-1");
        batch.inspection = Some(InspectionResult {
            grade: QualityGrade::A,
            moisture_percent: 12.5,
            pesticide_level: PesticideLevel::Safe,
            heavy_metal: HeavyMetalOutcome::Pass,
            iso_code: "ISO 22000".into(),
            inspector_id: "qa-7".into(),
            inspector_name: None,
            inspected_at: at(2024, 5, 30),
            sample_id: None,
            foreign_matter_percent: None,
            notes: None,
        });
        batch
    }

    fn cert() -> Certificate {
        Certificate {
            id: CertificateId::from("CERT-001"),
            batch_id: BatchId::from("BATCH-1"),
            issued_at: at(2024, 6, 1),
            expires_at: at(2025, 6, 1),
            status: CertificateStatus::Valid,
            credential: serde_json::Value::Null,
            proof_image: None,
            authority: Authority::Remote,
            hash: "84a50b9ca56e7a27977b283e9aad8f5a51a79632ee94800a774db5c5c65ae2c0".into(),
            issuer: "National Agricultural Quality Agency".into(),
            faults: Vec::new(),
        }
    }

    #[test]
    fn projection_truncates_and_flags() {
        let token = CompactToken::from_certificate(&cert(), &batch(), at(2024, 7, 1)).unwrap();
        assert_eq!(token.id, "CERT-001");
        assert_eq!(token.prod, "Basmati Rice (Extra ");
        assert_eq!(token.prod.chars().count(), PRODUCT_MAX_CHARS);
        assert_eq!(token.grade, "A");
        assert_eq!(token.stat, StatusFlag::Valid);
        assert_eq!(token.date, "2024-06-01");
        assert_eq!(token.exp.as_deref(), Some("2025-06-01"));
        assert_eq!(token.iss, "National Agricu");
        assert_eq!(token.h, "84a50b9c");
    }

    #[test]
    fn expired_certificate_projects_as_expired() {
        let token = CompactToken::from_certificate(&cert(), &batch(), at(2026, 1, 1)).unwrap();
        assert_eq!(token.stat, StatusFlag::Expired);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("Café crème brûlée", 4), "Café");
        assert_eq!(truncate_chars("茶葉", 20), "茶葉");
    }

    #[test]
    fn token_round_trip() {
        let token = CompactToken::from_certificate(&cert(), &batch(), at(2024, 7, 1)).unwrap();
        let text = token.to_token().unwrap();
        assert!(text.starts_with(compact::TOKEN_PREFIX));
        assert_eq!(CompactToken::from_token(&text).unwrap(), token);
    }

    #[test]
    fn status_is_a_single_letter_on_the_wire() {
        let token = CompactToken::from_certificate(&cert(), &batch(), at(2024, 7, 1)).unwrap();
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["stat"], "V");
    }

    #[test]
    fn mismatched_batch_is_refused() {
        let mut other = batch();
        other.id = BatchId::from("BATCH-2");
        assert!(CompactToken::from_certificate(&cert(), &other, at(2024, 7, 1)).is_err());
    }

    #[test]
    fn uninspected_batch_cannot_be_projected() {
        let mut b = batch();
        b.inspection = None;
        let err = CompactToken::from_certificate(&cert(), &b, at(2024, 7, 1)).unwrap_err();
        assert!(matches!(err, AgripassError::MissingField("inspection")));
    }

    #[test]
    fn legacy_badge_is_read() {
        let body = STANDARD.encode(
            "CERT-9F2C11AB|Basmati Rice|A+|R|2024-06-01T09:30:00.000Z|National Agricu|84a50b9c",
        );
        let token = CompactToken::from_token(&format!("{LEGACY_PREFIX}{body}")).unwrap();
        assert_eq!(token.id, "CERT-9F2C11AB");
        assert_eq!(token.grade, "A+");
        assert_eq!(token.stat, StatusFlag::Revoked);
        assert_eq!(token.date, "2024-06-01");
        assert_eq!(token.exp, None);
        assert!(token.hash_matches(&cert().hash));
    }

    #[test]
    fn short_legacy_badge_is_refused() {
        let body = STANDARD.encode("CERT-1|Rice|A");
        assert!(CompactToken::from_token(&format!("{LEGACY_PREFIX}{body}")).is_err());
    }

    #[test]
    fn hash_prefix_comparison() {
        let token = CompactToken::from_certificate(&cert(), &batch(), at(2024, 7, 1)).unwrap();
        assert!(token.hash_matches(&cert().hash));
        assert!(!token.hash_matches("0000000000"));
        assert!(!token.hash_matches("84a5"));
    }

    #[test]
    fn json_record_without_required_keys_is_not_a_badge() {
        assert!(CompactToken::from_token(r#"{"id":"CERT-001"}"#).is_err());
    }
}
