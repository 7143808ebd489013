// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Read-side views: what a certificate or batch looks like to the person
// holding it right now. Everything here is recomputed per read and never
// written back.

use agripass_codec::CompactToken;
use agripass_core::human_errors::trust_notice;
use agripass_core::lifecycle::BatchPhase;
use agripass_core::types::{Batch, Certificate, CertificateStatus};
use agripass_gateway::Verdict;
use agripass_security::IntegrityCheck;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Status shown to a reader. `Tampered` overrides everything else for the
/// read in which the seal mismatch was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresentedStatus {
    Valid,
    Revoked,
    Expired,
    Tampered,
}

impl PresentedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Revoked => "REVOKED",
            Self::Expired => "EXPIRED",
            Self::Tampered => "TAMPERED",
        }
    }
}

impl std::fmt::Display for PresentedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificateReport {
    pub certificate: Certificate,
    pub presented: PresentedStatus,
    pub effective_status: CertificateStatus,
    pub integrity: IntegrityCheck,
    /// Set when the credential was issued without the remote authority.
    pub trust_notice: Option<&'static str>,
}

impl CertificateReport {
    pub fn evaluate(certificate: Certificate, now: DateTime<Utc>) -> Self {
        let integrity = agripass_security::check_seal(&certificate);
        let effective_status = certificate.effective_status(now);
        let presented = if integrity.is_tampered() {
            PresentedStatus::Tampered
        } else {
            match effective_status {
                CertificateStatus::Valid => PresentedStatus::Valid,
                CertificateStatus::Revoked => PresentedStatus::Revoked,
                CertificateStatus::Expired => PresentedStatus::Expired,
            }
        };
        Self {
            trust_notice: trust_notice(certificate.authority),
            certificate,
            presented,
            effective_status,
            integrity,
        }
    }

    pub fn is_tampered(&self) -> bool {
        self.presented == PresentedStatus::Tampered
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchView {
    pub batch: Batch,
    pub phase: BatchPhase,
    pub certificates: Vec<CertificateReport>,
}

/// How a scanned badge compares with the local record of the same
/// certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordMatch {
    /// No local record for the certificate id in the badge.
    Unknown,
    /// Hash prefix and status flag agree with the local record.
    Consistent,
    /// The badge carries a different hash prefix than the local record.
    HashDiffers,
    /// Same hash, but the local record's status has moved on (for example
    /// revoked after the badge was printed).
    StatusDiffers,
}

impl RecordMatch {
    pub fn compare(badge: &CompactToken, report: &CertificateReport) -> Self {
        let cert = &report.certificate;
        let printed = CertificateStatus::from(badge.stat);
        if badge.hash_matches(&cert.hash) {
            return if printed == report.effective_status {
                Self::Consistent
            } else {
                Self::StatusDiffers
            };
        }
        // The record is re-sealed on revoke/restore, so a badge printed
        // before that still matches the digest taken at its own status.
        match agripass_security::integrity::digest_fields(
            cert.id.as_str(),
            cert.batch_id.as_str(),
            printed,
            &cert.issued_at,
        ) {
            Ok(digest) if badge.hash_matches(&digest) => Self::StatusDiffers,
            _ => Self::HashDiffers,
        }
    }
}

/// Offline check of a scanned badge against the local records.
#[derive(Debug, Clone, Serialize)]
pub struct OfflineCheck {
    pub badge: CompactToken,
    pub record: RecordMatch,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<CertificateReport>,
}

impl OfflineCheck {
    /// The badge matches an untampered, currently valid local record.
    pub fn is_valid(&self) -> bool {
        self.record == RecordMatch::Consistent
            && self
                .report
                .as_ref()
                .is_some_and(|r| r.presented == PresentedStatus::Valid)
    }
}

/// Online verification of a scanned token.
#[derive(Debug, Clone, Serialize)]
pub struct TokenVerification {
    pub verdict: Verdict,
    /// Present when the token is a certificate badge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline: Option<OfflineCheck>,
    /// Phase of the certified batch, `verified` when the verdict is trusted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<BatchPhase>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use agripass_codec::StatusFlag;
    use agripass_core::types::{Authority, BatchId, CertificateId};
    use chrono::{Duration, TimeZone};

    fn issued() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn sealed(authority: Authority) -> Certificate {
        let mut cert = Certificate {
            id: CertificateId::from("CERT-001"),
            batch_id: BatchId::from("BATCH-1"),
            issued_at: issued(),
            expires_at: issued() + Duration::days(365),
            status: CertificateStatus::Valid,
            credential: serde_json::Value::Null,
            proof_image: None,
            authority,
            hash: String::new(),
            issuer: "National Agricultural Quality Agency".into(),
            faults: Vec::new(),
        };
        cert.hash = agripass_security::seal(&cert).unwrap();
        cert
    }

    fn badge_for(cert: &Certificate, stat: StatusFlag) -> CompactToken {
        CompactToken {
            id: cert.id.to_string(),
            prod: "Basmati Rice".into(),
            grade: "A".into(),
            stat,
            date: "2024-06-01".into(),
            exp: None,
            iss: "National Agricu".into(),
            h: cert.hash[..8].to_owned(),
        }
    }

    #[test]
    fn intact_certificate_presents_its_status() {
        let report = CertificateReport::evaluate(sealed(Authority::Remote), issued());
        assert_eq!(report.presented, PresentedStatus::Valid);
        assert!(report.trust_notice.is_none());

        let later = issued() + Duration::days(400);
        let report = CertificateReport::evaluate(sealed(Authority::Remote), later);
        assert_eq!(report.presented, PresentedStatus::Expired);
    }

    #[test]
    fn tampering_overrides_status() {
        let mut cert = sealed(Authority::Remote);
        cert.status = CertificateStatus::Revoked;
        let report = CertificateReport::evaluate(cert, issued());
        assert_eq!(report.presented, PresentedStatus::Tampered);
        assert!(report.is_tampered());
    }

    #[test]
    fn unreadable_column_presents_as_tampered() {
        let mut cert = sealed(Authority::Remote);
        cert.faults.push(agripass_core::types::ColumnFault {
            column: "status".into(),
            stored: "FORGED".into(),
        });
        let report = CertificateReport::evaluate(cert, issued());
        assert_eq!(report.presented, PresentedStatus::Tampered);
    }

    #[test]
    fn fallback_certificate_carries_notice() {
        let report =
            CertificateReport::evaluate(sealed(Authority::LocalFallback), issued());
        assert!(report.trust_notice.is_some());
    }

    #[test]
    fn badge_comparison() {
        let report = CertificateReport::evaluate(sealed(Authority::Remote), issued());
        let cert = &report.certificate;

        assert_eq!(
            RecordMatch::compare(&badge_for(cert, StatusFlag::Valid), &report),
            RecordMatch::Consistent
        );
        assert_eq!(
            RecordMatch::compare(&badge_for(cert, StatusFlag::Revoked), &report),
            RecordMatch::StatusDiffers
        );

        let mut forged = badge_for(cert, StatusFlag::Valid);
        forged.h = "deadbeef".into();
        assert_eq!(RecordMatch::compare(&forged, &report), RecordMatch::HashDiffers);
    }

    #[test]
    fn badge_printed_before_revocation_reads_as_stale() {
        let mut cert = sealed(Authority::Remote);
        let printed = badge_for(&cert, StatusFlag::Valid);
        cert.revoke().unwrap();
        cert.hash = agripass_security::seal(&cert).unwrap();

        let report = CertificateReport::evaluate(cert, issued());
        assert_eq!(report.presented, PresentedStatus::Revoked);
        assert_eq!(RecordMatch::compare(&printed, &report), RecordMatch::StatusDiffers);
    }

    #[test]
    fn offline_check_needs_a_matching_valid_record() {
        let report = CertificateReport::evaluate(sealed(Authority::Remote), issued());
        let badge = badge_for(&report.certificate, StatusFlag::Valid);
        let check = OfflineCheck {
            record: RecordMatch::compare(&badge, &report),
            badge: badge.clone(),
            report: Some(report),
        };
        assert!(check.is_valid());

        let unknown = OfflineCheck {
            badge,
            record: RecordMatch::Unknown,
            report: None,
        };
        assert!(!unknown.is_valid());
    }
}
