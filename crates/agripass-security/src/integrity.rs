// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Certificate integrity: SHA-256 seal over the canonical identity fields
// for tamper detection.
//
// Canonical form:  <certificate id>|<batch id>|<STATUS>|<issued at, RFC 3339 ms Z>
//
// The seal is computed when a certificate is created (and when an authorized
// revoke/restore rewrites the status). Reads only ever recompute and compare;
// a divergence is reported, never repaired. Sealing refuses fields that
// cannot be canonicalised, while a read of such fields reports a mismatch.

use agripass_core::error::{AgripassError, Result};
use agripass_core::types::{Certificate, CertificateStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Separator between canonical fields. Field values may not contain it.
pub const FIELD_SEPARATOR: char = '|';

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Render an issuance timestamp the way it is hashed
/// (`2024-06-01T12:00:00.000Z`).
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn check_field(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AgripassError::MissingField(field));
    }
    if value.contains(FIELD_SEPARATOR) {
        return Err(AgripassError::InvalidField {
            field,
            reason: format!("must not contain `{FIELD_SEPARATOR}`"),
        });
    }
    Ok(())
}

/// Build the delimiter-joined canonical string for the four sealed fields.
///
/// Fails fast on an empty identifier or one containing the separator; no
/// defaults are imputed.
pub fn canonical_fields(
    certificate_id: &str,
    batch_id: &str,
    status: CertificateStatus,
    issued_at: &DateTime<Utc>,
) -> Result<String> {
    check_field("certificate_id", certificate_id)?;
    check_field("batch_id", batch_id)?;
    Ok(format!(
        "{certificate_id}{sep}{batch_id}{sep}{status}{sep}{ts}",
        sep = FIELD_SEPARATOR,
        status = status.as_str(),
        ts = canonical_timestamp(issued_at),
    ))
}

/// Digest of the four canonical fields.
pub fn digest_fields(
    certificate_id: &str,
    batch_id: &str,
    status: CertificateStatus,
    issued_at: &DateTime<Utc>,
) -> Result<String> {
    let canonical = canonical_fields(certificate_id, batch_id, status, issued_at)?;
    Ok(hash_bytes(canonical.as_bytes()))
}

/// Compute the seal for a certificate's current field values.
pub fn seal(cert: &Certificate) -> Result<String> {
    digest_fields(
        cert.id.as_str(),
        cert.batch_id.as_str(),
        cert.status,
        &cert.issued_at,
    )
}

/// Outcome of comparing a stored seal against a fresh recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IntegrityCheck {
    /// Stored and recomputed hashes agree.
    Intact { hash: String },
    /// The record changed after it was sealed.
    Mismatch { stored: String, computed: String },
    /// No stored hash to compare against (record predates sealing).
    Unsealed { computed: String },
}

impl IntegrityCheck {
    pub fn is_tampered(&self) -> bool {
        matches!(self, Self::Mismatch { .. })
    }

    pub fn computed(&self) -> &str {
        match self {
            Self::Intact { hash } => hash,
            Self::Mismatch { computed, .. } | Self::Unsealed { computed } => computed,
        }
    }
}

/// The four sealed fields as they were read, joined without validation.
/// Faulted columns contribute their stored text.
fn stored_canonical(cert: &Certificate) -> String {
    let status = cert.fault("status").unwrap_or(cert.status.as_str());
    let issued_at = match cert.fault("issued_at") {
        Some(text) => text.to_owned(),
        None => canonical_timestamp(&cert.issued_at),
    };
    format!(
        "{id}{sep}{batch}{sep}{status}{sep}{issued_at}",
        id = cert.id,
        batch = cert.batch_id,
        sep = FIELD_SEPARATOR,
    )
}

/// Recompute the seal from the certificate's current fields and compare it
/// with the stored hash.
///
/// Never fails: fields that cannot be canonicalised, or columns the store
/// could not read, are reported as a `Mismatch` even when no hash is stored.
pub fn check_seal(cert: &Certificate) -> IntegrityCheck {
    let canonical = match canonical_fields(
        cert.id.as_str(),
        cert.batch_id.as_str(),
        cert.status,
        &cert.issued_at,
    ) {
        Ok(canonical) if cert.faults.is_empty() => Some(canonical),
        _ => None,
    };
    let stored = cert.hash.trim();

    let Some(canonical) = canonical else {
        return IntegrityCheck::Mismatch {
            stored: stored.to_owned(),
            computed: hash_bytes(stored_canonical(cert).as_bytes()),
        };
    };
    let computed = hash_bytes(canonical.as_bytes());
    if stored.is_empty() {
        IntegrityCheck::Unsealed { computed }
    } else if stored.eq_ignore_ascii_case(&computed) {
        IntegrityCheck::Intact { hash: computed }
    } else {
        IntegrityCheck::Mismatch {
            stored: stored.to_owned(),
            computed,
        }
    }
}

/// Like [`check_seal`], but a mismatch is returned as
/// `AgripassError::IntegrityMismatch`.
pub fn verify_seal(cert: &Certificate) -> Result<()> {
    match check_seal(cert) {
        IntegrityCheck::Mismatch { stored, computed } => Err(AgripassError::IntegrityMismatch {
            expected: stored,
            actual: computed,
        }),
        _ => Ok(()),
    }
}
