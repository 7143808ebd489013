// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// W3C Verifiable Credential envelope and the Digital Product Passport payload
// sent to the credential authority for signing.

use agripass_core::config::AppConfig;
use agripass_core::error::{AgripassError, Result};
use agripass_core::types::Batch;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
pub const TRACEABILITY_CONTEXT: &str = "https://w3id.org/traceability/v1";

pub const PASSPORT_TYPES: [&str; 3] = [
    "VerifiableCredential",
    "DigitalProductPassport",
    "AgriculturalProductCredential",
];

/// ISO standard recorded when the inspection names none.
pub const DEFAULT_ISO_STANDARD: &str = "ISO 22000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    pub id: String,
    pub name: String,
}

/// Signature block attached by the authority (or by the local fallback).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: String,
    pub verification_method: String,
    pub jws: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub id: String,
    pub issuer: Issuer,
    pub issuance_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    pub credential_subject: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

/// Successful answer of the issuing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueResponse {
    pub vc: VerifiableCredential,
    /// Proof image as a `data:image/png;base64,...` URI.
    pub qr: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PassportExporter<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    contact: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PassportProduct<'a> {
    name: &'a str,
    origin: &'a str,
    quantity: &'a str,
    grade: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct QualityAssurance<'a> {
    grade: &'a str,
    moisture_content: String,
    pesticide_level: &'a str,
    heavy_metal_test: &'a str,
    iso_standard: &'a str,
    inspected_at: String,
    inspector_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    inspector_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    foreign_matter_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PassportSubject<'a> {
    id: String,
    #[serde(rename = "type")]
    subject_type: &'static str,
    batch_id: &'a str,
    exporter: PassportExporter<'a>,
    product: PassportProduct<'a>,
    quality_assurance: QualityAssurance<'a>,
    destination: &'a str,
    attachments: &'a [String],
}

/// Lowercase a display name and join its words with `-`.
pub fn did_slug(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Issuer identity as written into credentials. The DID is derived from the
/// display name unless one is configured.
pub fn issuer_identity(config: &AppConfig) -> Issuer {
    let id = config
        .issuer_did
        .clone()
        .filter(|did| !did.trim().is_empty())
        .unwrap_or_else(|| format!("did:web:agriqcert.app:{}", did_slug(&config.issuer_name)));
    Issuer {
        id,
        name: config.issuer_name.clone(),
    }
}

/// Timestamp format used on the wire (`2024-06-01T12:00:00.000Z`).
pub fn wire_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build the unsigned Digital Product Passport for an inspected batch.
pub fn build_passport(
    batch: &Batch,
    issuer: &Issuer,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<VerifiableCredential> {
    let inspection = batch
        .inspection
        .as_ref()
        .ok_or(AgripassError::MissingField("inspection"))?;
    if batch.product_type.trim().is_empty() {
        return Err(AgripassError::MissingField("product_type"));
    }

    let iso_standard = match inspection.iso_code.trim() {
        "" => DEFAULT_ISO_STANDARD,
        code => code,
    };

    let subject = PassportSubject {
        id: format!("did:web:exporter.app:{}", did_slug(&batch.exporter.name)),
        subject_type: "AgriculturalProduct",
        batch_id: batch.id.as_str(),
        exporter: PassportExporter {
            name: &batch.exporter.name,
            id: batch.exporter.id.as_deref(),
            contact: batch.exporter.contact.as_deref(),
        },
        product: PassportProduct {
            name: &batch.product_type,
            origin: &batch.origin,
            quantity: &batch.quantity,
            grade: inspection.grade.as_str(),
        },
        quality_assurance: QualityAssurance {
            grade: inspection.grade.as_str(),
            moisture_content: format!("{}%", inspection.moisture_percent),
            pesticide_level: inspection.pesticide_level.as_str(),
            heavy_metal_test: inspection.heavy_metal.as_str(),
            iso_standard,
            inspected_at: wire_timestamp(&inspection.inspected_at),
            inspector_id: &inspection.inspector_id,
            inspector_name: inspection.inspector_name.as_deref(),
            sample_id: inspection.sample_id.as_deref(),
            foreign_matter_content: inspection.foreign_matter_percent.map(|p| format!("{p}%")),
            notes: inspection.notes.as_deref(),
        },
        destination: &batch.destination,
        attachments: &batch.documents,
    };

    Ok(VerifiableCredential {
        context: vec![CREDENTIALS_CONTEXT.into(), TRACEABILITY_CONTEXT.into()],
        types: PASSPORT_TYPES.iter().map(|t| (*t).to_owned()).collect(),
        id: format!("urn:uuid:{}", batch.id),
        issuer: issuer.clone(),
        issuance_date: wire_timestamp(&issued_at),
        expiration_date: Some(wire_timestamp(&expires_at)),
        credential_subject: serde_json::to_value(subject)?,
        proof: None,
    })
}
