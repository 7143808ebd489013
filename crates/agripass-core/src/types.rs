// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for Agri-Pass certification.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AgripassError;

/// Unique identifier for an exporter-submitted batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub String);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BatchId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Unique identifier for an issued certificate, e.g. `CERT-9F2C41AB`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateId(pub String);

impl CertificateId {
    /// Generate a fresh `CERT-` identifier from eight uppercase hex characters
    /// of a random UUID.
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(format!("CERT-{}", simple[..8].to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CertificateId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Current time truncated to millisecond precision.
///
/// Issuance timestamps feed the integrity hash in RFC 3339 millisecond form,
/// so sub-millisecond digits must never exist on a stored certificate.
pub fn issuance_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

/// Role of a signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Exporter,
    QaAgency,
    Admin,
    Importer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exporter => "exporter",
            Self::QaAgency => "qa_agency",
            Self::Admin => "admin",
            Self::Importer => "importer",
        }
    }

    /// Whether this role may perform `action`.
    pub fn permits(&self, action: Action) -> bool {
        match action {
            Action::SubmitBatch => matches!(self, Self::Exporter | Self::Admin),
            Action::BeginInspection
            | Action::RecordInspection
            | Action::RejectBatch
            | Action::ReopenBatch
            | Action::IssueCertificate
            | Action::RevokeCertificate => matches!(self, Self::QaAgency | Self::Admin),
            Action::RestoreCertificate | Action::ManageUsers => matches!(self, Self::Admin),
        }
    }
}

impl FromStr for Role {
    type Err = AgripassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "exporter" => Ok(Self::Exporter),
            "qa_agency" | "qa" => Ok(Self::QaAgency),
            "admin" => Ok(Self::Admin),
            "importer" => Ok(Self::Importer),
            other => Err(AgripassError::InvalidField {
                field: "role",
                reason: format!("unknown role `{other}`"),
            }),
        }
    }
}

/// State-changing operations subject to authorization and audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    SubmitBatch,
    BeginInspection,
    RecordInspection,
    RejectBatch,
    ReopenBatch,
    IssueCertificate,
    RevokeCertificate,
    RestoreCertificate,
    ManageUsers,
}

impl Action {
    /// Verb phrase used in error messages and audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubmitBatch => "submit batch",
            Self::BeginInspection => "begin inspection",
            Self::RecordInspection => "record inspection",
            Self::RejectBatch => "reject batch",
            Self::ReopenBatch => "reopen batch",
            Self::IssueCertificate => "issue certificate",
            Self::RevokeCertificate => "revoke certificate",
            Self::RestoreCertificate => "restore certificate",
            Self::ManageUsers => "manage users",
        }
    }
}

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: Option<String>,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: None,
            role,
        }
    }

    /// Fail with `Unauthorized` unless this actor's role permits `action`.
    pub fn authorize(&self, action: Action) -> crate::Result<()> {
        if self.role.permits(action) {
            Ok(())
        } else {
            Err(AgripassError::Unauthorized {
                actor: format!("{} ({})", self.id, self.role.as_str()),
                action: action.as_str(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

/// Quality grade assigned by the QA agency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityGrade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "F")]
    F,
    /// The inspector rejected the batch outright.
    #[serde(rename = "Rejected")]
    Rejected,
}

impl QualityGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::APlus => "A+",
            Self::A => "A",
            Self::BPlus => "B+",
            Self::B => "B",
            Self::CPlus => "C+",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
            Self::Rejected => "Rejected",
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

impl fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityGrade {
    type Err = AgripassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A+" => Ok(Self::APlus),
            "A" => Ok(Self::A),
            "B+" => Ok(Self::BPlus),
            "B" => Ok(Self::B),
            "C+" => Ok(Self::CPlus),
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            "F" => Ok(Self::F),
            other if other.eq_ignore_ascii_case("rejected") || other.eq_ignore_ascii_case("reject") => {
                Ok(Self::Rejected)
            }
            other => Err(AgripassError::InvalidField {
                field: "grade",
                reason: format!("unknown grade `{other}`"),
            }),
        }
    }
}

/// Pesticide residue category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PesticideLevel {
    /// Within safe limits.
    Safe,
    /// At the warning limit.
    Warning,
    /// Exceeded safe limits.
    High,
}

impl PesticideLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "Safe",
            Self::Warning => "Warning",
            Self::High => "High",
        }
    }
}

impl FromStr for PesticideLevel {
    type Err = AgripassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(Self::Safe),
            "warning" => Ok(Self::Warning),
            "high" => Ok(Self::High),
            other => Err(AgripassError::InvalidField {
                field: "pesticide_level",
                reason: format!("unknown level `{other}`"),
            }),
        }
    }
}

/// Outcome of the heavy-metal test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeavyMetalOutcome {
    Pass,
    Fail,
}

impl HeavyMetalOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "Pass",
            Self::Fail => "Fail",
        }
    }
}

impl FromStr for HeavyMetalOutcome {
    type Err = AgripassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass" => Ok(Self::Pass),
            "fail" => Ok(Self::Fail),
            other => Err(AgripassError::InvalidField {
                field: "heavy_metal",
                reason: format!("unknown outcome `{other}`"),
            }),
        }
    }
}

/// Results of a QA inspection. Immutable once attached to a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionResult {
    pub grade: QualityGrade,
    /// Moisture content in percent.
    pub moisture_percent: f64,
    pub pesticide_level: PesticideLevel,
    pub heavy_metal: HeavyMetalOutcome,
    /// Standard the inspection was performed against, e.g. `ISO 22000`.
    pub iso_code: String,
    pub inspector_id: String,
    #[serde(default)]
    pub inspector_name: Option<String>,
    pub inspected_at: DateTime<Utc>,
    #[serde(default)]
    pub sample_id: Option<String>,
    #[serde(default)]
    pub foreign_matter_percent: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// Lifecycle states of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// Submitted by the exporter, waiting for a QA agency.
    Submitted,
    /// A QA agency has picked the batch up.
    InInspection,
    /// A certificate has been issued for the current cycle.
    Certified,
    /// Rejected; terminal for the current cycle.
    Rejected,
}

impl BatchStatus {
    pub const ALL: [BatchStatus; 4] = [
        Self::Submitted,
        Self::InInspection,
        Self::Certified,
        Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::InInspection => "IN_INSPECTION",
            Self::Certified => "CERTIFIED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = AgripassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "SUBMITTED" => Ok(Self::Submitted),
            // Older records used INSPECTED for the in-progress state.
            "IN_INSPECTION" | "INSPECTED" => Ok(Self::InInspection),
            "CERTIFIED" => Ok(Self::Certified),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(AgripassError::InvalidField {
                field: "status",
                reason: format!("unknown batch status `{other}`"),
            }),
        }
    }
}

/// Exporter reference carried on a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exporter {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
}

/// Fields an exporter supplies when submitting a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBatch {
    pub exporter: Exporter,
    pub product_type: String,
    pub quantity: String,
    /// Farm location / region of origin.
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// References to supporting documents (lab reports, photos).
    #[serde(default)]
    pub documents: Vec<String>,
}

/// An exporter-submitted shipment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub exporter: Exporter,
    pub product_type: String,
    pub quantity: String,
    pub origin: String,
    pub destination: String,
    pub notes: Option<String>,
    pub status: BatchStatus,
    pub submitted_at: DateTime<Utc>,
    pub inspection: Option<InspectionResult>,
    pub documents: Vec<String>,
}

impl Batch {
    /// Create a freshly submitted batch from exporter input.
    pub fn submit(input: NewBatch) -> Self {
        Self {
            id: BatchId::new(),
            exporter: input.exporter,
            product_type: input.product_type,
            quantity: input.quantity,
            origin: input.origin,
            destination: input.destination,
            notes: input.notes,
            status: BatchStatus::Submitted,
            submitted_at: Utc::now(),
            inspection: None,
            documents: input.documents,
        }
    }
}

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

/// Certificate status.
///
/// Only `Valid` and `Revoked` are ever written by the lifecycle; `Expired` is
/// derived at read time from the expiry timestamp (older stores may still
/// carry it literally).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    Valid,
    Revoked,
    Expired,
}

impl CertificateStatus {
    pub const ALL: [CertificateStatus; 3] = [Self::Valid, Self::Revoked, Self::Expired];

    /// Canonical spelling, used for persistence and hashing.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Revoked => "REVOKED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateStatus {
    type Err = AgripassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VALID" => Ok(Self::Valid),
            "REVOKED" => Ok(Self::Revoked),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(AgripassError::InvalidField {
                field: "status",
                reason: format!("unknown certificate status `{other}`"),
            }),
        }
    }
}

/// Who vouched for a credential or verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    /// Signed or verified by the remote credential authority.
    Remote,
    /// Produced locally while the authority was unreachable; carries no
    /// cryptographic trust.
    LocalFallback,
}

impl Authority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::LocalFallback => "local_fallback",
        }
    }

    pub fn is_authoritative(&self) -> bool {
        matches!(self, Self::Remote)
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issued certificate tied to exactly one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    pub batch_id: BatchId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: CertificateStatus,
    /// Signed credential as returned by the authority (opaque to this crate).
    pub credential: serde_json::Value,
    /// Renderable proof artefact supplied with the credential.
    #[serde(default)]
    pub proof_image: Option<String>,
    pub authority: Authority,
    /// SHA-256 seal over the canonical identity fields; empty if never sealed.
    #[serde(default)]
    pub hash: String,
    pub issuer: String,
    /// Columns a store could not read back as written. A certificate with
    /// any fault always reads as tampered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<ColumnFault>,
}

/// A stored column that did not hold a value this crate writes, such as an
/// unknown status or a timestamp outside the millisecond RFC 3339 form.
///
/// The typed field on the certificate then holds a placeholder; `stored`
/// keeps the text exactly as found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFault {
    pub column: String,
    pub stored: String,
}

impl Certificate {
    /// Stored text of `column` when it faulted on read.
    pub fn fault(&self, column: &str) -> Option<&str> {
        self.faults
            .iter()
            .find(|f| f.column == column)
            .map(|f| f.stored.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certificate_id_shape() {
        let id = CertificateId::generate();
        assert!(id.as_str().starts_with("CERT-"));
        assert_eq!(id.as_str().len(), 13);
        assert!(id.as_str()[5..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn grade_serde_uses_display_spelling() {
        let json = serde_json::to_string(&QualityGrade::APlus).unwrap();
        assert_eq!(json, "\"A+\"");
        let back: QualityGrade = serde_json::from_str("\"B+\"").unwrap();
        assert_eq!(back, QualityGrade::BPlus);
        assert_eq!("Rejected".parse::<QualityGrade>().unwrap(), QualityGrade::Rejected);
        assert!("Z".parse::<QualityGrade>().is_err());
    }

    #[test]
    fn lab_outcomes_parse_case_insensitively() {
        assert_eq!("warning".parse::<PesticideLevel>().unwrap(), PesticideLevel::Warning);
        assert_eq!("FAIL".parse::<HeavyMetalOutcome>().unwrap(), HeavyMetalOutcome::Fail);
        assert!("unknown".parse::<PesticideLevel>().is_err());
    }

    #[test]
    fn status_parsing_accepts_any_casing() {
        assert_eq!("valid".parse::<CertificateStatus>().unwrap(), CertificateStatus::Valid);
        assert_eq!("REVOKED".parse::<CertificateStatus>().unwrap(), CertificateStatus::Revoked);
        assert_eq!("inspected".parse::<BatchStatus>().unwrap(), BatchStatus::InInspection);
        assert_eq!(
            serde_json::to_string(&BatchStatus::InInspection).unwrap(),
            "\"IN_INSPECTION\""
        );
    }

    #[test]
    fn role_permissions() {
        assert!(Role::Exporter.permits(Action::SubmitBatch));
        assert!(!Role::Exporter.permits(Action::IssueCertificate));
        assert!(Role::QaAgency.permits(Action::RevokeCertificate));
        assert!(!Role::QaAgency.permits(Action::RestoreCertificate));
        assert!(Role::Admin.permits(Action::RestoreCertificate));
        assert!(!Role::QaAgency.permits(Action::ManageUsers));
        assert!(!Role::Importer.permits(Action::SubmitBatch));
    }

    #[test]
    fn unauthorized_actor_is_rejected() {
        let actor = Actor::new("imp-1", Role::Importer);
        let err = actor.authorize(Action::RevokeCertificate).unwrap_err();
        assert!(matches!(err, AgripassError::Unauthorized { .. }));
    }

    #[test]
    fn issuance_timestamp_has_millisecond_precision() {
        let ts = issuance_timestamp();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
