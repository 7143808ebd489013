// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch and certificate lifecycle rules.
//
//   Batch:        SUBMITTED -> IN_INSPECTION -> CERTIFIED
//                                          \-> REJECTED -> (reopen) SUBMITTED
//   Certificate:  VALID <-> REVOKED   (restore is its own transition)
//                 VALID  -> EXPIRED   (derived from the expiry timestamp)
//
// Every method either applies the whole transition and returns a
// `Transition` describing it, or returns `InvalidTransition` and leaves the
// record untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AgripassError, Result};
use crate::types::{Action, Batch, BatchStatus, Certificate, CertificateStatus, InspectionResult};

/// A state change that was applied to a record. Callers persist the record
/// and then emit one audit event per transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub entity_id: String,
    pub action: Action,
    pub from: &'static str,
    pub to: &'static str,
}

fn invalid(entity: String, action: Action, reason: impl Into<String>) -> AgripassError {
    AgripassError::InvalidTransition {
        entity,
        action: action.as_str(),
        reason: reason.into(),
    }
}

impl Batch {
    fn entity(&self) -> String {
        format!("batch {}", self.id)
    }

    fn move_to(&mut self, action: Action, to: BatchStatus) -> Transition {
        let from = self.status;
        self.status = to;
        Transition {
            entity_id: self.id.to_string(),
            action,
            from: from.as_str(),
            to: to.as_str(),
        }
    }

    /// A QA agency picks up a submitted batch.
    pub fn begin_inspection(&mut self) -> Result<Transition> {
        let action = Action::BeginInspection;
        if self.status != BatchStatus::Submitted {
            return Err(invalid(
                self.entity(),
                action,
                format!("batch is {}, expected SUBMITTED", self.status),
            ));
        }
        Ok(self.move_to(action, BatchStatus::InInspection))
    }

    /// Attach the inspection result.
    ///
    /// Only allowed while the batch is submitted or in inspection, and only
    /// once per cycle. A result graded `Rejected` moves the batch straight
    /// to `REJECTED`; anything else leaves it in inspection, ready for
    /// certification.
    pub fn record_inspection(&mut self, result: InspectionResult) -> Result<Transition> {
        let action = Action::RecordInspection;
        if !matches!(self.status, BatchStatus::Submitted | BatchStatus::InInspection) {
            return Err(invalid(
                self.entity(),
                action,
                format!("batch is {}, inspection results are closed", self.status),
            ));
        }
        if self.inspection.is_some() {
            return Err(invalid(
                self.entity(),
                action,
                "an inspection result is already attached for this cycle",
            ));
        }
        let to = if result.grade.is_rejection() {
            BatchStatus::Rejected
        } else {
            BatchStatus::InInspection
        };
        self.inspection = Some(result);
        Ok(self.move_to(action, to))
    }

    /// Reject a batch under inspection.
    pub fn reject(&mut self) -> Result<Transition> {
        let action = Action::RejectBatch;
        if self.status != BatchStatus::InInspection {
            return Err(invalid(
                self.entity(),
                action,
                format!("batch is {}, expected IN_INSPECTION", self.status),
            ));
        }
        Ok(self.move_to(action, BatchStatus::Rejected))
    }

    /// Start a new cycle for a rejected batch. The previous inspection result
    /// is dropped; the audit trail keeps the history.
    pub fn reopen(&mut self) -> Result<Transition> {
        let action = Action::ReopenBatch;
        if self.status != BatchStatus::Rejected {
            return Err(invalid(
                self.entity(),
                action,
                format!("batch is {}, only REJECTED batches can be reopened", self.status),
            ));
        }
        self.inspection = None;
        Ok(self.move_to(action, BatchStatus::Submitted))
    }

    /// Check that a certificate may be issued for this batch.
    ///
    /// `existing` holds the certificates already issued for the batch. The
    /// batch needs an inspection result that is not a rejection, and must
    /// not already be certified with a certificate that is still unrevoked.
    pub fn ensure_issuable(&self, existing: &[Certificate]) -> Result<()> {
        let action = Action::IssueCertificate;
        let Some(inspection) = &self.inspection else {
            return Err(invalid(self.entity(), action, "no inspection result attached"));
        };
        if inspection.grade.is_rejection() {
            return Err(invalid(self.entity(), action, "inspection graded the batch Rejected"));
        }
        if !matches!(self.status, BatchStatus::InInspection | BatchStatus::Certified) {
            return Err(invalid(self.entity(), action, format!("batch is {}", self.status)));
        }
        // Checked in inspection too: a certificate may exist without the
        // batch having moved on if a write failed between the two.
        let active = existing
            .iter()
            .find(|c| c.batch_id == self.id && c.status != CertificateStatus::Revoked);
        match active {
            Some(cert) => Err(invalid(
                self.entity(),
                action,
                format!("certificate {} is still active", cert.id),
            )),
            None => Ok(()),
        }
    }

    /// Apply the certification transition after `ensure_issuable` passed
    /// and the credential has been obtained.
    pub fn mark_certified(&mut self, existing: &[Certificate]) -> Result<Transition> {
        self.ensure_issuable(existing)?;
        Ok(self.move_to(Action::IssueCertificate, BatchStatus::Certified))
    }
}

impl Certificate {
    fn entity(&self) -> String {
        format!("certificate {}", self.id)
    }

    /// Status as presented to a reader at `now`: a stored `VALID` past its
    /// expiry reads as `EXPIRED`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> CertificateStatus {
        match self.status {
            CertificateStatus::Valid if now >= self.expires_at => CertificateStatus::Expired,
            other => other,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == CertificateStatus::Expired
    }

    /// Revoke a valid certificate. Terminal until an explicit restore.
    pub fn revoke(&mut self) -> Result<Transition> {
        let action = Action::RevokeCertificate;
        if self.status != CertificateStatus::Valid {
            return Err(invalid(
                self.entity(),
                action,
                format!("certificate is {}, expected VALID", self.status),
            ));
        }
        self.status = CertificateStatus::Revoked;
        Ok(Transition {
            entity_id: self.id.to_string(),
            action,
            from: CertificateStatus::Valid.as_str(),
            to: CertificateStatus::Revoked.as_str(),
        })
    }

    /// Restore a revoked certificate to valid.
    pub fn restore(&mut self) -> Result<Transition> {
        let action = Action::RestoreCertificate;
        if self.status != CertificateStatus::Revoked {
            return Err(invalid(
                self.entity(),
                action,
                format!("certificate is {}, expected REVOKED", self.status),
            ));
        }
        self.status = CertificateStatus::Valid;
        Ok(Transition {
            entity_id: self.id.to_string(),
            action,
            from: CertificateStatus::Revoked.as_str(),
            to: CertificateStatus::Valid.as_str(),
        })
    }
}

/// Read-side phase of a batch. `Verified` is a projection over a certified
/// batch whose certificate passed third-party verification; it is never
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    Submitted,
    InInspection,
    Certified,
    Verified,
    Rejected,
}

impl BatchPhase {
    pub fn project(batch: &Batch, verified: bool) -> Self {
        match batch.status {
            BatchStatus::Submitted => Self::Submitted,
            BatchStatus::InInspection => Self::InInspection,
            BatchStatus::Certified if verified => Self::Verified,
            BatchStatus::Certified => Self::Certified,
            BatchStatus::Rejected => Self::Rejected,
        }
    }
}
