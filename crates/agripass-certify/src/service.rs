// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Certification service: drives batches from submission to a sealed,
// credentialed certificate and answers verification requests.
//
// Write path per operation: authorize -> load -> lifecycle transition ->
// persist -> one audit event. A failed audit write is logged and does not
// undo the persisted change. Issuance persists nothing until the gateway
// call has resolved.

use std::sync::Arc;

use agripass_codec::CompactToken;
use agripass_core::audit::{AuditEvent, AuditSink};
use agripass_core::config::AppConfig;
use agripass_core::error::{AgripassError, Result};
use agripass_core::human_errors::trust_notice;
use agripass_core::lifecycle::{BatchPhase, Transition};
use agripass_core::types::{
    Action, Actor, Authority, Batch, BatchId, BatchStatus, Certificate, CertificateId,
    CertificateStatus, InspectionResult, NewBatch, Role, issuance_timestamp,
};
use agripass_gateway::{CredentialGateway, build_passport, issuer_identity};
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::store::RecordStore;
use crate::verification::{
    BatchView, CertificateReport, OfflineCheck, PresentedStatus, RecordMatch, TokenVerification,
};

/// A freshly issued certificate with everything needed to print it.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCertificate {
    pub certificate: Certificate,
    pub proof_image: String,
    pub authority: Authority,
    /// Offline badge payload for the QR code.
    pub token: String,
    pub trust_notice: Option<&'static str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
    pub submitted: usize,
    pub in_inspection: usize,
    pub certified: usize,
    pub rejected: usize,
    pub total: usize,
}

/// Certificate counts by presented status (expiry and tampering applied).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CertificateCounts {
    pub valid: usize,
    pub revoked: usize,
    pub expired: usize,
    pub tampered: usize,
    /// Issued while the authority was unreachable.
    pub local_fallback: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub batches: BatchCounts,
    pub certificates: CertificateCounts,
}

fn check_percent(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(AgripassError::InvalidField {
            field,
            reason: format!("{value} is not a percentage between 0 and 100"),
        });
    }
    Ok(())
}

fn require(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AgripassError::MissingField(field));
    }
    Ok(())
}

pub struct CertificationService<S: RecordStore> {
    store: S,
    gateway: CredentialGateway,
    audit: Option<Arc<dyn AuditSink>>,
    config: AppConfig,
}

impl<S: RecordStore> CertificationService<S> {
    pub fn new(store: S, gateway: CredentialGateway, config: AppConfig) -> Self {
        Self {
            store,
            gateway,
            audit: None,
            config,
        }
    }

    /// Attach an audit sink. Ignored when `audit_enabled` is off.
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        if self.config.audit_enabled {
            self.audit = Some(sink);
        }
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn gateway(&self) -> &CredentialGateway {
        &self.gateway
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn audit(&self, event: AuditEvent) {
        let Some(sink) = &self.audit else {
            return;
        };
        if let Err(e) = sink.record(&event) {
            error!(
                error = %e,
                action = %event.action,
                entity = %event.entity_id,
                "audit write failed; change kept"
            );
        }
    }

    fn load_batch(&self, id: &BatchId) -> Result<Batch> {
        self.store.get_batch(id)?.ok_or_else(|| AgripassError::NotFound {
            kind: "batch",
            id: id.to_string(),
        })
    }

    fn load_certificate(&self, id: &CertificateId) -> Result<Certificate> {
        self.store
            .get_certificate(id)?
            .ok_or_else(|| AgripassError::NotFound {
                kind: "certificate",
                id: id.to_string(),
            })
    }

    fn transition_batch(
        &self,
        actor: &Actor,
        id: &BatchId,
        action: Action,
        apply: impl FnOnce(&mut Batch) -> Result<Transition>,
        detail: Option<(&str, serde_json::Value)>,
    ) -> Result<Batch> {
        actor.authorize(action)?;
        let mut batch = self.load_batch(id)?;
        let transition = apply(&mut batch)?;
        self.store.update_batch(&batch)?;

        info!(batch_id = %batch.id, from = transition.from, to = transition.to, "batch {}", action.as_str());
        let mut event = AuditEvent::for_transition(actor, &transition);
        if let Some((key, value)) = detail {
            event = event.with_detail(key, value);
        }
        self.audit(event);
        Ok(batch)
    }

    /// The registered user behind `id`.
    ///
    /// Until the first user is registered every caller is taken at the role
    /// they claim, so that an administrator can bootstrap the registry.
    pub fn resolve_actor(&self, id: &str, claimed: Role) -> Result<Actor> {
        if let Some(user) = self.store.get_user(id)? {
            if user.role != claimed {
                debug!(
                    user_id = id,
                    claimed = claimed.as_str(),
                    role = user.role.as_str(),
                    "using registered role"
                );
            }
            return Ok(user);
        }
        if self.store.list_users(None)?.is_empty() {
            return Ok(Actor::new(id, claimed));
        }
        Err(AgripassError::Unauthorized {
            actor: id.to_owned(),
            action: "act without a registered account",
        })
    }

    /// Create or change a user account. Admin only.
    #[instrument(skip(self, user), fields(actor = %actor.id, user_id = %user.id))]
    pub fn register_user(&self, actor: &Actor, user: Actor) -> Result<Actor> {
        actor.authorize(Action::ManageUsers)?;
        require("user_id", &user.id)?;

        let previous = self.store.get_user(&user.id)?;
        match &previous {
            Some(_) => self.store.update_user(&user)?,
            None => self.store.insert_user(&user)?,
        }
        info!(role = user.role.as_str(), "user registered");

        let mut event = AuditEvent::new(actor, Action::ManageUsers.as_str(), user.id.as_str())
            .with_detail("to", user.role.as_str());
        if let Some(previous) = previous {
            event = event.with_detail("from", previous.role.as_str());
        }
        self.audit(event);
        Ok(user)
    }

    pub fn list_users(&self, role: Option<Role>) -> Result<Vec<Actor>> {
        self.store.list_users(role)
    }

    /// Register a new batch on behalf of an exporter.
    #[instrument(skip(self, input), fields(actor = %actor.id))]
    pub fn submit_batch(&self, actor: &Actor, input: NewBatch) -> Result<Batch> {
        actor.authorize(Action::SubmitBatch)?;
        require("exporter", &input.exporter.name)?;
        require("product_type", &input.product_type)?;
        require("quantity", &input.quantity)?;

        let batch = Batch::submit(input);
        self.store.insert_batch(&batch)?;
        info!(batch_id = %batch.id, product = %batch.product_type, "batch submitted");

        self.audit(
            AuditEvent::new(actor, Action::SubmitBatch.as_str(), batch.id.as_str())
                .with_detail("to", batch.status.as_str())
                .with_detail("product_type", batch.product_type.clone()),
        );
        Ok(batch)
    }

    #[instrument(skip(self), fields(actor = %actor.id))]
    pub fn begin_inspection(&self, actor: &Actor, id: &BatchId) -> Result<Batch> {
        self.transition_batch(actor, id, Action::BeginInspection, Batch::begin_inspection, None)
    }

    /// Attach the inspection result. A `Rejected` grade rejects the batch.
    #[instrument(skip(self, result), fields(actor = %actor.id, grade = %result.grade))]
    pub fn record_inspection(
        &self,
        actor: &Actor,
        id: &BatchId,
        mut result: InspectionResult,
    ) -> Result<Batch> {
        check_percent("moisture_percent", result.moisture_percent)?;
        if let Some(foreign) = result.foreign_matter_percent {
            check_percent("foreign_matter_percent", foreign)?;
        }
        if result.inspector_id.trim().is_empty() {
            result.inspector_id = actor.id.clone();
        }
        let grade = result.grade.as_str();
        self.transition_batch(
            actor,
            id,
            Action::RecordInspection,
            |batch| batch.record_inspection(result),
            Some(("grade", grade.into())),
        )
    }

    #[instrument(skip(self), fields(actor = %actor.id))]
    pub fn reject_batch(&self, actor: &Actor, id: &BatchId, reason: Option<&str>) -> Result<Batch> {
        self.transition_batch(
            actor,
            id,
            Action::RejectBatch,
            Batch::reject,
            reason.map(|r| ("reason", r.into())),
        )
    }

    /// Start a new cycle for a rejected batch.
    #[instrument(skip(self), fields(actor = %actor.id))]
    pub fn reopen_batch(&self, actor: &Actor, id: &BatchId) -> Result<Batch> {
        self.transition_batch(actor, id, Action::ReopenBatch, Batch::reopen, None)
    }

    /// Issue, seal and persist a certificate for an inspected batch.
    #[instrument(skip(self), fields(actor = %actor.id, batch_id = %id))]
    pub async fn issue_certificate(&self, actor: &Actor, id: &BatchId) -> Result<IssuedCertificate> {
        actor.authorize(Action::IssueCertificate)?;
        let batch = self.load_batch(id)?;
        batch.ensure_issuable(&self.store.certificates_for_batch(id)?)?;

        let issued_at = issuance_timestamp();
        let validity_days = self.config.default_validity_days;
        let expires_at = Duration::try_days(i64::from(validity_days))
            .and_then(|validity| issued_at.checked_add_signed(validity))
            .ok_or_else(|| {
                AgripassError::Config(format!(
                    "default_validity_days = {validity_days} puts the expiry out of range"
                ))
            })?;
        let issuer = issuer_identity(&self.config);
        let passport = build_passport(&batch, &issuer, issued_at, expires_at)?;

        let outcome = self.gateway.issue_credential(passport).await;

        // The batch may have moved while the gateway call was in flight.
        let mut batch = self.load_batch(id)?;
        let existing = self.store.certificates_for_batch(id)?;
        let transition = batch.mark_certified(&existing)?;

        let mut certificate = Certificate {
            id: CertificateId::generate(),
            batch_id: batch.id.clone(),
            issued_at,
            expires_at,
            status: CertificateStatus::Valid,
            credential: serde_json::to_value(&outcome.credential)?,
            proof_image: Some(outcome.proof_image.clone()),
            authority: outcome.authority,
            hash: String::new(),
            issuer: issuer.name,
            faults: Vec::new(),
        };
        certificate.hash = agripass_security::seal(&certificate)?;
        let token = CompactToken::from_certificate(&certificate, &batch, issued_at)?.to_token()?;

        self.store.record_issuance(&certificate, &batch)?;
        info!(
            certificate_id = %certificate.id,
            authority = %certificate.authority,
            "certificate issued"
        );
        if !certificate.authority.is_authoritative() {
            warn!(certificate_id = %certificate.id, "certificate carries an unsigned local proof");
        }

        self.audit(
            AuditEvent::new(actor, Action::IssueCertificate.as_str(), certificate.id.as_str())
                .with_detail("batch_id", batch.id.as_str())
                .with_detail("batch_from", transition.from)
                .with_detail("batch_to", transition.to)
                .with_detail("authority", certificate.authority.as_str())
                .with_detail("role", actor.role.as_str()),
        );

        Ok(IssuedCertificate {
            trust_notice: trust_notice(certificate.authority),
            proof_image: outcome.proof_image,
            authority: certificate.authority,
            certificate,
            token,
        })
    }

    fn transition_certificate(
        &self,
        actor: &Actor,
        id: &CertificateId,
        action: Action,
        apply: impl FnOnce(&mut Certificate) -> Result<Transition>,
        reason: Option<&str>,
    ) -> Result<CertificateReport> {
        actor.authorize(action)?;
        let mut certificate = self.load_certificate(id)?;
        // A tampered record must not be laundered by re-sealing it.
        agripass_security::verify_seal(&certificate)?;

        let transition = apply(&mut certificate)?;
        certificate.hash = agripass_security::seal(&certificate)?;
        self.store.update_certificate(&certificate)?;
        info!(certificate_id = %certificate.id, from = transition.from, to = transition.to, "certificate {}", action.as_str());

        let mut event = AuditEvent::for_transition(actor, &transition);
        if let Some(reason) = reason {
            event = event.with_detail("reason", reason);
        }
        self.audit(event);
        Ok(CertificateReport::evaluate(certificate, Utc::now()))
    }

    #[instrument(skip(self), fields(actor = %actor.id))]
    pub fn revoke_certificate(
        &self,
        actor: &Actor,
        id: &CertificateId,
        reason: Option<&str>,
    ) -> Result<CertificateReport> {
        self.transition_certificate(actor, id, Action::RevokeCertificate, Certificate::revoke, reason)
    }

    #[instrument(skip(self), fields(actor = %actor.id))]
    pub fn restore_certificate(
        &self,
        actor: &Actor,
        id: &CertificateId,
        reason: Option<&str>,
    ) -> Result<CertificateReport> {
        self.transition_certificate(actor, id, Action::RestoreCertificate, Certificate::restore, reason)
    }

    /// Current view of a certificate, with the seal rechecked.
    pub fn certificate_report(&self, id: &CertificateId) -> Result<CertificateReport> {
        let report = CertificateReport::evaluate(self.load_certificate(id)?, Utc::now());
        if report.is_tampered() {
            warn!(certificate_id = %id, "stored hash does not match certificate fields");
        }
        Ok(report)
    }

    pub fn batch_view(&self, id: &BatchId) -> Result<BatchView> {
        let batch = self.load_batch(id)?;
        let now = Utc::now();
        let certificates = self
            .store
            .certificates_for_batch(id)?
            .into_iter()
            .map(|c| CertificateReport::evaluate(c, now))
            .collect();
        Ok(BatchView {
            phase: BatchPhase::project(&batch, false),
            batch,
            certificates,
        })
    }

    pub fn list_batches(&self, status: Option<BatchStatus>) -> Result<Vec<Batch>> {
        self.store.list_batches(status)
    }

    pub fn list_certificates(&self, status: Option<CertificateStatus>) -> Result<Vec<CertificateReport>> {
        let now = Utc::now();
        Ok(self
            .store
            .list_certificates(status)?
            .into_iter()
            .map(|c| CertificateReport::evaluate(c, now))
            .collect())
    }

    /// Offline badge payload for an existing certificate.
    pub fn compact_token(&self, id: &CertificateId) -> Result<String> {
        let certificate = self.load_certificate(id)?;
        let batch = self.load_batch(&certificate.batch_id)?;
        CompactToken::from_certificate(&certificate, &batch, Utc::now())?.to_token()
    }

    fn check_badge(&self, badge: CompactToken) -> Result<OfflineCheck> {
        let report = self
            .store
            .get_certificate(&CertificateId::from(badge.id.as_str()))?
            .map(|certificate| CertificateReport::evaluate(certificate, Utc::now()));
        let record = match &report {
            Some(report) => RecordMatch::compare(&badge, report),
            None => RecordMatch::Unknown,
        };
        Ok(OfflineCheck {
            badge,
            record,
            report,
        })
    }

    /// Check a scanned badge against local records, without the network.
    #[instrument(skip_all)]
    pub fn verify_offline(&self, token: &str) -> Result<OfflineCheck> {
        let badge = CompactToken::from_token(token)?;
        let check = self.check_badge(badge)?;
        info!(
            certificate_id = %check.badge.id,
            record = ?check.record,
            valid = check.is_valid(),
            "badge checked offline"
        );
        Ok(check)
    }

    /// Verify a scanned token with the authority (or its fallback), and
    /// compare it with local records when it is a certificate badge.
    #[instrument(skip_all)]
    pub async fn verify_token(&self, token: &str) -> Result<TokenVerification> {
        let verdict = self.gateway.verify_credential(token).await;

        let offline = match CompactToken::from_token(token) {
            Ok(badge) => Some(self.check_badge(badge)?),
            Err(_) => None,
        };

        let batch_id = offline
            .as_ref()
            .and_then(|o| o.report.as_ref())
            .map(|r| r.certificate.batch_id.clone());
        let phase = match batch_id {
            Some(batch_id) => {
                let confirmed = verdict.is_trusted()
                    && offline.as_ref().is_some_and(OfflineCheck::is_valid);
                self.store
                    .get_batch(&batch_id)?
                    .map(|batch| BatchPhase::project(&batch, confirmed))
            }
            None => None,
        };

        Ok(TokenVerification {
            verdict,
            offline,
            phase,
        })
    }

    /// Dashboard counts.
    pub fn stats(&self) -> Result<Stats> {
        let mut batches = BatchCounts::default();
        for batch in self.store.list_batches(None)? {
            batches.total += 1;
            match batch.status {
                BatchStatus::Submitted => batches.submitted += 1,
                BatchStatus::InInspection => batches.in_inspection += 1,
                BatchStatus::Certified => batches.certified += 1,
                BatchStatus::Rejected => batches.rejected += 1,
            }
        }

        let mut certificates = CertificateCounts::default();
        for report in self.list_certificates(None)? {
            certificates.total += 1;
            if report.certificate.authority == Authority::LocalFallback {
                certificates.local_fallback += 1;
            }
            match report.presented {
                PresentedStatus::Valid => certificates.valid += 1,
                PresentedStatus::Revoked => certificates.revoked += 1,
                PresentedStatus::Expired => certificates.expired += 1,
                PresentedStatus::Tampered => certificates.tampered += 1,
            }
        }

        Ok(Stats {
            batches,
            certificates,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use agripass_core::types::{Exporter, HeavyMetalOutcome, PesticideLevel, QualityGrade};
    use agripass_gateway::OfflineTransport;

    use super::*;
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<AuditEvent>>,
    }

    impl AuditSink for RecordingSink {
        fn record(&self, event: &AuditEvent) -> Result<()> {
            self.events
                .lock()
                .map_err(|_| AgripassError::Database("poisoned".into()))?
                .push(event.clone());
            Ok(())
        }
    }

    struct BrokenSink;

    impl AuditSink for BrokenSink {
        fn record(&self, _event: &AuditEvent) -> Result<()> {
            Err(AgripassError::Database("disk full".into()))
        }
    }

    fn exporter() -> Actor {
        Actor::new("exp-1", Role::Exporter)
    }

    fn qa() -> Actor {
        Actor::new("qa-7", Role::QaAgency)
    }

    fn admin() -> Actor {
        Actor::new("admin-1", Role::Admin)
    }

    fn service(sink: Arc<dyn AuditSink>) -> CertificationService<MemoryStore> {
        CertificationService::new(
            MemoryStore::new(),
            CredentialGateway::new(Arc::new(OfflineTransport)),
            AppConfig::default(),
        )
        .with_audit(sink)
    }

    fn new_batch() -> NewBatch {
        NewBatch {
            exporter: Exporter {
                name: "Punjab Grains Co-op".into(),
                id: None,
                contact: None,
            },
            product_type: "Basmati Rice".into(),
            quantity: "18 t".into(),
            origin: "Amritsar, IN".into(),
            destination: "Rotterdam, NL".into(),
            notes: None,
            documents: vec![],
        }
    }

    fn inspection(grade: QualityGrade) -> InspectionResult {
        InspectionResult {
            grade,
            moisture_percent: 12.5,
            pesticide_level: PesticideLevel::Safe,
            heavy_metal: HeavyMetalOutcome::Pass,
            iso_code: "ISO 22000".into(),
            inspector_id: String::new(),
            inspector_name: None,
            inspected_at: Utc::now(),
            sample_id: None,
            foreign_matter_percent: None,
            notes: None,
        }
    }

    fn inspected(svc: &CertificationService<MemoryStore>, grade: QualityGrade) -> Batch {
        let batch = svc.submit_batch(&exporter(), new_batch()).unwrap();
        svc.begin_inspection(&qa(), &batch.id).unwrap();
        svc.record_inspection(&qa(), &batch.id, inspection(grade)).unwrap()
    }

    #[tokio::test]
    async fn issue_seals_persists_and_audits() {
        let sink = Arc::new(RecordingSink::default());
        let svc = service(sink.clone());
        let batch = inspected(&svc, QualityGrade::A);
        assert_eq!(batch.inspection.as_ref().unwrap().inspector_id, "qa-7");

        let issued = svc.issue_certificate(&qa(), &batch.id).await.unwrap();
        assert_eq!(issued.authority, Authority::LocalFallback);
        assert!(issued.trust_notice.is_some());
        assert!(issued.token.starts_with(agripass_codec::TOKEN_PREFIX));
        assert_eq!(issued.certificate.hash.len(), 64);

        let report = svc.certificate_report(&issued.certificate.id).unwrap();
        assert_eq!(report.presented, PresentedStatus::Valid);

        let stored_batch = svc.store().get_batch(&batch.id).unwrap().unwrap();
        assert_eq!(stored_batch.status, BatchStatus::Certified);

        let events = sink.events.lock().unwrap();
        let actions: Vec<&str> = events.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(
            actions,
            [
                "submit batch",
                "begin inspection",
                "record inspection",
                "issue certificate"
            ]
        );
        assert_eq!(events[3].entity_id, issued.certificate.id.as_str());
    }

    #[tokio::test]
    async fn out_of_range_validity_is_a_config_error() {
        let config = AppConfig {
            default_validity_days: u32::MAX,
            ..AppConfig::default()
        };
        let svc = CertificationService::new(
            MemoryStore::new(),
            CredentialGateway::new(Arc::new(OfflineTransport)),
            config,
        );
        let batch = inspected(&svc, QualityGrade::A);

        let err = svc.issue_certificate(&qa(), &batch.id).await.unwrap_err();
        assert!(matches!(err, AgripassError::Config(_)));
        assert!(svc.store().list_certificates(None).unwrap().is_empty());
        assert_eq!(
            svc.store().get_batch(&batch.id).unwrap().unwrap().status,
            BatchStatus::InInspection
        );
    }

    #[tokio::test]
    async fn certificate_left_by_a_failed_write_blocks_reissue() {
        let svc = service(Arc::new(RecordingSink::default()));
        let batch = inspected(&svc, QualityGrade::A);
        let issued_at = issuance_timestamp();
        let orphan = Certificate {
            id: CertificateId::generate(),
            batch_id: batch.id.clone(),
            issued_at,
            expires_at: issued_at + Duration::days(30),
            status: CertificateStatus::Valid,
            credential: serde_json::Value::Null,
            proof_image: None,
            authority: Authority::LocalFallback,
            hash: String::new(),
            issuer: "National Agricultural Quality Agency".into(),
            faults: Vec::new(),
        };
        svc.store().insert_certificate(&orphan).unwrap();

        let err = svc.issue_certificate(&qa(), &batch.id).await.unwrap_err();
        assert!(matches!(err, AgripassError::InvalidTransition { .. }));
        assert_eq!(svc.store().list_certificates(None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn uninspected_batch_cannot_be_certified() {
        let svc = service(Arc::new(RecordingSink::default()));
        let batch = svc.submit_batch(&exporter(), new_batch()).unwrap();
        let err = svc.issue_certificate(&qa(), &batch.id).await.unwrap_err();
        assert!(matches!(err, AgripassError::InvalidTransition { .. }));
        assert!(svc.store().list_certificates(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_active_certificate_is_refused() {
        let svc = service(Arc::new(RecordingSink::default()));
        let batch = inspected(&svc, QualityGrade::BPlus);
        let first = svc.issue_certificate(&qa(), &batch.id).await.unwrap();

        let err = svc.issue_certificate(&qa(), &batch.id).await.unwrap_err();
        assert!(matches!(err, AgripassError::InvalidTransition { .. }));

        svc.revoke_certificate(&qa(), &first.certificate.id, Some("label misprint"))
            .unwrap();
        assert!(svc.issue_certificate(&qa(), &batch.id).await.is_ok());
    }

    #[tokio::test]
    async fn revoke_and_restore_keep_the_seal_intact() {
        let svc = service(Arc::new(RecordingSink::default()));
        let batch = inspected(&svc, QualityGrade::A);
        let id = svc.issue_certificate(&qa(), &batch.id).await.unwrap().certificate.id;

        let revoked = svc.revoke_certificate(&qa(), &id, None).unwrap();
        assert_eq!(revoked.presented, PresentedStatus::Revoked);
        assert!(!revoked.integrity.is_tampered());

        let err = svc.revoke_certificate(&qa(), &id, None).unwrap_err();
        assert!(matches!(err, AgripassError::InvalidTransition { .. }));

        // Only admins restore.
        let err = svc.restore_certificate(&qa(), &id, None).unwrap_err();
        assert!(matches!(err, AgripassError::Unauthorized { .. }));

        let restored = svc.restore_certificate(&admin(), &id, Some("appeal upheld")).unwrap();
        assert_eq!(restored.presented, PresentedStatus::Valid);

        let err = svc.restore_certificate(&admin(), &id, None).unwrap_err();
        assert!(matches!(err, AgripassError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn direct_store_edit_reads_as_tampered() {
        let svc = service(Arc::new(RecordingSink::default()));
        let batch = inspected(&svc, QualityGrade::A);
        let mut cert = svc.issue_certificate(&qa(), &batch.id).await.unwrap().certificate;

        cert.status = CertificateStatus::Revoked;
        svc.store().update_certificate(&cert).unwrap();

        let report = svc.certificate_report(&cert.id).unwrap();
        assert_eq!(report.presented, PresentedStatus::Tampered);

        // The service refuses to re-seal over it.
        let err = svc.restore_certificate(&admin(), &cert.id, None).unwrap_err();
        assert!(matches!(err, AgripassError::IntegrityMismatch { .. }));
        assert_eq!(svc.stats().unwrap().certificates.tampered, 1);
    }

    #[test]
    fn rejected_grade_rejects_and_reopen_starts_over() {
        let svc = service(Arc::new(RecordingSink::default()));
        let batch = inspected(&svc, QualityGrade::Rejected);
        assert_eq!(batch.status, BatchStatus::Rejected);

        let reopened = svc.reopen_batch(&qa(), &batch.id).unwrap();
        assert_eq!(reopened.status, BatchStatus::Submitted);
        assert!(reopened.inspection.is_none());
    }

    #[test]
    fn exporters_cannot_inspect() {
        let svc = service(Arc::new(RecordingSink::default()));
        let batch = svc.submit_batch(&exporter(), new_batch()).unwrap();
        let err = svc.begin_inspection(&exporter(), &batch.id).unwrap_err();
        assert!(matches!(err, AgripassError::Unauthorized { .. }));
        let stored = svc.store().get_batch(&batch.id).unwrap().unwrap();
        assert_eq!(stored.status, BatchStatus::Submitted);
    }

    #[test]
    fn out_of_range_moisture_is_refused() {
        let svc = service(Arc::new(RecordingSink::default()));
        let batch = svc.submit_batch(&exporter(), new_batch()).unwrap();
        let mut result = inspection(QualityGrade::A);
        result.moisture_percent = 140.0;
        let err = svc.record_inspection(&qa(), &batch.id, result).unwrap_err();
        assert!(matches!(err, AgripassError::InvalidField { field: "moisture_percent", .. }));
    }

    #[test]
    fn blank_product_is_refused() {
        let svc = service(Arc::new(RecordingSink::default()));
        let mut input = new_batch();
        input.product_type = "  ".into();
        let err = svc.submit_batch(&exporter(), input).unwrap_err();
        assert!(matches!(err, AgripassError::MissingField("product_type")));
    }

    #[tokio::test]
    async fn failing_audit_does_not_roll_back() {
        let svc = service(Arc::new(BrokenSink));
        let batch = inspected(&svc, QualityGrade::A);
        let issued = svc.issue_certificate(&qa(), &batch.id).await.unwrap();
        assert!(svc.store().get_certificate(&issued.certificate.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn issued_badge_checks_out_offline() {
        let svc = service(Arc::new(RecordingSink::default()));
        let batch = inspected(&svc, QualityGrade::A);
        let issued = svc.issue_certificate(&qa(), &batch.id).await.unwrap();

        let check = svc.verify_offline(&issued.token).unwrap();
        assert_eq!(check.record, RecordMatch::Consistent);
        assert!(check.is_valid());

        svc.revoke_certificate(&qa(), &issued.certificate.id, None).unwrap();
        let check = svc.verify_offline(&issued.token).unwrap();
        assert_eq!(check.record, RecordMatch::StatusDiffers);
        assert!(!check.is_valid());
    }

    #[tokio::test]
    async fn online_verification_without_authority_is_not_trusted() {
        let svc = service(Arc::new(RecordingSink::default()));
        let batch = inspected(&svc, QualityGrade::A);
        let issued = svc.issue_certificate(&qa(), &batch.id).await.unwrap();

        let result = svc.verify_token(&issued.token).await.unwrap();
        assert_eq!(result.verdict.authority, Authority::LocalFallback);
        assert!(!result.verdict.is_trusted());
        assert_eq!(result.phase, Some(BatchPhase::Certified));
        assert!(result.offline.unwrap().is_valid());
    }

    #[tokio::test]
    async fn stats_count_presented_states() {
        let svc = service(Arc::new(RecordingSink::default()));
        let certified = inspected(&svc, QualityGrade::A);
        svc.issue_certificate(&qa(), &certified.id).await.unwrap();
        inspected(&svc, QualityGrade::Rejected);
        svc.submit_batch(&exporter(), new_batch()).unwrap();

        let stats = svc.stats().unwrap();
        assert_eq!(stats.batches.total, 3);
        assert_eq!(stats.batches.certified, 1);
        assert_eq!(stats.batches.rejected, 1);
        assert_eq!(stats.batches.submitted, 1);
        assert_eq!(stats.certificates.valid, 1);
        assert_eq!(stats.certificates.local_fallback, 1);
    }

    #[test]
    fn registered_role_overrides_the_claim() {
        let svc = service(Arc::new(RecordingSink::default()));
        // Empty registry: claims are taken as given.
        let bootstrap = svc.resolve_actor("root", Role::Admin).unwrap();
        assert_eq!(bootstrap.role, Role::Admin);

        svc.register_user(&bootstrap, Actor::new("root", Role::Admin)).unwrap();
        svc.register_user(&bootstrap, Actor::new("exp-1", Role::Exporter)).unwrap();

        let resolved = svc.resolve_actor("exp-1", Role::Admin).unwrap();
        assert_eq!(resolved.role, Role::Exporter);
        let err = svc.resolve_actor("stranger", Role::Admin).unwrap_err();
        assert!(matches!(err, AgripassError::Unauthorized { .. }));

        let err = svc
            .register_user(&resolved, Actor::new("exp-2", Role::Admin))
            .unwrap_err();
        assert!(matches!(err, AgripassError::Unauthorized { .. }));

        svc.register_user(&bootstrap, Actor::new("exp-1", Role::QaAgency)).unwrap();
        assert_eq!(svc.resolve_actor("exp-1", Role::Exporter).unwrap().role, Role::QaAgency);
        assert_eq!(svc.list_users(None).unwrap().len(), 2);
    }

    #[test]
    fn disabled_audit_ignores_the_sink() {
        let sink = Arc::new(RecordingSink::default());
        let config = AppConfig {
            audit_enabled: false,
            ..AppConfig::default()
        };
        let svc = CertificationService::new(
            MemoryStore::new(),
            CredentialGateway::new(Arc::new(OfflineTransport)),
            config,
        )
        .with_audit(sink.clone());
        svc.submit_batch(&exporter(), new_batch()).unwrap();
        assert!(sink.events.lock().unwrap().is_empty());
    }
}
