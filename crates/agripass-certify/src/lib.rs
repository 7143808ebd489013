// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// agripass-certify: the batch certification workflow on top of a record
// store, the credential gateway and the audit trail.

pub mod service;
pub mod store;
pub mod verification;

pub use service::{BatchCounts, CertificateCounts, CertificationService, IssuedCertificate, Stats};
pub use store::{MemoryStore, RecordStore, SqliteStore};
pub use verification::{
    BatchView, CertificateReport, OfflineCheck, PresentedStatus, RecordMatch, TokenVerification,
};
