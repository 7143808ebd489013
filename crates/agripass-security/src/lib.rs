// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// agripass-security: tamper-evident certificate sealing and the persistent
// audit trail.

pub mod audit;
pub mod integrity;

pub use audit::{AuditEntry, AuditLog};
pub use integrity::{IntegrityCheck, check_seal, hash_bytes, seal, verify_seal};
