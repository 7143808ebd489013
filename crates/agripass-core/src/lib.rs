// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Agri-Pass core types, lifecycle rules and error definitions shared
// across all crates.

pub mod audit;
pub mod config;
pub mod error;
pub mod human_errors;
pub mod lifecycle;
pub mod types;

pub use audit::{AuditEvent, AuditSink};
pub use config::{AppConfig, AuthorityConfig};
pub use error::{AgripassError, Result};
pub use lifecycle::{BatchPhase, Transition};
pub use types::*;
