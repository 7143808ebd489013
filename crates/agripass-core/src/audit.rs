// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit seam: every persisted state change emits one event capturing who
// did what to which entity. The sink itself lives outside this crate.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lifecycle::Transition;
use crate::types::Actor;

/// One audit record, as handed to an [`AuditSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor_id: String,
    /// Short verb phrase, e.g. `"revoke certificate"`.
    pub action: String,
    pub entity_id: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(actor: &Actor, action: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor.id.clone(),
            action: action.into(),
            entity_id: entity_id.into(),
            details: None,
        }
    }

    /// Event for an applied lifecycle transition, with `from`/`to` in the
    /// details.
    pub fn for_transition(actor: &Actor, transition: &Transition) -> Self {
        Self {
            actor_id: actor.id.clone(),
            action: transition.action.as_str().to_owned(),
            entity_id: transition.entity_id.clone(),
            details: Some(serde_json::json!({
                "from": transition.from,
                "to": transition.to,
                "role": actor.role.as_str(),
            })),
        }
    }

    /// Merge extra key/value pairs into the details object.
    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        let details = self
            .details
            .get_or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if let serde_json::Value::Object(map) = details {
            map.insert(key.to_owned(), value.into());
        }
        self
    }
}

/// Destination for audit events.
///
/// Audit writes are best-effort: callers log a failed `record` and carry on
/// rather than rolling back the state change that produced it.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<()>;
}
