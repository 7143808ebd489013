// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Agri-Pass.

use thiserror::Error;

/// Top-level error type for all Agri-Pass operations.
#[derive(Debug, Error)]
pub enum AgripassError {
    // -- Compact token errors --
    #[error("token encoding failed: {0}")]
    Encode(String),

    #[error("token decoding failed: {0}")]
    Decode(String),

    // -- Integrity errors --
    #[error("required field `{0}` is missing")]
    MissingField(&'static str),

    #[error("field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    // -- Remote credential authority --
    #[error("credential authority unavailable: {0}")]
    GatewayUnavailable(String),

    // -- Lifecycle --
    #[error("cannot {action} {entity}: {reason}")]
    InvalidTransition {
        entity: String,
        action: &'static str,
        reason: String,
    },

    #[error("{actor} is not allowed to {action}")]
    Unauthorized { actor: String, action: &'static str },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AgripassError>;
