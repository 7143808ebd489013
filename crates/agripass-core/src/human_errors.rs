// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for exporters, inspectors and importers at
// the border.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The taxonomy uses four severity levels that drive UI presentation.

use crate::error::AgripassError;
use crate::types::Authority;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Network blip or busy service; trying again may work.
    Transient,
    /// The user must correct something (wrong token, missing inspection).
    ActionRequired,
    /// Cannot be fixed by retrying.
    Permanent,
    /// The record has been altered since issuance. Never auto-corrected.
    Tampered,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether trying the same thing again could succeed.
    pub retriable: bool,
    /// Severity level (drives icon/colour in UI).
    pub severity: Severity,
}

/// Convert an `AgripassError` into a `HumanError`.
pub fn humanize_error(err: &AgripassError) -> HumanError {
    match err {
        // -- Tokens --
        AgripassError::Encode(_) => HumanError {
            message: "We couldn't turn this certificate into a QR code.".into(),
            suggestion: "Some of the certificate data can't be stored in a QR code. Check the record for unusual values and try again.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        AgripassError::Decode(_) => HumanError {
            message: "This QR code isn't a certificate we recognise.".into(),
            suggestion: "Scan the code again, making sure the whole code is in view. If it still fails, the code may be damaged or not an Agri-Pass certificate.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        // -- Integrity --
        AgripassError::MissingField(field) => HumanError {
            message: "The certificate record is incomplete.".into(),
            suggestion: format!("The `{field}` field is missing, so the record can't be sealed. Fill it in and try again."),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        AgripassError::InvalidField { field, reason } => HumanError {
            message: "Some of the information doesn't look right.".into(),
            suggestion: format!("Check the `{field}` value and try again. ({reason})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        AgripassError::IntegrityMismatch { .. } => HumanError {
            message: "This certificate has been changed since it was issued.".into(),
            suggestion: "Do not accept this certificate. Contact the issuing agency and report the certificate ID.".into(),
            retriable: false,
            severity: Severity::Tampered,
        },

        // -- Authority --
        AgripassError::GatewayUnavailable(_) => HumanError {
            message: "The certification authority can't be reached right now.".into(),
            suggestion: "Results were checked locally and are not authoritative. Try again when you're back online for a full check.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        // -- Lifecycle --
        AgripassError::InvalidTransition { reason, .. } => HumanError {
            message: "That step isn't possible for this record right now.".into(),
            suggestion: format!("Check the record's current status first. ({reason})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        AgripassError::Unauthorized { action, .. } => HumanError {
            message: "You don't have permission to do that.".into(),
            suggestion: format!("Ask an administrator to {action} for you, or sign in with an account that can."),
            retriable: false,
            severity: Severity::Permanent,
        },

        AgripassError::NotFound { kind, id } => HumanError {
            message: format!("We couldn't find that {kind}."),
            suggestion: format!("Check the ID ({id}) and try again."),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        // -- Storage --
        AgripassError::Database(_) => HumanError {
            message: "The app's data storage had a problem.".into(),
            suggestion: "Try again in a moment. Your records should still be there.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        AgripassError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanError {
                    message: "The file couldn't be found.".into(),
                    suggestion: "It may have been moved or deleted. Check the path and try again.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else if io_err.kind() == std::io::ErrorKind::PermissionDenied {
                HumanError {
                    message: "The app doesn't have permission to use that file.".into(),
                    suggestion: "Check the file permissions, or copy the file somewhere else first.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else {
                HumanError {
                    message: "There was a problem reading or writing a file.".into(),
                    suggestion: "Try again. If this keeps happening, your device's storage may be full.".into(),
                    retriable: true,
                    severity: Severity::Transient,
                }
            }
        }

        AgripassError::Serialization(_) => HumanError {
            message: "The data isn't in the expected format.".into(),
            suggestion: "Check that the file contains valid JSON with the expected fields.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        AgripassError::Config(detail) => HumanError {
            message: "The app settings couldn't be loaded.".into(),
            suggestion: format!("Fix or delete the settings file and try again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },
    }
}

/// Annotation shown next to a credential or verdict that was produced
/// without the remote authority. `None` for authoritative results.
pub fn trust_notice(authority: Authority) -> Option<&'static str> {
    match authority {
        Authority::Remote => None,
        Authority::LocalFallback => Some(
            "Checked offline: the certification authority was unavailable, so this result is not authoritative.",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tamper_is_its_own_severity() {
        let err = AgripassError::IntegrityMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        };
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Tampered);
        assert!(!human.retriable);
    }

    #[test]
    fn gateway_outage_is_transient() {
        let human = humanize_error(&AgripassError::GatewayUnavailable("connection refused".into()));
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
    }

    #[test]
    fn bad_scan_is_action_required() {
        let human = humanize_error(&AgripassError::Decode("invalid base45".into()));
        assert_eq!(human.severity, Severity::ActionRequired);
    }

    #[test]
    fn only_fallback_gets_a_notice() {
        assert!(trust_notice(Authority::Remote).is_none());
        assert!(trust_notice(Authority::LocalFallback).is_some());
    }
}
