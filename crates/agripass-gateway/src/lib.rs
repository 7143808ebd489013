// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// agripass-gateway: issuance and verification of Verifiable Credentials
// through a remote authority, degrading to local unsigned results when the
// authority is unreachable.

pub mod credential;
pub mod fallback;
pub mod gateway;
pub mod transport;
pub mod verdict;

pub use credential::{IssueResponse, Issuer, Proof, VerifiableCredential, build_passport, issuer_identity};
pub use gateway::{CredentialGateway, IssuanceOutcome};
pub use transport::{CredentialTransport, HttpTransport, OfflineTransport};
pub use verdict::{CheckOutcome, Verdict, VerdictDetails, VerifyResponse};
