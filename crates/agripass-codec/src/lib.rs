// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// agripass-codec: offline QR token encoding. Structured records are packed
// as CBOR, deflated and written in base-45 so the result fits the QR
// alphanumeric mode.

pub mod base45;
pub mod compact;
pub mod token;

pub use compact::{DecodedToken, Record, TOKEN_PREFIX, TokenFormat, decode, encode};
pub use token::{CompactToken, StatusFlag};
