// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Base-45 (RFC 9285). Every output character is in the QR alphanumeric set,
// so tokens pack at 5.5 bits per character in a QR code.

use agripass_core::error::{AgripassError, Result};

/// The 45-character alphabet, in value order.
pub const ALPHABET: &[u8; 45] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ $%*+-./:";

const BASE: u32 = 45;

fn value_of(c: u8) -> Option<u32> {
    ALPHABET.iter().position(|&a| a == c).map(|p| p as u32)
}

/// Encode bytes as base-45. Two bytes become three characters, a trailing
/// single byte becomes two.
pub fn encode(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len().div_ceil(2) * 3);
    for chunk in input.chunks(2) {
        let n = chunk
            .iter()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
        let digits = chunk.len() + 1;
        let mut rest = n;
        for _ in 0..digits {
            out.push(char::from(ALPHABET[(rest % BASE) as usize]));
            rest /= BASE;
        }
    }
    out
}

/// Decode a base-45 string.
///
/// Fails on characters outside the alphabet (lowercase included), a dangling
/// single character, and groups whose value overflows their byte width.
pub fn decode(input: &str) -> Result<Vec<u8>> {
    let raw = input.as_bytes();
    let mut out = Vec::with_capacity(raw.len() / 3 * 2 + 1);

    for (index, group) in raw.chunks(3).enumerate() {
        let mut n = 0u32;
        let mut weight = 1u32;
        for &c in group {
            let v = value_of(c).ok_or_else(|| {
                AgripassError::Decode(format!(
                    "invalid base45 character {:?} in group {index}",
                    char::from(c)
                ))
            })?;
            n += v * weight;
            weight *= BASE;
        }

        match group.len() {
            3 if n <= 0xFFFF => out.extend_from_slice(&[(n >> 8) as u8, (n & 0xFF) as u8]),
            2 if n <= 0xFF => out.push(n as u8),
            1 => {
                return Err(AgripassError::Decode(
                    "base45 input has a dangling single character".into(),
                ));
            }
            _ => {
                return Err(AgripassError::Decode(format!(
                    "base45 group {index} overflows ({n})"
                )));
            }
        }
    }
    Ok(out)
}
