// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::path::PathBuf;

/// `$XDG_DATA_HOME/agripass`, else `~/.local/share/agripass`.
///
/// Not created here; `AppContext::init` creates it on first use.
pub fn default_data_dir() -> PathBuf {
    base_dir(|key| std::env::var(key).ok()).join("agripass")
}

fn base_dir(var: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(xdg) = var("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg);
    }
    if let Some(home) = var("HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}
