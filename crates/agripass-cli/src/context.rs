// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Opens the databases, loads configuration and wires the certification
// service for one command invocation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agripass_certify::{CertificationService, SqliteStore};
use agripass_core::config::AppConfig;
use agripass_core::error::Result;
use agripass_gateway::{CredentialGateway, CredentialTransport, HttpTransport, OfflineTransport};
use agripass_security::AuditLog;
use tracing::{debug, info, warn};

const CONFIG_FILE: &str = "config.json";
const RECORDS_DB: &str = "records.db";
const AUDIT_DB: &str = "audit.db";

pub const CERTIFY_URL_VAR: &str = "AGRIPASS_CERTIFY_URL";
pub const VERIFY_URL_VAR: &str = "AGRIPASS_VERIFY_URL";

pub struct AppContext {
    pub data_dir: PathBuf,
    pub config: AppConfig,
    pub audit: Arc<AuditLog>,
    pub service: CertificationService<SqliteStore>,
}

impl AppContext {
    /// Create the data directory if needed and open everything in it.
    ///
    /// With `offline` the remote authority is never contacted and every
    /// gateway call takes the local fallback.
    pub fn init(data_dir: PathBuf, offline: bool) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        info!(path = %data_dir.display(), offline, "opening agripass data directory");

        let mut config = load_config(&data_dir).unwrap_or_default();
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());

        let transport: Arc<dyn CredentialTransport> = if offline {
            Arc::new(OfflineTransport)
        } else {
            Arc::new(HttpTransport::new(&config.authority)?)
        };
        let gateway = CredentialGateway::from_config(transport, &config.authority);

        let store = SqliteStore::open(data_dir.join(RECORDS_DB))?;
        let audit = Arc::new(AuditLog::open(data_dir.join(AUDIT_DB))?);
        let service =
            CertificationService::new(store, gateway, config.clone()).with_audit(audit.clone());

        Ok(Self {
            data_dir,
            config,
            audit,
            service,
        })
    }

    pub fn save_config(&self) -> Result<()> {
        persist_config(&self.data_dir, &self.config)
    }
}

/// Read `config.json`. A missing or malformed file yields `None`.
pub fn load_config(data_dir: &Path) -> Option<AppConfig> {
    let path = data_dir.join(CONFIG_FILE);
    let data = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed config file");
            None
        }
    }
}

pub fn persist_config(data_dir: &Path, config: &AppConfig) -> Result<()> {
    let path = data_dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

/// Authority URLs from the environment take precedence over the file.
pub fn apply_env_overrides(config: &mut AppConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(url) = var(CERTIFY_URL_VAR).filter(|v| !v.trim().is_empty()) {
        debug!(url = %url, "certify url from environment");
        config.authority.certify_url = url;
    }
    if let Some(url) = var(VERIFY_URL_VAR).filter(|v| !v.trim().is_empty()) {
        debug!(url = %url, "verify url from environment");
        config.authority.verify_url = url;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_the_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(dir.path()).is_none());

        let config = AppConfig {
            issuer_name: "Kenya Plant Health Inspectorate".into(),
            default_validity_days: 180,
            ..AppConfig::default()
        };
        persist_config(dir.path(), &config).unwrap();
        assert_eq!(load_config(dir.path()), Some(config));
    }

    #[test]
    fn malformed_config_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();
        assert!(load_config(dir.path()).is_none());
    }

    #[test]
    fn environment_overrides_authority_urls() {
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |key| match key {
            CERTIFY_URL_VAR => Some("http://inji-certify:8090".into()),
            VERIFY_URL_VAR => Some("  ".into()),
            _ => None,
        });
        assert_eq!(config.authority.certify_url, "http://inji-certify:8090");
        assert_eq!(config.authority.verify_url, AppConfig::default().authority.verify_url);
    }

    #[test]
    fn offline_context_opens_in_a_fresh_directory() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested").join("agripass");
        let ctx = AppContext::init(data_dir.clone(), true).unwrap();
        assert_eq!(ctx.service.gateway().transport_name(), "offline");
        assert!(data_dir.join(RECORDS_DB).exists());
        assert!(data_dir.join(AUDIT_DB).exists());
    }
}
