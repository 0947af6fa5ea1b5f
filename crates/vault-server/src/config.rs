use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
    pub storage_dir: PathBuf,
    pub bucket: String,
    /// Public alias avatars are served from.
    pub public_base_url: String,
    /// Base of presigned object URLs.
    pub object_base_url: String,
    pub presign_secret: String,
    /// Shared secret required on `POST /events` when set.
    pub ingest_token: Option<String>,
    pub record_timeout: Duration,
    pub batch_size: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source. Empty values count as unset.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| get(name).filter(|v| !v.trim().is_empty());
        let or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.into());

        let jwt_secret = var("VAULT_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("VAULT_JWT_SECRET is unset or still a placeholder");
        }

        Ok(Self {
            host: or("VAULT_HOST", "0.0.0.0"),
            port: parsed(&var, "VAULT_PORT", 3000)?,
            db_path: or("VAULT_DB_PATH", "vault.db").into(),
            access_token_ttl: chrono::Duration::minutes(parsed(&var, "VAULT_AUTH_TOKEN_MINUTES", 180)?),
            refresh_token_ttl: chrono::Duration::minutes(parsed(&var, "VAULT_REFRESH_TOKEN_MINUTES", 100_800)?),
            storage_dir: or("VAULT_STORAGE_DIR", "./object-storage").into(),
            bucket: or("VAULT_BUCKET", "vault-attachments"),
            public_base_url: or("VAULT_PUBLIC_BASE_URL", "http://localhost:3000/public"),
            object_base_url: or("VAULT_OBJECT_BASE_URL", "http://localhost:3000/objects"),
            presign_secret: var("VAULT_PRESIGN_SECRET").unwrap_or_else(|| jwt_secret.clone()),
            ingest_token: var("VAULT_INGEST_TOKEN"),
            record_timeout: Duration::from_secs(parsed(&var, "VAULT_INGEST_RECORD_TIMEOUT_SECS", 30)?),
            batch_size: parsed(&var, "VAULT_INGEST_BATCH_SIZE", 32)?,
            jwt_secret,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn parsed<T>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(raw) => raw.trim().parse().with_context(|| format!("{name} has an invalid value: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let config = config(&[("VAULT_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.bucket, "vault-attachments");
        assert_eq!(config.presign_secret, "s3cret");
        assert_eq!(config.access_token_ttl, chrono::Duration::minutes(180));
        assert_eq!(config.refresh_token_ttl, chrono::Duration::minutes(100_800));
        assert_eq!(config.record_timeout, Duration::from_secs(30));
        assert_eq!(config.batch_size, 32);
        assert!(config.ingest_token.is_none());
        assert_eq!(config.addr().unwrap().port(), 3000);
    }

    #[test]
    fn placeholder_or_missing_secret_is_rejected() {
        assert!(config(&[]).is_err());
        assert!(config(&[("VAULT_JWT_SECRET", "dev-secret-change-me")]).is_err());
        assert!(config(&[("VAULT_JWT_SECRET", "  ")]).is_err());
    }

    #[test]
    fn overrides_and_bad_numbers() {
        let overridden = config(&[
            ("VAULT_JWT_SECRET", "s3cret"),
            ("VAULT_PRESIGN_SECRET", "other"),
            ("VAULT_PORT", "8080"),
            ("VAULT_INGEST_TOKEN", "tok"),
        ])
        .unwrap();
        assert_eq!(overridden.port, 8080);
        assert_eq!(overridden.presign_secret, "other");
        assert_eq!(overridden.ingest_token.as_deref(), Some("tok"));

        let err = config(&[("VAULT_JWT_SECRET", "s3cret"), ("VAULT_PORT", "http")]).unwrap_err();
        assert!(err.to_string().contains("VAULT_PORT"));
    }
}
