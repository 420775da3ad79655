//! Runtime secret resolution.
//!
//! Config YAML stores only **env var NAMES**. Callers resolve them once at
//! startup and pass the result into constructors. `Debug` output redacts
//! values, and error messages name the variable, never its value.

use anyhow::{bail, Result};

use crate::MxrConfig;

/// Exchange API credentials, all three present.
/// **Values are redacted in `Debug` output.**
#[derive(Clone)]
pub struct ExchangeCredentials {
    pub api_key: String,
    /// Base64-encoded signing secret as issued by the exchange.
    pub api_secret: String,
    pub passphrase: String,
}

impl std::fmt::Debug for ExchangeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeCredentials")
            .field("api_key", &"<REDACTED>")
            .field("api_secret", &"<REDACTED>")
            .field("passphrase", &"<REDACTED>")
            .finish()
    }
}

/// Everything the reconciler reads from the environment.
/// **Values are redacted in `Debug` output.**
#[derive(Clone)]
pub struct ResolvedSecrets {
    pub exchange_api_key: Option<String>,
    pub exchange_api_secret: Option<String>,
    pub exchange_passphrase: Option<String>,
    pub database_url: Option<String>,
    names: MxrConfig,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "exchange_api_key",
                &self.exchange_api_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "exchange_api_secret",
                &self.exchange_api_secret.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "exchange_passphrase",
                &self.exchange_passphrase.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

impl ResolvedSecrets {
    /// All three exchange credentials, or an error naming the first
    /// missing env var.
    pub fn require_exchange(&self) -> Result<ExchangeCredentials> {
        let keys = &self.names.exchange.keys_env;
        let api_key = required(&self.exchange_api_key, &keys.api_key, "exchange api_key")?;
        let api_secret =
            required(&self.exchange_api_secret, &keys.api_secret, "exchange api_secret")?;
        let passphrase =
            required(&self.exchange_passphrase, &keys.passphrase, "exchange passphrase")?;
        Ok(ExchangeCredentials {
            api_key,
            api_secret,
            passphrase,
        })
    }

    pub fn require_database_url(&self) -> Result<String> {
        required(&self.database_url, &self.names.db.url_env, "database url")
    }
}

fn required(value: &Option<String>, var_name: &str, what: &str) -> Result<String> {
    match value {
        Some(v) => Ok(v.clone()),
        None => bail!("SECRETS_MISSING: required env var '{var_name}' ({what}) is not set or empty"),
    }
}

/// Resolve a named environment variable. `None` if unset or blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Read every secret the config names. Missing values are `None`; use the
/// `require_*` accessors to enforce presence where it matters.
pub fn resolve_secrets(cfg: &MxrConfig) -> ResolvedSecrets {
    let keys = &cfg.exchange.keys_env;
    ResolvedSecrets {
        exchange_api_key: resolve_env(&keys.api_key),
        exchange_api_secret: resolve_env(&keys.api_secret),
        exchange_passphrase: resolve_env(&keys.passphrase),
        database_url: resolve_env(&cfg.db.url_env),
        names: cfg.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_redacts_every_field() {
        let c = ExchangeCredentials {
            api_key: "key-value".to_string(),
            api_secret: "c2VjcmV0".to_string(),
            passphrase: "pass-value".to_string(),
        };
        let s = format!("{c:?}");
        assert!(!s.contains("key-value"));
        assert!(!s.contains("c2VjcmV0"));
        assert!(!s.contains("pass-value"));
    }
}
