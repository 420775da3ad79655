use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

pub mod secrets;

/// Known secret-like prefixes. If any leaf string value in the effective
/// config starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // OpenAI style
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "glpat-",     // GitLab PAT
    "postgres://",
    "postgresql://",
];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view with defaults filled in.
    pub fn typed(&self) -> Result<MxrConfig> {
        MxrConfig::from_json(&self.config_json)
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

/// Merge YAML docs in order: earlier docs are base, later docs override.
pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        // An empty document parses to null; treat it as "no overrides".
        if v_yaml.is_null() {
            continue;
        }
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

// serde_json::Map is BTreeMap-backed here (no preserve_order), so key order
// in the serialized form is sorted regardless of YAML input order.
fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(v).context("canonical json serialize failed")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

/// JSON-pointer prefixes the reconciler actually reads. Keep in sync with
/// [`MxrConfig`].
pub const CONSUMED_POINTERS: &[&str] = &[
    "/reconcile/pool",
    "/reconcile/product",
    "/exchange/base_url",
    "/exchange/timeout_secs",
    "/exchange/page_limit",
    "/exchange/keys_env",
    "/db/url_env",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Minimal set of unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Leaves not covered by [`CONSUMED_POINTERS`].
/// With `UnusedKeyPolicy::Fail` a non-empty report is an error.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<&str> = CONSUMED_POINTERS.iter().copied().collect();

    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|lp| lp != "/" && !consumed.iter().any(|cp| is_prefix_pointer(cp, lp)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s) detected: {:?}",
            report.unused_leaf_pointers.len(),
            report.unused_leaf_pointers.iter().take(12).collect::<Vec<_>>()
        );
    }

    Ok(report)
}

/// "/a/b" consumes "/a/b" and "/a/b/c" but not "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    leaf == prefix
        || (leaf.starts_with(prefix) && leaf.as_bytes().get(prefix.len()) == Some(&b'/'))
}

// ---------------------------------------------------------------------------
// Typed view
// ---------------------------------------------------------------------------

pub const DEFAULT_EXCHANGE_BASE_URL: &str = "https://api.exchange.coinbase.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PAGE_LIMIT: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MxrConfig {
    pub reconcile: ReconcileSection,
    pub exchange: ExchangeSection,
    pub db: DbSection,
}

/// Both fields may be overridden by CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSection {
    pub pool: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSection {
    pub base_url: String,
    pub timeout_secs: u64,
    pub page_limit: usize,
    pub keys_env: ExchangeKeysEnv,
}

impl Default for ExchangeSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EXCHANGE_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            page_limit: DEFAULT_PAGE_LIMIT,
            keys_env: ExchangeKeysEnv::default(),
        }
    }
}

/// Env var NAMES holding the exchange credentials. Never the values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeKeysEnv {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

impl Default for ExchangeKeysEnv {
    fn default() -> Self {
        Self {
            api_key: "MXR_EXCHANGE_API_KEY".to_string(),
            api_secret: "MXR_EXCHANGE_API_SECRET".to_string(),
            passphrase: "MXR_EXCHANGE_PASSPHRASE".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbSection {
    /// Env var NAME holding the Postgres URL.
    pub url_env: String,
}

impl Default for DbSection {
    fn default() -> Self {
        Self {
            url_env: "MXR_DATABASE_URL".to_string(),
        }
    }
}

impl MxrConfig {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: MxrConfig =
            serde_json::from_value(config_json.clone()).context("config does not match schema")?;
        if cfg.exchange.timeout_secs == 0 {
            bail!("exchange.timeout_secs must be > 0");
        }
        if cfg.exchange.base_url.trim().is_empty() {
            bail!("exchange.base_url must not be empty");
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_merge_overrides_leaves_and_keeps_siblings() {
        let a = serde_json::json!({"x": {"a": 1, "b": 2}, "y": 1});
        let b = serde_json::json!({"x": {"b": 3}});
        let m = deep_merge(a, b);
        assert_eq!(m, serde_json::json!({"x": {"a": 1, "b": 3}, "y": 1}));
    }

    #[test]
    fn prefix_pointer_respects_token_boundary() {
        assert!(is_prefix_pointer("/exchange/keys_env", "/exchange/keys_env/api_key"));
        assert!(!is_prefix_pointer("/db/url", "/db/url_env"));
    }

    #[test]
    fn empty_config_yields_defaults() {
        let cfg = MxrConfig::from_json(&serde_json::json!({})).unwrap();
        assert_eq!(cfg.exchange.base_url, DEFAULT_EXCHANGE_BASE_URL);
        assert_eq!(cfg.db.url_env, "MXR_DATABASE_URL");
        assert_eq!(cfg.reconcile.pool, None);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let v = serde_json::json!({"exchange": {"timeout_secs": 0}});
        assert!(MxrConfig::from_json(&v).is_err());
    }
}
