//! Command handler modules for mxr-cli.
//!
//! Shared utilities used by multiple command paths live here.

pub mod reconcile;

use anyhow::Result;
use mxr_config::LoadedConfig;

/// Load layered config from `paths`; no paths means all defaults.
pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    if paths.is_empty() {
        return mxr_config::load_layered_yaml_from_strings(&[]);
    }
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    mxr_config::load_layered_yaml(&path_refs)
}

/// CLI flag wins over the config value; blank values count as absent.
pub fn pick(flag: Option<String>, config: Option<String>, what: &str) -> Result<String> {
    flag.or(config)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("{what} is required: pass --{what} or set reconcile.{what} in config"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_beats_config() {
        let v = pick(Some("a".into()), Some("b".into()), "pool").unwrap();
        assert_eq!(v, "a");
    }

    #[test]
    fn config_used_when_flag_absent() {
        let v = pick(None, Some("b".into()), "pool").unwrap();
        assert_eq!(v, "b");
    }

    #[test]
    fn blank_is_missing() {
        let err = pick(Some("  ".into()), None, "product").unwrap_err();
        assert!(err.to_string().contains("--product"));
    }
}
