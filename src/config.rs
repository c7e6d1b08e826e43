use anyhow::{Context, Result};

use crate::ally::DEFAULT_BASE_URL;

#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    /// Devices to report status for. Empty means every device on the account.
    /// Format: `"id1,id2"`.
    pub device_ids: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .with_context(|| format!("missing required env var: {key}"))
        };
        let optional = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        Ok(Self {
            client_id: required("DANFOSS_CLIENT_ID")?,
            client_secret: required("DANFOSS_CLIENT_SECRET")?,
            base_url: optional("DANFOSS_BASE_URL", DEFAULT_BASE_URL),
            device_ids: parse_device_ids(&optional("DANFOSS_DEVICE_IDS", "")),
        })
    }
}

/// Parse `"id1, id2,,id3"` into trimmed, non-empty ids.
fn parse_device_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_vars_absent() {
        let config = Config::from_lookup(lookup(&[
            ("DANFOSS_CLIENT_ID", "id"),
            ("DANFOSS_CLIENT_SECRET", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.client_id, "id");
        assert_eq!(config.client_secret, "secret");
        assert_eq!(config.base_url, "https://api.danfoss.com");
        assert!(config.device_ids.is_empty());
    }

    #[test]
    fn missing_secret_errors() {
        let err = Config::from_lookup(lookup(&[("DANFOSS_CLIENT_ID", "id")])).unwrap_err();
        assert!(err.to_string().contains("DANFOSS_CLIENT_SECRET"));
    }

    #[test]
    fn empty_client_id_counts_as_missing() {
        let err = Config::from_lookup(lookup(&[
            ("DANFOSS_CLIENT_ID", ""),
            ("DANFOSS_CLIENT_SECRET", "secret"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DANFOSS_CLIENT_ID"));
    }

    #[test]
    fn parse_device_ids_trims_and_skips_empty() {
        assert!(parse_device_ids("").is_empty());
        assert_eq!(parse_device_ids("aaa, bbb,,ccc "), vec!["aaa", "bbb", "ccc"]);
    }
}
