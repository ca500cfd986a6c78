//! Declarative configuration for both gate engines.
//!
//! A `GuardConfig` is what an operator ships in TOML and what a tool
//! boundary converts into the evaluation inputs (`ExecOptions` +
//! allowlist + safe-bin set, and an `SsrfPolicy`). Defaults deny
//! everything: no safe bins enabled, no allowlisted binaries, no
//! hostname allowlist relaxations.

use crate::exec::{AllowlistEntry, ExecOptions, SafeBinProfile, SafeBinRegistry};
use crate::net::SsrfPolicy;
use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GuardConfig {
    pub exec: ExecConfig,
    pub ssrf: SsrfPolicy,
}

/// `[exec]` section: which binaries may run unattended and from where.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ExecConfig {
    /// Safe-bin names enabled for this deployment. A name with no
    /// profile (built-in or supplied below) still denies.
    pub safe_bins: Vec<String>,
    /// Resolved-path patterns (exact or simple glob) trusted with any
    /// arguments.
    pub allowlist: Vec<String>,
    /// Directories trusted in addition to the standard system set.
    pub trusted_dirs: Vec<PathBuf>,
    /// Whole-profile overrides and additions, keyed by `name`.
    pub profiles: Vec<SafeBinProfile>,
}

impl GuardConfig {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("invalid guard config")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// Evaluation environment derived from the `[exec]` section.
    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            trusted_dirs: self.exec.trusted_dirs.clone(),
            registry: SafeBinRegistry::builtin().with_overrides(self.exec.profiles.clone()),
            path_env: None,
            cwd: None,
        }
    }

    pub fn exec_allowlist(&self) -> Vec<AllowlistEntry> {
        self.exec
            .allowlist
            .iter()
            .map(|pattern| AllowlistEntry::new(pattern.clone()))
            .collect()
    }

    pub fn safe_bins(&self) -> HashSet<String> {
        self.exec.safe_bins.iter().cloned().collect()
    }

    pub fn ssrf_policy(&self) -> SsrfPolicy {
        self.ssrf.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_deny_everything() {
        let config = GuardConfig::default();
        assert!(config.exec.safe_bins.is_empty());
        assert!(config.exec.allowlist.is_empty());
        assert!(!config.ssrf.allow_private_network);
        assert!(config.ssrf.hostname_allowlist.is_empty());
    }

    #[test]
    fn parses_full_config() {
        let raw = r#"
[exec]
safe_bins = ["jq", "sort"]
allowlist = ["/usr/local/bin/deploy-status"]
trusted_dirs = ["/opt/tools/bin"]

[[exec.profiles]]
name = "yq"
max_positional = 1

[ssrf]
allow_private_network = true
hostname_allowlist = ["*.example.com", "api.internal.example"]
"#;
        let config = GuardConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.exec.safe_bins, vec!["jq", "sort"]);
        assert_eq!(config.exec.trusted_dirs, vec![PathBuf::from("/opt/tools/bin")]);
        assert!(config.ssrf.allow_private_network);

        let options = config.exec_options();
        assert!(options.registry.get("yq").is_some());
        assert!(options.registry.get("jq").is_some());
    }

    #[test]
    fn unknown_keys_parse_without_error() {
        let raw = r#"
totally_unknown_key = "ignored"

[exec]
safe_bins = ["jq"]
future_field = 42
"#;
        let config = GuardConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.exec.safe_bins, vec!["jq"]);
    }

    #[test]
    fn wrong_type_fails_to_parse() {
        let raw = r#"
[ssrf]
allow_private_network = "yes"
"#;
        assert!(GuardConfig::from_toml_str(raw).is_err());
    }

    #[test]
    fn profile_override_replaces_builtin() {
        let raw = r#"
[[exec.profiles]]
name = "sort"
max_positional = 3
allow_path_positionals = true
"#;
        let config = GuardConfig::from_toml_str(raw).unwrap();
        let options = config.exec_options();
        let sort = options.registry.get("sort").unwrap();
        assert_eq!(sort.max_positional, Some(3));
        assert!(sort.denied_long_flags.is_empty());
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = GuardConfig::from_toml_str("").unwrap();
        assert_eq!(config, GuardConfig::default());
    }
}
