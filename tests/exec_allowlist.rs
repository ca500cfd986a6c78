//! Exec Allowlist Boundary Tests
//!
//! End-to-end verdicts through the public API against a fake bin tree:
//! default-deny, safe-bin satisfaction, allowlist bypass, PATH-shadowing,
//! and the fail-closed analysis paths.

#![cfg(unix)]

use clawgate::exec::{
    evaluate_shell_allowlist, AllowlistEntry, ExecOptions, SafeBinRegistry,
};
use clawgate::GuardConfig;
use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

fn fake_bin(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

struct BinTree {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl BinTree {
    fn new(bins: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for bin in bins {
            fake_bin(dir.path(), bin);
        }
        let root = dir.path().canonicalize().unwrap();
        Self { _dir: dir, root }
    }

    fn options(&self) -> ExecOptions {
        ExecOptions {
            trusted_dirs: vec![self.root.clone()],
            registry: SafeBinRegistry::builtin(),
            path_env: Some(self.root.as_os_str().to_os_string()),
            cwd: Some(self.root.clone()),
        }
    }
}

fn bins(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Default deny
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn unrecognized_command_is_denied_by_default() {
    let tree = BinTree::new(&["mystery-tool"]);
    let verdict =
        evaluate_shell_allowlist("mystery-tool --help", &[], &bins(&[]), &tree.options());
    assert!(verdict.analysis_ok);
    assert!(!verdict.allowlist_satisfied);
    assert_eq!(verdict.segment_satisfied_by, vec![None]);
}

#[test]
fn missing_binary_fails_analysis_and_denies() {
    let tree = BinTree::new(&[]);
    let verdict = evaluate_shell_allowlist("ghost", &[], &bins(&["ghost"]), &tree.options());
    assert!(!verdict.analysis_ok);
    assert!(!verdict.allowlist_satisfied);
}

// ─────────────────────────────────────────────────────────────────────────────
// Spec scenarios: safe-bin argument policy
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn jq_with_file_argument_is_denied() {
    let tree = BinTree::new(&["jq"]);
    let verdict = evaluate_shell_allowlist(
        "jq .foo secret.json",
        &[],
        &bins(&["jq"]),
        &tree.options(),
    );
    assert!(!verdict.allowlist_satisfied);
    assert_eq!(
        verdict.segments[0].denial.as_ref().unwrap().rule_id(),
        "exec.path-positional"
    );
}

#[test]
fn jq_on_piped_input_is_allowed() {
    let tree = BinTree::new(&["cat", "jq"]);
    let verdict = evaluate_shell_allowlist(
        "cat | jq -r .foo",
        &[],
        &bins(&["cat", "jq"]),
        &tree.options(),
    );
    assert!(verdict.allowlist_satisfied);
    assert_eq!(
        verdict.segment_satisfied_by,
        vec![
            Some("safe-bin:cat".to_string()),
            Some("safe-bin:jq".to_string())
        ]
    );
}

#[test]
fn sort_output_flag_is_denied_without_touching_fs() {
    // out.txt does not exist anywhere; the denial is about the flag.
    let tree = BinTree::new(&["sort"]);
    let verdict = evaluate_shell_allowlist(
        "sort -o out.txt",
        &[],
        &bins(&["sort"]),
        &tree.options(),
    );
    assert!(!verdict.allowlist_satisfied);
    assert_eq!(
        verdict.segments[0].denial.as_ref().unwrap().rule_id(),
        "exec.denied-flag"
    );
}

#[test]
fn wrapper_binaries_are_never_safe_bins() {
    let tree = BinTree::new(&["xargs"]);
    let verdict = evaluate_shell_allowlist(
        "xargs rm",
        &[],
        &bins(&["xargs"]),
        &tree.options(),
    );
    assert!(!verdict.allowlist_satisfied);
    assert_eq!(
        verdict.segments[0].denial.as_ref().unwrap().rule_id(),
        "exec.semantic-wrapper"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// PATH-shadowing
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn shadowed_safe_bin_in_untrusted_dir_is_denied() {
    let tree = BinTree::new(&["sort"]);
    let mut options = tree.options();
    options.trusted_dirs.clear();
    let verdict = evaluate_shell_allowlist("sort -u", &[], &bins(&["sort"]), &options);
    assert!(!verdict.allowlist_satisfied);
    assert_eq!(
        verdict.segments[0].denial.as_ref().unwrap().rule_id(),
        "exec.untrusted-dir"
    );
}

#[test]
fn earlier_untrusted_dir_shadows_trusted_copy() {
    // Two trees: the shadow dir comes first on PATH but only the second
    // is trusted. Resolution finds the shadow; policy denies it.
    let shadow = BinTree::new(&["sort"]);
    let trusted = BinTree::new(&["sort"]);
    let path_env = format!("{}:{}", shadow.root.display(), trusted.root.display());
    let options = ExecOptions {
        trusted_dirs: vec![trusted.root.clone()],
        registry: SafeBinRegistry::builtin(),
        path_env: Some(path_env.into()),
        cwd: Some(shadow.root.clone()),
    };
    let verdict = evaluate_shell_allowlist("sort -u", &[], &bins(&["sort"]), &options);
    assert!(!verdict.allowlist_satisfied);
    assert_eq!(
        verdict.segments[0].denial.as_ref().unwrap().rule_id(),
        "exec.untrusted-dir"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Operator allowlist
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn allowlisted_binary_runs_with_any_arguments() {
    let tree = BinTree::new(&["deploy-status"]);
    let pattern = tree.root.join("deploy-status").display().to_string();
    let verdict = evaluate_shell_allowlist(
        "deploy-status --env prod /etc/passwd",
        &[AllowlistEntry::new(pattern.clone())],
        &bins(&[]),
        &tree.options(),
    );
    assert!(verdict.allowlist_satisfied);
    assert_eq!(verdict.segment_satisfied_by[0].as_deref(), Some(pattern.as_str()));
}

#[test]
fn allowlist_applies_per_segment_not_per_command() {
    let tree = BinTree::new(&["deploy-status", "mystery"]);
    let pattern = tree.root.join("deploy-status").display().to_string();
    let verdict = evaluate_shell_allowlist(
        "deploy-status | mystery",
        &[AllowlistEntry::new(pattern)],
        &bins(&[]),
        &tree.options(),
    );
    assert!(!verdict.allowlist_satisfied);
    assert!(verdict.segment_satisfied_by[0].is_some());
    assert!(verdict.segment_satisfied_by[1].is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Fail-closed analysis
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn substitution_and_redirection_fail_closed() {
    let tree = BinTree::new(&["sort"]);
    for command in [
        "sort $(cat /etc/passwd)",
        "sort `id`",
        "sort > /etc/crontab",
        "sort < /etc/shadow",
        "sort & sort",
        "sort 'unterminated",
    ] {
        let verdict =
            evaluate_shell_allowlist(command, &[], &bins(&["sort"]), &tree.options());
        assert!(!verdict.analysis_ok, "command: {command}");
        assert!(!verdict.allowlist_satisfied, "command: {command}");
    }
}

#[test]
fn env_assignment_prefix_fails_closed() {
    let tree = BinTree::new(&["sort"]);
    let verdict = evaluate_shell_allowlist(
        "LD_PRELOAD=/tmp/evil.so sort",
        &[],
        &bins(&["sort"]),
        &tree.options(),
    );
    assert!(!verdict.analysis_ok);
    assert!(!verdict.allowlist_satisfied);
}

// ─────────────────────────────────────────────────────────────────────────────
// Config-driven evaluation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn config_profiles_and_allowlist_flow_through() {
    let tree = BinTree::new(&["yq"]);
    let raw = format!(
        r#"
[exec]
safe_bins = ["yq"]
trusted_dirs = ["{}"]

[[exec.profiles]]
name = "yq"
max_positional = 1
allowed_short_flags = ["r"]
"#,
        tree.root.display()
    );
    let config = GuardConfig::from_toml_str(&raw).unwrap();
    let mut options = config.exec_options();
    options.path_env = Some(tree.root.as_os_str().to_os_string());
    options.cwd = Some(tree.root.clone());

    let verdict = evaluate_shell_allowlist(
        "yq -r .spec",
        &config.exec_allowlist(),
        &config.safe_bins(),
        &options,
    );
    assert!(verdict.allowlist_satisfied);

    let verdict = evaluate_shell_allowlist(
        "yq -r .spec values.yaml",
        &config.exec_allowlist(),
        &config.safe_bins(),
        &options,
    );
    assert!(!verdict.allowlist_satisfied);
}
