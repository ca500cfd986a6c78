//! Exec allowlist evaluation.
//!
//! Combines lexer output, an operator-supplied literal allowlist, and the
//! safe-bin registry into a per-segment, per-command verdict. Validation
//! follows a strict precedence order per segment:
//!   1. operator allowlist on the resolved path (trust with any arguments)
//!   2. semantic-wrapper flag (never satisfiable by a profile)
//!   3. safe-bin membership + trusted location + profile validation
//! Deny-by-default: a segment that clears none of these is the reason the
//! whole command is denied.

use super::lexer::{lex_command, LexedSegment};
use super::profile::SafeBinRegistry;
use super::resolver::{is_trusted_location, resolve_executable, ExecutableResolution};
use super::ExecDenial;
use serde::Serialize;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::PathBuf;

/// Evaluation environment: trusted directories, the profile registry, and
/// the search path. Constructed per call site, never mutated after
/// construction, so concurrent evaluations cannot interfere.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Directories trusted in addition to the standard system set.
    pub trusted_dirs: Vec<PathBuf>,
    /// Safe-bin profiles (defaults plus operator overrides).
    pub registry: SafeBinRegistry,
    /// Search path override; `None` uses the process `PATH`.
    pub path_env: Option<OsString>,
    /// Working directory override; `None` uses the process cwd.
    pub cwd: Option<PathBuf>,
}

impl ExecOptions {
    fn cwd(&self) -> PathBuf {
        self.cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// An operator-granted exact trust for one resolved binary path. Matched
/// against the canonicalized resolved path, exact or simple glob, and
/// bypasses safe-bin profile checks entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowlistEntry {
    pub pattern: String,
}

impl AllowlistEntry {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    fn matches(&self, resolved: &std::path::Path) -> bool {
        match glob::Pattern::new(&self.pattern) {
            Ok(pattern) => pattern.matches_path(resolved),
            Err(err) => {
                tracing::warn!(pattern = %self.pattern, %err, "ignoring malformed allowlist pattern");
                false
            }
        }
    }
}

/// Structural analysis of a command: either every segment lexed and
/// resolved (`ok`), or the analysis failed closed and no policy is
/// evaluated on top of it.
#[derive(Debug, Clone, Serialize)]
pub struct CommandAnalysis {
    pub ok: bool,
    pub segments: Vec<CommandSegment>,
    /// Populated when lexing failed; `None` when only resolution failed.
    pub parse_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandSegment {
    pub raw: String,
    pub argv: Vec<String>,
    /// `None` when the executable could not be resolved.
    pub resolution: Option<ExecutableResolution>,
}

/// The overall verdict plus per-segment detail for audit logging.
/// `allowlist_satisfied == true` implies every entry in
/// `segment_satisfied_by` is `Some`.
#[derive(Debug, Clone, Serialize)]
pub struct AllowlistVerdict {
    pub analysis_ok: bool,
    pub allowlist_satisfied: bool,
    pub segments: Vec<SegmentVerdict>,
    /// Which rule cleared each segment: an allowlist pattern, or
    /// `safe-bin:<name>`. `None` marks the segment that caused the deny.
    pub segment_satisfied_by: Vec<Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentVerdict {
    pub raw: String,
    pub argv: Vec<String>,
    pub resolution: Option<ExecutableResolution>,
    pub satisfied_by: Option<String>,
    pub denial: Option<ExecDenial>,
}

/// Tokenize a command and resolve every segment's executable.
pub fn analyze_command(command: &str, options: &ExecOptions) -> CommandAnalysis {
    let lexed = match lex_command(command) {
        Ok(lexed) => lexed,
        Err(err) => {
            tracing::debug!(%err, "command failed structural analysis");
            return CommandAnalysis {
                ok: false,
                segments: Vec::new(),
                parse_error: Some(err.to_string()),
            };
        }
    };

    let cwd = options.cwd();
    let mut ok = true;
    let segments = lexed
        .segments
        .into_iter()
        .map(|LexedSegment { raw, argv }| {
            let resolution =
                resolve_executable(&argv[0], options.path_env.as_deref(), &cwd).ok();
            ok &= resolution.is_some();
            CommandSegment {
                raw,
                argv,
                resolution,
            }
        })
        .collect();

    CommandAnalysis {
        ok,
        segments,
        parse_error: None,
    }
}

/// Evaluate a raw command string. See [`evaluate_exec_allowlist`] for the
/// evaluation itself; this entry point runs the analysis first.
pub fn evaluate_shell_allowlist(
    command: &str,
    allowlist: &[AllowlistEntry],
    safe_bins: &HashSet<String>,
    options: &ExecOptions,
) -> AllowlistVerdict {
    let analysis = analyze_command(command, options);
    evaluate_exec_allowlist(&analysis, allowlist, safe_bins, options)
}

/// Evaluate a pre-tokenized analysis against the allowlist and the
/// safe-bin policy.
pub fn evaluate_exec_allowlist(
    analysis: &CommandAnalysis,
    allowlist: &[AllowlistEntry],
    safe_bins: &HashSet<String>,
    options: &ExecOptions,
) -> AllowlistVerdict {
    let segments: Vec<SegmentVerdict> = analysis
        .segments
        .iter()
        .map(|segment| {
            let (satisfied_by, denial) = if analysis.ok {
                evaluate_segment(segment, allowlist, safe_bins, options)
            } else {
                // An unparsable or unresolvable command is never
                // partially trusted.
                (None, Some(ExecDenial::UnresolvedExecutable))
            };
            if let Some(denial) = &denial {
                tracing::debug!(
                    segment = %segment.raw,
                    rule = denial.rule_id(),
                    "segment denied"
                );
            }
            SegmentVerdict {
                raw: segment.raw.clone(),
                argv: segment.argv.clone(),
                resolution: segment.resolution.clone(),
                satisfied_by,
                denial,
            }
        })
        .collect();

    let segment_satisfied_by: Vec<Option<String>> = segments
        .iter()
        .map(|s| s.satisfied_by.clone())
        .collect();
    let allowlist_satisfied = analysis.ok
        && !segments.is_empty()
        && segment_satisfied_by.iter().all(Option::is_some);

    AllowlistVerdict {
        analysis_ok: analysis.ok,
        allowlist_satisfied,
        segments,
        segment_satisfied_by,
    }
}

fn evaluate_segment(
    segment: &CommandSegment,
    allowlist: &[AllowlistEntry],
    safe_bins: &HashSet<String>,
    options: &ExecOptions,
) -> (Option<String>, Option<ExecDenial>) {
    let Some(resolution) = &segment.resolution else {
        return (None, Some(ExecDenial::UnresolvedExecutable));
    };

    // Operator allowlist first: explicit trust for this exact binary,
    // with any arguments. Stronger than any heuristic below.
    if let Some(entry) = allowlist
        .iter()
        .find(|entry| entry.matches(&resolution.resolved_path))
    {
        return (Some(entry.pattern.clone()), None);
    }

    let name = &resolution.executable_name;

    if resolution.policy_blocked {
        return (
            None,
            Some(ExecDenial::SemanticWrapper { name: name.clone() }),
        );
    }

    if !safe_bins.contains(name) {
        return (None, Some(ExecDenial::NotSafeListed { name: name.clone() }));
    }

    let Some(profile) = options.registry.get(name) else {
        return (None, Some(ExecDenial::MissingProfile { name: name.clone() }));
    };

    // A known-safe name from an untrusted directory is a look-alike, not
    // a safe-bin.
    if !is_trusted_location(&resolution.resolved_path, &options.trusted_dirs) {
        return (
            None,
            Some(ExecDenial::UntrustedDirectory {
                path: resolution.resolved_path.display().to_string(),
            }),
        );
    }

    match profile.validate_args(&segment.argv[1..]) {
        Ok(()) => (Some(format!("safe-bin:{name}")), None),
        Err(denial) => (None, Some(denial)),
    }
}
