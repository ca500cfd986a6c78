//! Shell-command safety analyzer and allowlist evaluator.
//!
//! Decides whether a command line may execute without human approval.
//! The pipeline is: quote-aware lexing ([`lexer`]) → executable
//! resolution with wrapper flagging ([`resolver`]) → per-segment
//! satisfaction via an operator allowlist or a safe-bin profile
//! ([`profile`], [`evaluator`]). Anything not positively recognized is
//! denied; the caller is expected to turn a denial into a human approval
//! prompt, never into a retry.

pub mod evaluator;
pub mod lexer;
pub mod profile;
pub mod resolver;

pub use evaluator::{
    analyze_command, evaluate_exec_allowlist, evaluate_shell_allowlist, AllowlistEntry,
    AllowlistVerdict, CommandAnalysis, CommandSegment, ExecOptions, SegmentVerdict,
};
pub use lexer::{lex_command, LexedCommand, LexedSegment, ParseError};
pub use profile::{SafeBinProfile, SafeBinRegistry};
pub use resolver::{
    is_trusted_location, resolve_executable, ExecutableResolution, ResolveExecutableError,
    SEMANTIC_WRAPPERS, SYSTEM_TRUSTED_DIRS,
};

use serde::Serialize;

/// Why a segment failed to satisfy the allowlist. Each variant carries a
/// stable rule identifier for audit logging; the `Display` form is the
/// human-readable rationale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "rule", content = "detail")]
pub enum ExecDenial {
    #[error("executable could not be resolved")]
    UnresolvedExecutable,
    #[error("'{name}' re-interprets its arguments as another program")]
    SemanticWrapper { name: String },
    #[error("'{path}' is outside the trusted directories")]
    UntrustedDirectory { path: String },
    #[error("'{name}' is not an enabled safe binary")]
    NotSafeListed { name: String },
    #[error("no safe-bin profile for '{name}'")]
    MissingProfile { name: String },
    #[error("flag '{flag}' is denied for '{bin}'")]
    DeniedFlag { bin: String, flag: String },
    #[error("flag '{flag}' is not known to the '{bin}' profile")]
    UnknownFlag { bin: String, flag: String },
    #[error("abbreviation '{flag}' is ambiguous for '{bin}'")]
    AmbiguousFlag { bin: String, flag: String },
    #[error("flag '{flag}' is missing its value")]
    MissingFlagValue { bin: String, flag: String },
    #[error("positional argument '{arg}' looks like a filesystem path")]
    PathPositional { bin: String, arg: String },
    #[error("too many positional arguments for '{bin}' ({count} > {max})")]
    TooManyPositionals { bin: String, count: usize, max: usize },
}

impl ExecDenial {
    /// Stable, machine-readable rule identifier.
    pub fn rule_id(&self) -> &'static str {
        match self {
            Self::UnresolvedExecutable => "exec.unresolved",
            Self::SemanticWrapper { .. } => "exec.semantic-wrapper",
            Self::UntrustedDirectory { .. } => "exec.untrusted-dir",
            Self::NotSafeListed { .. } => "exec.not-safe-listed",
            Self::MissingProfile { .. } => "exec.missing-profile",
            Self::DeniedFlag { .. } => "exec.denied-flag",
            Self::UnknownFlag { .. } => "exec.unknown-flag",
            Self::AmbiguousFlag { .. } => "exec.ambiguous-flag",
            Self::MissingFlagValue { .. } => "exec.missing-flag-value",
            Self::PathPositional { .. } => "exec.path-positional",
            Self::TooManyPositionals { .. } => "exec.positional-budget",
        }
    }
}
