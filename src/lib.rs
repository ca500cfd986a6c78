#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::needless_pass_by_value,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

//! Outbound action authorization for agent gateways.
//!
//! An agent acting on conversational input must not execute a command
//! line or reach a network target without clearing an explicit gate. This
//! crate is that gate, split into two engines:
//!
//! - [`exec`]: a shell-command safety analyzer and allowlist evaluator.
//!   [`exec::evaluate_shell_allowlist`] tokenizes a command, resolves
//!   every pipeline segment's executable, and produces a per-segment
//!   verdict from an operator allowlist plus safe-bin argument profiles.
//! - [`net`]: an SSRF-safe resolver and fetch guard.
//!   [`net::resolve_pinned_hostname_with_policy`] validates and pins a
//!   hostname's addresses for one connection;
//!   [`net::FetchGuard`] re-validates every redirect hop under the same
//!   policy and strips credential headers across origins.
//!
//! Both engines fail closed: anything not positively recognized is
//! denied, with a machine-readable rule identifier for audit logging.
//! Denials are verdicts; transport failures (DNS, HTTP) stay distinct
//! errors and are never reinterpreted as either allow or deny.

pub mod config;
pub mod exec;
pub mod net;

pub use config::GuardConfig;
pub use exec::{
    evaluate_exec_allowlist, evaluate_shell_allowlist, AllowlistEntry, AllowlistVerdict,
    ExecDenial, ExecOptions, SafeBinProfile, SafeBinRegistry,
};
pub use net::{
    resolve_pinned_hostname, resolve_pinned_hostname_with_policy, FetchGuard, FetchGuardError,
    FetchInit, PinnedHostname, ResolveError, SsrfPolicy,
};
