//! SSRF-safe resolution and guarded fetching.
//!
//! The resolver pins a hostname to a validated address set for exactly
//! one logical connection (defeating DNS rebinding between check and
//! use), and the fetch guard re-validates every redirect hop under the
//! same policy while sanitizing credential headers across origins.
//! Anything not explicitly permitted by [`SsrfPolicy`] is blocked.

pub mod classify;
pub mod fetch;
pub mod literal;
pub mod resolve;

pub use classify::{blocked_class, classify, RangeClass};
pub use fetch::{
    FetchBackend, FetchGuard, FetchGuardError, FetchInit, GuardedFetch, GuardedRequest,
    ReleaseHandle, ReqwestBackend, DEFAULT_MAX_REDIRECTS,
};
pub use literal::parse_ip_literal;
pub use resolve::{
    resolve_pinned_hostname, resolve_pinned_hostname_with_policy, AddressFamily, BlockReason,
    HostLookup, PinnedHostname, ResolveError, ResolvedAddr, SystemLookup,
};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Declarative SSRF policy. Constructed per call site (for example per
/// outbound-fetch tool configuration), never mutated afterwards; only the
/// classifier and resolver consume it.
///
/// Defaults are fail-closed: no private ranges, no benchmark range, and
/// an empty allowlist (which means "any public hostname" — a non-empty
/// allowlist restricts to its entries).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SsrfPolicy {
    /// Permit loopback, RFC 1918, link-local, CGNAT, and unique-local
    /// targets. For lab and loopback services only.
    pub allow_private_network: bool,
    /// Permit 198.18.0.0/15 (RFC 2544). Separate opt-out because
    /// transparent proxies squat on this range.
    pub allow_rfc2544_benchmark_range: bool,
    /// Exact hostnames or `*.suffix` wildcards. Non-empty means every
    /// target must match an entry before any DNS lookup happens.
    pub hostname_allowlist: Vec<String>,
}

/// Lowercase and strip the trailing dot. The empty result marks a
/// malformed hostname.
pub(crate) fn normalize_hostname(raw: &str) -> String {
    raw.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Match a normalized hostname against allowlist entries.
///
/// `*.example.com` matches `assets.example.com` (and deeper labels) but
/// not the bare `example.com`; listing the apex is a separate, explicit
/// entry.
pub(crate) fn hostname_allowed(host: &str, allowlist: &[String]) -> bool {
    allowlist.iter().any(|entry| {
        let entry = normalize_hostname(entry);
        if entry == "*" {
            return true;
        }
        if let Some(suffix) = entry.strip_prefix("*.") {
            return host
                .strip_suffix(suffix)
                .is_some_and(|prefix| prefix.ends_with('.'));
        }
        host == entry
    })
}
