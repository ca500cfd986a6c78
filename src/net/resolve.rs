//! Pinned hostname resolution.
//!
//! Resolution classifies every address a lookup returns and, on success,
//! binds the hostname to that exact address set for one logical
//! connection. Re-resolving between the check and the connect is the DNS
//! rebinding window this module exists to close.

use super::classify::{blocked_class, RangeClass};
use super::literal::parse_ip_literal;
use super::{hostname_allowed, normalize_hostname, SsrfPolicy};
use async_trait::async_trait;
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Address family as reported by the resolver. Ordering decisions use
/// this tag, never the textual shape of the address — a literal can look
/// like one family but be reported as another (IPv4-mapped IPv6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AddressFamily {
    V4,
    V6,
}

/// One resolver answer: the address plus the resolver's family tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedAddr {
    pub ip: IpAddr,
    pub family: AddressFamily,
}

impl ResolvedAddr {
    /// Tag the address with the family implied by its representation.
    pub fn new(ip: IpAddr) -> Self {
        let family = match ip {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        };
        Self { ip, family }
    }

    /// Use the resolver's own family tag, whatever the address looks like.
    pub fn tagged(ip: IpAddr, family: AddressFamily) -> Self {
        Self { ip, family }
    }
}

/// Injectable DNS lookup. Implementations must not cache across policy
/// boundaries; the guard calls this once per pin.
#[async_trait]
pub trait HostLookup: Send + Sync {
    async fn lookup(&self, hostname: &str) -> std::io::Result<Vec<ResolvedAddr>>;
}

/// Platform resolver via `tokio::net::lookup_host`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLookup;

#[async_trait]
impl HostLookup for SystemLookup {
    async fn lookup(&self, hostname: &str) -> std::io::Result<Vec<ResolvedAddr>> {
        let addrs = tokio::net::lookup_host((hostname, 0u16)).await?;
        Ok(addrs.map(|sa| ResolvedAddr::new(sa.ip())).collect())
    }
}

/// Why a target was refused. Policy denials only — transport failures are
/// [`ResolveError::Lookup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "rule", content = "detail")]
pub enum BlockReason {
    #[error("hostname is not on the allowlist")]
    NotAllowlisted,
    #[error("address {address} is in a disallowed range ({})", .class.rule_id())]
    DisallowedRange { address: IpAddr, class: RangeClass },
    #[error("resolver returned no addresses")]
    EmptyResolution,
    #[error("hostname is empty or malformed")]
    InvalidHostname,
}

impl BlockReason {
    pub fn rule_id(&self) -> &'static str {
        match self {
            Self::NotAllowlisted => "ssrf.hostname-not-allowlisted",
            Self::DisallowedRange { class, .. } => class.rule_id(),
            Self::EmptyResolution => "ssrf.empty-resolution",
            Self::InvalidHostname => "ssrf.invalid-hostname",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The policy refused the target. Fatal to this call; the caller may
    /// escalate to a human, never retry past it.
    #[error("blocked target '{hostname}': {reason}")]
    Blocked {
        hostname: String,
        reason: BlockReason,
    },
    /// The injected lookup itself failed. A transport error, not a
    /// verdict — surfaced unchanged so the caller can apply its own
    /// retry policy.
    #[error("lookup failed for '{hostname}': {source}")]
    Lookup {
        hostname: String,
        #[source]
        source: std::io::Error,
    },
}

/// A hostname bound to a validated address set for one connection.
///
/// The binding never re-resolves its own hostname; lookups for any other
/// hostname (proxy hosts, for example) pass through to the fallback
/// resolver unchanged. Do not reuse across unrelated requests — that
/// would reopen the rebinding window the pin closes.
#[derive(Clone)]
pub struct PinnedHostname {
    hostname: String,
    addresses: Vec<ResolvedAddr>,
    fallback: Arc<dyn HostLookup>,
}

impl std::fmt::Debug for PinnedHostname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedHostname")
            .field("hostname", &self.hostname)
            .field("addresses", &self.addresses)
            .finish_non_exhaustive()
    }
}

impl PinnedHostname {
    /// The normalized (lowercased, no trailing dot) hostname.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Pinned addresses: IPv4-tagged before IPv6-tagged, de-duplicated.
    /// Never empty.
    pub fn addresses(&self) -> &[ResolvedAddr] {
        &self.addresses
    }

    /// The pinned set as socket addresses for transport wiring.
    pub fn socket_addrs(&self, port: u16) -> Vec<SocketAddr> {
        self.addresses
            .iter()
            .map(|a| SocketAddr::new(a.ip, port))
            .collect()
    }
}

#[async_trait]
impl HostLookup for PinnedHostname {
    async fn lookup(&self, hostname: &str) -> std::io::Result<Vec<ResolvedAddr>> {
        if normalize_hostname(hostname) == self.hostname {
            return Ok(self.addresses.clone());
        }
        self.fallback.lookup(hostname).await
    }
}

/// Resolve and pin under the default (deny-all-reserved) policy.
pub async fn resolve_pinned_hostname(
    hostname: &str,
    lookup: Arc<dyn HostLookup>,
) -> Result<PinnedHostname, ResolveError> {
    resolve_pinned_hostname_with_policy(hostname, lookup, &SsrfPolicy::default()).await
}

/// Resolve a hostname, validate every address against the policy, and pin
/// the surviving set.
///
/// Order matters for the security properties:
/// 1. allowlist gate *before* any DNS query (an unlisted host must not
///    trigger lookups that could be used as a side channel);
/// 2. IP literals (all supported encodings) decode and classify without
///    DNS;
/// 3. one disallowed address anywhere in the lookup result blocks the
///    whole resolution — no partial success.
pub async fn resolve_pinned_hostname_with_policy(
    hostname: &str,
    lookup: Arc<dyn HostLookup>,
    policy: &SsrfPolicy,
) -> Result<PinnedHostname, ResolveError> {
    let host = normalize_hostname(hostname);
    if host.is_empty() {
        return Err(ResolveError::Blocked {
            hostname: hostname.to_string(),
            reason: BlockReason::InvalidHostname,
        });
    }

    if !policy.hostname_allowlist.is_empty()
        && !hostname_allowed(&host, &policy.hostname_allowlist)
    {
        tracing::debug!(host = %host, "hostname not on allowlist, blocked before lookup");
        return Err(ResolveError::Blocked {
            hostname: host,
            reason: BlockReason::NotAllowlisted,
        });
    }

    if let Some(ip) = parse_ip_literal(&host) {
        if let Some(class) = blocked_class(ip, policy) {
            tracing::debug!(host = %host, rule = class.rule_id(), "literal blocked before lookup");
            return Err(ResolveError::Blocked {
                hostname: host,
                reason: BlockReason::DisallowedRange { address: ip, class },
            });
        }
        return Ok(PinnedHostname {
            hostname: host,
            addresses: vec![ResolvedAddr::new(ip)],
            fallback: lookup,
        });
    }

    let answers = lookup
        .lookup(&host)
        .await
        .map_err(|source| ResolveError::Lookup {
            hostname: host.clone(),
            source,
        })?;

    if answers.is_empty() {
        return Err(ResolveError::Blocked {
            hostname: host,
            reason: BlockReason::EmptyResolution,
        });
    }

    for answer in &answers {
        if let Some(class) = blocked_class(answer.ip, policy) {
            tracing::debug!(
                host = %host,
                address = %answer.ip,
                rule = class.rule_id(),
                "resolved address blocked"
            );
            return Err(ResolveError::Blocked {
                hostname: host,
                reason: BlockReason::DisallowedRange {
                    address: answer.ip,
                    class,
                },
            });
        }
    }

    let mut addresses: Vec<ResolvedAddr> = Vec::with_capacity(answers.len());
    for answer in answers {
        if !addresses.contains(&answer) {
            addresses.push(answer);
        }
    }
    // Stable: the resolver's order is preserved within each family.
    addresses.sort_by_key(|a| matches!(a.family, AddressFamily::V6));

    Ok(PinnedHostname {
        hostname: host,
        addresses,
        fallback: lookup,
    })
}
