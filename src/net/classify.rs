//! Reserved-range classification for IP addresses.
//!
//! Classification is a total, tagged decision: an address either falls in
//! a named reserved range or it is globally routable. The policy gate is
//! a separate match with explicit opt-outs, so the default arm is always
//! a deny.

use super::SsrfPolicy;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Named reserved ranges an address can classify into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RangeClass {
    /// 127.0.0.0/8, ::1
    Loopback,
    /// RFC 1918: 10/8, 172.16/12, 192.168/16
    Private,
    /// 169.254.0.0/16, fe80::/10
    LinkLocal,
    /// RFC 6598 shared address space: 100.64.0.0/10
    SharedAddressSpace,
    /// fc00::/7
    UniqueLocal,
    /// 0.0.0.0, ::
    Unspecified,
    /// 255.255.255.255
    Broadcast,
    /// 224.0.0.0/4, ff00::/8
    Multicast,
    /// TEST-NET-1/2/3, 2001:db8::/32
    Documentation,
    /// RFC 2544 benchmarking: 198.18.0.0/15
    Benchmark,
    /// 240.0.0.0/4 (minus broadcast), 192.0.0.0/24 IETF assignments
    Reserved,
}

impl RangeClass {
    /// Stable rule identifier for audit logging.
    pub fn rule_id(self) -> &'static str {
        match self {
            Self::Loopback => "ssrf.range.loopback",
            Self::Private => "ssrf.range.private",
            Self::LinkLocal => "ssrf.range.link-local",
            Self::SharedAddressSpace => "ssrf.range.shared-address-space",
            Self::UniqueLocal => "ssrf.range.unique-local",
            Self::Unspecified => "ssrf.range.unspecified",
            Self::Broadcast => "ssrf.range.broadcast",
            Self::Multicast => "ssrf.range.multicast",
            Self::Documentation => "ssrf.range.documentation",
            Self::Benchmark => "ssrf.range.benchmark",
            Self::Reserved => "ssrf.range.reserved",
        }
    }

    /// Whether the policy explicitly opts in to this range. Everything
    /// without an opt-out stays denied.
    pub fn permitted_by(self, policy: &SsrfPolicy) -> bool {
        match self {
            Self::Loopback
            | Self::Private
            | Self::LinkLocal
            | Self::SharedAddressSpace
            | Self::UniqueLocal => policy.allow_private_network,
            Self::Benchmark => policy.allow_rfc2544_benchmark_range,
            Self::Unspecified
            | Self::Broadcast
            | Self::Multicast
            | Self::Documentation
            | Self::Reserved => false,
        }
    }
}

/// Classify an address against the reserved-range table. `None` means
/// globally routable.
pub fn classify(ip: IpAddr) -> Option<RangeClass> {
    match ip {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => classify_v6(v6),
    }
}

/// The class that blocks this address under the policy, if any.
pub fn blocked_class(ip: IpAddr, policy: &SsrfPolicy) -> Option<RangeClass> {
    classify(ip).filter(|class| !class.permitted_by(policy))
}

fn classify_v4(v4: Ipv4Addr) -> Option<RangeClass> {
    let [a, b, c, _] = v4.octets();
    if v4.is_unspecified() {
        Some(RangeClass::Unspecified)
    } else if v4.is_loopback() {
        Some(RangeClass::Loopback)
    } else if v4.is_broadcast() {
        Some(RangeClass::Broadcast)
    } else if v4.is_multicast() {
        Some(RangeClass::Multicast)
    } else if v4.is_link_local() {
        Some(RangeClass::LinkLocal)
    } else if v4.is_private() {
        Some(RangeClass::Private)
    } else if a == 100 && (64..=127).contains(&b) {
        Some(RangeClass::SharedAddressSpace)
    } else if a == 198 && (18..=19).contains(&b) {
        Some(RangeClass::Benchmark)
    } else if (a == 192 && b == 0 && c == 2)
        || (a == 198 && b == 51 && c == 100)
        || (a == 203 && b == 0 && c == 113)
    {
        Some(RangeClass::Documentation)
    } else if a >= 240 || (a == 192 && b == 0 && c == 0) {
        Some(RangeClass::Reserved)
    } else {
        None
    }
}

fn classify_v6(v6: Ipv6Addr) -> Option<RangeClass> {
    let segs = v6.segments();
    if v6.is_unspecified() {
        Some(RangeClass::Unspecified)
    } else if v6.is_loopback() {
        Some(RangeClass::Loopback)
    } else if v6.is_multicast() {
        Some(RangeClass::Multicast)
    } else if (segs[0] & 0xffc0) == 0xfe80 {
        Some(RangeClass::LinkLocal)
    } else if (segs[0] & 0xfe00) == 0xfc00 {
        Some(RangeClass::UniqueLocal)
    } else if segs[0] == 0x2001 && segs[1] == 0x0db8 {
        Some(RangeClass::Documentation)
    } else if let Some(embedded) = v6.to_ipv4_mapped() {
        classify_v4(embedded)
    } else if let Some(embedded) = v6.to_ipv4() {
        // Deprecated IPv4-compatible form (::a.b.c.d); classify the tail.
        classify_v4(embedded)
    } else {
        None
    }
}
