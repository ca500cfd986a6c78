//! IP literal decoding, including legacy encodings.
//!
//! `IpAddr::parse` only accepts canonical dotted-decimal and RFC 4291
//! IPv6 text. Attackers reach for the encodings it rejects — octal and
//! hex octets, short forms, bare integers — because naive validators
//! only recognize the canonical shape and let the connect(2)-level
//! parser widen the meaning later. This module decodes every form the
//! guard supports so the classifier sees the real address *before* any
//! lookup or connection.

use std::net::{IpAddr, Ipv4Addr};

/// Decode a host string as an IP literal, if it is one.
///
/// Accepts canonical IPv4/IPv6 (with optional brackets), IPv6 with an
/// embedded IPv4 tail, and the legacy IPv4 forms: octal or hex octets
/// (`0177.0.0.1`, `0x7f.0.0.1`), short forms (`127.1`, `127.0.1`), and
/// single-integer forms (`2130706433`, `0x7f000001`). Returns `None` for
/// anything that is not a literal — such hosts go to DNS.
pub fn parse_ip_literal(host: &str) -> Option<IpAddr> {
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if bare.is_empty() {
        return None;
    }

    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Some(ip);
    }

    // Anything with a colon had its one chance as IPv6 text above.
    if bare.contains(':') {
        return None;
    }

    parse_legacy_v4(bare).map(IpAddr::V4)
}

/// Decode the inet_aton(3) grammar: 1–4 dot-separated numeric parts, each
/// decimal, octal (leading `0`), or hex (`0x`); the final part fills the
/// remaining bytes.
fn parse_legacy_v4(s: &str) -> Option<Ipv4Addr> {
    let parts: Vec<u32> = s
        .split('.')
        .map(parse_numeric_part)
        .collect::<Option<_>>()?;

    let bits = match parts.as_slice() {
        [value] => *value,
        [a, rest] if *a <= 0xff && *rest <= 0xff_ffff => (a << 24) | rest,
        [a, b, rest] if *a <= 0xff && *b <= 0xff && *rest <= 0xffff => {
            (a << 24) | (b << 16) | rest
        }
        [a, b, c, d] if [a, b, c, d].iter().all(|&&p| p <= 0xff) => {
            (a << 24) | (b << 16) | (c << 8) | d
        }
        _ => return None,
    };

    Some(Ipv4Addr::from(bits))
}

fn parse_numeric_part(part: &str) -> Option<u32> {
    if part.is_empty() {
        return None;
    }
    if let Some(hex) = part.strip_prefix("0x").or_else(|| part.strip_prefix("0X")) {
        if hex.is_empty() {
            return None;
        }
        return u32::from_str_radix(hex, 16).ok();
    }
    if part.len() > 1 && part.starts_with('0') {
        return u32::from_str_radix(&part[1..], 8).ok();
    }
    part.parse().ok()
}
