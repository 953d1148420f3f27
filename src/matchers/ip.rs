//! IPv4/CIDR driver: comparator, record shape, and parsing.
//!
//! Grounded bit-for-bit on `original_source/src/checker.c`'s `rec_cmp_ip`,
//! called via `tree.c`'s `_tree_search` as `compar(stored, query)`. A
//! single sorted structure services both exact-IP and CIDR entries by
//! applying the *stored* side's netmask against the *query*'s address
//! during comparison. See spec.md §4.3.1 and DESIGN.md's Open Question 1.

use std::cmp::Ordering;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRecord {
    pub ip: u32,
    pub net: u32,
    pub ipnet: u32,
}

impl IpRecord {
    pub fn exact(ip: u32) -> Self {
        IpRecord {
            ip,
            net: 0xFFFF_FFFF,
            ipnet: ip,
        }
    }

    pub fn cidr(ip: u32, net: u32) -> Self {
        IpRecord {
            ip,
            net,
            ipnet: ip & net,
        }
    }

    /// A query record: net defaults to all-ones, ipnet is left at 0 —
    /// `rmatch_ip`/`rmatch_resolve` never set it on the query side, so
    /// `cmp_ip`'s fallback branch is the one always taken for real queries.
    pub fn query(ip: u32) -> Self {
        IpRecord {
            ip,
            net: 0xFFFF_FFFF,
            ipnet: 0,
        }
    }
}

/// `rec_cmp_ip`: compares a query record against a stored record.
/// `ipnet == 0` on the *query* side is the fallback marker (true for every
/// real query, since neither `rmatch_ip` nor `rmatch_resolve` ever set it);
/// in that case the query's address is masked by the *stored* side's
/// netmask instead of using the query's own (always all-ones) ipnet.
pub fn cmp_ip(query: &IpRecord, stored: &IpRecord) -> Ordering {
    let query_key = if query.ipnet == 0 {
        query.ip & stored.net
    } else {
        query.ipnet
    };
    // Descending order, per spec.md §4.3.1.
    stored.ipnet.cmp(&query_key)
}

/// Parse an IPv4 literal, optionally suffixed with `/prefixlen` or
/// `/netmask`.
pub fn parse_ip_spec(text: &str) -> Option<IpRecord> {
    match text.split_once('/') {
        None => {
            let addr: Ipv4Addr = text.parse().ok()?;
            Some(IpRecord::exact(u32::from(addr)))
        }
        Some((addr_part, mask_part)) => {
            let addr: Ipv4Addr = addr_part.parse().ok()?;
            let net = parse_netmask(mask_part)?;
            Some(IpRecord::cidr(u32::from(addr), net))
        }
    }
}

fn parse_netmask(text: &str) -> Option<u32> {
    if text.len() <= 2 {
        let prefix: u32 = text.parse().ok()?;
        if prefix > 32 {
            return None;
        }
        return Some(if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix)
        });
    }
    let addr: Ipv4Addr = text.parse().ok()?;
    Some(u32::from(addr))
}

pub fn parse_query_ip(text: &str) -> Option<IpRecord> {
    let addr: Ipv4Addr = text.parse().ok()?;
    Some(IpRecord::query(u32::from(addr)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> u32 {
        u32::from(s.parse::<Ipv4Addr>().unwrap())
    }

    #[test]
    fn query_matches_cidr_entry() {
        let stored = IpRecord::cidr(ip("10.0.0.0"), 0xFFFF_0000); // /16
        let query = IpRecord::query(ip("10.0.4.5"));
        assert_eq!(cmp_ip(&query, &stored), Ordering::Equal);
    }

    #[test]
    fn query_outside_cidr_does_not_match() {
        let stored = IpRecord::cidr(ip("10.0.0.0"), 0xFFFF_0000);
        let query = IpRecord::query(ip("10.1.4.5"));
        assert_ne!(cmp_ip(&query, &stored), Ordering::Equal);
    }

    #[test]
    fn exact_entry_matches_only_itself() {
        let stored = IpRecord::exact(ip("8.8.8.8"));
        assert_eq!(
            cmp_ip(&IpRecord::query(ip("8.8.8.8")), &stored),
            Ordering::Equal
        );
        assert_ne!(
            cmp_ip(&IpRecord::query(ip("8.8.8.9")), &stored),
            Ordering::Equal
        );
    }

    #[test]
    fn stored_network_with_zero_ipnet_still_matches() {
        // A stored /16 whose masked address happens to be literally
        // 0.0.0.0 (e.g. configured as "0.0.5.6/16") must still match
        // queries inside it — `ipnet == 0` here is incidental to this
        // particular network, not a sentinel, and the comparator only
        // ever treats the *query* side's ipnet as the fallback marker.
        let stored = IpRecord::cidr(ip("0.0.5.6"), 0xFFFF_0000); // /16
        assert_eq!(stored.ipnet, 0);
        let query = IpRecord::query(ip("0.0.9.9"));
        assert_eq!(cmp_ip(&query, &stored), Ordering::Equal);

        let outside = IpRecord::query(ip("0.1.9.9"));
        assert_ne!(cmp_ip(&outside, &stored), Ordering::Equal);
    }

    #[test]
    fn netmask_parsing_prefix_vs_dotted_quad() {
        assert_eq!(parse_netmask("8").unwrap(), 0xFF00_0000);
        assert_eq!(parse_netmask("16").unwrap(), 0xFFFF_0000);
        assert_eq!(parse_netmask("255.255.255.0").unwrap(), 0xFFFF_FF00);
    }
}
