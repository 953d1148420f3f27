//! Hostname -> set-of-IPv4 resolution with positive/negative TTL caching.
//!
//! Grounded on `original_source/src/resolve.c`. The cache's locking
//! discipline matches spec.md §5 exactly: the mutex is held only across
//! find-or-insert, and the returned entry's `ips`/`expiry` are mutated
//! *after* releasing it. This is a deliberate trade-off inherited from the
//! original, not an oversight; see DESIGN.md and spec.md §9 for the
//! hardening note (acquire across the mutation, or per-entry atomics).

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Clone, Default)]
struct CachedHost {
    ips: Vec<Ipv4Addr>,
    expiry: Option<Instant>,
}

pub struct Resolver {
    cache: Mutex<HashMap<String, Arc<Mutex<CachedHost>>>>,
    positive_ttl: Duration,
    negative_ttl: Duration,
}

impl Resolver {
    pub fn new(positive_ttl_secs: u64, negative_ttl_secs: u64) -> Self {
        Resolver {
            cache: Mutex::new(HashMap::new()),
            positive_ttl: Duration::from_secs(positive_ttl_secs),
            negative_ttl: Duration::from_secs(negative_ttl_secs),
        }
    }

    /// Resolve `host` to its IPv4 set, serving from cache when fresh.
    pub fn resolve(&self, host: &str) -> Vec<Ipv4Addr> {
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return vec![ip];
        }

        let entry = {
            let mut cache = self.cache.lock();
            cache
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(CachedHost::default())))
                .clone()
        };

        let fresh = {
            let guard = entry.lock();
            match guard.expiry {
                Some(exp) if Instant::now() < exp => Some(guard.ips.clone()),
                _ => None,
            }
        };
        if let Some(ips) = fresh {
            return ips;
        }

        let resolved = lookup_ipv4(host);
        let ttl = if resolved.is_empty() {
            self.negative_ttl
        } else {
            self.positive_ttl
        };
        let mut guard = entry.lock();
        guard.ips = resolved.clone();
        guard.expiry = Some(Instant::now() + ttl);
        resolved
    }
}

fn lookup_ipv4(host: &str) -> Vec<Ipv4Addr> {
    match dns_lookup::lookup_host(host) {
        Ok(addrs) => addrs
            .into_iter()
            .filter_map(|a| match a {
                std::net::IpAddr::V4(v4) => Some(v4),
                std::net::IpAddr::V6(_) => None,
            })
            .collect(),
        Err(err) => {
            log::debug!("resolve '{host}' failed: {err}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_quad_resolves_without_dns() {
        let resolver = Resolver::new(3600, 60);
        assert_eq!(resolver.resolve("10.0.0.1"), vec![Ipv4Addr::new(10, 0, 0, 1)]);
    }

    #[test]
    fn unknown_host_caches_negative_result() {
        let resolver = Resolver::new(3600, 60);
        let first = resolver.resolve("this-host-does-not-exist.invalid");
        assert!(first.is_empty());
        let second = resolver.resolve("this-host-does-not-exist.invalid");
        assert!(second.is_empty());
    }
}
