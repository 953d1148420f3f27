//! IP/host -> (continent, country, city) via a memory-mapped MaxMind
//! database.
//!
//! Grounded on `original_source/src/geoip2.c` for lookup semantics and on
//! `other_examples/erichutchins-geoipsed` for the `maxminddb` crate usage
//! (mmap-backed reader, opened once at init).

use std::collections::HashMap;
use std::net::IpAddr;

use maxminddb::geoip2;
use parking_lot::Mutex;

use crate::resolver::Resolver;

pub struct GeoipLookup {
    reader: Option<maxminddb::Reader<Vec<u8>>>,
    // Keyed by token text, never expires once populated (spec.md §4.3: the
    // geoip2 cache is permanent, unlike the TLS cache's TTL).
    cache: Mutex<HashMap<String, GeoCityInfo>>,
}

/// Always three fields; each defaults to "N/A" on any failure, per
/// spec.md §4.5 — GeoIP lookups never raise an error to their caller.
#[derive(Clone)]
pub struct GeoCityInfo {
    pub continent: String,
    pub country: String,
    pub city: String,
}

impl Default for GeoCityInfo {
    fn default() -> Self {
        GeoCityInfo {
            continent: "N/A".to_string(),
            country: "N/A".to_string(),
            city: "N/A".to_string(),
        }
    }
}

impl GeoipLookup {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        match maxminddb::Reader::open_readfile(path) {
            Ok(reader) => Ok(GeoipLookup {
                reader: Some(reader),
                cache: Mutex::new(HashMap::new()),
            }),
            Err(err) => {
                log::error!("geoip2 database '{path}' failed to open: {err}");
                Ok(GeoipLookup {
                    reader: None,
                    cache: Mutex::new(HashMap::new()),
                })
            }
        }
    }

    /// Resolve `token` to an IPv4 via the resolver first; fall back to the
    /// raw token if resolution yields nothing, then look that key up. Once
    /// populated a cache entry is permanent (spec.md §4.3: the geoip2 cache
    /// never expires, unlike the TLS cache's TTL).
    pub fn lookup(&self, token: &str, resolver: &Resolver) -> GeoCityInfo {
        if let Some(cached) = self.cache.lock().get(token) {
            return cached.clone();
        }

        let info = self.lookup_uncached(token, resolver);
        self.cache.lock().insert(token.to_string(), info.clone());
        info
    }

    /// Does the actual lookup. Every path (no reader, unresolvable token,
    /// miss) funnels through here so `lookup` can cache the result
    /// uniformly, including the permanent "N/A" verdict.
    fn lookup_uncached(&self, token: &str, resolver: &Resolver) -> GeoCityInfo {
        let reader = match &self.reader {
            Some(r) => r,
            None => return GeoCityInfo::default(),
        };

        let resolved = resolver.resolve(token);
        let key: IpAddr = match resolved.first() {
            Some(ip) => IpAddr::V4(*ip),
            None => match token.parse::<IpAddr>() {
                Ok(ip) => ip,
                Err(_) => return GeoCityInfo::default(),
            },
        };

        match reader.lookup::<geoip2::City>(key) {
            Ok(Some(city)) => GeoCityInfo {
                continent: city
                    .continent
                    .as_ref()
                    .and_then(|c| c.code)
                    .unwrap_or("N/A")
                    .to_string(),
                country: city
                    .country
                    .as_ref()
                    .and_then(|c| c.iso_code)
                    .unwrap_or("N/A")
                    .to_string(),
                city: city
                    .city
                    .as_ref()
                    .and_then(|c| c.names.as_ref())
                    .and_then(|n| n.get("en"))
                    .copied()
                    .unwrap_or("N/A")
                    .to_string(),
            },
            _ => GeoCityInfo::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_degrades_to_na() {
        let lookup = GeoipLookup::open("/nonexistent/path/to.mmdb").unwrap();
        let resolver = Resolver::new(3600, 60);
        let info = lookup.lookup("8.8.8.8", &resolver);
        assert_eq!(info.continent, "N/A");
        assert_eq!(info.country, "N/A");
        assert_eq!(info.city, "N/A");
    }

    #[test]
    fn repeated_lookup_is_served_from_cache() {
        let lookup = GeoipLookup::open("/nonexistent/path/to.mmdb").unwrap();
        let resolver = Resolver::new(3600, 60);
        lookup.lookup("8.8.8.8", &resolver);
        assert!(lookup.cache.lock().contains_key("8.8.8.8"));
        // Second call hits the cache and doesn't need a live reader.
        let info = lookup.lookup("8.8.8.8", &resolver);
        assert_eq!(info.continent, "N/A");
    }
}
