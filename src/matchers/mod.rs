//! Matching driver families: per-driver compiled index, insertion, and
//! per-request match.
//!
//! Grounded on `original_source/src/checker.c`'s `rmatch_*`/`rins_*`
//! function table. Driver dispatch is a tagged enum here (per spec.md §9's
//! redesign note) rather than the original's untyped function pointers.

pub mod ip;

use wildmatch::WildMatch;

use crate::container::BstIndex;
use crate::geoip::GeoipLookup;
use crate::resolver::Resolver;
use crate::tls::TlsCache;
use ip::IpRecord;

/// Driver kind as named in a `checker =` config line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Dummy,
    String,
    IString,
    Match,
    IMatch,
    Regex,
    IRegex,
    Pcre,
    IPcre,
    Ip,
    Resolve,
    Dresolve,
    Ssl,
    Geoip2,
}

impl DriverKind {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "dummy" => DriverKind::Dummy,
            "string" => DriverKind::String,
            "istring" => DriverKind::IString,
            "match" => DriverKind::Match,
            "imatch" => DriverKind::IMatch,
            "regex" => DriverKind::Regex,
            "iregex" => DriverKind::IRegex,
            "pcre" => DriverKind::Pcre,
            "ipcre" => DriverKind::IPcre,
            "ip" => DriverKind::Ip,
            "resolve" => DriverKind::Resolve,
            "dresolve" => DriverKind::Dresolve,
            "ssl" => DriverKind::Ssl,
            "geoip2" => DriverKind::Geoip2,
            _ => return None,
        })
    }
}

/// The compiled, driver-specific index attached to a checker after init.
pub enum DriverIndex {
    Dummy,
    Exact {
        index: BstIndex<String>,
        case_insensitive: bool,
    },
    Glob {
        patterns: Vec<(WildMatch, String)>,
        case_insensitive: bool,
    },
    Regex {
        patterns: Vec<(regex::Regex, String)>,
        case_insensitive: bool,
    },
    Pcre {
        patterns: Vec<(pcre2::bytes::Regex, String)>,
        case_insensitive: bool,
    },
    Ip {
        index: BstIndex<IpRecord>,
    },
    Resolve {
        index: BstIndex<IpRecord>,
    },
    Dresolve {
        hosts: Vec<String>,
    },
    Ssl,
    Geoip2,
}

impl DriverIndex {
    pub fn new_empty(kind: DriverKind) -> Self {
        match kind {
            DriverKind::Dummy => DriverIndex::Dummy,
            DriverKind::String => DriverIndex::Exact {
                index: BstIndex::new(),
                case_insensitive: false,
            },
            DriverKind::IString => DriverIndex::Exact {
                index: BstIndex::new(),
                case_insensitive: true,
            },
            DriverKind::Match => DriverIndex::Glob {
                patterns: Vec::new(),
                case_insensitive: false,
            },
            DriverKind::IMatch => DriverIndex::Glob {
                patterns: Vec::new(),
                case_insensitive: true,
            },
            DriverKind::Regex => DriverIndex::Regex {
                patterns: Vec::new(),
                case_insensitive: false,
            },
            DriverKind::IRegex => DriverIndex::Regex {
                patterns: Vec::new(),
                case_insensitive: true,
            },
            DriverKind::Pcre => DriverIndex::Pcre {
                patterns: Vec::new(),
                case_insensitive: false,
            },
            DriverKind::IPcre => DriverIndex::Pcre {
                patterns: Vec::new(),
                case_insensitive: true,
            },
            DriverKind::Ip => DriverIndex::Ip {
                index: BstIndex::new(),
            },
            DriverKind::Resolve => DriverIndex::Resolve {
                index: BstIndex::new(),
            },
            DriverKind::Dresolve => DriverIndex::Dresolve { hosts: Vec::new() },
            DriverKind::Ssl => DriverIndex::Ssl,
            DriverKind::Geoip2 => DriverIndex::Geoip2,
        }
    }

    /// Insert one record line from a source's text. Insertion policy for
    /// every driver is "insert if absent, else drop the incoming record"
    /// (spec.md §4.3.2).
    pub fn insert(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match self {
            DriverIndex::Dummy | DriverIndex::Ssl | DriverIndex::Geoip2 => {}
            DriverIndex::Exact {
                index,
                case_insensitive,
            } => {
                let ci = *case_insensitive;
                index.find_or_insert(line.to_string(), move |a, b| {
                    if ci {
                        a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase())
                    } else {
                        a.cmp(b)
                    }
                });
            }
            DriverIndex::Glob {
                patterns,
                case_insensitive,
            } => {
                if patterns.iter().any(|(_, text)| text == line) {
                    return;
                }
                let pattern = if *case_insensitive {
                    WildMatch::new(&line.to_ascii_lowercase())
                } else {
                    WildMatch::new(line)
                };
                patterns.push((pattern, line.to_string()));
            }
            DriverIndex::Regex {
                patterns,
                case_insensitive,
            } => {
                if patterns.iter().any(|(_, text)| text == line) {
                    return;
                }
                match regex::RegexBuilder::new(line)
                    .case_insensitive(*case_insensitive)
                    .build()
                {
                    Ok(re) => patterns.push((re, line.to_string())),
                    Err(err) => log::warn!("regex driver: invalid pattern '{line}': {err}"),
                }
            }
            DriverIndex::Pcre {
                patterns,
                case_insensitive,
            } => {
                if patterns.iter().any(|(_, text)| text == line) {
                    return;
                }
                match pcre2::bytes::RegexBuilder::new()
                    .anchored(true)
                    .caseless(*case_insensitive)
                    .build(line)
                {
                    Ok(re) => patterns.push((re, line.to_string())),
                    Err(err) => log::warn!("pcre driver: invalid pattern '{line}': {err}"),
                }
            }
            DriverIndex::Ip { index } => match ip::parse_ip_spec(line) {
                Some(rec) => {
                    index.find_or_insert(rec, ip::cmp_ip);
                }
                None => log::warn!("ip driver: unparseable entry '{line}'"),
            },
            DriverIndex::Resolve { index } => match ip::parse_ip_spec(line) {
                Some(rec) => {
                    index.find_or_insert(rec, ip::cmp_ip);
                }
                None => log::warn!("resolve driver: unparseable entry '{line}'"),
            },
            DriverIndex::Dresolve { hosts } => {
                if !hosts.iter().any(|h| h == line) {
                    hosts.push(line.to_string());
                }
            }
        }
    }
}

/// Per-request resources shared by all drivers that need them (DNS,
/// TLS probe, GeoIP). Checker indices themselves are read-only after init
/// and need no lock (spec.md §5).
pub struct MatchContext<'a> {
    pub resolver: &'a Resolver,
    pub tls_cache: &'a TlsCache,
    pub geoip: &'a GeoipLookup,
}

/// Outcome of a successful match: optionally carries a return annotation
/// merged into the response (§4.3, ssl/geoip2).
pub struct MatchOutcome {
    pub annotation: Option<String>,
}

impl MatchOutcome {
    fn plain() -> Self {
        MatchOutcome { annotation: None }
    }
    fn with(annotation: String) -> Self {
        MatchOutcome {
            annotation: Some(annotation),
        }
    }
}

/// Attempt to match `token` (the request token at the checker's configured
/// field index) against `index`. `next_token` is the token immediately
/// following it, used only by the `ssl` driver to read an optional port.
pub fn try_match(
    index: &DriverIndex,
    token: &str,
    next_token: Option<&str>,
    ctx: &MatchContext,
) -> Option<MatchOutcome> {
    match index {
        DriverIndex::Dummy => Some(MatchOutcome::plain()),
        DriverIndex::Exact {
            index,
            case_insensitive,
        } => {
            let ci = *case_insensitive;
            let key = token.to_string();
            index
                .find(&key, move |a, b| {
                    if ci {
                        a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase())
                    } else {
                        a.cmp(b)
                    }
                })
                .map(|_| MatchOutcome::plain())
        }
        DriverIndex::Glob {
            patterns,
            case_insensitive,
        } => {
            let subject = if *case_insensitive {
                token.to_ascii_lowercase()
            } else {
                token.to_string()
            };
            let mut found = false;
            for (pattern, _) in patterns {
                if pattern.matches(&subject) {
                    found = true;
                    break;
                }
            }
            found.then(MatchOutcome::plain)
        }
        DriverIndex::Regex { patterns, .. } => {
            patterns.iter().any(|(re, _)| re.is_match(token)).then(MatchOutcome::plain)
        }
        DriverIndex::Pcre { patterns, .. } => patterns
            .iter()
            .any(|(re, _)| re.find(token.as_bytes()).ok().flatten().is_some())
            .then(MatchOutcome::plain),
        DriverIndex::Ip { index } => {
            let query = ip::parse_query_ip(token)?;
            find_ip(index, &query).map(|_| MatchOutcome::plain())
        }
        DriverIndex::Resolve { index } => {
            let resolved = ctx.resolver.resolve(token);
            for addr in resolved {
                let query = ip::IpRecord::query(u32::from(addr));
                if find_ip(index, &query).is_some() {
                    return Some(MatchOutcome::plain());
                }
            }
            None
        }
        DriverIndex::Dresolve { hosts } => {
            let query_ip: std::net::Ipv4Addr = token.parse().ok()?;
            for host in hosts {
                let resolved = ctx.resolver.resolve(host);
                if resolved.contains(&query_ip) {
                    return Some(MatchOutcome::plain());
                }
            }
            None
        }
        DriverIndex::Ssl => {
            let port: u16 = next_token.and_then(|p| p.parse().ok()).unwrap_or(443);
            let code = ctx.tls_cache.verify(token, port, ctx.resolver);
            Some(MatchOutcome::with(format!("ssl_error={code}")))
        }
        DriverIndex::Geoip2 => {
            let info = ctx.geoip.lookup(token, ctx.resolver);
            Some(MatchOutcome::with(format!(
                "geoip2_continent='{}' geoip2_country='{}' geoip2_city='{}'",
                info.continent, info.country, info.city
            )))
        }
    }
}

fn find_ip(index: &BstIndex<IpRecord>, query: &IpRecord) -> Option<()> {
    index.find(query, ip::cmp_ip).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(resolver: &'a Resolver, tls: &'a TlsCache, geoip: &'a GeoipLookup) -> MatchContext<'a> {
        MatchContext {
            resolver,
            tls_cache: tls,
            geoip,
        }
    }

    #[test]
    fn exact_string_driver() {
        let mut index = DriverIndex::new_empty(DriverKind::String);
        index.insert("ceo.example");
        let resolver = Resolver::new(1, 1);
        let tls = TlsCache::new(1, 1, None);
        let geoip = GeoipLookup::open("/nonexistent.mmdb").unwrap();
        let c = ctx(&resolver, &tls, &geoip);
        assert!(try_match(&index, "ceo.example", None, &c).is_some());
        assert!(try_match(&index, "bob.example", None, &c).is_none());
    }

    #[test]
    fn shell_glob_driver() {
        let mut index = DriverIndex::new_empty(DriverKind::Match);
        index.insert("*.example.com");
        let resolver = Resolver::new(1, 1);
        let tls = TlsCache::new(1, 1, None);
        let geoip = GeoipLookup::open("/nonexistent.mmdb").unwrap();
        let c = ctx(&resolver, &tls, &geoip);
        assert!(try_match(&index, "foo.example.com", None, &c).is_some());
        assert!(try_match(&index, "foo.example.org", None, &c).is_none());
    }

    #[test]
    fn ip_driver_cidr_note() {
        let mut index = DriverIndex::new_empty(DriverKind::Ip);
        index.insert("10.0.0.0/8");
        index.insert("192.168.0.0/16");
        let resolver = Resolver::new(1, 1);
        let tls = TlsCache::new(1, 1, None);
        let geoip = GeoipLookup::open("/nonexistent.mmdb").unwrap();
        let c = ctx(&resolver, &tls, &geoip);
        assert!(try_match(&index, "10.4.5.6", None, &c).is_some());
        assert!(try_match(&index, "172.16.0.1", None, &c).is_none());
    }
}
