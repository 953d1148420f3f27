//! The ordered checker chain: configuration, per-field substitution,
//! index loading, and the per-request short-circuit walk.
//!
//! Grounded on `original_source/src/checker.c` (`checkers_init`,
//! `checkers_call`).

use std::collections::HashMap;

use crate::matchers::{try_match, DriverIndex, DriverKind, MatchContext};
use crate::options::{substitute, OptionScope};
use crate::sources::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Hit,
    Miss,
    Note,
}

impl Action {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hit" => Some(Action::Hit),
            "miss" => Some(Action::Miss),
            "note" => Some(Action::Note),
            _ => None,
        }
    }
}

/// A checker's raw, pre-substitution configuration. `source`/`source_filter`
/// are never substituted (spec.md §4.2) and are stored already resolved.
#[derive(Debug, Clone)]
pub struct RawChecker {
    pub name: String,
    pub enabled: String,
    pub field_index: String,
    pub driver: String,
    pub action: String,
    pub note_text: String,
    pub source_ref: String,
    pub source_filter: String,
}

impl RawChecker {
    /// Run `%{...}` substitution over the five substitutable fields and
    /// parse the results. An unterminated `%{` leaves that particular field
    /// unchanged (spec.md §4.2: callers treat `None` as "leave original").
    fn resolve(&self) -> ResolvedRaw {
        ResolvedRaw {
            enabled: self.enabled.clone(),
            field_index: self.field_index.clone(),
            driver: self.driver.clone(),
            action: self.action.clone(),
            note_text: self.note_text.clone(),
        }
    }

    fn substitute_with(&self, scopes: &[OptionScope]) -> ResolvedRaw {
        ResolvedRaw {
            enabled: substitute(&self.enabled, scopes).unwrap_or_else(|| self.enabled.clone()),
            field_index: substitute(&self.field_index, scopes)
                .unwrap_or_else(|| self.field_index.clone()),
            driver: substitute(&self.driver, scopes).unwrap_or_else(|| self.driver.clone()),
            action: substitute(&self.action, scopes).unwrap_or_else(|| self.action.clone()),
            note_text: substitute(&self.note_text, scopes)
                .unwrap_or_else(|| self.note_text.clone()),
        }
    }
}

struct ResolvedRaw {
    enabled: String,
    field_index: String,
    driver: String,
    action: String,
    note_text: String,
}

/// A fully loaded checker: substitution applied, driver parsed, index
/// built from its source's records. Read-only for the rest of the process
/// lifetime; the chain walk takes no lock (spec.md §5).
pub struct Checker {
    pub name: String,
    pub enabled: bool,
    pub field_index: usize,
    pub action: Action,
    pub note_text: String,
    pub index: DriverIndex,
}

pub const MAX_FIELD_INDEX: usize = 64;

impl Checker {
    pub fn load(
        raw: &RawChecker,
        scopes: &[OptionScope],
        sources: &HashMap<String, Source>,
    ) -> anyhow::Result<Self> {
        let resolved = if scopes.is_empty() {
            raw.resolve()
        } else {
            raw.substitute_with(scopes)
        };

        let enabled = parse_bool(&resolved.enabled);
        let field_index: usize = resolved.field_index.trim().parse().unwrap_or(0);
        if field_index > MAX_FIELD_INDEX {
            log::warn!(
                "checker '{}': field_index {field_index} exceeds {MAX_FIELD_INDEX}, disabling",
                raw.name
            );
            return Ok(Checker {
                name: raw.name.clone(),
                enabled: false,
                field_index,
                action: Action::Note,
                note_text: String::new(),
                index: DriverIndex::Dummy,
            });
        }

        let driver_kind = match DriverKind::parse(resolved.driver.trim()) {
            Some(k) => k,
            None => {
                log::warn!(
                    "checker '{}': unknown driver '{}', disabling",
                    raw.name,
                    resolved.driver
                );
                return Ok(Checker {
                    name: raw.name.clone(),
                    enabled: false,
                    field_index,
                    action: Action::Note,
                    note_text: String::new(),
                    index: DriverIndex::Dummy,
                });
            }
        };

        let action = Action::parse(resolved.action.trim()).unwrap_or(Action::Note);

        let mut index = DriverIndex::new_empty(driver_kind);
        if !matches!(index, DriverIndex::Ssl | DriverIndex::Geoip2) {
            match sources.get(&raw.source_ref) {
                Some(source) => match source.data(&raw.source_filter) {
                    Ok(text) => {
                        for line in text.lines() {
                            index.insert(line);
                        }
                    }
                    Err(err) => {
                        log::warn!("checker '{}': source failed: {err}", raw.name);
                    }
                },
                None => {
                    log::warn!(
                        "checker '{}': unknown source '{}'",
                        raw.name,
                        raw.source_ref
                    );
                }
            }
        }

        Ok(Checker {
            name: raw.name.clone(),
            enabled,
            field_index,
            action,
            note_text: resolved.note_text,
            index,
        })
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "on" | "1" | "true" | "yes" | "enable" | "enabled"
    )
}

/// Walk the chain in order, short-circuiting per spec.md §4.4. Returns the
/// full response body (verdict, space-joined notes, `message="..."`), not
/// including any sequence-ID prefix (that is the request loop's concern).
pub fn match_request(checkers: &[Checker], tokens: &[String], max_index: usize, ctx: &MatchContext) -> String {
    let mut notes: Vec<String> = Vec::new();
    let mut verdict_is_err = false;

    for checker in checkers {
        if !checker.enabled {
            continue;
        }
        if checker.field_index > max_index {
            log::warn!(
                "checker '{}': field_index {} exceeds request token count",
                checker.name,
                checker.field_index
            );
            continue;
        }

        let token = &tokens[checker.field_index];
        let next_token = tokens.get(checker.field_index + 1).map(|s| s.as_str());
        let outcome = try_match(&checker.index, token, next_token, ctx);

        let matched = outcome.is_some();
        if let Some(outcome) = &outcome {
            if !checker.note_text.is_empty() {
                notes.push(checker.note_text.clone());
            }
            if let Some(annotation) = &outcome.annotation {
                notes.push(annotation.clone());
            }
        }

        let stop = (matched && checker.action == Action::Hit)
            || (!matched && checker.action == Action::Miss);

        if stop {
            verdict_is_err = !matched && checker.action == Action::Miss;
            break;
        }
    }

    let verdict = if verdict_is_err { "ERR" } else { "OK" };
    let notes_joined = notes.join(" ");
    let message = if notes_joined.is_empty() {
        "(none)".to_string()
    } else {
        notes_joined.clone()
    };
    format!("{verdict} {notes_joined} message=\"{message}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geoip::GeoipLookup;
    use crate::resolver::Resolver;
    use crate::tls::TlsCache;

    fn load_one(raw: &RawChecker, sources: &HashMap<String, Source>) -> Checker {
        Checker::load(raw, &[], sources).unwrap()
    }

    fn context(resolver: &Resolver, tls: &TlsCache, geoip: &GeoipLookup) -> MatchContext<'_> {
        MatchContext {
            resolver,
            tls_cache: tls,
            geoip,
        }
    }

    // spec.md §8 scenario 1: exact string miss -> deny.
    #[test]
    fn scenario_exact_string_miss_denies() {
        let mut sources = HashMap::new();
        sources.insert("src".to_string(), Source::Raw("ceo.example".to_string()));
        let raw = RawChecker {
            name: "block".to_string(),
            enabled: "on".to_string(),
            field_index: "1".to_string(),
            driver: "string".to_string(),
            action: "miss".to_string(),
            note_text: "".to_string(),
            source_ref: "src".to_string(),
            source_filter: "".to_string(),
        };
        let checker = load_one(&raw, &sources);
        let tokens = vec!["1".to_string(), "bob.example".to_string()];
        let resolver = Resolver::new(1, 1);
        let tls = TlsCache::new(1, 1, None);
        let geoip = GeoipLookup::open("/nonexistent.mmdb").unwrap();
        let ctx = context(&resolver, &tls, &geoip);
        let resp = match_request(std::slice::from_ref(&checker), &tokens, tokens.len() - 1, &ctx);
        assert_eq!(resp, "ERR  message=\"(none)\"");
    }

    // spec.md §8 scenario 2: CIDR note.
    #[test]
    fn scenario_cidr_note() {
        let mut sources = HashMap::new();
        sources.insert(
            "src".to_string(),
            Source::Raw("10.0.0.0/8,192.168.0.0/16".to_string()),
        );
        let raw = RawChecker {
            name: "tag".to_string(),
            enabled: "on".to_string(),
            field_index: "1".to_string(),
            driver: "ip".to_string(),
            action: "note".to_string(),
            note_text: "internal".to_string(),
            source_ref: "src".to_string(),
            source_filter: "".to_string(),
        };
        let checker = load_one(&raw, &sources);
        let tokens = vec!["7".to_string(), "10.4.5.6".to_string()];
        let resolver = Resolver::new(1, 1);
        let tls = TlsCache::new(1, 1, None);
        let geoip = GeoipLookup::open("/nonexistent.mmdb").unwrap();
        let ctx = context(&resolver, &tls, &geoip);
        let resp = match_request(std::slice::from_ref(&checker), &tokens, tokens.len() - 1, &ctx);
        assert_eq!(resp, "OK internal message=\"internal\"");
    }

    #[test]
    fn disabled_checker_contributes_nothing() {
        let mut sources = HashMap::new();
        sources.insert("src".to_string(), Source::Dummy);
        let raw = RawChecker {
            name: "off".to_string(),
            enabled: "off".to_string(),
            field_index: "0".to_string(),
            driver: "dummy".to_string(),
            action: "hit".to_string(),
            note_text: "should-not-appear".to_string(),
            source_ref: "src".to_string(),
            source_filter: "".to_string(),
        };
        let checker = load_one(&raw, &sources);
        let tokens = vec!["x".to_string()];
        let resolver = Resolver::new(1, 1);
        let tls = TlsCache::new(1, 1, None);
        let geoip = GeoipLookup::open("/nonexistent.mmdb").unwrap();
        let ctx = context(&resolver, &tls, &geoip);
        let resp = match_request(std::slice::from_ref(&checker), &tokens, 0, &ctx);
        assert_eq!(resp, "OK  message=\"(none)\"");
    }
}
