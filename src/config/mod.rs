//! The configuration file reader: a bespoke `<key> = <value>` line grammar
//! with colon-delimited sub-grammars for `checker=`, `source=`, `options=`
//! and `log=`.
//!
//! Grounded on `original_source/src/conf.c`. No templating/derive crate is
//! used here (see DESIGN.md for why `mini-config` was dropped): the format
//! is specific enough to this one grammar that a hand-written reader is
//! both simpler and more faithful.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::checkers::RawChecker;
use crate::error::ConfigError;
use crate::sources::Source;

pub const DEFAULT_CONFIG_FILE: &str = "./acl-helper.conf";
pub const DEFAULT_CONCURRENCY: u8 = 10;
pub const MAX_CONCURRENCY: u8 = 255;
pub const DEFAULT_SSL_TIMEOUT: u64 = 10;
pub const DEFAULT_SSL_VERIFY_TTL: u64 = 86400;
pub const DEFAULT_RESOLVE_TTL: u64 = 3600;
pub const DEFAULT_NEG_RESOLVE_TTL: u64 = 60;
pub const DEFAULT_CA_FILE: &str = "/etc/ssl/certs/ca-bundle.crt";
pub const DEFAULT_GEOIP2_DB_FILE: &str = "/usr/share/GeoIP/GeoLite2-City.mmdb";

#[derive(Debug, Clone)]
pub enum LogTarget {
    Stderr,
    File { ident: String, path: PathBuf },
    Syslog { ident: String, facility: String },
}

#[derive(Debug, Clone)]
pub struct OptionScopeSpec {
    pub name: String,
    pub source_ref: String,
    pub source_filter: String,
}

/// Fully parsed configuration, ready for subsystem init.
pub struct Config {
    pub debug: u8,
    pub pidfile: Option<PathBuf>,
    pub concurrency: u8,
    pub user: Option<String>,
    pub group: Option<String>,
    pub log: LogTarget,
    pub sources: HashMap<String, Source>,
    pub source_order: Vec<String>,
    pub checkers: Vec<RawChecker>,
    pub option_scopes: Vec<OptionScopeSpec>,
    pub ssl_ca_file: String,
    pub ssl_timeout: u64,
    pub ssl_verify_ttl: u64,
    pub resolve_ttl: u64,
    pub resolve_neg_ttl: u64,
    pub geoip2_db: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debug: 0,
            pidfile: None,
            concurrency: DEFAULT_CONCURRENCY,
            user: None,
            group: None,
            log: LogTarget::Stderr,
            sources: HashMap::new(),
            source_order: Vec::new(),
            checkers: Vec::new(),
            option_scopes: Vec::new(),
            ssl_ca_file: DEFAULT_CA_FILE.to_string(),
            ssl_timeout: DEFAULT_SSL_TIMEOUT,
            ssl_verify_ttl: DEFAULT_SSL_VERIFY_TTL,
            resolve_ttl: DEFAULT_RESOLVE_TTL,
            resolve_neg_ttl: DEFAULT_NEG_RESOLVE_TTL,
            geoip2_db: DEFAULT_GEOIP2_DB_FILE.to_string(),
        }
    }
}

pub fn load(path: &std::path::Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    parse(&text, &path.display().to_string())
}

fn parse(text: &str, path: &str) -> Result<Config, ConfigError> {
    let mut config = Config::default();
    let mut checker_names = std::collections::HashSet::new();
    let mut source_names = std::collections::HashSet::new();
    let mut scope_names = std::collections::HashSet::new();

    let mut pending = String::new();
    let mut physical_line = 0usize;
    let mut logical_start = 0usize;

    for raw in text.lines() {
        physical_line += 1;
        if pending.is_empty() {
            logical_start = physical_line;
        }
        if let Some(stripped) = raw.strip_suffix('\\') {
            pending.push_str(stripped);
            continue;
        }
        pending.push_str(raw);
        let line = std::mem::take(&mut pending);

        let trimmed = strip_comment(&line).trim();
        if trimmed.is_empty() {
            continue;
        }

        let (key, value) = trimmed.split_once('=').ok_or_else(|| ConfigError::Syntax {
            path: path.to_string(),
            line: logical_start,
            message: format!("expected '<key> = <value>', got '{trimmed}'"),
        })?;
        let key = key.trim();
        let value = value.trim();

        apply_directive(&mut config, key, value, path, logical_start, &mut checker_names, &mut source_names, &mut scope_names)?;
    }

    Ok(config)
}

#[allow(clippy::too_many_arguments)]
fn apply_directive(
    config: &mut Config,
    key: &str,
    value: &str,
    path: &str,
    line: usize,
    checker_names: &mut std::collections::HashSet<String>,
    source_names: &mut std::collections::HashSet<String>,
    scope_names: &mut std::collections::HashSet<String>,
) -> Result<(), ConfigError> {
    let err = |message: String| ConfigError::Syntax {
        path: path.to_string(),
        line,
        message,
    };

    match key {
        "debug" => {
            config.debug = parse_ranged(value, 0, 10, key)?;
        }
        "pidfile" => {
            config.pidfile = Some(PathBuf::from(value));
        }
        "concurrency" => {
            config.concurrency = parse_ranged(value, 0, MAX_CONCURRENCY as u64, key)? as u8;
        }
        "user" => {
            config.user = Some(value.to_string());
        }
        "group" => {
            config.group = Some(value.to_string());
        }
        "log" => {
            config.log = parse_log(value).map_err(|m| err(m))?;
        }
        "checker" => {
            let raw = parse_checker(value).map_err(|m| err(m))?;
            if !checker_names.insert(raw.name.clone()) {
                return Err(ConfigError::DuplicateName(raw.name));
            }
            config.checkers.push(raw);
        }
        "source" => {
            let (name, source) = parse_source(value).map_err(|m| err(m))?;
            if !source_names.insert(name.clone()) {
                return Err(ConfigError::DuplicateName(name));
            }
            config.source_order.push(name.clone());
            config.sources.insert(name, source);
        }
        "options" => {
            let spec = parse_options_spec(value).map_err(|m| err(m))?;
            if !scope_names.insert(spec.name.clone()) {
                return Err(ConfigError::DuplicateName(spec.name));
            }
            config.option_scopes.push(spec);
        }
        "ssl_ca_file" => {
            config.ssl_ca_file = value.to_string();
        }
        "ssl_timeout" => {
            config.ssl_timeout = parse_ranged(value, 0, 3600, key)?;
        }
        "ssl_verify_ttl" => {
            config.ssl_verify_ttl = parse_ranged(value, 0, 604800, key)?;
        }
        "resolve_ttl" => {
            config.resolve_ttl = parse_ranged(value, 0, 604800, key)?;
        }
        "resolve_neg_ttl" => {
            config.resolve_neg_ttl = parse_ranged(value, 0, 604800, key)?;
        }
        "geoip2_db" => {
            config.geoip2_db = value.to_string();
        }
        _ => return Err(ConfigError::UnknownKey(key.to_string())),
    }
    Ok(())
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn parse_ranged(value: &str, min: u64, max: u64, key: &str) -> Result<u64, ConfigError> {
    let n: u64 = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::OutOfRange {
            key: key.to_string(),
            value: value.to_string(),
        })?;
    if n < min || n > max {
        return Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(n)
}

/// `name:enable:idx:driver:action:notes:source:source_filter` — seven
/// colons, note text and filter may be empty. `splitn` preserves embedded
/// colons in the trailing filter field.
fn parse_checker(value: &str) -> Result<RawChecker, String> {
    let parts: Vec<&str> = value.splitn(8, ':').collect();
    if parts.len() != 8 {
        return Err(format!("checker line needs 8 colon-separated fields, got {}", parts.len()));
    }
    Ok(RawChecker {
        name: parts[0].to_string(),
        enabled: parts[1].to_string(),
        field_index: parts[2].to_string(),
        driver: parts[3].to_string(),
        action: parts[4].to_string(),
        note_text: parts[5].to_string(),
        source_ref: parts[6].to_string(),
        source_filter: parts[7].to_string(),
    })
}

/// `name:kind:params`
fn parse_source(value: &str) -> Result<(String, Source), String> {
    let parts: Vec<&str> = value.splitn(3, ':').collect();
    if parts.len() < 2 {
        return Err(format!("source line needs at least 'name:kind', got '{value}'"));
    }
    let name = parts[0].to_string();
    let kind = parts[1];
    let params = parts.get(2).copied().unwrap_or("");

    let source = match kind {
        "raw" => Source::Raw(params.to_string()),
        "file" => Source::File(PathBuf::from(params)),
        "sqlite3" => {
            let (uri, query) = params
                .split_once(':')
                .ok_or_else(|| "sqlite3 source needs 'uri:query'".to_string())?;
            Source::Sqlite3 {
                uri: uri.to_string(),
                query: query.to_string(),
            }
        }
        "pgsql" => {
            let (conninfo, query) = params
                .split_once(':')
                .ok_or_else(|| "pgsql source needs 'conninfo:query'".to_string())?;
            Source::Pgsql {
                conninfo: conninfo.to_string(),
                query: query.to_string(),
            }
        }
        "memcached" => Source::Memcached,
        "dummy" => Source::Dummy,
        other => return Err(format!("unknown source kind '{other}'")),
    };
    Ok((name, source))
}

/// `name:source_name:source_filter`
fn parse_options_spec(value: &str) -> Result<OptionScopeSpec, String> {
    let parts: Vec<&str> = value.splitn(3, ':').collect();
    if parts.len() < 2 {
        return Err(format!("options line needs at least 'name:source', got '{value}'"));
    }
    Ok(OptionScopeSpec {
        name: parts[0].to_string(),
        source_ref: parts[1].to_string(),
        source_filter: parts.get(2).copied().unwrap_or("").to_string(),
    })
}

/// `file:<ident>:<path>` or `syslog:<ident>:<facility>`
fn parse_log(value: &str) -> Result<LogTarget, String> {
    let parts: Vec<&str> = value.splitn(3, ':').collect();
    match parts.as_slice() {
        ["file", ident, path] => Ok(LogTarget::File {
            ident: ident.to_string(),
            path: PathBuf::from(path),
        }),
        ["syslog", ident, facility] => {
            if !matches!(
                *facility,
                "local0" | "local1" | "local2" | "local3" | "local4" | "local5" | "local6" | "local7"
            ) {
                return Err(format!("unsupported syslog facility '{facility}'"));
            }
            Ok(LogTarget::Syslog {
                ident: ident.to_string(),
                facility: facility.to_string(),
            })
        }
        _ => Err(format!("log line must be 'file:<ident>:<path>' or 'syslog:<ident>:<facility>', got '{value}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_checker_line() {
        let raw = parse_checker("block:on:1:string:miss::src:").unwrap();
        assert_eq!(raw.name, "block");
        assert_eq!(raw.enabled, "on");
        assert_eq!(raw.field_index, "1");
        assert_eq!(raw.driver, "string");
        assert_eq!(raw.action, "miss");
        assert_eq!(raw.note_text, "");
        assert_eq!(raw.source_ref, "src");
        assert_eq!(raw.source_filter, "");
    }

    #[test]
    fn parses_source_raw() {
        let (name, source) = parse_source("src:raw:10.0.0.0/8,192.168.0.0/16").unwrap();
        assert_eq!(name, "src");
        matches!(source, Source::Raw(_));
    }

    #[test]
    fn full_config_round_trip() {
        let text = "\
debug = 3
concurrency = 8
pidfile = /run/acl-helper.pid
log = file:aclh:/var/log/aclh.log
source = src:raw:ceo.example
checker = block:on:1:string:miss::src:
options = sys:src:
ssl_timeout = 5
";
        let config = parse(text, "test").unwrap();
        assert_eq!(config.debug, 3);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.checkers.len(), 1);
        assert_eq!(config.option_scopes.len(), 1);
        assert_eq!(config.ssl_timeout, 5);
    }

    #[test]
    fn backslash_continuation_joins_lines() {
        let text = "source = src:raw:a,\\\nb,c\n";
        let config = parse(text, "test").unwrap();
        let src = config.sources.get("src").unwrap();
        assert_eq!(src.data("").unwrap(), "a\nb\nc");
    }

    #[test]
    fn unknown_key_is_an_error() {
        let err = parse("bogus = 1\n", "test").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(_)));
    }

    #[test]
    fn duplicate_checker_name_is_an_error() {
        let text = "\
source = s:dummy:
checker = a:on:0:dummy:note::s:
checker = a:on:0:dummy:note::s:
";
        let err = parse(text, "test");
        assert!(matches!(err, Err(ConfigError::DuplicateName(_))));
    }
}
