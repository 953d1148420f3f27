//! Option scopes: `key=value` dictionaries loaded from a source, consulted
//! by the `%{scope&name|default}` late-binding substitution used in checker
//! configuration fields.
//!
//! Grounded on `original_source/src/options.c`'s `options_load()` and
//! `options_subst()`.

use std::collections::HashMap;

use crate::sources::Source;

/// A named `key = value` map loaded once at init from a source.
pub struct OptionScope {
    pub name: String,
    map: HashMap<String, String>,
}

impl OptionScope {
    pub fn load(name: &str, source: &Source, filter: &str) -> anyhow::Result<Self> {
        let text = source.data(filter)?;
        Ok(OptionScope {
            name: name.to_string(),
            map: parse_kv(&text),
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }
}

/// Parse `# comment`-stripped, backslash-continued `key = value` lines.
/// First occurrence of a duplicate key wins.
fn parse_kv(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut pending = String::new();
    for raw in text.lines() {
        let line = if let Some(stripped) = raw.strip_suffix('\\') {
            pending.push_str(stripped);
            continue;
        } else {
            pending.push_str(raw);
            std::mem::take(&mut pending)
        };

        let without_comment = strip_comment(&line);
        let trimmed = without_comment.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(eq) = trimmed.find('=') {
            let key = trimmed[..eq].trim().to_string();
            let value = trimmed[eq + 1..].trim().to_string();
            map.entry(key).or_insert(value);
        }
    }
    map
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Run `%{...}` substitution against `s` using `scopes` in declaration
/// order. Returns `None` if an unterminated `%{` is found anywhere in the
/// string, in which case the caller must leave the original unchanged.
pub fn substitute(s: &str, scopes: &[OptionScope]) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    loop {
        match rest.find("%{") {
            None => {
                out.push_str(rest);
                return Some(out);
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after = &rest[start + 2..];
                let end = after.find('}')?;
                let expr = &after[..end];
                out.push_str(&resolve_expr(expr, scopes));
                rest = &after[end + 1..];
            }
        }
    }
}

/// Resolve one `scope&name|default` expression (the part between `%{` and
/// `}`). Missing value with no default substitutes the empty string.
fn resolve_expr(expr: &str, scopes: &[OptionScope]) -> String {
    let (lookup, default) = match expr.find('|') {
        Some(pos) => (&expr[..pos], Some(&expr[pos + 1..])),
        None => (expr, None),
    };

    let (scope_name, option_name) = match lookup.find('&') {
        Some(pos) => {
            let scope = &lookup[..pos];
            let name = &lookup[pos + 1..];
            if scope.is_empty() {
                (None, name)
            } else {
                (Some(scope), name)
            }
        }
        None => (None, lookup),
    };

    let found = match scope_name {
        Some(scope) => scopes
            .iter()
            .find(|sc| sc.name == scope)
            .and_then(|sc| sc.get(option_name)),
        None => scopes.iter().find_map(|sc| sc.get(option_name)),
    };

    found
        .map(|v| v.to_string())
        .or_else(|| default.map(|d| d.to_string()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(name: &str, pairs: &[(&str, &str)]) -> OptionScope {
        OptionScope {
            name: name.to_string(),
            map: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn scoped_lookup() {
        let scopes = vec![scope("sys", &[("enabled", "on")])];
        assert_eq!(
            substitute("%{sys&enabled}", &scopes),
            Some("on".to_string())
        );
    }

    #[test]
    fn unscoped_lookup_searches_declaration_order() {
        let scopes = vec![scope("a", &[]), scope("b", &[("x", "1")])];
        assert_eq!(substitute("%{x}", &scopes), Some("1".to_string()));
        assert_eq!(substitute("%{&x}", &scopes), Some("1".to_string()));
    }

    #[test]
    fn default_used_when_missing() {
        let scopes = vec![scope("sys", &[])];
        assert_eq!(
            substitute("%{sys&enabled|on}", &scopes),
            Some("on".to_string())
        );
    }

    #[test]
    fn missing_no_default_is_empty_string() {
        let scopes = vec![scope("sys", &[])];
        assert_eq!(substitute("%{sys&enabled}", &scopes), Some(String::new()));
    }

    #[test]
    fn unterminated_brace_nullifies_substitution() {
        let scopes = vec![scope("sys", &[("a", "1")])];
        assert_eq!(substitute("foo %{sys&a bar", &scopes), None);
    }

    #[test]
    fn parses_kv_with_comments_and_continuation() {
        let text = "a = 1 # comment\nb \\\n= 2\n# full comment\nc=3\na=ignored";
        let map = parse_kv(text);
        assert_eq!(map.get("a").map(|s| s.as_str()), Some("1"));
        assert_eq!(map.get("b").map(|s| s.as_str()), Some("2"));
        assert_eq!(map.get("c").map(|s| s.as_str()), Some("3"));
    }
}
