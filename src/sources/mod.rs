//! Named producers of newline-delimited record text.
//!
//! Grounded on `original_source/src/source.c`. The core only ever calls
//! [`Source::data`]; everything else here is how each kind gets there.

use std::path::PathBuf;

use regex::RegexBuilder;

use crate::error::SourceError;

#[derive(Debug, Clone)]
pub enum Source {
    Raw(String),
    File(PathBuf),
    Sqlite3 { uri: String, query: String },
    Pgsql { conninfo: String, query: String },
    Memcached,
    Dummy,
}

impl Source {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Source::Raw(_) => "raw",
            Source::File(_) => "file",
            Source::Sqlite3 { .. } => "sqlite3",
            Source::Pgsql { .. } => "pgsql",
            Source::Memcached => "memcached",
            Source::Dummy => "dummy",
        }
    }

    /// Produce the source's newline-delimited record text. `filter`'s
    /// meaning depends on the source kind (see spec table in §4.1):
    /// unused for raw/sqlite3/pgsql/memcached/dummy, an optional
    /// case-insensitive extended regex for `file`.
    pub fn data(&self, filter: &str) -> Result<String, SourceError> {
        match self {
            Source::Raw(payload) => Ok(payload.replace(',', "\n")),
            Source::File(path) => read_file(path, filter),
            Source::Sqlite3 { uri, query } => read_sqlite3(uri, query),
            Source::Pgsql { conninfo, query } => read_pgsql(conninfo, query),
            Source::Memcached => Err(SourceError::Unsupported),
            Source::Dummy => Ok(String::new()),
        }
    }
}

fn read_file(path: &PathBuf, filter: &str) -> Result<String, SourceError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SourceError::Unreachable(format!("{}: {e}", path.display())))?;
    let stripped: String = raw.chars().filter(|&c| c != '\r').collect();

    if filter.trim().is_empty() {
        return Ok(stripped);
    }

    match RegexBuilder::new(filter).case_insensitive(true).build() {
        Ok(re) => {
            let filtered: Vec<&str> = stripped.lines().filter(|l| re.is_match(l)).collect();
            Ok(filtered.join("\n"))
        }
        Err(err) => {
            log::warn!("file source '{}': invalid filter '{filter}': {err}", path.display());
            Ok(stripped)
        }
    }
}

fn read_sqlite3(uri: &str, query: &str) -> Result<String, SourceError> {
    let conn = rusqlite::Connection::open_with_flags(
        uri,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_URI,
    )
    .map_err(|e| SourceError::Unreachable(format!("{uri}: {e}")))?;

    let mut stmt = conn
        .prepare(query)
        .map_err(|e| SourceError::Query(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| SourceError::Query(e.to_string()))?;

    let mut out = String::new();
    for row in rows {
        let value = row.map_err(|e| SourceError::Query(e.to_string()))?;
        out.push_str(&value.replace('\n', "\\\n"));
        out.push('\n');
    }
    Ok(out)
}

fn read_pgsql(conninfo: &str, query: &str) -> Result<String, SourceError> {
    // Sources are loaded once at init, before the request loop starts, so a
    // blocking handle onto the already-running runtime is appropriate here.
    let handle = tokio::runtime::Handle::try_current();
    let rows_fut = async {
        let (client, connection) = tokio_postgres::connect(conninfo, tokio_postgres::NoTls)
            .await
            .map_err(|e| SourceError::Unreachable(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                log::error!("pgsql source connection error: {err}");
            }
        });
        let rows = client
            .query(query, &[])
            .await
            .map_err(|e| SourceError::Query(e.to_string()))?;
        let mut out = String::new();
        for row in rows {
            let value: String = row
                .try_get(0)
                .map_err(|e| SourceError::Query(e.to_string()))?;
            out.push_str(&value.replace('\n', "\\\n"));
            out.push('\n');
        }
        Ok::<String, SourceError>(out)
    };

    match handle {
        Ok(h) => tokio::task::block_in_place(|| h.block_on(rows_fut)),
        Err(_) => {
            let rt = tokio::runtime::Runtime::new()
                .map_err(|e| SourceError::Unreachable(e.to_string()))?;
            rt.block_on(rows_fut)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_replaces_commas_with_newlines() {
        let src = Source::Raw("10.0.0.0/8,192.168.0.0/16".to_string());
        assert_eq!(src.data("").unwrap(), "10.0.0.0/8\n192.168.0.0/16");
    }

    #[test]
    fn memcached_is_unsupported() {
        let src = Source::Memcached;
        assert!(matches!(src.data(""), Err(SourceError::Unsupported)));
    }

    #[test]
    fn dummy_is_empty() {
        assert_eq!(Source::Dummy.data("").unwrap(), "");
    }

    #[test]
    fn file_source_reads_and_filters() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(f, "Alpha\nBeta\r\nGamma").unwrap();
        let src = Source::File(f.path().to_path_buf());
        let all = src.data("").unwrap();
        assert_eq!(all, "Alpha\nBeta\nGamma");
        let filtered = src.data("^b").unwrap();
        assert_eq!(filtered, "Beta");
    }

    #[test]
    fn file_source_invalid_filter_is_ignored() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(f, "line").unwrap();
        let src = Source::File(f.path().to_path_buf());
        let out = src.data("(unterminated").unwrap();
        assert_eq!(out, "line");
    }
}
