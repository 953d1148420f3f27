//! Command-line flags, grounded on the `clap` derive usage already present
//! in the teacher's sibling workspace members (`router-cli`, `router-api`).

use clap::Parser;

use crate::config;

/// Compiled-in matching driver families, surfaced via `-v` (spec.md's
/// supplemented feature string — see SPEC_FULL.md §3).
pub const FEATURES: &[&str] = &[
    "dummy", "string", "istring", "match", "imatch", "regex", "iregex", "pcre", "ipcre", "ip",
    "resolve", "dresolve", "ssl", "geoip2",
];

#[derive(Parser, Debug)]
#[command(name = "acl-helper", version, about = "External ACL helper for a caching HTTP proxy")]
pub struct Cli {
    /// Use <file> as the configuration file
    #[arg(short = 'c', long = "config", default_value = config::DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Validate configuration and exit
    #[arg(short = 't')]
    pub test_config: bool,

    /// Print the compiled-in matching driver features and exit
    #[arg(short = 'v', long = "features")]
    pub features: bool,
}

pub fn version_string() -> String {
    format!(
        "acl-helper {}\nfeatures: {}",
        env!("CARGO_PKG_VERSION"),
        FEATURES
            .iter()
            .map(|f| format!("+{f}"))
            .collect::<Vec<_>>()
            .join(" ")
    )
}
