//! # acl-helper
//!
//! External access-control helper for a caching HTTP proxy (a Squid-style
//! `external_acl_type` helper). Reads one request per line on standard
//! input, evaluates a configured chain of checkers against the request's
//! tokens, and replies with an allow/deny verdict plus annotations.
//!
//! ## Architecture
//!
//! - **Sources** produce raw record text (inline, file, SQL, ...).
//! - **Option scopes** reinterpret source text as `key=value` maps used by
//!   `%{...}` substitution in checker configuration.
//! - **Matching drivers** compile source records into per-driver indices
//!   (exact, glob, regex, PCRE, IP/CIDR, DNS forward/reverse sets, TLS
//!   probe, GeoIP).
//! - **Checkers** form the ordered policy chain evaluated per request.
//! - The **request loop** reads stdin, bounds live workers by
//!   `concurrency`, and writes responses back to stdout.
//!
//! Reconfiguration happens by re-executing the process image on SIGHUP;
//! SIGINT/SIGTERM/SIGQUIT run a clean exit hook instead.

mod checkers;
mod cli;
mod config;
mod container;
mod error;
mod geoip;
mod loop_run;
mod logger;
mod matchers;
mod options;
mod pidfile;
mod privilege;
mod request;
mod resolver;
mod respawn;
mod signal;
mod sources;
mod tls;

use std::sync::Arc;

use clap::Parser;

use checkers::Checker;
use error::ExitCode;
use geoip::GeoipLookup;
use matchers::DriverKind;
use options::OptionScope;
use resolver::Resolver;
use tls::TlsCache;

#[tokio::main]
async fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if err.kind() == clap::error::ErrorKind::DisplayHelp
                || err.kind() == clap::error::ErrorKind::DisplayVersion
            {
                print!("{err}");
                std::process::exit(ExitCode::Success.into());
            }
            eprintln!("{err}");
            std::process::exit(ExitCode::BadOptions.into());
        }
    };

    // Extra-verbose version output beyond clap's generated string: lists
    // the compiled-in matching driver families (spec.md's supplemented
    // `-v` feature string, see SPEC_FULL.md §3).
    if cli.features {
        println!("{}", cli::version_string());
        std::process::exit(ExitCode::Success.into());
    }

    let config_path = std::path::PathBuf::from(&cli.config);
    let config = match config::load(&config_path) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(ExitCode::ConfigError.into());
        }
    };

    if cli.test_config {
        println!("configuration OK");
        std::process::exit(ExitCode::Success.into());
    }

    if let Err(err) = logger::HelperLogger::install(&config.log, config.debug) {
        eprintln!("failed to initialize logging: {err}");
        std::process::exit(ExitCode::ConfigError.into());
    }

    log::info!("acl-helper starting, config = {}", config_path.display());

    if let Some(pidfile_path) = &config.pidfile {
        if let Err(err) = pidfile::write(pidfile_path) {
            log::error!("pidfile error: {err}");
            std::process::exit(ExitCode::PidfileOrPrivilege.into());
        }
    }

    if config.group.is_some() || config.user.is_some() {
        if let Err(err) =
            privilege::drop_privileges(config.user.as_deref(), config.group.as_deref())
        {
            log::error!("privilege drop failed: {err}");
            let code = match err {
                privilege::PrivilegeError::UnknownGroup | privilege::PrivilegeError::SetGid => {
                    ExitCode::PidfileOrPrivilege
                }
                privilege::PrivilegeError::UnknownUser | privilege::PrivilegeError::SetUid => {
                    ExitCode::PrivilegeSplit
                }
            };
            std::process::exit(code.into());
        }
    }

    // Eagerly validate every source a checker actually depends on, matching
    // acl-helper.c's sources_init() (exit 10 on failure) rather than
    // discovering a bad source later, per-checker, with a silent warning.
    for raw in &config.checkers {
        let needs_source = !matches!(
            DriverKind::parse(raw.driver.trim()),
            Some(DriverKind::Ssl) | Some(DriverKind::Geoip2)
        );
        if !needs_source {
            continue;
        }
        match config.sources.get(&raw.source_ref) {
            Some(source) => {
                if let Err(err) = source.data(&raw.source_filter) {
                    log::error!(
                        "checker '{}': source '{}' failed: {err}",
                        raw.name,
                        raw.source_ref
                    );
                    std::process::exit(ExitCode::SourcesInit.into());
                }
            }
            None => {
                log::error!("checker '{}': unknown source '{}'", raw.name, raw.source_ref);
                std::process::exit(ExitCode::SourcesInit.into());
            }
        }
    }

    let mut option_scopes: Vec<OptionScope> = Vec::with_capacity(config.option_scopes.len());
    for spec in &config.option_scopes {
        let source = match config.sources.get(&spec.source_ref) {
            Some(source) => source,
            None => {
                log::error!(
                    "option scope '{}': unknown source '{}'",
                    spec.name,
                    spec.source_ref
                );
                std::process::exit(ExitCode::OptionsInit.into());
            }
        };
        match OptionScope::load(&spec.name, source, &spec.source_filter) {
            Ok(scope) => option_scopes.push(scope),
            Err(err) => {
                log::error!("option scope '{}' failed to load: {err}", spec.name);
                std::process::exit(ExitCode::OptionsInit.into());
            }
        }
    }

    let resolver = Resolver::new(config.resolve_ttl, config.resolve_neg_ttl);

    let tls_cache = TlsCache::new(
        config.ssl_verify_ttl,
        config.ssl_timeout,
        Some(config.ssl_ca_file.clone()),
    );

    let geoip = match GeoipLookup::open(&config.geoip2_db) {
        Ok(g) => g,
        Err(err) => {
            log::error!("geoip2 init failed: {err}");
            std::process::exit(ExitCode::GeoipInit.into());
        }
    };

    let mut checkers = Vec::with_capacity(config.checkers.len());
    for raw in &config.checkers {
        match Checker::load(raw, &option_scopes, &config.sources) {
            Ok(checker) => checkers.push(checker),
            Err(err) => {
                log::error!("checker '{}' failed to load: {err}", raw.name);
                std::process::exit(ExitCode::CheckersInit.into());
            }
        }
    }

    let exe_path = respawn::discover_exe_path();
    if exe_path.is_none() {
        log::warn!("could not discover executable path; SIGHUP reload is disabled");
    }
    if let Err(err) = signal::install(config.pidfile.clone(), exe_path) {
        log::error!("failed to install signal handlers: {err}");
    }

    let state = Arc::new(loop_run::RequestLoopState {
        checkers,
        resolver,
        tls_cache,
        geoip,
        concurrency: config.concurrency,
    });

    log::info!("ready, concurrency = {}", config.concurrency);
    if let Err(err) = loop_run::run(state).await {
        log::error!("request loop failed: {err}");
        if let Some(pidfile_path) = &config.pidfile {
            pidfile::remove(pidfile_path);
        }
        std::process::exit(ExitCode::RequestLoop.into());
    }

    if let Some(pidfile_path) = &config.pidfile {
        pidfile::remove(pidfile_path);
    }
}
