//! TLS peer-certificate verification probe.
//!
//! Grounded on `original_source/src/ssl.c`'s `verify_host()` and on
//! `router-core`'s existing `openssl` (vendored) dependency. The manual
//! non-blocking-connect-plus-`select()` dance the C code needs is a single
//! `TcpStream::connect_timeout` call in Rust; the rest of the state machine
//! (resolve, handshake, verify result) is unchanged.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use parking_lot::Mutex;

use crate::resolver::Resolver;

/// `verify_host(hostname, port, timeout) -> i32`. Returns the library's
/// X.509 verification result code on a completed handshake (0 = valid,
/// nonzero = reason), or `-1` if the probe could not complete at all
/// (unresolvable host, connect timeout, handshake failure).
pub fn verify_host(
    hostname: &str,
    port: u16,
    timeout: Duration,
    ca_file: Option<&str>,
    resolver: &Resolver,
) -> i32 {
    let ip = match resolver.resolve(hostname).into_iter().next() {
        Some(ip) => ip,
        None => return -1,
    };

    let addr = SocketAddr::from((ip, port));
    let stream = match TcpStream::connect_timeout(&addr, timeout) {
        Ok(s) => s,
        Err(err) => {
            log::debug!("ssl probe: connect to {hostname}:{port} failed: {err}");
            return -1;
        }
    };

    let mut builder = match SslConnector::builder(SslMethod::tls()) {
        Ok(b) => b,
        Err(err) => {
            log::error!("ssl probe: connector build failed: {err}");
            return -1;
        }
    };
    builder.set_verify(SslVerifyMode::PEER);
    if let Some(ca) = ca_file {
        if let Err(err) = builder.set_ca_file(ca) {
            log::warn!("ssl probe: ca file '{ca}' failed to load: {err}");
        }
    }
    let connector = builder.build();

    let configuration = match connector.configure() {
        Ok(c) => c,
        Err(err) => {
            log::error!("ssl probe: configure failed: {err}");
            return -1;
        }
    };

    match configuration.connect(hostname, stream) {
        Ok(ssl_stream) => {
            let code = ssl_stream.ssl().verify_result();
            code.as_raw()
        }
        Err(_) => -1,
    }
}

#[derive(Clone)]
struct CachedVerify {
    code: i32,
    expiry: Instant,
}

/// Caches verification results keyed by the bare `hostname + port`
/// concatenation (no delimiter), matching the original exactly.
pub struct TlsCache {
    entries: Mutex<HashMap<String, Arc<Mutex<Option<CachedVerify>>>>>,
    ttl: Duration,
    timeout: Duration,
    ca_file: Option<String>,
}

impl TlsCache {
    pub fn new(ttl_secs: u64, timeout_secs: u64, ca_file: Option<String>) -> Self {
        TlsCache {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_secs),
            timeout: Duration::from_secs(timeout_secs),
            ca_file,
        }
    }

    pub fn verify(&self, hostname: &str, port: u16, resolver: &Resolver) -> i32 {
        let key = format!("{hostname}{port}");
        let slot = {
            let mut entries = self.entries.lock();
            entries
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .clone()
        };

        let fresh = {
            let guard = slot.lock();
            guard
                .as_ref()
                .filter(|c| Instant::now() < c.expiry)
                .map(|c| c.code)
        };
        if let Some(code) = fresh {
            return code;
        }

        let code = verify_host(
            hostname,
            port,
            self.timeout,
            self.ca_file.as_deref(),
            resolver,
        );
        let mut guard = slot.lock();
        *guard = Some(CachedVerify {
            code,
            expiry: Instant::now() + self.ttl,
        });
        code
    }
}
