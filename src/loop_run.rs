//! The request loop: one stdin reader, a bounded worker pool, and the
//! per-request tokenize/decode/match/respond pipeline.
//!
//! Grounded on `original_source/src/loop.c` for the concurrency/sequence-ID
//! handling (see DESIGN.md's Open Question 2 for the exact, source-verified
//! resolution of the `concurrency == 0` vs concurrent token-offset
//! behavior) and on `router-core/src/system/server.rs` for the
//! thread/task-per-unit-of-work shape.

use std::io::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};

use crate::checkers::{match_request, Checker};
use crate::geoip::GeoipLookup;
use crate::matchers::MatchContext;
use crate::request::{self, MAX_LINE_BYTES, MAX_TOKENS};
use crate::resolver::Resolver;
use crate::tls::TlsCache;

pub struct RequestLoopState {
    pub checkers: Vec<Checker>,
    pub resolver: Resolver,
    pub tls_cache: TlsCache,
    pub geoip: GeoipLookup,
    pub concurrency: u8,
}

/// Runs until stdin is closed or a read fails. A read failure maps the
/// caller to exit code 99 (spec.md §6).
pub async fn run(state: Arc<RequestLoopState>) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    let semaphore = Arc::new(Semaphore::new(state.concurrency.max(1) as usize));
    let stdout = Arc::new(AsyncMutex::new(std::io::stdout()));

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                log::error!("stdin read failed: {err}");
                anyhow::bail!("request loop read failure: {err}");
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        if line.len() > MAX_LINE_BYTES {
            log::warn!("request line exceeds {MAX_LINE_BYTES} bytes, truncating");
        }
        let line = if line.len() > MAX_LINE_BYTES {
            line[..MAX_LINE_BYTES].to_string()
        } else {
            line
        };

        if state.concurrency == 0 {
            // Single-threaded mode: run inline, no sequence ID is present
            // or echoed.
            process_line(&state, &line, None, stdout.clone()).await;
            continue;
        }

        let permit = semaphore.clone().acquire_owned().await?;
        let state = state.clone();
        let stdout = stdout.clone();
        tokio::spawn(async move {
            let _permit = permit;
            process_line(&state, &line, Some(()), stdout).await;
        });
    }

    Ok(())
}

async fn process_line(
    state: &RequestLoopState,
    line: &str,
    concurrent: Option<()>,
    stdout: Arc<AsyncMutex<std::io::Stdout>>,
) {
    let raw_tokens = request::tokenize(line, MAX_TOKENS);
    let decoded: Vec<String> = raw_tokens
        .iter()
        .map(|t| request::url_decode(t).into_owned())
        .collect();

    let ctx = MatchContext {
        resolver: &state.resolver,
        tls_cache: &state.tls_cache,
        geoip: &state.geoip,
    };

    // See DESIGN.md Open Question 2: the `concurrency == 0` branch uses the
    // full token array; the concurrent branch peels off the leading
    // sequence-ID token first. Both pass a zero-based max index, not a
    // count.
    let (seq_id, tokens): (Option<&str>, &[String]) = if concurrent.is_some() {
        if decoded.is_empty() {
            (None, &decoded[..])
        } else {
            (Some(decoded[0].as_str()), &decoded[1..])
        }
    } else {
        (None, &decoded[..])
    };

    if tokens.is_empty() {
        return;
    }
    let max_index = tokens.len() - 1;
    let response = match_request(&state.checkers, tokens, max_index, &ctx);

    let mut out = stdout.lock().await;
    let write_result = if let Some(seq) = seq_id {
        writeln!(out, "{seq} {response}")
    } else {
        writeln!(out, "{response}")
    };
    if let Err(err) = write_result {
        log::error!("failed writing response: {err}");
    }
    let _ = out.flush();
}
