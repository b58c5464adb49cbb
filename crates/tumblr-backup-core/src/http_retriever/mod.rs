//! Wget-equivalent HTTP retriever: Range-resume GET with retry/backoff, host
//! blacklisting, and an Internet-Archive fallback for vanished Tumblr media.

mod content_range;

pub use content_range::{parse_content_range, ContentRangeError, ParsedContentRange};

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use anyhow::Context as _;
use thiserror::Error;

use crate::concurrency::Gate;
use crate::host_blacklist::{HostKey, UnreachableHosts, CLOUDFLARE_ORIGIN_DOWN};
use crate::retry::{classify_curl_error, classify_http_status, ErrorKind, RetryDecision, RetryPolicy};
use crate::storage::{set_mtime, PartFileBuilder};

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("not an HTTP(S) URL: {0}")]
    BadProtocol(String),
    #[error("host condemned as unreachable: {0}")]
    UnreachableHost(String),
    #[error("bad response: {0}")]
    BadResponse(String),
    #[error("server mishandled Range: {0}")]
    Range(String),
    #[error("retry budget exhausted after {0} attempts")]
    MaxRetry(u32),
    #[error("cancelled while waiting for network recovery")]
    Cancelled,
}

/// Result of a successful retrieval.
#[derive(Debug, Clone)]
pub struct HttpStat {
    pub bytes_written: u64,
    pub status_code: u32,
    pub last_modified: Option<SystemTime>,
    pub final_path: PathBuf,
}

/// Hints that influence filename/mtime policy; all optional.
#[derive(Debug, Clone, Default)]
pub struct RetrieveHints {
    pub post_id: Option<u64>,
    pub post_timestamp: Option<SystemTime>,
    pub use_server_timestamps: bool,
    pub allow_internet_archive_fallback: bool,
}

/// Outcome of a single attempt's status mapping (spec step 6).
enum StatusOutcome {
    Retrokf,
    FinishedEmpty,
    ResetAndRetry,
    RetryAfter(Duration),
    HostCondemn,
    ServerMisuse,
    WrongCode(u32),
}

fn map_status(code: u32, restval: u64, contrange_is_zero: bool) -> StatusOutcome {
    if CLOUDFLARE_ORIGIN_DOWN.contains(&code) {
        return StatusOutcome::HostCondemn;
    }
    match code {
        200..=299 if code != 207 => {
            if code == 206 && restval > 0 && contrange_is_zero {
                StatusOutcome::ServerMisuse
            } else {
                StatusOutcome::Retrokf
            }
        }
        204 => StatusOutcome::FinishedEmpty,
        416 => StatusOutcome::ResetAndRetry,
        420 => StatusOutcome::RetryAfter(Duration::from_secs(60)),
        _ => StatusOutcome::WrongCode(code),
    }
}

/// Per-attempt response headers we care about.
#[derive(Debug, Default, Clone)]
struct AttemptHeaders {
    content_type: Option<String>,
    content_range: Option<String>,
    last_modified: Option<String>,
    content_encoding: Option<String>,
}

fn parse_header_line(line: &str, out: &mut AttemptHeaders) {
    let Some((name, value)) = line.split_once(':') else {
        return;
    };
    let name = name.trim().to_ascii_lowercase();
    let value = value.trim().to_string();
    match name.as_str() {
        "content-type" => out.content_type = Some(value),
        "content-range" => out.content_range = Some(value),
        "last-modified" => out.last_modified = Some(value),
        "x-archive-orig-last-modified" => out.last_modified = Some(value),
        "content-encoding" => out.content_encoding = Some(value),
        _ => {}
    }
}

fn parse_http_date(s: &str) -> Option<SystemTime> {
    let dt = chrono::DateTime::parse_from_rfc2822(s).ok()?;
    Some(SystemTime::from(dt))
}

/// Retrieve `url` into `dest_dir/basename`. `basename` is the caller's final
/// filename (already resolved per the media filename policy: `image_names`
/// scheme, Windows-char stripping, query folding); this module never derives
/// a name from the URL itself. On success the file exists at its final name
/// with correct bytes and mtime; on failure no partial file is left at the
/// final name.
///
/// A DNS resolution failure doesn't count against the retry budget: it
/// signals `no_internet_gate` and blocks until the main thread's recovery
/// pump clears it (or poisons the gate on cancellation, in which case this
/// returns `RetrieveError::Cancelled`).
pub fn retrieve(
    url: &str,
    dest_dir: &Path,
    basename: &str,
    blacklist: &UnreachableHosts,
    no_internet_gate: &Gate,
    hints: &RetrieveHints,
) -> Result<HttpStat, RetrieveError> {
    retrieve_inner(url, dest_dir, basename, blacklist, no_internet_gate, hints, true)
}

#[allow(clippy::too_many_arguments)]
fn retrieve_inner(
    url: &str,
    dest_dir: &Path,
    basename: &str,
    blacklist: &UnreachableHosts,
    no_internet_gate: &Gate,
    hints: &RetrieveHints,
    allow_ia_fallback: bool,
) -> Result<HttpStat, RetrieveError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(RetrieveError::BadProtocol(url.to_string()));
    }

    let host_key = HostKey::from_url(url).map_err(|e| RetrieveError::BadResponse(e.to_string()))?;
    if blacklist.is_blacklisted(&host_key) {
        return Err(RetrieveError::UnreachableHost(format!(
            "{}:{}",
            host_key.host, host_key.port
        )));
    }

    let policy = RetryPolicy::default();

    let mut restval: u64 = 0;
    let mut last_content_encoding: Option<String> = None;
    let mut attempt: u32 = 0;
    let mut guard = PartFileBuilder::create(dest_dir, basename)
        .map_err(|e| RetrieveError::BadResponse(e.to_string()))?;
    let mut last_modified_seen: Option<SystemTime> = None;
    let mut first_error_code: Option<u32> = None;

    loop {
        attempt += 1;
        let headers = Arc::new(Mutex::new(AttemptHeaders::default()));
        let headers_cb = Arc::clone(&headers);
        let bytes_this_attempt = Arc::new(AtomicU64::new(0));
        let bytes_cb = Arc::clone(&bytes_this_attempt);
        let write_err: Arc<Mutex<Option<std::io::Error>>> = Arc::new(Mutex::new(None));
        let write_err_cb = Arc::clone(&write_err);
        // Decided once the header block ends (spec step 7): if we asked for a
        // Range but got back a plain 200 with no Content-Range, the server
        // ignored our resume point and is sending the whole body from byte
        // zero. We discard the first `restval` bytes of it instead of
        // duplicating what we already have on disk.
        let skip_remaining = Arc::new(AtomicU64::new(0));
        let skip_cb = Arc::clone(&skip_remaining);
        let restval_for_headers = restval;

        let mut easy = curl::easy::Easy::new();
        let set = |r: Result<(), curl::Error>| r.map_err(|e| classify_curl_error(&e));
        if let Err(kind) = set(easy.url(url)) {
            return fatal_or_condemn(kind, blacklist, &host_key, url);
        }
        let _ = easy.follow_location(false);
        let _ = easy.connect_timeout(Duration::from_secs(90));
        let _ = easy.timeout(Duration::from_secs(90));
        if restval > 0 {
            let _ = easy.range(&format!("{restval}-"));
        }

        {
            let mut transfer = easy.transfer();
            let _ = transfer.header_function(move |data| {
                if let Ok(line) = std::str::from_utf8(data) {
                    let trimmed = line.trim_end_matches(['\r', '\n']);
                    if trimmed.is_empty() {
                        // End of this header block: decide whether Range was honoured.
                        let h = headers_cb.lock().unwrap();
                        if restval_for_headers > 0 && h.content_range.is_none() {
                            skip_cb.store(restval_for_headers, Ordering::Relaxed);
                        }
                    } else {
                        parse_header_line(line, &mut headers_cb.lock().unwrap());
                    }
                }
                true
            });
            // Bytes in this attempt are appended to the guard sequentially;
            // the decoder (gzip/deflate) is handled by curl itself via
            // Accept-Encoding negotiation, so what we see here is already
            // the content the caller asked for. `Easy::transfer` lets this
            // closure borrow `guard` for the scope of the block below.
            let _ = transfer.write_function(|data| {
                bytes_cb.fetch_add(data.len() as u64, Ordering::Relaxed);
                let original_len = data.len();
                let to_skip = skip_cb.load(Ordering::Relaxed);
                let payload = if to_skip > 0 {
                    let skip_now = to_skip.min(original_len as u64) as usize;
                    skip_cb.fetch_sub(skip_now as u64, Ordering::Relaxed);
                    &data[skip_now..]
                } else {
                    data
                };
                if payload.is_empty() {
                    return Ok(original_len);
                }
                match guard.append(payload) {
                    Ok(()) => Ok(original_len),
                    Err(e) => {
                        *write_err_cb.lock().unwrap() = Some(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            e.to_string(),
                        ));
                        Ok(0)
                    }
                }
            });

            if let Err(e) = transfer.perform() {
                if let Some(io_err) = write_err.lock().unwrap().take() {
                    let _ = io_err;
                    if bytes_this_attempt.load(Ordering::Relaxed) > 0 {
                        restval += bytes_this_attempt.load(Ordering::Relaxed);
                        continue;
                    }
                    return Err(RetrieveError::BadResponse("local write failed".into()));
                }
                let kind = classify_curl_error(&e);
                if matches!(kind, ErrorKind::NoInternet) {
                    if no_internet_gate.signal() {
                        continue;
                    }
                    return Err(RetrieveError::Cancelled);
                }
                if matches!(kind, ErrorKind::HostCondemned) {
                    blacklist.condemn(host_key.clone());
                    return Err(RetrieveError::UnreachableHost(format!(
                        "{}:{}",
                        host_key.host, host_key.port
                    )));
                }
                if bytes_this_attempt.load(Ordering::Relaxed) > 0 {
                    restval += bytes_this_attempt.load(Ordering::Relaxed);
                    continue;
                }
                match policy.decide(attempt, ErrorKind::Transient) {
                    RetryDecision::NoRetry => return Err(RetrieveError::MaxRetry(attempt)),
                    RetryDecision::RetryAfter(d) => {
                        std::thread::sleep(d);
                        continue;
                    }
                }
            }
        }

        let code = easy.response_code().unwrap_or(0);
        let headers = headers.lock().unwrap().clone();

        if let Some(ct) = &headers.content_type {
            if ct.eq_ignore_ascii_case("multipart/byteranges")
                || ct.to_ascii_lowercase().starts_with("multipart/byteranges;")
            {
                return Err(RetrieveError::BadResponse("multipart/byteranges".into()));
            }
        }

        if headers.content_encoding != last_content_encoding && last_content_encoding.is_some() {
            last_content_encoding = headers.content_encoding.clone();
            restval = 0;
            guard
                .truncate()
                .map_err(|e| RetrieveError::BadResponse(e.to_string()))?;
            continue;
        }
        last_content_encoding = headers.content_encoding.clone();

        if let Some(lm) = headers.last_modified.as_deref().and_then(parse_http_date) {
            last_modified_seen = Some(lm);
        }

        let contrange_is_zero = match headers.content_range.as_deref() {
            Some(v) => match parse_content_range(v) {
                Ok(r) => r.first == 0,
                Err(_) => {
                    return Err(RetrieveError::BadResponse(format!(
                        "invalid Content-Range: {v}"
                    )))
                }
            },
            None => true,
        };

        if first_error_code.is_none() && !(200..300).contains(&code) {
            first_error_code = Some(code);
        }

        match map_status(code, restval, contrange_is_zero) {
            StatusOutcome::Retrokf => {
                let written = bytes_this_attempt.load(Ordering::Relaxed);
                let final_path = dest_dir.join(basename);
                let commit_target = final_path.clone();
                guard
                    .commit(&commit_target)
                    .map_err(|e| RetrieveError::BadResponse(e.to_string()))?;
                apply_mtime(&commit_target, last_modified_seen, hints);
                return Ok(HttpStat {
                    bytes_written: restval + written,
                    status_code: code,
                    last_modified: last_modified_seen,
                    final_path,
                });
            }
            StatusOutcome::FinishedEmpty => {
                let final_path = dest_dir.join(basename);
                guard
                    .commit(&final_path)
                    .map_err(|e| RetrieveError::BadResponse(e.to_string()))?;
                apply_mtime(&final_path, last_modified_seen, hints);
                return Ok(HttpStat {
                    bytes_written: 0,
                    status_code: code,
                    last_modified: last_modified_seen,
                    final_path,
                });
            }
            StatusOutcome::ResetAndRetry => {
                restval = 0;
                guard
                    .truncate()
                    .map_err(|e| RetrieveError::BadResponse(e.to_string()))?;
                continue;
            }
            StatusOutcome::RetryAfter(d) => {
                match policy.decide(attempt, ErrorKind::RateLimited420) {
                    RetryDecision::NoRetry => return Err(RetrieveError::MaxRetry(attempt)),
                    RetryDecision::RetryAfter(_) => {
                        std::thread::sleep(d);
                        continue;
                    }
                }
            }
            StatusOutcome::HostCondemn => {
                blacklist.condemn(host_key.clone());
                return Err(RetrieveError::UnreachableHost(format!(
                    "{}:{}",
                    host_key.host, host_key.port
                )));
            }
            StatusOutcome::ServerMisuse => {
                return Err(RetrieveError::Range(
                    "206 with restval>0 but contrange==0".into(),
                ));
            }
            StatusOutcome::WrongCode(code) => {
                let kind = classify_http_status(code);
                if allow_ia_fallback
                    && hints.allow_internet_archive_fallback
                    && (code == 403 || code == 404)
                    && host_key.host.ends_with(".tumblr.com")
                {
                    drop(guard);
                    let archive_url = format!("https://web.archive.org/web/0/{url}");
                    return match retrieve_inner(
                        &archive_url,
                        dest_dir,
                        basename,
                        blacklist,
                        no_internet_gate,
                        hints,
                        false,
                    ) {
                        Ok(stat) => Ok(stat),
                        Err(_) => Err(RetrieveError::BadResponse(format!("HTTP {code}"))),
                    };
                }
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => {
                        return Err(RetrieveError::BadResponse(format!("HTTP {code}")))
                    }
                    RetryDecision::RetryAfter(d) => {
                        std::thread::sleep(d);
                        continue;
                    }
                }
            }
        }
    }
}

fn fatal_or_condemn(
    kind: ErrorKind,
    blacklist: &UnreachableHosts,
    host_key: &HostKey,
    url: &str,
) -> Result<HttpStat, RetrieveError> {
    if matches!(kind, ErrorKind::HostCondemned) {
        blacklist.condemn(host_key.clone());
    }
    Err(RetrieveError::BadResponse(format!(
        "failed to initialize request for {url}"
    )))
}

fn apply_mtime(path: &Path, remote_time: Option<SystemTime>, hints: &RetrieveHints) {
    if !hints.use_server_timestamps {
        return;
    }
    let candidate = match (remote_time, hints.post_timestamp) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };
    if let Some(when) = candidate {
        if let Err(e) = set_mtime(path, when) {
            tracing::warn!(path = %path.display(), error = %e, "failed to set mtime");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_protocol() {
        let blacklist = UnreachableHosts::new();
        let dir = tempfile::tempdir().unwrap();
        let err = retrieve(
            "ftp://example.com/file",
            dir.path(),
            "file",
            &blacklist,
            &Gate::new(),
            &RetrieveHints::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RetrieveError::BadProtocol(_)));
    }

    #[test]
    fn rejects_blacklisted_host_before_any_request() {
        let blacklist = UnreachableHosts::new();
        blacklist.condemn_url("https://dead.example.com/x").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = retrieve(
            "https://dead.example.com/file.jpg",
            dir.path(),
            "file.jpg",
            &blacklist,
            &Gate::new(),
            &RetrieveHints::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RetrieveError::UnreachableHost(_)));
    }

    #[test]
    fn map_status_marks_cloudflare_origin_down() {
        for code in CLOUDFLARE_ORIGIN_DOWN {
            assert!(matches!(map_status(code, 0, true), StatusOutcome::HostCondemn));
        }
    }

    #[test]
    fn map_status_detects_server_misuse_of_range() {
        assert!(matches!(
            map_status(206, 100, true),
            StatusOutcome::ServerMisuse
        ));
        assert!(matches!(map_status(206, 100, false), StatusOutcome::Retrokf));
    }

    #[test]
    fn map_status_204_is_finished_empty() {
        assert!(matches!(map_status(204, 0, true), StatusOutcome::FinishedEmpty));
    }

    #[test]
    fn map_status_420_retries_after_sixty_seconds() {
        match map_status(420, 0, true) {
            StatusOutcome::RetryAfter(d) => assert_eq!(d, Duration::from_secs(60)),
            _ => panic!("expected RetryAfter"),
        }
    }
}
