//! Classify HTTP status codes and curl errors into retry policy error kinds.

use crate::host_blacklist::CLOUDFLARE_ORIGIN_DOWN;
use crate::retry::policy::ErrorKind;

/// Classify an HTTP status code observed after the body-less status-line
/// decisions (`RETROKF`, finished, reset-and-retry) have already been applied
/// by the retriever's status mapping.
pub fn classify_http_status(code: u32) -> ErrorKind {
    if CLOUDFLARE_ORIGIN_DOWN.contains(&code) {
        return ErrorKind::HostCondemned;
    }
    match code {
        420 => ErrorKind::RateLimited420,
        413 | 429 | 500..=599 => ErrorKind::Transient,
        _ => ErrorKind::Permanent,
    }
}

/// Classify a curl-level transport error. DNS resolution failure is a local
/// connectivity problem, not a per-host one, and is reported distinctly so
/// the caller can route it to the no-internet gate (`is_dns_working` in the
/// source this was distilled from) instead of condemning the host. A connect
/// timeout condemns the host immediately per wget's `ConnectTimeoutError`
/// handling; other transport failures are treated as transient if any bytes
/// had already been read (decided by the caller, which tracks `bytes_read`).
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_couldnt_resolve_host() || e.is_couldnt_resolve_proxy() {
        return ErrorKind::NoInternet;
    }
    if e.is_operation_timedout() && e.is_couldnt_connect() {
        return ErrorKind::HostCondemned;
    }
    if e.is_couldnt_connect() {
        return ErrorKind::HostCondemned;
    }
    ErrorKind::Transient
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloudflare_origin_down_condemns_host() {
        for code in CLOUDFLARE_ORIGIN_DOWN {
            assert_eq!(classify_http_status(code), ErrorKind::HostCondemned);
        }
    }

    #[test]
    fn rate_limit_420_is_its_own_kind() {
        assert_eq!(classify_http_status(420), ErrorKind::RateLimited420);
    }

    #[test]
    fn server_errors_are_transient() {
        assert_eq!(classify_http_status(500), ErrorKind::Transient);
        assert_eq!(classify_http_status(503), ErrorKind::Transient);
        assert_eq!(classify_http_status(429), ErrorKind::Transient);
        assert_eq!(classify_http_status(413), ErrorKind::Transient);
    }

    #[test]
    fn other_4xx_is_permanent() {
        assert_eq!(classify_http_status(404), ErrorKind::Permanent);
        assert_eq!(classify_http_status(403), ErrorKind::Permanent);
    }

    #[test]
    fn dns_resolution_failure_is_no_internet() {
        // CURLE_COULDNT_RESOLVE_HOST
        let e = curl::Error::new(6);
        assert_eq!(classify_curl_error(&e), ErrorKind::NoInternet);
    }
}
