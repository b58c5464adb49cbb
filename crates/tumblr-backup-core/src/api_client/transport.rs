//! The two wire transports: the public v2 API and the dashboard-only `svc`
//! endpoint, plus the plain curl GET+JSON plumbing they share.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::concurrency::Gate;
use crate::retry::{classify_curl_error, ErrorKind};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("likes are hidden for this blog")]
    LikesHidden,
    #[error("{0}")]
    Fatal(String),
    #[error("HTTP transport error: {0}")]
    Transport(String),
    #[error("invalid JSON response: {0}")]
    InvalidJson(String),
    #[error("cancelled while waiting for network recovery")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Public,
    Svc,
}

#[derive(Debug, Clone, Copy)]
pub enum PageRequest {
    Offset(u64),
    Before(u64),
    Ident(u64),
}

#[derive(Debug, Clone)]
pub struct ApiPage {
    pub posts: Vec<Value>,
    pub blog: Value,
}

#[derive(Debug, Clone)]
pub struct InitialInfo {
    pub blog: Value,
    pub dashboard_only: bool,
}

const PUBLIC_TIMEOUT_SECS: u64 = 90;

#[allow(clippy::too_many_arguments)]
pub(super) fn fetch(
    transport: &Transport,
    blog_name: &str,
    consumer_key: &str,
    count: u32,
    req: PageRequest,
    likes: bool,
    cookies: Option<&str>,
    user_agent: Option<&str>,
    no_internet_gate: &Gate,
) -> Result<(u32, HashMap<String, String>, Vec<u8>), ApiError> {
    let url = build_url(transport, blog_name, consumer_key, count, req, likes);
    http_get(&url, cookies, user_agent, no_internet_gate)
}

fn build_url(
    transport: &Transport,
    blog_name: &str,
    consumer_key: &str,
    count: u32,
    req: PageRequest,
    likes: bool,
) -> String {
    match transport {
        Transport::Public => {
            let kind = if likes { "likes" } else { "posts" };
            let mut url = format!(
                "https://api.tumblr.com/v2/blog/{blog_name}/{kind}?api_key={consumer_key}&limit={count}&reblog_info=true"
            );
            match req {
                PageRequest::Offset(n) => url.push_str(&format!("&offset={n}")),
                PageRequest::Before(n) => url.push_str(&format!("&before={n}")),
                PageRequest::Ident(n) => url.push_str(&format!("&id={n}")),
            }
            url
        }
        Transport::Svc => format!(
            "https://www.tumblr.com/svc/indash_blog?tumblelog_name_or_id={blog_name}&limit={count}&should_bypass_safemode=true&should_bypass_tagfiltering=true"
        ),
    }
}

/// One GET, looping on DNS resolution failure: each such failure signals
/// `no_internet_gate` and blocks until the main thread's recovery pump
/// clears it, then redoes the whole request (there's no partial progress to
/// preserve for an API call the way there is for a media Range-resume).
fn http_get(
    url: &str,
    cookies: Option<&str>,
    user_agent: Option<&str>,
    no_internet_gate: &Gate,
) -> Result<(u32, HashMap<String, String>, Vec<u8>), ApiError> {
    loop {
        match http_get_once(url, cookies, user_agent) {
            Ok(result) => return Ok(result),
            Err(GetError::Api(e)) => return Err(e),
            Err(GetError::Curl(e)) if matches!(classify_curl_error(&e), ErrorKind::NoInternet) => {
                if !no_internet_gate.signal() {
                    return Err(ApiError::Cancelled);
                }
            }
            Err(GetError::Curl(e)) => return Err(ApiError::Transport(e.to_string())),
        }
    }
}

enum GetError {
    Api(ApiError),
    Curl(curl::Error),
}

impl From<ApiError> for GetError {
    fn from(e: ApiError) -> Self {
        GetError::Api(e)
    }
}

fn http_get_once(
    url: &str,
    cookies: Option<&str>,
    user_agent: Option<&str>,
) -> Result<(u32, HashMap<String, String>, Vec<u8>), GetError> {
    let body = Arc::new(Mutex::new(Vec::<u8>::new()));
    let headers_out = Arc::new(Mutex::new(HashMap::<String, String>::new()));

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(|e| ApiError::Transport(e.to_string()))?;
    easy.follow_location(true).map_err(|e| ApiError::Transport(e.to_string()))?;
    easy.timeout(Duration::from_secs(PUBLIC_TIMEOUT_SECS))
        .map_err(|e| ApiError::Transport(e.to_string()))?;
    easy.connect_timeout(Duration::from_secs(30))
        .map_err(|e| ApiError::Transport(e.to_string()))?;
    if let Some(ua) = user_agent {
        easy.useragent(ua).map_err(|e| ApiError::Transport(e.to_string()))?;
    }
    if let Some(cookie_header) = cookies {
        easy.cookie(cookie_header).map_err(|e| ApiError::Transport(e.to_string()))?;
    }

    {
        let body_cb = Arc::clone(&body);
        let headers_cb = Arc::clone(&headers_out);
        let mut transfer = easy.transfer();
        transfer
            .header_function(move |data| {
                if let Ok(line) = std::str::from_utf8(data) {
                    if let Some((name, value)) = line.trim_end_matches(['\r', '\n']).split_once(':') {
                        headers_cb
                            .lock()
                            .unwrap()
                            .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
                    }
                }
                true
            })
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        transfer
            .write_function(move |data| {
                body_cb.lock().unwrap().extend_from_slice(data);
                Ok(data.len())
            })
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        transfer.perform().map_err(GetError::Curl)?;
    }

    let code = easy.response_code().unwrap_or(0);
    let body = Arc::try_unwrap(body).unwrap().into_inner().unwrap();
    let headers = Arc::try_unwrap(headers_out).unwrap().into_inner().unwrap();
    Ok((code, headers, body))
}

/// `errors[0].code` from a v2 error envelope, used for dashboard-only
/// (`4012`) detection.
pub(super) fn first_error_code(body: &[u8]) -> Option<u64> {
    let doc: Value = serde_json::from_slice(body).ok()?;
    doc.get("errors")?
        .as_array()?
        .first()?
        .get("code")?
        .as_u64()
}

pub(super) fn parse_page(body: &[u8], likes: bool) -> Result<ApiPage, ApiError> {
    let doc: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::InvalidJson(e.to_string()))?;
    let response = doc.get("response").cloned().unwrap_or(doc);
    let key = if likes { "liked_posts" } else { "posts" };
    let posts = response
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let blog = response.get("blog").cloned().unwrap_or(Value::Null);
    Ok(ApiPage { posts, blog })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_page_reads_posts_array() {
        let body = json!({"response": {"posts": [{"id": 1}, {"id": 2}], "blog": {"name": "x"}}})
            .to_string();
        let page = parse_page(body.as_bytes(), false).unwrap();
        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.blog["name"], "x");
    }

    #[test]
    fn parse_page_reads_liked_posts_for_likes() {
        let body = json!({"response": {"liked_posts": [{"id": 1}]}}).to_string();
        let page = parse_page(body.as_bytes(), true).unwrap();
        assert_eq!(page.posts.len(), 1);
    }

    #[test]
    fn first_error_code_extracts_dashboard_only_marker() {
        let body = json!({"errors": [{"code": 4012, "title": "Not Found"}]}).to_string();
        assert_eq!(first_error_code(body.as_bytes()), Some(4012));
    }

    #[test]
    fn build_url_public_offset() {
        let url = build_url(&Transport::Public, "foo", "key123", 50, PageRequest::Offset(0), false);
        assert!(url.contains("/v2/blog/foo/posts"));
        assert!(url.contains("offset=0"));
        assert!(url.contains("api_key=key123"));
    }

    #[test]
    fn build_url_svc_ignores_page_request() {
        let url = build_url(&Transport::Svc, "foo", "key123", 50, PageRequest::Before(5), false);
        assert!(url.contains("svc/indash_blog"));
        assert!(!url.contains("before"));
    }
}
