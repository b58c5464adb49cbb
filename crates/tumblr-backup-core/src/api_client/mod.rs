//! Paginated JSON fetcher: the public v2 API, the dashboard-only `svc`
//! fallback, and replay of a previous archive's saved `json/` directory.

mod ratelimit;
mod transport;

pub use ratelimit::RateLimitOutcome;
pub use transport::{ApiError, ApiPage, InitialInfo, PageRequest, Transport};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::concurrency::Gate;

/// One blog's paginated fetch session. Holds the transport (public vs. svc)
/// and the cookie jar svc mode needs; switches transport automatically on
/// dashboard-only detection.
pub struct ApiClient {
    blog_name: String,
    consumer_key: String,
    transport: Transport,
    cookies: Option<String>,
    user_agent: Option<String>,
    no_internet_gate: Arc<Gate>,
}

impl ApiClient {
    pub fn new(
        blog_name: impl Into<String>,
        consumer_key: impl Into<String>,
        no_internet_gate: Arc<Gate>,
    ) -> Self {
        Self {
            blog_name: blog_name.into(),
            consumer_key: consumer_key.into(),
            transport: Transport::Public,
            cookies: None,
            user_agent: None,
            no_internet_gate,
        }
    }

    pub fn with_cookies(mut self, cookie_header: impl Into<String>) -> Self {
        self.cookies = Some(cookie_header.into());
        self
    }

    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    pub fn is_dashboard_only(&self) -> bool {
        matches!(self.transport, Transport::Svc)
    }

    /// Discover blog title, post count, and (for dashboard-only blogs) a
    /// sample post; flips to svc transport if the public endpoint 404s with
    /// `errors[0].code == 4012`.
    pub fn get_initial(&mut self, likes: bool) -> Result<InitialInfo, ApiError> {
        match self.apiparse(1, PageRequest::Offset(0), likes) {
            Ok(Some(page)) => Ok(InitialInfo {
                blog: page.blog,
                dashboard_only: self.is_dashboard_only(),
            }),
            Ok(None) => Err(ApiError::Fatal("initial API call returned no data".into())),
            Err(e) => Err(e),
        }
    }

    /// Fetch up to `count` posts scoped by `req`. Returns `None` on a fatal
    /// per-blog error (caller should mark the blog failed and move on).
    pub fn apiparse(
        &mut self,
        count: u32,
        req: PageRequest,
        likes: bool,
    ) -> Result<Option<ApiPage>, ApiError> {
        loop {
            let (code, headers, body) = transport::fetch(
                &self.transport,
                &self.blog_name,
                &self.consumer_key,
                count,
                req,
                likes,
                self.cookies.as_deref(),
                self.user_agent.as_deref(),
                &self.no_internet_gate,
            )?;

            if code == 404 {
                if let Some(4012) = transport::first_error_code(&body) {
                    if matches!(self.transport, Transport::Public) {
                        self.transport = Transport::Svc;
                        continue;
                    }
                }
            }
            if code == 403 && likes {
                return Err(ApiError::LikesHidden);
            }
            if code == 401 && matches!(self.transport, Transport::Svc) {
                return Err(ApiError::Fatal("missing cookies for dashboard-only blog".into()));
            }

            match ratelimit::check(&headers) {
                RateLimitOutcome::Proceed => {}
                RateLimitOutcome::SleepThenRetry(d) => {
                    std::thread::sleep(d);
                    continue;
                }
                RateLimitOutcome::DailyExhausted(reset) => {
                    return Err(ApiError::Fatal(format!(
                        "daily rate limit exhausted, resets in {reset}s"
                    )));
                }
                RateLimitOutcome::TooLongResume(secs) => {
                    return Err(ApiError::Fatal(format!(
                        "rate-limit reset is {secs}s away; rerun later to resume"
                    )));
                }
            }

            if !(200..300).contains(&code) {
                return Ok(None);
            }

            return Ok(Some(transport::parse_page(&body, likes)?));
        }
    }

    /// List a previous archive's saved JSON files ordered for replay:
    /// descending by `id` for posts, by `liked_timestamp` for likes.
    pub fn read_archive(prev: &Path, likes: bool) -> Result<Vec<PathBuf>, ApiError> {
        let json_dir = prev.join("json");
        let mut entries: Vec<(i64, PathBuf)> = Vec::new();
        let read_dir = match std::fs::read_dir(&json_dir) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ApiError::Fatal(format!("reading {}: {e}", json_dir.display()))),
        };
        for entry in read_dir {
            let entry = entry.map_err(|e| ApiError::Fatal(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = std::fs::read_to_string(&path).map_err(|e| ApiError::Fatal(e.to_string()))?;
            let doc: Value = serde_json::from_str(&text)
                .map_err(|e| ApiError::Fatal(format!("{}: {e}", path.display())))?;
            let key = if likes {
                doc.get("liked_timestamp").and_then(Value::as_i64)
            } else {
                doc.get("id").and_then(Value::as_i64)
            }
            .unwrap_or(0);
            entries.push((key, path));
        }
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries.into_iter().map(|(_, p)| p).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_archive_orders_posts_by_id_descending() {
        let dir = tempfile::tempdir().unwrap();
        let json_dir = dir.path().join("json");
        std::fs::create_dir_all(&json_dir).unwrap();
        for id in [1u64, 5, 3] {
            let path = json_dir.join(format!("{id}.json"));
            let mut f = std::fs::File::create(&path).unwrap();
            write!(f, r#"{{"id": {id}}}"#).unwrap();
        }
        let ordered = ApiClient::read_archive(dir.path(), false).unwrap();
        let ids: Vec<String> = ordered
            .iter()
            .map(|p| p.file_stem().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(ids, vec!["5", "3", "1"]);
    }

    #[test]
    fn read_archive_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ordered = ApiClient::read_archive(dir.path(), false).unwrap();
        assert!(ordered.is_empty());
    }
}
