//! Orchestrates one blog's backup: reconciles saved options, walks the API
//! (or a previous archive) page by page, filters and dispatches posts to a
//! worker pool, and writes the `.complete` sentinel on a clean finish.

mod cursor;
mod options;
mod recovery;

pub use options::{BackupOptions, ImageNamesScheme, ReconcileError, Reconciled};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use serde_json::Value;
use thiserror::Error;

use crate::api_client::{ApiClient, ApiError, ApiPage, PageRequest};
use crate::concurrency::{AsyncCallable, Gate, WorkerPool};
use crate::host_blacklist::UnreachableHosts;
use crate::media::{self, DownloadingMedia, MediaHints, MediaLayout, PreviousArchive};
use crate::reblog;
use crate::renderer::{self, PostContext, RenderOptions};
use crate::storage::PartFileBuilder;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_INTERRUPT: i32 = 3;
pub const EXIT_ERRORS: i32 = 4;
pub const EXIT_NOPOSTS: i32 = 5;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

/// Static description of one blog backup run; distinct from the per-run
/// `--continue`/`--incremental` mode flags, which aren't persisted.
pub struct BackupJob {
    pub account: String,
    pub output_root: PathBuf,
    pub previous_archive: Option<PathBuf>,
    pub options: BackupOptions,
    pub consumer_key: String,
    pub resume: bool,
    pub incremental: bool,
    pub ignore_diffopt: bool,
    pub threads: usize,
    pub queue_capacity: usize,
    pub filter: PostFilter,
    /// Replay this run's own saved `json/` directory instead of calling the
    /// API; for re-rendering HTML after a renderer change.
    pub reuse_json: bool,
}

impl BackupJob {
    /// `--auto HOUR`: the delay a cron-driven caller should sleep before the
    /// next run, landing somewhere in the hour following `target_hour`
    /// rather than always at the same second (so many cron'd blogs don't all
    /// wake the API at once).
    pub fn schedule_delay(target_hour: u32) -> Duration {
        use chrono::{Local, Timelike};
        let now = Local::now();
        let target_hour = target_hour % 24;
        let current_secs = now.hour() * 3600 + now.minute() * 60 + now.second();
        let target_secs = target_hour * 3600;
        let until_target = if target_secs >= current_secs {
            (target_secs - current_secs) as u64
        } else {
            (86_400 - current_secs + target_secs) as u64
        };
        let jitter = u64::from(now.timestamp_subsec_nanos()) % 3600;
        Duration::from_secs(until_target + jitter)
    }
}

/// Narrows the post stream to what should actually be rendered.
#[derive(Default)]
pub struct PostFilter {
    pub type_filter: Option<String>,
    pub tag_filter: Option<String>,
    pub id_allowlist: Option<HashSet<u64>>,
    pub no_reblog: bool,
    pub only_reblog: bool,
}

impl PostFilter {
    fn accepts(&self, post: &Value) -> bool {
        if let Some(t) = &self.type_filter {
            if post.get("type").and_then(Value::as_str) != Some(t.as_str()) {
                return false;
            }
        }
        if let Some(tag) = &self.tag_filter {
            let has_tag = post
                .get("tags")
                .and_then(Value::as_array)
                .is_some_and(|tags| tags.iter().filter_map(Value::as_str).any(|t| t.eq_ignore_ascii_case(tag)));
            if !has_tag {
                return false;
            }
        }
        if let Some(ids) = &self.id_allowlist {
            let id = post.get("id").and_then(Value::as_u64).unwrap_or(0);
            if !ids.contains(&id) {
                return false;
            }
        }
        if self.no_reblog && reblog::is_reblog(post) {
            return false;
        }
        if self.only_reblog && !reblog::is_reblog(post) {
            return false;
        }
        true
    }
}

pub struct RunSummary {
    pub posts_saved: u32,
    pub posts_failed: u32,
    /// The run was cut short by `cancel` rather than running to completion.
    pub interrupted: bool,
}

impl RunSummary {
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            EXIT_INTERRUPT
        } else if self.posts_failed > 0 {
            EXIT_ERRORS
        } else if self.posts_saved == 0 {
            EXIT_NOPOSTS
        } else {
            EXIT_SUCCESS
        }
    }
}

const PAGE_SIZE: u32 = 50;

/// Runs one blog's backup. `cancel` is polled between pages/posts; setting it
/// (from a SIGINT/SIGTERM handler) stops the walk, cancels the worker pool,
/// and releases any worker blocked on a recovery gate so the run winds down
/// promptly instead of finishing the in-flight page.
pub fn run(job: &BackupJob, cancel: &Arc<AtomicBool>) -> Result<RunSummary, CoordinatorError> {
    std::fs::create_dir_all(&job.output_root)?;
    std::fs::create_dir_all(job.output_root.join("posts"))?;
    if job.options.json {
        std::fs::create_dir_all(job.output_root.join("json"))?;
    }

    let fro_path = job.output_root.join(".first_run_options");
    let saved_options: Option<BackupOptions> = if fro_path.exists() {
        Some(serde_json::from_str(&std::fs::read_to_string(&fro_path)?)?)
    } else {
        None
    };
    let complete_path = job.output_root.join(".complete");
    let complete_backup = complete_path.exists();

    let reconciled = options::reconcile(
        &job.account,
        &job.options,
        saved_options.as_ref(),
        complete_backup,
        job.resume,
        job.ignore_diffopt,
    )?;
    let effective_options = match reconciled {
        Reconciled::UseGiven => job.options.clone(),
        Reconciled::UseSaved(saved) => saved,
    };

    if saved_options.is_none() {
        std::fs::write(&fro_path, serde_json::to_string_pretty(&effective_options)?)?;
    }

    let layout = MediaLayout {
        dirs: effective_options.dirs,
        hostdirs: effective_options.hostdirs,
        image_names: effective_options.image_names.into(),
    };

    let mut before = effective_options.period.map(|(_, end)| end);
    if job.resume {
        if let Some(ts) = cursor::oldest_timestamp(&job.output_root, effective_options.dirs) {
            before = Some(before.map_or(ts, |b| b.min(ts)));
        }
    }
    let ident_max = if job.incremental {
        cursor::incremental_cursor(&job.output_root, effective_options.dirs, effective_options.likes)
    } else {
        None
    };

    let enospc_gate = Arc::new(Gate::new());
    let no_internet_gate = Arc::new(Gate::new());
    let pump_running = Arc::new(AtomicBool::new(true));
    let pump = recovery::spawn(
        Arc::clone(&no_internet_gate),
        Arc::clone(&enospc_gate),
        Arc::clone(&pump_running),
    );
    let mut pool = WorkerPool::new(job.threads, job.queue_capacity, Arc::clone(&enospc_gate));
    let blacklist = Arc::new(UnreachableHosts::new());
    let inflight = Arc::new(DownloadingMedia::new());
    let previous = job.previous_archive.as_ref().map(|root| PreviousArchive {
        root: root.clone(),
        layout: layout.clone(),
    });
    let saved_count = Arc::new(AtomicU32::new(0));

    let mut reached_bound = false;
    let mut remaining_count = effective_options.count;

    if job.reuse_json {
        // Replay a previous run's own `json/` directory instead of hitting
        // the network; used to re-render HTML after a rendering fix.
        for path in ApiClient::read_archive(&job.output_root, effective_options.likes)? {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            let text = std::fs::read_to_string(&path)?;
            let post: Value = serde_json::from_str(&text)?;
            handle_post(
                post,
                job,
                &effective_options,
                ident_max,
                &layout,
                &pool,
                &blacklist,
                &inflight,
                &no_internet_gate,
                previous.as_ref(),
                &saved_count,
                &mut reached_bound,
                &mut remaining_count,
            );
            if reached_bound {
                break;
            }
        }
    } else {
        let mut api = ApiClient::new(job.account.clone(), job.consumer_key.clone(), Arc::clone(&no_internet_gate));
        if let Some(ua) = &effective_options.user_agent {
            api = api.with_user_agent(ua.clone());
        }
        let api = Arc::new(std::sync::Mutex::new(api));
        let fetcher: AsyncCallable<(u32, PageRequest), Result<Option<ApiPage>, ApiError>> = {
            let api = Arc::clone(&api);
            let likes = effective_options.likes;
            AsyncCallable::new(move |(count, req): (u32, PageRequest)| {
                api.lock().unwrap().apiparse(count, req, likes)
            })
        };

        let mut offset: u64 = effective_options.skip as u64;
        let first_req = match before {
            Some(ts) => PageRequest::Before(ts as u64),
            None => PageRequest::Offset(offset),
        };
        fetcher.submit((PAGE_SIZE, first_req)).ok();

        loop {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            let page = fetcher.recv().map_err(|_| ApiError::Fatal("fetch worker disconnected".into()))??;
            let Some(page) = page else { break };
            if page.posts.is_empty() {
                break;
            }
            offset += page.posts.len() as u64;

            if !reached_bound && !cancel.load(Ordering::SeqCst) {
                let next_req = PageRequest::Offset(offset);
                let _ = fetcher.submit((PAGE_SIZE, next_req));
            }

            for post in page.posts {
                if cancel.load(Ordering::SeqCst) {
                    break;
                }
                handle_post(
                    post,
                    job,
                    &effective_options,
                    ident_max,
                    &layout,
                    &pool,
                    &blacklist,
                    &inflight,
                    &no_internet_gate,
                    previous.as_ref(),
                    &saved_count,
                    &mut reached_bound,
                    &mut remaining_count,
                );
            }

            if reached_bound {
                break;
            }
        }
    }

    let interrupted = cancel.load(Ordering::SeqCst);
    if interrupted {
        pool.cancel();
        // Unstick any worker mid-`Gate::signal()`; nobody will clear it now.
        no_internet_gate.destroy();
        enospc_gate.destroy();
    }
    let errors = pool.join();
    pump_running.store(false, Ordering::SeqCst);
    no_internet_gate.destroy();
    enospc_gate.destroy();
    let _ = pump.join();

    let posts_saved = saved_count.load(Ordering::SeqCst);
    let posts_failed = errors.len() as u32;
    for e in &errors {
        tracing::error!(account = %job.account, error = %e, "post failed");
    }

    if interrupted {
        tracing::warn!(account = %job.account, "backup interrupted");
    } else if posts_failed == 0 && !reached_bound {
        write_complete_sentinel(&complete_path)?;
    }

    Ok(RunSummary {
        posts_saved,
        posts_failed,
        interrupted,
    })
}

/// Applies the incremental/period/count bounds to one post and, if it
/// survives them and the caller's filter, dispatches it for rendering.
/// Shared by the live API walk and the `--reuse-json` replay path.
#[allow(clippy::too_many_arguments)]
fn handle_post(
    post: Value,
    job: &BackupJob,
    effective_options: &BackupOptions,
    ident_max: Option<i64>,
    layout: &MediaLayout,
    pool: &WorkerPool,
    blacklist: &Arc<UnreachableHosts>,
    inflight: &Arc<DownloadingMedia>,
    no_internet_gate: &Arc<Gate>,
    previous: Option<&PreviousArchive>,
    saved_count: &Arc<AtomicU32>,
    reached_bound: &mut bool,
    remaining_count: &mut Option<u32>,
) {
    if let Some(max) = ident_max {
        let key = if effective_options.likes {
            post.get("liked_timestamp").and_then(Value::as_i64).unwrap_or(0)
        } else {
            post.get("id").and_then(Value::as_i64).unwrap_or(0)
        };
        if key <= max {
            *reached_bound = true;
            return;
        }
    }
    if let Some((start, _)) = effective_options.period {
        let post_date = post
            .get(if effective_options.likes { "liked_timestamp" } else { "timestamp" })
            .and_then(Value::as_i64)
            .unwrap_or(0);
        if post_date < start {
            *reached_bound = true;
            return;
        }
    }
    if let Some(remaining) = *remaining_count {
        if remaining == 0 {
            *reached_bound = true;
            return;
        }
        *remaining_count = Some(remaining - 1);
    }
    if !job.filter.accepts(&post) {
        return;
    }
    dispatch_post(
        post,
        job,
        effective_options,
        layout,
        pool,
        blacklist,
        inflight,
        no_internet_gate,
        previous,
        saved_count,
    );
}

#[allow(clippy::too_many_arguments)]
fn dispatch_post(
    post: Value,
    job: &BackupJob,
    options: &BackupOptions,
    layout: &MediaLayout,
    pool: &WorkerPool,
    blacklist: &Arc<UnreachableHosts>,
    inflight: &Arc<DownloadingMedia>,
    no_internet_gate: &Arc<Gate>,
    previous: Option<&PreviousArchive>,
    saved_count: &Arc<AtomicU32>,
) {
    let output_root = job.output_root.clone();
    let blog_name = job.account.clone();
    let options = options.clone();
    let layout = layout.clone();
    let blacklist = Arc::clone(blacklist);
    let inflight = Arc::clone(inflight);
    let no_internet_gate = Arc::clone(no_internet_gate);
    let previous = previous.cloned();
    let saved_count = Arc::clone(saved_count);

    let job_fn = move || -> anyhow::Result<()> {
        let post_id = post.get("id").and_then(Value::as_u64).unwrap_or(0);
        let timestamp = post
            .get("timestamp")
            .or_else(|| post.get("liked_timestamp"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let post_timestamp = UNIX_EPOCH + Duration::from_secs(timestamp);

        let mut resolve = |url: &str, offset: usize| -> Option<String> {
            let hints = MediaHints {
                post_id: Some(post_id),
                post_timestamp: Some(post_timestamp),
                offset: Some(offset),
                use_server_timestamps: options.use_server_timestamps,
                allow_internet_archive_fallback: options.internet_archive,
                no_get: options.no_get,
            };
            match media::download_media(
                url,
                &output_root,
                &layout,
                &blog_name,
                &hints,
                previous.as_ref(),
                &inflight,
                &blacklist,
                &no_internet_gate,
            ) {
                Ok(path) => path
                    .strip_prefix(&output_root)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/")),
                Err(e) => {
                    tracing::warn!(url, error = %e, "media download failed");
                    None
                }
            }
        };

        let mut generic_video = |post_url: &str| -> Option<String> {
            let video_dir = if layout.dirs {
                output_root.join("posts").join(post_id.to_string())
            } else {
                output_root.join("media")
            };
            match media::external_video::download(post_url, &video_dir) {
                Ok(path) => path
                    .strip_prefix(&output_root)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/")),
                Err(e) => {
                    tracing::warn!(post_url, error = %e, "generic video download failed");
                    None
                }
            }
        };

        let mut render_opts = RenderOptions {
            save_images: options.save_images,
            save_video: options.save_video,
            save_video_tumblr: options.save_video_tumblr,
            save_audio: options.save_audio,
            resolve: &mut resolve,
            generic_video: &mut generic_video,
        };

        let isodate = format_iso8601(timestamp);
        let ctx = PostContext {
            blog_name: &blog_name,
            post_id,
            isodate: &isodate,
            formatted_date: &isodate,
            permalink: &format!("posts/{post_id}.html"),
            short_url: post.get("short_url").and_then(Value::as_str).unwrap_or(""),
            is_likes: options.likes,
            creator: post
                .get("blog_name")
                .and_then(Value::as_str)
                .unwrap_or(&blog_name),
            notes_html: None,
        };
        let html = renderer::render_post(&post, &ctx, &mut render_opts);

        let dest_dir = if options.dirs {
            output_root.join("posts").join(post_id.to_string())
        } else {
            output_root.join("posts")
        };
        let basename = if options.dirs {
            "index.html".to_string()
        } else {
            format!("{post_id}.html")
        };
        let mut guard = PartFileBuilder::create(&dest_dir, &basename)?;
        guard.append(html.as_bytes())?;
        guard.sync()?;
        guard.commit(&dest_dir.join(&basename))?;

        if options.json {
            let json_dir = output_root.join("json");
            std::fs::create_dir_all(&json_dir)?;
            let json_basename = format!("{post_id}.json");
            let mut jguard = PartFileBuilder::create(&json_dir, &json_basename)?;
            jguard.append(serde_json::to_string_pretty(&post)?.as_bytes())?;
            jguard.sync()?;
            jguard.commit(&json_dir.join(&json_basename))?;
        }

        saved_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    };

    let _ = pool.submit(Box::new(job_fn));
}

fn write_complete_sentinel(path: &Path) -> std::io::Result<()> {
    std::fs::write(path, b"")?;
    if let Some(parent) = path.parent() {
        let dir = std::fs::File::open(parent)?;
        dir.sync_all()?;
    }
    Ok(())
}

fn format_iso8601(unix_secs: u64) -> String {
    use chrono::{DateTime, Utc};
    let dt: DateTime<Utc> = (UNIX_EPOCH + Duration::from_secs(unix_secs)).into();
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn post_filter_rejects_wrong_type() {
        let filter = PostFilter {
            type_filter: Some("photo".to_string()),
            ..Default::default()
        };
        assert!(!filter.accepts(&json!({"type": "text"})));
        assert!(filter.accepts(&json!({"type": "photo"})));
    }

    #[test]
    fn post_filter_id_allowlist() {
        let mut ids = HashSet::new();
        ids.insert(5u64);
        let filter = PostFilter {
            id_allowlist: Some(ids),
            ..Default::default()
        };
        assert!(filter.accepts(&json!({"id": 5})));
        assert!(!filter.accepts(&json!({"id": 6})));
    }

    #[test]
    fn run_summary_exit_codes() {
        assert_eq!(
            RunSummary { posts_saved: 3, posts_failed: 0, interrupted: false }.exit_code(),
            EXIT_SUCCESS
        );
        assert_eq!(
            RunSummary { posts_saved: 0, posts_failed: 0, interrupted: false }.exit_code(),
            EXIT_NOPOSTS
        );
        assert_eq!(
            RunSummary { posts_saved: 3, posts_failed: 1, interrupted: false }.exit_code(),
            EXIT_ERRORS
        );
        assert_eq!(
            RunSummary { posts_saved: 3, posts_failed: 1, interrupted: true }.exit_code(),
            EXIT_INTERRUPT
        );
    }
}
