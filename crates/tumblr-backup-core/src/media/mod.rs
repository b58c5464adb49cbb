//! Media downloader: resolves a remote URL to a local path under the
//! configured layout, reuses a previous archive's copy when possible, and
//! falls back to the HTTP retriever.

mod copy;
pub mod external_video;
mod inflight;
mod path;

pub use inflight::DownloadingMedia;
pub use path::{MediaLayout, MediaTarget};

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

use crate::concurrency::Gate;
use crate::host_blacklist::UnreachableHosts;
use crate::http_retriever::{self, RetrieveError, RetrieveHints};

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("not an HTTP(S) URL: {0}")]
    BadUrl(String),
    #[error("no local copy and --no-get is set: {0}")]
    NoGet(String),
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Hints that identify the post a media URL belongs to, for filename
/// derivation and mtime policy.
#[derive(Debug, Clone, Default)]
pub struct MediaHints {
    pub post_id: Option<u64>,
    pub post_timestamp: Option<SystemTime>,
    pub offset: Option<usize>,
    pub use_server_timestamps: bool,
    pub allow_internet_archive_fallback: bool,
    pub no_get: bool,
}

/// Where a media URL lives in a previous archive, for cross-archive reuse.
#[derive(Debug, Clone)]
pub struct PreviousArchive {
    pub root: PathBuf,
    pub layout: MediaLayout,
}

/// Resolve `url` to a file under `out_root` per `layout`/`blog_name`, reusing
/// `previous` when present, otherwise falling back to the HTTP retriever.
/// Records nothing itself; the caller adds the URL to the post's media set
/// on success.
#[allow(clippy::too_many_arguments)]
pub fn download_media(
    url: &str,
    out_root: &Path,
    layout: &MediaLayout,
    blog_name: &str,
    hints: &MediaHints,
    previous: Option<&PreviousArchive>,
    inflight: &DownloadingMedia,
    blacklist: &UnreachableHosts,
    no_internet_gate: &Gate,
) -> Result<PathBuf, MediaError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(MediaError::BadUrl(url.to_string()));
    }

    let target = MediaTarget::resolve(url, out_root, layout, blog_name, hints.post_id, hints.offset)
        .ok_or_else(|| MediaError::BadUrl(url.to_string()))?;

    let _guard = inflight.acquire(target.path.clone());

    if target.path.exists() {
        reconcile_existing_mtime(&target.path, hints)?;
        return Ok(target.path);
    }

    if let Some(prev) = previous {
        if let Some(prev_target) =
            MediaTarget::resolve(url, &prev.root, &prev.layout, blog_name, hints.post_id, hints.offset)
        {
            if prev_target.path.exists() {
                copy::copy_preserving_stat(&prev_target.path, &target.path)?;
                reconcile_existing_mtime(&target.path, hints)?;
                return Ok(target.path);
            }
        }
    }

    if hints.no_get {
        return Err(MediaError::NoGet(url.to_string()));
    }

    let retrieve_hints = RetrieveHints {
        post_id: hints.post_id,
        post_timestamp: hints.post_timestamp,
        use_server_timestamps: hints.use_server_timestamps,
        allow_internet_archive_fallback: hints.allow_internet_archive_fallback,
    };
    let dest_dir = target
        .path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| out_root.to_path_buf());
    let basename = target
        .path
        .file_name()
        .ok_or_else(|| MediaError::BadUrl(url.to_string()))?
        .to_string_lossy()
        .into_owned();
    let stat = http_retriever::retrieve(
        url,
        &dest_dir,
        &basename,
        blacklist,
        no_internet_gate,
        &retrieve_hints,
    )?;
    Ok(stat.final_path)
}

fn reconcile_existing_mtime(path: &Path, hints: &MediaHints) -> Result<(), MediaError> {
    if !hints.use_server_timestamps {
        return Ok(());
    }
    let Some(post_ts) = hints.post_timestamp else {
        return Ok(());
    };
    let meta = std::fs::metadata(path)?;
    if let Ok(mtime) = meta.modified() {
        if mtime > post_ts {
            crate::storage::set_mtime(path, post_ts)
                .map_err(|e| MediaError::Io(std::io::Error::other(e.to_string())))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_url() {
        let dir = tempfile::tempdir().unwrap();
        let layout = MediaLayout::default();
        let inflight = DownloadingMedia::new();
        let blacklist = UnreachableHosts::new();
        let err = download_media(
            "ftp://example.com/x.jpg",
            dir.path(),
            &layout,
            "myblog",
            &MediaHints::default(),
            None,
            &inflight,
            &blacklist,
            &Gate::new(),
        )
        .unwrap_err();
        assert!(matches!(err, MediaError::BadUrl(_)));
    }

    #[test]
    fn existing_file_is_kept_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let layout = MediaLayout::default();
        let target = MediaTarget::resolve(
            "https://66.media.tumblr.com/abc/tumblr_xyz.jpg",
            dir.path(),
            &layout,
            "myblog",
            None,
            None,
        )
        .unwrap();
        std::fs::create_dir_all(target.path.parent().unwrap()).unwrap();
        std::fs::write(&target.path, b"already here").unwrap();

        let inflight = DownloadingMedia::new();
        let blacklist = UnreachableHosts::new();
        let resolved = download_media(
            "https://66.media.tumblr.com/abc/tumblr_xyz.jpg",
            dir.path(),
            &layout,
            "myblog",
            &MediaHints::default(),
            None,
            &inflight,
            &blacklist,
            &Gate::new(),
        )
        .unwrap();
        assert_eq!(resolved, target.path);
        assert_eq!(std::fs::read(&resolved).unwrap(), b"already here");
    }
}
