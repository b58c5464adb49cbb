//! Generic (non-Tumblr) video saving.
//!
//! Tumblr's own CDN video is handled by the HTTP retriever; everything else
//! embedded in a video post (YouTube, Vimeo, and the like) is delegated to
//! yt-dlp, falling back to youtube-dl if that's what's on `PATH`, the way
//! the source this was distilled from shells out to whichever of the
//! `yt_dlp`/`youtube_dl` Python modules is installed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExternalVideoError {
    #[error("neither yt-dlp nor youtube-dl is installed")]
    ToolMissing,
    #[error("download failed: {0}")]
    Failed(String),
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

const FILE_TEMPLATE: &str = "%(id)s_%(uploader_id)s_%(title)s.%(ext)s";

/// Run the downloader against `post_url` (the Tumblr post's own permalink;
/// yt-dlp's generic/tumblr extractors resolve the embedded player from
/// there), writing into `dest_dir`. Returns the saved file's path.
///
/// A post with nothing extractable (no video, or an unsupported embed) is
/// reported as `Failed` just like any other unsaveable media URL — the
/// caller should log it and move on rather than fail the whole post.
pub fn download(post_url: &str, dest_dir: &Path) -> Result<PathBuf, ExternalVideoError> {
    std::fs::create_dir_all(dest_dir)?;
    let tool = which_tool().ok_or(ExternalVideoError::ToolMissing)?;
    let before = snapshot(dest_dir)?;

    let output = Command::new(tool)
        .arg("--output")
        .arg(dest_dir.join(FILE_TEMPLATE))
        .arg("--restrict-filenames")
        .arg("--no-playlist")
        .arg("--no-overwrites")
        .arg("--continue")
        .arg("--retries")
        .arg("3000")
        .arg("--fragment-retries")
        .arg("3000")
        .arg("--ignore-errors")
        .arg(post_url)
        .output()?;

    if !output.status.success() {
        return Err(ExternalVideoError::Failed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let after = snapshot(dest_dir)?;
    after
        .difference(&before)
        .next()
        .cloned()
        .ok_or_else(|| ExternalVideoError::Failed("no file produced".into()))
}

fn snapshot(dir: &Path) -> std::io::Result<HashSet<PathBuf>> {
    Ok(std::fs::read_dir(dir)?.filter_map(|e| e.ok().map(|e| e.path())).collect())
}

fn which_tool() -> Option<&'static str> {
    ["yt-dlp", "youtube-dl"]
        .into_iter()
        .find(|candidate| Command::new(candidate).arg("--version").output().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_reported_distinctly() {
        // Neither binary exists under this made-up name, so `which_tool`
        // finding nothing is exercised indirectly: this just documents the
        // error variant shape since spawning real yt-dlp isn't available in
        // a test sandbox.
        let err = ExternalVideoError::ToolMissing;
        assert_eq!(err.to_string(), "neither yt-dlp nor youtube-dl is installed");
    }
}
