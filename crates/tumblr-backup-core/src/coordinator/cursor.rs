//! Resume (`--continue`) and incremental cursor computation by scanning an
//! existing backup's saved post files.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static TIME_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r#"<time datetime="([^"]+)">"#).unwrap());

/// Enumerate saved post files under `root`, in either the flat
/// (`posts/<id>.html`) or directory (`posts/<id>/index.html`) layout.
pub fn find_post_files(root: &Path, dirs: bool) -> Vec<PathBuf> {
    let posts_dir = root.join("posts");
    let Ok(entries) = std::fs::read_dir(&posts_dir) else {
        return Vec::new();
    };
    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if dirs {
            if path.is_dir() {
                let index = path.join("index.html");
                if index.exists() {
                    files.push(index);
                }
            }
        } else if path.extension().and_then(|e| e.to_str()) == Some("html") {
            files.push(path);
        }
    }
    files
}

/// Post id embedded in a saved post's filename (`posts/<id>.html` or
/// `posts/<id>/index.html`).
pub fn post_id_from_path(path: &Path) -> Option<u64> {
    let stem = if path.file_name().and_then(|n| n.to_str()) == Some("index.html") {
        path.parent()?.file_name()?.to_str()?
    } else {
        path.file_stem()?.to_str()?
    };
    stem.parse().ok()
}

/// Timestamp embedded in a saved post's `<time datetime>` tag.
pub fn post_timestamp(path: &Path) -> Option<i64> {
    let html = std::fs::read_to_string(path).ok()?;
    let caps = TIME_TAG.captures(&html)?;
    let dt = DateTime::parse_from_rfc3339(&caps[1])
        .or_else(|_| DateTime::parse_from_str(&caps[1], "%Y-%m-%dT%H:%M:%SZ"))
        .ok()?;
    Some(dt.with_timezone(&Utc).timestamp())
}

/// `--continue`: the oldest timestamp already saved, so the API walk can
/// resume just past it. `None` if no posts are saved yet.
pub fn oldest_timestamp(root: &Path, dirs: bool) -> Option<i64> {
    find_post_files(root, dirs)
        .iter()
        .filter_map(|p| post_timestamp(p))
        .min()
}

/// `--incremental`: the newest post already saved. For likes this is a
/// timestamp (the API has no stable like id); otherwise it's the numeric
/// post id.
pub fn incremental_cursor(root: &Path, dirs: bool, likes: bool) -> Option<i64> {
    let files = find_post_files(root, dirs);
    if likes {
        files.iter().filter_map(|p| post_timestamp(p)).max()
    } else {
        files
            .iter()
            .filter_map(|p| post_id_from_path(p))
            .max()
            .map(|id| id as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_post(root: &Path, id: u64, datetime: &str) {
        let posts = root.join("posts");
        std::fs::create_dir_all(&posts).unwrap();
        let path = posts.join(format!("{id}.html"));
        std::fs::write(&path, format!(r#"<article><time datetime="{datetime}"></time></article>"#))
            .unwrap();
    }

    #[test]
    fn oldest_timestamp_picks_the_minimum() {
        let dir = tempfile::tempdir().unwrap();
        write_post(dir.path(), 1, "2020-01-05T00:00:00Z");
        write_post(dir.path(), 2, "2020-01-01T00:00:00Z");
        write_post(dir.path(), 3, "2020-01-10T00:00:00Z");
        let oldest = oldest_timestamp(dir.path(), false).unwrap();
        assert_eq!(oldest, post_timestamp(&dir.path().join("posts/2.html")).unwrap());
    }

    #[test]
    fn incremental_cursor_uses_max_id_for_posts() {
        let dir = tempfile::tempdir().unwrap();
        write_post(dir.path(), 1, "2020-01-01T00:00:00Z");
        write_post(dir.path(), 99, "2020-01-02T00:00:00Z");
        write_post(dir.path(), 42, "2020-01-03T00:00:00Z");
        assert_eq!(incremental_cursor(dir.path(), false, false), Some(99));
    }

    #[test]
    fn incremental_cursor_uses_max_timestamp_for_likes() {
        let dir = tempfile::tempdir().unwrap();
        write_post(dir.path(), 1, "2020-01-01T00:00:00Z");
        write_post(dir.path(), 2, "2020-06-01T00:00:00Z");
        let cursor = incremental_cursor(dir.path(), false, true).unwrap();
        assert_eq!(cursor, post_timestamp(&dir.path().join("posts/2.html")).unwrap());
    }

    #[test]
    fn empty_archive_has_no_cursor() {
        let dir = tempfile::tempdir().unwrap();
        assert!(oldest_timestamp(dir.path(), false).is_none());
        assert!(incremental_cursor(dir.path(), false, false).is_none());
    }

    #[test]
    fn dirs_layout_finds_index_html() {
        let dir = tempfile::tempdir().unwrap();
        let post_dir = dir.path().join("posts").join("7");
        std::fs::create_dir_all(&post_dir).unwrap();
        std::fs::write(
            post_dir.join("index.html"),
            r#"<time datetime="2020-01-01T00:00:00Z"></time>"#,
        )
        .unwrap();
        assert_eq!(incremental_cursor(dir.path(), true, false), Some(7));
    }
}
