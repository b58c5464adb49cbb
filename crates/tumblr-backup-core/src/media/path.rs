//! Computes a media URL's target path parts: `(media_dir [, host], filename)`.

use std::path::PathBuf;

use crate::url_model::{derive_media_filename, ImageNamesPolicy};

#[derive(Debug, Clone)]
pub struct MediaLayout {
    /// `posts/<id>/<filename>` instead of `media/<filename>`.
    pub dirs: bool,
    /// `media/<host>/<filename>` instead of `media/<filename>`.
    pub hostdirs: bool,
    pub image_names: ImageNamesPolicy,
}

impl Default for MediaLayout {
    fn default() -> Self {
        Self {
            dirs: false,
            hostdirs: false,
            image_names: ImageNamesPolicy::Original,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTarget {
    pub path: PathBuf,
}

impl MediaTarget {
    pub fn resolve(
        url: &str,
        out_root: &std::path::Path,
        layout: &MediaLayout,
        blog_name: &str,
        post_id: Option<u64>,
        offset: Option<usize>,
    ) -> Option<Self> {
        let parsed = url::Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        // `url::Url` already IDNA-encodes the host during parsing; guard the
        // degenerate cases that would otherwise collide with `.`/`..` dir
        // entries when used as a directory name under `--hostdirs`.
        let mut host_dir = if host == "." || host == ".." {
            format!("%2E{host}")
        } else {
            host.to_string()
        };
        if let Some(port) = parsed.port() {
            host_dir.push('_');
            host_dir.push_str(&port.to_string());
        }

        let filename = derive_media_filename(
            url,
            layout.image_names,
            blog_name,
            post_id.unwrap_or(0),
            offset.unwrap_or(0),
        );

        let mut path = out_root.to_path_buf();
        if layout.dirs {
            path.push("posts");
            path.push(post_id.unwrap_or(0).to_string());
        } else {
            path.push("media");
        }
        if layout.hostdirs {
            path.push(host_dir);
        }
        path.push(filename);

        Some(Self { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_layout_puts_files_directly_under_media() {
        let t = MediaTarget::resolve(
            "https://66.media.tumblr.com/abc/tumblr_xyz.jpg",
            std::path::Path::new("/out"),
            &MediaLayout::default(),
            "myblog",
            None,
            None,
        )
        .unwrap();
        assert_eq!(t.path, std::path::PathBuf::from("/out/media/tumblr_xyz.jpg"));
    }

    #[test]
    fn hostdirs_layout_nests_under_host() {
        let layout = MediaLayout {
            hostdirs: true,
            ..MediaLayout::default()
        };
        let t = MediaTarget::resolve(
            "https://66.media.tumblr.com/abc/tumblr_xyz.jpg",
            std::path::Path::new("/out"),
            &layout,
            "myblog",
            None,
            None,
        )
        .unwrap();
        assert_eq!(
            t.path,
            std::path::PathBuf::from("/out/media/66.media.tumblr.com/tumblr_xyz.jpg")
        );
    }

    #[test]
    fn dirs_layout_nests_under_post_id() {
        let layout = MediaLayout {
            dirs: true,
            ..MediaLayout::default()
        };
        let t = MediaTarget::resolve(
            "https://66.media.tumblr.com/abc/tumblr_xyz.jpg",
            std::path::Path::new("/out"),
            &layout,
            "myblog",
            Some(42),
            None,
        )
        .unwrap();
        assert_eq!(t.path, std::path::PathBuf::from("/out/posts/42/tumblr_xyz.jpg"));
    }

    #[test]
    fn non_default_port_is_folded_into_host_dir_name() {
        let layout = MediaLayout {
            hostdirs: true,
            ..MediaLayout::default()
        };
        let t = MediaTarget::resolve(
            "https://example.com:8080/x.jpg",
            std::path::Path::new("/out"),
            &layout,
            "myblog",
            None,
            None,
        )
        .unwrap();
        assert_eq!(
            t.path,
            std::path::PathBuf::from("/out/media/example.com_8080/x.jpg")
        );
    }
}
