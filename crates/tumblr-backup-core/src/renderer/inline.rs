//! Inline-asset rewriting inside post body/caption/description HTML:
//! `<img src>`, `<video poster>`, `<source src>`. A pragmatic regex pass,
//! not a parser, matching the source's own approach.

use once_cell::sync::Lazy;
use regex::Regex;

static IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(<img\s(?:[^>]*\s)?src\s*=\s*["'])(.*?)(["'][^>]*>)"#).unwrap());
static VIDEO_POSTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(<video\s(?:[^>]*\s)?poster\s*=\s*["'])(.*?)(["'][^>]*>)"#).unwrap()
});
static SOURCE_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(<source\s(?:[^>]*\s)?src\s*=\s*["'])(.*?)(["'][^>]*>)"#).unwrap()
});

/// Tumblr CDN images encode their size as a `_NN` suffix before the
/// extension; rewriting it to `_1280` requests the largest rendition. Left
/// alone for GIFs (re-encoding breaks animation) and non-Tumblr hosts.
static SIZE_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"_\d{2,4}(\.\w+)$").unwrap());

pub fn maxsize_image_url(url: &str) -> String {
    if !url.contains(".tumblr.com/") || url.ends_with(".gif") {
        return url.to_string();
    }
    SIZE_SUFFIX.replace(url, "_1280$1").into_owned()
}

/// Rewrite every `<img src>` in `html`, maximising Tumblr image resolution
/// first, then asking `resolve` to save the asset and substitute its local
/// URL. `resolve` returns `None` to leave a tag untouched (download failed
/// or saving images is disabled).
pub fn rewrite_images(html: &str, mut resolve: impl FnMut(&str) -> Option<String>) -> String {
    IMG_SRC
        .replace_all(html, |caps: &regex::Captures| {
            let original = &caps[2];
            let maxed = maxsize_image_url(original);
            match resolve(&maxed) {
                Some(local) => format!("{}{}{}", &caps[1], local, &caps[3]),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

pub fn rewrite_video_posters(html: &str, mut resolve: impl FnMut(&str) -> Option<String>) -> String {
    VIDEO_POSTER
        .replace_all(html, |caps: &regex::Captures| {
            match resolve(&caps[2]) {
                Some(local) => {
                    let tag = format!("{}{}{}", &caps[1], local, &caps[3]);
                    tag.replace("autoplay=\"autoplay\"", "").replace("muted=\"muted\"", "")
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

pub fn rewrite_video_sources(html: &str, mut resolve: impl FnMut(&str) -> Option<String>) -> String {
    SOURCE_SRC
        .replace_all(html, |caps: &regex::Captures| match resolve(&caps[2]) {
            Some(local) => format!("{}{}{}", &caps[1], local, &caps[3]),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maxsize_rewrites_tumblr_size_suffix() {
        assert_eq!(
            maxsize_image_url("https://64.media.tumblr.com/abc/tumblr_xyz_500.jpg"),
            "https://64.media.tumblr.com/abc/tumblr_xyz_1280.jpg"
        );
    }

    #[test]
    fn maxsize_leaves_gifs_alone() {
        let url = "https://64.media.tumblr.com/abc/tumblr_xyz_500.gif";
        assert_eq!(maxsize_image_url(url), url);
    }

    #[test]
    fn maxsize_leaves_non_tumblr_hosts_alone() {
        let url = "https://example.com/tumblr_xyz_500.jpg";
        assert_eq!(maxsize_image_url(url), url);
    }

    #[test]
    fn rewrite_images_substitutes_resolved_url() {
        let html = r#"<p><img alt="" src="https://example.com/a.jpg"></p>"#;
        let out = rewrite_images(html, |_url| Some("media/a.jpg".to_string()));
        assert_eq!(out, r#"<p><img alt="" src="media/a.jpg"></p>"#);
    }

    #[test]
    fn rewrite_images_leaves_tag_untouched_when_unresolved() {
        let html = r#"<img src="https://example.com/a.jpg">"#;
        let out = rewrite_images(html, |_url| None);
        assert_eq!(out, html);
    }

    #[test]
    fn rewrite_video_poster_strips_autoplay_and_muted() {
        let html = r#"<video poster="https://example.com/p.jpg" autoplay="autoplay" muted="muted"></video>"#;
        let out = rewrite_video_posters(html, |_url| Some("media/p.jpg".to_string()));
        assert!(out.contains(r#"poster="media/p.jpg""#));
        assert!(!out.contains("autoplay"));
        assert!(!out.contains("muted"));
    }
}
