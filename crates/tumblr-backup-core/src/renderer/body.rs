//! Per-post-type HTML body generation (spec's per-type rules).

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::inline;

/// Knobs controlling which inline asset kinds get downloaded and rewritten,
/// and how media URLs resolve to saved (or failed-to-save) local paths.
pub struct RenderOptions<'a> {
    pub save_images: bool,
    pub save_video: bool,
    pub save_video_tumblr: bool,
    pub save_audio: bool,
    /// Resolve a remote media URL to a local relative URL, or `None` if it
    /// couldn't be saved. The `usize` is the photoset offset (0 for a
    /// single photo or non-photo media) used to derive a unique filename.
    /// Also responsible for recording the URL into the post's media set
    /// regardless of outcome.
    pub resolve: &'a mut dyn FnMut(&str, usize) -> Option<String>,
    /// Save a non-Tumblr video post via an external downloader (yt-dlp /
    /// youtube-dl), given the post's own permalink URL. `None` if nothing
    /// could be extracted. Only consulted when `video_type != "tumblr"`.
    pub generic_video: &'a mut dyn FnMut(&str) -> Option<String>,
}

fn escape_html_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;").replace('>', "&gt;")
}

fn get_str<'a>(doc: &'a Value, key: &str) -> &'a str {
    doc.get(key).and_then(Value::as_str).unwrap_or("")
}

fn append_try(
    content: &mut Vec<String>,
    doc: &Value,
    key: &str,
    opts: &mut RenderOptions,
    wrap: impl Fn(&str) -> String,
) {
    let raw = get_str(doc, key);
    if raw.is_empty() {
        return;
    }
    let mut elt = raw.to_string();
    if opts.save_images {
        elt = inline::rewrite_images(&elt, |url| (opts.resolve)(url, 0));
    }
    if opts.save_video || opts.save_video_tumblr {
        elt = inline::rewrite_video_posters(&elt, |url| (opts.resolve)(url, 0));
        elt = inline::rewrite_video_sources(&elt, |url| (opts.resolve)(url, 0));
    }
    content.push(wrap(&elt));
}

/// Returns `(title, body_html)`.
pub fn render_body(doc: &Value, opts: &mut RenderOptions) -> (String, String) {
    let typ = get_str(doc, "type");
    let mut content: Vec<String> = Vec::new();
    let mut title = String::new();

    match typ {
        "text" => {
            title = get_str(doc, "title").to_string();
            append_try(&mut content, doc, "body", opts, |s| s.to_string());
        }
        "photo" => {
            let link_url = get_str(doc, "link_url");
            let photos = doc.get("photos").and_then(Value::as_array).cloned().unwrap_or_default();
            let is_photoset = photos.len() > 1;
            for (i, photo) in photos.iter().enumerate() {
                let offset = if is_photoset { i + 1 } else { 0 };
                let original = photo
                    .get("alt_sizes")
                    .and_then(Value::as_array)
                    .and_then(|sizes| sizes.first())
                    .or_else(|| photo.get("original_size"))
                    .and_then(|size| size.get("url"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let src = if opts.save_images {
                    let maxed = inline::maxsize_image_url(original);
                    (opts.resolve)(&maxed, offset).unwrap_or_else(|| original.to_string())
                } else {
                    original.to_string()
                };
                let mut img = format!(r#"<img alt="" src="{}">"#, escape_html_attr(&src));
                if !link_url.is_empty() {
                    img = format!(r#"<a href="{}">{}</a>"#, escape_html_attr(link_url), img);
                }
                content.push(format!("<p>{img}</p>"));
                let caption = get_str(photo, "caption");
                if !caption.is_empty() {
                    content.push(format!("<p>{caption}</p>"));
                }
            }
            append_try(&mut content, doc, "caption", opts, |s| s.to_string());
        }
        "link" => {
            let url = get_str(doc, "url");
            let link_title = get_str(doc, "title");
            let label = if link_title.is_empty() { url } else { link_title };
            title = format!(r#"<a href="{}">{}</a>"#, escape_html_attr(url), label);
            append_try(&mut content, doc, "description", opts, |s| s.to_string());
        }
        "quote" => {
            let text = get_str(doc, "text");
            content.push(format!("<blockquote><p>{text}</p></blockquote>"));
            append_try(&mut content, doc, "source", opts, |s| format!("<p>{s}</p>"));
        }
        "video" => {
            render_video(doc, opts, &mut content);
            append_try(&mut content, doc, "caption", opts, |s| s.to_string());
        }
        "audio" => {
            render_audio(doc, opts, &mut content);
            append_try(&mut content, doc, "caption", opts, |s| s.to_string());
        }
        "answer" => {
            title = get_str(doc, "question").to_string();
            append_try(&mut content, doc, "answer", opts, |s| s.to_string());
        }
        "chat" => {
            title = get_str(doc, "title").to_string();
            if let Some(dialogue) = doc.get("dialogue").and_then(Value::as_array) {
                let lines: Vec<String> = dialogue
                    .iter()
                    .map(|d| format!("{} {}", get_str(d, "label"), get_str(d, "phrase")))
                    .collect();
                content.push(format!("<p>{}</p>", lines.join("<br>\n")));
            }
        }
        other => {
            tracing::warn!(post_type = other, "unknown post type, rendering raw JSON");
            content.push(format!(
                "<pre>{}</pre>",
                escape_html_attr(&serde_json::to_string_pretty(doc).unwrap_or_default())
            ));
        }
    }

    let body = content.join("\n");
    (title, unwrap_bad_nesting(&body))
}

fn render_video(doc: &Value, opts: &mut RenderOptions, content: &mut Vec<String>) {
    let video_type = get_str(doc, "video_type");
    let mut src = String::new();
    if (opts.save_video || opts.save_video_tumblr) && video_type == "tumblr" {
        let video_url = get_str(doc, "video_url");
        if let Some(saved) = (opts.resolve)(video_url, 0) {
            src = saved;
        }
    } else if opts.save_video {
        let post_url = get_str(doc, "post_url");
        match (opts.generic_video)(post_url) {
            Some(saved) => src = saved,
            None => tracing::warn!(post_url, "unable to download video in post"),
        }
    }
    if !src.is_empty() {
        content.push(format!(
            "<p><video controls><source src=\"{src}\" type=video/mp4>\
             Your browser does not support the video element.<br>\n\
             <a href=\"{src}\">Video file</a></video></p>"
        ));
        return;
    }
    if let Some(player) = doc.get("player").and_then(Value::as_array).and_then(|p| p.last()) {
        if let Some(embed) = player.get("embed_code").and_then(Value::as_str) {
            content.push(embed.to_string());
            return;
        }
    }
    let raw = get_str(doc, "video_url");
    if !raw.is_empty() {
        content.push(raw.to_string());
    }
}

fn render_audio(doc: &Value, opts: &mut RenderOptions, content: &mut Vec<String>) {
    let audio_url = {
        let primary = get_str(doc, "audio_url");
        if primary.is_empty() {
            get_str(doc, "audio_source_url").to_string()
        } else {
            primary.to_string()
        }
    };
    let audio_type = get_str(doc, "audio_type");
    let mut src: Option<String> = None;
    if opts.save_audio {
        if audio_type == "tumblr" {
            if audio_url.starts_with("https://a.tumblr.com/") {
                src = (opts.resolve)(&audio_url, 0);
            } else if audio_url.starts_with("https://www.tumblr.com/audio_file/") {
                let basename = audio_url.rsplit('/').next().unwrap_or("");
                let rewritten = format!("https://a.tumblr.com/{basename}o1.mp3");
                src = (opts.resolve)(&rewritten, 0);
            }
        } else if audio_type == "soundcloud" {
            src = (opts.resolve)(&audio_url, 0);
        }
    }
    let player_embed = doc.get("player").and_then(Value::as_str);
    if let Some(src) = src {
        content.push(make_audio_player(&src));
    } else if let Some(embed) = player_embed {
        content.push(embed.to_string());
    } else if !audio_url.is_empty() {
        content.push(make_audio_player(&audio_url));
    }
}

fn make_audio_player(src: &str) -> String {
    format!(
        "<p><audio controls><source src=\"{src}\" type=audio/mpeg>\
         Your browser does not support the audio element.<br>\n\
         <a href=\"{src}\">Audio file</a></audio></p>"
    )
}

static BAD_NESTING_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<p>(<(p|ol|iframe[^>]*)>)").unwrap());
static BAD_NESTING_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(</(p|ol|iframe[^>]*)>)</p>").unwrap());

/// Unwraps `<p>` wrappers that erroneously contain `<p>`, `<ol>`, or
/// `<iframe>` — content the API occasionally double-wraps.
fn unwrap_bad_nesting(html: &str) -> String {
    let opened = BAD_NESTING_OPEN.replace_all(html, "$1");
    BAD_NESTING_CLOSE.replace_all(&opened, "$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_opts<'a>(
        resolve: &'a mut dyn FnMut(&str, usize) -> Option<String>,
        generic_video: &'a mut dyn FnMut(&str) -> Option<String>,
    ) -> RenderOptions<'a> {
        RenderOptions {
            save_images: false,
            save_video: false,
            save_video_tumblr: false,
            save_audio: false,
            resolve,
            generic_video,
        }
    }

    #[test]
    fn text_post_uses_title_and_body() {
        let doc = json!({"type": "text", "title": "t", "body": "<p>hi</p>"});
        let mut resolve = |_: &str, _: usize| None;
        let mut generic_video = |_: &str| None;
        let mut opts = noop_opts(&mut resolve, &mut generic_video);
        let (title, body) = render_body(&doc, &mut opts);
        assert_eq!(title, "t");
        assert_eq!(body, "<p>hi</p>");
    }

    #[test]
    fn quote_post_wraps_text_in_blockquote() {
        let doc = json!({"type": "quote", "text": "to be", "source": "Shakespeare"});
        let mut resolve = |_: &str, _: usize| None;
        let mut generic_video = |_: &str| None;
        let mut opts = noop_opts(&mut resolve, &mut generic_video);
        let (_, body) = render_body(&doc, &mut opts);
        assert!(body.contains("<blockquote><p>to be</p></blockquote>"));
        assert!(body.contains("<p>Shakespeare</p>"));
    }

    #[test]
    fn answer_post_uses_question_as_title() {
        let doc = json!({"type": "answer", "question": "why?", "answer": "because"});
        let mut resolve = |_: &str, _: usize| None;
        let mut generic_video = |_: &str| None;
        let mut opts = noop_opts(&mut resolve, &mut generic_video);
        let (title, body) = render_body(&doc, &mut opts);
        assert_eq!(title, "why?");
        assert_eq!(body, "because");
    }

    #[test]
    fn chat_post_joins_dialogue_lines() {
        let doc = json!({
            "type": "chat",
            "title": "",
            "dialogue": [
                {"label": "Alice:", "phrase": "hi"},
                {"label": "Bob:", "phrase": "hello"},
            ],
        });
        let mut resolve = |_: &str, _: usize| None;
        let mut generic_video = |_: &str| None;
        let mut opts = noop_opts(&mut resolve, &mut generic_video);
        let (_, body) = render_body(&doc, &mut opts);
        assert_eq!(body, "<p>Alice: hi<br>\nBob: hello</p>");
    }

    #[test]
    fn unknown_type_renders_raw_json() {
        let doc = json!({"type": "mystery", "id": 1});
        let mut resolve = |_: &str, _: usize| None;
        let mut generic_video = |_: &str| None;
        let mut opts = noop_opts(&mut resolve, &mut generic_video);
        let (_, body) = render_body(&doc, &mut opts);
        assert!(body.starts_with("<pre>"));
    }

    #[test]
    fn video_post_falls_back_to_generic_downloader_when_not_tumblr() {
        let doc = json!({"type": "video", "video_type": "youtube", "post_url": "https://x.tumblr.com/post/1"});
        let mut resolve = |_: &str, _: usize| None;
        let mut seen = None;
        let mut generic_video = |url: &str| {
            seen = Some(url.to_string());
            Some("media/1_uploader_title.mp4".to_string())
        };
        let mut opts = RenderOptions {
            save_images: false,
            save_video: true,
            save_video_tumblr: false,
            save_audio: false,
            resolve: &mut resolve,
            generic_video: &mut generic_video,
        };
        let (_, body) = render_body(&doc, &mut opts);
        assert_eq!(seen.as_deref(), Some("https://x.tumblr.com/post/1"));
        assert!(body.contains("media/1_uploader_title.mp4"));
    }

    #[test]
    fn unwrap_bad_nesting_removes_p_around_p() {
        assert_eq!(unwrap_bad_nesting("<p><p>hi</p></p>"), "<p>hi</p>");
    }

    #[test]
    fn photo_post_numbers_photoset_offsets_from_one() {
        let doc = json!({
            "type": "photo",
            "link_url": "",
            "photos": [
                {"original_size": {"url": "https://x.tumblr.com/a.jpg"}, "caption": ""},
                {"original_size": {"url": "https://x.tumblr.com/b.jpg"}, "caption": ""},
            ],
        });
        let mut seen = Vec::new();
        let mut resolve = |url: &str, _offset: usize| {
            seen.push(url.to_string());
            None
        };
        let mut generic_video = |_: &str| None;
        let mut opts = RenderOptions {
            save_images: true,
            save_video: false,
            save_video_tumblr: false,
            save_audio: false,
            resolve: &mut resolve,
            generic_video: &mut generic_video,
        };
        let (_, body) = render_body(&doc, &mut opts);
        assert_eq!(seen.len(), 2);
        assert!(body.contains("a.jpg"));
        assert!(body.contains("b.jpg"));
    }
}
