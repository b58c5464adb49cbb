//! Renders one post's JSON into the `<article>` HTML fragment that's saved
//! to disk, dispatching on post type and rewriting inline media references
//! through a caller-supplied resolver (wired to the media downloader by the
//! coordinator).

mod body;
mod footer;
mod inline;

pub use body::RenderOptions;
pub use inline::maxsize_image_url;

use serde_json::Value;

fn get_str<'a>(doc: &'a Value, key: &str) -> &'a str {
    doc.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Everything about a post that isn't already present in its raw JSON but is
/// needed to render the header (formatted date, permalink, short URL).
pub struct PostContext<'a> {
    pub blog_name: &'a str,
    pub post_id: u64,
    pub isodate: &'a str,
    pub formatted_date: &'a str,
    pub permalink: &'a str,
    pub short_url: &'a str,
    pub is_likes: bool,
    pub creator: &'a str,
    pub notes_html: Option<&'a str>,
}

/// Renders the full `<article>...</article>` fragment for one post.
///
/// `resolve` is forwarded into the body renderer for every inline media URL
/// encountered; the caller is responsible for recording each URL it sees
/// into the post's media set regardless of whether it resolves.
pub fn render_post(doc: &Value, ctx: &PostContext, opts: &mut RenderOptions) -> String {
    let typ = get_str(doc, "type");
    let class = if ctx.is_likes {
        format!("liked-{typ}")
    } else {
        typ.to_string()
    };

    let mut out = String::new();
    out.push_str(&format!(r#"<article class="{}" id="p-{}">"#, class, ctx.post_id));
    out.push('\n');

    out.push_str("<header>\n");
    if ctx.is_likes {
        out.push_str(&format!(
            "<p><a href=\"https://{0}.tumblr.com/\" class=\"tumblr_blog\">{0}</a>:</p>\n",
            ctx.creator
        ));
    }
    out.push_str(&format!(
        "<p><time datetime=\"{}\">{}</time>\n",
        ctx.isodate, ctx.formatted_date
    ));
    out.push_str(&format!("<a class=\"llink\" href=\"{}\">\u{b6}</a>\n", ctx.permalink));
    out.push_str(&format!("<a href=\"{}\">\u{25cf}</a>\n", ctx.short_url));

    let reblogged_from = get_str(doc, "reblogged_from_url");
    let reblogged_root = get_str(doc, "reblogged_root_url");
    if !reblogged_from.is_empty() && reblogged_from != reblogged_root {
        out.push_str(&format!("<a href=\"{reblogged_from}\">\u{2b80}</a>\n"));
    }
    if !reblogged_root.is_empty() {
        out.push_str(&format!("<a href=\"{reblogged_root}\">\u{2b88}</a>\n"));
    }
    out.push_str("</header>\n");

    let (title, body_html) = body::render_body(doc, opts);
    if !title.is_empty() {
        out.push_str(&format!("<h2>{title}</h2>\n"));
    }
    out.push_str(&body_html);

    let note_count = doc.get("note_count").and_then(Value::as_u64).unwrap_or(0);
    let mut footer_doc = doc.clone();
    if let Some(obj) = footer_doc.as_object_mut() {
        obj.insert("note_count".to_string(), Value::from(note_count));
    }
    let footer = footer::render_footer(ctx.blog_name, &footer_doc, ctx.notes_html);
    out.push_str(&format!("\n<footer>{footer}</footer>"));
    out.push_str("\n</article>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn article_class_gets_liked_prefix_for_likes_backup() {
        let doc = json!({"type": "text", "title": "", "body": "hi", "tags": []});
        let ctx = PostContext {
            blog_name: "example.tumblr.com",
            post_id: 42,
            isodate: "2020-01-01T00:00:00Z",
            formatted_date: "01/01/20 00:00:00",
            permalink: "posts/42.html",
            short_url: "https://tmblr.co/abc",
            is_likes: true,
            creator: "someone",
            notes_html: None,
        };
        let mut resolve = |_: &str, _: usize| None;
        let mut generic_video = |_: &str| None;
        let mut opts = RenderOptions {
            save_images: false,
            save_video: false,
            save_video_tumblr: false,
            save_audio: false,
            resolve: &mut resolve,
            generic_video: &mut generic_video,
        };
        let html = render_post(&doc, &ctx, &mut opts);
        assert!(html.starts_with(r#"<article class="liked-text" id="p-42">"#));
        assert!(html.contains("tumblr_blog"));
    }

    #[test]
    fn reblog_arrows_omitted_when_not_a_reblog() {
        let doc = json!({"type": "text", "title": "", "body": "hi", "tags": []});
        let ctx = PostContext {
            blog_name: "example.tumblr.com",
            post_id: 1,
            isodate: "2020-01-01T00:00:00Z",
            formatted_date: "01/01/20",
            permalink: "posts/1.html",
            short_url: "https://tmblr.co/x",
            is_likes: false,
            creator: "example",
            notes_html: None,
        };
        let mut resolve = |_: &str, _: usize| None;
        let mut generic_video = |_: &str| None;
        let mut opts = RenderOptions {
            save_images: false,
            save_video: false,
            save_video_tumblr: false,
            save_audio: false,
            resolve: &mut resolve,
            generic_video: &mut generic_video,
        };
        let html = render_post(&doc, &ctx, &mut opts);
        assert!(!html.contains('\u{2b80}'));
        assert!(!html.contains('\u{2b88}'));
    }

    #[test]
    fn reblog_both_arrows_present_when_root_differs_from_parent() {
        let doc = json!({
            "type": "text", "title": "", "body": "hi", "tags": [],
            "reblogged_from_url": "https://a.tumblr.com/post/1",
            "reblogged_root_url": "https://b.tumblr.com/post/0",
        });
        let ctx = PostContext {
            blog_name: "example.tumblr.com",
            post_id: 1,
            isodate: "2020-01-01T00:00:00Z",
            formatted_date: "01/01/20",
            permalink: "posts/1.html",
            short_url: "https://tmblr.co/x",
            is_likes: false,
            creator: "example",
            notes_html: None,
        };
        let mut resolve = |_: &str, _: usize| None;
        let mut generic_video = |_: &str| None;
        let mut opts = RenderOptions {
            save_images: false,
            save_video: false,
            save_video_tumblr: false,
            save_audio: false,
            resolve: &mut resolve,
            generic_video: &mut generic_video,
        };
        let html = render_post(&doc, &ctx, &mut opts);
        assert!(html.contains('\u{2b80}'));
        assert!(html.contains('\u{2b88}'));
    }
}
