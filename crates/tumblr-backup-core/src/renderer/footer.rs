//! Post footer: tag chips, source-title link, note count, expandable notes.

use serde_json::Value;

fn get_str<'a>(doc: &'a Value, key: &str) -> &'a str {
    doc.get(key).and_then(Value::as_str).unwrap_or("")
}

fn urlencode_tag(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    for b in tag.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*b as char);
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn render_tags(blog_name: &str, doc: &Value) -> Option<String> {
    let tags = doc.get("tags").and_then(Value::as_array)?;
    if tags.is_empty() {
        return None;
    }
    let chips: Vec<String> = tags
        .iter()
        .filter_map(Value::as_str)
        .map(|tag| {
            format!(
                r##"<a class="tag" href="https://{}/tagged/{}">#{}</a>"##,
                blog_name,
                urlencode_tag(tag),
                tag
            )
        })
        .collect();
    if chips.is_empty() {
        None
    } else {
        Some(format!("<p class=\"tags\">{}</p>", chips.join(" ")))
    }
}

fn render_source(doc: &Value) -> Option<String> {
    let url = get_str(doc, "source_url");
    if url.is_empty() {
        return None;
    }
    let title = get_str(doc, "source_title");
    let label = if title.is_empty() { url } else { title };
    Some(format!(r#"<p class="source">via <a href="{url}">{label}</a></p>"#))
}

/// `notes_html`, when present, is the pre-rendered note list fetched by the
/// (external) note-scraper subprocess; it's wrapped in a collapsed
/// `<details>` rather than shown inline.
pub fn render_footer(blog_name: &str, doc: &Value, notes_html: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(tags) = render_tags(blog_name, doc) {
        parts.push(tags);
    }
    if let Some(source) = render_source(doc) {
        parts.push(source);
    }
    let note_count = doc.get("note_count").and_then(Value::as_u64).unwrap_or(0);
    match notes_html {
        Some(html) if !html.is_empty() => {
            parts.push(format!(
                "<details><summary>{note_count} notes</summary>{html}</details>"
            ));
        }
        _ => {
            parts.push(format!("<p class=\"note-count\">{note_count} notes</p>"));
        }
    }
    parts.join("\n")
}
