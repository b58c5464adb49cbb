//! Reblog classifier: a cheap-then-expensive cascade over a post's raw JSON
//! deciding whether it is a reblog. Ordered by cost and expected hit rate so
//! the common cases never reach the regex heuristics at the bottom.

use once_cell::sync::Lazy;
use serde_json::Value;

fn as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64().or_else(|| n.as_i64().map(|i| i as u64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn check_posted_note(doc: &Value) -> bool {
    let Some(notes) = doc.get("notes").and_then(Value::as_array) else {
        return false;
    };
    let Some(n) = notes.last() else { return false };
    let Some(doc_ts) = doc.get("timestamp").and_then(as_u64) else {
        return false;
    };
    let is_posted = n.get("type").and_then(Value::as_str) == Some("posted");
    let earlier = n.get("timestamp").and_then(as_u64).is_some_and(|t| t < doc_ts);
    let different_blog = n.get("blog_uuid").and_then(Value::as_str)
        != doc
            .get("blog")
            .and_then(|b| b.get("uuid"))
            .and_then(Value::as_str);
    is_posted && earlier && different_blog
}

/// Mirrors `_check_content`: decides whether `pred` should even be applied to
/// the post's source/comment text, filtering out posts where content-based
/// checks are known to misfire.
fn check_content(doc: &Value, pred: impl Fn(&str) -> bool, name: &str) -> bool {
    let empty = Value::Object(Default::default());
    let reblog_info = doc.get("reblog").unwrap_or(&empty);

    let is_submission = doc.get("is_submission").and_then(Value::as_bool).unwrap_or(false);
    let tree_html = reblog_info.get("tree_html").and_then(Value::as_str);
    if is_submission && tree_html.unwrap_or("").is_empty() {
        return false;
    }
    if doc.get("post_html").is_some() {
        return false;
    }

    if let Some(source) = doc.get("source").and_then(Value::as_str) {
        return name == "via" && pred(source);
    }

    let has_reblog_info = doc
        .get("reblog")
        .and_then(Value::as_object)
        .is_some_and(|o| !o.is_empty());
    if !has_reblog_info {
        return false;
    }
    let tree_is_empty = tree_html.unwrap_or("").is_empty();
    if !(name == "via" || tree_is_empty) {
        return false;
    }
    match reblog_info.get("comment").and_then(Value::as_str) {
        Some(comment) => pred(comment),
        None => false,
    }
}

static VIA_RE: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r#"\(via <a (class="tumblr_blog" |href="https?://[^/]+/?"[ >])"#).unwrap()
});

fn via_pred(c: &str) -> bool {
    VIA_RE.is_match(c)
}

static BQ_RE2: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"^(<p>)+[a-z0-9-]+:</p>\n*<blockquote>").unwrap());

// Recognises a Tumblr-style blog-attribution anchor immediately followed by a
// colon and (effectively) nothing else on the line, then a blockquote.
// Ported as-is from the source; the trailing negative lookahead and the
// "don't swallow an unrelated leading anchor" lookahead are why this needs
// `fancy-regex` rather than the plain `regex` crate.
static BQ_RE: Lazy<fancy_regex::Regex> = Lazy::new(|| {
    fancy_regex::Regex::new(concat!(
        r#"^("#,
        r#"(?:<(?!a[ >])[^<>]+>"#,
        r#"|"#,
        r#"(?:(?![^>\n\s][^\S\n]*<a[ >])[^<>]))*"#,
        r#"<a("#,
        r#" class="(?P<classes>[^"]*)""#,
        r#"|"#,
        r#" href="https?://("#,
        r#"(?P<blogco>tmblr\.co/[a-zA-Z0-9_]+/?)"#,
        r#"|"#,
        r#"www\.tumblr\.com/dashboard/blog/(?P<bname0>[a-zA-Z0-9-]+)/[0-9]+/?"#,
        r#"|"#,
        r#"(?P<priv>www\.tumblr\.com/blog/private_[0-9]+\?[0-9]+)"#,
        r#"|"#,
        r#"(?:(?:www|(?P<bname1>[a-zA-Z0-9-]+))\.tumblr\.com|[^/"]+)"#,
        r#"(?:(?P<blogpost>/post/[0-9]+(?:/[^/"]*)?)|/[^"]*)?"#,
        r#")""#,
        r#"|"#,
        r#" [^\s</>"'=]+(?:="[^"]*"|\b)"#,
        r#")*"#,
        r#">[^<>]*</a>:"#,
        r#"(?![^\S\n]*[^<\s])"#,
    ))
    .expect("BQ_RE must compile")
});

fn bq_pred(c: &str) -> bool {
    if c.contains("replied to your") {
        return false;
    }
    if BQ_RE2.is_match(c) {
        return true;
    }
    let Ok(Some(caps)) = BQ_RE.captures(c) else {
        return false;
    };
    let has_tumblr_blog_class = caps
        .name("classes")
        .map(|m| m.as_str().split(' ').any(|c| c == "tumblr_blog"))
        .unwrap_or(false);
    if has_tumblr_blog_class
        || caps.name("blogpost").is_some()
        || caps.name("priv").is_some()
        || caps.name("bname0").is_some()
    {
        return true;
    }
    if caps.name("blogco").is_some() || caps.name("bname1").is_some() {
        return has_blockquote_open(c);
    }
    false
}

fn has_blockquote_open(c: &str) -> bool {
    static BLOCKQUOTE_OPEN: Lazy<regex::Regex> =
        Lazy::new(|| regex::Regex::new(r"<blockquote[ >]").unwrap());
    BLOCKQUOTE_OPEN.is_match(c)
}

/// `true` if the post's own `id` equals its trail's declared root, the
/// standard shape of an original (non-reblogged) post.
fn trail_first_is_self(doc: &Value, trail: &[Value]) -> Option<bool> {
    let first = trail.first()?;
    let trail_id = as_u64(first.get("post")?.get("id")?)?;
    let doc_id = as_u64(doc.get("id")?)?;
    Some(trail_id == doc_id)
}

/// Decide whether `doc` (a post's raw JSON) is a reblog.
pub fn is_reblog(doc: &Value) -> bool {
    if doc.get("reblogged_from_id").is_some() {
        return true;
    }

    if let Some(root) = doc.get("root_id").and_then(as_u64) {
        if let Some(id) = doc.get("id").and_then(as_u64) {
            return root != id;
        }
    }

    if let Some(trail) = doc.get("trail").and_then(Value::as_array) {
        if !trail.is_empty() {
            if trail_first_is_self(doc, trail) == Some(false) {
                return true;
            }
            let has_root_item = trail
                .iter()
                .any(|p| p.get("is_root_item").and_then(Value::as_bool).unwrap_or(false));
            if !has_root_item {
                return true;
            }
        }
    }

    if check_content(doc, via_pred, "via") {
        return true;
    }

    if check_posted_note(doc) {
        return true;
    }

    if let Some(tree_html) = doc
        .get("reblog")
        .and_then(|r| r.get("tree_html"))
        .and_then(Value::as_str)
    {
        if !tree_html.is_empty() && !tree_html.contains(" replied to your ") {
            return true;
        }
    }

    if check_content(doc, bq_pred, "blockquote") {
        return true;
    }

    false
}
