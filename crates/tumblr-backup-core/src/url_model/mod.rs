//! URL modeling and media filename derivation.

mod path;
mod sanitize;

pub use path::filename_from_url_path;
pub use sanitize::sanitize_filename;

/// Default filename when a URL path yields nothing usable.
const DEFAULT_FILENAME: &str = "download.bin";

/// The three `image_names` schemes controlling how a media filename is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageNamesPolicy {
    /// Keep the original basename from the URL.
    Original,
    /// `<post_id>[offset]<ext>`.
    PostId,
    /// `<blog>_<post_id>[offset]<ext>`.
    BlogAndPostId,
}

impl ImageNamesPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "o" => Some(Self::Original),
            "i" => Some(Self::PostId),
            "bi" => Some(Self::BlogAndPostId),
            _ => None,
        }
    }
}

/// Derives the media filename for `url` per `policy`.
///
/// `offset` numbers the Nth media item within a single post (0 for the
/// first); it is only folded into the name for `PostId`/`BlogAndPostId`.
/// The file extension always comes from the URL's own basename (or `.jpg` if
/// none is present), since Tumblr CDN URLs are not content-disposition-driven.
pub fn derive_media_filename(
    url: &str,
    policy: ImageNamesPolicy,
    blog_name: &str,
    post_id: u64,
    offset: usize,
) -> String {
    let original = filename_from_url_path(url).unwrap_or_else(|| DEFAULT_FILENAME.to_string());
    let ext = original
        .rfind('.')
        .map(|i| &original[i..])
        .unwrap_or(".jpg")
        .to_string();

    let base = match policy {
        ImageNamesPolicy::Original => {
            let stem = original.rfind('.').map(|i| &original[..i]).unwrap_or(&original);
            stem.to_string()
        }
        ImageNamesPolicy::PostId => {
            if offset > 0 {
                format!("{post_id}_{offset}")
            } else {
                format!("{post_id}")
            }
        }
        ImageNamesPolicy::BlogAndPostId => {
            if offset > 0 {
                format!("{blog_name}_{post_id}_{offset}")
            } else {
                format!("{blog_name}_{post_id}")
            }
        }
    };

    let with_query = fold_query_into_name(url, &base);
    let name = format!("{with_query}{ext}");
    sanitize_filename(&name)
}

/// Tumblr CDN URLs occasionally disambiguate otherwise-identical basenames
/// with a query string (e.g. a signed-URL token); fold that into the
/// filename so two distinct remote objects don't collide locally. Uses `?`
/// on platforms where it is filesystem-legal and `@` (the Windows-safe
/// substitute) everywhere else, matching the source tool's behaviour.
fn fold_query_into_name(url: &str, base: &str) -> String {
    let query = match url::Url::parse(url) {
        Ok(parsed) => parsed.query().map(|q| q.to_string()),
        Err(_) => None,
    };
    match query {
        Some(q) if !q.is_empty() => {
            let sep = if cfg!(windows) { '@' } else { '?' };
            format!("{base}{sep}{q}")
        }
        _ => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn original_scheme_keeps_url_basename() {
        let name = derive_media_filename(
            "https://64.media.tumblr.com/abcdef/tumblr_xyz_500.jpg",
            ImageNamesPolicy::Original,
            "myblog",
            123,
            0,
        );
        assert_eq!(name, "tumblr_xyz_500.jpg");
    }

    #[test]
    fn post_id_scheme_with_offset() {
        let name = derive_media_filename(
            "https://64.media.tumblr.com/abcdef/tumblr_xyz_500.png",
            ImageNamesPolicy::PostId,
            "myblog",
            123,
            2,
        );
        assert_eq!(name, "123_2.png");
    }

    #[test]
    fn blog_and_post_id_scheme_without_offset() {
        let name = derive_media_filename(
            "https://64.media.tumblr.com/abcdef/tumblr_xyz_500.png",
            ImageNamesPolicy::BlogAndPostId,
            "myblog",
            123,
            0,
        );
        assert_eq!(name, "myblog_123.png");
    }

    #[test]
    fn query_is_folded_into_the_name() {
        let name = derive_media_filename(
            "https://example.com/img.jpg?v=2",
            ImageNamesPolicy::Original,
            "myblog",
            1,
            0,
        );
        assert_eq!(name, "img?v=2.jpg");
    }

    #[test]
    fn image_names_policy_parses_the_three_codes() {
        assert_eq!(ImageNamesPolicy::parse("o"), Some(ImageNamesPolicy::Original));
        assert_eq!(ImageNamesPolicy::parse("i"), Some(ImageNamesPolicy::PostId));
        assert_eq!(
            ImageNamesPolicy::parse("bi"),
            Some(ImageNamesPolicy::BlogAndPostId)
        );
        assert_eq!(ImageNamesPolicy::parse("x"), None);
    }
}
