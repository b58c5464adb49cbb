//! Filename sanitization matching the source tool's cross-platform policy:
//! strip the Windows-illegal character set even on Unix, so archives stay
//! portable between operating systems.

/// Characters that are illegal in a Windows filename and therefore stripped
/// everywhere, regardless of host OS.
const ILLEGAL: [char; 9] = [':', '<', '>', '"', '/', '\\', '|', '*', '?'];

/// Sanitizes a candidate filename.
///
/// - Replaces NUL, control characters, and the Windows-illegal set with `_`
///   (note: `?` is not replaced here when it originates from a folded query
///   string — callers that fold a query in must do so after sanitizing the
///   base name, as `derive_media_filename` does).
/// - Trims leading/trailing spaces and dots.
/// - Collapses consecutive underscores.
/// - Limits length to 255 bytes (on a char boundary).
pub fn sanitize_filename(name: &str) -> String {
    const NAME_MAX: usize = 255;

    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;

    for c in name.chars() {
        let replacement = if c == '\0' || c.is_control() || (ILLEGAL.contains(&c) && c != '?') {
            '_'
        } else if c == ' ' || c == '\t' {
            '_'
        } else {
            c
        };

        if replacement == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(replacement);
            prev_underscore = replacement == '_';
        }
    }

    let trimmed = out.trim_matches(|c| c == ' ' || c == '\t' || c == '.' || c == '_');

    if trimmed.len() > NAME_MAX {
        let mut take = NAME_MAX;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].to_string()
    } else {
        trimmed.to_string()
    }
}
