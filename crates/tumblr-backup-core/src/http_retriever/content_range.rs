//! `Content-Range` header parsing, including the historical `bytes: x-y/z`
//! quirk (colon instead of space after `bytes`) some servers still emit, and
//! the `*` total-length placeholder for unknown entity length.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedContentRange {
    pub first: u64,
    pub last: u64,
    pub entity_length: Option<u64>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ContentRangeError(pub String);

impl std::fmt::Display for ContentRangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid Content-Range: {}", self.0)
    }
}

impl std::error::Error for ContentRangeError {}

/// Parse a `Content-Range` header value, e.g. `bytes 100-199/1000`,
/// `bytes 100-199/*`, or the historical `bytes: 100-199/1000`.
pub fn parse_content_range(value: &str) -> Result<ParsedContentRange, ContentRangeError> {
    let value = value.trim();
    let rest = value
        .strip_prefix("bytes")
        .ok_or_else(|| ContentRangeError(value.to_string()))?;
    let rest = rest.trim_start_matches(':').trim_start();

    let (range_part, total_part) = rest
        .split_once('/')
        .ok_or_else(|| ContentRangeError(value.to_string()))?;

    let (first_s, last_s) = range_part
        .split_once('-')
        .ok_or_else(|| ContentRangeError(value.to_string()))?;

    let first: u64 = first_s
        .trim()
        .parse()
        .map_err(|_| ContentRangeError(value.to_string()))?;
    let last: u64 = last_s
        .trim()
        .parse()
        .map_err(|_| ContentRangeError(value.to_string()))?;

    if last < first {
        return Err(ContentRangeError(value.to_string()));
    }

    let total_part = total_part.trim();
    let entity_length = if total_part == "*" {
        None
    } else {
        let n: u64 = total_part
            .parse()
            .map_err(|_| ContentRangeError(value.to_string()))?;
        if n <= last {
            return Err(ContentRangeError(value.to_string()));
        }
        Some(n)
    };

    Ok(ParsedContentRange {
        first,
        last,
        entity_length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_normal_form() {
        let r = parse_content_range("bytes 100-199/1000").unwrap();
        assert_eq!(r.first, 100);
        assert_eq!(r.last, 199);
        assert_eq!(r.entity_length, Some(1000));
    }

    #[test]
    fn parses_historical_colon_quirk() {
        let r = parse_content_range("bytes: 100-199/1000").unwrap();
        assert_eq!(r.first, 100);
        assert_eq!(r.last, 199);
    }

    #[test]
    fn parses_unknown_total() {
        let r = parse_content_range("bytes 0-499/*").unwrap();
        assert_eq!(r.entity_length, None);
    }

    #[test]
    fn rejects_last_before_first() {
        assert!(parse_content_range("bytes 199-100/1000").is_err());
    }

    #[test]
    fn rejects_entity_length_not_past_last() {
        assert!(parse_content_range("bytes 100-199/150").is_err());
    }

    #[test]
    fn rejects_non_bytes_unit() {
        assert!(parse_content_range("items 0-1/2").is_err());
    }
}
