//! Utility functions

/// Derive an artifact filename from a download URL
///
/// Takes the final path segment (the query string is never part of it) and
/// percent-decodes it. Returns `None` when the path ends in `/` or has no
/// segments.
///
/// # Examples
///
/// ```
/// use build_relay::utils::filename_from_url;
///
/// let url = url::Url::parse("https://cdn.example.com/builds/42/App-Release.ipa?sig=x").unwrap();
/// assert_eq!(filename_from_url(&url).as_deref(), Some("App-Release.ipa"));
/// ```
pub fn filename_from_url(url: &url::Url) -> Option<String> {
    let last_segment = url.path_segments()?.next_back()?;
    if last_segment.is_empty() {
        return None;
    }

    let decoded = urlencoding::decode(last_segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| last_segment.to_string());

    Some(decoded)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> Option<String> {
        filename_from_url(&url::Url::parse(raw).unwrap())
    }

    #[test]
    fn final_segment_without_query() {
        assert_eq!(
            name("https://cdn.example.com/builds/42/App-Release.ipa").as_deref(),
            Some("App-Release.ipa")
        );
        assert_eq!(
            name("https://cdn.example.com/builds/42/App-Release.ipa?X-Amz-Signature=abc").as_deref(),
            Some("App-Release.ipa")
        );
        assert_eq!(
            name("https://cdn.example.com/a/game.apk#frag").as_deref(),
            Some("game.apk")
        );
    }

    #[test]
    fn percent_encoded_names_are_decoded() {
        assert_eq!(
            name("https://cdn.example.com/builds/My%20Game%201.0.ipa").as_deref(),
            Some("My Game 1.0.ipa")
        );
    }

    #[test]
    fn trailing_slash_or_bare_host_has_no_filename() {
        assert_eq!(name("https://cdn.example.com/builds/"), None);
        assert_eq!(name("https://cdn.example.com"), None);
    }

    #[test]
    fn non_hierarchical_url_has_no_filename() {
        assert_eq!(name("data:text/plain,hello"), None);
    }
}
