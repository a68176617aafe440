//! Route path generalization
//!
//! Persisted rules are scoped to a host plus a path *pattern* rather than a
//! concrete path, so that one rule created on `/user/123` also covers
//! `/user/456`. Generalization replaces volatile segments - purely numeric
//! ids and long hex blobs - with a wildcard token.

/// The wildcard token standing in for one volatile path segment.
pub const WILDCARD: &str = "*";

/// The host-wide pattern: covers every path on the host. Used by presets
/// and saved configurations, never produced by [`generalize_path`].
pub const MATCH_ALL: &str = "*";

const HEX_SEGMENT_MIN: usize = 32;

/// Generalize a concrete pathname into a storage pattern.
///
/// `/user/123/posts` -> `/user/*/posts`; segments of 32+ hex characters
/// (content hashes, session ids) also become wildcards. The input is
/// expected to be a bare pathname, without query or fragment.
pub fn generalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return "/".to_string();
    }

    let mut out = String::with_capacity(trimmed.len());
    for segment in trimmed.trim_start_matches('/').split('/') {
        out.push('/');
        if is_volatile_segment(segment) {
            out.push_str(WILDCARD);
        } else {
            out.push_str(segment);
        }
    }
    out
}

/// Does a concrete path fall under a stored pattern?
///
/// Wildcards match exactly one segment; everything else matches verbatim.
pub fn path_matches(pattern: &str, path: &str) -> bool {
    if pattern == MATCH_ALL {
        return true;
    }
    if pattern == "/" {
        return path == "/" || path.is_empty();
    }

    let mut pattern_segments = pattern.trim_start_matches('/').split('/');
    let mut path_segments = path.trim_start_matches('/').split('/');

    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (None, None) => return true,
            (Some(p), Some(s)) if p == WILDCARD || p == s => continue,
            _ => return false,
        }
    }
}

/// Volatile segments: purely numeric ids, or hex blobs of 32+ chars.
fn is_volatile_segment(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    let bytes = segment.as_bytes();
    if bytes.iter().all(|b| b.is_ascii_digit()) {
        return true;
    }
    bytes.len() >= HEX_SEGMENT_MIN && bytes.iter().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generalize_numeric_segment() {
        assert_eq!(generalize_path("/user/123"), "/user/*");
        assert_eq!(generalize_path("/user/123/posts"), "/user/*/posts");
    }

    #[test]
    fn test_generalize_hex_segment() {
        let hash = "a".repeat(32);
        assert_eq!(generalize_path(&format!("/build/{hash}")), "/build/*");
        // Short hex-looking segments stay literal.
        assert_eq!(generalize_path("/build/abc123"), "/build/abc123");
        // 32+ chars but not hex.
        let word = "z".repeat(40);
        assert_eq!(
            generalize_path(&format!("/build/{word}")),
            format!("/build/{word}")
        );
    }

    #[test]
    fn test_generalize_root_and_empty() {
        assert_eq!(generalize_path("/"), "/");
        assert_eq!(generalize_path(""), "/");
        assert_eq!(generalize_path("/news"), "/news");
    }

    #[test]
    fn test_match_all_pattern() {
        for path in ["/", "/news", "/user/123/posts", ""] {
            assert!(path_matches(MATCH_ALL, path));
        }
    }

    #[test]
    fn test_path_matches() {
        assert!(path_matches("/user/*", "/user/123"));
        assert!(path_matches("/user/*", "/user/alice"));
        assert!(!path_matches("/user/*", "/user"));
        assert!(!path_matches("/user/*", "/user/123/posts"));
        assert!(path_matches("/user/*/posts", "/user/42/posts"));
        assert!(path_matches("/", "/"));
        assert!(!path_matches("/", "/news"));
        assert!(path_matches("/news", "/news"));
    }

    #[test]
    fn test_generalized_matches_original() {
        for path in ["/user/9001", "/a/b/c", "/", "/watch/deadbeefdeadbeefdeadbeefdeadbeef"] {
            assert!(path_matches(&generalize_path(path), path));
        }
    }
}
