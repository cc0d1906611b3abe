use crate::url::domain::extract_domain;
use url::Url;

/// Checks if a host matches a wildcard pattern
///
/// - `"example.com"` matches only `example.com`
/// - `"*.example.com"` matches `example.com` and any subdomain of it
///
/// Hosts should be lowercased before calling; matching is case-sensitive.
///
/// # Examples
///
/// ```
/// use focusmine::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.example.com", "blog.example.com"));
/// assert!(!matches_wildcard("example.com", "blog.example.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Returns true when the host of `url` matches any of the host patterns
///
/// Used for host-scoped policies such as "never discover links on these
/// hosts". Unparsable URLs match nothing.
pub fn url_host_matches(url: &str, patterns: &[String]) -> bool {
    let host = match Url::parse(url).ok().and_then(|u| extract_domain(&u)) {
        Some(host) => host,
        None => return false,
    };

    patterns
        .iter()
        .any(|pattern| matches_wildcard(&pattern.to_lowercase(), &host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches_wildcard("example.com", "example.com"));
        assert!(!matches_wildcard("example.com", "blog.example.com"));
        assert!(!matches_wildcard("blog.example.com", "example.com"));
    }

    #[test]
    fn test_wildcard_matches_bare_and_nested() {
        assert!(matches_wildcard("*.example.com", "example.com"));
        assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
    }

    #[test]
    fn test_wildcard_no_match_partial() {
        assert!(!matches_wildcard("*.example.com", "myexample.com"));
        assert!(!matches_wildcard("*.example.com", "example.com.org"));
    }

    #[test]
    fn test_url_host_matches() {
        let patterns = vec!["mp.weixin.qq.com".to_string(), "*.Example.org".to_string()];

        assert!(url_host_matches("https://mp.weixin.qq.com/s/abc", &patterns));
        assert!(url_host_matches("https://news.example.org/a", &patterns));
        assert!(url_host_matches("https://EXAMPLE.org/", &patterns));
        assert!(!url_host_matches("https://weixin.qq.com/", &patterns));
        assert!(!url_host_matches("not a url", &patterns));
    }
}
