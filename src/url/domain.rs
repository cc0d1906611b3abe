use crate::url::matcher::matches_wildcard;
use url::Url;

/// Second-level labels that make a three-label base domain (`example.co.uk`)
const SPECIAL_SECOND_LEVEL: &[&str] = &[
    "co", "com", "org", "gov", "edu", "net", "mil", "int", "ac", "ad", "ae", "af", "ag",
];

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use focusmine::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Extracts the registrable base domain of a URL string
///
/// Ports and a leading `www.` are dropped, IPv4 hosts are returned as-is and
/// `mp.weixin.qq.com` is kept whole because every account shares it.
/// Returns an empty string when the input has no host.
pub fn base_domain(url: &str) -> String {
    let host = match Url::parse(url).ok().and_then(|u| extract_domain(&u)) {
        Some(host) => host,
        None => return String::new(),
    };

    if host.starts_with("mp.weixin.qq.com") {
        return "mp.weixin.qq.com".to_string();
    }

    let is_ipv4 = host.split('.').count() == 4 && host.split('.').all(|p| p.parse::<u8>().is_ok());
    if is_ipv4 {
        return host;
    }

    let host = host.strip_prefix("www.").unwrap_or(&host);
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() > 2 && SPECIAL_SECOND_LEVEL.contains(&parts[parts.len() - 2]) {
        parts[parts.len() - 3..].join(".")
    } else if parts.len() >= 2 {
        parts[parts.len() - 2..].join(".")
    } else {
        host.to_string()
    }
}

/// Returns true when `url` points to a different base domain than `base_url`
///
/// Relative or unparsable targets count as internal.
pub fn is_external_url(url: &str, base_url: &str) -> bool {
    let base = base_domain(base_url);
    if base.is_empty() {
        return false;
    }

    let target = base_domain(url);
    !target.is_empty() && target != base
}

/// Returns true when the URL's host is, or is under, one of the given domains
pub fn is_social_media_url(url: &str, domains: &[String]) -> bool {
    let host = match Url::parse(url).ok().and_then(|u| extract_domain(&u)) {
        Some(host) => host,
        None => return false,
    };
    let host = host.strip_prefix("www.").unwrap_or(&host);

    domains
        .iter()
        .any(|d| matches_wildcard(&format!("*.{}", d.trim_start_matches("*.")), host))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn social() -> Vec<String> {
        vec!["weibo.com".to_string(), "m.weibo.cn".to_string(), "x.com".to_string()]
    }

    #[test]
    fn test_extract_simple_domain() {
        let url = Url::parse("https://Example.COM:8080/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_base_domain_strips_subdomains() {
        assert_eq!(base_domain("https://news.example.com/a"), "example.com");
        assert_eq!(base_domain("https://www.example.com/a"), "example.com");
        assert_eq!(base_domain("https://shop.example.co.uk/a"), "example.co.uk");
    }

    #[test]
    fn test_base_domain_special_cases() {
        assert_eq!(
            base_domain("https://mp.weixin.qq.com/s/abc"),
            "mp.weixin.qq.com"
        );
        assert_eq!(base_domain("http://192.168.1.10:8080/x"), "192.168.1.10");
        assert_eq!(base_domain("http://localhost/x"), "localhost");
        assert_eq!(base_domain("not a url"), "");
    }

    #[test]
    fn test_is_external_url() {
        assert!(is_external_url("https://other.com/x", "https://example.com/"));
        assert!(!is_external_url("https://blog.example.com/x", "https://example.com/"));
        assert!(!is_external_url("/relative", "https://example.com/"));
        assert!(!is_external_url("https://other.com/x", ""));
    }

    #[test]
    fn test_is_social_media_url() {
        assert!(is_social_media_url("https://weibo.com/u/1", &social()));
        assert!(is_social_media_url("https://www.weibo.com/u/1", &social()));
        assert!(is_social_media_url("https://m.weibo.cn/status/2", &social()));
        assert!(is_social_media_url("https://x.com/someone", &social()));
        assert!(!is_social_media_url("https://box.com/file", &social()));
        assert!(!is_social_media_url("mailto:a@b.com", &social()));
    }
}
