//! URL handling module for focusmine
//!
//! This module provides link resolution with tracking-parameter removal,
//! base-domain extraction, social-media and external-link checks, and
//! wildcard host matching for host-scoped policies.

mod domain;
mod matcher;
mod normalize;

pub use domain::{base_domain, extract_domain, is_external_url, is_social_media_url};
pub use matcher::{matches_wildcard, url_host_matches};
pub use normalize::resolve_url;

/// Image file extensions worth sending to the image describer
const DESCRIBABLE_IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];

/// Returns true for URLs that look like raster images a vision model can read
///
/// `data:image` URIs qualify; other URLs must be http(s) and end with a
/// describable extension once query and fragment are removed. SVG icons,
/// GIF spacers and extension-less endpoints do not qualify.
///
/// # Examples
///
/// ```
/// use focusmine::url::is_describable_image_url;
///
/// assert!(is_describable_image_url("https://cdn.example.com/a/photo.JPG?w=300"));
/// assert!(!is_describable_image_url("https://cdn.example.com/logo.svg"));
/// ```
pub fn is_describable_image_url(url: &str) -> bool {
    if url.starts_with("data:image") {
        return true;
    }
    if !url.starts_with("http") {
        return false;
    }

    let clean = url
        .split('?')
        .next()
        .unwrap_or("")
        .split('#')
        .next()
        .unwrap_or("")
        .trim_end_matches('/')
        .to_lowercase();

    DESCRIBABLE_IMAGE_EXTENSIONS
        .iter()
        .any(|ext| clean.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describable_images() {
        assert!(is_describable_image_url("https://a.com/x.png"));
        assert!(is_describable_image_url("https://a.com/x.webp#frag"));
        assert!(is_describable_image_url("data:image/png;base64,AAAA"));
    }

    #[test]
    fn test_non_describable_images() {
        assert!(!is_describable_image_url("https://a.com/x.gif"));
        assert!(!is_describable_image_url("https://a.com/image?id=3"));
        assert!(!is_describable_image_url("/relative/x.png"));
        assert!(!is_describable_image_url(""));
    }
}
