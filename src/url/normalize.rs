use crate::UrlError;
use url::Url;

/// Tracking query parameters removed from every cited URL
const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "ref",
    "referrer",
    "source",
    "from",
    "fb_action_ids",
    "fb_action_types",
    "fb_ref",
    "fb_source",
    "action_object_map",
    "action_type_map",
    "action_ref_map",
    "_ga",
    "_gl",
    "_gcl_au",
    "mc_cid",
    "mc_eid",
    "_bta_tid",
    "_bta_c",
    "trk_contact",
    "trk_msg",
    "trk_module",
    "trk_sid",
    "gdfms",
    "gdftrk",
    "gdffi",
    "_ke",
    "redirect_log_mongo_id",
    "redirect_mongo_id",
    "sb_referrer_host",
    "mkt_tok",
    "mkt_unsubscribe",
    "amp",
    "amp_js_v",
    "amp_r",
    "__twitter_impression",
    "s_kwcid",
    "msclkid",
    "dm_i",
    "epik",
    "pk_campaign",
    "pk_kwd",
    "pk_keyword",
    "piwik_campaign",
    "piwik_kwd",
    "piwik_keyword",
    "yclid",
    "_openstat",
    "wt_zmc",
    "wt.zmc",
    "xtor",
    "xtref",
];

/// URL schemes passed through untouched
const OPAQUE_SCHEMES: &[&str] = &["mailto:", "tel:", "javascript:", "data:"];

/// Resolves a link target found in a document into an absolute, cleaned URL
///
/// # Resolution Steps
///
/// 1. Trim; reject empty input
/// 2. Pass `mailto:`, `tel:`, `javascript:` and `data:` targets through unchanged
/// 3. Repair scheme-less forms (`www.x.com`, `//x.com`, `http:/x.com`)
/// 4. Join anything else against `base`
/// 5. Remove tracking query parameters, keeping the order of the rest
///
/// Fragments, host case and trailing slashes are preserved: the result is a
/// citation target, not a crawl-frontier key.
///
/// # Examples
///
/// ```
/// use focusmine::url::resolve_url;
/// use url::Url;
///
/// let base = Url::parse("http://a.com").unwrap();
/// let url = resolve_url("/p?utm_source=z", Some(&base)).unwrap();
/// assert_eq!(url, "http://a.com/p");
/// ```
pub fn resolve_url(raw: &str, base: Option<&Url>) -> Result<String, UrlError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UrlError::Malformed("empty URL".to_string()));
    }

    let lowered = raw.to_ascii_lowercase();
    if OPAQUE_SCHEMES.iter().any(|s| lowered.starts_with(s)) {
        return Ok(raw.to_string());
    }

    let mut url = if lowered.starts_with("www.") {
        Url::parse(&format!("https://{}", raw))
    } else if lowered.starts_with("/www.") {
        Url::parse(&format!("https:/{}", raw))
    } else if raw.starts_with("//") {
        Url::parse(&format!("https:{}", raw))
    } else if lowered.starts_with("http://") || lowered.starts_with("https://") {
        Url::parse(raw)
    } else if lowered.starts_with("https:/") {
        Url::parse(&format!("https://{}", &raw[7..]))
    } else if lowered.starts_with("http:/") {
        Url::parse(&format!("http://{}", &raw[6..]))
    } else {
        match base {
            Some(base) => base.join(raw),
            None => return Err(UrlError::MissingDomain),
        }
    }
    .map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }
    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    strip_tracking_params(&mut url);
    Ok(url.to_string())
}

/// Removes tracking parameters in place; untouched queries keep their encoding
fn strip_tracking_params(url: &mut Url) {
    if url.query().is_none() {
        return;
    }

    let total = url.query_pairs().count();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.len() == total {
        return;
    }

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    if TRACKING_PARAMS.contains(&key.as_str()) {
        return true;
    }

    if key.starts_with("utm_") || key.starts_with("mtm_") {
        return true;
    }

    // xpa..xpz plus the longer xp* identifiers
    (key.len() == 3 && key.starts_with("xp"))
        || matches!(key.as_str(), "xpid" | "xpsid" | "xpcid" | "xptid")
}
