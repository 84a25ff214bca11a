use std::sync::LazyLock;

use regex::Regex;

static PROFILE_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<div class="picSurround"><a href="(.+?)">"#).unwrap());
static CSRF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta name=['"]csrf_token['"] content=['"](.+?)['"]>"#).unwrap()
});
static LOGIN_FORM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<input[^>]*name=['"]user_name['"]"#).unwrap());

/// Profile URLs on a listing page, in page order. Relative links are joined
/// onto `base_url`.
pub fn profile_urls(page: &str, base_url: &str) -> Vec<String> {
    PROFILE_LINK_RE
        .captures_iter(page)
        .map(|c| absolutize(&c[1], base_url))
        .collect()
}

fn absolutize(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", base_url, href)
    } else {
        format!("{}/{}", base_url, href)
    }
}

/// The per-session anti-forgery token embedded in the login form page.
pub fn csrf_token(page: &str) -> Option<String> {
    CSRF_RE.captures(page).map(|c| c[1].to_string())
}

/// Whether `page` still shows the login form. The site answers a rejected
/// login with a 200 and the form again.
pub fn has_login_form(page: &str) -> bool {
    LOGIN_FORM_RE.is_match(page)
}
