use reqwest::cookie::Jar;
use reqwest::Url;

/// A session cookie taken from a raw cookie blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// Parses a cookie blob with one `name=value` pair per line, as exported from a logged-in browser
/// session. Lines without `=` are skipped. The value may itself contain `=`, but not `;`, which
/// would end the cookie once it is put in a `Cookie` header; such lines are skipped with a warning.
pub fn parse(raw: &str) -> Vec<Cookie> {
    raw.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(name, value)| Cookie {
            name: name.trim().to_owned(),
            value: value.trim().to_owned(),
        })
        .filter(|cookie| !cookie.name.is_empty())
        .filter(|cookie| {
            let valid = !cookie.name.contains(';') && !cookie.value.contains(';');
            if !valid {
                // Never log the value, it is a session secret.
                log::warn!("skipping cookie `{}` containing `;`", cookie.name);
            }
            valid
        })
        .collect()
}

/// Adds `cookies` to `jar`, scoped to `domain` with path `/`. `url` must be on that domain.
pub fn add_to_jar(jar: &Jar, cookies: &[Cookie], domain: &str, url: &Url) {
    for cookie in cookies {
        jar.add_cookie_str(
            &format!("{}={}; Domain={}; Path=/", cookie.name, cookie.value, domain),
            url,
        );
    }
}
