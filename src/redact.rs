//! Masking of credentials inside URLs before they reach the logs.

use tracing::warn;
use url::Url;

const MASK: &str = "********";

/// Query parameters whose values never get logged. A parameter is masked
/// when its lowercased name contains any of these.
const SENSITIVE_PARAMS: &[&str] = &[
    "auth_token",
    "auth_code",
    "token",
    "api_key",
    "apikey",
    "password",
    "secret",
    "client_secret",
    "access_token",
    "refresh_token",
    "bearer",
    "authorization",
    "api-key",
    "x-api-key",
    "key",
    "login_or_email",
    "email",
    "login",
];

fn is_sensitive(param: &str) -> bool {
    let lower = param.to_lowercase();
    SENSITIVE_PARAMS.iter().any(|s| lower.contains(s))
}

/// Mask sensitive query values and basic-auth userinfo while keeping the
/// rest of the URL intact. Accepts absolute URLs and bare paths such as
/// `/callback?auth_code=...`. Input that cannot be parsed comes back as is.
pub fn mask_sensitive_url(raw: &str) -> String {
    let (mut url, relative) = match Url::parse(raw) {
        Ok(url) => (url, false),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            match Url::parse("http://relative.invalid").and_then(|base| base.join(raw)) {
                Ok(url) => (url, true),
                Err(e) => {
                    warn!("Failed to mask URL: {}", e);
                    return raw.to_string();
                }
            }
        }
        Err(e) => {
            warn!("Failed to mask URL: {}", e);
            return raw.to_string();
        }
    };

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if is_sensitive(&k) {
                MASK.to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), value)
        })
        .collect();
    if !pairs.is_empty() {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    if !url.username().is_empty() || url.password().is_some() {
        let _ = url.set_username(MASK);
        let _ = url.set_password(None);
    }

    if relative {
        let mut out = url.path().to_string();
        if let Some(q) = url.query() {
            out.push('?');
            out.push_str(q);
        }
        if let Some(f) = url.fragment() {
            out.push('#');
            out.push_str(f);
        }
        out
    } else {
        url.to_string()
    }
}
