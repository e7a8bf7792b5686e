//! Request signing and the browser login handshake.
//!
//! Every call to the notebook service carries `akid`, `expires` and `sig`,
//! where `sig` is an HMAC-SHA512 over `akid ++ method ++ expires` keyed with
//! the access password. Logging in is a redirect dance: the user signs in
//! through the browser, the service redirects to a loopback listener with an
//! authorization code, and the code is exchanged for the user id.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiError, LabClient};
use crate::callback::{merge_callbacks, CallbackServer};
use crate::models::Session;
use crate::redact::mask_sensitive_url;

type HmacSha512 = Hmac<Sha512>;

/// Method name signed for the identity lookup.
pub const USER_ACCESS_INFO: &str = "user_access_info";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication timed out after {0:?}")]
    Timeout(Duration),

    #[error("login redirect did not carry both auth_code and email")]
    MissingCredentials,

    #[error("invalid identity response: {0}")]
    InvalidResponse(String),

    #[error("callback listener failed: {0}")]
    Listener(#[from] std::io::Error),

    #[error(transparent)]
    Api(ApiError),
}

impl From<ApiError> for AuthError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::InvalidResponse(msg) => AuthError::InvalidResponse(msg),
            other => AuthError::Api(other),
        }
    }
}

// ============================================================================
// Signing
// ============================================================================

/// Expiry stamp for a signed request: milliseconds since the epoch, taken
/// at whole-second resolution.
pub fn expires_now() -> i64 {
    Utc::now().timestamp() * 1000
}

/// Sign `access_key_id ++ api_method ++ expires` with the access password.
/// The result is standard base64; callers percent-encode it into URLs.
pub fn generate_signature(
    access_key_id: &str,
    api_method: &str,
    expires: i64,
    access_password: &str,
) -> String {
    let base = format!("{}{}{}", access_key_id, api_method, expires);
    let mut mac = HmacSha512::new_from_slice(access_password.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(base.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Check a signature in constant time.
pub fn verify_signature(
    access_key_id: &str,
    api_method: &str,
    expires: i64,
    access_password: &str,
    signature: &str,
) -> bool {
    let expected = generate_signature(access_key_id, api_method, expires, access_password);
    let (got, want) = (signature.as_bytes(), expected.as_bytes());
    got.len() == want.len() && got.ct_eq(want).unwrap_u8() == 1
}

// ============================================================================
// Handshake
// ============================================================================

/// Open a URL in the user's default browser.
pub fn open_in_browser(url: &str) -> Result<(), String> {
    open::that(url).map_err(|e| format!("Failed to open URL: {}", e))
}

/// Run the login handshake, opening the system browser.
pub async fn authenticate(client: &LabClient) -> Result<Session, AuthError> {
    authenticate_with(client, open_in_browser).await
}

/// Run the login handshake with a custom way of presenting the login URL.
///
/// The loopback listener is shut down before this returns, whatever the
/// outcome.
pub async fn authenticate_with<F>(client: &LabClient, launch: F) -> Result<Session, AuthError>
where
    F: FnOnce(&str) -> Result<(), String>,
{
    let config = client.config();
    let server = CallbackServer::start(config.callback_port).await?;

    let result = run_handshake(client, &server, launch).await;

    server.shutdown().await;
    result
}

async fn run_handshake<F>(
    client: &LabClient,
    server: &CallbackServer,
    launch: F,
) -> Result<Session, AuthError>
where
    F: FnOnce(&str) -> Result<(), String>,
{
    let config = client.config();
    let login_url = client.login_url(expires_now());

    info!("Opening browser for authentication...");
    if let Err(e) = launch(&login_url) {
        // The user can still paste the URL by hand while we wait.
        warn!("{}; open this URL to log in: {}", e, login_url);
    }

    let captured = server
        .wait_for_callback(config.login_timeout)
        .await
        .ok_or(AuthError::Timeout(config.login_timeout))?;

    let masked: Vec<String> = captured.iter().map(|c| mask_sensitive_url(c)).collect();
    debug!("auth_callbacks: {:?}", masked);

    let params = merge_callbacks(&captured);
    let (auth_code, email) = match (params.auth_code, params.email) {
        (Some(code), Some(email)) => (code, email),
        _ => return Err(AuthError::MissingCredentials),
    };

    let info = client.user_access_info(&email, &auth_code).await?;
    info!("User authentication complete!");

    Ok(Session {
        is_authenticated: true,
        user_id: Some(info.id),
        email: Some(email),
        notebooks: info.notebooks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic() {
        let a = generate_signature("akid", "user_access_info", 1_700_000_000_000, "secret");
        let b = generate_signature("akid", "user_access_info", 1_700_000_000_000, "secret");
        assert_eq!(a, b);
        // SHA-512 digest is 64 bytes, 88 base64 characters
        assert_eq!(a.len(), 88);
    }

    #[test]
    fn test_signature_changes_with_each_input() {
        let base = generate_signature("akid", "method", 1000, "secret");
        assert_ne!(base, generate_signature("akid2", "method", 1000, "secret"));
        assert_ne!(base, generate_signature("akid", "method2", 1000, "secret"));
        assert_ne!(base, generate_signature("akid", "method", 2000, "secret"));
        assert_ne!(base, generate_signature("akid", "method", 1000, "secret2"));
    }

    #[test]
    fn test_signature_depends_on_concatenation_only() {
        // The signed string is a plain concatenation of the three parts
        assert_eq!(
            generate_signature("ab", "c", 1, "k"),
            generate_signature("a", "bc", 1, "k")
        );
    }

    #[test]
    fn test_signature_matches_plain_hmac() {
        let sig = generate_signature("The quick brown fox ", "jumps over the lazy dog", 0, "key");
        let mut mac = HmacSha512::new_from_slice(b"key").unwrap();
        mac.update(b"The quick brown fox jumps over the lazy dog0");
        assert_eq!(sig, STANDARD.encode(mac.finalize().into_bytes()));
    }

    #[test]
    fn test_verify_signature() {
        let sig = generate_signature("akid", "m", 42, "pw");
        assert!(verify_signature("akid", "m", 42, "pw", &sig));
        assert!(!verify_signature("akid", "m", 43, "pw", &sig));
        assert!(!verify_signature("akid", "m", 42, "pw", "short"));
    }

    #[test]
    fn test_expires_is_whole_seconds_in_ms() {
        let e = expires_now();
        assert_eq!(e % 1000, 0);
        assert!(e > 1_600_000_000_000);
    }
}
