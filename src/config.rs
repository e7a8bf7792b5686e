//! Runtime configuration.
//!
//! Credentials and endpoints come from the environment (API_URL,
//! ACCESS_KEY_ID, ACCESS_PASSWORD, SSL_CER, CALLBACK_PORT), usually loaded
//! from a `.env` file. Lowercase spellings (`api_url`, ...) are accepted as
//! well. The CLI can override each of them with a flag.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Port the login redirect lands on.
pub const DEFAULT_CALLBACK_PORT: u16 = 8000;

/// How long the user gets to finish logging in through the browser.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} was not set in the environment nor on the command line")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Access key pair issued by the notebook service.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub access_password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_password", &"********")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub credentials: Credentials,
    /// Optional PEM certificate trusted in addition to the system roots.
    pub cert_path: Option<PathBuf>,
    pub callback_port: u16,
    pub login_timeout: Duration,
}

impl Config {
    pub fn new(api_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            credentials,
            cert_path: None,
            callback_port: DEFAULT_CALLBACK_PORT,
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
        }
    }

    /// Build the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source. Each
    /// variable is looked up by its uppercase name first, then lowercase.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| lookup(&name.to_ascii_lowercase()).filter(|v| !v.trim().is_empty()))
        };
        let get = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let mut config = Config::new(
            get("API_URL")?,
            Credentials {
                access_key_id: get("ACCESS_KEY_ID")?,
                access_password: get("ACCESS_PASSWORD")?,
            },
        );

        config.cert_path = var("SSL_CER").map(PathBuf::from);

        if let Some(port) = var("CALLBACK_PORT") {
            config.callback_port = port.parse().map_err(|_| ConfigError::Invalid {
                name: "CALLBACK_PORT",
                value: port,
            })?;
        }

        Ok(config)
    }

    /// Redirect target the login page sends the browser back to.
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.callback_port)
    }

    /// The certificate path, but only when the file is actually there.
    pub fn usable_cert_path(&self) -> Option<&PathBuf> {
        self.cert_path.as_ref().filter(|p| p.exists())
    }
}
