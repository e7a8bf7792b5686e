//! Loopback listener that catches the login redirect.
//!
//! The notebook service sends the browser back to
//! `http://localhost:<port>/callback?auth_code=..&email=..`. The listener
//! records the full path of every GET it receives and answers with a short
//! page telling the user to return to the terminal.

use axum::{extract::State, http::Uri, response::Html, routing::get, Router};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::form_urlencoded;

/// Interval between checks of the capture queue.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on waiting for open connections to drain at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const COMPLETE_PAGE: &str = r#"<html>
    <body style="text-align: center; font-family: Arial, sans-serif; padding-top: 50px;">
        <h2>Authentication Complete!</h2>
        <p>You can close this window and return to the application.</p>
    </body>
</html>"#;

type Captures = Arc<Mutex<Vec<String>>>;

/// A running callback listener. Call [`CallbackServer::shutdown`] to stop it;
/// dropping it aborts the background tasks.
///
/// The redirect URI names `localhost`, which browsers may resolve to either
/// loopback address, so the port is served on `127.0.0.1` and, where
/// available, on `::1`.
pub struct CallbackServer {
    addrs: Vec<SocketAddr>,
    captures: Captures,
    shutdown_tx: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind the loopback port and start serving in the background.
    pub async fn start(port: u16) -> std::io::Result<Self> {
        let primary = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await?;
        let port = primary.local_addr()?.port();
        let mut listeners = vec![primary];
        match TcpListener::bind((Ipv6Addr::LOCALHOST, port)).await {
            Ok(listener) => listeners.push(listener),
            Err(e) => debug!("No IPv6 loopback listener on port {}: {}", port, e),
        }

        let captures: Captures = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/", get(record_callback))
            .route("/{*path}", get(record_callback))
            .with_state(captures.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut addrs = Vec::with_capacity(listeners.len());
        let mut tasks = Vec::with_capacity(listeners.len());
        for listener in listeners {
            addrs.push(listener.local_addr()?);
            let app = app.clone();
            let mut stop = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                    let _ = stop.changed().await;
                });
                if let Err(e) = server.await {
                    warn!("Callback listener error: {}", e);
                }
            }));
        }

        debug!("Callback listener bound to {:?}", addrs);

        Ok(Self {
            addrs,
            captures,
            shutdown_tx: Some(shutdown_tx),
            tasks,
        })
    }

    /// The IPv4 loopback address being served.
    pub fn local_addr(&self) -> SocketAddr {
        self.addrs[0]
    }

    /// Every address being served.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// Snapshot of every path captured so far.
    pub fn captures(&self) -> Vec<String> {
        self.captures
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Wait until at least one redirect has been captured, or give up after
    /// `timeout`. Returns every capture seen at that point.
    pub async fn wait_for_callback(&self, timeout: Duration) -> Option<Vec<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            let captured = self.captures();
            if !captured.is_empty() {
                return Some(captured);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Stop accepting connections and join the background tasks.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        for mut task in self.tasks.drain(..) {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("Callback listener did not drain in time, aborting");
                task.abort();
                let _ = task.await;
            }
        }
        debug!("Callback listener on port {} stopped", self.addrs[0].port());
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn record_callback(State(captures): State<Captures>, uri: Uri) -> Html<&'static str> {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    if let Ok(mut c) = captures.lock() {
        c.push(path);
    }
    Html(COMPLETE_PAGE)
}

/// Credentials carried by a login redirect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallbackParams {
    pub auth_code: Option<String>,
    pub email: Option<String>,
}

/// Parse the query string of one captured path.
pub fn parse_callback(path: &str) -> CallbackParams {
    let query = match path.split_once('?') {
        Some((_, q)) => q.split('#').next().unwrap_or(""),
        None => return CallbackParams::default(),
    };

    let mut params = CallbackParams::default();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            "auth_code" if params.auth_code.is_none() => params.auth_code = Some(value.into_owned()),
            "email" if params.email.is_none() => params.email = Some(value.into_owned()),
            _ => {}
        }
    }
    params
}

/// Merge several captures: the first non-empty `auth_code` and the first
/// non-empty `email` win, even when they come from different requests.
pub fn merge_callbacks<S: AsRef<str>>(paths: &[S]) -> CallbackParams {
    paths.iter().map(|p| parse_callback(p.as_ref())).fold(
        CallbackParams::default(),
        |acc, next| CallbackParams {
            auth_code: acc.auth_code.or(next.auth_code),
            email: acc.email.or(next.email),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_callback() {
        let params = parse_callback("/callback?auth_code=ABC123&email=user@x.com");
        assert_eq!(params.auth_code.as_deref(), Some("ABC123"));
        assert_eq!(params.email.as_deref(), Some("user@x.com"));
    }

    #[test]
    fn test_parse_callback_percent_encoded() {
        let params = parse_callback("/callback?email=user%40x.com&auth_code=a%2Bb");
        assert_eq!(params.email.as_deref(), Some("user@x.com"));
        assert_eq!(params.auth_code.as_deref(), Some("a+b"));
    }

    #[test]
    fn test_parse_callback_without_query() {
        assert_eq!(parse_callback("/favicon.ico"), CallbackParams::default());
    }

    #[test]
    fn test_merge_takes_first_present_values() {
        let paths = [
            "/favicon.ico",
            "/callback?email=first@x.com",
            "/callback?auth_code=CODE&email=second@x.com",
        ];
        let merged = merge_callbacks(&paths);
        assert_eq!(merged.auth_code.as_deref(), Some("CODE"));
        assert_eq!(merged.email.as_deref(), Some("first@x.com"));
    }

    #[tokio::test]
    async fn test_listener_records_and_times_out() {
        let server = CallbackServer::start(0).await.unwrap();
        assert!(server.wait_for_callback(Duration::from_millis(150)).await.is_none());

        let url = format!("http://{}/callback?auth_code=X&email=y%40z.org", server.local_addr());
        let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert!(body.contains("Authentication Complete"));

        let captured = server.wait_for_callback(Duration::from_secs(1)).await.unwrap();
        assert_eq!(captured, vec!["/callback?auth_code=X&email=y%40z.org".to_string()]);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_listener_serves_every_loopback_address() {
        let server = CallbackServer::start(0).await.unwrap();
        assert!(server.local_addr().ip().is_loopback());
        assert!(server.local_addr().is_ipv4());

        for addr in server.local_addrs() {
            assert_eq!(addr.port(), server.local_addr().port());
            let url = format!("http://{}/callback?auth_code=X", addr);
            reqwest::get(&url).await.unwrap();
        }
        assert_eq!(server.captures().len(), server.local_addrs().len());
        server.shutdown().await;
    }
}
