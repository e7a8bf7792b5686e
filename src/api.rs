//! Client for the notebook service REST API.
//!
//! Every call is a GET on `{api_url}/api/{class}/{method}` with the query
//! parameters followed by `akid`, `expires` and `sig`. Answers are XML.

use reqwest::{Certificate, Client, ClientBuilder, StatusCode};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::{expires_now, generate_signature, USER_ACCESS_INFO};
use crate::config::Config;
use crate::models::{ExperimentTree, Notebook, Session, TreeNode, UserAccessInfo, ROOT_TREE_ID};
use crate::redact::mask_sensitive_url;
use crate::xml::{extract_all_xml_tags, extract_text, root_tag, strip_sections};

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("session is not authenticated")]
    NotAuthenticated,
}

pub struct LabClient {
    config: Config,
    http: Client,
    /// Certificate actually trusted on top of the system roots.
    extra_root: Option<PathBuf>,
}

fn client_builder() -> ClientBuilder {
    Client::builder().timeout(REQUEST_TIMEOUT)
}

fn client_with_root(path: &Path) -> Result<Client, String> {
    let pem = fs::read(path).map_err(|e| e.to_string())?;
    let cert = Certificate::from_pem(&pem).map_err(|e| e.to_string())?;
    client_builder()
        .add_root_certificate(cert)
        .build()
        .map_err(|e| e.to_string())
}

impl LabClient {
    /// Build a client. When the configured certificate exists and loads it
    /// is trusted as an extra root; otherwise the system roots alone are used.
    pub fn new(config: Config) -> Result<Self, ApiError> {
        let mut extra_root = None;
        let http = match config.usable_cert_path() {
            Some(path) => match client_with_root(path) {
                Ok(client) => {
                    info!("Using certificate {}", path.display());
                    extra_root = Some(path.clone());
                    client
                }
                Err(reason) => {
                    warn!("Ignoring certificate {}: {}", path.display(), reason);
                    client_builder().build()?
                }
            },
            None => {
                if let Some(path) = &config.cert_path {
                    debug!("Certificate {} not found, using default roots", path.display());
                }
                client_builder().build()?
            }
        };

        Ok(Self {
            config,
            http,
            extra_root,
        })
    }

    /// The certificate trusted in addition to the system roots, if any.
    pub fn extra_root(&self) -> Option<&Path> {
        self.extra_root.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ------------------------------------------------------------------------
    // URL construction
    // ------------------------------------------------------------------------

    fn signature_params(&self, signed: &str, expires: i64) -> String {
        let creds = &self.config.credentials;
        let sig = generate_signature(&creds.access_key_id, signed, expires, &creds.access_password);
        format!(
            "akid={}&expires={}&sig={}",
            urlencoding::encode(&creds.access_key_id),
            expires,
            urlencoding::encode(&sig)
        )
    }

    /// Signed URL for an API method. The signature covers the method name.
    pub fn signed_url(&self, class: &str, method: &str, params: &[(&str, &str)]) -> String {
        self.signed_url_at(class, method, params, expires_now())
    }

    pub fn signed_url_at(
        &self,
        class: &str,
        method: &str,
        params: &[(&str, &str)],
        expires: i64,
    ) -> String {
        let mut query: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        query.push(self.signature_params(method, expires));
        format!(
            "{}/api/{}/{}?{}",
            self.config.api_url,
            class,
            method,
            query.join("&")
        )
    }

    /// Browser login URL. Unlike API calls, the signature covers the
    /// redirect URI rather than a method name.
    pub fn login_url(&self, expires: i64) -> String {
        let redirect_uri = self.config.redirect_uri();
        let creds = &self.config.credentials;
        let sig = generate_signature(
            &creds.access_key_id,
            &redirect_uri,
            expires,
            &creds.access_password,
        );
        format!(
            "{}/api_user_login?akid={}&expires={}&redirect_uri={}&sig={}",
            self.config.api_url,
            urlencoding::encode(&creds.access_key_id),
            expires,
            urlencoding::encode(&redirect_uri),
            urlencoding::encode(&sig)
        )
    }

    // ------------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------------

    async fn fetch(&self, url: &str) -> Result<(StatusCode, String), ApiError> {
        debug!("GET {}", mask_sensitive_url(url));
        let response = self.http.get(url).send().await?;
        let status = response.status();
        Ok((status, response.text().await?))
    }

    async fn get_xml(&self, url: &str) -> Result<String, ApiError> {
        let (status, body) = self.fetch(url).await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    fn uid<'a>(&self, session: &'a Session) -> Result<&'a str, ApiError> {
        session.authenticated_uid().ok_or(ApiError::NotAuthenticated)
    }

    // ------------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------------

    /// Exchange a login email and authorization code for the user's id and
    /// notebook list. A rejected code comes back as an `<error>` document,
    /// often with a 4xx status; either way the body decides the outcome.
    pub async fn user_access_info(
        &self,
        email: &str,
        auth_code: &str,
    ) -> Result<UserAccessInfo, ApiError> {
        let url = self.signed_url(
            "users",
            USER_ACCESS_INFO,
            &[("login_or_email", email), ("password", auth_code)],
        );
        let (status, body) = self.fetch(&url).await?;
        if !status.is_success() {
            debug!("user_access_info answered {}", status);
        }
        parse_user_access_info(&body)
    }

    // ------------------------------------------------------------------------
    // Tree navigation
    // ------------------------------------------------------------------------

    /// Children of one tree node.
    pub async fn tree_level(
        &self,
        session: &Session,
        nbid: &str,
        parent_tree_id: &str,
    ) -> Result<Vec<TreeNode>, ApiError> {
        let uid = self.uid(session)?;
        let url = self.signed_url(
            "tree_tools",
            "get_tree_level",
            &[("uid", uid), ("nbid", nbid), ("parent_tree_id", parent_tree_id)],
        );
        let body = self.get_xml(&url).await?;
        parse_tree_level(&body)
    }

    /// Top-level folders of a notebook; each one is an experiment.
    pub async fn dir_nodes(&self, session: &Session, nbid: &str) -> Result<Vec<TreeNode>, ApiError> {
        let nodes = self.tree_level(session, nbid, ROOT_TREE_ID).await?;
        Ok(nodes.into_iter().filter(|n| !n.is_page).collect())
    }

    /// Every page below `parent`, breadth first.
    pub async fn page_nodes(
        &self,
        session: &Session,
        nbid: &str,
        parent_tree_id: &str,
    ) -> Result<Vec<TreeNode>, ApiError> {
        let mut pages = Vec::new();
        let mut pending = VecDeque::from([parent_tree_id.to_string()]);

        while let Some(tree_id) = pending.pop_front() {
            for node in self.tree_level(session, nbid, &tree_id).await? {
                if node.is_page {
                    pages.push(node);
                } else {
                    pending.push_back(node.tree_id);
                }
            }
        }
        Ok(pages)
    }

    /// Folder names one and two levels below an experiment node.
    pub async fn experiment_tree(
        &self,
        session: &Session,
        nbid: &str,
        experiment: &TreeNode,
    ) -> Result<ExperimentTree, ApiError> {
        let mut tree = ExperimentTree {
            name: experiment.display_text.clone(),
            folders: Vec::new(),
        };
        for category in self.tree_level(session, nbid, &experiment.tree_id).await? {
            if category.is_page {
                continue;
            }
            let children = self
                .tree_level(session, nbid, &category.tree_id)
                .await?
                .into_iter()
                .filter(|n| !n.is_page)
                .map(|n| n.display_text)
                .collect();
            tree.folders.push((category.display_text, children));
        }
        Ok(tree)
    }

    // ------------------------------------------------------------------------
    // Entries
    // ------------------------------------------------------------------------

    /// Raw XML of the entries on a page, entry data included.
    pub async fn entries_for_page(
        &self,
        session: &Session,
        nbid: &str,
        page_tree_id: &str,
    ) -> Result<String, ApiError> {
        let uid = self.uid(session)?;
        let url = self.signed_url(
            "tree_tools",
            "get_entries_for_page",
            &[
                ("uid", uid),
                ("nbid", nbid),
                ("page_tree_id", page_tree_id),
                ("entry_data", "true"),
            ],
        );
        self.get_xml(&url).await
    }
}

// ============================================================================
// Response Parsing
// ============================================================================

/// Parse a `user_access_info` document: root `users` with an `id` child.
pub fn parse_user_access_info(body: &str) -> Result<UserAccessInfo, ApiError> {
    match root_tag(body) {
        Some("users") => {}
        Some(other) => {
            return Err(ApiError::InvalidResponse(format!(
                "expected <users>, got <{}>",
                other
            )))
        }
        None => return Err(ApiError::InvalidResponse("response is not XML".to_string())),
    }

    // Notebooks carry their own <id>; look for the user's outside of them.
    let outer = strip_sections(body, "notebooks");
    let id = extract_text(&outer, "id")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::InvalidResponse("user_access_info did not contain an id".to_string()))?;

    let notebooks = extract_all_xml_tags(body, "notebook")
        .iter()
        .filter_map(|nb| {
            Some(Notebook {
                id: extract_text(nb, "id")?,
                name: extract_text(nb, "name")?,
            })
        })
        .collect();

    Ok(UserAccessInfo {
        id,
        email: extract_text(&outer, "email").filter(|e| !e.is_empty()),
        notebooks,
    })
}

/// Parse a `get_tree_level` document into its level nodes.
pub fn parse_tree_level(body: &str) -> Result<Vec<TreeNode>, ApiError> {
    if root_tag(body).is_none() {
        return Err(ApiError::InvalidResponse("response is not XML".to_string()));
    }
    Ok(extract_all_xml_tags(body, "level-node")
        .iter()
        .filter_map(|node| {
            Some(TreeNode {
                tree_id: extract_text(node, "tree-id")?,
                display_text: extract_text(node, "display-text")?,
                is_page: extract_text(node, "is-page").as_deref() == Some("true"),
            })
        })
        .collect())
}
