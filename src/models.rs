//! Data models shared across the client.
//!
//! Sessions, notebooks and the nodes of a notebook's folder tree. Form
//! types live next to their codec in `behavior`.

use serde::{Deserialize, Serialize};

// ============================================================================
// Session
// ============================================================================

/// Result of a login handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub is_authenticated: bool,
    pub user_id: Option<String>,
    pub email: Option<String>,
    /// Notebooks reported by the identity lookup.
    pub notebooks: Vec<Notebook>,
}

impl Session {
    /// The user id, but only once the session is authenticated.
    pub fn authenticated_uid(&self) -> Option<&str> {
        if self.is_authenticated {
            self.user_id.as_deref()
        } else {
            None
        }
    }
}

// ============================================================================
// Notebook Service Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    pub id: String,
    pub name: String,
}

/// Parsed `user_access_info` answer.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAccessInfo {
    pub id: String,
    pub email: Option<String>,
    pub notebooks: Vec<Notebook>,
}

/// A node in a notebook's folder tree: either a folder or a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub tree_id: String,
    pub display_text: String,
    pub is_page: bool,
}

/// Root of every notebook's tree.
pub const ROOT_TREE_ID: &str = "0";

/// Folder layout below an experiment node, one level per category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentTree {
    pub name: String,
    /// Category folder name → names of its child folders.
    pub folders: Vec<(String, Vec<String>)>,
}
