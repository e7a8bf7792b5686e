//! labflow library - re-exports for testing and external use.
//!
//! Client side of the lab's data workflow against the notebook service:
//! the signed browser login, notebook tree navigation, the behavior form
//! codec and the local directory mirror.

pub mod api;
pub mod auth;
pub mod behavior;
pub mod callback;
pub mod config;
pub mod context;
pub mod models;
pub mod redact;
pub mod structure;
pub mod xml;

// Re-export commonly used types
pub use api::{ApiError, LabClient};

pub use auth::{
    authenticate, authenticate_with, expires_now, generate_signature, verify_signature, AuthError,
};

pub use behavior::{
    decode, decode_entries, encode, export_form, BehaviorForm, ExportError, FormError, FormField,
    FormVersion, BEHAVIOR_FORM_ID,
};

pub use callback::{merge_callbacks, parse_callback, CallbackParams, CallbackServer};

pub use config::{Config, ConfigError, Credentials};

pub use context::{ContextError, SessionContext};

pub use models::{ExperimentTree, Notebook, Session, TreeNode, UserAccessInfo};

pub use redact::mask_sensitive_url;

pub use structure::{
    apply_plan, create_template, missing_locally, plan_experiment, DataKind, MakeMethod,
    MirrorError,
};
