//! Behavior form widget: layout, codec, entry extraction and export.

pub mod codec;
pub mod export;
pub mod payload;
pub mod schema;

use thiserror::Error;

pub use codec::{decode, encode, BehaviorForm, FormField, FormMetadata, FormTable, TableRow};
pub use export::{export_form, ExportError};
pub use payload::{decode_entries, parse_entry_data, FormEntry};
pub use schema::{FormSchema, FormVersion, BEHAVIOR_FORM_ID};

#[derive(Debug, Error)]
pub enum FormError {
    /// The input names differ from the template. Template drift means the
    /// vendor changed the widget, so the entry is skipped rather than guessed at.
    #[error("form field {position}: expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        position: usize,
        expected: Option<String>,
        found: Option<String>,
    },

    #[error("unsupported form: {0}")]
    UnsupportedSchema(String),

    #[error("no entries found on page")]
    EmptyResult,

    #[error("malformed form payload: {0}")]
    Payload(String),

    #[error("malformed form JSON: {0}")]
    Json(#[from] serde_json::Error),
}
