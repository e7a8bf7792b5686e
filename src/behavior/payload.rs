//! Extraction of behavior form submissions from page entries.
//!
//! A `get_entries_for_page` answer holds one `<entry-data>` per entry. For
//! widget entries that text is a JSON object with `form_id`, `form_version`
//! and `form_data`, the last being a JSON-encoded list of submissions, each a
//! list of `{name, value}` inputs.

use serde::Deserialize;
use tracing::debug;

use super::codec::{decode, BehaviorForm, FormField};
use super::schema::{FormVersion, BEHAVIOR_FORM_ID};
use super::FormError;
use crate::xml::{extract_all_xml_tags, extract_xml_tag, unescape};

#[derive(Debug, Deserialize)]
struct EntryPayload {
    form_id: i64,
    form_version: i64,
    form_data: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FormData {
    Submissions(Vec<Vec<FormField>>),
    Single(Vec<FormField>),
}

/// A behavior widget entry, not yet decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct FormEntry {
    pub form_id: i64,
    pub version: FormVersion,
    pub submissions: Vec<Vec<FormField>>,
}

impl FormEntry {
    /// Decode each submission on its own; one bad submission does not
    /// affect the others.
    pub fn decode(&self) -> Vec<Result<BehaviorForm, FormError>> {
        self.submissions
            .iter()
            .map(|fields| decode(fields, self.version))
            .collect()
    }
}

/// Parse the text of one `<entry-data>` element.
pub fn parse_entry_data(text: &str) -> Result<FormEntry, FormError> {
    // Some entries wrap their JSON across raw newlines
    let payload: EntryPayload = match serde_json::from_str(text) {
        Ok(p) => p,
        Err(_) => serde_json::from_str(&text.replace('\n', ""))?,
    };

    if payload.form_id != BEHAVIOR_FORM_ID {
        return Err(FormError::UnsupportedSchema(format!(
            "form id {} is not the behavior form ({})",
            payload.form_id, BEHAVIOR_FORM_ID
        )));
    }
    let version = FormVersion::from_number(payload.form_version).ok_or_else(|| {
        FormError::UnsupportedSchema(format!("form version {} is not known", payload.form_version))
    })?;

    let submissions = match serde_json::from_str::<FormData>(&payload.form_data)? {
        FormData::Submissions(s) => s,
        FormData::Single(fields) => vec![fields],
    };

    Ok(FormEntry {
        form_id: payload.form_id,
        version,
        submissions,
    })
}

/// Every `<entry-data>` text inside the `<entries>` element of a page.
pub fn entry_data_texts(xml: &str) -> Result<Vec<String>, FormError> {
    let reported_empty = extract_xml_tag(xml, "results")
        .and_then(|results| extract_xml_tag(&results, "total-returned"))
        .map(|total| total.trim() == "0")
        .unwrap_or(false);
    if reported_empty {
        return Err(FormError::EmptyResult);
    }

    // <entry-data> also appears outside <entries>, so search only inside it
    let entries = extract_xml_tag(xml, "entries")
        .ok_or_else(|| FormError::Payload("no entries found in response".to_string()))?;

    Ok(extract_all_xml_tags(&entries, "entry-data")
        .iter()
        .map(|t| unescape(t.trim()))
        .filter(|t| !t.is_empty())
        .collect())
}

/// Decode every behavior form on a page. The outer error covers the page as
/// a whole; each inner result covers one submission, so a malformed entry
/// never hides its neighbours.
pub fn decode_entries(xml: &str) -> Result<Vec<Result<BehaviorForm, FormError>>, FormError> {
    let mut results = Vec::new();
    for (i, text) in entry_data_texts(xml)?.iter().enumerate() {
        match parse_entry_data(text) {
            Ok(entry) => {
                debug!(
                    "entry {}: behavior form v{} with {} submission(s)",
                    i,
                    entry.version.number(),
                    entry.submissions.len()
                );
                results.extend(entry.decode());
            }
            Err(e) => results.push(Err(e)),
        }
    }
    Ok(results)
}
