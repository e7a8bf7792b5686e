//! Positional decoding of behavior form submissions, and the inverse.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::schema::{FormVersion, TableLayout, IDENTITY_COLUMN};
use super::FormError;

/// One serialized widget input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl FormField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Value::String(value.into()),
        }
    }

    /// The value as text: strings verbatim, null as empty, anything else as JSON.
    pub fn text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Labeled metadata values, in form order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormMetadata(Vec<(String, String)>);

impl FormMetadata {
    pub fn get(&self, label: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(l, v)| (l.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for FormMetadata {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for FormMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, value) in &self.0 {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    /// Subject input name from the template, e.g. `m12`.
    pub subject: String,
    /// Identity column value followed by the data values.
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormTable {
    /// `Mouse` followed by the header values the user typed in.
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl FormTable {
    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn row(&self, subject: &str) -> Option<&TableRow> {
        self.rows.iter().find(|r| r.subject == subject)
    }
}

/// A decoded behavior form submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BehaviorForm {
    pub version: FormVersion,
    pub metadata: FormMetadata,
    pub first_table: FormTable,
    pub second_table: FormTable,
    pub notes: String,
}

/// Check that `fields` carries exactly the input names of `version`, in order.
pub fn check_layout(fields: &[FormField], version: FormVersion) -> Result<(), FormError> {
    let expected = version.schema().field_names();
    let count = expected.len().max(fields.len());

    for position in 0..count {
        let want = expected.get(position);
        let got = fields.get(position).map(|f| &f.name);
        if want != got {
            return Err(FormError::SchemaMismatch {
                position,
                expected: want.cloned(),
                found: got.cloned(),
            });
        }
    }
    Ok(())
}

fn take<'a>(rest: &mut &'a [String], n: usize) -> &'a [String] {
    let (head, tail) = rest.split_at(n.min(rest.len()));
    *rest = tail;
    head
}

fn decode_table(layout: &TableLayout, rest: &mut &[String]) -> FormTable {
    let headers = take(rest, layout.headers.len());
    let cells = take(rest, layout.rows() * layout.width());

    let mut columns = Vec::with_capacity(layout.width());
    columns.push(IDENTITY_COLUMN.to_string());
    columns.extend(headers.iter().cloned());

    let rows = cells
        .chunks(layout.width())
        .zip(layout.subjects)
        .map(|(values, subject)| TableRow {
            subject: subject.to_string(),
            values: values.to_vec(),
        })
        .collect();

    FormTable { columns, rows }
}

/// Decode one submission. The input names must match the template of
/// `version` exactly before any value is read.
pub fn decode(fields: &[FormField], version: FormVersion) -> Result<BehaviorForm, FormError> {
    check_layout(fields, version)?;
    let schema = version.schema();

    let values: Vec<String> = fields.iter().map(FormField::text).collect();
    let mut rest = values.as_slice();

    let metadata = schema
        .metadata
        .iter()
        .zip(take(&mut rest, schema.metadata.len()))
        .map(|((_, label), value)| (label.to_string(), value.clone()))
        .collect();
    let first_table = decode_table(&schema.first, &mut rest);
    let second_table = decode_table(&schema.second, &mut rest);
    let notes = take(&mut rest, 1).first().cloned().unwrap_or_default();

    Ok(BehaviorForm {
        version,
        metadata,
        first_table,
        second_table,
        notes,
    })
}

fn encode_table(layout: &TableLayout, table: &FormTable, out: &mut Vec<String>) -> Result<(), String> {
    if table.columns.len() != layout.width() {
        return Err(format!(
            "table has {} columns, template expects {}",
            table.columns.len(),
            layout.width()
        ));
    }
    if table.rows.len() != layout.rows() {
        return Err(format!(
            "table has {} rows, template expects {}",
            table.rows.len(),
            layout.rows()
        ));
    }
    out.extend(table.columns[1..].iter().cloned());
    for row in &table.rows {
        if row.values.len() != layout.width() {
            return Err(format!("row {} has {} values", row.subject, row.values.len()));
        }
        out.extend(row.values.iter().cloned());
    }
    Ok(())
}

/// Flatten a decoded form back into the positional input list.
pub fn encode(form: &BehaviorForm) -> Result<Vec<FormField>, FormError> {
    let schema = form.version.schema();
    let mut values = Vec::with_capacity(schema.field_count());

    for (_, label) in schema.metadata {
        let value = form
            .metadata
            .get(label)
            .ok_or_else(|| FormError::Payload(format!("metadata is missing {}", label)))?;
        values.push(value.to_string());
    }
    encode_table(&schema.first, &form.first_table, &mut values).map_err(FormError::Payload)?;
    encode_table(&schema.second, &form.second_table, &mut values).map_err(FormError::Payload)?;
    values.push(form.notes.clone());

    Ok(schema
        .field_names()
        .iter()
        .zip(values)
        .map(|(name, value)| FormField::new(name.clone(), value))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A v4 submission whose values spell out their own position.
    fn v4_fields() -> Vec<FormField> {
        FormVersion::V4
            .schema()
            .field_names()
            .iter()
            .enumerate()
            .map(|(i, name)| match name.as_str() {
                "date_date" => FormField::new(name.clone(), "01/31/2025"),
                "notes" => FormField::new(name.clone(), "Mouse m3 escaped briefly."),
                _ => FormField::new(name.clone(), format!("v{}", i)),
            })
            .collect()
    }

    #[test]
    fn test_decode_v4_shapes_and_values() {
        let form = decode(&v4_fields(), FormVersion::V4).unwrap();

        assert_eq!(form.metadata.len(), 11);
        assert_eq!(form.metadata.get("Date"), Some("01/31/2025"));
        assert_eq!(form.metadata.get("Start Time"), Some("v1"));
        assert_eq!(form.metadata.get("Reward Information"), Some("v10"));

        assert_eq!(form.first_table.shape(), (12, 7));
        assert_eq!(form.second_table.shape(), (8, 7));

        assert_eq!(form.first_table.columns, vec!["Mouse", "v11", "v12", "v13", "v14", "v15", "v16"]);
        assert_eq!(form.first_table.rows[0].subject, "m1");
        assert_eq!(form.first_table.rows[0].values, vec!["v17", "v18", "v19", "v20", "v21", "v22", "v23"]);
        // Rows follow the template order, not numeric order
        assert_eq!(form.first_table.rows[9].subject, "m12");
        assert_eq!(form.first_table.row("m12").unwrap().values[0], format!("v{}", 17 + 9 * 7));

        assert_eq!(form.second_table.columns[1], "v101");
        assert_eq!(form.second_table.rows[7].subject, "m8");
        assert_eq!(form.second_table.rows[7].values[6], "v162");

        assert_eq!(form.notes, "Mouse m3 escaped briefly.");
    }

    #[test]
    fn test_decode_rejects_renamed_field() {
        let mut fields = v4_fields();
        fields[40].name = "zz".to_string();
        let err = decode(&fields, FormVersion::V4).unwrap_err();
        match err {
            FormError::SchemaMismatch { position, found, .. } => {
                assert_eq!(position, 40);
                assert_eq!(found.as_deref(), Some("zz"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_wrong_count() {
        let mut fields = v4_fields();
        fields.pop();
        assert!(matches!(
            decode(&fields, FormVersion::V4),
            Err(FormError::SchemaMismatch { position: 163, found: None, .. })
        ));

        let mut fields = v4_fields();
        fields.push(FormField::new("extra", ""));
        assert!(matches!(
            decode(&fields, FormVersion::V4),
            Err(FormError::SchemaMismatch { position: 164, expected: None, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_other_version_layout() {
        assert!(matches!(
            decode(&v4_fields(), FormVersion::V6),
            Err(FormError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_non_string_values() {
        let mut fields = v4_fields();
        fields[1].value = Value::Null;
        fields[2].value = serde_json::json!(3);
        let form = decode(&fields, FormVersion::V4).unwrap();
        assert_eq!(form.metadata.get("Start Time"), Some(""));
        assert_eq!(form.metadata.get("Personnel Running Task"), Some("3"));
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let fields: Vec<FormField> = FormVersion::V6
            .schema()
            .field_names()
            .iter()
            .enumerate()
            .map(|(i, n)| FormField::new(n.clone(), format!("x{}", i)))
            .collect();
        let form = decode(&fields, FormVersion::V6).unwrap();
        let encoded = encode(&form).unwrap();
        assert_eq!(encoded, fields);
        assert_eq!(decode(&encoded, FormVersion::V6).unwrap(), form);
    }

    #[test]
    fn test_encode_rejects_wrong_shape() {
        let mut form = decode(&v4_fields(), FormVersion::V4).unwrap();
        form.second_table.rows.pop();
        assert!(matches!(encode(&form), Err(FormError::Payload(_))));
    }

    #[test]
    fn test_metadata_serializes_in_form_order() {
        let form = decode(&v4_fields(), FormVersion::V4).unwrap();
        let json = serde_json::to_string(&form.metadata).unwrap();
        assert!(json.starts_with("{\"Date\":\"01/31/2025\",\"Start Time\""));
        assert!(json.ends_with("\"Reward Information\":\"v10\"}"));
    }
}
