//! Declarative layout of the behavior form widget.
//!
//! The widget serializes its inputs as an ordered list of `{name, value}`
//! pairs with no stable key per field, so a field's meaning comes from its
//! position alone. Each known template version is described here once: the
//! metadata fields, two tables (header inputs, then one subject input plus
//! the data cells per row) and a trailing notes field.
//!
//! The input names are the vendor's, oddities included: v4 orders the first
//! table's headers `p6, p1..p5`, v6 names one of them `p65-a` and drops the
//! `-a` suffix partway through the first table, and both versions name the
//! first cell of the second table's seventh row `f7`.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Form id of the behavior widget in the notebook service.
pub const BEHAVIOR_FORM_ID: i64 = 20058;

/// Name of the trailing free-text input.
pub const NOTES_FIELD: &str = "notes";

/// Label of the identity column prepended to each decoded table.
pub const IDENTITY_COLUMN: &str = "Mouse";

/// Metadata input names and their labels, in form order.
pub const METADATA_FIELDS: &[(&str, &str)] = &[
    ("date_date", "Date"),
    ("start", "Start Time"),
    ("personnel", "Personnel Running Task"),
    ("room", "Behavior Room"),
    ("experiment", "Experiment"),
    ("subjects", "Subjects"),
    ("manipulation", "Manipulation"),
    ("video_file_path", "Video File Path"),
    ("protocol", "AnyMaze Protocol"),
    ("cue", "Cue Information"),
    ("reward", "Reward Information"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormVersion {
    V4,
    V6,
}

impl FormVersion {
    pub fn from_number(n: i64) -> Option<Self> {
        match n {
            4 => Some(FormVersion::V4),
            6 => Some(FormVersion::V6),
            _ => None,
        }
    }

    pub fn number(self) -> i64 {
        match self {
            FormVersion::V4 => 4,
            FormVersion::V6 => 6,
        }
    }

    pub fn schema(self) -> &'static FormSchema {
        match self {
            FormVersion::V4 => &SCHEMA_V4,
            FormVersion::V6 => &SCHEMA_V6,
        }
    }
}

/// How the data cells of a table are named.
///
/// A cell at `(row, col)` is named `{letter}{col + 1}` where `letter` is
/// `a` for the first row, `b` for the second and so on, followed by
/// `suffix` for every cell up to and including `suffix_through` (all cells
/// when `None`). `overrides` replace individual names outright.
#[derive(Debug, Clone, Copy)]
pub struct CellNaming {
    pub suffix: &'static str,
    pub suffix_through: Option<(usize, usize)>,
    pub overrides: &'static [((usize, usize), &'static str)],
}

#[derive(Debug, Clone, Copy)]
pub struct TableLayout {
    pub headers: &'static [&'static str],
    /// Subject input names, in the order the rows appear in the form.
    pub subjects: &'static [&'static str],
    pub data_columns: usize,
    pub cells: CellNaming,
}

impl TableLayout {
    pub fn rows(&self) -> usize {
        self.subjects.len()
    }

    /// Values per row: the identity column plus the data columns.
    pub fn width(&self) -> usize {
        self.data_columns + 1
    }

    pub fn field_count(&self) -> usize {
        self.headers.len() + self.rows() * self.width()
    }

    pub fn cell_name(&self, row: usize, col: usize) -> String {
        if let Some((_, name)) = self.cells.overrides.iter().find(|(at, _)| *at == (row, col)) {
            return name.to_string();
        }
        let letter = (b'a' + row as u8) as char;
        let suffixed = match self.cells.suffix_through {
            Some(last) => (row, col) <= last,
            None => true,
        };
        if suffixed {
            format!("{}{}{}", letter, col + 1, self.cells.suffix)
        } else {
            format!("{}{}", letter, col + 1)
        }
    }

    fn push_field_names(&self, out: &mut Vec<String>) {
        out.extend(self.headers.iter().map(|h| h.to_string()));
        for (row, subject) in self.subjects.iter().enumerate() {
            out.push(subject.to_string());
            for col in 0..self.data_columns {
                out.push(self.cell_name(row, col));
            }
        }
    }
}

/// Complete positional layout of one template version.
pub struct FormSchema {
    pub version: FormVersion,
    pub metadata: &'static [(&'static str, &'static str)],
    pub first: TableLayout,
    pub second: TableLayout,
    names: OnceLock<Vec<String>>,
}

impl FormSchema {
    /// The exact input-name sequence a submission of this version carries.
    /// The layout is validated the first time this is called.
    pub fn field_names(&self) -> &[String] {
        self.names.get_or_init(|| {
            if let Err(e) = self.validate() {
                panic!("behavior form v{} layout is inconsistent: {}", self.version.number(), e);
            }
            self.build_names()
        })
    }

    fn build_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.field_count());
        names.extend(self.metadata.iter().map(|(name, _)| name.to_string()));
        self.first.push_field_names(&mut names);
        self.second.push_field_names(&mut names);
        names.push(NOTES_FIELD.to_string());
        names
    }

    pub fn field_count(&self) -> usize {
        self.metadata.len() + self.first.field_count() + self.second.field_count() + 1
    }

    /// Internal consistency of the layout: header count matches the data
    /// columns, every row has a cell letter and overrides stay in range.
    /// Input names are not unique across the two tables.
    pub fn validate(&self) -> Result<(), String> {
        for (label, table) in [("first", &self.first), ("second", &self.second)] {
            if table.headers.len() != table.data_columns {
                return Err(format!(
                    "{} table has {} headers for {} data columns",
                    label,
                    table.headers.len(),
                    table.data_columns
                ));
            }
            if table.rows() > 26 {
                return Err(format!("{} table has more rows than cell letters", label));
            }
            if let Some(((row, col), _)) = table
                .cells
                .overrides
                .iter()
                .find(|((row, col), _)| *row >= table.rows() || *col >= table.data_columns)
            {
                return Err(format!("{} table override at ({}, {}) is out of range", label, row, col));
            }
        }
        if self.build_names().len() != self.field_count() {
            return Err("field count does not match layout".to_string());
        }
        Ok(())
    }
}

const SECOND_TABLE: TableLayout = TableLayout {
    headers: &["p1", "p2", "p3", "p4", "p5", "p6"],
    subjects: &["m1", "m2", "m3", "m4", "m5", "m6", "m7", "m8"],
    data_columns: 6,
    cells: CellNaming {
        suffix: "",
        suffix_through: None,
        overrides: &[((6, 0), "f7")],
    },
};

static SCHEMA_V4: FormSchema = FormSchema {
    version: FormVersion::V4,
    metadata: METADATA_FIELDS,
    first: TableLayout {
        headers: &["p6", "p1", "p2", "p3", "p4", "p5"],
        subjects: &[
            "m1", "m2", "m3", "m4", "m5", "m6", "m7", "m8", "m9", "m12", "m10", "m11",
        ],
        data_columns: 6,
        cells: CellNaming {
            suffix: "",
            suffix_through: None,
            overrides: &[],
        },
    },
    second: SECOND_TABLE,
    names: OnceLock::new(),
};

static SCHEMA_V6: FormSchema = FormSchema {
    version: FormVersion::V6,
    metadata: METADATA_FIELDS,
    first: TableLayout {
        headers: &["p65-a", "p1-a", "p2-a", "p3-a", "p4-a", "p5-a"],
        subjects: &[
            "m1-a", "m2-a", "m3-a", "m4-a", "m5-a", "m6-a", "m7-a", "m8-a", "m9", "m12", "m10",
            "m11",
        ],
        data_columns: 6,
        cells: CellNaming {
            suffix: "-a",
            // i1-a is the last suffixed cell
            suffix_through: Some((8, 0)),
            overrides: &[],
        },
    },
    second: SECOND_TABLE,
    names: OnceLock::new(),
};
