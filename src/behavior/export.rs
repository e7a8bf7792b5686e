//! Writing decoded forms to disk.
//!
//! Each form gets its own directory named after its Date field, holding
//! `metadata.json`, `notes.txt`, `first_table.csv` and `second_table.csv`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use super::codec::{BehaviorForm, FormTable};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("form has no Date to name its directory after")]
    MissingDate,

    #[error("{0} already exists")]
    Exists(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Directory name for a form: its Date with slashes turned into underscores.
pub fn form_dir_name(form: &BehaviorForm) -> Result<String, ExportError> {
    let date = form.metadata.get("Date").map(str::trim).unwrap_or("");
    if date.is_empty() {
        return Err(ExportError::MissingDate);
    }
    Ok(date.replace(['/', '\\'], "_"))
}

fn write_table(path: &Path, table: &FormTable) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(&row.values)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write one form under `root`. Refuses to touch an existing directory.
pub fn export_form(root: &Path, form: &BehaviorForm) -> Result<PathBuf, ExportError> {
    let dir = root.join(form_dir_name(form)?);
    match fs::create_dir(&dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(ExportError::Exists(dir)),
        Err(e) => return Err(e.into()),
    }

    fs::write(
        dir.join("metadata.json"),
        serde_json::to_string_pretty(&form.metadata)?,
    )?;
    fs::write(dir.join("notes.txt"), &form.notes)?;
    write_table(&dir.join("first_table.csv"), &form.first_table)?;
    write_table(&dir.join("second_table.csv"), &form.second_table)?;

    info!("Wrote behavior form to {}", dir.display());
    Ok(dir)
}
