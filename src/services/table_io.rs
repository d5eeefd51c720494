//! JSON reading and writing of tables and reports.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use kubelka::table::LongRecord;
use kubelka::{Concentrations, ReflectanceTable};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AppError, AppResult};

pub fn read_json<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let file = File::open(path).map_err(|e| AppError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| AppError::json(path, e))
}

/// Write `value` as pretty-printed JSON, replacing any existing file.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> AppResult<()> {
    let file = File::create(path).map_err(|e| AppError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| AppError::json(path, e))?;
    writer.write_all(b"\n").map_err(|e| AppError::io(path, e))?;
    writer.flush().map_err(|e| AppError::io(path, e))
}

/// Read a reflectance table, either as sample objects or as long-form
/// `(formula_code, background, wavelength, value)` records.
pub fn read_table(path: &Path) -> AppResult<ReflectanceTable> {
    let value: serde_json::Value = read_json(path)?;
    let is_long = value
        .as_array()
        .and_then(|rows| rows.first())
        .is_some_and(|row| row.get("wavelength").is_some());

    let table = if is_long {
        let records: Vec<LongRecord> = serde_json::from_value(value).map_err(|e| AppError::json(path, e))?;
        ReflectanceTable::from_long(&records)?
    } else {
        serde_json::from_value(value).map_err(|e| AppError::json(path, e))?
    };
    table.validate_grid()?;

    tracing::debug!(path = %path.display(), rows = table.len(), "Read reflectance table");
    Ok(table)
}

pub fn read_mixtures(path: &Path) -> AppResult<Vec<Concentrations>> {
    let mixtures: Vec<Concentrations> = read_json(path)?;
    if mixtures.is_empty() {
        return Err(AppError::MissingInput("mixtures"));
    }
    Ok(mixtures)
}
