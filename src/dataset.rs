//! Labeled telemetry dataset, partitioned by vehicle, for stream replay.
//!
//! Columns are typed as a whole: a column is integer only when every
//! non-empty cell is an integer and none is empty, otherwise float when every
//! non-empty cell is numeric, then boolean, then text.

use anyhow::{bail, Context, Result};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// One typed cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Float narrowed to single precision to shrink payloads
    Float32(f32),
    Text(String),
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Null => serializer.serialize_unit(),
            Cell::Bool(b) => serializer.serialize_bool(*b),
            Cell::Int(i) => serializer.serialize_i64(*i),
            Cell::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Cell::Float32(f) if f.is_finite() => serializer.serialize_f32(*f),
            Cell::Float(_) | Cell::Float32(_) => serializer.serialize_unit(),
            Cell::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl Cell {
    fn as_key(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Bool(b) => Some(b.to_string()),
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) => Some(f.to_string()),
            Cell::Float32(f) => Some(f.to_string()),
            Cell::Text(s) => Some(s.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

fn column_kind<'a>(cells: impl Iterator<Item = &'a str> + Clone) -> ColumnKind {
    let mut present = cells.clone().filter(|c| !c.is_empty()).peekable();
    if present.peek().is_none() {
        return ColumnKind::Float;
    }
    let has_empty = cells.clone().any(str::is_empty);
    let mut present = cells.filter(|c| !c.is_empty());

    if !has_empty && present.clone().all(|c| c.parse::<i64>().is_ok()) {
        ColumnKind::Int
    } else if present.clone().all(|c| c.parse::<f64>().is_ok()) {
        ColumnKind::Float
    } else if present.all(|c| parse_bool(c).is_some()) {
        ColumnKind::Bool
    } else {
        ColumnKind::Text
    }
}

fn to_cell(raw: &str, kind: ColumnKind, narrow_floats: bool) -> Cell {
    if raw.is_empty() {
        return Cell::Null;
    }
    match kind {
        ColumnKind::Int => raw.parse().map(Cell::Int).unwrap_or(Cell::Null),
        ColumnKind::Float => match raw.parse::<f64>() {
            Ok(v) if narrow_floats => Cell::Float32(v as f32),
            Ok(v) => Cell::Float(v),
            Err(_) => Cell::Null,
        },
        ColumnKind::Bool => parse_bool(raw).map(Cell::Bool).unwrap_or(Cell::Null),
        ColumnKind::Text => Cell::Text(raw.to_string()),
    }
}

/// One source row, cells in column order
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    cells: Vec<Cell>,
}

impl DatasetRow {
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }
}

/// All rows of one vehicle, in file order
#[derive(Debug, Clone)]
pub struct VehicleGroup {
    pub vehicle_id: String,
    pub rows: Vec<DatasetRow>,
}

/// Rows grouped by vehicle identity.
///
/// Group order is fixed at load time: numeric id order when the id column is
/// integer-typed, lexical order otherwise.
#[derive(Debug, Clone)]
pub struct VehicleDataset {
    columns: Vec<String>,
    groups: Vec<VehicleGroup>,
}

struct RowPayload<'a> {
    columns: &'a [String],
    row: &'a DatasetRow,
}

impl Serialize for RowPayload<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, cell) in self.columns.iter().zip(&self.row.cells) {
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

impl VehicleDataset {
    /// Load a CSV file; a missing file is an error, not an empty dataset
    pub fn load<P: AsRef<Path>>(path: P, id_column: &str, narrow_floats: bool) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            bail!("Dataset not found at {}", path.display());
        }
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open dataset {}", path.display()))?;
        let dataset = Self::from_reader(file, id_column, narrow_floats)
            .with_context(|| format!("Failed to read dataset {}", path.display()))?;

        info!(
            path = %path.display(),
            rows = dataset.row_count(),
            vehicles = dataset.vehicle_count(),
            "Dataset loaded"
        );
        Ok(dataset)
    }

    pub fn from_reader<R: Read>(reader: R, id_column: &str, narrow_floats: bool) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let id_index = columns
            .iter()
            .position(|c| c == id_column)
            .with_context(|| format!("Dataset has no `{}` column", id_column))?;

        let mut raw_rows: Vec<csv::StringRecord> = Vec::new();
        for record in reader.records() {
            raw_rows.push(record?);
        }
        if raw_rows.is_empty() {
            bail!("Dataset has no rows");
        }

        let kinds: Vec<ColumnKind> = (0..columns.len())
            .map(|i| column_kind(raw_rows.iter().map(move |r| r.get(i).unwrap_or(""))))
            .collect();
        let numeric_ids = kinds[id_index] == ColumnKind::Int;

        let mut by_id: BTreeMap<GroupKey, VehicleGroup> = BTreeMap::new();
        let mut dropped = 0usize;
        for raw in &raw_rows {
            let cells: Vec<Cell> = kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| {
                    // Float ids stay exact; narrowing would merge vehicles.
                    let narrow = narrow_floats && i != id_index;
                    to_cell(raw.get(i).unwrap_or(""), *kind, narrow)
                })
                .collect();

            let Some(vehicle_id) = cells[id_index].as_key() else {
                dropped += 1;
                continue;
            };
            let key = match (&cells[id_index], numeric_ids) {
                (Cell::Int(i), true) => GroupKey::Numeric(*i),
                _ => GroupKey::Text(vehicle_id.clone()),
            };
            by_id
                .entry(key)
                .or_insert_with(|| VehicleGroup {
                    vehicle_id,
                    rows: Vec::new(),
                })
                .rows
                .push(DatasetRow { cells });
        }

        if dropped > 0 {
            warn!(rows = dropped, column = %id_column, "Rows without a vehicle id skipped");
        }
        if by_id.is_empty() {
            bail!("Dataset has no rows with a `{}` value", id_column);
        }

        Ok(Self {
            columns,
            groups: by_id.into_values().collect(),
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn groups(&self) -> &[VehicleGroup] {
        &self.groups
    }

    pub fn vehicle_count(&self) -> usize {
        self.groups.len()
    }

    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|g| g.rows.len()).sum()
    }

    /// Serialize a row as a flat JSON object, every column included
    pub fn payload(&self, row: &DatasetRow) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&RowPayload {
            columns: &self.columns,
            row,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum GroupKey {
    Numeric(i64),
    Text(String),
}
