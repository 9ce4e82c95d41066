use std::collections::HashSet;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TableError;

/// A single spreadsheet cell.
///
/// Cells read from the remote sheet arrive as text; numeric values are only
/// produced by the transform stages (score columns).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Floating point number.
    Number(f64),
    /// Plain text, possibly empty.
    Text(String),
}

impl CellValue {
    /// Creates a text cell.
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    /// Coerces the cell to a finite number, if it holds one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(value) => Some(*value).filter(|value| value.is_finite()),
            CellValue::Text(value) => value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite()),
        }
    }

    /// Converts the cell into the JSON value sent to the spreadsheet API.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Number(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(format_number(*value))),
            CellValue::Text(value) => serde_json::Value::String(value.clone()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(value) => f.write_str(&format_number(*value)),
            CellValue::Text(value) => f.write_str(value),
        }
    }
}

/// Renders whole numbers without a trailing `.0` so that `60` round-trips as
/// `60` rather than `60.0`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// An in-memory table: a header of unique column names and rows that always
/// carry exactly one cell per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Table {
    /// Builds a table from a raw grid of cell text as returned by the remote
    /// API. The first row is the header; every other row is data.
    ///
    /// Short rows are padded with empty cells because the API trims trailing
    /// blanks. Rows wider than the header are rejected.
    pub fn from_grid(grid: Vec<Vec<String>>) -> Result<Self, TableError> {
        let mut grid = grid.into_iter();
        let header = grid.next().ok_or(TableError::Empty)?;
        let rows = grid
            .map(|row| row.into_iter().map(CellValue::Text).collect())
            .collect();
        Self::new(header, rows)
    }

    /// Builds a table from a header and rows, enforcing the shape invariant.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Self, TableError> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(TableError::DuplicateColumn(column.clone()));
            }
        }

        let width = columns.len();
        let mut padded = Vec::with_capacity(rows.len());
        for (index, mut row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(TableError::RaggedRow {
                    row: index + 1,
                    cells: row.len(),
                    columns: width,
                });
            }
            row.resize(width, CellValue::Text(String::new()));
            padded.push(row);
        }

        Ok(Self {
            columns,
            rows: padded,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// Number of data rows (the header is not counted).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Looks up a cell by data row index and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&CellValue> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|cells| cells.get(index))
    }

    /// Collects every value of a column in row order.
    pub fn column_values(&self, column: &str) -> Option<Vec<&CellValue>> {
        let index = self.column_index(column)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    /// Header row followed by data rows, ready to be sent to the remote API
    /// or written to a backup.
    pub fn to_grid(&self) -> Vec<Vec<CellValue>> {
        let mut grid = Vec::with_capacity(self.rows.len() + 1);
        grid.push(self.columns.iter().cloned().map(CellValue::Text).collect());
        grid.extend(self.rows.iter().cloned());
        grid
    }

    pub(crate) fn rows_mut(&mut self) -> &mut Vec<Vec<CellValue>> {
        &mut self.rows
    }

    /// Replaces the values of an existing column in place, or appends a new
    /// column at the end. `values` must hold one cell per row.
    pub(crate) fn set_column(&mut self, name: &str, values: Vec<CellValue>) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.column_index(name) {
            Some(index) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[index] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
    }

    /// Drops a column if present.
    pub(crate) fn remove_column(&mut self, name: &str) {
        if let Some(index) = self.column_index(name) {
            self.columns.remove(index);
            for row in &mut self.rows {
                row.remove(index);
            }
        }
    }
}

/// Column → weight mapping used for scoring.
///
/// Entries keep insertion order, which decides the order in which score
/// columns are appended. Inserting an existing column replaces its weight
/// without moving it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreWeights {
    entries: Vec<(String, f64)>,
}

impl ScoreWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, weight: f64) {
        let column = column.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = weight,
            None => self.entries.push((column, weight)),
        }
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, weight)| *weight)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries
            .iter()
            .map(|(column, weight)| (column.as_str(), *weight))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for ScoreWeights {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut weights = ScoreWeights::new();
        for (column, weight) in iter {
            weights.insert(column, weight);
        }
        weights
    }
}

impl Serialize for ScoreWeights {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (column, weight) in &self.entries {
            map.serialize_entry(column, weight)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ScoreWeights {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WeightsVisitor;

        impl<'de> Visitor<'de> for WeightsVisitor {
            type Value = ScoreWeights;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of column names to numeric weights")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut weights = ScoreWeights::new();
                while let Some((column, weight)) = access.next_entry::<String, f64>()? {
                    weights.insert(column, weight);
                }
                Ok(weights)
            }
        }

        deserializer.deserialize_map(WeightsVisitor)
    }
}

/// Everything a single run needs to know, collected once up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    /// Identifier of the remote spreadsheet.
    pub spreadsheet_id: String,
    /// Sheet (tab) name inside the spreadsheet.
    pub sheet_name: String,
    /// Range spec such as `A1:Z`.
    pub range: String,
    /// Column whose value identifies a row for duplicate removal.
    pub dedup_column: String,
    /// Sort columns in priority order.
    #[serde(default)]
    pub sort_columns: Vec<String>,
    /// Score weights in append order.
    #[serde(default)]
    pub weights: ScoreWeights,
}

impl RunParameters {
    /// The remote region this run reads from and writes back to.
    pub fn target(&self) -> SheetTarget<'_> {
        SheetTarget {
            spreadsheet_id: &self.spreadsheet_id,
            sheet_name: &self.sheet_name,
            range: &self.range,
        }
    }
}

/// Addresses a rectangular region of one sheet in a remote spreadsheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetTarget<'a> {
    pub spreadsheet_id: &'a str,
    pub sheet_name: &'a str,
    pub range: &'a str,
}

impl SheetTarget<'_> {
    /// The `{sheet}!{range}` address used by the remote API.
    pub fn a1(&self) -> String {
        format!("{}!{}", self.sheet_name, self.range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_numbers_render_without_fraction() {
        assert_eq!(format_number(60.0), "60");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(2.5), "2.5");
    }

    #[test]
    fn text_cells_coerce_when_numeric() {
        assert_eq!(CellValue::text(" 42 ").as_number(), Some(42.0));
        assert_eq!(CellValue::text("1e3").as_number(), Some(1000.0));
        assert_eq!(CellValue::text("").as_number(), None);
        assert_eq!(CellValue::text("NaN").as_number(), None);
        assert_eq!(CellValue::text("abc").as_number(), None);
    }

    #[test]
    fn weights_keep_document_order() {
        let weights: ScoreWeights =
            serde_json::from_str(r#"{"Revenue": 0.3, "Employees": 1, "Age": -2.5}"#)
                .expect("weights parsed");
        let order: Vec<&str> = weights.iter().map(|(column, _)| column).collect();
        assert_eq!(order, vec!["Revenue", "Employees", "Age"]);
        assert_eq!(weights.get("Employees"), Some(1.0));
    }

    #[test]
    fn reinserting_a_weight_keeps_its_position() {
        let mut weights = ScoreWeights::new();
        weights.insert("a", 1.0);
        weights.insert("b", 2.0);
        weights.insert("a", 3.0);
        let entries: Vec<(&str, f64)> = weights.iter().collect();
        assert_eq!(entries, vec![("a", 3.0), ("b", 2.0)]);
    }
}
