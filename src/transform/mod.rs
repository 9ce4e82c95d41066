//! Table transform stages.
//!
//! Each stage mutates a [`Table`] in place and leaves it untouched when it
//! returns an error. Tables without data rows pass through every stage
//! unchanged.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use crate::error::TransformError;
use crate::model::{CellValue, RunParameters, ScoreWeights, Table};

/// Suffix appended to a weighted column's name to form its score column.
pub const SCORE_SUFFIX: &str = "_score";
/// Name of the column holding the sum of all score columns.
pub const TOTAL_SCORE_COLUMN: &str = "total_score";

/// Removes rows sharing a value in `key`, keeping the last occurrence of each.
/// Surviving rows stay in their original relative order.
pub fn deduplicate(table: &mut Table, key: &str) -> Result<(), TransformError> {
    if table.is_empty() {
        return Ok(());
    }
    let index = require_column(table, "deduplicate", key)?;

    let mut last_seen: HashMap<String, usize> = HashMap::new();
    for (position, row) in table.rows().iter().enumerate() {
        last_seen.insert(row[index].to_string(), position);
    }

    let before = table.len();
    let mut position = 0;
    table.rows_mut().retain(|row| {
        let keep = last_seen.get(&row[index].to_string()) == Some(&position);
        position += 1;
        keep
    });
    debug!(key, removed = before - table.len(), "deduplicated rows");
    Ok(())
}

/// Stable ascending sort by `columns` in priority order.
///
/// A column compares numerically when every one of its cells coerces to a
/// number and lexicographically otherwise.
pub fn sort_rows(table: &mut Table, columns: &[String]) -> Result<(), TransformError> {
    if table.is_empty() || columns.is_empty() {
        return Ok(());
    }

    let mut indices = Vec::with_capacity(columns.len());
    for column in columns {
        indices.push(require_column(table, "sort", column)?);
    }

    let numeric: Vec<bool> = indices
        .iter()
        .map(|&index| {
            table
                .rows()
                .iter()
                .all(|row| row[index].as_number().is_some())
        })
        .collect();

    let rows = std::mem::take(table.rows_mut());
    let mut keyed: Vec<(Vec<SortKey>, Vec<CellValue>)> = rows
        .into_iter()
        .map(|row| {
            let keys = indices
                .iter()
                .zip(&numeric)
                .map(|(&index, &is_numeric)| SortKey::for_cell(&row[index], is_numeric))
                .collect();
            (keys, row)
        })
        .collect();

    keyed.sort_by(|(lhs, _), (rhs, _)| {
        lhs.iter()
            .zip(rhs)
            .map(|(lhs, rhs)| lhs.compare(rhs))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });

    *table.rows_mut() = keyed.into_iter().map(|(_, row)| row).collect();
    debug!(?columns, ?numeric, "sorted rows");
    Ok(())
}

/// Appends a `{column}_score` column per weight, holding the cell value times
/// the weight, then a trailing `total_score` column summing them.
///
/// Every weighted column and every cell is validated before the table is
/// touched. A weight on `total` is rejected since its score column would be
/// `total_score` itself. A score column that already exists (from an earlier run) is
/// overwritten in place; `total_score` is always moved to the end.
pub fn score(table: &mut Table, weights: &ScoreWeights) -> Result<(), TransformError> {
    let mut indices = Vec::with_capacity(weights.len());
    for (column, weight) in weights.iter() {
        if format!("{column}{SCORE_SUFFIX}") == TOTAL_SCORE_COLUMN {
            return Err(TransformError::ReservedColumn {
                column: column.to_string(),
                reserved: TOTAL_SCORE_COLUMN,
            });
        }
        indices.push((column, weight, require_column(table, "score", column)?));
    }
    if table.is_empty() {
        return Ok(());
    }

    let mut scored: Vec<(String, Vec<f64>)> = Vec::with_capacity(indices.len());
    for (column, weight, index) in indices {
        let mut values = Vec::with_capacity(table.len());
        for (position, row) in table.rows().iter().enumerate() {
            let value =
                row[index]
                    .as_number()
                    .ok_or_else(|| TransformError::NonNumericValue {
                        column: column.to_string(),
                        row: position + 1,
                        value: row[index].to_string(),
                    })?;
            values.push(value * weight);
        }
        scored.push((format!("{column}{SCORE_SUFFIX}"), values));
    }

    let totals: Vec<f64> = (0..table.len())
        .map(|position| scored.iter().map(|(_, values)| values[position]).sum())
        .collect();

    table.remove_column(TOTAL_SCORE_COLUMN);
    for (name, values) in scored {
        table.set_column(&name, values.into_iter().map(CellValue::Number).collect());
    }
    table.set_column(
        TOTAL_SCORE_COLUMN,
        totals.into_iter().map(CellValue::Number).collect(),
    );
    debug!(weights = weights.len(), "scored rows");
    Ok(())
}

/// The three stages wired in their fixed order: dedupe, sort, score.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline<'a> {
    pub dedup_column: &'a str,
    pub sort_columns: &'a [String],
    pub weights: &'a ScoreWeights,
}

impl<'a> Pipeline<'a> {
    pub fn from_params(params: &'a RunParameters) -> Self {
        Self {
            dedup_column: &params.dedup_column,
            sort_columns: &params.sort_columns,
            weights: &params.weights,
        }
    }

    pub fn run(&self, table: &mut Table) -> Result<(), TransformError> {
        deduplicate(table, self.dedup_column)?;
        sort_rows(table, self.sort_columns)?;
        score(table, self.weights)
    }
}

fn require_column(
    table: &Table,
    stage: &'static str,
    column: &str,
) -> Result<usize, TransformError> {
    table
        .column_index(column)
        .ok_or_else(|| TransformError::UnknownColumn {
            stage,
            column: column.to_string(),
        })
}

enum SortKey {
    Number(f64),
    Text(String),
}

impl SortKey {
    fn for_cell(cell: &CellValue, numeric: bool) -> Self {
        match cell.as_number() {
            Some(value) if numeric => SortKey::Number(value),
            _ => SortKey::Text(cell.to_string()),
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Number(lhs), SortKey::Number(rhs)) => lhs.total_cmp(rhs),
            (SortKey::Text(lhs), SortKey::Text(rhs)) => lhs.cmp(rhs),
            (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
            (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
        }
    }
}
