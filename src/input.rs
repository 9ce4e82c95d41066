//! Collection of [`RunParameters`] from a human at a terminal or from a
//! parameter file.

use std::fs;
use std::io::{self, BufRead, StdinLock, Stdout, Write};
use std::path::Path;

use tracing::debug;

use crate::error::InputError;
use crate::model::{RunParameters, ScoreWeights};

/// Anything able to produce the parameters for one run.
pub trait ParameterSource {
    fn collect(&mut self) -> Result<RunParameters, InputError>;
}

/// Parameters fixed ahead of time, typically loaded from a JSON file.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    params: RunParameters,
}

impl ConfigSource {
    pub fn new(params: RunParameters) -> Self {
        Self { params }
    }

    /// Loads parameters from a JSON document. The order of `weights` in the
    /// document is kept.
    pub fn from_path(path: &Path) -> Result<Self, InputError> {
        let source = fs::read_to_string(path)?;
        let params: RunParameters = serde_json::from_str(&source)
            .map_err(|err| InputError::Config(format!("{}: {err}", path.display())))?;
        for (column, weight) in params.weights.iter() {
            if !weight.is_finite() {
                return Err(InputError::InvalidWeight {
                    column: column.to_string(),
                    value: weight.to_string(),
                });
            }
        }
        Ok(Self { params })
    }
}

impl ParameterSource for ConfigSource {
    fn collect(&mut self) -> Result<RunParameters, InputError> {
        Ok(self.params.clone())
    }
}

/// Asks for each parameter in turn on a line-based terminal.
#[derive(Debug)]
pub struct PromptSource<R, W> {
    input: R,
    output: W,
}

impl PromptSource<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> PromptSource<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Prints `label` and reads one trimmed line; `None` at end of input.
    fn prompt(&mut self, label: &str) -> Result<Option<String>, InputError> {
        write!(self.output, "{label}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn required(&mut self, label: &str, field: &'static str) -> Result<String, InputError> {
        self.prompt(label)?.ok_or(InputError::UnexpectedEof(field))
    }

    /// Column/weight pairs read until an empty column name (or end of input).
    pub fn weight_prompts(&mut self) -> WeightPrompts<'_, R, W> {
        WeightPrompts {
            source: self,
            finished: false,
        }
    }
}

impl<R: BufRead, W: Write> ParameterSource for PromptSource<R, W> {
    fn collect(&mut self) -> Result<RunParameters, InputError> {
        let spreadsheet_id = self.required("Enter your Google Sheet ID: ", "spreadsheet id")?;
        let sheet_name = self.required("Enter the sheet name: ", "sheet name")?;
        let range = self.required("Enter the range (e.g., A1:Z): ", "range")?;
        let dedup_column = self.required(
            "Enter the column name for removing duplicates: ",
            "dedup column",
        )?;
        let sort_columns = split_columns(&self.required(
            "Enter column names for sorting (comma-separated): ",
            "sort columns",
        )?);
        let weights = self.weight_prompts().collect::<Result<ScoreWeights, _>>()?;
        debug!(weights = weights.len(), "parameters collected");

        Ok(RunParameters {
            spreadsheet_id,
            sheet_name,
            range,
            dedup_column,
            sort_columns,
            weights,
        })
    }
}

/// Iterator over `(column, weight)` answers, terminated by an empty column
/// name. It stops after the first error.
pub struct WeightPrompts<'a, R, W> {
    source: &'a mut PromptSource<R, W>,
    finished: bool,
}

impl<R: BufRead, W: Write> Iterator for WeightPrompts<'_, R, W> {
    type Item = Result<(String, f64), InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = self.next_pair();
        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }
}

impl<R: BufRead, W: Write> WeightPrompts<'_, R, W> {
    fn next_pair(&mut self) -> Option<Result<(String, f64), InputError>> {
        let column = match self
            .source
            .prompt("Enter a column name for score calculation (or press Enter to finish): ")
        {
            Ok(Some(column)) if !column.is_empty() => column,
            Ok(_) => return None,
            Err(err) => return Some(Err(err)),
        };
        let label = format!("Enter the weight for {column}: ");
        let raw = match self.source.required(&label, "weight") {
            Ok(raw) => raw,
            Err(err) => return Some(Err(err)),
        };
        match parse_weight(&raw) {
            Some(weight) => Some(Ok((column, weight))),
            None => Some(Err(InputError::InvalidWeight { column, value: raw })),
        }
    }
}

fn parse_weight(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|weight| weight.is_finite())
}

/// Splits a comma-separated column list, dropping blank entries.
pub fn split_columns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|column| !column.is_empty())
        .map(str::to_string)
        .collect()
}
