use std::fs;

use sheet_sync::error::InputError;
use sheet_sync::input::{ConfigSource, ParameterSource, PromptSource};
use tempfile::tempdir;

#[test]
fn prompts_collect_every_field_in_order() {
    let answers = "abc123\nCompanies\nA1:Z\nName\nCity, Name\nRevenue\n0.3\nEmployees\n-1\n\n";
    let mut source = PromptSource::new(answers.as_bytes(), Vec::new());

    let params = source.collect().expect("parameters");

    assert_eq!(params.spreadsheet_id, "abc123");
    assert_eq!(params.sheet_name, "Companies");
    assert_eq!(params.range, "A1:Z");
    assert_eq!(params.dedup_column, "Name");
    assert_eq!(params.sort_columns, vec!["City", "Name"]);
    let weights: Vec<(&str, f64)> = params.weights.iter().collect();
    assert_eq!(weights, vec![("Revenue", 0.3), ("Employees", -1.0)]);
    assert_eq!(params.target().a1(), "Companies!A1:Z");

    let transcript = String::from_utf8(source.into_output()).expect("utf-8 prompts");
    assert!(transcript.starts_with("Enter your Google Sheet ID: Enter the sheet name: "));
    assert!(transcript.contains("Enter the weight for Employees: "));
    assert!(transcript.ends_with("(or press Enter to finish): "));
}

#[test]
fn end_of_input_ends_the_weight_loop() {
    let answers = "abc\nSheet1\nA1:C\nId\n\nScore\n1.5\n";
    let mut source = PromptSource::new(answers.as_bytes(), Vec::new());

    let params = source.collect().expect("parameters");
    assert!(params.sort_columns.is_empty());
    assert_eq!(params.weights.get("Score"), Some(1.5));
}

#[test]
fn malformed_weight_aborts_collection() {
    let answers = "abc\nSheet1\nA1:C\nId\nId\nScore\nlots\nOther\n1\n\n";
    let mut source = PromptSource::new(answers.as_bytes(), Vec::new());

    let err = source.collect().expect_err("invalid weight");
    assert!(matches!(
        err,
        InputError::InvalidWeight { ref column, ref value } if column == "Score" && value == "lots"
    ));
}

#[test]
fn truncated_input_reports_missing_field() {
    let mut source = PromptSource::new("abc\nSheet1\n".as_bytes(), Vec::new());
    let err = source.collect().expect_err("truncated");
    assert!(matches!(err, InputError::UnexpectedEof("range")));

    let mut source = PromptSource::new("abc\nS\nA1\nId\nId\nScore\n".as_bytes(), Vec::new());
    let err = source.collect().expect_err("truncated weight");
    assert!(matches!(err, InputError::UnexpectedEof("weight")));
}

#[test]
fn parameter_file_preserves_weight_order() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("params.json");
    fs::write(
        &path,
        r#"{
            "spreadsheet_id": "abc",
            "sheet_name": "Companies",
            "range": "A1:Z",
            "dedup_column": "Name",
            "sort_columns": ["Name"],
            "weights": {"Revenue": 0.3, "Employees": 0.5, "Age": 0.2}
        }"#,
    )
    .expect("params written");

    let params = ConfigSource::from_path(&path)
        .expect("params loaded")
        .collect()
        .expect("params collected");
    let order: Vec<&str> = params.weights.iter().map(|(column, _)| column).collect();
    assert_eq!(order, vec!["Revenue", "Employees", "Age"]);
}

#[test]
fn parameter_file_with_bad_weight_is_rejected() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("params.json");
    fs::write(
        &path,
        r#"{"spreadsheet_id": "a", "sheet_name": "b", "range": "A1:B", "dedup_column": "c", "weights": {"x": "heavy"}}"#,
    )
    .expect("params written");

    assert!(matches!(
        ConfigSource::from_path(&path),
        Err(InputError::Config(_))
    ));
}
