//! End-to-end behavior of the checks on materialized and planned tables.

mod common;

use arrow::array::{ArrayRef, Float64Array, TimestampSecondArray};
use arrow::datatypes::DataType;
use common::*;
use std::sync::Arc;
use term_contract::checks;
use term_contract::constraints::*;
use term_contract::core::{Check, ColumnSpec, TermContext, TermContextConfig};
use term_contract::formatters::{FormatterConfig, HumanFormatter, JsonFormatter, ViolationFormatter};
use term_contract::prelude::*;

#[tokio::test]
async fn monotonic_sequence_is_returned_unchanged() -> Result<()> {
    let input = table(vec![ints("a", &[1, 2, 3])]);
    let output = checks::is_monotonic(input.clone(), "a").await?;
    assert_eq!(output.as_materialized(), input.as_materialized());
    Ok(())
}

#[tokio::test]
async fn monotonic_break_reports_both_rows() {
    let v = expect_violation(table(vec![ints("a", &[1, 2, 1])]), &MonotonicConstraint::new("a")).await;
    assert_eq!(int_column(v.rows(), "a"), vec![Some(2), Some(1)]);
    assert_eq!(v.check(), "is_monotonic");
}

#[tokio::test]
async fn overlapping_pairs_are_reported_with_sorted_index() {
    let intervals = table(vec![
        ints("low", &[1, 2, 5, 6, 9]),
        ints("high", &[3, 4, 7, 8, 9]),
    ]);
    let v = expect_violation(intervals, &MutuallyExclusiveRangesConstraint::new("low", "high")).await;
    assert_eq!(int_column(v.rows(), "low"), vec![Some(1), Some(2), Some(5), Some(6)]);
    assert_eq!(int_column(v.rows(), "index"), vec![Some(0), Some(1), Some(2), Some(3)]);
}

#[tokio::test]
async fn removed_reference_keys_are_reported() {
    let reference = table(vec![strings("key", &["a", "b", "c"])]);
    let current = table(vec![strings("key", &["a"])]);
    let v = expect_violation(current, &MaintainsRelationshipsConstraint::new(reference, ["key"])).await;
    assert_eq!(
        string_column(v.rows(), "key"),
        vec![Some("b".to_string()), Some("c".to_string())]
    );
    assert!(v.message().contains("removed from"));
}

#[tokio::test]
async fn planned_tables_give_the_same_outcome() -> Result<()> {
    let columns = || vec![ints("a", &[1, 2, 1]), ints("b", &[1, 1, 2])];

    let lazy = expect_violation(planned(columns()), &MonotonicConstraint::new("a")).await;
    let eager = expect_violation(table(columns()), &MonotonicConstraint::new("a")).await;
    assert_eq!(lazy.rows(), eager.rows());
    assert_eq!(lazy.message(), eager.message());

    let lazy = expect_violation(planned(columns()), &UniqueConstraint::new("b")).await;
    let eager = expect_violation(table(columns()), &UniqueConstraint::new("b")).await;
    assert_eq!(lazy.rows(), eager.rows());

    let passed = checks::has_no_nulls(planned(columns()), ColumnSpec::All).await?;
    assert!(passed.is_planned());
    Ok(())
}

#[tokio::test]
async fn grouped_monotonic_restarts_per_group() -> Result<()> {
    let data = table(vec![
        strings("g", &["x", "x", "y", "y"]),
        ints("a", &[1, 2, 1, 2]),
    ]);
    data.clone()
        .check(&MonotonicConstraint::new("a").group_by("g"))
        .await?;
    let v = expect_violation(data, &MonotonicConstraint::new("a")).await;
    assert_eq!(int_column(v.rows(), "a"), vec![Some(2), Some(1)]);
    Ok(())
}

#[tokio::test]
async fn temporal_interval_mismatch() {
    let ts: ArrayRef = Arc::new(TimestampSecondArray::from(vec![0, 3600, 9000]));
    let data = table(vec![("ts", ts)]);
    data.clone()
        .check(&MonotonicConstraint::new("ts").interval("2h"))
        .await
        .unwrap_err();

    let v = expect_violation(data, &MonotonicConstraint::new("ts").interval("1h")).await;
    assert!(v.message().starts_with("Intervals differ from the specified"));
    assert_eq!(v.rows().num_rows(), 1);
    assert_eq!(v.rows().column_names(), vec!["ts", "previous_plus_interval"]);
}

#[tokio::test]
async fn outliers_only_show_impacted_columns() {
    let data = table(vec![
        ints("b", &[2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13]),
        ints("c", &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 5000]),
    ]);
    let v = expect_violation(
        data,
        &ColumnWithinStdConstraint::new().column(vec!["b", "c"], 2.0),
    )
    .await;
    assert_eq!(v.rows().column_names(), vec!["c"]);
    assert_eq!(int_column(v.rows(), "c"), vec![Some(5000)]);
}

#[tokio::test]
async fn supplemented_checks_chain() -> Result<()> {
    let score: ArrayRef = Arc::new(Float64Array::from(vec![0.5, 0.7, 0.9]));
    let data = table(vec![
        ints("id", &[1, 2, 3]),
        strings("status", &["new", "done", "new"]),
        ("score", score),
    ]);

    let data = data
        .check(&HasShapeConstraint::new(Some(3), Some(3)))
        .await?
        .check(&HasDtypesConstraint::new().column("score", DataType::Float64))
        .await?
        .check(&NoInfsConstraint::default())
        .await?
        .check(&AcceptedValuesConstraint::new().column("status", ["new", "done"]))
        .await?
        .check(&NotAcceptedValuesConstraint::new().column("status", ["deleted"]))
        .await?
        .check(&MandatoryValuesConstraint::new().column("status", ["new"]))
        .await?
        .check(&AcceptedRangeConstraint::new().column("score", 0.0, 1.0))
        .await?
        .check(&NotNullProportionConstraint::new().at_least(ColumnSpec::All, 1.0))
        .await?
        .check(&AtLeastOneConstraint::default())
        .await?
        .check(&UniqueCombinationConstraint::new(vec!["id", "status"]))
        .await?
        .check(&NotConstantConstraint::new("status"))
        .await?
        .check(&CustomSqlConstraint::new("score > id * 0.1"))
        .await?;
    assert_eq!(data.schema().fields().len(), 3);
    Ok(())
}

#[tokio::test]
async fn usage_errors_are_not_check_failures() {
    let data = table(vec![ints("a", &[1, 2])]);
    let cases: Vec<Box<dyn Constraint>> = vec![
        Box::new(MonotonicConstraint::new("missing")),
        Box::new(MonotonicConstraint::new("a").group_by("missing")),
        Box::new(HasShapeConstraint::new(None, None)),
        Box::new(MutuallyExclusiveRangesConstraint::new("a", "nope")),
        Box::new(CustomSqlConstraint::new("a > 0; DROP TABLE data")),
        Box::new(ColumnWithinStdConstraint::new().column("a", f64::NAN)),
    ];
    for constraint in cases {
        let err = data.clone().check(constraint.as_ref()).await.unwrap_err();
        assert!(err.is_usage_error(), "{} returned {err}", constraint.name());
        assert!(err.violation().is_none());
    }
}

#[tokio::test]
async fn report_cap_keeps_total_count() -> Result<()> {
    let ctx = TermContext::with_config(TermContextConfig::default().with_max_report_rows(2))?;
    let data = table(vec![ints("a", &[5, 4, 3, 2, 1])]);
    let err = data
        .check_in(&ctx, &MonotonicConstraint::new("a"))
        .await
        .unwrap_err();
    let v = err.into_violation().unwrap();
    assert_eq!(v.rows().num_rows(), 2);
    assert_eq!(v.total_rows(), 5);
    assert!(v.is_truncated());
    Ok(())
}

#[tokio::test]
async fn warning_check_reports_and_formats() -> Result<()> {
    let data = table(vec![ints("a", &[1, 1, 2]), ints("b", &[3, 2, 1])]);
    let check = Check::builder("soft")
        .level(Level::Warning)
        .unique("a")
        .is_monotonic("b")
        .build();

    let report = check.report(&data).await?;
    assert_eq!(report.violations.len(), 2);

    let text = HumanFormatter::with_config(FormatterConfig::ci()).format_report(&report)?;
    assert!(text.contains("[WARN] soft: 2 of 2 constraints failed"));
    let json = JsonFormatter::new().format_report(&report)?;
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["violations"][0]["check"], "unique");
    assert_eq!(value["violations"][1]["check"], "is_monotonic");

    let output = check.run(data.clone()).await?;
    assert_eq!(output.as_materialized(), data.as_materialized());
    Ok(())
}
