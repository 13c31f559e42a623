//! Binary classification metrics.

use anyhow::Result;
use stagewise::evaluation::BinaryClassificationEvaluator;
use stagewise::*;

fn scored(rows: &[(Option<f64>, f64, f64)]) -> Result<Dataset> {
    let schema = Schema::new(vec![
        Field::new("label", DataType::Float64),
        Field::new("probability", DataType::Float64),
        Field::new("prediction", DataType::Float64),
    ])?;
    let rows = rows
        .iter()
        .map(|&(label, p, pred)| vec![Value::from(label), Value::Float(p), Value::Float(pred)])
        .collect();
    Ok(Dataset::from_rows(schema, rows)?)
}

#[test]
fn test_confusion_counts_and_ratios() -> Result<()> {
    let data = scored(&[
        (Some(1.0), 0.9, 1.0),
        (Some(1.0), 0.4, 0.0),
        (Some(0.0), 0.6, 1.0),
        (Some(0.0), 0.1, 0.0),
        (None, 0.5, 1.0),
    ])?;
    let m = BinaryClassificationEvaluator::default().evaluate(&data)?;
    assert_eq!(m.count, 4);
    assert_eq!(
        (m.true_positives, m.false_positives, m.true_negatives, m.false_negatives),
        (1, 1, 1, 1)
    );
    assert_eq!(m.accuracy, 0.5);
    assert_eq!(m.precision, 0.5);
    assert_eq!(m.recall, 0.5);
    // positives ranked 4 and 2 of 4: (6 - 3) / (2 * 2)
    assert_eq!(m.area_under_roc, 0.75);
    assert!(m.to_string().contains("auc=0.7500"));
    Ok(())
}

#[test]
fn test_empty_input_is_insufficient() -> Result<()> {
    let data = scored(&[])?;
    assert!(matches!(
        BinaryClassificationEvaluator::default().evaluate(&data),
        Err(Error::InsufficientData { .. })
    ));
    Ok(())
}

#[test]
fn test_single_class_is_insufficient() -> Result<()> {
    let data = scored(&[(Some(1.0), 0.9, 1.0), (Some(1.0), 0.2, 0.0)])?;
    assert!(matches!(
        BinaryClassificationEvaluator::default().evaluate(&data),
        Err(Error::InsufficientData { .. })
    ));
    Ok(())
}

#[test]
fn test_custom_columns_must_exist() -> Result<()> {
    let data = scored(&[(Some(1.0), 0.9, 1.0), (Some(0.0), 0.2, 0.0)])?;
    let evaluator = BinaryClassificationEvaluator::new("label", "score", "prediction");
    match evaluator.evaluate(&data) {
        Err(Error::SchemaMismatch { column, .. }) => assert_eq!(column, "score"),
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
    Ok(())
}
