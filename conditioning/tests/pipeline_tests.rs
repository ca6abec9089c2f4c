//! End-to-end tests of `Sample::prep_data`

use approx::assert_relative_eq;
use lame_conditioning::{ConditioningConfig, PrepError, PrepScope, Sample};
use lame_table::{
    AttributeKey, AttributeTable, AttributeValue, FieldType, NegativeMethod, Norm, RoundDirection, TableError,
    round_outward,
};

const N: usize = 60;

/// Two compositional domains along X with noise, a spike and a pixel of bad data
fn create_test_sample(config: ConditioningConfig) -> Sample {
    let xc: Vec<f64> = (0..N).map(|i| (i % 10) as f64).collect();
    let yc: Vec<f64> = (0..N).map(|i| (i / 10) as f64).collect();
    let si: Vec<f64> = (0..N)
        .map(|i| {
            let base = if i < N / 2 { 100.0 } else { 5000.0 };
            base + (i % 7) as f64 * 3.0
        })
        .collect();
    let mut ca: Vec<f64> = (0..N)
        .map(|i| {
            let base = if i < N / 2 { 20.0 } else { 900.0 };
            base + (i % 5) as f64
        })
        .collect();
    let mut sr: Vec<f64> = (0..N).map(|i| 1.0 + (i % 4) as f64).collect();
    sr[2] = -0.5;
    sr[7] = 0.0;
    sr[40] = 250.0;
    // Row 11 has no valid predictors and stays unlabelled
    ca[11] = f64::NAN;
    sr[11] = -3.0;

    let raw = AttributeTable::from_columns(vec![
        ("Xc".to_string(), xc),
        ("Yc".to_string(), yc),
        ("Si29".to_string(), si),
        ("Ca44".to_string(), ca),
        ("Sr88".to_string(), sr),
    ])
    .expect("Failed to build raw table");

    let mut sample = Sample::new("test", raw, config).expect("Failed to build sample");
    sample
        .set_attribute(&["Si29", "Ca44", "Sr88"], AttributeKey::Use, true)
        .unwrap();
    sample
}

#[test]
fn test_prep_requires_clusters() {
    let mut sample = create_test_sample(ConditioningConfig::default());
    let result = sample.prep_data(&PrepScope::All);
    assert!(matches!(result, Err(PrepError::NotInitialized(_))));
}

#[test]
fn test_full_prep_leaves_raw_untouched() {
    let mut sample = create_test_sample(ConditioningConfig::default());
    let raw_before: Vec<Vec<f64>> = sample
        .raw()
        .columns()
        .iter()
        .map(|c| sample.raw().values(c).unwrap())
        .collect();

    sample.compute_clusters().unwrap();
    let report = sample.prep_data(&PrepScope::All).unwrap();
    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(report.processed, vec!["Si29", "Ca44", "Sr88"]);

    for (column, before) in sample.raw().columns().iter().zip(raw_before) {
        let after = sample.raw().values(column).unwrap();
        let same = after
            .iter()
            .zip(&before)
            .all(|(a, b)| (a.is_nan() && b.is_nan()) || a == b);
        assert!(same, "raw column {column} changed");
    }
}

#[test]
fn test_full_prep_conditions_values() {
    let config = ConditioningConfig {
        compositional: false,
        ..Default::default()
    };
    let mut sample = create_test_sample(config);
    sample.compute_clusters().unwrap();
    assert_eq!(sample.clusters().unwrap().k, 2);
    sample.prep_data(&PrepScope::All).unwrap();

    let sr = sample.processed().values("Sr88").unwrap();
    // `ignore` turns non-positive values into NaN
    assert!(sr[2].is_nan());
    assert!(sr[7].is_nan());
    // The spike is clipped back to the top of its cluster
    assert_eq!(sr[40], 4.0);
    // Unlabelled rows are left exactly as they were
    assert_eq!(sr[11], -3.0);
    // Coordinates are never conditioned
    assert_eq!(
        sample.processed().values("Xc").unwrap(),
        sample.raw().values("Xc").unwrap()
    );
}

#[test]
fn test_global_negative_method_written_to_processed_only() {
    let config = ConditioningConfig {
        negative_method: NegativeMethod::MinimumPositive,
        ..Default::default()
    };
    let mut sample = create_test_sample(config);
    sample
        .set_attribute(&["Si29"], AttributeKey::NegativeMethod, "gradual_shift")
        .unwrap();
    let raw_before = sample.raw().clone();
    sample.compute_clusters().unwrap();
    sample.prep_data(&PrepScope::All).unwrap();

    let processed = sample.processed();
    assert_eq!(
        processed.attributes("Sr88").unwrap().negative_method,
        NegativeMethod::MinimumPositive
    );
    assert_eq!(
        processed.attributes("Si29").unwrap().negative_method,
        NegativeMethod::MinimumPositive
    );
    // Coordinates are not eligible and keep the column default
    assert_eq!(
        processed.attributes("Xc").unwrap().negative_method,
        NegativeMethod::Ignore
    );

    // Raw metadata keeps what the caller set
    for column in raw_before.columns() {
        assert_eq!(
            sample.raw().attributes(&column).unwrap().negative_method,
            raw_before.attributes(&column).unwrap().negative_method
        );
    }
    assert_eq!(
        sample.raw().attributes("Si29").unwrap().negative_method,
        NegativeMethod::GradualShift
    );
    let sr = sample.processed().values("Sr88").unwrap();
    // Negatives take the cluster minimum, then the compositional floor keeps zeros positive
    assert!(sr[2] > 0.0);
    assert!(sr[7] > 0.0);
    assert_eq!(sr[11], -3.0);
}

#[test]
fn test_flat_clip_without_auto_scale() {
    let config = ConditioningConfig {
        negative_method: NegativeMethod::MinimumPositive,
        ..Default::default()
    };
    let raw = AttributeTable::from_columns(vec![(
        "Sr88".to_string(),
        vec![-5.0, 0.0, 1.0, 2.0, 3.0, 1_000_000.0, 2_000_000.0],
    )])
    .unwrap();
    let mut sample = Sample::new("flat", raw, config).unwrap();
    sample.set_attribute(&["Sr88"], AttributeKey::Use, true).unwrap();
    sample.set_attribute(&["Sr88"], AttributeKey::AutoScale, false).unwrap();
    sample.set_attribute(&["Sr88"], AttributeKey::LowerBound, 0.0).unwrap();
    sample.set_attribute(&["Sr88"], AttributeKey::UpperBound, 100.0).unwrap();
    sample.compute_clusters().unwrap();
    sample.prep_data(&PrepScope::All).unwrap();

    assert_eq!(
        sample.processed().values("Sr88").unwrap(),
        vec![1.0, 0.0, 1.0, 2.0, 3.0, 1_000_000.0, 2_000_000.0]
    );
}

#[test]
fn test_failing_column_is_reported_and_left_alone() {
    let mut sample = create_test_sample(ConditioningConfig::default());
    sample
        .set_attribute(&["Ca44"], AttributeKey::OutlierMethod, "log_inflection")
        .unwrap();
    sample.compute_clusters().unwrap();
    let report = sample.prep_data(&PrepScope::All).unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].column, "Ca44");
    assert_eq!(report.processed, vec!["Si29", "Sr88"]);

    let ca_raw = sample.raw().values("Ca44").unwrap();
    let ca = sample.processed().values("Ca44").unwrap();
    assert!(ca.iter().zip(&ca_raw).all(|(a, b)| (a.is_nan() && b.is_nan()) || a == b));
}

#[test]
fn test_failing_field_keeps_previous_processed_values() {
    let mut sample = create_test_sample(ConditioningConfig::default());
    sample.compute_clusters().unwrap();
    sample.prep_data(&PrepScope::All).unwrap();
    let sr_before = sample.processed().values("Sr88").unwrap();
    // `ignore` already turned the raw negative into NaN
    assert!(sr_before[2].is_nan());

    sample
        .set_attribute(&["Sr88"], AttributeKey::OutlierMethod, "log_inflection")
        .unwrap();
    let report = sample
        .prep_data(&PrepScope::Field("Sr88".to_string()))
        .unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].column, "Sr88");
    assert!(report.processed.is_empty());

    let sr = sample.processed().values("Sr88").unwrap();
    assert!(sr[2].is_nan());
    assert!(
        sr.iter()
            .zip(&sr_before)
            .all(|(a, b)| (a.is_nan() && b.is_nan()) || a == b)
    );
}

#[test]
fn test_two_row_cluster_keeps_order() {
    let raw = AttributeTable::from_columns(vec![
        ("Xc".to_string(), vec![0.0, 1.0]),
        ("Yc".to_string(), vec![0.0, 0.0]),
        ("Sr88".to_string(), vec![5.0, 800.0]),
    ])
    .unwrap();
    let config = ConditioningConfig {
        max_clusters: 1,
        ..Default::default()
    };
    let mut sample = Sample::new("pair", raw, config).unwrap();
    sample
        .set_attribute(&["Sr88"], AttributeKey::Use, true)
        .unwrap();
    sample.compute_clusters().unwrap();
    assert_eq!(sample.clusters().unwrap().k, 1);

    let report = sample.prep_data(&PrepScope::All).unwrap();
    assert!(report.is_success());
    assert_eq!(sample.processed().values("Sr88").unwrap(), vec![5.0, 800.0]);
}

#[test]
fn test_field_scope_only_touches_that_column() {
    let mut sample = create_test_sample(ConditioningConfig::default());
    sample.compute_clusters().unwrap();
    sample.prep_data(&PrepScope::All).unwrap();
    let si_before = sample.processed().values("Si29").unwrap();

    sample
        .set_attribute(&["Sr88"], AttributeKey::NegativeMethod, "minimum_positive")
        .unwrap();
    let report = sample
        .prep_data(&PrepScope::Field("Sr88".to_string()))
        .unwrap();
    assert_eq!(report.processed, vec!["Sr88"]);

    assert_eq!(sample.processed().values("Si29").unwrap(), si_before);
    let sr = sample.processed().values("Sr88").unwrap();
    // Reconditioned from raw values, so the negative is now replaced
    assert!(sr[2] > 0.0);

    let result = sample.prep_data(&PrepScope::Field("Mg24".to_string()));
    assert!(matches!(
        result,
        Err(PrepError::Table(TableError::UnknownColumn(_)))
    ));
}

#[test]
fn test_use_change_marks_clusters_stale() {
    let mut sample = create_test_sample(ConditioningConfig::default());
    sample.compute_clusters().unwrap();
    let labels = sample.clusters().unwrap().labels.clone();
    assert!(!sample.clusters_stale());

    sample.set_attribute(&["Ca44"], AttributeKey::Use, false).unwrap();
    assert!(sample.clusters_stale());
    assert_eq!(sample.clusters().unwrap().labels, labels);
    assert!(!sample.raw().attributes("Ca44").unwrap().used);

    // Stale labels are still usable
    assert!(sample.prep_data(&PrepScope::All).is_ok());

    sample.compute_clusters().unwrap();
    assert!(!sample.clusters_stale());
    assert_eq!(sample.clusters().unwrap().predictors, vec!["Si29", "Sr88"]);
}

#[test]
fn test_derived_ratio_recomputed_after_prep() {
    let mut sample = create_test_sample(ConditioningConfig::default());
    sample.compute_clusters().unwrap();
    let name = sample.add_ratio("Sr88", "Ca44").unwrap();
    assert_eq!(name, "Sr88 / Ca44");
    assert!(matches!(
        sample.add_ratio("Sr88", "Ca44"),
        Err(PrepError::Table(TableError::DuplicateColumn(_)))
    ));
    // A name with spaces would not parse back as a ratio
    assert!(matches!(
        sample.add_ratio("Sr 88", "Ca44"),
        Err(PrepError::Table(TableError::InvalidRatioSpec(_)))
    ));
    assert_eq!(sample.derived_ratios().len(), 1);
    sample.set_attribute(&[name.as_str()], AttributeKey::Norm, "log").unwrap();

    let report = sample.prep_data(&PrepScope::All).unwrap();
    assert_eq!(report.ratios, vec![name.clone()]);

    let processed = sample.processed();
    assert!(!sample.raw().contains(&name));
    assert_eq!(processed.attributes(&name).unwrap().data_type, FieldType::Ratio);
    assert_eq!(processed.attributes(&name).unwrap().norm, Norm::Log);

    let ratio = processed.values(&name).unwrap();
    let sr = processed.values("Sr88").unwrap();
    let ca = processed.values("Ca44").unwrap();
    for i in 0..N {
        if sr[i].is_finite() && ca[i].is_finite() && ca[i] > 0.0 {
            assert_relative_eq!(ratio[i], sr[i] / ca[i]);
        } else {
            assert!(ratio[i].is_nan());
        }
    }

    // A field update refreshes ratios built on that field
    let report = sample
        .prep_data(&PrepScope::Field("Ca44".to_string()))
        .unwrap();
    assert_eq!(report.ratios, vec![name]);
}

#[test]
fn test_plot_metadata_refreshed() {
    let mut sample = create_test_sample(ConditioningConfig::default());
    sample.compute_clusters().unwrap();
    sample.prep_data(&PrepScope::All).unwrap();

    let processed = sample.processed();
    let sr = processed.values("Sr88").unwrap();
    let (min, max) = lame_table::finite_range(&sr).unwrap();
    let attrs = processed.attributes("Sr88").unwrap();
    assert_eq!(attrs.plot_min, round_outward(min, 2, RoundDirection::Down));
    assert_eq!(attrs.plot_max, round_outward(max, 2, RoundDirection::Up));
    assert_eq!(attrs.label, "⁸⁸Sr");

    let xc = processed.attributes("Xc").unwrap();
    assert_eq!(xc.plot_max, 9.0);
}

#[test]
fn test_map_data_reads_processed_values() {
    let mut sample = create_test_sample(ConditioningConfig::default());
    sample.compute_clusters().unwrap();
    sample.prep_data(&PrepScope::All).unwrap();

    let map = sample
        .get_map_data("Si29", FieldType::Analyte, Norm::Linear)
        .unwrap();
    assert_eq!(map.height(), N);
    let array: Vec<f64> = map
        .column("array")
        .unwrap()
        .as_materialized_series()
        .f64()
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    assert_eq!(array, sample.processed().values("Si29").unwrap());
}

#[test]
fn test_added_column_survives_full_prep() {
    let mut sample = create_test_sample(ConditioningConfig::default());
    sample.compute_clusters().unwrap();
    sample
        .add_column("density", vec![2.7; N], FieldType::Computed, None)
        .unwrap();
    sample.prep_data(&PrepScope::All).unwrap();
    assert_eq!(sample.processed().values("density").unwrap(), vec![2.7; N]);

    sample.delete_column("density").unwrap();
    assert!(!sample.processed().contains("density"));
    assert!(!sample.raw().contains("density"));
    assert!(matches!(
        sample.delete_column("density"),
        Err(PrepError::Table(TableError::UnknownColumn(_)))
    ));
}

#[test]
fn test_match_attributes_on_sample() {
    let sample = create_test_sample(ConditioningConfig::default());
    let used = sample.match_attributes(&[
        (AttributeKey::DataType, FieldType::Analyte.into()),
        (AttributeKey::Use, true.into()),
    ]);
    assert_eq!(used, vec!["Si29", "Ca44", "Sr88"]);
    assert_eq!(
        sample.get_attribute("Si29", AttributeKey::Use).unwrap(),
        AttributeValue::Bool(true)
    );
}
