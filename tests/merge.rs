use std::ops::Range;

use advm_data::{
    AdvmData, AdvmDataError, ConfigKey, ConfigParam, DatasetError, DuplicatePolicy,
    InstrumentFamily, TabularDataset, Timestamp,
};
use chrono::{Duration, NaiveDate};

fn minute(m: i64) -> Timestamp {
    NaiveDate::from_ymd_opt(2017, 3, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap()
        + Duration::minutes(m)
}

fn config(cell_size: f64) -> ConfigParam {
    let mut config = ConfigParam::new();
    config
        .update([
            ("Frequency", 1500.0),
            ("Slant Angle", 25.0),
            ("Blanking Distance", 1.0),
            ("Cell Size", cell_size),
        ])
        .unwrap();
    config.set("Number of Cells", 10).unwrap();
    config.set("Number of Beams", 2).unwrap();
    config.set("Instrument", "SL").unwrap();
    config
}

/// 10-cell, 2-beam data set with a `Heading` column the container drops.
fn dataset(minutes: Range<i64>, label: &str, offset: f64, cell_size: f64) -> AdvmData {
    let mut columns = vec!["Temp".to_string(), "Heading".to_string()];
    for beam in 1..=2 {
        for cell in 1..=10 {
            columns.push(format!("Cell{cell:02}Amp{beam}"));
        }
    }
    let n = columns.len();
    let rows = minutes.map(|m| {
        (
            minute(m),
            (0..n).map(|ci| Some(offset + m as f64 + ci as f64)).collect(),
        )
    });
    let ds = TabularDataset::create_from_rows(columns, rows, label).unwrap();
    AdvmData::new(InstrumentFamily::Argonaut, &ds, &config(cell_size))
}

#[test]
fn disjoint_merge_and_cell_ranges() {
    let a = dataset(0..5, "ARG1 (SL)", 0.0, 1.75);
    let b = dataset(5..10, "ARG2 (SL)", 100.0, 1.75);
    let merged = a.add_data(&b, None).unwrap();

    let data = merged.get_data();
    assert_eq!(data.index(), (0..10).map(minute).collect::<Vec<_>>());
    assert!(!data.has_column("Heading"));
    assert_eq!(merged.get_origin().origins().len(), 2);

    let ranges = merged.get_cell_range().unwrap();
    assert_eq!(ranges.len(), 10);
    for (i, column) in ranges.columns().iter().enumerate() {
        assert_eq!(column, &format!("R{:03}", i + 1));
        let expected = 1.0 + 0.5 * 1.75 + i as f64 * 1.75;
        assert!((ranges.column_mean(column).unwrap() - expected).abs() < 1e-9);
    }
}

#[test]
fn cell_size_mismatch_is_incompatible() {
    let a = dataset(0..5, "ARG1 (SL)", 0.0, 1.75);
    let b = dataset(5..10, "ARG2 (SL)", 0.0, 2.0);
    assert_eq!(a.add_data(&b, None), Err(AdvmDataError::IncompatibleData));
}

#[test]
fn shared_timestamp_needs_a_policy() {
    let a = dataset(0..3, "ARG1 (SL)", 0.0, 1.75);
    let b = dataset(2..5, "ARG2 (SL)", 100.0, 1.75);

    match a.add_data(&b, None) {
        Err(AdvmDataError::Dataset(DatasetError::AmbiguousMerge { timestamp, .. })) => {
            assert_eq!(timestamp, minute(2))
        }
        other => panic!("expected an ambiguous merge, got {other:?}"),
    }

    let merged = a.add_data(&b, Some(DuplicatePolicy::KeepCurrent)).unwrap();
    assert_eq!(merged.get_data().value(&minute(2), "Temp"), Some(2.0));
    assert_eq!(merged.get_data().value(&minute(3), "Temp"), Some(103.0));
    assert_eq!(
        merged.get_variable_origin("Temp").unwrap(),
        vec!["ARG1 (SL)", "ARG2 (SL)"]
    );

    let merged = a.add_data(&b, Some(DuplicatePolicy::KeepOther)).unwrap();
    assert_eq!(merged.get_data().value(&minute(2), "Temp"), Some(102.0));
}

#[test]
fn configuration_round_trips_through_json() {
    let a = dataset(0..2, "ARG1 (SL)", 0.0, 1.75);
    let json = serde_json::to_string(&a.get_configuration()).unwrap();
    let restored: ConfigParam = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, a.get_configuration());
    assert!(restored.value(ConfigKey::EffectiveTransducerDiameter).is_unset());
}
