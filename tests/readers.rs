use std::fs;
use std::path::Path;

use advm_data::data::loader::{
    load_origin_table, read_argonaut_data, read_tab_delimited_data,
};
use advm_data::data::writer::{write_origin_tab_delimited, write_parquet, write_tab_delimited};
use advm_data::{ConfigKey, ConfigValue, InstrumentFamily, MatchMethod, ReaderError};
use chrono::{Duration, NaiveDate};

fn control_file(cell_size: f64) -> String {
    let mut lines: Vec<String> = (1..=46).map(|i| format!("Setting {i}")).collect();
    lines[9] = "ArgType ------------------- SL".to_string();
    lines[11] = "Frequency ------- (kHz) --- 1500".to_string();
    lines[15] = "SlantAngle ------ (deg) --- 25.0".to_string();
    lines[43] = "BlankDistance---- (m) ------ 1.00".to_string();
    lines[44] = format!("CellSize -------- (m) ------ {cell_size:.2}");
    lines[45] = "Number of Cells ------------ 2".to_string();
    lines.join("\n") + "\n"
}

/// Two-cell, one-beam Argonaut deployment sampled at the given hours.
fn write_argonaut(dir: &Path, name: &str, hours: &[u32], cell_size: f64) {
    let mut dat = String::from("Year Month Day Hour Minute Second Temperature Level Pitch\n");
    let mut snr = String::from("Sample Year Month Day Hour Minute Second Cell01 Cell01 Cell02 Cell02\n");
    snr.push_str("# (yr) (mo) (dy) (hr) (mn) (s) Amp1(counts) SNR1(dB) Amp1(counts) SNR1(dB)\n");
    for (i, hour) in hours.iter().enumerate() {
        dat.push_str(&format!("2017 3 1 {hour} 0 0 {}.5 0.9 1.0\n", 10 + hour));
        snr.push_str(&format!("{} 2017 3 1 {hour} 0 0 {} 30 {} 25\n", i + 1, 100 + hour, 90 + hour));
    }
    fs::write(dir.join(format!("{name}.ctl")), control_file(cell_size)).unwrap();
    fs::write(dir.join(format!("{name}.dat")), dat).unwrap();
    fs::write(dir.join(format!("{name}.snr")), snr).unwrap();
}

#[test]
fn argonaut_deployments_merge_and_export() {
    let dir = tempfile::tempdir().unwrap();
    write_argonaut(dir.path(), "ARG1", &[0, 1, 2], 1.75);
    write_argonaut(dir.path(), "ARG2", &[3, 4], 1.75);

    let first = read_argonaut_data(&dir.path().join("ARG1")).unwrap();
    let second = read_argonaut_data(&dir.path().join("ARG2")).unwrap();
    assert_eq!(
        first.get_variable_names(),
        vec!["Temp", "Vbeam", "Cell01Amp1", "Cell01SNR1", "Cell02Amp1", "Cell02SNR1"]
    );

    let merged = first.add_data(&second, None).unwrap();
    let data = merged.get_data();
    assert_eq!(data.len(), 5);

    let t0 = NaiveDate::from_ymd_opt(2017, 3, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap();
    assert_eq!(data.value(&(t0 + Duration::hours(4)), "Cell01Amp1"), Some(104.0));
    let interpolated = merged
        .get_variable_observation("Temp", t0 + Duration::minutes(150), Duration::hours(2), MatchMethod::Interpolate)
        .unwrap();
    assert!((interpolated - 13.0).abs() < 1e-9);

    // the cell ranges use the blanking distance and cell size from the .ctl
    let ranges = merged.get_cell_range().unwrap();
    assert_eq!(ranges.column_mean("R001"), Some(1.0 + 0.5 * 1.75));
    assert_eq!(ranges.column_mean("R002"), Some(1.0 + 1.5 * 1.75));

    let text_path = dir.path().join("merged.txt");
    let parquet_path = dir.path().join("merged.parquet");
    let origin_path = dir.path().join("merged_origin.txt");
    write_tab_delimited(&data, &text_path).unwrap();
    write_parquet(&data, &parquet_path).unwrap();
    write_origin_tab_delimited(&merged.get_origin(), &origin_path).unwrap();

    let configuration = merged.get_configuration();
    for path in [&text_path, &parquet_path] {
        let reloaded = read_tab_delimited_data(InstrumentFamily::Argonaut, path, &configuration).unwrap();
        assert_eq!(reloaded.get_data(), data);
        assert_eq!(reloaded.get_configuration(), configuration);
    }
    assert_eq!(load_origin_table(&origin_path).unwrap(), merged.get_origin());
}

#[test]
fn argonaut_cell_size_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    write_argonaut(dir.path(), "ARG1", &[0], 1.75);
    write_argonaut(dir.path(), "ARG2", &[1], 2.0);

    let first = read_argonaut_data(&dir.path().join("ARG1")).unwrap();
    let second = read_argonaut_data(&dir.path().join("ARG2")).unwrap();
    assert_eq!(
        second.get_configuration().value(ConfigKey::CellSize),
        &ConfigValue::Float(2.0)
    );
    assert!(first.add_data(&second, None).is_err());
}

#[test]
fn missing_required_file() {
    let dir = tempfile::tempdir().unwrap();
    write_argonaut(dir.path(), "ARG1", &[0], 1.75);
    fs::remove_file(dir.path().join("ARG1.dat")).unwrap();

    match read_argonaut_data(&dir.path().join("ARG1")) {
        Err(ReaderError::FileNotFound(path)) => assert!(path.ends_with("ARG1.dat")),
        other => panic!("expected a missing file error, got {other:?}"),
    }
}
