/// Data layer: configuration, provenance-tracking tables, instrument containers
/// and format readers.
///
/// Architecture:
/// ```text
///  .ctl/.dat/.snr   .hdr/.sen/.whd/.aN   .hdr/.raN   .txt / .csv / .parquet
///        │                  │                │               │
///        ▼                  ▼                ▼               ▼
///   ┌────────────────────────────────────────────────────────────┐
///   │  loader   parse files → TabularDataset + ConfigParam       │
///   └────────────────────────────────────────────────────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  keep acoustic columns (Temp, Vbeam, CellNNAmpB, ...)
///   └──────────┘
///        │
///        ▼
///   ┌───────────┐   add_data    ┌──────────┐
///   │ AdvmData  │ ────────────▶ │ AdvmData │   compatibility check + append
///   └───────────┘               └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  family   │  per-family cell range geometry → R001..R{n}
///   └──────────┘
/// ```
pub mod config;
pub mod container;
pub mod dataset;
pub mod family;
pub mod filter;
pub mod loader;
pub mod model;
pub mod writer;

#[cfg(test)]
pub(crate) mod fixtures {
    use std::ops::Range;

    use chrono::{Duration, NaiveDate};

    use super::config::ConfigParam;
    use super::container::AdvmData;
    use super::dataset::TabularDataset;
    use super::family::InstrumentFamily;
    use super::filter::{cell_column, CellKind};
    use super::model::{ConfigValue, Timestamp};

    /// `2017-03-01 00:00` plus `m` minutes.
    pub fn minute(m: i64) -> Timestamp {
        NaiveDate::from_ymd_opt(2017, 3, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap()
            + Duration::minutes(m)
    }

    pub fn argonaut_config() -> ConfigParam {
        let mut config = ConfigParam::new();
        config
            .update([
                ("Frequency", ConfigValue::Float(1500.0)),
                ("Effective Transducer Diameter", ConfigValue::Float(0.03)),
                ("Beam Orientation", ConfigValue::from("Horizontal")),
                ("Slant Angle", ConfigValue::Float(25.0)),
                ("Blanking Distance", ConfigValue::Float(1.0)),
                ("Cell Size", ConfigValue::Float(1.75)),
                ("Number of Cells", ConfigValue::Integer(10)),
                ("Number of Beams", ConfigValue::Integer(2)),
                ("Instrument", ConfigValue::from("SL")),
            ])
            .unwrap();
        config
    }

    /// 10-cell, 2-beam Argonaut data set at one-minute resolution. Values
    /// depend on the label so two sources never agree by accident.
    pub fn argonaut_dataset(minutes: Range<i64>, label: &str) -> AdvmData {
        let shift = (label.bytes().map(u64::from).sum::<u64>() % 10) as f64;

        let mut columns = vec!["Temp".to_string(), "Vbeam".to_string()];
        for kind in [CellKind::Amp, CellKind::Snr] {
            for beam in 1..=2 {
                for cell in 1..=10 {
                    columns.push(cell_column(cell, kind, beam));
                }
            }
        }
        let n_columns = columns.len();

        let rows = minutes.map(|m| {
            let row = (0..n_columns)
                .map(|ci| Some(shift + m as f64 * 0.5 + ci as f64))
                .collect();
            (minute(m), row)
        });
        let dataset = TabularDataset::create_from_rows(columns, rows, label).unwrap();

        AdvmData::new(InstrumentFamily::Argonaut, &dataset, &argonaut_config())
    }
}
