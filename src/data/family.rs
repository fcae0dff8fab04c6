use std::fmt;

use super::config::{ConfigKey, ConfigParam};
use super::dataset::DataTable;
use super::model::Timestamp;
use crate::error::AdvmDataError;

// ---------------------------------------------------------------------------
// Per-family geometry table
// ---------------------------------------------------------------------------

/// Static description of an instrument family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FamilyGeometry {
    pub name: &'static str,
    /// Instrument code used in origin labels, e.g. `"SL"` in `"ARG1 (SL)"`.
    pub instrument_code: &'static str,
    /// Distance from the end of the blanking zone to the first cell midpoint,
    /// in cell sizes.
    pub first_cell_offset: f64,
    /// Name the family's readers give the vertical beam column.
    pub vertical_beam_column: &'static str,
}

const ARGONAUT: FamilyGeometry = FamilyGeometry {
    name: "SonTek Argonaut SL",
    instrument_code: "SL",
    first_cell_offset: 0.5,
    vertical_beam_column: "Vbeam",
};

const AQUADOPP: FamilyGeometry = FamilyGeometry {
    name: "Nortek Aquadopp",
    instrument_code: "AQD",
    first_cell_offset: 1.0,
    vertical_beam_column: "Vertical Beam",
};

const EZQ: FamilyGeometry = FamilyGeometry {
    name: "Nortek EZQ",
    instrument_code: "EZQ",
    first_cell_offset: 1.0,
    vertical_beam_column: "Vertical Beam",
};

const SL3G: FamilyGeometry = FamilyGeometry {
    name: "SonTek SL 3G",
    instrument_code: "SL3G",
    first_cell_offset: 1.5,
    vertical_beam_column: "Vertical Beam",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentFamily {
    Argonaut,
    Aquadopp,
    Ezq,
    Sl3g,
}

impl InstrumentFamily {
    pub const ALL: [InstrumentFamily; 4] = [
        InstrumentFamily::Argonaut,
        InstrumentFamily::Aquadopp,
        InstrumentFamily::Ezq,
        InstrumentFamily::Sl3g,
    ];

    pub fn geometry(&self) -> &'static FamilyGeometry {
        match self {
            InstrumentFamily::Argonaut => &ARGONAUT,
            InstrumentFamily::Aquadopp => &AQUADOPP,
            InstrumentFamily::Ezq => &EZQ,
            InstrumentFamily::Sl3g => &SL3G,
        }
    }

    pub fn instrument_code(&self) -> &'static str {
        self.geometry().instrument_code
    }

    /// Family whose instrument code is `code`.
    pub fn from_instrument_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.instrument_code() == code)
    }
}

impl fmt::Display for InstrumentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.geometry().name)
    }
}

// ---------------------------------------------------------------------------
// Cell range geometry
// ---------------------------------------------------------------------------

/// Along-beam cell midpoint formula:
/// `range(i) = blanking + offset * cell_size + (i - 1) * cell_size`.
pub trait CellGeometry {
    fn first_cell_offset(&self) -> f64;

    fn cell_midpoints(&self, blanking_distance: f64, cell_size: f64, number_of_cells: usize) -> Vec<f64> {
        let first = blanking_distance + self.first_cell_offset() * cell_size;
        (0..number_of_cells).map(|i| first + i as f64 * cell_size).collect()
    }
}

impl CellGeometry for FamilyGeometry {
    fn first_cell_offset(&self) -> f64 {
        self.first_cell_offset
    }
}

impl CellGeometry for InstrumentFamily {
    fn first_cell_offset(&self) -> f64 {
        self.geometry().first_cell_offset
    }
}

/// `R001`, `R002`, ... `R{n}`.
pub fn cell_range_columns(number_of_cells: usize) -> Vec<String> {
    (1..=number_of_cells).map(|cell| format!("R{cell:03}")).collect()
}

/// Cell range table: the family's midpoints replicated on every row of `index`.
pub fn cell_range_table<G: CellGeometry>(
    geometry: &G,
    config: &ConfigParam,
    index: &[Timestamp],
) -> Result<DataTable, AdvmDataError> {
    let blanking_distance = config
        .float(ConfigKey::BlankingDistance)
        .ok_or(AdvmDataError::MissingConfiguration(ConfigKey::BlankingDistance.as_str()))?;
    let cell_size = config
        .float(ConfigKey::CellSize)
        .ok_or(AdvmDataError::MissingConfiguration(ConfigKey::CellSize.as_str()))?;
    let number_of_cells = config
        .value(ConfigKey::NumberOfCells)
        .as_i64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or(AdvmDataError::MissingConfiguration(ConfigKey::NumberOfCells.as_str()))?;

    let midpoints: Vec<Option<f64>> = geometry
        .cell_midpoints(blanking_distance, cell_size, number_of_cells)
        .into_iter()
        .map(Some)
        .collect();

    let table = DataTable::from_rows(
        cell_range_columns(number_of_cells),
        index.iter().map(|t| (*t, midpoints.clone())),
    )?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{argonaut_config, minute};

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{a} != {e}");
        }
    }

    #[test]
    fn offsets_per_family() {
        let offsets: Vec<f64> = InstrumentFamily::ALL.iter().map(|f| f.first_cell_offset()).collect();
        assert_eq!(offsets, vec![0.5, 1.0, 1.0, 1.5]);
    }

    #[test]
    fn argonaut_midpoints() {
        let ranges = InstrumentFamily::Argonaut.cell_midpoints(1.0, 1.75, 10);
        assert_close(
            &ranges,
            &[1.875, 3.625, 5.375, 7.125, 8.875, 10.625, 12.375, 14.125, 15.875, 17.625],
        );
    }

    #[test]
    fn nortek_midpoints() {
        // blanking + i * cell_size, i = 1..=n
        let expected: Vec<f64> = (1..=10).map(|i| 0.2 + i as f64 * 0.2).collect();
        assert_close(&InstrumentFamily::Aquadopp.cell_midpoints(0.2, 0.2, 10), &expected);
        let expected: Vec<f64> = (1..=10).map(|i| 0.2 + i as f64 * 0.4).collect();
        assert_close(&InstrumentFamily::Ezq.cell_midpoints(0.2, 0.4, 10), &expected);
    }

    #[test]
    fn sl3g_midpoints() {
        let expected: Vec<f64> = (0..68).map(|i| 0.2 + 1.5 * 0.2 + i as f64 * 0.2).collect();
        assert_close(&InstrumentFamily::Sl3g.cell_midpoints(0.2, 0.2, 68), &expected);
    }

    #[test]
    fn custom_geometry() {
        let custom = FamilyGeometry {
            name: "test",
            instrument_code: "T",
            first_cell_offset: 0.0,
            vertical_beam_column: "Vbeam",
        };
        assert_close(&custom.cell_midpoints(2.0, 1.0, 3), &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn range_columns() {
        assert_eq!(cell_range_columns(3), vec!["R001", "R002", "R003"]);
        assert_eq!(cell_range_columns(128).last().map(String::as_str), Some("R128"));
    }

    #[test]
    fn table_replicated_per_row() {
        let index = [minute(0), minute(1), minute(2)];
        let table = cell_range_table(&InstrumentFamily::Argonaut, &argonaut_config(), &index).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.columns().len(), 10);
        for t in &index {
            assert_eq!(table.value(t, "R001"), Some(1.875));
        }
    }

    #[test]
    fn table_needs_configuration() {
        let err = cell_range_table(&InstrumentFamily::Argonaut, &ConfigParam::new(), &[minute(0)]);
        assert_eq!(err, Err(AdvmDataError::MissingConfiguration("Blanking Distance")));
    }

    #[test]
    fn lookup_by_code() {
        assert_eq!(InstrumentFamily::from_instrument_code("AQD"), Some(InstrumentFamily::Aquadopp));
        assert_eq!(InstrumentFamily::from_instrument_code("XX"), None);
    }
}
