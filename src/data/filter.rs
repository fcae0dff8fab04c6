use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use super::dataset::TabularDataset;

// ---------------------------------------------------------------------------
// Acoustic variable naming convention
// ---------------------------------------------------------------------------

lazy_static! {
    static ref ACOUSTIC_COLUMN: Regex =
        Regex::new(r"^(Temp|Vbeam|Vertical Beam|Cell(\d{2})(Amp|SNR|Vx|Vy)(\d))$").unwrap();
}

/// Per-cell measurement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CellKind {
    Amp,
    Snr,
    Vx,
    Vy,
}

impl CellKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellKind::Amp => "Amp",
            CellKind::Snr => "SNR",
            CellKind::Vx => "Vx",
            CellKind::Vy => "Vy",
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A column name that follows the acoustic naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AcousticVariable {
    Temperature,
    /// `Vbeam` (Argonaut) or `Vertical Beam` (Nortek, SL 3G).
    VerticalBeam,
    Cell { cell: u8, kind: CellKind, beam: u8 },
}

impl FromStr for AcousticVariable {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = ACOUSTIC_COLUMN.captures(s).ok_or(())?;
        match &caps[1] {
            "Temp" => Ok(AcousticVariable::Temperature),
            "Vbeam" | "Vertical Beam" => Ok(AcousticVariable::VerticalBeam),
            _ => {
                let cell = caps[2].parse().map_err(|_| ())?;
                let beam = caps[4].parse().map_err(|_| ())?;
                let kind = match &caps[3] {
                    "Amp" => CellKind::Amp,
                    "SNR" => CellKind::Snr,
                    "Vx" => CellKind::Vx,
                    _ => CellKind::Vy,
                };
                Ok(AcousticVariable::Cell { cell, kind, beam })
            }
        }
    }
}

/// `Cell<NN><Kind><Beam>` column name, e.g. `Cell03Amp2`.
pub fn cell_column(cell: usize, kind: CellKind, beam: usize) -> String {
    format!("Cell{cell:02}{kind}{beam}")
}

pub fn is_acoustic_variable(name: &str) -> bool {
    ACOUSTIC_COLUMN.is_match(name)
}

/// The acoustic columns of `columns`, in their original order.
pub fn acoustic_columns(columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| is_acoustic_variable(c))
        .cloned()
        .collect()
}

/// Restrict data and provenance to acoustic variables.
pub fn acoustic_subset(dataset: &TabularDataset) -> TabularDataset {
    dataset.select_variables(is_acoustic_variable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::minute;

    #[test]
    fn naming_convention() {
        for name in ["Temp", "Vbeam", "Vertical Beam", "Cell01Amp1", "Cell10SNR2", "Cell99Vx3", "Cell05Vy1"] {
            assert!(is_acoustic_variable(name), "{name}");
        }
        for name in ["Temperature", "Cell1Amp1", "Cell01Amp", "Cell01Amp12", "Cell01Noise1", "Noise1", "Heading", " Temp"] {
            assert!(!is_acoustic_variable(name), "{name}");
        }
    }

    #[test]
    fn parse_cell_column() {
        assert_eq!(
            "Cell03SNR2".parse::<AcousticVariable>(),
            Ok(AcousticVariable::Cell { cell: 3, kind: CellKind::Snr, beam: 2 })
        );
        assert_eq!("Vertical Beam".parse::<AcousticVariable>(), Ok(AcousticVariable::VerticalBeam));
        assert_eq!("Pitch".parse::<AcousticVariable>(), Err(()));
        assert_eq!(cell_column(3, CellKind::Snr, 2), "Cell03SNR2");
    }

    #[test]
    fn subset_filters_data_and_origin() {
        let columns: Vec<String> = ["Temp", "Heading", "Cell01Amp1"].iter().map(|s| s.to_string()).collect();
        assert_eq!(acoustic_columns(&columns), vec!["Temp", "Cell01Amp1"]);

        let ds = TabularDataset::create_from_rows(
            columns,
            vec![(minute(0), vec![Some(10.0), Some(180.0), Some(85.0)])],
            "AQD (AQD)",
        )
        .unwrap();
        let subset = acoustic_subset(&ds);
        assert_eq!(subset.data().columns(), &["Temp".to_string(), "Cell01Amp1".to_string()][..]);
        assert_eq!(subset.origin().variables(), vec!["Temp", "Cell01Amp1"]);
    }
}
