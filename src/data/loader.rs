use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, Float32Array, Float64Array, Int32Array, Int64Array, StringArray,
    TimestampMicrosecondArray, TimestampMillisecondArray, TimestampNanosecondArray,
    TimestampSecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};
use chrono::{DateTime, Duration, NaiveDate};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use matfile::{MatFile, NumericData};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use regex::Regex;

use super::config::{ConfigKey, ConfigParam};
use super::container::AdvmData;
use super::dataset::{DataTable, OriginTable, Row, TabularDataset};
use super::family::InstrumentFamily;
use super::filter::{cell_column, CellKind};
use super::model::{parse_timestamp, Timestamp, DATETIME_COLUMN};
use crate::error::ReaderError;

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a timestamp-indexed table from a file. Dispatch by extension.
///
/// Supported formats:
/// * `.txt` / `.tsv` – tab-delimited with a `DateTime` column
/// * `.csv`          – comma-delimited with a `DateTime` column
/// * `.parquet`      – a `DateTime` timestamp (or string) column plus numeric columns
pub fn load_table(path: &Path) -> Result<DataTable, ReaderError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "txt" | "tsv" | "tab" => load_delimited(path, b'\t'),
        "csv" => load_delimited(path, b','),
        "parquet" | "pq" => load_parquet(path),
        _ => Err(ReaderError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Build an [`AdvmData`] from a table previously exported by this crate (or
/// any table in a [`load_table`] format). The configuration is supplied by
/// the caller since such files carry none.
pub fn read_tab_delimited_data(
    family: InstrumentFamily,
    path: &Path,
    configuration: &ConfigParam,
) -> Result<AdvmData, ReaderError> {
    let table = load_table(path)?;
    let label = origin_label(path, configuration, family);
    info!("Loaded {} rows from {path:?}", table.len());
    Ok(AdvmData::new(
        family,
        &TabularDataset::from_table(table, &label),
        configuration,
    ))
}

/// Read a tab-delimited provenance table with `variable` and `origin`
/// columns. Any other column (such as a leading row index) is ignored.
pub fn load_origin_table(path: &Path) -> Result<OriginTable, ReaderError> {
    require_file(path)?;
    let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| malformed_header(path, format!("missing {name:?} column")))
    };
    let variable_idx = find("variable")?;
    let origin_idx = find("origin")?;

    let mut origin = OriginTable::new();
    for (row_no, record) in reader.records().enumerate() {
        let record = record?;
        match (record.get(variable_idx), record.get(origin_idx)) {
            (Some(variable), Some(source)) => origin.push(variable.trim(), source.trim()),
            _ => {
                return Err(ReaderError::MalformedRow {
                    path: path.to_path_buf(),
                    line: row_no + 2,
                    detail: "missing variable or origin field".to_string(),
                })
            }
        }
    }
    Ok(origin)
}

// ---------------------------------------------------------------------------
// SonTek Argonaut: <prefix>.ctl, <prefix>.dat, <prefix>.snr
// ---------------------------------------------------------------------------

lazy_static! {
    static ref UNITS: Regex = Regex::new(r"\(.*\)").unwrap();
    static ref SNR_COLUMN: Regex = Regex::new(r"^Cell\d{2}(Amp|SNR)\d$").unwrap();
}

/// Read an Argonaut data set given its path without extension. The `.ctl`
/// and `.dat` files are required; the `.snr` file is optional.
pub fn read_argonaut_data(data_set_path: &Path) -> Result<AdvmData, ReaderError> {
    let family = InstrumentFamily::Argonaut;
    let configuration = read_argonaut_ctl_file(&with_suffix(data_set_path, "ctl"))?;
    let dat = read_argonaut_dat_file(&with_suffix(data_set_path, "dat"))?;

    let table = match optional(read_argonaut_snr_file(&with_suffix(data_set_path, "snr")))? {
        Some(snr) => dat.join(&snr),
        None => dat,
    };

    let label = origin_label(data_set_path, &configuration, family);
    info!("Loaded Argonaut data set {label} with {} rows", table.len());
    Ok(AdvmData::new(
        family,
        &TabularDataset::from_table(table, &label),
        &configuration,
    ))
}

/// Parse the fixed-layout Argonaut control file.
///
/// | line | label             | key                                |
/// |------|-------------------|------------------------------------|
/// | 10   | `ArgType`         | Instrument, Beam Orientation       |
/// | 12   | `Frequency`       | Frequency, transducer diameter     |
/// | 16   | `SlantAngle`      | Slant Angle                        |
/// | 44   | `BlankDistance`   | Blanking Distance                  |
/// | 45   | `CellSize`        | Cell Size                          |
/// | 46   | `Number of Cells` | Number of Cells                    |
pub fn read_argonaut_ctl_file(path: &Path) -> Result<ConfigParam, ReaderError> {
    debug!("Reading Argonaut control file {path:?}");
    let content = read_file(path)?;
    let lines: Vec<&str> = content.lines().collect();

    let field = |line_no: usize, label: &str| {
        lines
            .get(line_no - 1)
            .map(|line| line.trim())
            .filter(|line| line.starts_with(label))
            .and_then(|line| line.split_whitespace().last())
            .map(str::to_string)
            .ok_or_else(|| malformed_header(path, format!("expected {label:?} on line {line_no}")))
    };
    let number = |line_no: usize, label: &str| -> Result<f64, ReaderError> {
        let value = field(line_no, label)?;
        value
            .parse::<f64>()
            .map_err(|_| malformed_header(path, format!("{label} value {value:?} is not a number")))
    };

    let arg_type = field(10, "ArgType")?;
    let frequency = number(12, "Frequency")?;
    let slant_angle = number(16, "SlantAngle")?;
    let blanking_distance = number(44, "BlankDistance")?;
    let cell_size = number(45, "CellSize")?;
    let number_of_cells = field(46, "Number of Cells")?;
    let number_of_cells = number_of_cells.parse::<i64>().map_err(|_| {
        malformed_header(path, format!("Number of Cells value {number_of_cells:?} is not an integer"))
    })?;

    let orientation = if arg_type == "SL" { "Horizontal" } else { "Vertical" };

    let mut configuration = ConfigParam::new();
    configuration.set_value(ConfigKey::Frequency, frequency)?;
    if let Some(diameter) = argonaut_transducer_diameter(frequency) {
        configuration.set_value(ConfigKey::EffectiveTransducerDiameter, diameter)?;
    }
    configuration.set_value(ConfigKey::BeamOrientation, orientation)?;
    configuration.set_value(ConfigKey::SlantAngle, slant_angle)?;
    configuration.set_value(ConfigKey::BlankingDistance, blanking_distance)?;
    configuration.set_value(ConfigKey::CellSize, cell_size)?;
    configuration.set_value(ConfigKey::NumberOfCells, number_of_cells)?;
    configuration.set_value(ConfigKey::NumberOfBeams, 2)?;
    configuration.set_value(ConfigKey::Instrument, arg_type)?;
    Ok(configuration)
}

/// Effective transducer diameter (m) of the Argonaut models by frequency (kHz).
fn argonaut_transducer_diameter(frequency: f64) -> Option<f64> {
    [(3000.0, 0.015), (1500.0, 0.030), (500.0, 0.090)]
        .iter()
        .find(|(f, _)| *f == frequency)
        .map(|(_, d)| *d)
}

/// Parse the Argonaut sample file. Only temperature and the vertical beam
/// level are kept, as `Temp` and `Vbeam`.
pub fn read_argonaut_dat_file(path: &Path) -> Result<DataTable, ReaderError> {
    debug!("Reading Argonaut sample file {path:?}");
    let content = read_file(path)?;
    let mut rows = tokenized(&content);
    let (_, header) = rows
        .next()
        .ok_or_else(|| malformed_header(path, "missing header row"))?;

    let vbeam = InstrumentFamily::Argonaut.geometry().vertical_beam_column;
    let header: Vec<String> = header
        .iter()
        .map(|h| match *h {
            "Temperature" => "Temp",
            "Level" => vbeam,
            other => other,
        })
        .map(str::to_string)
        .collect();

    let date_positions = date_positions(path, &header)?;
    let picks: Vec<(String, usize)> = header
        .iter()
        .enumerate()
        .filter(|(_, h)| *h == "Temp" || *h == vbeam)
        .map(|(i, h)| (h.clone(), i))
        .collect();

    table_from_tokens(path, rows, &date_positions, &picks)
}

/// Parse the Argonaut signal file. Column names are spread over the first
/// two rows (`Cell01` over `Amp1(counts)`); units in parentheses are dropped
/// and only the per-cell `Amp` and `SNR` columns are kept.
pub fn read_argonaut_snr_file(path: &Path) -> Result<DataTable, ReaderError> {
    debug!("Reading Argonaut signal file {path:?}");
    let content = read_file(path)?;
    let mut rows = tokenized(&content);
    let (_, first) = rows
        .next()
        .ok_or_else(|| malformed_header(path, "missing header rows"))?;
    let (_, second) = rows
        .next()
        .ok_or_else(|| malformed_header(path, "missing second header row"))?;

    if first.len() != second.len() {
        return Err(malformed_header(
            path,
            format!("header rows have {} and {} fields", first.len(), second.len()),
        ));
    }
    if first.len() < 7 {
        return Err(malformed_header(path, "expected sample number and date/time columns"));
    }

    let header: Vec<String> = first
        .iter()
        .zip(&second)
        .map(|(a, b)| UNITS.replace_all(&format!("{a}{b}"), "").into_owned())
        .collect();

    // sample number, then year, month, day, hour, minute, second
    let date_positions = [1, 2, 3, 4, 5, 6];
    let picks: Vec<(String, usize)> = header
        .iter()
        .enumerate()
        .filter(|(_, h)| SNR_COLUMN.is_match(h))
        .map(|(i, h)| (h.clone(), i))
        .collect();

    table_from_tokens(path, rows, &date_positions, &picks)
}

// ---------------------------------------------------------------------------
// Nortek header (.hdr) shared by Aquadopp and EZQ
// ---------------------------------------------------------------------------

const NUMBER: &str = r"([0-9]+(?:[.][0-9]*)?|[.][0-9]+)";

lazy_static! {
    static ref BLANKING_DISTANCE: Regex =
        Regex::new(&format!(r"Blanking distance\s+{NUMBER} m")).unwrap();
    static ref CELL_SIZE: Regex = Regex::new(&format!(r"Cell size\s+{NUMBER} cm")).unwrap();
    static ref HEAD_FREQUENCY: Regex =
        Regex::new(&format!(r"Head frequency\s+{NUMBER} kHz")).unwrap();
    static ref NUMBER_OF_CELLS: Regex = Regex::new(r"Number of cells\s+([0-9]+)").unwrap();
    static ref NUMBER_OF_BEAMS: Regex = Regex::new(r"(?m)^Number of beams\s+([0-9]+)").unwrap();
    static ref DIAGNOSTICS_NUMBER_OF_BEAMS: Regex =
        Regex::new(r"Diagnostics - Number of beams\s+([0-9]+)").unwrap();
    static ref NOISE_AMPLITUDE: Regex = Regex::new(r"Noise amplitude beam ([0-9])").unwrap();
}

const NORTEK_SLANT_ANGLE: f64 = 25.0;
const NORTEK_TRANSDUCER_DIAMETER: f64 = 0.01395;

fn capture<'t>(path: &Path, pattern: &Regex, text: &'t str, what: &str) -> Result<&'t str, ReaderError> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| malformed_header(path, format!("{what} not found")))
}

fn capture_number(path: &Path, pattern: &Regex, text: &str, what: &str) -> Result<f64, ReaderError> {
    let value = capture(path, pattern, text, what)?;
    value
        .parse()
        .map_err(|_| malformed_header(path, format!("{what} {value:?} is not a number")))
}

/// Configuration of a Nortek instrument. The cell size in the header is in
/// centimetres; `cell_size` overrides it and is taken as metres.
fn read_nortek_config(
    hdr_path: &Path,
    hdr: &str,
    family: InstrumentFamily,
    number_of_cells: i64,
    cell_size: Option<f64>,
) -> Result<ConfigParam, ReaderError> {
    let beams_pattern: &Regex = match family {
        InstrumentFamily::Ezq => &*DIAGNOSTICS_NUMBER_OF_BEAMS,
        _ => &*NUMBER_OF_BEAMS,
    };

    let frequency = capture_number(hdr_path, &HEAD_FREQUENCY, hdr, "head frequency")?;
    let blanking_distance = capture_number(hdr_path, &BLANKING_DISTANCE, hdr, "blanking distance")?;
    let cell_size = match cell_size {
        Some(cell_size) => cell_size,
        None => capture_number(hdr_path, &CELL_SIZE, hdr, "cell size")? / 100.0,
    };
    let number_of_beams = capture(hdr_path, beams_pattern, hdr, "number of beams")?;
    let number_of_beams: i64 = number_of_beams
        .parse()
        .map_err(|_| malformed_header(hdr_path, format!("number of beams {number_of_beams:?}")))?;

    let mut configuration = ConfigParam::new();
    configuration.set_value(ConfigKey::Frequency, frequency)?;
    configuration.set_value(ConfigKey::EffectiveTransducerDiameter, NORTEK_TRANSDUCER_DIAMETER)?;
    configuration.set_value(ConfigKey::BeamOrientation, "Horizontal")?;
    configuration.set_value(ConfigKey::SlantAngle, NORTEK_SLANT_ANGLE)?;
    configuration.set_value(ConfigKey::BlankingDistance, blanking_distance)?;
    configuration.set_value(ConfigKey::CellSize, cell_size)?;
    configuration.set_value(ConfigKey::NumberOfCells, number_of_cells)?;
    configuration.set_value(ConfigKey::NumberOfBeams, number_of_beams)?;
    configuration.set_value(ConfigKey::Instrument, family.instrument_code())?;
    Ok(configuration)
}

/// Column names of `data_file_name` as described in the header: the lines
/// following the first line that mentions the file, up to a blank line.
fn nortek_column_names(hdr: &str, data_file_name: &str) -> Vec<String> {
    let mut lines = hdr.lines();
    while let Some(line) = lines.next() {
        if !line.contains(data_file_name) {
            continue;
        }
        let names: Vec<String> = lines
            .by_ref()
            .take_while(|l| !l.trim().is_empty())
            .map(nortek_column_name)
            .collect();
        if !names.is_empty() {
            return names;
        }
    }
    Vec::new()
}

/// `"  14   Temperature   (degrees C)"` -> `Temp`,
/// `"  11   Pressure      (dbar)"` -> `Pressure`.
fn nortek_column_name(line: &str) -> String {
    if line.contains("Temperature") {
        return "Temp".to_string();
    }
    if let Some(caps) = NOISE_AMPLITUDE.captures(line) {
        return format!("Noise{}", &caps[1]);
    }
    let description = line.split('(').next().unwrap_or(line);
    description
        .split_whitespace()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read `<prefix>.<suffix>` using the column layout in the header. The date
/// columns become the index.
fn read_nortek_time_series(
    data_set_path: &Path,
    suffix: &str,
    hdr_path: &Path,
    hdr: &str,
) -> Result<DataTable, ReaderError> {
    let path = with_suffix(data_set_path, suffix);
    debug!("Reading Nortek time series {path:?}");
    let content = read_file(&path)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let names = nortek_column_names(hdr, &file_name);
    if names.is_empty() {
        return Err(malformed_header(
            hdr_path,
            format!("no column description for {file_name}"),
        ));
    }

    let date_positions = date_positions(hdr_path, &names)?;
    let picks: Vec<(String, usize)> = names
        .iter()
        .enumerate()
        .filter(|(_, n)| !DATE_FIELDS.contains(&n.as_str()))
        .map(|(i, n)| (n.clone(), i))
        .collect();

    table_from_tokens(&path, tokenized(&content), &date_positions, &picks)
}

/// Where the amplitudes sit on each line of a beam file.
#[derive(Debug, Clone, Copy)]
enum AmplitudeLayout {
    /// The last `n` fields.
    Trailing,
    /// `n` fields starting at this column.
    From(usize),
}

/// Read one beam's per-cell amplitudes. Line `i` of the file belongs to
/// `index[i]`.
fn read_amplitude_file(
    path: &Path,
    index: &[Timestamp],
    number_of_cells: usize,
    beam: usize,
    layout: AmplitudeLayout,
) -> Result<DataTable, ReaderError> {
    debug!("Reading amplitude file {path:?}");
    let content = read_file(path)?;
    let rows: Vec<(usize, Vec<&str>)> = tokenized(&content).collect();
    if rows.len() != index.len() {
        return Err(malformed_row(
            path,
            rows.len(),
            format!("expected {} rows to match the sensor file", index.len()),
        ));
    }

    let columns = (1..=number_of_cells)
        .map(|cell| cell_column(cell, CellKind::Amp, beam))
        .collect();
    let mut table = DataTable::new(columns);

    for ((line, tokens), timestamp) in rows.into_iter().zip(index) {
        let start = match layout {
            AmplitudeLayout::Trailing => tokens.len().checked_sub(number_of_cells),
            AmplitudeLayout::From(first) => Some(first).filter(|f| f + number_of_cells <= tokens.len()),
        }
        .ok_or_else(|| malformed_row(path, line, format!("expected {number_of_cells} amplitudes")))?;

        let values: Row = tokens[start..start + number_of_cells]
            .iter()
            .map(|t| parse_value(t))
            .collect();
        table.insert_row(*timestamp, values)?;
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// Nortek Aquadopp: <prefix>.hdr, .sen, .whd, .a1 .. .aN
// ---------------------------------------------------------------------------

/// Read an Aquadopp data set given its path without extension. The `.hdr`
/// and `.sen` files are required; the wave header and beam files are read
/// when present.
pub fn read_aquadopp_data(data_set_path: &Path) -> Result<AdvmData, ReaderError> {
    let family = InstrumentFamily::Aquadopp;
    let hdr_path = with_suffix(data_set_path, "hdr");
    let hdr = read_file(&hdr_path)?;

    let number_of_cells = capture(&hdr_path, &NUMBER_OF_CELLS, &hdr, "number of cells")?;
    let number_of_cells: usize = number_of_cells
        .parse()
        .map_err(|_| malformed_header(&hdr_path, format!("number of cells {number_of_cells:?}")))?;
    let configuration = read_nortek_config(&hdr_path, &hdr, family, number_of_cells as i64, None)?;

    let sen = read_nortek_time_series(data_set_path, "sen", &hdr_path, &hdr)?;
    let index = sen.index();

    let mut table = match optional(read_nortek_time_series(data_set_path, "whd", &hdr_path, &hdr))? {
        Some(whd) => sen.join(&whd.interpolate_onto(&index).select_columns(|c| c != "Temp")),
        None => sen,
    };

    for beam in 1..=number_of_beams(&configuration) {
        let path = with_suffix(data_set_path, &format!("a{beam}"));
        let amplitude = read_amplitude_file(&path, &index, number_of_cells, beam, AmplitudeLayout::Trailing);
        if let Some(amplitude) = optional(amplitude)? {
            table = table.join(&amplitude);
        }
    }

    let label = origin_label(data_set_path, &configuration, family);
    info!("Loaded Aquadopp data set {label} with {} rows", table.len());
    Ok(AdvmData::new(
        family,
        &TabularDataset::from_table(table, &label),
        &configuration,
    ))
}

// ---------------------------------------------------------------------------
// Nortek EZQ: <prefix>.hdr, .sen, .dat, .ra1 .. .raN
// ---------------------------------------------------------------------------

/// First amplitude column of an EZQ `.raN` line; the date comes first.
const EZQ_AMPLITUDE_COLUMN: usize = 11;
/// Column holding the vertical beam in `.sen` and the temperature in `.dat`.
const EZQ_SENSOR_COLUMN: usize = 10;

/// Read an EZQ data set given its path without extension. The amplitude
/// files define the index; temperature and vertical beam are interpolated
/// onto it. `cell_size` (m) replaces the cell size in the header.
pub fn read_ezq_data(data_set_path: &Path, cell_size: Option<f64>) -> Result<AdvmData, ReaderError> {
    let family = InstrumentFamily::Ezq;
    let hdr_path = with_suffix(data_set_path, "hdr");
    let hdr = read_file(&hdr_path)?;

    let first_beam_path = with_suffix(data_set_path, "ra1");
    let first_beam = read_file(&first_beam_path)?;
    let number_of_cells = tokenized(&first_beam)
        .next()
        .map(|(_, tokens)| tokens.len().saturating_sub(EZQ_AMPLITUDE_COLUMN))
        .filter(|n| *n > 0)
        .ok_or_else(|| malformed_header(&first_beam_path, "no amplitude columns"))?;

    let configuration =
        read_nortek_config(&hdr_path, &hdr, family, number_of_cells as i64, cell_size)?;

    let index = tokenized(&first_beam)
        .map(|(line, tokens)| {
            row_timestamp(&tokens, &NORTEK_DATE_POSITIONS)
                .ok_or_else(|| malformed_row(&first_beam_path, line, "invalid date/time fields"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut amplitude = DataTable::new(Vec::new());
    for beam in 1..=number_of_beams(&configuration) {
        let path = with_suffix(data_set_path, &format!("ra{beam}"));
        let layout = AmplitudeLayout::From(EZQ_AMPLITUDE_COLUMN);
        if let Some(beam_table) = optional(read_amplitude_file(&path, &index, number_of_cells, beam, layout))? {
            amplitude = amplitude.join(&beam_table);
        }
    }

    let vertical_beam = family.geometry().vertical_beam_column;
    let sen = read_single_column(&with_suffix(data_set_path, "sen"), vertical_beam, EZQ_SENSOR_COLUMN)?;
    let dat = read_single_column(&with_suffix(data_set_path, "dat"), "Temp", EZQ_SENSOR_COLUMN)?;
    let table = sen.join(&dat).interpolate_onto(&index).join(&amplitude);

    let label = origin_label(data_set_path, &configuration, family);
    info!("Loaded EZQ data set {label} with {} rows", table.len());
    Ok(AdvmData::new(
        family,
        &TabularDataset::from_table(table, &label),
        &configuration,
    ))
}

/// One column of a headerless Nortek file whose first six fields are the date.
fn read_single_column(path: &Path, name: &str, column: usize) -> Result<DataTable, ReaderError> {
    debug!("Reading {name:?} from {path:?}");
    let content = read_file(path)?;
    table_from_tokens(
        path,
        tokenized(&content),
        &NORTEK_DATE_POSITIONS,
        &[(name.to_string(), column)],
    )
}

// ---------------------------------------------------------------------------
// SonTek SL 3G: MATLAB v5 export (<name>.mat)
// ---------------------------------------------------------------------------

const SL3G_FREQUENCY: f64 = 3000.0;
const SL3G_SLANT_ANGLE: f64 = 25.0;
const SL3G_NUMBER_OF_BEAMS: usize = 2;

/// Read an SL 3G data set from its `.mat` export.
///
/// The export flattens its structures into `Group_Field` variables. Samples
/// come from `FlowData_SampleTime` (microseconds since 2000-01-01),
/// `FlowData_Temp` and `FlowData_Depth`; amplitudes from `Profile_0_Amp` and
/// `Profile_1_Amp` (samples × cells). The setup is read from the variables
/// ending in `SLblankingDistance`, `SLcellSize` and `SLcellCount`.
///
/// SNR columns are only produced when `intensity_scale` (dB per count) is
/// given: `scale * (amplitude - FlowData_SNR)` per beam.
pub fn read_sl3g_data(path: &Path, intensity_scale: Option<f64>) -> Result<AdvmData, ReaderError> {
    let family = InstrumentFamily::Sl3g;
    require_file(path)?;
    debug!("Reading SL 3G MATLAB file {path:?}");
    let mat = MatFile::parse(File::open(path)?)
        .map_err(|e| malformed_header(path, format!("not a MATLAB v5 file: {e:?}")))?;

    let configuration = read_sl3g_config(path, &mat, family)?;

    let (_, sample_time) = mat_variable(path, &mat, "FlowData_SampleTime")?;
    let epoch = NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| malformed_header(path, "invalid sample time epoch"))?;
    let index = sample_time
        .iter()
        .enumerate()
        .map(|(i, micros)| {
            Some(micros)
                .filter(|m| m.is_finite())
                .and_then(|m| epoch.checked_add_signed(Duration::microseconds(m.round() as i64)))
                .ok_or_else(|| malformed_row(path, i + 1, format!("sample time {micros} out of range")))
        })
        .collect::<Result<Vec<Timestamp>, _>>()?;
    let samples = index.len();

    let mut columns = vec!["Temp".to_string(), family.geometry().vertical_beam_column.to_string()];
    let mut series = vec![
        sample_column(path, &mat, "FlowData_Temp", samples)?,
        sample_column(path, &mat, "FlowData_Depth", samples)?,
    ];

    let snr = match intensity_scale {
        Some(_) => Some(mat_matrix(path, &mat, "FlowData_SNR", samples)?),
        None => None,
    };
    for beam in 1..=SL3G_NUMBER_OF_BEAMS {
        let (cells, amplitude) = mat_matrix(path, &mat, &format!("Profile_{}_Amp", beam - 1), samples)?;
        for cell in 0..cells {
            columns.push(cell_column(cell + 1, CellKind::Amp, beam));
            series.push(amplitude[cell * samples..(cell + 1) * samples].to_vec());
        }
        if let (Some(scale), Some((snr_beams, snr))) = (intensity_scale, &snr) {
            if beam > *snr_beams {
                return Err(malformed_header(path, format!("FlowData_SNR has no beam {beam}")));
            }
            let noise = &snr[(beam - 1) * samples..beam * samples];
            for cell in 0..cells {
                columns.push(cell_column(cell + 1, CellKind::Snr, beam));
                series.push(
                    (0..samples)
                        .map(|i| scale * (amplitude[cell * samples + i] - noise[i]))
                        .collect(),
                );
            }
        }
    }

    let rows = index.into_iter().enumerate().map(|(i, timestamp)| {
        let row: Row = series.iter().map(|s| Some(s[i])).collect();
        (timestamp, row)
    });
    let table = DataTable::from_rows(columns, rows)?;

    let label = origin_label(path, &configuration, family);
    info!("Loaded SL 3G data set {label} with {} rows", table.len());
    Ok(AdvmData::new(
        family,
        &TabularDataset::from_table(table, &label),
        &configuration,
    ))
}

/// Setup values larger than 100 are taken as centimetres.
fn read_sl3g_config(path: &Path, mat: &MatFile, family: InstrumentFamily) -> Result<ConfigParam, ReaderError> {
    let setup = |field: &str| -> Result<f64, ReaderError> {
        let (_, values) = mat_variable(path, mat, field)?;
        values
            .first()
            .copied()
            .map(|v| if v > 100.0 { v / 100.0 } else { v })
            .ok_or_else(|| malformed_header(path, format!("{field} is empty")))
    };

    let blanking_distance = setup("SLblankingDistance")?;
    let cell_size = setup("SLcellSize")?;
    let cell_count = setup("SLcellCount")?;
    if cell_count.fract() != 0.0 {
        return Err(malformed_header(path, format!("SLcellCount {cell_count} is not an integer")));
    }

    let mut configuration = ConfigParam::new();
    configuration.set_value(ConfigKey::Frequency, SL3G_FREQUENCY)?;
    configuration.set_value(ConfigKey::BeamOrientation, "Horizontal")?;
    configuration.set_value(ConfigKey::SlantAngle, SL3G_SLANT_ANGLE)?;
    configuration.set_value(ConfigKey::BlankingDistance, blanking_distance)?;
    configuration.set_value(ConfigKey::CellSize, cell_size)?;
    configuration.set_value(ConfigKey::NumberOfCells, cell_count as i64)?;
    configuration.set_value(ConfigKey::NumberOfBeams, SL3G_NUMBER_OF_BEAMS as i64)?;
    configuration.set_value(ConfigKey::Instrument, family.instrument_code())?;
    Ok(configuration)
}

/// Dimensions and column-major values of the numeric variable `name`, or of
/// the one whose flattened name ends in `_<name>`.
fn mat_variable(path: &Path, mat: &MatFile, name: &str) -> Result<(Vec<usize>, Vec<f64>), ReaderError> {
    let suffix = format!("_{name}");
    let array = mat
        .arrays()
        .iter()
        .find(|a| a.name() == name || a.name().ends_with(&suffix))
        .ok_or_else(|| malformed_header(path, format!("missing variable {name:?}")))?;

    let values = match array.data() {
        NumericData::Double { real, .. } => real.clone(),
        NumericData::Single { real, .. } => real.iter().map(|v| f64::from(*v)).collect(),
        NumericData::Int8 { real, .. } => real.iter().map(|v| f64::from(*v)).collect(),
        NumericData::UInt8 { real, .. } => real.iter().map(|v| f64::from(*v)).collect(),
        NumericData::Int16 { real, .. } => real.iter().map(|v| f64::from(*v)).collect(),
        NumericData::UInt16 { real, .. } => real.iter().map(|v| f64::from(*v)).collect(),
        NumericData::Int32 { real, .. } => real.iter().map(|v| f64::from(*v)).collect(),
        NumericData::UInt32 { real, .. } => real.iter().map(|v| f64::from(*v)).collect(),
        NumericData::Int64 { real, .. } => real.iter().map(|v| *v as f64).collect(),
        NumericData::UInt64 { real, .. } => real.iter().map(|v| *v as f64).collect(),
    };
    Ok((array.size().to_vec(), values))
}

/// A samples × k matrix; returns `k` and the column-major values.
fn mat_matrix(path: &Path, mat: &MatFile, name: &str, samples: usize) -> Result<(usize, Vec<f64>), ReaderError> {
    let (size, values) = mat_variable(path, mat, name)?;
    match size.as_slice() {
        [rows, columns] if *rows == samples && values.len() == rows * columns => Ok((*columns, values)),
        _ => Err(malformed_header(
            path,
            format!("{name} has dimensions {size:?}, expected {samples} rows"),
        )),
    }
}

fn sample_column(path: &Path, mat: &MatFile, name: &str, samples: usize) -> Result<Vec<f64>, ReaderError> {
    let (_, values) = mat_variable(path, mat, name)?;
    if values.len() != samples {
        return Err(malformed_header(
            path,
            format!("{name} has {} values for {samples} samples", values.len()),
        ));
    }
    Ok(values)
}

// ---------------------------------------------------------------------------
// Delimited text loader
// ---------------------------------------------------------------------------

fn load_delimited(path: &Path, delimiter: u8) -> Result<DataTable, ReaderError> {
    require_file(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_path(path)?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let time_idx = headers
        .iter()
        .position(|h| h == DATETIME_COLUMN)
        .ok_or_else(|| malformed_header(path, format!("missing {DATETIME_COLUMN:?} column")))?;

    let value_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != time_idx)
        .map(|(i, h)| (i, h.clone()))
        .collect();

    let mut table = DataTable::new(value_cols.iter().map(|(_, h)| h.clone()).collect());

    for (row_no, result) in reader.records().enumerate() {
        let record = result?;
        let line = row_no + 2;

        let timestamp = record
            .get(time_idx)
            .and_then(parse_timestamp)
            .ok_or_else(|| malformed_row(path, line, "invalid DateTime"))?;

        let values = value_cols
            .iter()
            .map(|(i, name)| {
                let field = record.get(*i).unwrap_or("").trim();
                if field.is_empty() {
                    return Ok(None);
                }
                field
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| malformed_row(path, line, format!("{name}: {field:?} is not a number")))
            })
            .collect::<Result<Row, ReaderError>>()?;

        table.insert_row(timestamp, values)?;
    }

    Ok(table)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet table.
///
/// Expected schema:
/// - `DateTime`: Timestamp (any unit, no time zone) or Utf8
/// - Any Float64/Float32/Int64/Int32 column becomes a value column
/// - Other columns are skipped
fn load_parquet(path: &Path) -> Result<DataTable, ReaderError> {
    require_file(path)?;
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut table: Option<DataTable> = None;
    let mut row_offset = 0;

    for batch_result in reader {
        let batch = batch_result?;
        let schema = batch.schema();

        let time_idx = schema
            .index_of(DATETIME_COLUMN)
            .map_err(|_| malformed_header(path, format!("missing {DATETIME_COLUMN:?} column")))?;

        let value_cols: Vec<(usize, String)> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(i, f)| {
                let numeric = is_numeric(f.data_type());
                if *i != time_idx && !numeric {
                    debug!("Skipping non-numeric column {:?}", f.name());
                }
                *i != time_idx && numeric
            })
            .map(|(i, f)| (i, f.name().clone()))
            .collect();

        let table = table.get_or_insert_with(|| {
            DataTable::new(value_cols.iter().map(|(_, n)| n.clone()).collect())
        });

        let time_col = batch.column(time_idx);
        for row in 0..batch.num_rows() {
            let timestamp = extract_timestamp(time_col, row)
                .ok_or_else(|| malformed_row(path, row_offset + row + 1, "invalid DateTime"))?;
            let values = value_cols
                .iter()
                .map(|(i, _)| extract_f64(batch.column(*i), row))
                .collect();
            table.insert_row(timestamp, values)?;
        }
        row_offset += batch.num_rows();
    }

    Ok(table.unwrap_or_else(|| DataTable::new(Vec::new())))
}

// -- Parquet / Arrow helpers --

fn is_numeric(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Float64 | DataType::Float32 | DataType::Int64 | DataType::Int32
    )
}

fn extract_f64(col: &Arc<dyn Array>, row: usize) -> Option<f64> {
    if col.is_null(row) {
        return None;
    }
    let any = col.as_any();
    match col.data_type() {
        DataType::Float64 => any.downcast_ref::<Float64Array>().map(|a| a.value(row)),
        DataType::Float32 => any.downcast_ref::<Float32Array>().map(|a| a.value(row) as f64),
        DataType::Int64 => any.downcast_ref::<Int64Array>().map(|a| a.value(row) as f64),
        DataType::Int32 => any.downcast_ref::<Int32Array>().map(|a| a.value(row) as f64),
        _ => None,
    }
}

fn extract_timestamp(col: &Arc<dyn Array>, row: usize) -> Option<Timestamp> {
    if col.is_null(row) {
        return None;
    }
    let any = col.as_any();
    let nanos = match col.data_type() {
        DataType::Timestamp(TimeUnit::Second, _) => any
            .downcast_ref::<TimestampSecondArray>()?
            .value(row)
            .checked_mul(1_000_000_000)?,
        DataType::Timestamp(TimeUnit::Millisecond, _) => any
            .downcast_ref::<TimestampMillisecondArray>()?
            .value(row)
            .checked_mul(1_000_000)?,
        DataType::Timestamp(TimeUnit::Microsecond, _) => any
            .downcast_ref::<TimestampMicrosecondArray>()?
            .value(row)
            .checked_mul(1_000)?,
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            any.downcast_ref::<TimestampNanosecondArray>()?.value(row)
        }
        DataType::Utf8 => {
            return parse_timestamp(any.downcast_ref::<StringArray>()?.value(row));
        }
        _ => return None,
    };
    let seconds = nanos.div_euclid(1_000_000_000);
    let subsec = nanos.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(seconds, subsec).map(|t| t.naive_utc())
}

// ---------------------------------------------------------------------------
// Whitespace-delimited instrument files
// ---------------------------------------------------------------------------

const DATE_FIELDS: [&str; 6] = ["Year", "Month", "Day", "Hour", "Minute", "Second"];

/// Month, day, year, hour, minute, second: positions of year..second.
const NORTEK_DATE_POSITIONS: [usize; 6] = [2, 0, 1, 3, 4, 5];

/// Non-empty lines split on whitespace, with their 1-based line numbers.
fn tokenized(content: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.split_whitespace().collect::<Vec<_>>()))
        .filter(|(_, tokens)| !tokens.is_empty())
}

/// Positions of year, month, day, hour, minute and second in `header`.
fn date_positions(path: &Path, header: &[String]) -> Result<[usize; 6], ReaderError> {
    let mut positions = [0; 6];
    for (slot, name) in positions.iter_mut().zip(DATE_FIELDS) {
        *slot = header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| malformed_header(path, format!("missing {name:?} column")))?;
    }
    Ok(positions)
}

fn row_timestamp(tokens: &[&str], positions: &[usize; 6]) -> Option<Timestamp> {
    let mut fields = [0.0; 6];
    for (field, &pos) in fields.iter_mut().zip(positions) {
        *field = tokens.get(pos)?.parse::<f64>().ok()?;
    }
    let [year, month, day, hour, minute, second] = fields;
    if fields.iter().any(|f| !f.is_finite() || *f < 0.0) {
        return None;
    }

    let whole = second.trunc();
    let nanos = (((second - whole) * 1e9).round() as u32).min(999_999_999);
    NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?
        .and_hms_nano_opt(hour as u32, minute as u32, whole as u32, nanos)
}

/// Unparseable and NaN fields become absent values.
fn parse_value(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Build a table from tokenized rows, picking `(name, column)` pairs.
/// Missing trailing fields become absent values.
fn table_from_tokens<'a, I>(
    path: &Path,
    rows: I,
    date_positions: &[usize; 6],
    picks: &[(String, usize)],
) -> Result<DataTable, ReaderError>
where
    I: IntoIterator<Item = (usize, Vec<&'a str>)>,
{
    let mut table = DataTable::new(picks.iter().map(|(name, _)| name.clone()).collect());
    for (line, tokens) in rows {
        let timestamp = row_timestamp(&tokens, date_positions)
            .ok_or_else(|| malformed_row(path, line, "invalid date/time fields"))?;
        let values = picks
            .iter()
            .map(|(_, i)| tokens.get(*i).and_then(|t| parse_value(t)))
            .collect();
        table.insert_row(timestamp, values)?;
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// `<prefix>.<suffix>`, keeping any dots already in the prefix.
fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut path: OsString = prefix.as_os_str().to_os_string();
    path.push(".");
    path.push(suffix);
    PathBuf::from(path)
}

/// `"<path> (<instrument>)"`, falling back to the family code.
fn origin_label(path: &Path, configuration: &ConfigParam, family: InstrumentFamily) -> String {
    let instrument = configuration
        .value(ConfigKey::Instrument)
        .as_str()
        .unwrap_or(family.instrument_code());
    format!("{} ({})", path.display(), instrument)
}

fn number_of_beams(configuration: &ConfigParam) -> usize {
    configuration
        .value(ConfigKey::NumberOfBeams)
        .as_i64()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0)
}

fn require_file(path: &Path) -> Result<(), ReaderError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ReaderError::FileNotFound(path.to_path_buf()))
    }
}

fn read_file(path: &Path) -> Result<String, ReaderError> {
    require_file(path)?;
    Ok(std::fs::read_to_string(path)?)
}

/// Turn a missing optional file into `None`.
fn optional<T>(result: Result<T, ReaderError>) -> Result<Option<T>, ReaderError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ReaderError::FileNotFound(path)) => {
            warn!("Optional file {path:?} not found, skipping");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn malformed_header(path: &Path, detail: impl Into<String>) -> ReaderError {
    ReaderError::MalformedHeader {
        path: path.to_path_buf(),
        detail: detail.into(),
    }
}

fn malformed_row(path: &Path, line: usize, detail: impl Into<String>) -> ReaderError {
    ReaderError::MalformedRow {
        path: path.to_path_buf(),
        line,
        detail: detail.into(),
    }
}
