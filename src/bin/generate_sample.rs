use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use advm_data::data::loader::read_argonaut_data;
use advm_data::data::writer::{to_record_batch, write_origin_tab_delimited, write_parquet};
use advm_data::DuplicatePolicy;
use anyhow::{Context, Result};
use arrow::util::pretty::pretty_format_batches;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::info;

const NUMBER_OF_CELLS: usize = 10;
const NUMBER_OF_BEAMS: usize = 2;
const CELL_SIZE: f64 = 1.75;
const SAMPLES_PER_DAY: i64 = 96;

/// Deterministic measurement noise: splitmix64 uniforms through Box-Muller.
struct Noise(u64);

impl Noise {
    fn uniform(&mut self) -> f64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D1_049B_B133_111E);
        ((z ^ (z >> 31)) >> 11) as f64 / (1u64 << 53) as f64
    }

    fn gauss(&mut self, std_dev: f64) -> f64 {
        let u1 = self.uniform().max(f64::MIN_POSITIVE);
        let u2 = self.uniform();
        std_dev * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }
}

/// Control file with the fields the reader looks for on their fixed lines.
fn control_file() -> String {
    let mut lines: Vec<String> = (1..=46).map(|i| format!("Setting {i:02}")).collect();
    lines[9] = "ArgType ------------------- SL".to_string();
    lines[11] = "Frequency ------- (kHz) --- 1500".to_string();
    lines[15] = "SlantAngle ------ (deg) --- 25.0".to_string();
    lines[43] = "BlankDistance---- (m) ------ 1.00".to_string();
    lines[44] = format!("CellSize -------- (m) ------ {CELL_SIZE:.2}");
    lines[45] = format!("Number of Cells ------------ {NUMBER_OF_CELLS}");
    lines.join("\n") + "\n"
}

fn date_fields(t: &NaiveDateTime) -> String {
    t.format("%Y %m %d %H %M %S").to_string()
}

/// Write `<prefix>.ctl`, `.dat` and `.snr` for one day of 15-minute samples.
/// Backscatter decays with range and rises with the daily turbidity cycle.
fn write_deployment(prefix: &Path, start: NaiveDateTime, noise: &mut Noise) -> Result<()> {
    let mut dat = String::from("Sample Year Month Day Hour Minute Second Temperature Level Heading\n");
    let mut snr = String::from("Sample Year Month Day Hour Minute Second");
    let mut units = String::from("# (yr) (mo) (dy) (hr) (mn) (s)");
    for beam in 1..=NUMBER_OF_BEAMS {
        for cell in 1..=NUMBER_OF_CELLS {
            write!(snr, " Cell{cell:02} Cell{cell:02}")?;
            write!(units, " Amp{beam}(counts) SNR{beam}(dB)")?;
        }
    }
    snr.push('\n');
    snr.push_str(&units);
    snr.push('\n');

    for i in 0..SAMPLES_PER_DAY {
        let t = start + Duration::minutes(15 * i);
        let phase = 2.0 * std::f64::consts::PI * i as f64 / SAMPLES_PER_DAY as f64;
        let temperature = 12.0 + 1.5 * phase.sin() + noise.gauss(0.05);
        let level = 1.2 + 0.2 * phase.cos() + noise.gauss(0.01);
        writeln!(dat, "{} {} {temperature:.2} {level:.3} 182", i + 1, date_fields(&t))?;

        write!(snr, "{} {}", i + 1, date_fields(&t))?;
        for _beam in 1..=NUMBER_OF_BEAMS {
            for cell in 1..=NUMBER_OF_CELLS {
                let amplitude = 140.0 + 10.0 * phase.sin() - 7.5 * cell as f64 + noise.gauss(1.0);
                write!(snr, " {amplitude:.0} {:.1}", amplitude * 0.43 - 20.0)?;
            }
        }
        snr.push('\n');
    }

    let with_suffix = |suffix: &str| PathBuf::from(format!("{}.{suffix}", prefix.display()));
    fs::write(with_suffix("ctl"), control_file()).context("writing control file")?;
    fs::write(with_suffix("dat"), dat).context("writing sample file")?;
    fs::write(with_suffix("snr"), snr).context("writing signal file")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let output_dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| "sample_data".into()));
    fs::create_dir_all(&output_dir).context("creating output directory")?;

    let mut noise = Noise(42);
    let first_day = NaiveDate::from_ymd_opt(2017, 3, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .context("invalid start date")?;

    let prefixes = [output_dir.join("ARG1"), output_dir.join("ARG2")];
    for (day, prefix) in prefixes.iter().enumerate() {
        write_deployment(prefix, first_day + Duration::days(day as i64), &mut noise)?;
        info!("Wrote synthetic Argonaut deployment {}", prefix.display());
    }

    let first = read_argonaut_data(&prefixes[0]).context("reading first deployment")?;
    let second = read_argonaut_data(&prefixes[1]).context("reading second deployment")?;
    let merged = first
        .add_data(&second, Some(DuplicatePolicy::KeepCurrent))
        .context("merging deployments")?;

    let data = merged.get_data();
    info!(
        "Merged data set: {} rows, {} variables, origins {:?}",
        data.len(),
        data.columns().len(),
        merged.get_origin().origins()
    );
    info!("Configuration: {}", merged.get_configuration());

    let ranges = merged.get_cell_range().context("computing cell ranges")?;
    let midpoints: Vec<f64> = ranges
        .columns()
        .iter()
        .filter_map(|c| ranges.column_mean(c))
        .collect();
    info!("Cell midpoints (m): {midpoints:?}");

    let preview = to_record_batch(&data.select_columns(|c| c == "Temp" || c == "Vbeam" || c == "Cell01Amp1"))?;
    println!("{}", pretty_format_batches(&[preview.slice(0, preview.num_rows().min(5))])?);

    let data_path = output_dir.join("merged.parquet");
    let origin_path = output_dir.join("merged_origin.txt");
    write_parquet(&data, &data_path)?;
    write_origin_tab_delimited(&merged.get_origin(), &origin_path)?;

    println!(
        "Wrote {} samples ({} variables) to {}",
        data.len(),
        data.columns().len(),
        data_path.display()
    );
    Ok(())
}
