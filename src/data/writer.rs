use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, TimestampNanosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use log::debug;
use parquet::arrow::ArrowWriter;

use super::dataset::{DataTable, OriginTable};
use super::model::{DATETIME_COLUMN, DATETIME_FORMAT};
use crate::error::WriterError;

// ---------------------------------------------------------------------------
// Tab-delimited text
// ---------------------------------------------------------------------------

/// Write `DateTime` followed by every column. Absent values are written as
/// empty fields.
pub fn write_tab_delimited(table: &DataTable, path: &Path) -> Result<(), WriterError> {
    debug!("Writing {} rows to {path:?}", table.len());
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;

    let mut header = vec![DATETIME_COLUMN.to_string()];
    header.extend(table.columns().iter().cloned());
    writer.write_record(&header)?;

    for (timestamp, row) in table.rows() {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(timestamp.format(DATETIME_FORMAT).to_string());
        record.extend(row.iter().map(|v| v.map(|v| v.to_string()).unwrap_or_default()));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_origin_tab_delimited(origin: &OriginTable, path: &Path) -> Result<(), WriterError> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    writer.write_record(["variable", "origin"])?;
    for entry in origin.entries() {
        writer.write_record([entry.variable.as_str(), entry.origin.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

/// Arrow view of a table: `DateTime` as Timestamp(Nanosecond) followed by
/// one nullable Float64 column per table column.
pub fn to_record_batch(table: &DataTable) -> Result<RecordBatch, WriterError> {
    let mut fields = vec![Field::new(
        DATETIME_COLUMN,
        DataType::Timestamp(TimeUnit::Nanosecond, None),
        false,
    )];
    fields.extend(
        table
            .columns()
            .iter()
            .map(|c| Field::new(c.as_str(), DataType::Float64, true)),
    );
    let schema = Arc::new(Schema::new(fields));

    let nanos = table
        .rows()
        .map(|(t, _)| {
            t.and_utc()
                .timestamp_nanos_opt()
                .ok_or(WriterError::TimestampOutOfRange(*t))
        })
        .collect::<Result<Vec<i64>, _>>()?;

    let mut arrays: Vec<ArrayRef> = vec![Arc::new(TimestampNanosecondArray::from(nanos))];
    for ci in 0..table.columns().len() {
        let values: Vec<Option<f64>> = table.rows().map(|(_, row)| row[ci]).collect();
        arrays.push(Arc::new(Float64Array::from(values)));
    }

    Ok(RecordBatch::try_new(schema, arrays)?)
}

pub fn write_parquet(table: &DataTable, path: &Path) -> Result<(), WriterError> {
    debug!("Writing {} rows to {path:?}", table.len());
    let batch = to_record_batch(table)?;

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}
