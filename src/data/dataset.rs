use std::collections::{BTreeMap, BTreeSet};

use chrono::Duration;

use super::model::{DuplicatePolicy, MatchMethod, Timestamp};
use crate::error::DatasetError;

/// One row of a [`DataTable`]; `None` marks an absent observation.
pub type Row = Vec<Option<f64>>;

/// Seconds from `a` to `b`.
pub(crate) fn seconds_between(a: Timestamp, b: Timestamp) -> f64 {
    let delta = b - a;
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 / 1e9,
        None => delta.num_seconds() as f64,
    }
}

fn linear(t0: Timestamp, v0: f64, t1: Timestamp, v1: f64, t: Timestamp) -> f64 {
    let span = seconds_between(t0, t1);
    if span == 0.0 {
        return v0;
    }
    v0 + (v1 - v0) * seconds_between(t0, t) / span
}

// ---------------------------------------------------------------------------
// DataTable – timestamp-indexed numeric columns
// ---------------------------------------------------------------------------

/// Named numeric columns indexed by a unique, ordered timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    columns: Vec<String>,
    rows: BTreeMap<Timestamp, Row>,
}

impl DataTable {
    /// Empty table with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: BTreeMap::new(),
        }
    }

    /// Build a table from raw rows. NaN values are stored as absent.
    pub fn from_rows<I>(columns: Vec<String>, rows: I) -> Result<Self, DatasetError>
    where
        I: IntoIterator<Item = (Timestamp, Row)>,
    {
        let mut table = DataTable::new(columns);
        for (timestamp, values) in rows {
            table.insert_row(timestamp, values)?;
        }
        Ok(table)
    }

    pub fn insert_row(&mut self, timestamp: Timestamp, values: Row) -> Result<(), DatasetError> {
        if values.len() != self.columns.len() {
            return Err(DatasetError::RowLengthMismatch {
                timestamp,
                expected: self.columns.len(),
                found: values.len(),
            });
        }
        if self.rows.contains_key(&timestamp) {
            return Err(DatasetError::DuplicateTimestamp(timestamp));
        }
        let values = values
            .into_iter()
            .map(|v| v.filter(|v| !v.is_nan()))
            .collect();
        self.rows.insert(timestamp, values);
        Ok(())
    }

    /// Same timestamps, columns and values, whatever the column order.
    pub fn same_content(&self, other: &DataTable) -> bool {
        if self.len() != other.len() || self.columns.len() != other.columns.len() {
            return false;
        }
        let Some(order) = self
            .columns
            .iter()
            .map(|c| other.column_index(c))
            .collect::<Option<Vec<usize>>>()
        else {
            return false;
        };
        self.rows.iter().zip(other.rows.iter()).all(|((ta, ra), (tb, rb))| {
            ta == tb && order.iter().enumerate().all(|(i, j)| ra[i] == rb[*j])
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn index(&self) -> Vec<Timestamp> {
        self.rows.keys().copied().collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = (&Timestamp, &Row)> {
        self.rows.iter()
    }

    pub fn row(&self, timestamp: &Timestamp) -> Option<&Row> {
        self.rows.get(timestamp)
    }

    pub fn value(&self, timestamp: &Timestamp, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.rows.get(timestamp).and_then(|row| row[idx])
    }

    /// Every row's value of one column, absent values included.
    pub fn column(&self, name: &str) -> Result<Vec<(Timestamp, Option<f64>)>, DatasetError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| DatasetError::VariableNotFound(name.to_string()))?;
        Ok(self.rows.iter().map(|(t, row)| (*t, row[idx])).collect())
    }

    /// Present observations of one column.
    pub fn observations(&self, name: &str) -> Result<Vec<(Timestamp, f64)>, DatasetError> {
        Ok(self
            .column(name)?
            .into_iter()
            .filter_map(|(t, v)| v.map(|v| (t, v)))
            .collect())
    }

    /// Mean of the present values of a column.
    pub fn column_mean(&self, name: &str) -> Option<f64> {
        let observations = self.observations(name).ok()?;
        if observations.is_empty() {
            return None;
        }
        let sum: f64 = observations.iter().map(|(_, v)| v).sum();
        Some(sum / observations.len() as f64)
    }

    /// Copy of the table restricted to the columns accepted by `keep`,
    /// in their original order.
    pub fn select_columns<F>(&self, keep: F) -> DataTable
    where
        F: Fn(&str) -> bool,
    {
        let kept: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| keep(c))
            .map(|(i, _)| i)
            .collect();
        DataTable {
            columns: kept.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|(t, row)| (*t, kept.iter().map(|&i| row[i]).collect()))
                .collect(),
        }
    }

    /// Outer join on the index. Columns of `other` are appended after the
    /// columns of `self`; where both tables carry a column, present values of
    /// `self` take precedence.
    pub fn join(&self, other: &DataTable) -> DataTable {
        let mut columns = self.columns.clone();
        for c in &other.columns {
            if !columns.contains(c) {
                columns.push(c.clone());
            }
        }
        let self_idx: Vec<Option<usize>> = columns.iter().map(|c| self.column_index(c)).collect();
        let other_idx: Vec<Option<usize>> = columns.iter().map(|c| other.column_index(c)).collect();

        let timestamps: BTreeSet<&Timestamp> = self.rows.keys().chain(other.rows.keys()).collect();
        let rows = timestamps
            .into_iter()
            .map(|t| {
                let srow = self.rows.get(t);
                let orow = other.rows.get(t);
                let row = (0..columns.len())
                    .map(|ci| {
                        let s = srow.and_then(|r| self_idx[ci].and_then(|i| r[i]));
                        let o = orow.and_then(|r| other_idx[ci].and_then(|i| r[i]));
                        s.or(o)
                    })
                    .collect();
                (*t, row)
            })
            .collect();

        DataTable { columns, rows }
    }

    /// Resample the table onto `index`, linearly in time between present
    /// observations. After the last observation of a column its value is
    /// carried forward; before the first it stays absent.
    pub fn interpolate_onto(&self, index: &[Timestamp]) -> DataTable {
        let observations: Vec<Vec<(Timestamp, f64)>> = (0..self.columns.len())
            .map(|ci| {
                self.rows
                    .iter()
                    .filter_map(|(t, row)| row[ci].map(|v| (*t, v)))
                    .collect()
            })
            .collect();

        let rows = index
            .iter()
            .map(|t| {
                let row = observations
                    .iter()
                    .map(|obs| {
                        let after = obs.partition_point(|(ot, _)| ot < t);
                        match (after.checked_sub(1).map(|i| obs[i]), obs.get(after)) {
                            (_, Some((nt, nv))) if nt == t => Some(*nv),
                            (Some((pt, pv)), Some((nt, nv))) => Some(linear(pt, pv, *nt, *nv, *t)),
                            (Some((_, pv)), None) => Some(pv),
                            (None, _) => None,
                        }
                    })
                    .collect();
                (*t, row)
            })
            .collect();

        DataTable {
            columns: self.columns.clone(),
            rows,
        }
    }
}

// ---------------------------------------------------------------------------
// OriginTable – provenance of the variables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OriginEntry {
    pub variable: String,
    pub origin: String,
}

/// `(variable, origin)` relation recording which source contributed each
/// variable. A variable has one entry per contributing source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OriginTable {
    entries: Vec<OriginEntry>,
}

impl OriginTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute every column to a single source label.
    pub fn for_columns(columns: &[String], origin: &str) -> Self {
        let mut table = OriginTable::new();
        for c in columns {
            table.push(c, origin);
        }
        table
    }

    /// Add an entry. An identical `(variable, origin)` pair is stored once,
    /// so the table is a set of pairs: a source that contributes the same
    /// variable through both sides of a merge is listed a single time.
    pub fn push(&mut self, variable: &str, origin: &str) {
        let entry = OriginEntry {
            variable: variable.to_string(),
            origin: origin.to_string(),
        };
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
    }

    pub fn entries(&self) -> &[OriginEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct variables, in order of first appearance.
    pub fn variables(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.entries
            .iter()
            .filter(|e| seen.insert(e.variable.as_str()))
            .map(|e| e.variable.clone())
            .collect()
    }

    /// Distinct origin labels, in order of first appearance.
    pub fn origins(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.entries
            .iter()
            .filter(|e| seen.insert(e.origin.as_str()))
            .map(|e| e.origin.clone())
            .collect()
    }

    /// Origin labels of one variable.
    pub fn origins_of(&self, variable: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.variable == variable)
            .map(|e| e.origin.clone())
            .collect()
    }

    pub fn select_variables<F>(&self, keep: F) -> OriginTable
    where
        F: Fn(&str) -> bool,
    {
        OriginTable {
            entries: self
                .entries
                .iter()
                .filter(|e| keep(&e.variable))
                .cloned()
                .collect(),
        }
    }

    /// Entries as a set, for order-independent comparison.
    pub fn to_set(&self) -> BTreeSet<OriginEntry> {
        self.entries.iter().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// TabularDataset – data plus provenance
// ---------------------------------------------------------------------------

/// A [`DataTable`] together with the [`OriginTable`] describing where its
/// variables came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularDataset {
    data: DataTable,
    origin: OriginTable,
}

impl TabularDataset {
    pub fn new(data: DataTable, origin: OriginTable) -> Self {
        Self { data, origin }
    }

    /// Dataset whose every column is attributed to `source_label`.
    pub fn from_table(data: DataTable, source_label: &str) -> Self {
        let origin = OriginTable::for_columns(data.columns(), source_label);
        Self { data, origin }
    }

    pub fn create_from_rows<I>(
        columns: Vec<String>,
        rows: I,
        source_label: &str,
    ) -> Result<Self, DatasetError>
    where
        I: IntoIterator<Item = (Timestamp, Row)>,
    {
        Ok(Self::from_table(DataTable::from_rows(columns, rows)?, source_label))
    }

    pub fn data(&self) -> &DataTable {
        &self.data
    }

    pub fn origin(&self) -> &OriginTable {
        &self.origin
    }

    pub fn into_parts(self) -> (DataTable, OriginTable) {
        (self.data, self.origin)
    }

    /// Restrict data and provenance to the variables accepted by `keep`.
    pub fn select_variables<F>(&self, keep: F) -> TabularDataset
    where
        F: Fn(&str) -> bool,
    {
        TabularDataset {
            data: self.data.select_columns(&keep),
            origin: self.origin.select_variables(&keep),
        }
    }

    /// Merge `other` into a copy of `self`.
    ///
    /// Rows are united by timestamp and columns by name. When both sides hold
    /// a value for the same variable at the same time, `policy` decides which
    /// one is kept; without a policy the merge fails with
    /// [`DatasetError::AmbiguousMerge`]. A side's provenance entry for a
    /// variable is dropped when every value it held for that variable lost a
    /// conflict. The remaining entries are united as a set of
    /// `(variable, origin)` pairs (see [`OriginTable::push`]).
    pub fn append(
        &self,
        other: &TabularDataset,
        policy: Option<DuplicatePolicy>,
    ) -> Result<TabularDataset, DatasetError> {
        let mut columns = self.data.columns.clone();
        for c in &other.data.columns {
            if !columns.contains(c) {
                columns.push(c.clone());
            }
        }
        let self_idx: Vec<Option<usize>> = columns.iter().map(|c| self.data.column_index(c)).collect();
        let other_idx: Vec<Option<usize>> = columns.iter().map(|c| other.data.column_index(c)).collect();

        if policy.is_none() {
            for (t, srow) in &self.data.rows {
                let Some(orow) = other.data.rows.get(t) else {
                    continue;
                };
                for (ci, col) in columns.iter().enumerate() {
                    if let (Some(si), Some(oi)) = (self_idx[ci], other_idx[ci]) {
                        if srow[si].is_some() && orow[oi].is_some() {
                            return Err(DatasetError::AmbiguousMerge {
                                variable: col.clone(),
                                timestamp: *t,
                            });
                        }
                    }
                }
            }
        }

        let mut self_held = BTreeSet::new();
        let mut self_kept = BTreeSet::new();
        let mut other_held = BTreeSet::new();
        let mut other_kept = BTreeSet::new();

        let timestamps: BTreeSet<&Timestamp> =
            self.data.rows.keys().chain(other.data.rows.keys()).collect();
        let mut rows = BTreeMap::new();
        for t in timestamps {
            let srow = self.data.rows.get(t);
            let orow = other.data.rows.get(t);
            let mut row = Vec::with_capacity(columns.len());
            for ci in 0..columns.len() {
                let s = srow.and_then(|r| self_idx[ci].and_then(|i| r[i]));
                let o = orow.and_then(|r| other_idx[ci].and_then(|i| r[i]));
                if s.is_some() {
                    self_held.insert(ci);
                }
                if o.is_some() {
                    other_held.insert(ci);
                }
                let value = match (s, o) {
                    (Some(_), Some(o)) if policy == Some(DuplicatePolicy::KeepOther) => {
                        other_kept.insert(ci);
                        Some(o)
                    }
                    (Some(s), _) => {
                        self_kept.insert(ci);
                        Some(s)
                    }
                    (None, Some(o)) => {
                        other_kept.insert(ci);
                        Some(o)
                    }
                    (None, None) => None,
                };
                row.push(value);
            }
            rows.insert(*t, row);
        }

        let lost = |held: &BTreeSet<usize>, kept: &BTreeSet<usize>, variable: &str| {
            columns
                .iter()
                .position(|c| c == variable)
                .map(|ci| held.contains(&ci) && !kept.contains(&ci))
                .unwrap_or(false)
        };

        let mut origin = OriginTable::new();
        for e in &self.origin.entries {
            if !lost(&self_held, &self_kept, &e.variable) {
                origin.push(&e.variable, &e.origin);
            }
        }
        for e in &other.origin.entries {
            if !lost(&other_held, &other_kept, &e.variable) {
                origin.push(&e.variable, &e.origin);
            }
        }

        Ok(TabularDataset {
            data: DataTable { columns, rows },
            origin,
        })
    }

    /// Look up one observation of `variable` near `time`.
    ///
    /// `window` is the full width of the search interval centred on `time`.
    pub fn get_variable_observation(
        &self,
        variable: &str,
        time: Timestamp,
        window: Duration,
        method: MatchMethod,
    ) -> Result<f64, DatasetError> {
        let ci = self
            .data
            .column_index(variable)
            .ok_or_else(|| DatasetError::VariableNotFound(variable.to_string()))?;
        let not_found = || DatasetError::ObservationNotFound {
            variable: variable.to_string(),
            timestamp: time,
        };

        let exact = self.data.rows.get(&time).and_then(|row| row[ci]);
        let half = window.max(Duration::zero()) / 2;
        let start = time.checked_sub_signed(half).unwrap_or(Timestamp::MIN);
        let end = time.checked_add_signed(half).unwrap_or(Timestamp::MAX);
        let in_window: Vec<(Timestamp, f64)> = self
            .data
            .rows
            .range(start..=end)
            .filter_map(|(t, row)| row[ci].map(|v| (*t, v)))
            .collect();

        match method {
            MatchMethod::Exact => exact.ok_or_else(not_found),
            MatchMethod::Nearest => in_window
                .iter()
                .min_by_key(|(t, _)| if *t >= time { *t - time } else { time - *t })
                .map(|(_, v)| *v)
                .ok_or_else(not_found),
            MatchMethod::Mean => {
                if in_window.is_empty() {
                    return Err(not_found());
                }
                let sum: f64 = in_window.iter().map(|(_, v)| v).sum();
                Ok(sum / in_window.len() as f64)
            }
            MatchMethod::Interpolate => {
                if let Some(v) = exact {
                    return Ok(v);
                }
                let before = in_window.iter().rev().find(|(t, _)| *t < time);
                let after = in_window.iter().find(|(t, _)| *t > time);
                match (before, after) {
                    (Some((t0, v0)), Some((t1, v1))) => Ok(linear(*t0, *v0, *t1, *v1, time)),
                    _ => Err(not_found()),
                }
            }
        }
    }
}
