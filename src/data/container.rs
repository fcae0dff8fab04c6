use chrono::Duration;

use super::config::ConfigParam;
use super::dataset::{DataTable, OriginTable, TabularDataset};
use super::family::{cell_range_table, InstrumentFamily};
use super::filter::acoustic_subset;
use super::model::{DuplicatePolicy, MatchMethod, Timestamp};
use crate::error::{AdvmDataError, DatasetError};

// ---------------------------------------------------------------------------
// AdvmData – acoustic data set of one instrument family
// ---------------------------------------------------------------------------

/// Acoustic observations of one instrument family together with the
/// instrument configuration they were recorded with.
///
/// The container owns its configuration and data set outright: construction
/// stores copies and every accessor hands out copies, so nothing outside can
/// mutate its state.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvmData {
    family: InstrumentFamily,
    configuration: ConfigParam,
    dataset: TabularDataset,
}

impl AdvmData {
    /// Build a container from a reader's output. Only the acoustic variables
    /// of `dataset` (and their provenance) are kept.
    pub fn new(family: InstrumentFamily, dataset: &TabularDataset, configuration: &ConfigParam) -> Self {
        Self {
            family,
            configuration: configuration.snapshot(),
            dataset: acoustic_subset(dataset),
        }
    }

    pub fn family(&self) -> InstrumentFamily {
        self.family
    }

    /// Merge `other` into a new container.
    ///
    /// Fails with [`AdvmDataError::IncompatibleData`] unless both
    /// configurations are compatible, and with [`DatasetError::AmbiguousMerge`]
    /// when both sides observed a variable at the same time and no `policy`
    /// was given. The result keeps the family and configuration of `self`.
    pub fn add_data(
        &self,
        other: &AdvmData,
        policy: Option<DuplicatePolicy>,
    ) -> Result<AdvmData, AdvmDataError> {
        if !self.configuration.is_compatible(&other.configuration) {
            return Err(AdvmDataError::IncompatibleData);
        }

        let dataset = self.dataset.append(&other.dataset, policy)?;

        Ok(AdvmData::new(self.family, &dataset, &self.configuration))
    }

    /// Along-beam distance of every cell midpoint (`R001..R{n}`), replicated
    /// on every timestamp of the data. Computed on each call.
    pub fn get_cell_range(&self) -> Result<DataTable, AdvmDataError> {
        cell_range_table(&self.family, &self.configuration, &self.dataset.data().index())
    }

    pub fn get_configuration(&self) -> ConfigParam {
        self.configuration.snapshot()
    }

    pub fn get_data(&self) -> DataTable {
        self.dataset.data().clone()
    }

    pub fn get_origin(&self) -> OriginTable {
        self.dataset.origin().clone()
    }

    /// Copy of data and provenance together.
    pub fn get_dataset(&self) -> TabularDataset {
        self.dataset.clone()
    }

    pub fn get_variable(&self, variable: &str) -> Result<DataTable, DatasetError> {
        let data = self.dataset.data();
        if !data.has_column(variable) {
            return Err(DatasetError::VariableNotFound(variable.to_string()));
        }
        Ok(data.select_columns(|c| c == variable))
    }

    pub fn get_variable_names(&self) -> Vec<String> {
        self.dataset.data().columns().to_vec()
    }

    pub fn get_variable_observation(
        &self,
        variable: &str,
        time: Timestamp,
        window: Duration,
        method: MatchMethod,
    ) -> Result<f64, DatasetError> {
        self.dataset.get_variable_observation(variable, time, window, method)
    }

    /// Origin labels of one variable.
    pub fn get_variable_origin(&self, variable: &str) -> Result<Vec<String>, DatasetError> {
        let origins = self.dataset.origin().origins_of(variable);
        if origins.is_empty() {
            return Err(DatasetError::VariableNotFound(variable.to_string()));
        }
        Ok(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{argonaut_config, argonaut_dataset, minute};

    #[test]
    fn construction_filters_columns() {
        let mut columns = vec!["Temp".to_string(), "Heading".to_string(), "Cell01Amp1".to_string()];
        let ds = TabularDataset::create_from_rows(
            columns.clone(),
            vec![(minute(0), vec![Some(10.0), Some(180.0), Some(85.0)])],
            "ARG1 (SL)",
        )
        .unwrap();
        let advm = AdvmData::new(InstrumentFamily::Argonaut, &ds, &argonaut_config());

        columns.remove(1);
        assert_eq!(advm.get_variable_names(), columns);
        assert_eq!(advm.get_origin().variables(), columns);
        assert_eq!(advm.get_data().value(&minute(0), "Cell01Amp1"), Some(85.0));
        assert_eq!(advm.get_configuration(), argonaut_config());
    }

    #[test]
    fn accessors_return_copies() {
        let advm = argonaut_dataset(0..5, "ARG1 (SL)");
        let mut config = advm.get_configuration();
        config.set("Cell Size", 2.0).unwrap();
        assert_eq!(advm.get_configuration(), argonaut_config());

        let mut config = argonaut_config();
        let ds = advm.get_dataset();
        let copy = AdvmData::new(InstrumentFamily::Argonaut, &ds, &config);
        config.set("Number of Cells", 3).unwrap();
        assert_eq!(copy.get_cell_range().unwrap().columns().len(), 10);
    }

    #[test]
    fn add_data_disjoint() {
        let a = argonaut_dataset(0..5, "ARG1 (SL)");
        let b = argonaut_dataset(5..10, "ARG2 (SL)");
        let merged = a.add_data(&b, None).unwrap();

        assert_eq!(merged.family(), InstrumentFamily::Argonaut);
        assert_eq!(merged.get_data().len(), 10);
        assert_eq!(merged.get_origin().origins(), vec!["ARG1 (SL)", "ARG2 (SL)"]);

        let ranges = merged.get_cell_range().unwrap();
        let expected = [1.875, 3.625, 5.375, 7.125, 8.875, 10.625, 12.375, 14.125, 15.875, 17.625];
        for (column, e) in ranges.columns().iter().zip(expected) {
            let mean = ranges.column_mean(column).unwrap();
            assert!((mean - e).abs() < 1e-9, "{column}: {mean} != {e}");
        }
    }

    #[test]
    fn add_data_commutes_on_disjoint_timestamps() {
        let a = argonaut_dataset(0..5, "ARG1 (SL)");
        let b = argonaut_dataset(5..10, "ARG2 (SL)");
        let ab = a.add_data(&b, None).unwrap();
        let ba = b.add_data(&a, None).unwrap();
        assert_eq!(ab.get_data(), ba.get_data());
        assert_eq!(ab.get_origin().to_set(), ba.get_origin().to_set());
    }

    #[test]
    fn add_data_commutes_with_different_variables() {
        let a = argonaut_dataset(0..5, "ARG1 (SL)")
            .get_dataset()
            .select_variables(|v| v != "Vbeam");
        let b = argonaut_dataset(5..10, "ARG2 (SL)")
            .get_dataset()
            .select_variables(|v| v == "Temp" || v == "Vbeam");
        let a = AdvmData::new(InstrumentFamily::Argonaut, &a, &argonaut_config());
        let b = AdvmData::new(InstrumentFamily::Argonaut, &b, &argonaut_config());

        let ab = a.add_data(&b, None).unwrap().get_data();
        let ba = b.add_data(&a, None).unwrap().get_data();
        // column order follows the left operand
        assert_ne!(ab.columns(), ba.columns());
        assert!(ab.same_content(&ba));
        assert_eq!(ab.value(&minute(7), "Vbeam"), ba.value(&minute(7), "Vbeam"));
    }

    #[test]
    fn add_data_incompatible() {
        let a = argonaut_dataset(0..5, "ARG1 (SL)");
        let mut config = argonaut_config();
        config.set("Cell Size", 2.0).unwrap();
        let b = AdvmData::new(InstrumentFamily::Argonaut, &argonaut_dataset(5..10, "ARG2 (SL)").get_dataset(), &config);
        assert_eq!(a.add_data(&b, None), Err(AdvmDataError::IncompatibleData));
        assert_eq!(b.add_data(&a, None), Err(AdvmDataError::IncompatibleData));
    }

    #[test]
    fn add_data_unset_configuration_is_incompatible() {
        let ds = argonaut_dataset(0..2, "ARG3 (SL)").get_dataset();
        let a = AdvmData::new(InstrumentFamily::Argonaut, &ds, &ConfigParam::new());
        assert_eq!(a.add_data(&a.clone(), None), Err(AdvmDataError::IncompatibleData));
    }

    #[test]
    fn add_data_concurrent_observations() {
        let a = argonaut_dataset(0..5, "ARG1 (SL)");
        let b = argonaut_dataset(4..8, "ARG2 (SL)");
        assert!(matches!(
            a.add_data(&b, None),
            Err(AdvmDataError::Dataset(DatasetError::AmbiguousMerge { timestamp, .. })) if timestamp == minute(4)
        ));

        let merged = a.add_data(&b, Some(DuplicatePolicy::KeepCurrent)).unwrap();
        assert_eq!(merged.get_data().len(), 8);
        assert_eq!(
            merged.get_data().value(&minute(4), "Temp"),
            a.get_data().value(&minute(4), "Temp")
        );
        let merged = a.add_data(&b, Some(DuplicatePolicy::KeepOther)).unwrap();
        assert_eq!(
            merged.get_data().value(&minute(4), "Temp"),
            b.get_data().value(&minute(4), "Temp")
        );
    }

    #[test]
    fn add_data_with_self_is_idempotent() {
        let a = argonaut_dataset(0..5, "ARG1 (SL)");
        let merged = a.add_data(&a.clone(), Some(DuplicatePolicy::KeepCurrent)).unwrap();
        assert_eq!(merged.get_data(), a.get_data());
        assert_eq!(merged.get_origin(), a.get_origin());
    }

    #[test]
    fn add_data_keeps_left_configuration() {
        let a = argonaut_dataset(0..5, "ARG1 (SL)");
        let mut config = argonaut_config();
        config.set("Number of Beams", 3).unwrap();
        let b = AdvmData::new(InstrumentFamily::Argonaut, &argonaut_dataset(5..6, "ARG2 (SL)").get_dataset(), &config);
        let merged = a.add_data(&b, None).unwrap();
        assert_eq!(merged.get_configuration(), argonaut_config());
        let merged = b.add_data(&a, None).unwrap();
        assert_eq!(merged.get_configuration(), config);
    }

    #[test]
    fn variable_queries() {
        let a = argonaut_dataset(0..5, "ARG1 (SL)");
        let temp = a.get_variable("Temp").unwrap();
        assert_eq!(temp.columns(), &["Temp".to_string()][..]);
        assert_eq!(temp.len(), 5);
        assert_eq!(a.get_variable("Pitch"), Err(DatasetError::VariableNotFound("Pitch".into())));

        assert_eq!(a.get_variable_origin("Cell01SNR2").unwrap(), vec!["ARG1 (SL)"]);
        assert!(a.get_variable_origin("Pitch").is_err());

        let t = a.get_variable_observation("Temp", minute(2), Duration::zero(), MatchMethod::Exact);
        assert_eq!(t, Ok(a.get_data().value(&minute(2), "Temp").unwrap()));
        assert!(matches!(
            a.get_variable_observation("Temp", minute(30), Duration::minutes(2), MatchMethod::Nearest),
            Err(DatasetError::ObservationNotFound { .. })
        ));
    }
}
