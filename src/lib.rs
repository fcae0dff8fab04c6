//! Acoustic Doppler velocity meter (ADVM) data sets.
//!
//! An [`AdvmData`] holds the acoustic observations of one instrument family
//! (SonTek Argonaut, Nortek Aquadopp, Nortek EZQ, SonTek SL 3G) together with
//! the [`ConfigParam`] they were recorded with and a per-variable record of
//! which source file contributed the values. Data sets recorded with
//! compatible configurations can be merged with [`AdvmData::add_data`].
//!
//! Readers for the instrument file formats live in [`data::loader`] and
//! exporters in [`data::writer`].

pub mod data;
pub mod error;

pub use data::config::{ConfigKey, ConfigParam};
pub use data::container::AdvmData;
pub use data::dataset::{DataTable, OriginEntry, OriginTable, TabularDataset};
pub use data::family::{CellGeometry, InstrumentFamily};
pub use data::model::{ConfigValue, DuplicatePolicy, MatchMethod, Timestamp};
pub use error::{
    AdvmDataError, ConfigError, ConfigFileError, DatasetError, ReaderError, WriterError,
};
