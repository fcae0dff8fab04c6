use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::model::ConfigValue;
use crate::error::{ConfigError, ConfigFileError};

// ---------------------------------------------------------------------------
// ConfigKey – the closed set of configuration parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigKey {
    Frequency,
    EffectiveTransducerDiameter,
    BeamOrientation,
    SlantAngle,
    BlankingDistance,
    CellSize,
    NumberOfCells,
    NumberOfBeams,
    Instrument,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 9] = [
        ConfigKey::Frequency,
        ConfigKey::EffectiveTransducerDiameter,
        ConfigKey::BeamOrientation,
        ConfigKey::SlantAngle,
        ConfigKey::BlankingDistance,
        ConfigKey::CellSize,
        ConfigKey::NumberOfCells,
        ConfigKey::NumberOfBeams,
        ConfigKey::Instrument,
    ];

    /// Keys that must agree for two data sets to be merged.
    pub const COMPATIBILITY: [ConfigKey; 5] = [
        ConfigKey::Frequency,
        ConfigKey::SlantAngle,
        ConfigKey::BlankingDistance,
        ConfigKey::CellSize,
        ConfigKey::NumberOfCells,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::Frequency => "Frequency",
            ConfigKey::EffectiveTransducerDiameter => "Effective Transducer Diameter",
            ConfigKey::BeamOrientation => "Beam Orientation",
            ConfigKey::SlantAngle => "Slant Angle",
            ConfigKey::BlankingDistance => "Blanking Distance",
            ConfigKey::CellSize => "Cell Size",
            ConfigKey::NumberOfCells => "Number of Cells",
            ConfigKey::NumberOfBeams => "Number of Beams",
            ConfigKey::Instrument => "Instrument",
        }
    }

    /// Validation rule of the key.
    pub fn accepts(&self, value: &ConfigValue) -> bool {
        match self {
            ConfigKey::BeamOrientation => {
                matches!(value.as_str(), Some("Horizontal") | Some("Vertical"))
            }
            ConfigKey::NumberOfCells => matches!(value, ConfigValue::Integer(n) if *n >= 1),
            ConfigKey::NumberOfBeams => matches!(value, ConfigValue::Integer(n) if *n >= 0),
            ConfigKey::Instrument => matches!(value.as_str(), Some(s) if !s.is_empty()),
            ConfigKey::Frequency
            | ConfigKey::EffectiveTransducerDiameter
            | ConfigKey::SlantAngle
            | ConfigKey::BlankingDistance
            | ConfigKey::CellSize => matches!(value.as_f64(), Some(v) if v >= 0.0),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ConfigParam – validated instrument configuration
// ---------------------------------------------------------------------------

/// Instrument configuration parameters.
///
/// Every key of [`ConfigKey::ALL`] is always present; keys start out unset and
/// only change through [`ConfigParam::set`] or [`ConfigParam::update`], which
/// validate each value against the rule of its key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, ConfigValue>",
    into = "BTreeMap<String, ConfigValue>"
)]
pub struct ConfigParam {
    values: BTreeMap<ConfigKey, ConfigValue>,
}

impl Default for ConfigParam {
    fn default() -> Self {
        Self {
            values: ConfigKey::ALL
                .iter()
                .map(|k| (*k, ConfigValue::Unset))
                .collect(),
        }
    }
}

impl ConfigParam {
    /// Configuration with every parameter unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON configuration file (`{"Cell Size": 1.75, ...}`).
    /// Every entry is validated; keys absent from the file stay unset.
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigFileError> {
        if !config_path.exists() {
            return Err(ConfigFileError::BadFilePath(config_path.to_path_buf()));
        }

        let json_str = std::fs::read_to_string(config_path)?;

        Ok(serde_json::from_str::<Self>(&json_str)?)
    }

    pub fn get(&self, key: &str) -> Result<&ConfigValue, ConfigError> {
        let key = ConfigKey::from_str(key)?;
        Ok(self.value(key))
    }

    /// Typed access, cannot fail.
    pub fn value(&self, key: ConfigKey) -> &ConfigValue {
        // all keys are inserted on construction and never removed
        static UNSET: ConfigValue = ConfigValue::Unset;
        self.values.get(&key).unwrap_or(&UNSET)
    }

    pub fn set(&mut self, key: &str, value: impl Into<ConfigValue>) -> Result<(), ConfigError> {
        let key = ConfigKey::from_str(key)?;
        self.set_value(key, value)
    }

    pub fn set_value(&mut self, key: ConfigKey, value: impl Into<ConfigValue>) -> Result<(), ConfigError> {
        let value = value.into();
        if !key.accepts(&value) {
            return Err(ConfigError::InvalidValue {
                key: key.as_str().to_string(),
                value,
            });
        }
        self.values.insert(key, value);
        Ok(())
    }

    /// Apply [`ConfigParam::set`] to every entry in iteration order.
    ///
    /// Not atomic: the first rejected entry aborts the update and the entries
    /// before it stay applied.
    pub fn update<I, K, V>(&mut self, entries: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ConfigValue>,
    {
        for (key, value) in entries {
            self.set(key.as_ref(), value)?;
        }
        Ok(())
    }

    /// Exact comparison of the [`ConfigKey::COMPATIBILITY`] keys.
    ///
    /// Inherits NaN semantics from the unset sentinel: a configuration with
    /// any of those keys unset is compatible with nothing, itself included.
    pub fn is_compatible(&self, other: &ConfigParam) -> bool {
        ConfigKey::COMPATIBILITY
            .iter()
            .all(|key| self.value(*key) == other.value(*key))
    }

    /// Independent copy of the configuration.
    pub fn snapshot(&self) -> ConfigParam {
        self.clone()
    }

    pub fn keys(&self) -> impl Iterator<Item = ConfigKey> + '_ {
        self.values.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConfigKey, &ConfigValue)> + '_ {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// Copy of the parameters keyed by their display names.
    pub fn to_map(&self) -> BTreeMap<String, ConfigValue> {
        self.values
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.clone()))
            .collect()
    }

    pub(crate) fn float(&self, key: ConfigKey) -> Option<f64> {
        self.value(key).as_f64()
    }
}

impl PartialEq for ConfigParam {
    /// Same value on every key, with a key unset on both sides counting as
    /// equal. Use [`ConfigParam::is_compatible`] to decide whether data sets
    /// may be merged.
    fn eq(&self, other: &Self) -> bool {
        self.iter()
            .zip(other.iter())
            .all(|((ka, va), (kb, vb))| ka == kb && ((va.is_unset() && vb.is_unset()) || va == vb))
    }
}

impl TryFrom<BTreeMap<String, ConfigValue>> for ConfigParam {
    type Error = ConfigError;

    fn try_from(map: BTreeMap<String, ConfigValue>) -> Result<Self, Self::Error> {
        let mut config = ConfigParam::new();
        // null entries in a file mean "leave unset"
        config.update(map.into_iter().filter(|(_, v)| !v.is_unset()))?;
        Ok(config)
    }
}

impl From<ConfigParam> for BTreeMap<String, ConfigValue> {
    fn from(config: ConfigParam) -> Self {
        config.to_map()
    }
}

impl fmt::Display for ConfigParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .values
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect();
        write!(f, "{{{}}}", entries.join(", "))
    }
}
