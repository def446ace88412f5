//! Single-station sensor snapshots given as `key=value` pairs.

use std::collections::BTreeMap;

use tracing::debug;

use crate::IoError;

/// One set of sensor readings, keyed by sensor name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorSnapshot {
    readings: BTreeMap<String, f64>,
}

impl SensorSnapshot {
    /// Parse `key=value` arguments.
    ///
    /// Keys and values are trimmed. Values must be finite floats.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::MalformedSensorPair`] | No `=`, or an empty key |
    /// | [`IoError::InvalidSensorValue`] | Value is not a finite float |
    /// | [`IoError::DuplicateSensorKey`] | Same key given twice |
    pub fn parse<S: AsRef<str>>(pairs: &[S]) -> Result<Self, IoError> {
        let mut readings = BTreeMap::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let Some((key, raw)) = pair.split_once('=') else {
                return Err(IoError::MalformedSensorPair {
                    pair: pair.to_string(),
                });
            };
            let key = key.trim().to_string();
            if key.is_empty() {
                return Err(IoError::MalformedSensorPair {
                    pair: pair.to_string(),
                });
            }
            let value = match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => v,
                _ => {
                    return Err(IoError::InvalidSensorValue {
                        key,
                        raw: raw.to_string(),
                    });
                }
            };
            if readings.insert(key.clone(), value).is_some() {
                return Err(IoError::DuplicateSensorKey { key });
            }
        }
        Ok(Self { readings })
    }

    /// Return the reading for `key`, if given.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.readings.get(key).copied()
    }

    /// Return the number of readings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Return `true` when no readings were given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Lay the readings out in `feature_names` order.
    ///
    /// Features without a reading default to `0.0`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::UnknownSensorKey`] for a reading whose key is not
    /// one of `feature_names`.
    pub fn to_features(&self, feature_names: &[String]) -> Result<Vec<f64>, IoError> {
        if let Some(key) = self
            .readings
            .keys()
            .find(|k| !feature_names.iter().any(|n| n == *k))
        {
            return Err(IoError::UnknownSensorKey {
                key: key.clone(),
                known: feature_names.join(", "),
            });
        }

        let row: Vec<f64> = feature_names
            .iter()
            .map(|name| self.get(name).unwrap_or(0.0))
            .collect();
        debug!(
            supplied = self.readings.len(),
            defaulted = feature_names.len() - self.readings.len(),
            "sensor snapshot mapped to features"
        );
        Ok(row)
    }
}
