use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// The static configuration of a car park: which charging points exist and
/// how much current can be shared between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkConfig {
    pub names: Vec<String>,
    /// Total current available to the park in Ampere
    pub max_current: u32,
    /// Current granted to a point for fast charging in Ampere
    pub high_current: u32,
    /// Current granted to a point for slow charging in Ampere
    pub low_current: u32,
}

impl ParkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("maxCurrent", self.max_current),
            ("highCurrent", self.high_current),
            ("lowCurrent", self.low_current),
        ] {
            if value == 0 {
                return Err(ConfigError::NonPositiveCurrent { field });
            }
        }
        if self.high_current <= self.low_current {
            return Err(ConfigError::HighNotAboveLow {
                high_current: self.high_current,
                low_current: self.low_current,
            });
        }
        if self.names.is_empty() {
            return Err(ConfigError::NoChargingPoints);
        }

        let mut seen = HashSet::new();
        for name in &self.names {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyName);
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateName { name: name.clone() });
            }
        }
        Ok(())
    }

    pub(crate) fn tiers(&self) -> CurrentTiers {
        CurrentTiers {
            max: self.max_current,
            high: self.high_current,
            low: self.low_current,
        }
    }
}

/// The two current values a plugged point may receive and the ceiling
/// their sum must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CurrentTiers {
    pub(crate) max: u32,
    pub(crate) high: u32,
    pub(crate) low: u32,
}

/// A charging point and its status.
///
/// Only the engine mutates points; everything handed out is a copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChargingPoint {
    name: String,
    plugged: bool,
    current: u32,
    /// Epoch milliseconds of the last plug-in, 0 while unplugged
    plug_in_timestamp: u64,
}

impl ChargingPoint {
    pub fn new(name: impl Into<String>) -> Self {
        ChargingPoint {
            name: name.into(),
            plugged: false,
            current: 0,
            plug_in_timestamp: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_plugged(&self) -> bool {
        self.plugged
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn plug_in_timestamp(&self) -> u64 {
        self.plug_in_timestamp
    }

    pub(crate) fn set_current(&mut self, current: u32) {
        self.current = current;
    }

    pub(crate) fn plug_in(&mut self, current: u32, timestamp: u64) {
        self.plugged = true;
        self.current = current;
        self.plug_in_timestamp = timestamp;
    }

    pub(crate) fn plug_off(&mut self) {
        self.plugged = false;
        self.current = 0;
        self.plug_in_timestamp = 0;
    }

    /// Check the per-point invariants against the configured tiers.
    pub(crate) fn is_consistent(&self, tiers: &CurrentTiers) -> bool {
        if self.plugged {
            self.current == tiers.high || self.current == tiers.low
        } else {
            self.current == 0 && self.plug_in_timestamp == 0
        }
    }
}

/// One line of the park report: `CP01 OCCUPIED 20A` or `CP06 AVAILABLE`.
impl fmt::Display for ChargingPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.plugged {
            write!(f, "{} OCCUPIED {}A", self.name, self.current)
        } else {
            write!(f, "{} AVAILABLE", self.name)
        }
    }
}
