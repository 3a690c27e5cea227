mod allocator;
mod models;
mod report;
mod store;

pub use crate::models::*;
pub use crate::report::*;
pub use crate::store::*;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::allocator::Points;
use crate::models::CurrentTiers;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParkError {
    #[error("Charging point {name} is not configured")]
    NotFound { name: String },
    #[error("Max current of {max_current}A not sufficient to plug in {name}")]
    CapacityExceeded { name: String, max_current: u32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} has to be greater than 0")]
    NonPositiveCurrent { field: &'static str },
    #[error("highCurrent ({high_current}A) has to be greater than lowCurrent ({low_current}A)")]
    HighNotAboveLow { high_current: u32, low_current: u32 },
    #[error("At least one charging point has to be configured")]
    NoChargingPoints,
    #[error("Charging point names must not be empty")]
    EmptyName,
    #[error("Charging point {name} is configured more than once")]
    DuplicateName { name: String },
    #[error(
        "Configuration does not match recovered state, please delete the state file \
         (configured: {configured:?}, recovered: {recovered:?})"
    )]
    Mismatch {
        configured: Vec<String>,
        recovered: Vec<String>,
    },
    #[error("Recovered state of {name} does not fit the configured currents, please delete the state file")]
    InconsistentState { name: String },
    #[error("Recovered state draws {allocated}A, more than the configured {max_current}A")]
    RecoveredOverCapacity { allocated: u64, max_current: u32 },
}

/// Distributes the park's current between its charging points.
///
/// Every point plugged in gets the high current if it fits under the
/// ceiling, the low current otherwise. Room for new cars is made by
/// throttling the cars charging the longest; room freed by a leaving car
/// is handed back in plug-in order.
///
/// All operations go through one lock, and the state is saved inside it
/// after every plug-in and plug-off.
pub struct ChargingPark {
    tiers: CurrentTiers,
    points: Mutex<Points>,
    store: Box<dyn StateStore>,
    reporter: Box<dyn Reporter>,
    clock: Box<dyn Clock>,
}

impl ChargingPark {
    /// Build the park, recovering the previous state from `store` when there is one.
    pub fn new(config: &ParkConfig, store: impl StateStore + 'static) -> Result<Self, ConfigError> {
        Self::with_collaborators(config, store, TracingReporter, SystemClock)
    }

    pub fn with_collaborators(
        config: &ParkConfig,
        store: impl StateStore + 'static,
        reporter: impl Reporter + 'static,
        clock: impl Clock + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let tiers = config.tiers();

        let points = match store.read_state() {
            Ok(Some(recovered)) => Self::check_recovered(config, &tiers, recovered)?,
            Ok(None) => Self::unplugged(config),
            Err(err) => {
                reporter.report_warning(&StoreWarning::ReadFailed(err));
                Self::unplugged(config)
            }
        };

        Ok(ChargingPark {
            tiers,
            points: Mutex::new(points),
            store: Box::new(store),
            reporter: Box::new(reporter),
            clock: Box::new(clock),
        })
    }

    fn unplugged(config: &ParkConfig) -> Points {
        config
            .names
            .iter()
            .map(|name| (name.clone(), ChargingPoint::new(name.as_str())))
            .collect()
    }

    fn check_recovered(
        config: &ParkConfig,
        tiers: &CurrentTiers,
        recovered: BTreeMap<String, ChargingPoint>,
    ) -> Result<Points, ConfigError> {
        let configured: BTreeSet<&String> = config.names.iter().collect();
        let recovered_names: BTreeSet<&String> = recovered.keys().collect();
        if configured != recovered_names {
            tracing::error!("The configuration seems to have changed since the last run.");
            return Err(ConfigError::Mismatch {
                configured: configured.into_iter().cloned().collect(),
                recovered: recovered_names.into_iter().cloned().collect(),
            });
        }

        if let Some(point) = recovered.values().find(|point| !point.is_consistent(tiers)) {
            return Err(ConfigError::InconsistentState {
                name: point.name().to_string(),
            });
        }
        let allocated = allocator::allocated_current(&recovered);
        if allocated > u64::from(tiers.max) {
            return Err(ConfigError::RecoveredOverCapacity {
                allocated,
                max_current: tiers.max,
            });
        }
        Ok(recovered)
    }

    fn lock(&self) -> MutexGuard<'_, Points> {
        // Nothing panics while the map is half updated
        self.points.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, points: &Points) {
        let snapshot: Vec<ChargingPoint> = points.values().cloned().collect();
        if let Err(err) = self.store.save_state(&snapshot) {
            self.reporter.report_warning(&StoreWarning::SaveFailed(err));
        }
    }

    fn check_point<'a>(points: &'a Points, name: &str) -> Result<&'a ChargingPoint, ParkError> {
        points.get(name).ok_or_else(|| {
            tracing::error!("CP {} is not configured", name);
            ParkError::NotFound {
                name: name.to_string(),
            }
        })
    }

    /// Timestamp for a new plug-in, later than every plugged point's.
    fn next_timestamp(&self, points: &Points) -> u64 {
        let newest = points
            .values()
            .map(ChargingPoint::plug_in_timestamp)
            .max()
            .unwrap_or(0);
        self.clock.now_millis().max(newest.saturating_add(1))
    }

    /// A car plugged in at `name`.
    ///
    /// Plugging in an occupied point changes nothing. Fails without touching
    /// any point if not even the low current is left.
    pub fn plug_in(&self, name: &str) -> Result<ChargingPoint, ParkError> {
        tracing::info!("Received plug-in-message for {}", name);
        let mut points = self.lock();
        let point = Self::check_point(&points, name)?;

        if !point.is_plugged() {
            let mut next = points.clone();
            allocator::throttle(&mut next, &self.tiers);

            let allocated = allocator::allocated_current(&next);
            let max = u64::from(self.tiers.max);
            if allocated + u64::from(self.tiers.low) > max {
                tracing::warn!("Max current not sufficient. Can't add car at {}", name);
                return Err(ParkError::CapacityExceeded {
                    name: name.to_string(),
                    max_current: self.tiers.max,
                });
            }

            let current = if allocated + u64::from(self.tiers.high) <= max {
                self.tiers.high
            } else {
                self.tiers.low
            };
            let timestamp = self.next_timestamp(&next);
            if let Some(point) = next.get_mut(name) {
                point.plug_in(current, timestamp);
            }
            *points = next;
        }

        self.persist(&points);
        Ok(points[name].clone())
    }

    /// The car at `name` left. Its current goes to the slow charging points.
    pub fn plug_off(&self, name: &str) -> Result<ChargingPoint, ParkError> {
        tracing::info!("Received plug-off-message for {}", name);
        let mut points = self.lock();
        let point = Self::check_point(&points, name)?;

        if point.is_plugged() {
            if let Some(point) = points.get_mut(name) {
                point.plug_off();
            }
            allocator::boost(&mut points, &self.tiers);
        }

        self.persist(&points);
        Ok(points[name].clone())
    }

    /// The current in Ampere `name` may draw, 0 if unplugged.
    pub fn get_allowed_current(&self, name: &str) -> Result<u32, ParkError> {
        let points = self.lock();
        Self::check_point(&points, name).map(ChargingPoint::current)
    }

    /// Copies of all points, sorted by name.
    pub fn get_charging_points(&self) -> Vec<ChargingPoint> {
        self.lock().values().cloned().collect()
    }

    /// Sum of the current granted to plugged points.
    pub fn allocated_current(&self) -> u64 {
        allocator::allocated_current(&self.lock())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    const MAX_CURRENT: u32 = 40;
    const HIGH_CURRENT: u32 = 20;
    const LOW_CURRENT: u32 = 10;

    fn default_config() -> ParkConfig {
        ParkConfig {
            names: vec!["CP1".into(), "CP2".into(), "CP3".into(), "CP4".into()],
            max_current: MAX_CURRENT,
            high_current: HIGH_CURRENT,
            low_current: LOW_CURRENT,
        }
    }

    fn default_park() -> ChargingPark {
        ChargingPark::new(&default_config(), MemoryStateStore::new())
            .expect("Could not create the park")
    }

    #[derive(Clone, Default)]
    struct RecordingReporter {
        warnings: Arc<Mutex<Vec<String>>>,
    }

    impl Reporter for RecordingReporter {
        fn report_warning(&self, warning: &StoreWarning) {
            self.warnings.lock().unwrap().push(warning.to_string());
        }
    }

    /// Clock stuck at one instant.
    struct FixedClock(AtomicU64);

    impl Clock for FixedClock {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct BrokenStore;

    impl StateStore for BrokenStore {
        fn read_state(&self) -> Result<Option<BTreeMap<String, ChargingPoint>>, StoreError> {
            Err(StoreError::DuplicatePoint { name: "CP1".into() })
        }

        fn save_state(&self, _points: &[ChargingPoint]) -> Result<(), StoreError> {
            Err(StoreError::Io {
                path: "/dev/null/state.json".into(),
                source: std::io::Error::other("disk full"),
            })
        }
    }

    #[test]
    fn test_add_points_with_high_current() {
        let park = default_park();
        park.plug_in("CP1").unwrap();
        park.plug_in("CP2").unwrap();

        assert_eq!(park.get_allowed_current("CP1").unwrap(), HIGH_CURRENT);
        assert_eq!(park.get_allowed_current("CP2").unwrap(), HIGH_CURRENT);
    }

    #[test]
    fn test_new_point_high_and_oldest_throttled() {
        let park = default_park();
        park.plug_in("CP1").unwrap();
        park.plug_in("CP2").unwrap();
        let cp3 = park.plug_in("CP3").unwrap();

        assert_eq!(cp3.current(), HIGH_CURRENT);
        assert_eq!(park.get_allowed_current("CP1").unwrap(), LOW_CURRENT);
        assert_eq!(park.get_allowed_current("CP2").unwrap(), LOW_CURRENT);
        assert_eq!(park.get_allowed_current("CP3").unwrap(), HIGH_CURRENT);
    }

    #[test]
    fn test_plug_off_boosts_again() {
        let park = default_park();
        park.plug_in("CP1").unwrap();
        park.plug_in("CP2").unwrap();
        park.plug_in("CP3").unwrap();
        let cp2 = park.plug_off("CP2").unwrap();

        assert!(!cp2.is_plugged());
        assert_eq!(park.get_allowed_current("CP1").unwrap(), HIGH_CURRENT);
        assert_eq!(park.get_allowed_current("CP3").unwrap(), HIGH_CURRENT);
        assert_eq!(park.get_allowed_current("CP2").unwrap(), 0);
    }

    #[test]
    fn test_all_points_low_current() {
        let park = default_park();
        for name in &default_config().names {
            park.plug_in(name).unwrap();
        }
        for name in &default_config().names {
            assert_eq!(park.get_allowed_current(name).unwrap(), LOW_CURRENT);
        }
    }

    #[test]
    fn test_list_of_points() {
        let park = default_park();
        for name in ["CP1", "CP2", "CP3"] {
            park.plug_in(name).unwrap();
        }

        let points = park.get_charging_points();
        let names: Vec<&str> = points.iter().map(ChargingPoint::name).collect();
        assert_eq!(names, vec!["CP1", "CP2", "CP3", "CP4"]);
        assert!(points[..3].iter().all(ChargingPoint::is_plugged));
        assert!(!points[3].is_plugged());
    }

    #[test]
    fn test_plug_in_twice_changes_nothing() {
        let park = default_park();
        let first = park.plug_in("CP1").unwrap();
        let before = park.get_charging_points();
        let second = park.plug_in("CP1").unwrap();

        assert_eq!(first, second);
        assert_eq!(park.get_charging_points(), before);
        assert_eq!(park.get_allowed_current("CP1").unwrap(), HIGH_CURRENT);
        assert_eq!(park.get_allowed_current("CP2").unwrap(), 0);
    }

    #[test]
    fn test_plug_off_unplugged_still_persists() {
        let store = MemoryStateStore::new();
        let park = ChargingPark::new(&default_config(), store.clone()).unwrap();
        assert!(store.snapshot().is_none());

        let cp1 = park.plug_off("CP1").unwrap();
        assert_eq!(cp1, ChargingPoint::new("CP1"));
        assert_eq!(store.snapshot().unwrap(), park.get_charging_points());
    }

    #[test]
    fn test_unknown_point() {
        let park = default_park();
        let not_found = ParkError::NotFound {
            name: "CP666".into(),
        };
        assert_eq!(park.plug_in("CP666"), Err(not_found.clone()));
        assert_eq!(park.plug_off("CP666"), Err(not_found.clone()));
        assert_eq!(park.get_allowed_current("CP666"), Err(not_found.clone()));

        park.plug_in("CP1").unwrap();
        assert_eq!(park.get_allowed_current("CP666"), Err(not_found));
    }

    #[test]
    fn test_capacity_exceeded_changes_nothing() {
        let config = ParkConfig {
            names: (1..=5).map(|i| format!("CP{i}")).collect(),
            ..default_config()
        };
        let store = MemoryStateStore::new();
        let park = ChargingPark::new(&config, store.clone()).unwrap();
        for name in ["CP1", "CP2", "CP3", "CP4"] {
            park.plug_in(name).unwrap();
        }
        let before = park.get_charging_points();
        let saved = store.snapshot();

        assert_eq!(
            park.plug_in("CP5"),
            Err(ParkError::CapacityExceeded {
                name: "CP5".into(),
                max_current: MAX_CURRENT,
            })
        );
        assert_eq!(park.get_charging_points(), before);
        assert_eq!(store.snapshot(), saved);
    }

    #[test]
    fn test_throttle_rolled_back_on_capacity_exceeded() {
        let config = ParkConfig {
            max_current: 35,
            high_current: 15,
            low_current: 10,
            ..default_config()
        };
        let store = MemoryStateStore::new();
        let park = ChargingPark::new(&config, store.clone()).unwrap();
        park.plug_in("CP1").unwrap();
        park.plug_in("CP2").unwrap();
        park.plug_in("CP3").unwrap();
        assert_eq!(park.get_allowed_current("CP3").unwrap(), 15);
        assert_eq!(park.allocated_current(), 35);
        let saved = store.snapshot();

        // Throttling CP3 leaves 30A, still no room for another 10A
        assert!(matches!(
            park.plug_in("CP4"),
            Err(ParkError::CapacityExceeded { .. })
        ));
        assert_eq!(park.get_allowed_current("CP3").unwrap(), 15);
        assert_eq!(park.get_allowed_current("CP4").unwrap(), 0);
        assert_eq!(store.snapshot(), saved);
    }

    #[test]
    fn test_recover_previous_state() {
        let store = MemoryStateStore::new();
        let park = ChargingPark::new(&default_config(), store.clone()).unwrap();
        park.plug_in("CP1").unwrap();
        park.plug_in("CP2").unwrap();
        park.plug_in("CP3").unwrap();
        let before = park.get_charging_points();
        drop(park);

        let mut config = default_config();
        config.names.reverse();
        let recovered = ChargingPark::new(&config, store).unwrap();
        assert_eq!(recovered.get_charging_points(), before);
    }

    #[test]
    fn test_recover_with_other_points_fails() {
        let store = MemoryStateStore::new();
        ChargingPark::new(&default_config(), store.clone())
            .unwrap()
            .plug_in("CP1")
            .unwrap();

        let config = ParkConfig {
            names: vec!["CP1".into(), "CP2".into(), "CP3".into(), "CP5".into()],
            ..default_config()
        };
        match ChargingPark::new(&config, store) {
            Err(ConfigError::Mismatch {
                configured,
                recovered,
            }) => {
                assert!(configured.contains(&"CP5".to_string()));
                assert!(recovered.contains(&"CP4".to_string()));
            }
            Err(other) => panic!("Expected Mismatch error, got {other}"),
            Ok(_) => panic!("Expected Mismatch error"),
        }
    }

    #[test]
    fn test_recover_with_changed_currents_fails() {
        let store = MemoryStateStore::new();
        ChargingPark::new(&default_config(), store.clone())
            .unwrap()
            .plug_in("CP1")
            .unwrap();

        let config = ParkConfig {
            high_current: 16,
            ..default_config()
        };
        assert!(matches!(
            ChargingPark::new(&config, store),
            Err(ConfigError::InconsistentState { name }) if name == "CP1"
        ));
    }

    #[test]
    fn test_unreadable_state_starts_empty() {
        let reporter = RecordingReporter::default();
        let park = ChargingPark::with_collaborators(
            &default_config(),
            BrokenStore,
            reporter.clone(),
            SystemClock,
        )
        .unwrap();

        assert!(park.get_charging_points().iter().all(|p| !p.is_plugged()));
        let warnings = reporter.warnings.lock().unwrap().clone();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Could not recover state"));
    }

    #[test]
    fn test_failed_save_keeps_memory_state() {
        let reporter = RecordingReporter::default();
        let park = ChargingPark::with_collaborators(
            &default_config(),
            BrokenStore,
            reporter.clone(),
            SystemClock,
        )
        .unwrap();

        let cp1 = park.plug_in("CP1").unwrap();
        assert_eq!(cp1.current(), HIGH_CURRENT);
        assert_eq!(park.get_allowed_current("CP1").unwrap(), HIGH_CURRENT);

        let warnings = reporter.warnings.lock().unwrap().clone();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].starts_with("Failed to save current state"));
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let clock = FixedClock(AtomicU64::new(1000));
        let config = ParkConfig {
            max_current: 50,
            ..default_config()
        };
        let park = ChargingPark::with_collaborators(
            &config,
            MemoryStateStore::new(),
            TracingReporter,
            clock,
        )
        .unwrap();

        // Plugged in reverse name order within the same millisecond
        park.plug_in("CP2").unwrap();
        park.plug_in("CP1").unwrap();
        let cp3 = park.plug_in("CP3").unwrap();

        let points = park.get_charging_points();
        assert_eq!(points[1].plug_in_timestamp(), 1000);
        assert_eq!(points[0].plug_in_timestamp(), 1001);
        assert_eq!(cp3.plug_in_timestamp(), 1002);
        // CP2 came first, so it is the one throttled
        assert_eq!(points[1].current(), LOW_CURRENT);
        assert_eq!(points[0].current(), HIGH_CURRENT);
    }

    #[test]
    fn test_recovered_timestamp_at_max() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("state.json"),
            r#"[
              {"name":"CP1","plugged":true,"current":20,"plugInTimestamp":18446744073709551615},
              {"name":"CP2","plugged":false,"current":0,"plugInTimestamp":0},
              {"name":"CP3","plugged":false,"current":0,"plugInTimestamp":0},
              {"name":"CP4","plugged":false,"current":0,"plugInTimestamp":0}
            ]"#,
        )
        .unwrap();
        let park = ChargingPark::new(&default_config(), FileStateStore::new(dir.path())).unwrap();

        let cp2 = park.plug_in("CP2").unwrap();
        assert_eq!(cp2.current(), HIGH_CURRENT);
        assert_eq!(cp2.plug_in_timestamp(), u64::MAX);

        // Same timestamp, CP1 comes first by name and is throttled first
        park.plug_in("CP3").unwrap();
        assert_eq!(park.get_allowed_current("CP1").unwrap(), LOW_CURRENT);
        assert_eq!(park.get_allowed_current("CP2").unwrap(), LOW_CURRENT);
        assert_eq!(park.get_allowed_current("CP3").unwrap(), HIGH_CURRENT);
        assert!(park.allocated_current() <= u64::from(MAX_CURRENT));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ParkConfig {
            high_current: 5,
            ..default_config()
        };
        assert!(matches!(
            ChargingPark::new(&config, MemoryStateStore::new()),
            Err(ConfigError::HighNotAboveLow { .. })
        ));
    }

    #[test]
    fn test_concurrent_plug_ins_respect_max_current() {
        let config = ParkConfig {
            names: (1..=10).map(|i| format!("CP{i:02}")).collect(),
            max_current: 100,
            high_current: 20,
            low_current: 10,
        };
        let park = Arc::new(ChargingPark::new(&config, MemoryStateStore::new()).unwrap());

        let handles: Vec<_> = config
            .names
            .iter()
            .cloned()
            .map(|name| {
                let park = Arc::clone(&park);
                std::thread::spawn(move || park.plug_in(&name))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(park.allocated_current(), 100);
        assert!(park
            .get_charging_points()
            .iter()
            .all(|p| p.is_plugged() && p.current() == 10));
    }
}
