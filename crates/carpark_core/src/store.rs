//! Persistence of the full charging point snapshot.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::ChargingPoint;

const STATE_FILE_NAME: &str = "state.json";
const TMP_FILE_NAME: &str = "state.json.tmp";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Could not encode or decode state file {path}: {source}")]
    Encoding {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Charging point {name} appears more than once in the stored state")]
    DuplicatePoint { name: String },
}

/// Reads and writes the complete state of all charging points.
pub trait StateStore: Send + Sync {
    /// Return the last saved snapshot keyed by point name, or `None` if
    /// nothing was saved yet.
    fn read_state(&self) -> Result<Option<BTreeMap<String, ChargingPoint>>, StoreError>;

    /// Replace the saved snapshot with `points`.
    fn save_state(&self, points: &[ChargingPoint]) -> Result<(), StoreError>;
}

fn into_map(points: Vec<ChargingPoint>) -> Result<BTreeMap<String, ChargingPoint>, StoreError> {
    let mut map = BTreeMap::new();
    for point in points {
        let name = point.name().to_string();
        if map.insert(name.clone(), point).is_some() {
            return Err(StoreError::DuplicatePoint { name });
        }
    }
    Ok(map)
}

/// Keeps the state as `state.json` inside a directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    directory: PathBuf,
}

impl FileStateStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        FileStateStore {
            directory: directory.into(),
        }
    }

    pub fn state_file(&self) -> PathBuf {
        self.directory.join(STATE_FILE_NAME)
    }

    fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl StateStore for FileStateStore {
    fn read_state(&self) -> Result<Option<BTreeMap<String, ChargingPoint>>, StoreError> {
        let path = self.state_file();
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::info!("No state file found at {}", path.display());
                return Ok(None);
            }
            Err(err) => return Err(Self::io_error(&path)(err)),
        };
        tracing::info!("Found existing state file at {}", path.display());

        let points: Vec<ChargingPoint> =
            serde_json::from_slice(&content).map_err(|source| StoreError::Encoding {
                path: path.clone(),
                source,
            })?;
        into_map(points).map(Some)
    }

    fn save_state(&self, points: &[ChargingPoint]) -> Result<(), StoreError> {
        let path = self.state_file();
        let tmp_path = self.directory.join(TMP_FILE_NAME);
        tracing::debug!("Writing state file to {}", path.display());

        if !self.directory.exists() {
            tracing::info!("Creating directories at {}", self.directory.display());
            fs::create_dir_all(&self.directory).map_err(Self::io_error(&self.directory))?;
        }

        let content = serde_json::to_vec(points).map_err(|source| StoreError::Encoding {
            path: path.clone(),
            source,
        })?;

        // Readers only ever see a complete file
        let mut file = fs::File::create(&tmp_path).map_err(Self::io_error(&tmp_path))?;
        file.write_all(&content)
            .and_then(|_| file.sync_all())
            .map_err(Self::io_error(&tmp_path))?;
        fs::rename(&tmp_path, &path).map_err(Self::io_error(&path))
    }
}

/// Keeps the state in memory. Clones share the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    snapshot: Arc<Mutex<Option<Vec<ChargingPoint>>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last saved snapshot, if any.
    pub fn snapshot(&self) -> Option<Vec<ChargingPoint>> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StateStore for MemoryStateStore {
    fn read_state(&self) -> Result<Option<BTreeMap<String, ChargingPoint>>, StoreError> {
        self.snapshot().map(into_map).transpose()
    }

    fn save_state(&self, points: &[ChargingPoint]) -> Result<(), StoreError> {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(points.to_vec());
        Ok(())
    }
}
