use std::collections::HashMap;
use std::error;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::model::HistoricalRecord;
use crate::source::{LoadedRecords, parse_records, SourceError, SourceOptions};


#[derive(Clone, Debug)]
pub enum CacheError {
    Io { path: PathBuf, error: Arc<io::Error> },
    Parse { path: PathBuf, error: Arc<SourceError> },
    Join(String),
}
impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io { path, error }
                => write!(f, "failed to read {}: {}", path.display(), error),
            CacheError::Parse { path, error }
                => write!(f, "failed to parse {}: {}", path.display(), error),
            CacheError::Join(e)
                => write!(f, "loader task failed: {}", e),
        }
    }
}
impl error::Error for CacheError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            CacheError::Io { error, .. } => Some(error.as_ref()),
            CacheError::Parse { error, .. } => Some(error.as_ref()),
            CacheError::Join(_) => None,
        }
    }
}


#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct InitSummary {
    pub record_count: usize,
    pub duplicates_dropped: usize,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub initialized: bool,
    pub record_count: usize,
    pub loaded_at: Option<DateTime<Utc>>,
    pub loads_completed: u64,
}


#[derive(Debug, Default)]
struct Snapshot {
    records: Vec<HistoricalRecord>,
    // station ID -> line -> indices into records, in insertion order
    index: HashMap<String, HashMap<String, Vec<usize>>>,
    loaded_at: Option<DateTime<Utc>>,
}
impl Snapshot {
    fn build(records: Vec<HistoricalRecord>, loaded_at: DateTime<Utc>) -> Self {
        let mut index: HashMap<String, HashMap<String, Vec<usize>>> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            index
                .entry(record.station_id.clone())
                .or_default()
                .entry(record.line_num.clone())
                .or_default()
                .push(i);
        }
        Self {
            records,
            index,
            loaded_at: Some(loaded_at),
        }
    }

    fn matching(&self, station_id: &str, line_num: &str) -> Vec<HistoricalRecord> {
        let indices = match self.index.get(station_id).and_then(|lines| lines.get(line_num)) {
            Some(i) => i,
            None => return Vec::new(),
        };
        indices.iter()
            .map(|i| self.records[*i].clone())
            .collect()
    }
}


/// In-memory store of historical ridership records backed by a CSV source file.
///
/// The store starts out empty. [`HistoryCache::initialize`] (re)loads the source file and
/// atomically replaces the contents; [`HistoryCache::query`] reads them. Concurrent
/// initializations are coalesced: whoever waited on a load in progress receives its outcome.
#[derive(Debug)]
pub struct HistoryCache {
    source_path: PathBuf,
    options: SourceOptions,
    snapshot: RwLock<Arc<Snapshot>>,
    init_lock: Mutex<Option<Result<InitSummary, CacheError>>>,
    loads_completed: AtomicU64,
}
impl HistoryCache {
    pub fn new(source_path: PathBuf, options: SourceOptions) -> Self {
        Self {
            source_path,
            options,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            init_lock: Mutex::new(None),
            loads_completed: AtomicU64::new(0),
        }
    }

    /// Creates a store that is already populated with the given records.
    pub fn from_records(source_path: PathBuf, options: SourceOptions, records: Vec<HistoricalRecord>) -> Self {
        Self {
            source_path,
            options,
            snapshot: RwLock::new(Arc::new(Snapshot::build(records, Utc::now()))),
            init_lock: Mutex::new(None),
            loads_completed: AtomicU64::new(0),
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub async fn initialize(&self) -> Result<InitSummary, CacheError> {
        let loads_on_entry = self.loads_completed.load(Ordering::Acquire);
        let mut last_outcome = self.init_lock.lock().await;

        if self.loads_completed.load(Ordering::Acquire) != loads_on_entry {
            if let Some(outcome) = last_outcome.as_ref() {
                debug!("joining the outcome of a concurrent cache load");
                return outcome.clone();
            }
        }

        let outcome = self.load().await;
        *last_outcome = Some(outcome.clone());
        self.loads_completed.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    async fn load(&self) -> Result<InitSummary, CacheError> {
        let path = self.source_path.clone();
        let options = self.options;
        let loaded_res = tokio::task::spawn_blocking(move || read_source(&path, &options)).await;
        let loaded = match loaded_res {
            Ok(Ok(l)) => l,
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(CacheError::Join(e.to_string())),
        };

        let loaded_at = Utc::now();
        let summary = InitSummary {
            record_count: loaded.records.len(),
            duplicates_dropped: loaded.duplicates_dropped,
            loaded_at,
        };
        let snapshot = Snapshot::build(loaded.records, loaded_at);
        *self.snapshot.write().await = Arc::new(snapshot);

        info!(
            path = %self.source_path.display(),
            record_count = summary.record_count,
            duplicates_dropped = summary.duplicates_dropped,
            "historical ridership cache loaded",
        );
        Ok(summary)
    }

    /// Returns the records for the given station on the given line, in source order.
    pub async fn query(&self, station_id: &str, line_num: &str) -> Vec<HistoricalRecord> {
        let snapshot = Arc::clone(&*self.snapshot.read().await);
        snapshot.matching(station_id, line_num)
    }

    pub async fn status(&self) -> CacheStatus {
        let snapshot = Arc::clone(&*self.snapshot.read().await);
        CacheStatus {
            initialized: snapshot.loaded_at.is_some(),
            record_count: snapshot.records.len(),
            loaded_at: snapshot.loaded_at,
            loads_completed: self.loads_completed.load(Ordering::Acquire),
        }
    }
}


fn read_source(path: &Path, options: &SourceOptions) -> Result<LoadedRecords, CacheError> {
    let file = File::open(path)
        .map_err(|e| CacheError::Io { path: path.to_owned(), error: Arc::new(e) })?;
    parse_records(BufReader::new(file), options)
        .map_err(|e| CacheError::Parse { path: path.to_owned(), error: Arc::new(e) })
}
