//! Synthesis meta info recording
//!
//! After a run, the resolved parameters and timing of every sentence are
//! stored under a freshly generated key. The key goes back to the caller with
//! the audio and can later be exchanged for the record.
//!
//! Records are written once and never expire; retention is left to whoever
//! owns the backing store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::assembler::SegmentTiming;
use crate::error::TtsError;
use crate::params::ResolvedParameters;

/// Timing and parameters of one sentence in an assembled stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimingRecord {
    pub index: usize,
    pub resolved_params: ResolvedParameters,
    pub start_second: f64,
    pub end_second: f64,
    pub length_second: f64,
}

impl TimingRecord {
    pub fn new(index: usize, resolved_params: ResolvedParameters, timing: SegmentTiming) -> Self {
        Self {
            index,
            resolved_params,
            start_second: timing.start_second,
            end_second: timing.end_second,
            length_second: timing.length_second,
        }
    }
}

/// How one response was assembled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SynthesisMetaInfo {
    pub silence_duration: f64,
    pub segments: Vec<TimingRecord>,
}

// =============================================================================
// Stores
// =============================================================================

/// Keyed, write-once storage for meta info records.
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// Store `info` under `key`; fails if the key is already taken.
    async fn put(&self, key: &str, info: &SynthesisMetaInfo) -> Result<(), TtsError>;

    /// Fetch the record stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<SynthesisMetaInfo>, TtsError>;
}

/// Process-local store; records live as long as the process.
#[derive(Default)]
pub struct MemoryMetaStore {
    records: RwLock<HashMap<String, SynthesisMetaInfo>>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MetaStore for MemoryMetaStore {
    async fn put(&self, key: &str, info: &SynthesisMetaInfo) -> Result<(), TtsError> {
        let mut records = self.records.write().await;
        if records.contains_key(key) {
            return Err(TtsError::Store(format!("key already exists: {key}")));
        }
        records.insert(key.to_string(), info.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<SynthesisMetaInfo>, TtsError> {
        Ok(self.records.read().await.get(key).cloned())
    }
}

/// One JSON file per record under a directory.
pub struct FileMetaStore {
    dir: PathBuf,
}

impl FileMetaStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, TtsError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        info!(dir = %dir.display(), "file meta store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl MetaStore for FileMetaStore {
    async fn put(&self, key: &str, info: &SynthesisMetaInfo) -> Result<(), TtsError> {
        use tokio::io::AsyncWriteExt;

        let json = serde_json::to_vec_pretty(info)?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path_for(key))
            .await
            .map_err(|e| TtsError::Store(format!("cannot create record {key}: {e}")))?;
        file.write_all(&json).await?;
        file.flush().await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<SynthesisMetaInfo>, TtsError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Recorder
// =============================================================================

/// Packages per-sentence timings into meta info and stores them by key.
#[derive(Clone)]
pub struct MetaRecorder {
    store: Arc<dyn MetaStore>,
}

impl MetaRecorder {
    pub fn new(store: Arc<dyn MetaStore>) -> Self {
        Self { store }
    }

    /// In-memory recorder
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryMetaStore::new()))
    }

    /// Store a record and return its newly generated key.
    #[instrument(skip(self, segments), fields(segments = segments.len()))]
    pub async fn record(
        &self,
        silence_duration: f64,
        segments: Vec<(ResolvedParameters, SegmentTiming)>,
    ) -> Result<String, TtsError> {
        let info = SynthesisMetaInfo {
            silence_duration,
            segments: segments
                .into_iter()
                .enumerate()
                .map(|(index, (params, timing))| TimingRecord::new(index, params, timing))
                .collect(),
        };

        let key = Uuid::new_v4().to_string();
        self.store.put(&key, &info).await?;
        debug!(key = %key, "meta info recorded");
        Ok(key)
    }

    /// Look up a record by key.
    ///
    /// Keys that are not UUIDs can never have been issued and report
    /// `NotFound` without touching the store.
    pub async fn retrieve(&self, key: &str) -> Result<SynthesisMetaInfo, TtsError> {
        if Uuid::parse_str(key).is_err() {
            return Err(TtsError::NotFound(key.to_string()));
        }
        self.store
            .get(key)
            .await?
            .ok_or_else(|| TtsError::NotFound(key.to_string()))
    }
}
