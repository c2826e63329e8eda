use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arcane_advocate_core::{now_millis, CaseRecord, HistoryDocument};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode history document: {0}")]
    Encode(#[source] serde_json::Error),
}

/// History document backed by a single JSON file.
///
/// Clones share one writer lock, so initialization, `write`, and `append` on the same
/// store never interleave inside this process.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
    writer: Arc<Mutex<()>>,
}

impl JsonStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), writer: Arc::new(Mutex::new(())) }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the document, degrading to the empty default on any failure.
    ///
    /// A missing file is initialized on disk first.
    #[must_use]
    pub fn read(&self) -> HistoryDocument {
        match self.try_read() {
            Ok(doc) => doc,
            Err(err) => {
                tracing::warn!(error = %err, "history unreadable; using empty default");
                HistoryDocument::default()
            }
        }
    }

    /// Read the document, initializing it to the empty default when absent.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read or parsed, or when the
    /// default document cannot be written.
    pub fn try_read(&self) -> Result<HistoryDocument, StoreError> {
        if !self.path.exists() {
            let _guard = self.lock();
            self.ensure_initialized()?;
        }
        self.load()
    }

    /// Overwrite the document. Failures are logged and reported as `false`.
    #[must_use = "a failed write leaves the previous document in place"]
    pub fn write(&self, doc: &HistoryDocument) -> bool {
        let _guard = self.lock();
        match self.persist(doc) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %err, "failed to save history");
                false
            }
        }
    }

    /// Append one case, filling in its timestamp when absent, and return it as stored.
    ///
    /// # Errors
    /// Returns an error when the current document cannot be read or the updated
    /// document cannot be written. The file is left untouched in both cases.
    pub fn append(&self, mut record: CaseRecord) -> Result<CaseRecord, StoreError> {
        let _guard = self.lock();
        self.ensure_initialized()?;
        let mut doc = self.load()?;
        record.stamp_timestamp_with(now_millis);
        doc.cases.push(record.clone());
        self.persist(&doc)?;
        tracing::debug!(
            case_id = record.id().as_deref().unwrap_or("<none>"),
            cases = doc.cases.len(),
            "case appended"
        );
        Ok(record)
    }

    fn ensure_initialized(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            return Ok(());
        }
        tracing::info!(path = %self.path.display(), "initializing history document");
        self.persist(&HistoryDocument::default())
    }

    fn load(&self) -> Result<HistoryDocument, StoreError> {
        let bytes = fs::read(&self.path)
            .map_err(|source| StoreError::Read { path: self.path.clone(), source })?;
        serde_json::from_slice(&bytes)
            .map_err(|source| StoreError::Parse { path: self.path.clone(), source })
    }

    fn persist(&self, doc: &HistoryDocument) -> Result<(), StoreError> {
        let mut body = serde_json::to_vec_pretty(doc).map_err(StoreError::Encode)?;
        body.push(b'\n');
        self.replace_file(&body)
            .map_err(|source| StoreError::Write { path: self.path.clone(), source })
    }

    fn replace_file(&self, body: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staging = self.staging_path();
        let result = write_synced(&staging, body).and_then(|()| fs::rename(&staging, &self.path));
        if result.is_err() {
            let _ = fs::remove_file(&staging);
        }
        result
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(ToOwned::to_owned).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn write_synced(path: &Path, body: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(body)?;
    file.sync_all()
}
