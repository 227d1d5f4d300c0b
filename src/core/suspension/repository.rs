use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::types::{SuspensionError, WorkflowSuspension};

/// Storage for suspension records.
///
/// `take` hands a record out exactly once: it is removed as it is read, so two
/// concurrent resumes of the same suspension cannot both succeed.
#[async_trait]
pub trait SuspensionRepository: Send + Sync {
    async fn save(&self, suspension: &WorkflowSuspension) -> Result<(), SuspensionError>;
    async fn load(&self, id: &str) -> Result<Option<WorkflowSuspension>, SuspensionError>;
    async fn take(&self, id: &str) -> Result<WorkflowSuspension, SuspensionError>;
    async fn delete(&self, id: &str) -> Result<(), SuspensionError>;
}

#[derive(Default)]
pub struct MemorySuspensionRepository {
    records: Mutex<HashMap<String, WorkflowSuspension>>,
}

impl MemorySuspensionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl SuspensionRepository for MemorySuspensionRepository {
    async fn save(&self, suspension: &WorkflowSuspension) -> Result<(), SuspensionError> {
        self.records
            .lock()
            .insert(suspension.id.clone(), suspension.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<WorkflowSuspension>, SuspensionError> {
        Ok(self.records.lock().get(id).cloned())
    }

    async fn take(&self, id: &str) -> Result<WorkflowSuspension, SuspensionError> {
        self.records
            .lock()
            .remove(id)
            .ok_or_else(|| SuspensionError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), SuspensionError> {
        self.records.lock().remove(id);
        Ok(())
    }
}

/// One JSON file per record: `<dir>/<id>.suspension.json`.
pub struct FileSuspensionRepository {
    dir: PathBuf,
    // serializes take() so a record is claimed once within this process
    claim: tokio::sync::Mutex<()>,
}

impl FileSuspensionRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            claim: tokio::sync::Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        let safe: String = id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.suspension.json", safe))
    }
}

fn storage_err(e: std::io::Error) -> SuspensionError {
    SuspensionError::Storage(e.to_string())
}

#[async_trait]
impl SuspensionRepository for FileSuspensionRepository {
    async fn save(&self, suspension: &WorkflowSuspension) -> Result<(), SuspensionError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(storage_err)?;
        let path = self.path_for(&suspension.id);
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(suspension)?;
        tokio::fs::write(&tmp, data).await.map_err(storage_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(storage_err)?;
        debug!(suspension_id = %suspension.id, path = %path.display(), "suspension saved");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<WorkflowSuspension>, SuspensionError> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn take(&self, id: &str) -> Result<WorkflowSuspension, SuspensionError> {
        let _guard = self.claim.lock().await;
        let record = self
            .load(id)
            .await?
            .ok_or_else(|| SuspensionError::NotFound(id.to_string()))?;
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(record),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SuspensionError::NotFound(id.to_string()))
            }
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), SuspensionError> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err(e)),
        }
    }
}
