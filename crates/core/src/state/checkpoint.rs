//! Session checkpoint stores.
//!
//! A checkpoint maps a session id to the last `PipelineState` of a completed
//! turn. Turns read the checkpoint at the start and write it back only after
//! finishing without a fatal error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use vk_protocol::state_models::PipelineState;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Failed to access checkpoint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt checkpoint {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A stored session state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub session_id: String,
    pub saved_at: DateTime<Utc>,
    pub state: PipelineState,
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    async fn save(&self, session_id: &str, state: &PipelineState) -> Result<(), CheckpointError>;

    async fn delete(&self, session_id: &str) -> Result<(), CheckpointError>;
}

/// Process-local store.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Arc<Mutex<HashMap<String, Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.checkpoints.lock().await.len()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.checkpoints.lock().await.get(session_id).cloned())
    }

    async fn save(&self, session_id: &str, state: &PipelineState) -> Result<(), CheckpointError> {
        let checkpoint = Checkpoint {
            session_id: session_id.to_string(),
            saved_at: Utc::now(),
            state: state.clone(),
        };
        self.checkpoints
            .lock()
            .await
            .insert(session_id.to_string(), checkpoint);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), CheckpointError> {
        self.checkpoints.lock().await.remove(session_id);
        Ok(())
    }
}

/// One JSON file per session under a directory.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a session. Characters outside `[A-Za-z0-9_-]` become `_`.
    pub fn path_for(&self, session_id: &str) -> PathBuf {
        let name: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(session_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CheckpointError::Io { path, source }),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| CheckpointError::Serialization { path, source })
    }

    async fn save(&self, session_id: &str, state: &PipelineState) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| CheckpointError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.path_for(session_id);
        let checkpoint = Checkpoint {
            session_id: session_id.to_string(),
            saved_at: Utc::now(),
            state: state.clone(),
        };
        let json = serde_json::to_string_pretty(&checkpoint).map_err(|source| {
            CheckpointError::Serialization {
                path: path.clone(),
                source,
            }
        })?;

        // Readers only ever see a complete file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| CheckpointError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| CheckpointError::Io { path, source })
    }

    async fn delete(&self, session_id: &str) -> Result<(), CheckpointError> {
        let path = self.path_for(session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Io { path, source }),
        }
    }
}
