use actix_web::web::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use log::{debug, warn};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const MAX_FILENAME_CHARS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to create temp directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to create temp file {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write temp file: {0}")]
    Write(#[from] std::io::Error),
    #[error("Upload stream failed: {0}")]
    Stream(String),
    #[error("Upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("Temp file is no longer open for writing")]
    Closed,
}

/// Hands out uniquely named temp files under one directory.
#[derive(Debug, Clone)]
pub struct TempArtifactStore {
    root: PathBuf,
    max_bytes: u64,
}

/// A request's on-disk copy of its upload. Deleted on `release` or drop,
/// whichever comes first.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    created_at: DateTime<Utc>,
    file: Option<tokio::fs::File>,
    released: bool,
}

impl TempArtifactStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StorageError::CreateDir {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root, max_bytes })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn generate_file_name(original: &str, created_at: DateTime<Utc>, token: Uuid) -> String {
        format!(
            "temp_{}_{}_{}",
            created_at.format("%Y%m%dT%H%M%S%6f"),
            token.simple(),
            sanitize_file_name(original)
        )
    }

    pub async fn acquire(&self, original_filename: &str) -> Result<TempArtifact, StorageError> {
        let created_at = Utc::now();
        let name = Self::generate_file_name(original_filename, created_at, Uuid::new_v4());
        let path = self.root.join(name);

        // create_new refuses to open an existing file, so two live handles can
        // never share a path even if the token ever repeated.
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| StorageError::Create {
                path: path.clone(),
                source,
            })?;

        debug!("Acquired temp artifact {}", path.display());
        Ok(TempArtifact {
            path,
            created_at,
            file: Some(file),
            released: false,
        })
    }

    /// Streams every chunk into the artifact and closes it. Returns the byte count.
    pub async fn write<S, E>(
        &self,
        artifact: &mut TempArtifact,
        content: S,
    ) -> Result<u64, StorageError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let mut file = artifact.file.take().ok_or(StorageError::Closed)?;
        let mut content = std::pin::pin!(content);
        let mut written: u64 = 0;

        while let Some(chunk) = content.next().await {
            let chunk = chunk.map_err(|e| StorageError::Stream(e.to_string()))?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(StorageError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        debug!("Wrote {} bytes to {}", written, artifact.path.display());
        Ok(written)
    }

    pub fn release(&self, artifact: &mut TempArtifact) {
        artifact.release();
    }
}

impl TempArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Deletes the backing file. Safe to call any number of times; a file that
    /// is already gone is not an error and other delete failures are only logged.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.file = None;

        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Released temp artifact {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete temp artifact {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        self.release();
    }
}

/// Keeps only the final path component of an untrusted filename, restricted to
/// characters that are safe in any filesystem.
pub fn sanitize_file_name(original: &str) -> String {
    let base = original
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    let cleaned: String = cleaned
        .chars()
        .rev()
        .take(MAX_FILENAME_CHARS)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
