//! services/api/src/adapters/blob.rs
//!
//! Implementations of the `BlobStoreService` port: PDF bytes on the local
//! filesystem, or in process memory for tests and ephemeral deployments.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use pdf_exchange_core::ports::{BlobStoreService, BlobStream, PortError, PortResult};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tokio_util::io::ReaderStream;

//=========================================================================================
// Filesystem
//=========================================================================================

/// Stores each blob as one file directly under `root`.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the root directory if it does not exist yet.
    pub async fn ensure_root(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PortResult<PathBuf> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\'])
            && !key.contains('\0');
        if !valid {
            return Err(PortError::Unexpected(format!("Invalid blob key '{key}'")));
        }
        Ok(self.root.join(key))
    }
}

fn io_error(e: std::io::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

#[async_trait]
impl BlobStoreService for FsBlobStore {
    async fn put(&self, key: &str, content: Bytes) -> PortResult<()> {
        let path = self.path_for(key)?;
        let partial = path.with_extension("partial");

        tokio::fs::create_dir_all(&self.root).await.map_err(io_error)?;
        // Write under a temporary name first so readers never see half a file.
        tokio::fs::write(&partial, &content).await.map_err(io_error)?;
        tokio::fs::rename(&partial, &path).await.map_err(io_error)
    }

    async fn open(&self, key: &str) -> PortResult<BlobStream> {
        let path = self.path_for(key)?;
        let file = tokio::fs::File::open(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => PortError::NotFound(format!("Blob {key} not found")),
            _ => io_error(e),
        })?;
        Ok(ReaderStream::new(file).map_err(io_error).boxed())
    }

    async fn delete(&self, key: &str) -> PortResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }
}

//=========================================================================================
// Memory
//=========================================================================================

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl BlobStoreService for MemoryBlobStore {
    async fn put(&self, key: &str, content: Bytes) -> PortResult<()> {
        self.blobs.write().await.insert(key.to_string(), content);
        Ok(())
    }

    async fn open(&self, key: &str) -> PortResult<BlobStream> {
        let content = self
            .blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Blob {key} not found")))?;
        Ok(stream::once(async move { Ok::<_, PortError>(content) }).boxed())
    }

    async fn delete(&self, key: &str) -> PortResult<()> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}
