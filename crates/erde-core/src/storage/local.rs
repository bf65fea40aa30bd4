use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::storage::ArtifactStorage;

pub struct LocalFileStorage {
    base_dir: PathBuf,
}

impl LocalFileStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn resolve_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }
}

#[async_trait]
impl ArtifactStorage for LocalFileStorage {
    async fn save(&self, name: &str, contents: &[u8]) -> Result<()> {
        let path = self.resolve_path(name);
        info!("saving artifact to local file: {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, contents).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.resolve_path(name);
        Ok(tokio::fs::try_exists(&path)
            .await
            .map_err(|e| {
                warn!("failed to check artifact existence: {e}");
                e
            })
            .unwrap_or(false))
    }

    async fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve_path(name);
        tokio::fs::read(&path)
            .await
            .context("failed to read artifact file")
    }

    fn storage_type(&self) -> &'static str {
        "LocalFile"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_saved_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path().to_path_buf());

        assert!(!storage.exists("summary.txt").await.unwrap());
        storage.save("summary.txt", b"hello").await.unwrap();
        assert!(storage.exists("summary.txt").await.unwrap());
        let loaded = storage.load("summary.txt").await.unwrap();
        assert_eq!(loaded, b"hello");
    }

    #[tokio::test]
    async fn writes_through_a_temp_file_rename() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path().to_path_buf());
        storage.save("nested/rewards.csv", b"a,b\n1,2").await.unwrap();
        assert!(!dir.path().join("nested/rewards.csv.tmp").exists());
        assert!(dir.path().join("nested/rewards.csv").exists());
    }
}
