pub mod local;
pub mod s3;

use async_trait::async_trait;

pub use local::LocalFileStorage;
pub use s3::S3Storage;

/// Where a run's per-epoch artifacts (snapshot/weights/rewards CSVs,
/// Merkle JSON, summary text) are persisted. One implementation per
/// [`crate::settings::StorageBackend`] variant.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    async fn save(&self, name: &str, contents: &[u8]) -> anyhow::Result<()>;
    async fn load(&self, name: &str) -> anyhow::Result<Vec<u8>>;
    async fn exists(&self, name: &str) -> anyhow::Result<bool>;
    fn storage_type(&self) -> &'static str;
}
