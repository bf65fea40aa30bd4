use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client as S3Client,
    config::{Credentials, Region},
    primitives::ByteStream,
};
use backon::{ExponentialBuilder, Retryable};
use tracing::info;

use crate::{settings::AwsSettings, storage::ArtifactStorage};

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(config: &AwsSettings) -> Result<Self> {
        let mut builder = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region.clone()))
            .behavior_version(BehaviorVersion::latest());

        if let Some(endpoint) = &config.endpoint {
            info!("using custom S3 endpoint: {endpoint}");
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "erde-config",
        );
        let client = S3Client::from_conf(builder.credentials_provider(credentials).build());

        info!(bucket = %config.bucket, "S3 artifact storage initialized");
        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }

    async fn upload_with_retry(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = key.to_string();

        let upload = || {
            let client = client.clone();
            let bucket = bucket.clone();
            let key = key.clone();
            let data = data.clone();
            async move {
                client
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .body(ByteStream::from(data))
                    .send()
                    .await
                    .map_err(|e| anyhow!("S3 upload error: {e}"))
            }
        };

        upload
            .retry(ExponentialBuilder::default().with_max_times(5))
            .await
            .context("failed to upload artifact to S3 after retries")?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStorage for S3Storage {
    async fn save(&self, name: &str, contents: &[u8]) -> Result<()> {
        info!(bucket = %self.bucket, key = %name, bytes = contents.len(), "uploading artifact to S3");
        self.upload_with_retry(name, contents.to_vec()).await
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.to_string().contains("NotFound") => Ok(false),
            Err(e) => Err(anyhow!("failed to check if artifact exists: {e}")),
        }
    }

    async fn load(&self, name: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .context("failed to download artifact from S3")?;
        let bytes = response
            .body
            .collect()
            .await
            .context("failed to read artifact body")?
            .into_bytes();
        Ok(bytes.to_vec())
    }

    fn storage_type(&self) -> &'static str {
        "S3"
    }
}
