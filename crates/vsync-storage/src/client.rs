//! Cloudflare R2 object store.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::mirror::ObjectStore;

/// R2 connection settings.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// S3 API endpoint of the account
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// Usually `auto`
    pub region: String,
    /// Base URL mirrored objects are served from (custom domain or r2.dev)
    pub public_url: String,
}

impl R2Config {
    /// Read `R2_*` variables. Everything but `R2_REGION` is required, since a
    /// mirrored object without a public URL is useless to clients.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: required("R2_ENDPOINT_URL")?,
            access_key_id: required("R2_ACCESS_KEY_ID")?,
            secret_access_key: required("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required("R2_BUCKET_NAME")?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_url: required("R2_PUBLIC_URL")?,
        })
    }
}

fn required(name: &str) -> StorageResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| StorageError::Config(format!("{} not set", name)))
}

/// [`ObjectStore`] over an R2 bucket.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
    public_url: String,
}

impl R2Client {
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            public_url: config.public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(R2Config::from_env()?))
    }
}

#[async_trait]
impl ObjectStore for R2Client {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::WriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        debug!(key = %key, size, "Stored object in R2");
        Ok(())
    }

    fn public_url(&self, key: &str) -> StorageResult<String> {
        Ok(format!("{}/{}", self.public_url, key))
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| StorageError::Unreachable(format!("{}: {}", self.bucket, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 5] = [
        "R2_ENDPOINT_URL",
        "R2_ACCESS_KEY_ID",
        "R2_SECRET_ACCESS_KEY",
        "R2_BUCKET_NAME",
        "R2_PUBLIC_URL",
    ];

    fn set_all() {
        std::env::set_var("R2_ENDPOINT_URL", "https://acct.r2.cloudflarestorage.com");
        std::env::set_var("R2_ACCESS_KEY_ID", "id");
        std::env::set_var("R2_SECRET_ACCESS_KEY", "secret");
        std::env::set_var("R2_BUCKET_NAME", "videos");
        std::env::set_var("R2_PUBLIC_URL", "https://cdn.example.com");
        std::env::remove_var("R2_REGION");
    }

    #[test]
    #[serial]
    fn test_config_defaults_region() {
        set_all();
        let config = R2Config::from_env().unwrap();
        assert_eq!(config.region, "auto");
        assert_eq!(config.bucket_name, "videos");
        VARS.iter().for_each(|v| std::env::remove_var(v));
    }

    #[test]
    #[serial]
    fn test_public_url_is_required() {
        set_all();
        std::env::set_var("R2_PUBLIC_URL", " ");
        match R2Config::from_env() {
            Err(StorageError::Config(msg)) => assert!(msg.contains("R2_PUBLIC_URL")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
        VARS.iter().for_each(|v| std::env::remove_var(v));
    }

    #[test]
    fn test_public_url_joins_base_and_key() {
        let client = R2Client::new(R2Config {
            endpoint_url: "http://localhost:9000".to_string(),
            access_key_id: "id".to_string(),
            secret_access_key: "secret".to_string(),
            bucket_name: "videos".to_string(),
            region: "auto".to_string(),
            public_url: "https://cdn.example.com/".to_string(),
        });

        assert_eq!(
            client.public_url("mirror/a/b.jpg").unwrap(),
            "https://cdn.example.com/mirror/a/b.jpg"
        );
    }
}
