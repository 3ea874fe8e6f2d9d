//! Mirroring of remote assets into owned storage.
//!
//! Each source URL is fetched and written under a key derived only from the
//! URL itself, so retried deliveries overwrite the same objects instead of
//! accumulating copies.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};
use url::Url;

use vsync_models::MirroredAsset;

use crate::error::{StorageError, StorageResult};

/// Default prefix for mirrored objects.
pub const DEFAULT_KEY_PREFIX: &str = "mirror";

/// Default per-fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;

/// Default maximum size of a single mirrored object (25 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 25 * 1024 * 1024;

/// An object written to owned storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Storage key
    pub key: String,
    /// Public URL the object is served from
    pub url: String,
    /// URL the bytes were fetched from
    pub source_url: String,
    pub size: u64,
}

impl From<StoredObject> for MirroredAsset {
    fn from(obj: StoredObject) -> Self {
        MirroredAsset {
            key: obj.key,
            url: obj.url,
        }
    }
}

/// Byte-level object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `data` under `key`, replacing any existing object.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()>;

    /// Public URL for `key`.
    fn public_url(&self, key: &str) -> StorageResult<String>;

    async fn check_connectivity(&self) -> StorageResult<()>;
}

/// Copies remote files into owned storage.
#[async_trait]
pub trait AssetUploader: Send + Sync {
    /// Fetch and store each URL. Results are returned in input order, one per
    /// URL; a failure for one URL does not affect the others.
    async fn upload_from_urls(&self, urls: &[String]) -> Vec<StorageResult<StoredObject>>;

    async fn check_connectivity(&self) -> StorageResult<()>;
}

/// Mirror configuration.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub key_prefix: String,
    pub fetch_timeout: Duration,
    pub max_bytes: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl MirrorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            key_prefix: std::env::var("MIRROR_KEY_PREFIX")
                .ok()
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            fetch_timeout: Duration::from_secs(
                std::env::var("MIRROR_FETCH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
            ),
            max_bytes: std::env::var("MIRROR_MAX_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_BYTES),
        }
    }
}

/// Derive the storage key for a source URL: `<prefix>/<host>/<path>`.
///
/// Query strings and fragments are ignored.
pub fn mirror_key(prefix: &str, source: &str) -> StorageResult<String> {
    let url = Url::parse(source)
        .map_err(|e| StorageError::InvalidKey(format!("{}: {}", source, e)))?;

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| StorageError::InvalidKey(format!("{}: no host", source)))?;

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    if segments.is_empty() {
        return Err(StorageError::InvalidKey(format!("{}: empty path", source)));
    }
    if segments.iter().any(|seg| *seg == "." || *seg == "..") {
        return Err(StorageError::InvalidKey(format!("{}: relative path", source)));
    }

    Ok(format!("{}/{}/{}", prefix, host, segments.join("/")))
}

fn guess_content_type(key: &str) -> &'static str {
    match key.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// [`AssetUploader`] that fetches over HTTP and writes to an [`ObjectStore`].
pub struct UrlMirror<S> {
    store: S,
    http: reqwest::Client,
    config: MirrorConfig,
}

impl<S: ObjectStore> UrlMirror<S> {
    pub fn new(store: S, config: MirrorConfig) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(concat!("vsync-storage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StorageError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            store,
            http,
            config,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn fetch(&self, source: &str) -> StorageResult<(Vec<u8>, Option<String>)> {
        let mut response = self
            .http
            .get(source)
            .send()
            .await
            .map_err(|e| StorageError::fetch_failed(format!("{}: {}", source, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::fetch_failed(format!(
                "{}: HTTP {}",
                source, status
            )));
        }

        let too_large = || StorageError::TooLarge {
            url: source.to_string(),
            limit: self.config.max_bytes,
        };

        if response
            .content_length()
            .is_some_and(|len| len > self.config.max_bytes)
        {
            return Err(too_large());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|ct| !ct.starts_with("application/octet-stream"))
            .map(|s| s.to_string());

        // Content-Length may be absent or wrong; the cap holds on bytes read.
        let mut data = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| StorageError::fetch_failed(format!("{}: {}", source, e)))?
        {
            if (data.len() + chunk.len()) as u64 > self.config.max_bytes {
                return Err(too_large());
            }
            data.extend_from_slice(&chunk);
        }

        Ok((data, content_type))
    }

    async fn mirror_one(&self, source: &str) -> StorageResult<StoredObject> {
        let key = mirror_key(&self.config.key_prefix, source)?;
        let (data, content_type) = self.fetch(source).await?;
        let size = data.len() as u64;
        let content_type = content_type.unwrap_or_else(|| guess_content_type(&key).to_string());

        debug!(source = %source, key = %key, size, "Mirroring asset");
        self.store.put(&key, data, &content_type).await?;

        Ok(StoredObject {
            url: self.store.public_url(&key)?,
            key,
            source_url: source.to_string(),
            size,
        })
    }
}

#[async_trait]
impl<S: ObjectStore> AssetUploader for UrlMirror<S> {
    async fn upload_from_urls(&self, urls: &[String]) -> Vec<StorageResult<StoredObject>> {
        let results = join_all(urls.iter().map(|url| self.mirror_one(url))).await;

        for (url, result) in urls.iter().zip(&results) {
            if let Err(e) = result {
                warn!(source = %url, error = %e, "Failed to mirror asset");
            }
        }

        results
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        self.store.check_connectivity().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct MemoryObjects {
        objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    }

    #[async_trait]
    impl ObjectStore for MemoryObjects {
        async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()> {
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), (data, content_type.to_string()));
            Ok(())
        }

        fn public_url(&self, key: &str) -> StorageResult<String> {
            Ok(format!("https://cdn.test/{}", key))
        }

        async fn check_connectivity(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    fn mirror(max_bytes: u64) -> UrlMirror<MemoryObjects> {
        UrlMirror::new(
            MemoryObjects::default(),
            MirrorConfig {
                max_bytes,
                ..MirrorConfig::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_mirror_key_is_deterministic() {
        let a = mirror_key("mirror", "https://image.mux.com/abc/thumbnail.jpg").unwrap();
        let b = mirror_key("mirror", "https://image.mux.com/abc/thumbnail.jpg?time=3").unwrap();
        assert_eq!(a, "mirror/image.mux.com/abc/thumbnail.jpg");
        assert_eq!(a, b);
        assert_ne!(
            a,
            mirror_key("mirror", "https://image.mux.com/abc/animated.gif").unwrap()
        );
    }

    #[test]
    fn test_mirror_key_rejects_unusable_urls() {
        assert!(mirror_key("mirror", "not a url").is_err());
        assert!(mirror_key("mirror", "https://image.mux.com/").is_err());
    }

    #[test]
    fn test_content_type_guess() {
        assert_eq!(guess_content_type("a/b/thumbnail.jpg"), "image/jpeg");
        assert_eq!(guess_content_type("a/b/animated.GIF"), "image/gif");
        assert_eq!(guess_content_type("a/b/blob"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_upload_preserves_order_and_isolates_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p1/thumbnail.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![1u8; 16])
                    .insert_header("content-type", "image/jpeg"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/p1/animated.gif"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mirror = mirror(DEFAULT_MAX_BYTES);
        let urls = vec![
            format!("{}/p1/thumbnail.jpg", server.uri()),
            format!("{}/p1/animated.gif", server.uri()),
        ];

        let results = mirror.upload_from_urls(&urls).await;
        assert_eq!(results.len(), 2);

        let stored = results[0].as_ref().unwrap();
        assert!(stored.key.ends_with("/p1/thumbnail.jpg"));
        assert_eq!(stored.url, format!("https://cdn.test/{}", stored.key));
        assert_eq!(stored.size, 16);
        assert!(matches!(results[1], Err(StorageError::FetchFailed(_))));

        let objects = mirror.store().objects.lock().unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[&stored.key].1, "image/jpeg");
    }

    #[tokio::test]
    async fn test_repeated_upload_overwrites_same_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p1/animated.gif"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4]))
            .mount(&server)
            .await;

        let mirror = mirror(DEFAULT_MAX_BYTES);
        let urls = vec![format!("{}/p1/animated.gif", server.uri())];

        let first = mirror.upload_from_urls(&urls).await.remove(0).unwrap();
        let second = mirror.upload_from_urls(&urls).await.remove(0).unwrap();
        assert_eq!(first.key, second.key);

        let objects = mirror.store().objects.lock().unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[&first.key].1, "image/gif");
    }

    #[tokio::test]
    async fn test_oversized_asset_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
            .mount(&server)
            .await;

        let mirror = mirror(32);
        let results = mirror
            .upload_from_urls(&[format!("{}/p1/thumbnail.jpg", server.uri())])
            .await;

        assert!(matches!(results[0], Err(StorageError::TooLarge { limit: 32, .. })));
        assert!(mirror.store().objects.lock().unwrap().is_empty());
    }

    /// Origin that streams chunked data without a Content-Length until the
    /// client hangs up.
    async fn endless_origin() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;

            let head = "HTTP/1.1 200 OK\r\ncontent-type: image/gif\r\ntransfer-encoding: chunked\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let chunk = format!("{:x}\r\n{}\r\n", 4096, "x".repeat(4096));
            while socket.write_all(chunk.as_bytes()).await.is_ok() {}
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_unbounded_body_without_length_is_cut_off() {
        let origin = endless_origin().await;
        let mirror = UrlMirror::new(
            MemoryObjects::default(),
            MirrorConfig {
                max_bytes: 64 * 1024,
                fetch_timeout: Duration::from_secs(30),
                ..MirrorConfig::default()
            },
        )
        .unwrap();

        let results = tokio::time::timeout(
            Duration::from_secs(10),
            mirror.upload_from_urls(&[format!("{}/p1/animated.gif", origin)]),
        )
        .await
        .expect("fetch should stop at the size cap");

        assert!(matches!(
            results[0],
            Err(StorageError::TooLarge { limit: 65536, .. })
        ));
        assert!(mirror.store().objects.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stored_object_into_mirrored_asset() {
        let asset: MirroredAsset = StoredObject {
            key: "k".into(),
            url: "u".into(),
            source_url: "s".into(),
            size: 1,
        }
        .into();
        assert_eq!(asset, MirroredAsset { key: "k".into(), url: "u".into() });
    }
}
