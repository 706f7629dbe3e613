use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;

use super::{join_key, ObjectStore};
use crate::error::IoError;

/// S3-backed implementation of ObjectStore.
///
/// Keys are resolved below `prefix` inside `bucket`, so an N5 container at
/// `s3://bucket/data/fixed.n5` is a store with prefix `data/fixed.n5`.
/// Works with S3-compatible services (MinIO, etc.) through a custom endpoint.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    prefix: String,
    identifier: String,
}

impl S3Store {
    /// Create a new S3Store for the given bucket and key prefix.
    pub fn new(client: Client, bucket: String, prefix: String) -> Self {
        let prefix = join_key(&[prefix.as_str()]);
        let identifier = if prefix.is_empty() {
            format!("s3://{}", bucket)
        } else {
            format!("s3://{}/{}", bucket, prefix)
        };
        Self {
            client,
            bucket,
            prefix,
            identifier,
        }
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Get the key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, IoError> {
        let object_key = join_key(&[self.prefix.as_str(), key]);

        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let is_no_such_key = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);

                let status_is_404 = e
                    .raw_response()
                    .map(|r| r.status().as_u16() == 404)
                    .unwrap_or(false);

                if is_no_such_key || status_is_404 {
                    return Ok(None);
                }

                let err_str = e.to_string();
                if err_str.contains("NoSuchKey") || err_str.contains("NotFound") {
                    return Ok(None);
                }
                return Err(IoError::S3(err_str));
            }
        };

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?
            .into_bytes();

        Ok(Some(data))
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services usually need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
