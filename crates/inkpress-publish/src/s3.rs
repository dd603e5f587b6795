//! S3 object store.

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::PublishError;
use crate::store::ObjectStore;

/// Bucket location and credentials.
///
/// Credentials fall back to the default AWS provider chain when unset.
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    pub region: String,
    pub bucket: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Uploads objects to one S3 bucket.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    /// Connect to the configured bucket.
    pub async fn connect(config: &S3Config) -> Result<Self, PublishError> {
        if config.region.is_empty() {
            return Err(PublishError::MissingSetting("AWS_REGION"));
        }
        if config.bucket.is_empty() {
            return Err(PublishError::MissingSetting("AWS_BUCKET"));
        }

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        if let (Some(key), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key.clone(),
                secret.clone(),
                None,
                None,
                "inkpress",
            ));
        }

        let shared = loader.load().await;
        tracing::debug!("Using bucket {} in {}", config.bucket, config.region);

        Ok(Self {
            client: aws_sdk_s3::Client::new(&shared),
            bucket: config.bucket.clone(),
        })
    }
}

impl ObjectStore for S3Store {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PublishError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| PublishError::Upload {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn requires_region_and_bucket() {
        let err = S3Store::connect(&S3Config::default()).await.err().unwrap();
        assert!(matches!(err, PublishError::MissingSetting("AWS_REGION")));

        let err = S3Store::connect(&S3Config {
            region: "eu-west-1".to_string(),
            ..Default::default()
        })
        .await
        .err()
        .unwrap();
        assert!(matches!(err, PublishError::MissingSetting("AWS_BUCKET")));
    }
}
