//! Record storage on minio, or any other S3-compatible object store.

use anyhow::{anyhow, Error};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::{debug, info};
use url::Url;

use crate::store::KeyedStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketKey {
    pub bucket: String,
    pub key: String,
}

/// Splits an `s3://bucket/some/prefix` location into bucket and key.
///
/// Trailing `/` and `*` segments are dropped.
pub fn path_to_bucket_key(path: &str) -> Result<BucketKey, Error> {
    let s3_url = Url::parse(path).map_err(|e| anyhow!("could not parse `{path}`: {e}"))?;

    if s3_url.scheme() != "s3" {
        return Err(anyhow!("`{path}` is not an s3:// location"));
    }

    let bucket = s3_url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| anyhow!("`{path}` does not name a bucket"))?;

    let key = s3_url
        .path()
        .trim_start_matches('/')
        .trim_end_matches(|c| c == '/' || c == '*');

    Ok(BucketKey {
        bucket: bucket.to_string(),
        key: key.to_string(),
    })
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// id
    pub access_key_id: String,

    /// password
    pub secret_access_key: String,

    /// object store region
    pub region: String,

    /// minio url
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Client {
    pub client: s3::Client,
}

impl Client {
    pub fn from_conf(cfg: ClientConfig) -> Self {
        let cred = s3::config::Credentials::new(
            cfg.access_key_id,
            cfg.secret_access_key,
            None,
            None,
            "room-rank",
        );
        let region = s3::config::Region::new(cfg.region);
        let conf = s3::config::Builder::new()
            .credentials_provider(cred)
            .region(region)
            .endpoint_url(cfg.url)
            .force_path_style(true)
            .behavior_version_latest()
            .build();

        Self {
            client: s3::Client::from_conf(conf),
        }
    }

    /// Create `bucket` unless it already exists.
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<(), Error> {
        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => {
                info!(%bucket, "created bucket");
                Ok(())
            }
            Err(err) => {
                let err = err.into_service_error();
                if err.is_bucket_already_owned_by_you() || err.is_bucket_already_exists() {
                    Ok(())
                } else {
                    Err(anyhow!(err))
                }
            }
        }
    }

    /// Object stored at `key`, or `None` if there is no such object.
    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, Error> {
        let output = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(err) => {
                let err = err.into_service_error();
                if err.is_no_such_key() {
                    return Ok(None);
                }
                return Err(anyhow!(err));
            }
        };

        let data = output.body.collect().await?.into_bytes();
        Ok(Some(data))
    }

    pub async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), Error> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("application/json")
            .body(ByteStream::from(data))
            .send()
            .await?;
        Ok(())
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), Error> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    /// Lists every object whose key starts with `prefix`.
    pub async fn list_objects_in_dir(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, Error> {
        let mut response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .max_keys(500)
            .into_paginator()
            .send();

        let mut objects = vec![];
        while let Some(result) = response.next().await {
            let output = result?;
            for object in output.contents() {
                if let Some(key) = object.key() {
                    objects.push(key.to_string());
                }
            }
        }

        Ok(objects)
    }
}

/// [`KeyedStore`] keeping each record as an object under a root prefix.
///
/// Listings go through ListObjectsV2 and may briefly miss objects written
/// or still show objects deleted just before.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    root: String,
}

impl S3Store {
    /// Store rooted at `location`, e.g. `s3://room-rank/records`.
    pub async fn connect(client: Client, location: &str) -> Result<Self, Error> {
        let BucketKey { bucket, key } = path_to_bucket_key(location)?;
        client.ensure_bucket(&bucket).await?;
        debug!(bucket = %bucket, root = %key, "using s3 store");

        Ok(Self {
            client,
            bucket,
            root: key,
        })
    }

    fn object_key(&self, key: &str) -> String {
        if self.root.is_empty() {
            key.to_string()
        } else {
            format!("{}/{key}", self.root)
        }
    }

    fn record_key<'a>(&self, object_key: &'a str) -> &'a str {
        if self.root.is_empty() {
            object_key
        } else {
            object_key
                .strip_prefix(self.root.as_str())
                .map(|key| key.trim_start_matches('/'))
                .unwrap_or(object_key)
        }
    }
}

#[async_trait]
impl KeyedStore for S3Store {
    async fn get(&self, key: &str) -> crate::Result<Option<Bytes>> {
        Ok(self.client.get_object(&self.bucket, &self.object_key(key)).await?)
    }

    async fn put(&self, key: &str, value: Bytes) -> crate::Result<()> {
        Ok(self
            .client
            .put_object(&self.bucket, &self.object_key(key), value)
            .await?)
    }

    async fn delete(&self, key: &str) -> crate::Result<()> {
        Ok(self
            .client
            .delete_object(&self.bucket, &self.object_key(key))
            .await?)
    }

    async fn list(&self, prefix: &str) -> crate::Result<Vec<String>> {
        let objects = self
            .client
            .list_objects_in_dir(&self.bucket, &self.object_key(prefix))
            .await?;

        let mut keys: Vec<String> = objects
            .iter()
            .map(|object| self.record_key(object).to_string())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_s3_locations() {
        let location = path_to_bucket_key("s3://room-rank/records/").unwrap();
        assert_eq!(location.bucket, "room-rank");
        assert_eq!(location.key, "records");

        let location = path_to_bucket_key("s3://room-rank").unwrap();
        assert_eq!(location.key, "");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(path_to_bucket_key("http://room-rank/records").is_err());
        assert!(path_to_bucket_key("not a url").is_err());
    }
}
