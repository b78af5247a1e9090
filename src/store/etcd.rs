//! etcd v2 keys API client.

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use super::{ConfigStore, Lookup, Removal, StoreError};

#[derive(Debug, Deserialize)]
struct KeysResponse {
    node: Option<Node>,
}

#[derive(Debug, Deserialize)]
struct Node {
    value: Option<String>,
}

pub struct EtcdStore {
    client: Client,
    endpoint: Url,
}

impl EtcdStore {
    /// `endpoint` is the base URL of an etcd member, e.g. `http://etcd:4001`.
    pub fn new(endpoint: &str) -> Result<Self, StoreError> {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(client: Client, endpoint: &str) -> Result<Self, StoreError> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| StoreError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(StoreError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(Self { client, endpoint })
    }

    /// Each key segment is percent-encoded on its own, so names holding
    /// `?`, `#` or spaces stay inside their segment.
    fn key_url(&self, key: &str) -> Result<Url, StoreError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(["v2", "keys"])
            .extend(key.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }
}

fn lookup_from(key: &str, status: StatusCode, body: &str) -> Result<Lookup, StoreError> {
    match status {
        StatusCode::OK => {
            let parsed: KeysResponse =
                serde_json::from_str(body).map_err(|source| StoreError::Decode {
                    key: key.to_string(),
                    source,
                })?;
            let value = parsed.node.and_then(|n| n.value).unwrap_or_default();
            Ok(Lookup::Exists(value))
        }
        StatusCode::NOT_FOUND => Ok(Lookup::Absent),
        other => Err(StoreError::UnexpectedStatus {
            key: key.to_string(),
            status: other.as_u16(),
        }),
    }
}

fn removal_from(key: &str, status: StatusCode) -> Result<Removal, StoreError> {
    match status {
        StatusCode::OK => Ok(Removal::Deleted),
        StatusCode::NOT_FOUND => Ok(Removal::Absent),
        other => Err(StoreError::UnexpectedStatus {
            key: key.to_string(),
            status: other.as_u16(),
        }),
    }
}

fn write_result(key: &str, status: StatusCode) -> Result<(), StoreError> {
    if status == StatusCode::OK || status == StatusCode::CREATED {
        Ok(())
    } else {
        Err(StoreError::UnexpectedStatus {
            key: key.to_string(),
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl ConfigStore for EtcdStore {
    async fn read(&self, key: &str) -> Result<Lookup, StoreError> {
        let res = self.client.get(self.key_url(key)?).send().await?;
        let status = res.status();
        let body = res.text().await?;
        lookup_from(key, status, &body)
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        debug!("etcd PUT {} = {}", key, value);
        let res = self
            .client
            .put(self.key_url(key)?)
            .form(&[("value", value)])
            .send()
            .await?;
        write_result(key, res.status())
    }

    async fn delete(&self, key: &str) -> Result<Removal, StoreError> {
        debug!("etcd DELETE {}", key);
        let res = self.client.delete(self.key_url(key)?).send().await?;
        removal_from(key, res.status())
    }
}
