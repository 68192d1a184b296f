use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::Api;
use secrecy::SecretString;
use thiserror::Error;

/// Read-only access to named key/value secrets.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, SecretError>;
}

/// Secret store backed by the Kubernetes API of the hosting cluster.
#[derive(Clone)]
pub struct KubeSecretStore {
    client: kube::Client,
}

impl KubeSecretStore {
    pub fn new(config: kube::Config) -> Result<Self, SecretError> {
        Ok(Self {
            client: kube::Client::try_from(config)?,
        })
    }
}

#[async_trait::async_trait]
impl SecretStore for KubeSecretStore {
    #[tracing::instrument(skip(self))]
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, SecretError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get(name).await?;

        Ok(secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, v.0))
            .collect())
    }
}

/// Extracts a UTF-8 value from secret data.
pub fn string_from_secret_data(
    data: &BTreeMap<String, Vec<u8>>,
    key: &str,
) -> Result<SecretString, SecretError> {
    let value = data
        .get(key)
        .ok_or_else(|| SecretError::KeyNotFound(key.to_owned()))?;

    String::from_utf8(value.clone())
        .map(SecretString::new)
        .map_err(|_| SecretError::NotUtf8(key.to_owned()))
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error(transparent)]
    KubeError(#[from] kube::Error),
    #[error("key {0:?} not found in secret data")]
    KeyNotFound(String),
    #[error("value of key {0:?} is not valid UTF-8")]
    NotUtf8(String),
}
