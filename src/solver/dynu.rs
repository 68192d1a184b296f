use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::{ChallengeRequest, Solver};
use crate::{
    dynu::{
        self,
        zone::{base_record_name, ResolvedZone},
        DynuClient, DynuError,
    },
    secrets::{string_from_secret_data, KubeSecretStore, SecretError, SecretStore},
};

const SOLVER_NAME: &str = "dynu";
const DEFAULT_API_KEY_SECRET_KEY: &str = "api-key";

/// Per-issuer solver configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default, rename = "secretName")]
    pub secret_ref: String,
    #[serde(default)]
    pub zone_name: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_key_secret_key: Option<String>,
}

impl ProviderConfig {
    /// Decodes the config blob. A missing blob yields the default config.
    pub fn load(raw: Option<&serde_json::Value>) -> Result<Self, SolverError> {
        match raw {
            None => Ok(Self::default()),
            Some(raw) => Self::deserialize(raw).map_err(SolverError::ConfigError),
        }
    }

    pub fn api_url(&self) -> &str {
        non_empty(&self.api_url).unwrap_or(dynu::DEFAULT_API_URL)
    }

    pub fn zone_name(&self) -> Option<&str> {
        non_empty(&self.zone_name)
    }

    pub fn api_key_secret_key(&self) -> &str {
        non_empty(&self.api_key_secret_key).unwrap_or(DEFAULT_API_KEY_SECRET_KEY)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

pub struct DynuSolver {
    http: reqwest::Client,
    secrets: Option<Arc<dyn SecretStore>>,
}

impl DynuSolver {
    pub fn new(handshake_timeout: Duration) -> Result<Self, SolverError> {
        Ok(Self {
            http: dynu::http_client(handshake_timeout)?,
            secrets: None,
        })
    }

    pub fn with_secret_store<S: SecretStore + 'static>(mut self, store: S) -> Self {
        self.secrets = Some(Arc::new(store));
        self
    }

    /// Builds an API client authenticated with the credential referenced by
    /// the challenge config.
    async fn client_for(
        &self,
        ch: &ChallengeRequest,
    ) -> Result<(DynuClient, ProviderConfig), SolverError> {
        let cfg = ProviderConfig::load(ch.config.as_ref())?;
        debug!(?cfg, "decoded configuration");

        let secrets = self.secrets.as_ref().ok_or(SolverError::NotInitialized)?;
        if cfg.secret_ref.is_empty() {
            return Err(SolverError::MissingSecretName);
        }
        let secret_error = |source| SolverError::SecretError {
            namespace: ch.resource_namespace.clone(),
            name: cfg.secret_ref.clone(),
            source,
        };
        let data = secrets
            .get(&ch.resource_namespace, &cfg.secret_ref)
            .await
            .map_err(secret_error)?;
        let api_key =
            string_from_secret_data(&data, cfg.api_key_secret_key()).map_err(secret_error)?;

        let client = DynuClient::new(self.http.clone(), cfg.api_url(), api_key)?;
        Ok((client, cfg))
    }

    async fn resolve(
        &self,
        client: &DynuClient,
        cfg: &ProviderConfig,
        fqdn: &str,
    ) -> Result<ResolvedZone, SolverError> {
        let zone = match cfg.zone_name() {
            Some(zone_name) => client.resolve_named_zone(zone_name, fqdn).await?,
            None => client.resolve_zone(fqdn).await?,
        };
        debug!(domain_id = %zone.domain_id, node = %zone.node, "resolved zone");
        Ok(zone)
    }
}

#[async_trait::async_trait]
impl Solver for DynuSolver {
    type Error = SolverError;

    fn name(&self) -> &str {
        SOLVER_NAME
    }

    async fn initialize(
        &mut self,
        cluster: kube::Config,
        stop: watch::Receiver<bool>,
    ) -> Result<(), Self::Error> {
        debug!(stopped = *stop.borrow(), "initializing solver");
        let store = KubeSecretStore::new(cluster).map_err(SolverError::InitializeError)?;
        self.secrets = Some(Arc::new(store));
        Ok(())
    }

    #[tracing::instrument(
        skip(self, ch),
        fields(
            namespace = %ch.resource_namespace,
            zone = %ch.resolved_zone,
            fqdn = %ch.resolved_fqdn
        )
    )]
    async fn present(&self, ch: &ChallengeRequest) -> Result<(), Self::Error> {
        let (client, cfg) = self.client_for(ch).await?;
        let zone = self.resolve(&client, &cfg, &ch.resolved_fqdn).await?;

        // Propagation may be checked on the name without the first label too.
        let base_name = base_record_name(&zone.node);
        for node in [zone.node.as_str(), base_name] {
            match client.create_txt_record(&zone.domain_id, node, &ch.key).await {
                Ok(record) => info!(record_id = record.id, node, "added TXT record"),
                Err(e) => error!(node, "unable to add TXT record: {}", e),
            }
        }

        info!("presented TXT record");
        Ok(())
    }

    #[tracing::instrument(
        skip(self, ch),
        fields(
            namespace = %ch.resource_namespace,
            zone = %ch.resolved_zone,
            fqdn = %ch.resolved_fqdn
        )
    )]
    async fn cleanup(&self, ch: &ChallengeRequest) -> Result<(), Self::Error> {
        let (client, cfg) = self.client_for(ch).await?;
        let zone = self.resolve(&client, &cfg, &ch.resolved_fqdn).await?;

        let records = client.list_records(&zone.domain_id).await?;
        let matching = records
            .iter()
            .filter(|r| r.record_type == "TXT" && r.text_data == ch.key);

        for record in matching {
            match client.delete_record(&zone.domain_id, record.id).await {
                Ok(()) => {
                    info!(record_id = record.id, node = %record.node_name, "deleted TXT record")
                }
                Err(e) => error!(record_id = record.id, "unable to delete TXT record: {}", e),
            }
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("error decoding solver config: {0}")]
    ConfigError(#[source] serde_json::Error),
    #[error("unable to get api key from secret `{namespace}/{name}`: {source}")]
    SecretError {
        namespace: String,
        name: String,
        #[source]
        source: SecretError,
    },
    #[error("solver config does not name a secret (secretName)")]
    MissingSecretName,
    #[error("unable to build secret store client: {0}")]
    InitializeError(#[source] SecretError),
    #[error(transparent)]
    ProviderError(#[from] DynuError),
    #[error("solver has not been initialized")]
    NotInitialized,
}
