use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub mod dynu;

/// A DNS-01 challenge solver driven by the certificate-issuance webhook.
#[async_trait::async_trait]
pub trait Solver: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn name(&self) -> &str;

    /// Called once before any challenge is handled.
    async fn initialize(
        &mut self,
        cluster: kube::Config,
        stop: watch::Receiver<bool>,
    ) -> Result<(), Self::Error>;

    /// Publishes the challenge key.
    async fn present(&self, ch: &ChallengeRequest) -> Result<(), Self::Error>;
    /// Removes the records created by [`Solver::present`] for this key.
    async fn cleanup(&self, ch: &ChallengeRequest) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum ChallengeAction {
    Present,
    CleanUp,
    #[default]
    #[serde(other)]
    Unknown,
}

/// A single challenge as handed over by the webhook framework.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub action: ChallengeAction,
    #[serde(default, rename = "type")]
    pub challenge_type: String,
    #[serde(default)]
    pub dns_name: String,
    /// Expected TXT record content.
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub resource_namespace: String,
    #[serde(default, rename = "resolvedFQDN")]
    pub resolved_fqdn: String,
    #[serde(default)]
    pub resolved_zone: String,
    #[serde(default)]
    pub allow_ambient_credentials: bool,
    /// Solver specific configuration from the issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}
