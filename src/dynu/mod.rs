use std::time::Duration;

use reqwest::{header, Client, IntoUrl, Method, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

pub mod zone;

pub const DEFAULT_API_URL: &str = "https://api.dynu.com/v2";
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

const API_KEY_HEADER: &str = "API-Key";
const TXT_RECORD_TTL: u32 = 60;

/// Builds the HTTP client shared by all Dynu API calls.
pub fn http_client(handshake_timeout: Duration) -> Result<Client, DynuError> {
    Ok(Client::builder()
        .connect_timeout(handshake_timeout)
        .build()?)
}

/// Client for the Dynu REST API, bound to a single API key.
#[derive(Debug)]
pub struct DynuClient {
    base_url: Url,
    api_key: SecretString,
    client: Client,
}

impl DynuClient {
    pub fn new<U: IntoUrl>(
        client: Client,
        url: U,
        api_key: SecretString,
    ) -> Result<Self, DynuError> {
        let mut base_url = url.into_url()?;

        if base_url.cannot_be_a_base() {
            return Err(DynuError::BadBaseUrl);
        }
        // Url::join replaces the last path segment unless the path ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            api_key,
            client,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_domains(&self) -> Result<Vec<Domain>, DynuError> {
        let response: DomainList = self.call_json(Method::GET, "dns", None).await?;
        debug!("got {} domains from Dynu", response.domains.len());
        Ok(response.domains)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_root(&self, hostname: &str) -> Result<RootDomain, DynuError> {
        self.call_json(Method::GET, &format!("dns/getroot/{hostname}"), None)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_records(&self, domain_id: &str) -> Result<Vec<DnsRecord>, DynuError> {
        let response: DnsRecordList = self
            .call_json(Method::GET, &format!("dns/{domain_id}/record"), None)
            .await?;
        debug!("got {} records for domain {}", response.dns_records.len(), domain_id);
        Ok(response.dns_records)
    }

    #[tracing::instrument(skip(self, text_data))]
    pub async fn create_txt_record(
        &self,
        domain_id: &str,
        node_name: &str,
        text_data: &str,
    ) -> Result<DnsRecord, DynuError> {
        let body = serde_json::to_vec(&NewTxtRecord {
            node_name,
            record_type: "TXT",
            ttl: TXT_RECORD_TTL,
            state: true,
            group: "",
            text_data,
        })?;

        self.call_json(Method::POST, &format!("dns/{domain_id}/record"), Some(body))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_record(&self, domain_id: &str, record_id: u64) -> Result<(), DynuError> {
        let body = self
            .call(Method::DELETE, &format!("dns/{domain_id}/record/{record_id}"), None)
            .await?;
        debug!(response = %String::from_utf8_lossy(&body), "deleted record");
        Ok(())
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<T, DynuError> {
        let body = self.call(method, path, body).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Performs a single API call and returns the raw body of a 200 response.
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, DynuError> {
        let url = self.base_url.join(path)?;

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, self.api_key.expose_secret().as_str());
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status != StatusCode::OK {
            error!(%status, %url, %method, "Dynu API call failed");
            return Err(DynuError::Status {
                status,
                url: url.to_string(),
                method,
            });
        }

        Ok(body.to_vec())
    }
}

#[derive(Debug, Error)]
pub enum DynuError {
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),
    #[error("bad base url")]
    BadBaseUrl,
    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),
    #[error("error calling API status: {status} url: {url} method: {method}")]
    Status {
        status: StatusCode,
        url: String,
        method: Method,
    },
    #[error("unable to decode API response: {0}")]
    DecodeError(#[from] serde_json::Error),
    #[error("domain {0:?} could not be found in managed domains")]
    DomainNotFound(String),
    #[error("{fqdn:?} is not part of zone {zone:?}")]
    NotInZone { fqdn: String, zone: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Domain {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct DomainList {
    #[serde(default)]
    domains: Vec<Domain>,
}

/// Best matching managed domain for a hostname.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootDomain {
    pub id: u64,
    #[serde(default)]
    pub domain_name: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub node: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecord {
    pub id: u64,
    #[serde(default)]
    pub domain_id: u64,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub record_type: String,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub text_data: String,
    #[serde(default)]
    pub content: String,
    pub updated_on: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DnsRecordList {
    #[serde(default)]
    dns_records: Vec<DnsRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewTxtRecord<'a> {
    node_name: &'a str,
    record_type: &'a str,
    ttl: u32,
    state: bool,
    group: &'a str,
    text_data: &'a str,
}
