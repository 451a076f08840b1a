//! Talking to the content-type hub.

use crate::config::Config;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use parcel_model::HubCatalog;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

/// Form fields identifying this installation to the hub.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Registration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub platform_name: String,
    pub platform_version: String,
    pub h5p_version: String,
    pub disabled: u8,
    pub local_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub core_api_version: String,
}
impl Registration {
    pub fn new(config: &Config, uuid: Option<String>) -> Self {
        Self {
            uuid,
            platform_name: config.platform_name.clone(),
            platform_version: config.platform_version.clone(),
            h5p_version: config.core_version.clone(),
            disabled: 0,
            local_id: config.local_id(),
            kind: "local".to_string(),
            core_api_version: config.core_api.to_string(),
        }
    }
}

/// Optional statistics appended to catalog requests.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UsageStatistics {
    pub num_authors: u64,
    /// JSON object of library usage counts, keyed by machine name.
    pub libraries: Value,
}

#[derive(Serialize)]
struct CatalogRequest<'a> {
    #[serde(flatten)]
    registration: &'a Registration,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_authors: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    libraries: Option<String>,
}

#[derive(Deserialize)]
struct RegistrationResponse {
    uuid: String,
}

#[async_trait]
pub trait HubClient: Send + Sync {
    /// Register this installation, returning the uuid the hub assigned.
    async fn register(&self, registration: &Registration) -> Result<String>;

    async fn content_types(
        &self,
        registration: &Registration,
        usage: Option<&UsageStatistics>,
    ) -> Result<HubCatalog>;
}

/// [`HubClient`] over HTTPS, posting form-encoded requests.
pub struct ReqwestHubClient {
    client: reqwest::Client,
    registration_url: String,
    content_types_url: String,
}
impl ReqwestHubClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(format!("{}/{}", config.platform_name, config.platform_version))
            .build()
            .map_err(|e| ErrorKind::Transport(e.to_string()))?;
        Ok(Self {
            client,
            registration_url: config.registration_url.clone(),
            content_types_url: config.content_types_url.clone(),
        })
    }

    async fn post<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: for<'de> Deserialize<'de>,
    {
        let response = self.client.post(url).form(body).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Status(status.as_u16()));
        }
        let body = response.bytes().await.map_err(transport)?;
        Ok(serde_json::from_slice(&body).or_raise(|| ErrorKind::InvalidResponse)?)
    }
}

fn transport(err: reqwest::Error) -> ErrorKind {
    if err.is_timeout() { ErrorKind::Timeout } else { ErrorKind::Transport(err.to_string()) }
}

#[async_trait]
impl HubClient for ReqwestHubClient {
    #[instrument(skip_all, fields(url = %self.registration_url))]
    async fn register(&self, registration: &Registration) -> Result<String> {
        let response: RegistrationResponse = self.post(&self.registration_url, registration).await?;
        tracing::info!(uuid = %response.uuid, "registered with hub");
        Ok(response.uuid)
    }

    #[instrument(skip_all, fields(url = %self.content_types_url))]
    async fn content_types(
        &self,
        registration: &Registration,
        usage: Option<&UsageStatistics>,
    ) -> Result<HubCatalog> {
        let request = CatalogRequest {
            registration,
            num_authors: usage.map(|u| u.num_authors),
            libraries: usage.map(|u| u.libraries.to_string()),
        };
        let catalog: HubCatalog = self.post(&self.content_types_url, &request).await?;
        tracing::debug!(count = catalog.content_types.len(), "fetched hub catalog");
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_fields() {
        let config = Config::default();
        let registration = Registration::new(&config, Some("abc".to_string()));
        let json = serde_json::to_value(&registration).unwrap();
        assert_eq!(json["type"], "local");
        assert_eq!(json["uuid"], "abc");
        assert_eq!(json["core_api_version"], "1.24");
        assert_eq!(json["local_id"], config.local_id());

        let json = serde_json::to_value(Registration::new(&config, None)).unwrap();
        assert!(json.get("uuid").is_none());
    }

    #[test]
    fn test_client_builds_from_default_config() {
        assert!(ReqwestHubClient::new(&Config::default()).is_ok());
    }
}
