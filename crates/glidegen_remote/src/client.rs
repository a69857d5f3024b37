//! Table API client over reqwest.

use crate::auth::{ClientCredentials, Credentials, TokenProvider};
use crate::error::{RemoteError, Result};
use crate::source::{ApiResponse, RecordQuery, RemoteSchemaSource};
use async_trait::async_trait;
use glidegen_schema::{CancellationToken, Fqdn};
use std::time::Duration;
use tracing::debug;

pub const URI_PATH_TABLE_API: &str = "api/now/table";

/// Connection settings for a remote instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Instance base URL, e.g. `https://dev12345.service-now.com`.
    pub instance_url: String,
    pub credentials: Credentials,
    /// Switches authentication from basic to OAuth bearer tokens.
    pub client: Option<ClientCredentials>,
    pub timeout: Duration,
}

enum Auth {
    Basic(Credentials),
    Bearer(TokenProvider),
}

/// Reads schema records through the instance's Table API.
pub struct TableApiClient {
    base_url: String,
    fqdn: Fqdn,
    http: reqwest::Client,
    auth: Auth,
    cancel: CancellationToken,
}

impl TableApiClient {
    pub fn new(config: ClientConfig, cancel: CancellationToken) -> Result<Self> {
        let url = reqwest::Url::parse(&config.instance_url)
            .map_err(|_| RemoteError::InvalidUrl(config.instance_url.clone()))?;
        let host = url
            .host_str()
            .ok_or_else(|| RemoteError::InvalidUrl(config.instance_url.clone()))?;
        let fqdn = Fqdn::parse(host).map_err(|_| RemoteError::InvalidUrl(config.instance_url.clone()))?;
        let base_url = url.as_str().trim_end_matches('/').to_string();

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        let auth = match config.client {
            Some(client) => Auth::Bearer(TokenProvider::new(
                http.clone(),
                &base_url,
                client,
                config.credentials,
            )),
            None => Auth::Basic(config.credentials),
        };

        Ok(Self {
            base_url,
            fqdn,
            http,
            auth,
            cancel,
        })
    }

    /// URL of a remote table's Table API endpoint.
    pub fn table_url(&self, table: &str) -> String {
        format!("{}/{}/{}", self.base_url, URI_PATH_TABLE_API, table)
    }

    async fn authorize(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        Ok(match &self.auth {
            Auth::Basic(credentials) => {
                request.basic_auth(&credentials.user_name, Some(&credentials.password))
            }
            Auth::Bearer(provider) => request.bearer_auth(provider.get_valid_token().await?),
        })
    }
}

#[async_trait]
impl RemoteSchemaSource for TableApiClient {
    fn fqdn(&self) -> &Fqdn {
        &self.fqdn
    }

    async fn query(&self, table: &str, query: &RecordQuery) -> Result<ApiResponse> {
        if self.cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }

        let encoded = query.encoded();
        let request = self
            .http
            .get(self.table_url(table))
            .query(&[
                ("sysparm_query", encoded.as_str()),
                ("sysparm_display_value", "all"),
                ("sysparm_exclude_reference_link", "true"),
            ])
            .header(reqwest::header::ACCEPT, "application/json");
        let request = self.authorize(request).await?;

        debug!(table, query = %encoded, "Table API request");
        let response = request.send().await?;
        let uri = response.url().to_string();
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(RemoteError::RequestFailed {
                uri,
                status: status.as_u16(),
                body: text,
            });
        }
        if !content_type.to_ascii_lowercase().contains("json") {
            return Err(RemoteError::InvalidContentType { uri, content_type });
        }

        let body = serde_json::from_str(&text).map_err(|source| RemoteError::ResponseParsing {
            uri: uri.clone(),
            source,
        })?;
        debug!(uri = %uri, "Table API request completed");
        Ok(ApiResponse { uri, body })
    }
}
