//! Authenticated catalog session.

use crate::config::{CatalogConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::download_with_retry;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

/// Scopes needed to read saved tracks and private playlists
pub(crate) const REQUIRED_SCOPES: &str = "user-library-read playlist-read-private";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Long-lived catalog session
///
/// Constructed once per run and shared by reference with the adapters that
/// need it. Holds the HTTP client and the bearer token.
#[derive(Debug)]
pub struct CatalogClient {
    http: reqwest::Client,
    api_base: Url,
    access_token: String,
    retry: RetryConfig,
}

impl CatalogClient {
    /// Authenticate against the accounts service using the configured refresh token
    ///
    /// Without a refresh token this fails with a configuration error that
    /// carries the authorization URL the user has to visit.
    pub async fn connect(config: &CatalogConfig, retry: &RetryConfig) -> Result<Self> {
        let Some(refresh_token) = config.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
            let url = Self::authorization_url(config)?;
            return Err(Error::config(
                "catalog.refresh_token",
                format!("no refresh token configured; authorize the application at {url}"),
            ));
        };

        let http = build_http_client(config)?;
        let token_url = join_url(&config.accounts_base_url, "api/token")?;

        tracing::debug!(url = %token_url, "Requesting catalog access token");

        let response = http
            .post(token_url)
            .basic_auth(&config.client_id, Some(&config.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| Error::CatalogUnavailable(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::CatalogUnavailable(format!(
                "authentication rejected ({}): {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::CatalogUnavailable(format!("malformed token response: {}", e)))?;

        tracing::info!(expires_in = ?token.expires_in, "Authenticated with catalog");

        Ok(Self {
            http,
            api_base: parse_base(&config.api_base_url, "catalog.api_base_url")?,
            access_token: token.access_token,
            retry: retry.clone(),
        })
    }

    /// Create a session from an already obtained access token
    pub fn with_access_token(
        config: &CatalogConfig,
        retry: &RetryConfig,
        access_token: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            http: build_http_client(config)?,
            api_base: parse_base(&config.api_base_url, "catalog.api_base_url")?,
            access_token: access_token.into(),
            retry: retry.clone(),
        })
    }

    /// URL the user visits once to grant access and obtain a refresh token
    pub fn authorization_url(config: &CatalogConfig) -> Result<Url> {
        let mut url = join_url(&config.accounts_base_url, "authorize")?;
        url.query_pairs_mut()
            .append_pair("client_id", &config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &config.redirect_uri)
            .append_pair("scope", REQUIRED_SCOPES);
        Ok(url)
    }

    /// Build an API URL from a path relative to the API base plus query pairs
    pub fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.api_base.join(path.trim_start_matches('/')).map_err(|e| {
            Error::Other(format!("invalid catalog endpoint '{}': {}", path, e))
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// GET a JSON document, retrying rate limits and transient network failures
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        download_with_retry(&self.retry, || self.get_json_once(url)).await
    }

    async fn get_json_once<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        tracing::trace!(url = %url, "Catalog request");

        let response = self
            .http
            .get(url.clone())
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::CatalogUnavailable(format!(
                "catalog refused access ({}) to {}",
                status.as_u16(),
                url
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                message: body.trim().to_string(),
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn build_http_client(config: &CatalogConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .user_agent(concat!("playlist-dl/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Other(format!("failed to create HTTP client: {}", e)))
}

/// Parse a base URL so that relative joins append to its path
fn parse_base(base: &str, key: &str) -> Result<Url> {
    let normalized = format!("{}/", base.trim_end_matches('/'));
    Url::parse(&normalized)
        .map_err(|e| Error::config(key, format!("invalid URL '{}': {}", base, e)))
}

fn join_url(base: &str, path: &str) -> Result<Url> {
    let key = "catalog.accounts_base_url";
    parse_base(base, key)?
        .join(path)
        .map_err(|e| Error::config(key, format!("invalid URL '{}': {}", base, e)))
}
