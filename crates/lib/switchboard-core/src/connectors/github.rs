//! GitHub REST connector.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::connectors::Connector;
use crate::fault::{BackendId, Fault};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CLIENT_USER_AGENT: &str = concat!("switchboard/", env!("CARGO_PKG_VERSION"));
const ACCEPT_V3: &str = "application/vnd.github.v3+json";
const TOKEN_SETTING: &str = "GITHUB_TOKEN";

/// Connection settings for the GitHub API.
#[derive(Debug, Clone)]
pub struct GithubSettings {
    pub api_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl GithubSettings {
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client bound to one API base URL.
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
}

impl GithubClient {
    /// Builds the client with the per-call timeout applied.
    ///
    /// # Errors
    /// Returns `Fault::Transport` if the TLS backend cannot be initialised.
    pub fn build(settings: &GithubSettings) -> Result<Self, Fault> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_V3));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            http,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, token: &str) -> Result<T, Fault> {
        let url = format!("{}{path}", self.api_url);
        debug!(%url, "calling GitHub API");
        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, format!("token {token}"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Fault::Upstream {
                status: Some(status.as_u16()),
                message: body,
            });
        }
        Ok(response.json().await?)
    }
}

/// Authenticated user as returned by `GET /user`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub login: String,
    pub name: Option<String>,
    pub public_repos: Option<u64>,
    pub followers: Option<u64>,
}

impl UserProfile {
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "GitHub User Info:\nLogin: {}\nName: {}\nPublic Repos: {}\nFollowers: {}",
            self.login,
            self.name.as_deref().unwrap_or("N/A"),
            display_count(self.public_repos),
            display_count(self.followers),
        )
    }
}

/// Repository entry as returned by `GET /user/repos`.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
    pub html_url: String,
    pub description: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub fork: bool,
}

impl Repository {
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "- {} ({})\n  Description: {}\n  Private: {}\n  Fork: {}",
            self.name,
            self.html_url,
            self.description.as_deref().unwrap_or("No description"),
            self.private,
            self.fork,
        )
    }
}

#[must_use]
pub fn render_repositories(repositories: &[Repository]) -> String {
    if repositories.is_empty() {
        return "No repositories found for this user.".to_string();
    }
    repositories
        .iter()
        .map(Repository::render)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn display_count(count: Option<u64>) -> String {
    count.map_or_else(|| "N/A".to_string(), |count| count.to_string())
}

/// Stateless connector for the authenticated user's GitHub data.
///
/// The token is only checked when a tool runs; a missing token never stops
/// startup.
#[derive(Clone)]
pub struct GithubConnector {
    inner: Connector<GithubClient>,
    token: Option<String>,
}

impl GithubConnector {
    #[must_use]
    pub fn connect(settings: &GithubSettings) -> Self {
        let inner = match GithubClient::build(settings) {
            Ok(client) => Connector::connected(
                BackendId::GitHub,
                Arc::new(client),
                format!("client ready for {}", settings.api_url),
            ),
            Err(fault) => {
                warn!(error = %fault, "failed to build GitHub client");
                Connector::unavailable(BackendId::GitHub, fault.to_string())
            }
        };
        let token = settings
            .token
            .clone()
            .filter(|token| !token.trim().is_empty());
        Self { inner, token }
    }

    #[must_use]
    pub const fn connector(&self) -> &Connector<GithubClient> {
        &self.inner
    }

    fn client_and_token(&self) -> Result<(&GithubClient, &str), Fault> {
        let client = self.inner.handle()?;
        let token = self
            .token
            .as_deref()
            .ok_or(Fault::ConfigMissing(TOKEN_SETTING))?;
        Ok((client.as_ref(), token))
    }

    /// Fetches the authenticated user's profile.
    ///
    /// # Errors
    /// Returns `ConfigMissing` without a network call when no token is set,
    /// `Upstream` on a non-2xx response, and `Transport` otherwise.
    pub async fn user_profile(&self) -> Result<UserProfile, Fault> {
        let (client, token) = self.client_and_token()?;
        client.get_json("/user", token).await
    }

    /// Lists the authenticated user's repositories.
    ///
    /// # Errors
    /// Same as [`GithubConnector::user_profile`].
    pub async fn repositories(&self) -> Result<Vec<Repository>, Fault> {
        let (client, token) = self.client_and_token()?;
        client.get_json("/user/repos", token).await
    }
}
