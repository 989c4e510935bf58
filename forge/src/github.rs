use crate::config::GitHubConfig;
use crate::provider::{ForgeError, ForgeResult, RemoteProvisioner};
use crate::types::{CreateRepositoryRequest, ProvisionStatus, ProvisionedRepository};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";

#[derive(Deserialize)]
struct GitHubRepoResponse {
    clone_url: String,
}

#[derive(Deserialize)]
struct GitHubErrorResponse {
    #[serde(default)]
    message: String,
}

pub struct GitHubProvisioner {
    client: reqwest::Client,
    config: GitHubConfig,
}

impl GitHubProvisioner {
    pub fn new(config: GitHubConfig) -> ForgeResult<Self> {
        config
            .validate()
            .map_err(|message| ForgeError::InvalidConfig { message })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_MEDIA_TYPE));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token.expose()))
            .map_err(|_| ForgeError::InvalidConfig {
                message: "Access token contains invalid header characters".to_string(),
            })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).map_err(|_| ForgeError::InvalidConfig {
                message: "User agent contains invalid header characters".to_string(),
            })?,
        );

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ForgeError::InvalidConfig {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    fn create_url(&self) -> String {
        format!("{}/user/repos", self.config.api_base_url.trim_end_matches('/'))
    }

    fn handle_http_error(err: reqwest::Error) -> ForgeError {
        if err.is_timeout() {
            ForgeError::ServiceUnavailable {
                message: "Request timeout".to_string(),
            }
        } else if err.is_connect() {
            ForgeError::ServiceUnavailable {
                message: "Cannot connect to hosting API".to_string(),
            }
        } else {
            ForgeError::Network(err)
        }
    }

    fn error_for_status(status: StatusCode, body: &str) -> ForgeError {
        let message = serde_json::from_str::<GitHubErrorResponse>(body)
            .map(|e| e.message)
            .unwrap_or_else(|_| body.to_string());

        match status.as_u16() {
            401 | 403 => ForgeError::Authentication {
                status: status.as_u16(),
            },
            429 => ForgeError::RateLimit,
            502..=504 => ForgeError::ServiceUnavailable { message },
            code => ForgeError::Api {
                status: code,
                message,
            },
        }
    }
}

#[async_trait]
impl RemoteProvisioner for GitHubProvisioner {
    async fn ensure_repository(
        &self,
        request: &CreateRepositoryRequest,
    ) -> ForgeResult<ProvisionedRepository> {
        let url = self.create_url();
        debug!("Creating repository {} via {}", request.name, url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(Self::handle_http_error)?;

        let status = response.status();

        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let clone_url = self.config.clone_url_for(&request.name);
            info!("Repository {} already exists at {}", request.name, clone_url);
            return Ok(ProvisionedRepository {
                name: request.name.clone(),
                clone_url,
                status: ProvisionStatus::AlreadyExists,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Repository creation failed with {}", status);
            return Err(Self::error_for_status(status, &body));
        }

        let body = response.text().await.map_err(Self::handle_http_error)?;
        let created: GitHubRepoResponse = serde_json::from_str(&body)?;

        info!("Repository {} created at {}", request.name, created.clone_url);

        Ok(ProvisionedRepository {
            name: request.name.clone(),
            clone_url: created.clone_url,
            status: ProvisionStatus::Created,
        })
    }

    fn provider_name(&self) -> &'static str {
        "github"
    }
}
