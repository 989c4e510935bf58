use crate::types::{CreateRepositoryRequest, ProvisionedRepository};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Authentication failed (HTTP {status})")]
    Authentication { status: u16 },

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Hosting API returned {status}: {message}")]
    Api { status: u16, message: String },
}

pub type ForgeResult<T> = Result<T, ForgeError>;

/// Creates the remote repository that a working copy publishes to.
///
/// Creation is idempotent: a repository that already exists under the
/// account is reported as [`ProvisionStatus::AlreadyExists`](crate::ProvisionStatus)
/// rather than as an error.
#[async_trait]
pub trait RemoteProvisioner: Send + Sync {
    async fn ensure_repository(
        &self,
        request: &CreateRepositoryRequest,
    ) -> ForgeResult<ProvisionedRepository>;

    fn provider_name(&self) -> &'static str;
}
