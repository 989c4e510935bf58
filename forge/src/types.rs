use serde::{Deserialize, Serialize};
use std::fmt;

/// Personal access token used to authenticate against the hosting API and
/// git transports. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

impl From<String> for AccessToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AccessToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateRepositoryRequest {
    pub name: String,
    pub private: bool,
}

impl CreateRepositoryRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            private: true,
        }
    }

    pub fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }
}

/// How the remote repository came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionStatus {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedRepository {
    pub name: String,
    pub clone_url: String,
    pub status: ProvisionStatus,
}

impl ProvisionedRepository {
    pub fn was_created(&self) -> bool {
        self.status == ProvisionStatus::Created
    }
}
