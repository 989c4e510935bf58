pub mod config;
pub mod github;
pub mod provider;
pub mod types;

pub use config::GitHubConfig;
pub use github::GitHubProvisioner;
pub use provider::{ForgeError, ForgeResult, RemoteProvisioner};
pub use types::{AccessToken, CreateRepositoryRequest, ProvisionStatus, ProvisionedRepository};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::github::*;
    pub use crate::provider::*;
    pub use crate::types::*;
}
