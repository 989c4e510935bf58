use crate::types::AccessToken;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_base_url: String,
    pub web_base_url: String,
    pub username: String,
    pub token: AccessToken,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            web_base_url: "https://github.com".to_string(),
            username: String::new(),
            token: AccessToken::new(""),
            timeout: Duration::from_secs(30),
            user_agent: concat!("itrack/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl GitHubConfig {
    pub fn new(username: impl Into<String>, token: AccessToken) -> Self {
        Self {
            username: username.into(),
            token,
            ..Self::default()
        }
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_web_base_url(mut self, url: impl Into<String>) -> Self {
        self.web_base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Clone URL the hosting service assigns to `name` under this account.
    pub fn clone_url_for(&self, name: &str) -> String {
        format!(
            "{}/{}/{}.git",
            self.web_base_url.trim_end_matches('/'),
            self.username,
            name
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        for (label, url) in [
            ("API base URL", &self.api_base_url),
            ("Web base URL", &self.web_base_url),
        ] {
            if url.is_empty() {
                return Err(format!("{} cannot be empty", label));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("{} must start with http:// or https://", label));
            }
        }

        if self.username.trim().is_empty() {
            return Err("Username cannot be empty".to_string());
        }

        if self.token.is_empty() {
            return Err("Access token cannot be empty".to_string());
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}
