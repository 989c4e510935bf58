use crate::artifact::ArtifactLayout;
use crate::git::{CommitAuthor, GitCredentials};
use forge::{AccessToken, GitHubConfig};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "itrack.toml";

pub const ENV_USERNAME: &str = "ITRACK_USERNAME";
pub const ENV_TOKEN: &str = "ITRACK_TOKEN";
pub const ENV_TOKEN_FALLBACK: &str = "GITHUB_TOKEN";
pub const ENV_INTERVAL_SECS: &str = "ITRACK_INTERVAL_SECS";
pub const ENV_API_BASE_URL: &str = "ITRACK_API_BASE_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing {0}: set it in the environment or run interactively")]
    MissingCredential(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Runtime configuration of the tracker.
///
/// Access tokens are never read from the file: they only come from the environment
/// or an interactive prompt (see [`resolve_credentials`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    pub workspace: PathBuf,
    pub repo_name: String,
    pub private: bool,
    pub interval_secs: u64,
    pub default_branch: String,
    pub remote_name: String,
    pub username: Option<String>,
    pub artifact_prefix: String,
    pub artifact_extension: String,
    pub author_name: String,
    pub author_email: String,
    pub api_base_url: String,
    pub web_base_url: String,
    pub http_timeout_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            repo_name: "code-tracking".to_string(),
            private: true,
            interval_secs: 20 * 60,
            default_branch: "master".to_string(),
            remote_name: "origin".to_string(),
            username: None,
            artifact_prefix: "code_".to_string(),
            artifact_extension: ".md".to_string(),
            author_name: "itrack".to_string(),
            author_email: "itrack@localhost".to_string(),
            api_base_url: "https://api.github.com".to_string(),
            web_base_url: "https://github.com".to_string(),
            http_timeout_secs: 30,
        }
    }
}

impl TrackerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load `explicit` if given, otherwise `<workspace>/itrack.toml` when it
    /// exists, otherwise defaults. The workspace is always `workspace`.
    pub fn discover(workspace: &Path, explicit: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let candidate = workspace.join(CONFIG_FILE_NAME);
                if candidate.is_file() {
                    Self::load(&candidate)?
                } else {
                    Self::default()
                }
            }
        };
        config.workspace = workspace.to_path_buf();
        Ok(config)
    }

    /// Overlay values found through `lookup` (normally the process environment).
    pub fn apply_env<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(username) = lookup(ENV_USERNAME).filter(|v| !v.trim().is_empty()) {
            self.username = Some(username);
        }
        if let Some(secs) = lookup(ENV_INTERVAL_SECS) {
            self.interval_secs = secs.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} must be a whole number of seconds", ENV_INTERVAL_SECS))
            })?;
        }
        if let Some(url) = lookup(ENV_API_BASE_URL) {
            self.api_base_url = url;
        }
        Ok(self)
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    pub fn with_repo_name(mut self, name: impl Into<String>) -> Self {
        self.repo_name = name.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_secs = interval.as_secs();
        self
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn working_copy_path(&self) -> PathBuf {
        self.workspace.join(&self.repo_name)
    }

    pub fn artifact_layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(&self.artifact_prefix, &self.artifact_extension)
    }

    pub fn author(&self) -> CommitAuthor {
        CommitAuthor::new(&self.author_name, &self.author_email)
    }

    pub fn github_config(&self, credentials: &Credentials) -> GitHubConfig {
        GitHubConfig::new(&credentials.username, credentials.token.clone())
            .with_api_base_url(&self.api_base_url)
            .with_web_base_url(&self.web_base_url)
            .with_timeout(Duration::from_secs(self.http_timeout_secs))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.repo_name.trim().is_empty() {
            return Err("Repository name cannot be empty".to_string());
        }

        if self.repo_name.contains(['/', '\\']) || self.repo_name == "." || self.repo_name == ".." {
            return Err("Repository name must be a single path component".to_string());
        }

        if self.interval_secs == 0 {
            return Err("Interval must be greater than 0".to_string());
        }

        if self.default_branch.trim().is_empty() {
            return Err("Default branch cannot be empty".to_string());
        }

        if self.remote_name.trim().is_empty() {
            return Err("Remote name cannot be empty".to_string());
        }

        if self.artifact_prefix.is_empty() && self.artifact_extension.is_empty() {
            return Err("Artifact prefix and extension cannot both be empty".to_string());
        }

        if self.artifact_prefix.contains(['/', '\\'])
            || self.artifact_extension.contains(['/', '\\'])
        {
            return Err("Artifact names cannot contain path separators".to_string());
        }

        if self.http_timeout_secs == 0 {
            return Err("HTTP timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Account name and token used for the hosting API and git transports.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub token: AccessToken,
}

impl Credentials {
    pub fn git(&self) -> GitCredentials {
        GitCredentials::new(&self.username, self.token.clone())
    }
}

/// Resolve credentials from config, `lookup` (environment) and finally `prompt`.
///
/// `prompt` receives a label and returns `None` when no answer can be given
/// (e.g. stdin is not a terminal).
pub fn resolve_credentials<F, P>(
    config: &TrackerConfig,
    lookup: F,
    mut prompt: P,
) -> ConfigResult<Credentials>
where
    F: Fn(&str) -> Option<String>,
    P: FnMut(&str) -> io::Result<Option<String>>,
{
    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    let username = match non_empty(config.username.clone()) {
        Some(username) => username,
        None => non_empty(prompt("GitHub username")?)
            .ok_or(ConfigError::MissingCredential("GitHub username"))?,
    };

    let token = match non_empty(lookup(ENV_TOKEN)).or_else(|| non_empty(lookup(ENV_TOKEN_FALLBACK)))
    {
        Some(token) => token,
        None => non_empty(prompt("GitHub personal access token")?)
            .ok_or(ConfigError::MissingCredential("GitHub access token"))?,
    };

    Ok(Credentials {
        username: username.trim().to_string(),
        token: AccessToken::new(token.trim()),
    })
}

/// Ask on the controlling terminal; `None` when stdin is not interactive.
pub fn terminal_prompt(label: &str) -> io::Result<Option<String>> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Ok(None);
    }

    print!("{}: ", label);
    io::stdout().flush()?;

    let mut input = String::new();
    stdin.lock().read_line(&mut input)?;
    Ok(Some(input.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn no_prompt(_: &str) -> io::Result<Option<String>> {
        Ok(None)
    }

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.repo_name, "code-tracking");
        assert_eq!(config.interval(), Duration::from_secs(1200));
        assert_eq!(config.default_branch, "master");
        assert!(config.private);
        assert_eq!(config.artifact_layout().file_name(1), "code_1.md");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = TrackerConfig::new()
            .with_workspace("/work")
            .with_repo_name("tracking")
            .with_interval(Duration::from_secs(60))
            .with_default_branch("main")
            .with_username("octocat");

        assert_eq!(config.working_copy_path(), PathBuf::from("/work/tracking"));
        assert_eq!(config.interval_secs, 60);
        assert_eq!(config.default_branch, "main");
        assert_eq!(config.username.as_deref(), Some("octocat"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = TrackerConfig::default();

        config.repo_name = "".to_string();
        assert!(config.validate().is_err());

        config.repo_name = "../escape".to_string();
        assert!(config.validate().is_err());

        config.repo_name = "code-tracking".to_string();
        config.interval_secs = 0;
        assert!(config.validate().is_err());

        config.interval_secs = 60;
        config.default_branch = " ".to_string();
        assert!(config.validate().is_err());

        config.default_branch = "main".to_string();
        config.artifact_prefix = "a/b".to_string();
        assert!(config.validate().is_err());

        config.artifact_prefix = "code_".to_string();
        config.http_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let config = TrackerConfig::from_toml_str(
            r#"
            repo_name = "daily-log"
            interval_secs = 60
            default_branch = "main"
            username = "octocat"
            "#,
        )
        .unwrap();

        assert_eq!(config.repo_name, "daily-log");
        assert_eq!(config.interval(), Duration::from_secs(60));
        assert_eq!(config.remote_name, "origin");
        assert_eq!(config.username.as_deref(), Some("octocat"));
    }

    #[test]
    fn test_token_in_file_is_rejected() {
        let result = TrackerConfig::from_toml_str(r#"token = "ghp_nope""#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_discover_prefers_workspace_file() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "interval_secs = 5\n").unwrap();

        let config = TrackerConfig::discover(dir.path(), None).unwrap();
        assert_eq!(config.interval_secs, 5);
        assert_eq!(config.workspace, dir.path());

        let missing = TrackerConfig::discover(dir.path(), Some(&dir.path().join("nope.toml")));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_env_overlay() {
        let config = TrackerConfig::default()
            .apply_env(env(&[
                (ENV_USERNAME, "octocat"),
                (ENV_INTERVAL_SECS, "90"),
                (ENV_API_BASE_URL, "http://localhost:9"),
            ]))
            .unwrap();

        assert_eq!(config.username.as_deref(), Some("octocat"));
        assert_eq!(config.interval_secs, 90);
        assert_eq!(config.api_base_url, "http://localhost:9");

        let bad = TrackerConfig::default().apply_env(env(&[(ENV_INTERVAL_SECS, "soon")]));
        assert!(matches!(bad, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_resolve_credentials_from_env() {
        let config = TrackerConfig::default().with_username("octocat");
        let creds =
            resolve_credentials(&config, env(&[(ENV_TOKEN_FALLBACK, "ghp_fallback")]), no_prompt)
                .unwrap();
        assert_eq!(creds.username, "octocat");
        assert_eq!(creds.token.expose(), "ghp_fallback");

        let creds = resolve_credentials(
            &config,
            env(&[(ENV_TOKEN, "ghp_primary"), (ENV_TOKEN_FALLBACK, "ghp_fallback")]),
            no_prompt,
        )
        .unwrap();
        assert_eq!(creds.token.expose(), "ghp_primary");
    }

    #[test]
    fn test_resolve_credentials_prompts_for_missing() {
        let mut asked = Vec::new();
        let creds = resolve_credentials(&TrackerConfig::default(), env(&[]), |label: &str| {
            asked.push(label.to_string());
            Ok(Some(format!(" answer-{} ", asked.len())))
        })
        .unwrap();

        assert_eq!(asked.len(), 2);
        assert_eq!(creds.username, "answer-1");
        assert_eq!(creds.token.expose(), "answer-2");
    }

    #[test]
    fn test_resolve_credentials_fails_without_terminal() {
        let result = resolve_credentials(&TrackerConfig::default(), env(&[]), no_prompt);
        assert!(matches!(
            result,
            Err(ConfigError::MissingCredential("GitHub username"))
        ));
    }

    #[test]
    #[serial]
    fn test_apply_process_environment() {
        std::env::set_var(ENV_INTERVAL_SECS, "42");
        let config = TrackerConfig::default()
            .apply_env(|key| std::env::var(key).ok())
            .unwrap();
        std::env::remove_var(ENV_INTERVAL_SECS);

        assert_eq!(config.interval_secs, 42);
    }

    #[test]
    fn test_github_config_from_credentials() {
        let config = TrackerConfig::default();
        let creds = Credentials {
            username: "octocat".to_string(),
            token: AccessToken::new("t"),
        };
        let github = config.github_config(&creds);
        assert!(github.validate().is_ok());
        assert_eq!(
            github.clone_url_for(&config.repo_name),
            "https://github.com/octocat/code-tracking.git"
        );
        assert_eq!(creds.git().username, "octocat");
    }
}
