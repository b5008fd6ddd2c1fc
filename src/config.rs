use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::auth::Token;
use crate::error::{CILensError, Result};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Lookup used to read environment variables. Injected so tests never touch
/// the process environment.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Built-in provider types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    GitHub,
    GitLab,
    Jenkins,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::GitHub, Self::GitLab, Self::Jenkins];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Jenkins => "jenkins",
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = CILensError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            "jenkins" => Ok(Self::Jenkins),
            other => Err(CILensError::UnregisteredProvider(other.to_string())),
        }
    }
}

/// Connection settings for one provider instance. Immutable once an adapter is built.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderConfig {
    GitHub(GitHubConfig),
    GitLab(GitLabConfig),
    Jenkins(JenkinsConfig),
    /// Settings for providers registered outside this crate.
    Custom(CustomConfig),
}

impl ProviderConfig {
    /// Provider type this configuration targets.
    pub fn provider_type(&self) -> &str {
        match self {
            Self::GitHub(_) => ProviderKind::GitHub.as_str(),
            Self::GitLab(_) => ProviderKind::GitLab.as_str(),
            Self::Jenkins(_) => ProviderKind::Jenkins.as_str(),
            Self::Custom(custom) => &custom.provider,
        }
    }

    /// Returns the value of a named field, or `None` when it is unset or blank.
    pub fn field(&self, name: &str) -> Option<String> {
        let value = match self {
            Self::GitHub(c) => match name {
                "token" => Some(c.token.as_str().to_string()),
                "base_url" => Some(c.base_url.clone()),
                "timeout_ms" => Some(c.timeout_ms.to_string()),
                "webhook_secret" => c.webhook_secret.as_ref().map(|s| s.as_str().to_string()),
                "owner" => c.owner.clone(),
                "repo" => c.repo.clone(),
                _ => None,
            },
            Self::GitLab(c) => match name {
                "token" => Some(c.token.as_str().to_string()),
                "base_url" => Some(c.base_url.clone()),
                "timeout_ms" => Some(c.timeout_ms.to_string()),
                "webhook_secret" => c.webhook_secret.as_ref().map(|s| s.as_str().to_string()),
                "project_id" => c.project_id.clone(),
                _ => None,
            },
            Self::Jenkins(c) => match name {
                "token" => Some(c.token.as_str().to_string()),
                "base_url" => Some(c.base_url.clone()),
                "username" => Some(c.username.clone()),
                "timeout_ms" => Some(c.timeout_ms.to_string()),
                "webhook_secret" => c.webhook_secret.as_ref().map(|s| s.as_str().to_string()),
                _ => None,
            },
            Self::Custom(c) => c.settings.get(name).cloned(),
        };

        value.filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitHubConfig {
    /// Personal access token or app installation token
    #[serde(default)]
    pub token: Token,

    /// REST API base URL
    #[serde(default = "default_github_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    pub webhook_secret: Option<Token>,

    /// Repository owner used by single-pipeline lookups
    pub owner: Option<String>,

    /// Repository name used by single-pipeline lookups
    pub repo: Option<String>,
}

impl GitHubConfig {
    pub fn new(token: impl Into<Token>) -> Self {
        Self {
            token: token.into(),
            base_url: default_github_base_url(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            webhook_secret: None,
            owner: None,
            repo: None,
        }
    }

    /// Reads `GITHUB_TOKEN`, `GITHUB_API_URL`, `GITHUB_TIMEOUT`, `GITHUB_WEBHOOK_SECRET`,
    /// `GITHUB_OWNER` and `GITHUB_REPO`. Returns `None` without a token.
    pub fn from_env_with(lookup: EnvLookup<'_>) -> Option<Self> {
        let token = env_value(lookup, "GITHUB_TOKEN")?;

        Some(Self {
            token: Token::from(token),
            base_url: env_value(lookup, "GITHUB_API_URL").unwrap_or_else(default_github_base_url),
            timeout_ms: env_timeout(lookup, "GITHUB_TIMEOUT"),
            webhook_secret: env_value(lookup, "GITHUB_WEBHOOK_SECRET").map(Token::from),
            owner: env_value(lookup, "GITHUB_OWNER"),
            repo: env_value(lookup, "GITHUB_REPO"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitLabConfig {
    /// Personal, project or group access token (sent as `PRIVATE-TOKEN`)
    #[serde(default)]
    pub token: Token,

    /// GitLab instance base URL
    #[serde(default = "default_gitlab_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    pub webhook_secret: Option<Token>,

    /// Numeric project id or `group/project` path used by single-pipeline lookups
    pub project_id: Option<String>,
}

impl GitLabConfig {
    pub fn new(token: impl Into<Token>) -> Self {
        Self {
            token: token.into(),
            base_url: default_gitlab_base_url(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            webhook_secret: None,
            project_id: None,
        }
    }

    /// Reads `GITLAB_TOKEN`, `GITLAB_API_URL`, `GITLAB_TIMEOUT`, `GITLAB_WEBHOOK_SECRET`
    /// and `GITLAB_PROJECT_ID`. Returns `None` without a token.
    pub fn from_env_with(lookup: EnvLookup<'_>) -> Option<Self> {
        let token = env_value(lookup, "GITLAB_TOKEN")?;

        Some(Self {
            token: Token::from(token),
            base_url: env_value(lookup, "GITLAB_API_URL").unwrap_or_else(default_gitlab_base_url),
            timeout_ms: env_timeout(lookup, "GITLAB_TIMEOUT"),
            webhook_secret: env_value(lookup, "GITLAB_WEBHOOK_SECRET").map(Token::from),
            project_id: env_value(lookup, "GITLAB_PROJECT_ID"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JenkinsConfig {
    /// Jenkins controller URL; there is no public default
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub username: String,

    /// API token of `username`
    #[serde(default)]
    pub token: Token,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    pub webhook_secret: Option<Token>,
}

impl JenkinsConfig {
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, token: impl Into<Token>) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            token: token.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            webhook_secret: None,
        }
    }

    /// Reads `JENKINS_API_KEY` (or `JENKINS_TOKEN`), `JENKINS_API_URL` (or `JENKINS_URL`),
    /// `JENKINS_USERNAME`, `JENKINS_TIMEOUT` and `JENKINS_WEBHOOK_SECRET`.
    /// Returns `None` unless the key, URL and username are all present.
    pub fn from_env_with(lookup: EnvLookup<'_>) -> Option<Self> {
        let token = env_value(lookup, "JENKINS_API_KEY").or_else(|| env_value(lookup, "JENKINS_TOKEN"))?;
        let base_url = env_value(lookup, "JENKINS_API_URL").or_else(|| env_value(lookup, "JENKINS_URL"))?;
        let username = env_value(lookup, "JENKINS_USERNAME")?;

        Some(Self {
            base_url,
            username,
            token: Token::from(token),
            timeout_ms: env_timeout(lookup, "JENKINS_TIMEOUT"),
            webhook_secret: env_value(lookup, "JENKINS_WEBHOOK_SECRET").map(Token::from),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomConfig {
    pub provider: String,
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl CustomConfig {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            settings: BTreeMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }
}

fn env_value(lookup: EnvLookup<'_>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_timeout(lookup: EnvLookup<'_>, key: &str) -> u64 {
    match env_value(lookup, key) {
        Some(raw) => match raw.parse::<u64>() {
            Ok(ms) if ms > 0 => ms,
            _ => {
                warn!("Ignoring invalid {key}={raw}, using default of {DEFAULT_TIMEOUT_MS}ms");
                DEFAULT_TIMEOUT_MS
            }
        },
        None => DEFAULT_TIMEOUT_MS,
    }
}

/// Reads from the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn default_github_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_gitlab_base_url() -> String {
    "https://gitlab.com".to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Configuration file for the `cilens-sync` binary.
///
/// Each section is optional; a provider without a section (or without a token)
/// falls back to environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    pub github: Option<GitHubConfig>,
    pub gitlab: Option<GitLabConfig>,
    pub jenkins: Option<JenkinsConfig>,
}

impl FileConfig {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./cilens-sync.toml, ./cilens-sync.json, ./cilens-sync.yaml, ./cilens-sync.yml
    /// 3. `<config dir>/cilens-sync/config.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        for candidate in Self::candidates() {
            if candidate.exists() {
                return Self::load_from_path(&candidate);
            }
        }

        debug!("No configuration file found, using environment only");
        Ok(Self::default())
    }

    fn candidates() -> Vec<PathBuf> {
        let mut candidates: Vec<PathBuf> = [
            "cilens-sync.toml",
            "cilens-sync.json",
            "cilens-sync.yaml",
            "cilens-sync.yml",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();

        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("cilens-sync").join("config.toml"));
        }

        candidates
    }

    /// Load configuration from a specific file path.
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Provider configuration from the file, if the section exists and carries a token.
    pub fn provider_config(&self, kind: ProviderKind) -> Option<ProviderConfig> {
        match kind {
            ProviderKind::GitHub => self
                .github
                .clone()
                .filter(|c| !c.token.is_empty())
                .map(ProviderConfig::GitHub),
            ProviderKind::GitLab => self
                .gitlab
                .clone()
                .filter(|c| !c.token.is_empty())
                .map(ProviderConfig::GitLab),
            ProviderKind::Jenkins => self
                .jenkins
                .clone()
                .filter(|c| !c.token.is_empty())
                .map(ProviderConfig::Jenkins),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_github_from_env_without_token_is_none() {
        let lookup = lookup_from(&[("GITHUB_API_URL", "https://ghe.example.com/api/v3")]);
        assert!(GitHubConfig::from_env_with(&lookup).is_none());
    }

    #[test]
    fn test_github_from_env_with_defaults() {
        let lookup = lookup_from(&[("GITHUB_TOKEN", "ghp_abc")]);
        let config = GitHubConfig::from_env_with(&lookup).unwrap();
        assert_eq!(config.token.as_str(), "ghp_abc");
        assert_eq!(config.base_url, "https://api.github.com");
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(config.webhook_secret.is_none());
    }

    #[test]
    fn test_github_from_env_with_overrides() {
        let lookup = lookup_from(&[
            ("GITHUB_TOKEN", "ghp_abc"),
            ("GITHUB_API_URL", "https://ghe.example.com/api/v3"),
            ("GITHUB_TIMEOUT", "5000"),
            ("GITHUB_WEBHOOK_SECRET", "s3cret"),
            ("GITHUB_OWNER", "acme"),
            ("GITHUB_REPO", "widgets"),
        ]);
        let config = GitHubConfig::from_env_with(&lookup).unwrap();
        assert_eq!(config.base_url, "https://ghe.example.com/api/v3");
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.webhook_secret.unwrap().as_str(), "s3cret");
        assert_eq!(config.owner.as_deref(), Some("acme"));
        assert_eq!(config.repo.as_deref(), Some("widgets"));
    }

    #[test]
    fn test_invalid_timeout_falls_back_to_default() {
        let lookup = lookup_from(&[("GITLAB_TOKEN", "glpat"), ("GITLAB_TIMEOUT", "soon")]);
        let config = GitLabConfig::from_env_with(&lookup).unwrap();
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_blank_token_counts_as_missing() {
        let lookup = lookup_from(&[("GITLAB_TOKEN", "   ")]);
        assert!(GitLabConfig::from_env_with(&lookup).is_none());
    }

    #[test]
    fn test_jenkins_from_env_requires_url_and_username() {
        let partial = lookup_from(&[("JENKINS_API_KEY", "11aa")]);
        assert!(JenkinsConfig::from_env_with(&partial).is_none());

        let full = lookup_from(&[
            ("JENKINS_API_KEY", "11aa"),
            ("JENKINS_URL", "https://ci.example.com"),
            ("JENKINS_USERNAME", "bot"),
        ]);
        let config = JenkinsConfig::from_env_with(&full).unwrap();
        assert_eq!(config.base_url, "https://ci.example.com");
        assert_eq!(config.username, "bot");
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_field_lookup_filters_blank_values() {
        let config = ProviderConfig::GitHub(GitHubConfig::new(""));
        assert_eq!(config.field("token"), None);
        assert_eq!(config.field("base_url").as_deref(), Some("https://api.github.com"));
        assert_eq!(config.field("project_id"), None);
    }

    #[test]
    fn test_custom_field_lookup() {
        let config = ProviderConfig::Custom(CustomConfig::new("acme-ci").with_setting("api_key", "t"));
        assert_eq!(config.provider_type(), "acme-ci");
        assert_eq!(config.field("api_key").as_deref(), Some("t"));
        assert_eq!(config.field("missing"), None);
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("GitHub".parse::<ProviderKind>().unwrap(), ProviderKind::GitHub);
        assert_eq!("jenkins".parse::<ProviderKind>().unwrap(), ProviderKind::Jenkins);
        assert!("bamboo".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[github]
token = "ghp-test-token"
owner = "acme"
repo = "widgets"

[gitlab]
token = "glpat-test-token"
base-url = "https://gitlab.example.com"
timeout-ms = 10000
project-id = "group/project"
"#;
        write!(temp_file, "{toml_content}").unwrap();

        let config = FileConfig::load_from_path(temp_file.path()).unwrap();
        let gitlab = config.gitlab.clone().unwrap();
        assert_eq!(gitlab.token.as_str(), "glpat-test-token");
        assert_eq!(gitlab.base_url, "https://gitlab.example.com");
        assert_eq!(gitlab.timeout_ms, 10_000);
        assert_eq!(gitlab.project_id.as_deref(), Some("group/project"));

        let github = config.github.clone().unwrap();
        assert_eq!(github.base_url, "https://api.github.com");
        assert!(config.jenkins.is_none());
        assert!(config.provider_config(ProviderKind::Jenkins).is_none());
        assert!(matches!(
            config.provider_config(ProviderKind::GitHub),
            Some(ProviderConfig::GitHub(_))
        ));
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "jenkins": {
    "base-url": "https://ci.example.com",
    "username": "bot",
    "token": "11aa"
  }
}"#;
        write!(temp_file, "{json_content}").unwrap();

        let config = FileConfig::load_from_path(temp_file.path()).unwrap();
        let jenkins = config.jenkins.unwrap();
        assert_eq!(jenkins.base_url, "https://ci.example.com");
        assert_eq!(jenkins.username, "bot");
        assert_eq!(jenkins.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_section_without_token_is_ignored() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "gitlab:\n  base-url: https://gitlab.example.com\n").unwrap();

        let config = FileConfig::load_from_path(temp_file.path()).unwrap();
        assert!(config.gitlab.is_some());
        assert!(config.provider_config(ProviderKind::GitLab).is_none());
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let result = FileConfig::load(Some(Path::new("does-not-exist.toml")));
        assert!(result.is_err());
    }
}
