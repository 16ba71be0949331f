//! Connection settings for the GitHub client and the git copier.

use splitsync_core::GitHubSettings;

use crate::error::{GitHubError, Result};

/// Resolved GitHub connection settings, token included.
#[derive(Clone)]
pub struct GitHubConfig {
    /// REST API root, without a trailing slash.
    pub api_url: String,
    /// Clone URL template with `{token}` and `{repo}` placeholders.
    pub git_url: String,
    pub token: String,
    pub user_agent: String,
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_url", &self.api_url)
            .field("git_url", &self.git_url)
            .field("token", &"***")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl GitHubConfig {
    pub fn new(api_url: &str, git_url: &str, token: &str) -> Self {
        GitHubConfig {
            api_url: api_url.trim_end_matches('/').to_string(),
            git_url: git_url.to_string(),
            token: token.to_string(),
            user_agent: format!("splitsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Build from config-file settings, reading the token from `token_env`.
    pub fn from_settings(settings: &GitHubSettings) -> Result<Self> {
        let token = std::env::var(&settings.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| GitHubError::MissingToken(settings.token_env.clone()))?;
        Ok(Self::new(&settings.api_url, &settings.git_url, &token))
    }

    /// Clone URL for `repo` (`owner/name`).
    pub fn clone_url(&self, repo: &str) -> String {
        self.git_url
            .replace("{token}", &self.token)
            .replace("{repo}", repo)
    }

    /// Replace the token in `text`, e.g. git stderr echoing a clone URL.
    pub fn redact(&self, text: &str) -> String {
        if self.token.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.token, "***")
        }
    }
}
