//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Backoff for remote calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Sync engine behavior
    #[serde(default)]
    pub sync: SyncConfig,

    /// Issue tracker connection
    #[serde(default)]
    pub jira: JiraConfig,

    /// Archive location for attachments
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Monitored sources
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0
            || self.http.search_timeout_secs == 0
            || self.http.view_timeout_secs == 0
        {
            return Err(AppError::validation("http timeouts must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::validation("retry.max_attempts must be > 0"));
        }
        if self.sync.search_window_days == 0 {
            return Err(AppError::validation("sync.search_window_days must be > 0"));
        }
        if self.jira.project.trim().is_empty() {
            return Err(AppError::validation("jira.project is empty"));
        }

        let mut names = std::collections::HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(AppError::validation("source with empty name"));
            }
            if !names.insert(source.name.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
            if source.kind == SourceKind::Rss && source.feed_url.is_none() {
                return Err(AppError::validation(format!(
                    "rss source '{}' has no feed_url",
                    source.name
                )));
            }
        }
        Ok(())
    }

    /// Look up a source by name.
    pub fn source(&self, name: &str) -> Result<&SourceConfig> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| AppError::config(format!("unknown source '{name}'")))
    }

    /// State file path for a source.
    pub fn state_path(&self, source: &SourceConfig) -> PathBuf {
        match &source.state_file {
            Some(path) => expand_home(path),
            None => expand_home(&self.sync.state_dir).join(format!("{}-state.json", source.name)),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Timeout for feed fetches and ticket writes
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Timeout for listing recent tickets
    #[serde(default = "defaults::search_timeout")]
    pub search_timeout_secs: u64,

    /// Timeout for viewing a single ticket
    #[serde(default = "defaults::view_timeout")]
    pub view_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            search_timeout_secs: defaults::search_timeout(),
            view_timeout_secs: defaults::view_timeout(),
        }
    }
}

/// Exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "defaults::base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "defaults::max_jitter")]
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay(),
            max_jitter_ms: defaults::max_jitter(),
        }
    }
}

/// Sync engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How far back the remote duplicate search looks
    #[serde(default = "defaults::search_window")]
    pub search_window_days: u32,

    /// Pause between ticket creations
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Directory holding per-source state files
    #[serde(default = "defaults::state_dir")]
    pub state_dir: String,

    /// Comment on tickets found by the remote duplicate search
    #[serde(default)]
    pub annotate_duplicates: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            search_window_days: defaults::search_window(),
            request_delay_ms: defaults::request_delay(),
            state_dir: defaults::state_dir(),
            annotate_duplicates: false,
        }
    }
}

/// Issue tracker connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraConfig {
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub email: String,

    #[serde(default = "defaults::project")]
    pub project: String,

    #[serde(default = "defaults::issue_type")]
    pub issue_type: String,

    /// Environment variable holding the API token
    #[serde(default = "defaults::token_env")]
    pub token_env: String,

    /// File holding the API token, read when the variable is unset
    #[serde(default)]
    pub token_file: Option<String>,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            email: String::new(),
            project: defaults::project(),
            issue_type: defaults::issue_type(),
            token_env: defaults::token_env(),
            token_file: None,
        }
    }
}

impl JiraConfig {
    /// Resolve the API token from the environment or the token file.
    pub fn token(&self) -> Result<String> {
        if let Ok(token) = std::env::var(&self.token_env) {
            if !token.trim().is_empty() {
                return Ok(token.trim().to_string());
            }
        }
        if let Some(path) = &self.token_file {
            let path = expand_home(path);
            let token = fs::read_to_string(&path).map_err(|e| {
                AppError::config(format!("cannot read token file {}: {e}", path.display()))
            })?;
            return Ok(token.trim().to_string());
        }
        Err(AppError::config(format!(
            "no Jira token: set {} or jira.token_file",
            self.token_env
        )))
    }
}

/// Local archive settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArchiveConfig {
    /// Root directory for archived files; archiving is off when unset
    #[serde(default)]
    pub root: Option<String>,

    /// Prefix for shareable links (e.g. a web server exposing `root`)
    #[serde(default)]
    pub link_base: Option<String>,
}

/// Kind of article source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Rss,
    Email,
    Scraped,
}

/// One monitored source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,

    /// Name shown in ticket titles and bodies; defaults to `name`
    #[serde(default)]
    pub display_name: Option<String>,

    pub kind: SourceKind,

    /// Ticket label, also used to narrow the remote duplicate search
    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub feed_url: Option<String>,

    /// Override for the state file location
    #[serde(default)]
    pub state_file: Option<String>,

    /// Drop feed entries that embed a video player
    #[serde(default)]
    pub skip_video: bool,

    /// Ticket summary, same placeholders as the body
    #[serde(default = "defaults::title_template")]
    pub title_template: String,

    #[serde(default = "defaults::body_template")]
    pub body_template: String,
}

impl SourceConfig {
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// Expand a leading `~` using `HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

mod defaults {
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; curator/0.1)".into()
    }
    pub fn timeout() -> u64 {
        60
    }
    pub fn search_timeout() -> u64 {
        30
    }
    pub fn view_timeout() -> u64 {
        10
    }

    pub fn max_attempts() -> u32 {
        5
    }
    pub fn base_delay() -> u64 {
        1000
    }
    pub fn max_jitter() -> u64 {
        1000
    }

    pub fn search_window() -> u32 {
        30
    }
    pub fn request_delay() -> u64 {
        500
    }
    pub fn state_dir() -> String {
        "~/.curator".into()
    }

    pub fn project() -> String {
        "GAT".into()
    }
    pub fn issue_type() -> String {
        "Task".into()
    }
    pub fn token_env() -> String {
        "JIRA_API_TOKEN".into()
    }

    pub fn title_template() -> String {
        "Review: {title}".into()
    }

    pub fn body_template() -> String {
        "{source} Article\n\n\
         **Article URL:** {url}\n\
         **Published:** {published}\n\
         **Author:** {author}\n\
         **Categories:** {categories}\n\
         **Archive:** {archive_link}\n\n\
         To be reviewed for relevance."
            .into()
    }
}
