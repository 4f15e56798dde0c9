use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::layout::TabMetrics;
use crate::reddit::{CommentSort, DEFAULT_BASE_URL};
use crate::request::RequestPolicy;

const DEFAULT_ENV_PREFIX: &str = "THREADSCOPE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub comments: CommentsConfig,
    #[serde(default)]
    pub requests: RequestsConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("threadscope/{} (+https://github.com/threadscope/threadscope)", crate::VERSION)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankingConfig {
    #[serde(default = "default_score_threshold")]
    pub hidden_post_score_threshold: i64,
    #[serde(default)]
    pub excluded_subreddits: Vec<String>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            hidden_post_score_threshold: default_score_threshold(),
            excluded_subreddits: Vec::new(),
        }
    }
}

fn default_score_threshold() -> i64 {
    -4
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentsConfig {
    #[serde(default = "default_score_threshold")]
    pub hidden_comment_score_threshold: i64,
    #[serde(default)]
    pub sort: CommentSort,
    #[serde(default = "default_keep_visited_tabs")]
    pub keep_visited_tabs: bool,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            hidden_comment_score_threshold: default_score_threshold(),
            sort: CommentSort::default(),
            keep_visited_tabs: default_keep_visited_tabs(),
        }
    }
}

fn default_keep_visited_tabs() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestsConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_slow_after", with = "humantime_serde")]
    pub slow_after: Duration,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RequestsConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            slow_after: default_slow_after(),
            timeout: default_timeout(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_slow_after() -> Duration {
    Duration::from_secs(3)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutConfig {
    #[serde(default = "default_tab_base_px")]
    pub tab_base_px: u32,
    #[serde(default = "default_tab_char_px")]
    pub tab_char_px: u32,
    #[serde(default = "default_margin_px")]
    pub margin_px: u32,
    #[serde(default = "default_container_width")]
    pub container_width: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            tab_base_px: default_tab_base_px(),
            tab_char_px: default_tab_char_px(),
            margin_px: default_margin_px(),
            container_width: default_container_width(),
        }
    }
}

fn default_tab_base_px() -> u32 {
    21
}

fn default_tab_char_px() -> u32 {
    7
}

fn default_margin_px() -> u32 {
    80
}

fn default_container_width() -> u32 {
    1280
}

impl Config {
    pub fn request_policy(&self) -> RequestPolicy {
        RequestPolicy {
            attempts: self.requests.attempts.max(1),
            slow_after: self.requests.slow_after,
            timeout: self.requests.timeout,
        }
    }

    pub fn tab_metrics(&self) -> TabMetrics {
        TabMetrics {
            base_px: self.layout.tab_base_px,
            char_px: self.layout.tab_char_px,
            margin_px: self.layout.margin_px,
        }
    }

    pub fn preferences(&self) -> Preferences {
        Preferences {
            thresholds: Thresholds {
                post: self.ranking.hidden_post_score_threshold,
                comment: self.comments.hidden_comment_score_threshold,
            },
            excluded_subreddits: self.ranking.excluded_subreddits.clone(),
            comment_sort: self.comments.sort,
            keep_visited_tabs: self.comments.keep_visited_tabs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Threads scoring below this are never ranked.
    pub post: i64,
    /// Comments scoring below this start collapsed.
    pub comment: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            post: default_score_threshold(),
            comment: default_score_threshold(),
        }
    }
}

/// User preferences the session reads at startup and on `configure`.
#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    pub thresholds: Thresholds,
    pub excluded_subreddits: Vec<String>,
    pub comment_sort: CommentSort,
    pub keep_visited_tabs: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Config::default().preferences()
    }
}

/// Where preferences come from. Chosen once at startup.
pub trait PreferenceStore: Send + Sync {
    fn load(&self) -> Result<Preferences>;
    fn save(&self, preferences: &Preferences) -> Result<()>;
}

/// A fixed set of preferences; saving is a no-op.
impl PreferenceStore for Preferences {
    fn load(&self) -> Result<Preferences> {
        Ok(self.clone())
    }

    fn save(&self, _preferences: &Preferences) -> Result<()> {
        Ok(())
    }
}

/// Preferences backed by the YAML config file.
#[derive(Debug, Clone, Default)]
pub struct FileStore {
    pub options: LoadOptions,
}

impl PreferenceStore for FileStore {
    fn load(&self) -> Result<Preferences> {
        Ok(load(self.options.clone())?.preferences())
    }

    fn save(&self, preferences: &Preferences) -> Result<()> {
        save_preferences(self.options.config_file.clone(), preferences).map(|_| ())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_config(cfg, load_env(prefix)?);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Fields of `other` that differ from the defaults win.
fn merge_config(mut base: Config, other: Config) -> Config {
    let defaults = Config::default();

    if other.api.base_url != defaults.api.base_url && !other.api.base_url.is_empty() {
        base.api.base_url = other.api.base_url;
    }
    if other.api.user_agent != defaults.api.user_agent && !other.api.user_agent.is_empty() {
        base.api.user_agent = other.api.user_agent;
    }

    if other.ranking.hidden_post_score_threshold != defaults.ranking.hidden_post_score_threshold {
        base.ranking.hidden_post_score_threshold = other.ranking.hidden_post_score_threshold;
    }
    if !other.ranking.excluded_subreddits.is_empty() {
        base.ranking.excluded_subreddits = other.ranking.excluded_subreddits;
    }

    if other.comments.hidden_comment_score_threshold
        != defaults.comments.hidden_comment_score_threshold
    {
        base.comments.hidden_comment_score_threshold =
            other.comments.hidden_comment_score_threshold;
    }
    if other.comments.sort != defaults.comments.sort {
        base.comments.sort = other.comments.sort;
    }
    if other.comments.keep_visited_tabs != defaults.comments.keep_visited_tabs {
        base.comments.keep_visited_tabs = other.comments.keep_visited_tabs;
    }

    if other.requests.attempts != defaults.requests.attempts && other.requests.attempts != 0 {
        base.requests.attempts = other.requests.attempts;
    }
    if other.requests.slow_after != defaults.requests.slow_after {
        base.requests.slow_after = other.requests.slow_after;
    }
    if other.requests.timeout != defaults.requests.timeout {
        base.requests.timeout = other.requests.timeout;
    }

    if other.layout.tab_base_px != defaults.layout.tab_base_px {
        base.layout.tab_base_px = other.layout.tab_base_px;
    }
    if other.layout.tab_char_px != defaults.layout.tab_char_px {
        base.layout.tab_char_px = other.layout.tab_char_px;
    }
    if other.layout.margin_px != defaults.layout.margin_px {
        base.layout.margin_px = other.layout.margin_px;
    }
    if other.layout.container_width != defaults.layout.container_width
        && other.layout.container_width != 0
    {
        base.layout.container_width = other.layout.container_width;
    }

    base
}

fn load_env(prefix: &str) -> Result<Config> {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    if map.is_empty() {
        return Ok(Config::default());
    }

    let mut cfg = Config::default();

    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }

    Ok(cfg)
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "ranking.hidden_post_score_threshold" => {
            if let Ok(parsed) = value.trim().parse::<i64>() {
                cfg.ranking.hidden_post_score_threshold = parsed;
            }
        }
        "ranking.excluded_subreddits" => {
            cfg.ranking.excluded_subreddits = split_list(&value);
        }
        "comments.hidden_comment_score_threshold" => {
            if let Ok(parsed) = value.trim().parse::<i64>() {
                cfg.comments.hidden_comment_score_threshold = parsed;
            }
        }
        "comments.sort" => match CommentSort::from_key(&value) {
            Some(sort) => cfg.comments.sort = sort,
            None => tracing::warn!(value = %value, "ignoring unknown comment sort"),
        },
        "comments.keep_visited_tabs" => {
            cfg.comments.keep_visited_tabs =
                matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        "requests.attempts" => {
            if let Ok(parsed) = value.trim().parse::<u32>() {
                cfg.requests.attempts = parsed;
            }
        }
        "requests.slow_after" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.requests.slow_after = duration;
            }
        }
        "requests.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.requests.timeout = duration;
            }
        }
        "layout.tab_base_px" => {
            if let Ok(parsed) = value.trim().parse::<u32>() {
                cfg.layout.tab_base_px = parsed;
            }
        }
        "layout.tab_char_px" => {
            if let Ok(parsed) = value.trim().parse::<u32>() {
                cfg.layout.tab_char_px = parsed;
            }
        }
        "layout.margin_px" => {
            if let Ok(parsed) = value.trim().parse::<u32>() {
                cfg.layout.margin_px = parsed;
            }
        }
        "layout.container_width" => {
            if let Ok(parsed) = value.trim().parse::<u32>() {
                cfg.layout.container_width = parsed;
            }
        }
        _ => {}
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("threadscope").join("config.yaml"))
}

/// Writes the ranking and comment sections, keeping everything else already
/// in the file.
pub fn save_preferences(path: Option<PathBuf>, preferences: &Preferences) -> Result<PathBuf> {
    let path = if let Some(path) = path {
        path
    } else {
        default_config_path().context("config: unable to determine default config path")?
    };

    let mut cfg = if path.exists() {
        read_config_file(&path)?
    } else {
        Config::default()
    };

    cfg.ranking.hidden_post_score_threshold = preferences.thresholds.post;
    cfg.ranking.excluded_subreddits = preferences.excluded_subreddits.clone();
    cfg.comments.hidden_comment_score_threshold = preferences.thresholds.comment;
    cfg.comments.sort = preferences.comment_sort;
    cfg.comments.keep_visited_tabs = preferences.keep_visited_tabs;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }

    let contents = serde_yaml::to_string(&cfg).context("config: failed to serialize config")?;
    fs::write(&path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;

    Ok(path)
}
