//! Configuration loader, setting sanitiser and per-cycle options store.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::error::ValidationError;

pub const ALLOWED_MODELS: &[&str] = &[
    "gpt-3.5-turbo",
    "gpt-3.5-turbo-16k",
    "gpt-4",
    "gpt-4-turbo",
    "gpt-4o",
];
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const IMAGE_SIZES: &[&str] = &["1024x1024", "1792x1024", "1024x1792"];

const DEFAULT_MAX_GAMES_PER_DAY: i64 = 5;
const DEFAULT_MAX_GAMES_PER_HOUR: i64 = 5;
const DEFAULT_POST_INTERVALS: i64 = 5;

pub const DEFAULT_CONTENT_PROMPT: &str = "You are a passionate football blogger writing for fans who love deep match insights. Your goal is to create an engaging, narrative-driven preview that feels like a conversation with a knowledgeable friend at a sports bar.

Writing Instructions:
1. Write in a conversational, passionate tone as if discussing the match with a close friend
2. Provide context beyond raw statistics - discuss team dynamics and potential match narratives
3. Include a balanced, nuanced prediction that considers both statistical likelihood and the unpredictable nature of football
4. Use engaging storytelling techniques to make the preview compelling
5. Incorporate the betting odds context subtly, focusing on match analysis rather than pure gambling perspective
6. Aim for 500-700 words
7. End with a provocative question or intriguing prediction to spark reader engagement

Special Requests:
- Avoid generic sports cliches
- Use vivid, descriptive language
- Highlight potential match-defining moments
- Create a sense of anticipation and excitement";

/// True when the URL path ends in a jpg, jpeg, png or gif extension, in any case.
fn has_image_extension(path: &str) -> bool {
    path.rsplit_once('.')
        .map(|(_, ext)| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png" | "gif"))
        .unwrap_or(false)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub posts: Posts,
    #[serde(default)]
    pub image: ImageOptions,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default = "default_ingest_interval")]
    pub ingest_interval_secs: u64,
    #[serde(default = "default_generation_interval")]
    pub generation_interval_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Credentials and endpoints for both upstream providers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Api {
    #[serde(default = "default_sport_api_base_url")]
    pub sport_api_base_url: String,
    #[serde(default)]
    pub sport_api_key: String,
    #[serde(default = "default_openai_api_base_url")]
    pub openai_api_base_url: String,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_model")]
    pub openai_model: String,
}

/// Publishing caps, pacing and article defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Posts {
    #[serde(default = "default_max_games_per_day")]
    pub max_games_per_day: i64,
    #[serde(default = "default_max_games_per_hour")]
    pub max_games_per_hour: i64,
    #[serde(default = "default_post_intervals")]
    pub post_intervals: i64,
    #[serde(default = "default_post_author")]
    pub post_author: i64,
    #[serde(default)]
    pub post_category: i64,
    #[serde(default = "default_content_prompt")]
    pub ai_content_prompt: String,
    #[serde(default)]
    pub featured_image_url: String,
    #[serde(default)]
    pub dalle_image_generation: bool,
}

/// Parameters for generated featured images.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageOptions {
    #[serde(default = "default_image_size")]
    pub size: String,
    #[serde(default = "default_image_quality")]
    pub quality: String,
}

impl ImageOptions {
    pub fn is_hd(&self) -> bool {
        self.quality == "hd"
    }
}

/// The operator-facing setting set, resolved once per cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub sport_api_key: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub max_games_per_day: u32,
    pub max_games_per_hour: u32,
    pub post_intervals: u32,
    pub post_author: i64,
    pub post_category: Option<i64>,
    pub ai_content_prompt: String,
    pub featured_image_url: Option<String>,
    pub dalle_image_generation: bool,
}

fn default_ingest_interval() -> u64 {
    3 * 60 * 60
}
fn default_generation_interval() -> u64 {
    60 * 60 - 10 * 60
}
fn default_request_timeout() -> u64 {
    30
}
fn default_sport_api_base_url() -> String {
    "https://app.scalesp.com/api/v1/football/".to_string()
}
fn default_openai_api_base_url() -> String {
    "https://api.openai.com/v1/".to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_max_games_per_day() -> i64 {
    DEFAULT_MAX_GAMES_PER_DAY
}
fn default_max_games_per_hour() -> i64 {
    DEFAULT_MAX_GAMES_PER_HOUR
}
fn default_post_intervals() -> i64 {
    DEFAULT_POST_INTERVALS
}
fn default_post_author() -> i64 {
    1
}
fn default_content_prompt() -> String {
    DEFAULT_CONTENT_PROMPT.to_string()
}
fn default_image_size() -> String {
    "1024x1024".to_string()
}
fn default_image_quality() -> String {
    "standard".to_string()
}

impl Default for Api {
    fn default() -> Self {
        Self {
            sport_api_base_url: default_sport_api_base_url(),
            sport_api_key: String::new(),
            openai_api_base_url: default_openai_api_base_url(),
            openai_api_key: String::new(),
            openai_model: default_model(),
        }
    }
}

impl Default for Posts {
    fn default() -> Self {
        Self {
            max_games_per_day: DEFAULT_MAX_GAMES_PER_DAY,
            max_games_per_hour: DEFAULT_MAX_GAMES_PER_HOUR,
            post_intervals: DEFAULT_POST_INTERVALS,
            post_author: default_post_author(),
            post_category: 0,
            ai_content_prompt: default_content_prompt(),
            featured_image_url: String::new(),
            dalle_image_generation: false,
        }
    }
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            size: default_image_size(),
            quality: default_image_quality(),
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/sports_writer.db", self.app.data_dir))
    }

    /// Replace out-of-range settings with safe defaults, reporting each substitution.
    pub fn sanitize(&mut self) -> Vec<ValidationError> {
        let mut rejected = Vec::new();

        self.api.sport_api_key = self.api.sport_api_key.trim().to_string();
        self.api.openai_api_key = self.api.openai_api_key.trim().to_string();

        if !ALLOWED_MODELS.contains(&self.api.openai_model.as_str()) {
            rejected.push(ValidationError {
                field: "api.openai_model",
                message: format!(
                    "Invalid OpenAI model '{}' selected. Defaulting to {}.",
                    self.api.openai_model, DEFAULT_MODEL
                ),
            });
            self.api.openai_model = DEFAULT_MODEL.to_string();
        }

        let p = &mut self.posts;
        clamp_setting(
            &mut p.max_games_per_day,
            1..=100,
            DEFAULT_MAX_GAMES_PER_DAY,
            "posts.max_games_per_day",
            "Maximum games per day should be between 1 and 100.",
            &mut rejected,
        );
        clamp_setting(
            &mut p.max_games_per_hour,
            1..=24,
            DEFAULT_MAX_GAMES_PER_HOUR,
            "posts.max_games_per_hour",
            "Maximum games per hour should be between 1 and 24.",
            &mut rejected,
        );
        clamp_setting(
            &mut p.post_intervals,
            1..=30,
            DEFAULT_POST_INTERVALS,
            "posts.post_intervals",
            "Post intervals should be between 1 and 30 minutes.",
            &mut rejected,
        );

        let url = p.featured_image_url.trim().to_string();
        p.featured_image_url = String::new();
        if !url.is_empty() {
            match Url::parse(&url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
                    if has_image_extension(parsed.path()) {
                        p.featured_image_url = url;
                    } else {
                        rejected.push(ValidationError {
                            field: "posts.featured_image_url",
                            message: "The featured image URL does not point to a valid image file (jpg, jpeg, png, or gif).".to_string(),
                        });
                    }
                }
                _ => rejected.push(ValidationError {
                    field: "posts.featured_image_url",
                    message: "The featured image URL is not a valid URL.".to_string(),
                }),
            }
        }

        if !IMAGE_SIZES.contains(&self.image.size.as_str()) {
            rejected.push(ValidationError {
                field: "image.size",
                message: format!(
                    "Unsupported image size '{}'. Defaulting to 1024x1024.",
                    self.image.size
                ),
            });
            self.image.size = default_image_size();
        }
        if !matches!(self.image.quality.as_str(), "standard" | "hd") {
            rejected.push(ValidationError {
                field: "image.quality",
                message: format!(
                    "Unsupported image quality '{}'. Defaulting to standard.",
                    self.image.quality
                ),
            });
            self.image.quality = default_image_quality();
        }

        rejected
    }

    /// Snapshot of the operator settings. Call after `sanitize`.
    pub fn settings(&self) -> Settings {
        let non_empty = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };
        Settings {
            sport_api_key: self.api.sport_api_key.clone(),
            openai_api_key: self.api.openai_api_key.clone(),
            openai_model: self.api.openai_model.clone(),
            max_games_per_day: self.posts.max_games_per_day.max(0) as u32,
            max_games_per_hour: self.posts.max_games_per_hour.max(0) as u32,
            post_intervals: self.posts.post_intervals.max(0) as u32,
            post_author: self.posts.post_author,
            post_category: (self.posts.post_category > 0).then_some(self.posts.post_category),
            ai_content_prompt: self.posts.ai_content_prompt.clone(),
            featured_image_url: non_empty(&self.posts.featured_image_url),
            dalle_image_generation: self.posts.dalle_image_generation,
        }
    }
}

fn clamp_setting(
    value: &mut i64,
    range: std::ops::RangeInclusive<i64>,
    default: i64,
    field: &'static str,
    message: &str,
    rejected: &mut Vec<ValidationError>,
) {
    if !range.contains(value) {
        rejected.push(ValidationError {
            field,
            message: message.to_string(),
        });
        *value = default;
    }
}

/// Load configuration from a YAML file, validate it and sanitise its settings.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    parse(&content)
}

/// Parse, validate and sanitise configuration text.
pub fn parse(content: &str) -> Result<Config, ConfigError> {
    let mut cfg: Config = serde_yaml::from_str(content)?;
    validate(&cfg)?;
    for rejected in cfg.sanitize() {
        warn!(field = rejected.field, "{}", rejected.message);
    }
    Ok(cfg)
}

/// Validate structural settings that have no safe default.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.ingest_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.ingest_interval_secs must be > 0"));
    }
    if cfg.app.generation_interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "app.generation_interval_secs must be > 0",
        ));
    }
    if cfg.app.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid("app.request_timeout_secs must be > 0"));
    }
    if Url::parse(&cfg.api.sport_api_base_url).is_err() {
        return Err(ConfigError::Invalid("api.sport_api_base_url must be a URL"));
    }
    if Url::parse(&cfg.api.openai_api_base_url).is_err() {
        return Err(ConfigError::Invalid("api.openai_api_base_url must be a URL"));
    }
    Ok(())
}

/// Source of configuration, consulted once at the start of every cycle.
pub trait OptionsStore: Send + Sync {
    fn resolve(&self) -> Result<Config, ConfigError>;
}

/// Re-reads the YAML file on every resolve so operator edits apply without restart.
#[derive(Debug, Clone)]
pub struct FileOptions {
    path: PathBuf,
}

impl FileOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OptionsStore for FileOptions {
    fn resolve(&self) -> Result<Config, ConfigError> {
        load(Some(&self.path))
    }
}

/// A fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticOptions(pub Config);

impl OptionsStore for StaticOptions {
    fn resolve(&self) -> Result<Config, ConfigError> {
        Ok(self.0.clone())
    }
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  ingest_interval_secs: 10800
  generation_interval_secs: 3000
  request_timeout_secs: 30

api:
  sport_api_base_url: "https://app.scalesp.com/api/v1/football/"
  sport_api_key: "YOUR_SPORT_API_KEY"
  openai_api_base_url: "https://api.openai.com/v1/"
  openai_api_key: "YOUR_OPENAI_API_KEY"
  openai_model: "gpt-4o"

posts:
  max_games_per_day: 10
  max_games_per_hour: 3
  post_intervals: 10
  post_author: 2
  post_category: 7
  ai_content_prompt: "Write an engaging football match preview."
  featured_image_url: "https://cdn.example.com/default-preview.jpg"
  dalle_image_generation: false

image:
  size: "1792x1024"
  quality: "hd"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example_config() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    #[test]
    fn parse_example_ok() {
        let mut cfg = example_config();
        validate(&cfg).unwrap();
        assert!(cfg.sanitize().is_empty());
        let s = cfg.settings();
        assert_eq!(s.openai_model, "gpt-4o");
        assert_eq!(s.max_games_per_hour, 3);
        assert_eq!(s.post_intervals, 10);
        assert_eq!(s.post_category, Some(7));
        assert_eq!(
            s.featured_image_url.as_deref(),
            Some("https://cdn.example.com/default-preview.jpg")
        );
        assert!(cfg.image.is_hd());
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse("app:\n  data_dir: ./data\n").unwrap();
        assert_eq!(cfg.app.ingest_interval_secs, 10800);
        assert_eq!(cfg.app.generation_interval_secs, 3000);
        let s = cfg.settings();
        assert_eq!(s.openai_model, DEFAULT_MODEL);
        assert_eq!(s.max_games_per_day, 5);
        assert_eq!(s.max_games_per_hour, 5);
        assert_eq!(s.post_intervals, 5);
        assert_eq!(s.post_category, None);
        assert_eq!(s.featured_image_url, None);
        assert!(!s.dalle_image_generation);
        assert!(s.sport_api_key.is_empty());
        assert_eq!(s.ai_content_prompt, DEFAULT_CONTENT_PROMPT);
        assert_eq!(cfg.image.size, "1024x1024");
    }

    #[test]
    fn invalid_data_dir() {
        let mut cfg = example_config();
        cfg.app.data_dir = "  ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("data_dir")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn zero_intervals_rejected() {
        let mut cfg = example_config();
        cfg.app.generation_interval_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_config();
        cfg.app.ingest_interval_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unknown_model_falls_back() {
        let mut cfg = example_config();
        cfg.api.openai_model = "gpt-9000".into();
        let rejected = cfg.sanitize();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].field, "api.openai_model");
        assert_eq!(cfg.api.openai_model, DEFAULT_MODEL);
    }

    #[test]
    fn out_of_range_caps_fall_back() {
        let mut cfg = example_config();
        cfg.posts.max_games_per_day = 0;
        cfg.posts.max_games_per_hour = 25;
        cfg.posts.post_intervals = 31;
        let fields: Vec<_> = cfg.sanitize().into_iter().map(|r| r.field).collect();
        assert_eq!(
            fields,
            vec![
                "posts.max_games_per_day",
                "posts.max_games_per_hour",
                "posts.post_intervals"
            ]
        );
        assert_eq!(cfg.posts.max_games_per_day, 5);
        assert_eq!(cfg.posts.max_games_per_hour, 5);
        assert_eq!(cfg.posts.post_intervals, 5);
    }

    #[test]
    fn featured_image_url_validation() {
        let mut cfg = example_config();
        cfg.posts.featured_image_url = "not a url".into();
        assert_eq!(cfg.sanitize()[0].field, "posts.featured_image_url");
        assert!(cfg.posts.featured_image_url.is_empty());

        let mut cfg = example_config();
        cfg.posts.featured_image_url = "https://cdn.example.com/doc.pdf".into();
        assert_eq!(cfg.sanitize().len(), 1);
        assert!(cfg.settings().featured_image_url.is_none());

        let mut cfg = example_config();
        cfg.posts.featured_image_url = "https://cdn.example.com/Banner.PNG".into();
        assert!(cfg.sanitize().is_empty());

        let mut cfg = example_config();
        cfg.posts.featured_image_url = "https://cdn.example.com/a.jpeg?v=2".into();
        assert!(cfg.sanitize().is_empty());
        assert_eq!(cfg.posts.featured_image_url, "https://cdn.example.com/a.jpeg?v=2");

        for url in ["https://cdn.example.com/image", "https://cdn.example.com/v1.2/banner"] {
            let mut cfg = example_config();
            cfg.posts.featured_image_url = url.into();
            assert_eq!(cfg.sanitize().len(), 1, "{}", url);
            assert!(cfg.posts.featured_image_url.is_empty());
        }
    }

    #[test]
    fn image_options_fall_back() {
        let mut cfg = example_config();
        cfg.image.size = "512x512".into();
        cfg.image.quality = "ultra".into();
        assert_eq!(cfg.sanitize().len(), 2);
        assert_eq!(cfg.image, ImageOptions::default());
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg = example_config();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn file_options_reread_each_resolve() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let store = FileOptions::new(&p);
        assert_eq!(store.resolve().unwrap().posts.max_games_per_hour, 3);

        fs::write(&p, example().replace("max_games_per_hour: 3", "max_games_per_hour: 4")).unwrap();
        assert_eq!(store.resolve().unwrap().posts.max_games_per_hour, 4);
    }
}
