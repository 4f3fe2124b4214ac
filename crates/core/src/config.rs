//! Aggregate configuration, loaded from TOML with project-local precedence
//! over a user-level config directory, falling back to built-in defaults
//! for every field.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const PROJECT_CONFIG_FILENAME: &str = "ccmemory.toml";
const CONFIG_DIR_ENV: &str = "CCMEMORY_CONFIG_DIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read { path: PathBuf, source: std::io::Error },
  #[error("failed to parse config file {path}: {source}")]
  Parse { path: PathBuf, source: toml::de::Error },
  #[error("failed to render config template: {0}")]
  Render(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub content_store: ContentStoreConfig,
  pub vector_store: VectorStoreConfig,
  pub embedding: EmbeddingConfig,
  pub generation: GenerationConfig,
  pub pipeline: PipelineConfig,
  pub http: HttpConfig,
  pub queue: QueueConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      content_store: ContentStoreConfig::default(),
      vector_store: VectorStoreConfig::default(),
      embedding: EmbeddingConfig::default(),
      generation: GenerationConfig::default(),
      pipeline: PipelineConfig::default(),
      http: HttpConfig::default(),
      queue: QueueConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentStoreConfig {
  pub root: PathBuf,
}

impl Default for ContentStoreConfig {
  fn default() -> Self {
    Self { root: default_data_dir().join("content") }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
  pub path: PathBuf,
  pub dimensions: usize,
}

impl Default for VectorStoreConfig {
  fn default() -> Self {
    Self {
      path: default_data_dir().join("lancedb"),
      dimensions: 768,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
  Ollama,
  OpenRouter,
  Fake,
}

impl Default for EmbeddingProviderKind {
  fn default() -> Self {
    Self::Fake
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
  pub provider: EmbeddingProviderKind,
  pub model: String,
  pub dimensions: usize,
  pub url: Option<String>,
  pub api_key_env: Option<String>,
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      provider: EmbeddingProviderKind::default(),
      model: "nomic-embed-text".to_string(),
      dimensions: 768,
      url: None,
      api_key_env: None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationProviderKind {
  OpenRouter,
  Fake,
}

impl Default for GenerationProviderKind {
  fn default() -> Self {
    Self::Fake
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
  pub provider: GenerationProviderKind,
  pub model: String,
  pub max_tokens: usize,
  pub temperature: f32,
  pub top_p: f32,
  pub moderate_answers: bool,
}

impl Default for GenerationConfig {
  fn default() -> Self {
    Self {
      provider: GenerationProviderKind::default(),
      model: "default".to_string(),
      max_tokens: 1024,
      temperature: 0.0,
      top_p: 1.0,
      moderate_answers: false,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub max_tokens_per_line: usize,
  pub max_tokens_per_paragraph: usize,
  pub overlapping_tokens: usize,
  pub summary_max_tokens: usize,
  pub max_matches_count: usize,
  pub max_ask_prompt_size: usize,
  pub min_relevance: f32,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      max_tokens_per_line: 300,
      max_tokens_per_paragraph: 1000,
      overlapping_tokens: 100,
      summary_max_tokens: 500,
      max_matches_count: 100,
      max_ask_prompt_size: 4096,
      min_relevance: 0.0,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
  pub bind: String,
  pub access_key_header: String,
  pub access_keys: Vec<String>,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      bind: "127.0.0.1:9001".to_string(),
      access_key_header: "Authorization".to_string(),
      access_keys: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
  pub visibility_timeout_secs: u64,
  pub max_attempts: u32,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      visibility_timeout_secs: 30,
      max_attempts: 5,
    }
  }
}

fn default_data_dir() -> PathBuf {
  dirs::data_dir()
    .unwrap_or_else(std::env::temp_dir)
    .join("ccmemory")
}

impl Config {
  /// Load configuration with project-local precedence over the user config
  /// directory, falling back to `Config::default()` if neither exists.
  pub fn load_for_project(project_root: &Path) -> Result<Self, ConfigError> {
    let project_config = project_root.join(PROJECT_CONFIG_FILENAME);
    if project_config.exists() {
      return Self::load_from_path(&project_config);
    }

    if let Some(user_config) = Self::user_config_path()
      && user_config.exists()
    {
      return Self::load_from_path(&user_config);
    }

    Ok(Self::default())
  }

  pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  fn user_config_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
      return Some(PathBuf::from(dir).join("config.toml"));
    }
    dirs::config_dir().map(|d| d.join("ccmemory").join("config.toml"))
  }

  /// Render a fully-commented template suitable for `ccmemory config init`.
  pub fn generate_template() -> Result<String, ConfigError> {
    let default = Self::default();
    let rendered = toml::to_string_pretty(&default)?;
    Ok(format!(
      "# ccmemory configuration\n# every field below has a default; uncomment and edit as needed\n\n{rendered}"
    ))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_config_has_sane_values() {
    let config = Config::default();
    assert_eq!(config.pipeline.max_tokens_per_line, 300);
    assert_eq!(config.queue.max_attempts, 5);
  }

  #[test]
  fn roundtrips_through_toml() {
    let config = Config::default();
    let text = toml::to_string_pretty(&config).unwrap();
    let parsed: Config = toml::from_str(&text).unwrap();
    assert_eq!(parsed.pipeline.max_tokens_per_paragraph, config.pipeline.max_tokens_per_paragraph);
  }

  #[test]
  fn load_for_project_prefers_project_file() {
    let dir = tempfile::tempdir().unwrap();
    let project_config = dir.path().join(PROJECT_CONFIG_FILENAME);
    std::fs::write(&project_config, "[pipeline]\nmax_tokens_per_line = 42\n").unwrap();

    let config = Config::load_for_project(dir.path()).unwrap();
    assert_eq!(config.pipeline.max_tokens_per_line, 42);
  }

  #[test]
  fn load_for_project_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    // isolate from any real user config directory
    unsafe { std::env::set_var(CONFIG_DIR_ENV, dir.path().join("nonexistent")) };
    let config = Config::load_for_project(dir.path()).unwrap();
    assert_eq!(config.pipeline.max_tokens_per_line, PipelineConfig::default().max_tokens_per_line);
    unsafe { std::env::remove_var(CONFIG_DIR_ENV) };
  }
}
