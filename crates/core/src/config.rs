//! Configuration management for regcite.
//!
//! Configuration is merged from several sources, later ones winning:
//! - Built-in defaults
//! - The workspace config file (`.regcite/config.yaml`)
//! - Environment variables
//! - Command-line flags
//!
//! Everything the pipeline reads (thresholds, friendly names, providers) is
//! enumerated here and injected at construction time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Providers the generation side knows how to talk to.
pub const KNOWN_LLM_PROVIDERS: [&str; 1] = ["ollama"];

/// Providers the embedding side knows how to talk to.
pub const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["ollama", "trigram"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .regcite/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Regulation source files, in the order their corpora are consulted
    pub documents: Vec<PathBuf>,

    /// Generation service settings
    pub llm: LlmSettings,

    /// Embedding capability settings
    pub embedding: EmbeddingSettings,

    /// Retrieval and citation settings
    pub retrieval: RetrievalConfig,

    /// Citation validation settings
    pub validation: ValidationSettings,

    /// Persisted index settings
    pub index: IndexSettings,
}

/// Generation service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmSettings {
    /// Provider name (e.g., "ollama")
    pub provider: String,

    /// Base URL of the provider API
    pub endpoint: String,

    /// Model identifier
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Nucleus sampling
    pub top_p: f32,

    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,

    /// Deadline for one generation call, in seconds
    pub timeout_secs: u64,

    /// Attempts per generation call before giving up
    pub max_attempts: u32,

    /// Delay between attempts, in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            temperature: 0.3,
            top_p: 0.9,
            max_tokens: None,
            timeout_secs: 30,
            max_attempts: 3,
            retry_delay_ms: 2000,
        }
    }
}

/// Embedding capability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    /// Provider name: "ollama" or "trigram"
    pub provider: String,

    /// Base URL of the provider API
    pub endpoint: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Sections embedded concurrently during an index build
    pub concurrency: usize,

    /// Deadline for one embedding call, in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            model: "all-minilm".to_string(),
            dimensions: 384,
            concurrency: 4,
            timeout_secs: 30,
        }
    }
}

/// Nearest-neighbor backend used for corpus lookups.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Contiguous matrix with heap-based top-k selection
    #[default]
    Flat,
    /// Score every record, then sort
    Linear,
}

/// Retrieval configuration injected into the retriever and citation resolver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalConfig {
    /// Maximum number of sections handed to generation
    pub top_k: usize,

    /// Minimum cosine similarity for a section to count as relevant
    pub similarity_threshold: f32,

    /// Display labels keyed by section id or raw section title, either of
    /// which may be scoped to one document as `<document title>:<key>`
    pub friendly_names: HashMap<String, String>,

    /// Nearest-neighbor backend
    pub backend: IndexBackend,

    /// Fail composition instead of asking the model to report "not found"
    pub require_context: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            similarity_threshold: 0.35,
            friendly_names: HashMap::new(),
            backend: IndexBackend::Flat,
            require_context: false,
        }
    }
}

/// What the validator does with a citation that was not retrieved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CitationPolicy {
    /// Keep the marker, labelled as unverified
    #[default]
    Annotate,
    /// Remove the marker from the answer
    Strip,
    /// Reject the answer and regenerate with stricter instructions
    Reject,
}

/// Citation validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationSettings {
    /// Policy for unsupported citations
    pub policy: CitationPolicy,

    /// Regenerations allowed under the reject policy
    pub max_retries: u32,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            policy: CitationPolicy::Annotate,
            max_retries: 1,
        }
    }
}

/// Persisted index configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexSettings {
    /// Rebuild a stale persisted index instead of reporting it
    pub auto_rebuild: bool,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    documents: Option<Vec<PathBuf>>,
    llm: Option<LlmSettings>,
    embedding: Option<EmbeddingSettings>,
    retrieval: Option<RetrievalConfig>,
    validation: Option<ValidationSettings>,
    index: Option<IndexSettings>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            documents: Vec::new(),
            llm: LlmSettings::default(),
            embedding: EmbeddingSettings::default(),
            retrieval: RetrievalConfig::default(),
            validation: ValidationSettings::default(),
            index: IndexSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file and the environment.
    ///
    /// Environment variables:
    /// - `REGCITE_WORKSPACE`: Override workspace path
    /// - `REGCITE_CONFIG`: Path to config file
    /// - `REGCITE_PROVIDER`: Generation provider
    /// - `REGCITE_MODEL`: Generation model
    /// - `REGCITE_LLM_ENDPOINT`: Generation endpoint
    /// - `REGCITE_EMBEDDING_MODEL`: Embedding model
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use regcite_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Like [`AppConfig::load`], with the workspace and config file given by
    /// the caller taking precedence over the environment.
    pub fn load_with(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) = workspace {
            config.workspace = workspace;
        } else if let Ok(workspace) = std::env::var("REGCITE_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Some(config_file) = config_file {
            config.config_file = Some(config_file);
        } else if let Ok(config_file) = std::env::var("REGCITE_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.regcite_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("REGCITE_PROVIDER") {
            config.llm.provider = provider;
        }

        if let Ok(model) = std::env::var("REGCITE_MODEL") {
            config.llm.model = model;
        }

        if let Ok(endpoint) = std::env::var("REGCITE_LLM_ENDPOINT") {
            config.llm.endpoint = endpoint;
        }

        if let Ok(model) = std::env::var("REGCITE_EMBEDDING_MODEL") {
            config.embedding.model = model;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var_os("NO_COLOR").is_some() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into a copy of this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> Result<Self, serde_yaml::Error> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;
        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(documents) = config_file.documents {
            result.documents = documents;
        }
        if let Some(llm) = config_file.llm {
            result.llm = llm;
        }
        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }
        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }
        if let Some(validation) = config_file.validation {
            result.validation = validation;
        }
        if let Some(index) = config_file.index {
            result.index = index;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over the environment and the file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.llm.provider = provider;
        }

        if let Some(model) = model {
            self.llm.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .regcite directory.
    pub fn regcite_dir(&self) -> PathBuf {
        self.workspace.join(".regcite")
    }

    /// Ensure the .regcite directory exists.
    pub fn ensure_regcite_dir(&self) -> AppResult<()> {
        let dir = self.regcite_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .regcite directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Directory holding persisted corpus indexes.
    pub fn index_dir(&self) -> PathBuf {
        self.regcite_dir().join("index")
    }

    /// Directory holding prompt template overrides.
    pub fn prompts_dir(&self) -> PathBuf {
        self.regcite_dir().join("prompts")
    }

    /// Source documents with relative paths resolved against the workspace.
    pub fn document_paths(&self) -> Vec<PathBuf> {
        self.documents
            .iter()
            .map(|path| {
                if path.is_absolute() {
                    path.clone()
                } else {
                    self.workspace.join(path)
                }
            })
            .collect()
    }

    /// Validate configuration values before any service is contacted.
    pub fn validate(&self) -> AppResult<()> {
        if !KNOWN_LLM_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.llm.provider,
                KNOWN_LLM_PROVIDERS.join(", ")
            )));
        }

        if !KNOWN_EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }

        if self.embedding.concurrency == 0 {
            return Err(AppError::Config(
                "Embedding concurrency must be greater than zero".to_string(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(AppError::Config(
                "retrieval.topK must be greater than zero".to_string(),
            ));
        }

        let threshold = self.retrieval.similarity_threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(AppError::Config(format!(
                "retrieval.similarityThreshold must be within [-1, 1], got {}",
                threshold
            )));
        }

        if self.llm.max_attempts == 0 {
            return Err(AppError::Config(
                "llm.maxAttempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model, "llama3.2");
        assert_eq!(config.retrieval.top_k, 4);
        assert!((config.retrieval.similarity_threshold - 0.35).abs() < f32::EPSILON);
        assert_eq!(config.validation.policy, CitationPolicy::Annotate);
        assert!(!config.verbose);
    }

    #[test]
    fn test_regcite_dir() {
        let config = AppConfig::default();
        assert!(config.regcite_dir().ends_with(".regcite"));
        assert!(config.index_dir().ends_with(".regcite/index"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            None,
            None,
            Some("ollama".to_string()),
            Some("qwen2.5".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.llm.model, "qwen2.5");
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml_sections() {
        let yaml = r#"
documents:
  - regulamento.json
  - selecao.json
retrieval:
  topK: 3
  similarityThreshold: 0.5
  backend: linear
  friendlyNames:
    "CAPÍTULO V": "Comissão Examinadora"
validation:
  policy: reject
logging:
  level: warn
  color: false
"#;
        let merged = AppConfig::default().merge_yaml_str(yaml).unwrap();

        assert_eq!(merged.documents.len(), 2);
        assert_eq!(merged.retrieval.top_k, 3);
        assert_eq!(merged.retrieval.backend, IndexBackend::Linear);
        assert_eq!(
            merged.retrieval.friendly_names.get("CAPÍTULO V").map(String::as_str),
            Some("Comissão Examinadora")
        );
        // Unspecified fields inside a section keep their defaults
        assert!(!merged.retrieval.require_context);
        assert_eq!(merged.validation.policy, CitationPolicy::Reject);
        assert_eq!(merged.validation.max_retries, 1);
        assert_eq!(merged.log_level.as_deref(), Some("warn"));
        assert!(merged.no_color);
        assert_eq!(merged.llm, LlmSettings::default());
    }

    #[test]
    fn test_document_paths_resolve_against_workspace() {
        let mut config = AppConfig::default();
        config.workspace = PathBuf::from("/srv/regs");
        config.documents = vec![PathBuf::from("a.json"), PathBuf::from("/abs/b.yaml")];

        let paths = config.document_paths();
        assert_eq!(paths[0], PathBuf::from("/srv/regs/a.json"));
        assert_eq!(paths[1], PathBuf::from("/abs/b.yaml"));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.llm.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_threshold_range() {
        let mut config = AppConfig::default();
        config.retrieval.similarity_threshold = 1.5;
        assert!(config.validate().is_err());

        config.retrieval.similarity_threshold = 0.5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_with_reads_workspace_config() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".regcite")).unwrap();
        std::fs::write(
            temp.path().join(".regcite/config.yaml"),
            "documents:\n  - regulamento.json\nretrieval:\n  topK: 2\n",
        )
        .unwrap();

        let config = AppConfig::load_with(Some(temp.path().to_path_buf()), None).unwrap();
        assert_eq!(config.retrieval.top_k, 2);
        assert_eq!(
            config.document_paths(),
            vec![temp.path().join("regulamento.json")]
        );
    }

    #[test]
    fn test_load_with_missing_workspace() {
        let result = AppConfig::load_with(Some(PathBuf::from("/nonexistent/regcite")), None);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_zero_top_k() {
        let mut config = AppConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }
}
