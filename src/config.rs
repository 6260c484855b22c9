//! Runtime settings shared by every entry point.

use clap::{Args, ValueEnum};
use std::fmt;
use std::time::Duration;

/// Default Mealie recipe listing endpoint.
pub const DEFAULT_MEALIE_API_URL: &str = "http://localhost:9000/api/recipes";
/// Default externally reachable Mealie URL used in recipe links.
pub const DEFAULT_MEALIE_EXTERNAL_URL: &str = "http://localhost:9000";
/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
/// Default OpenAI-compatible endpoint.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default Qdrant endpoint.
pub const DEFAULT_VECTORDB_URL: &str = "http://localhost:6333";
/// Default Qdrant collection.
pub const DEFAULT_COLLECTION: &str = "mealie_recipes";
/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "bge-m3";
/// Default chat model.
pub const DEFAULT_LLM_MODEL: &str = "llama3.1:8b";

/// Backend family used for both embeddings and chat completions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModelProvider {
    /// Local Ollama server (`/api/embed`, `/api/chat`).
    Ollama,
    /// Any OpenAI-compatible server (`/embeddings`, `/chat/completions`).
    #[value(name = "openai")]
    OpenAi,
}

/// Configuration surface of the assistant, built once at startup and passed by
/// reference into each component.
#[derive(Args, Clone, PartialEq)]
pub struct Settings {
    /// Mealie recipe API URL
    #[arg(long, env = "MEALIE_API_URL", default_value = DEFAULT_MEALIE_API_URL)]
    pub mealie_api_url: String,

    /// Mealie URL used when rendering recipe links
    #[arg(long, env = "MEALIE_EXTERNAL_URL", default_value = DEFAULT_MEALIE_EXTERNAL_URL)]
    pub mealie_external_url: String,

    /// Mealie API bearer token
    #[arg(long, env = "MEALIE_TOKEN")]
    pub mealie_token: Option<String>,

    /// Recipes requested per listing page
    #[arg(long, env = "MEALIE_PAGE_SIZE", default_value_t = 50)]
    pub mealie_page_size: usize,

    /// Embedding and chat backend
    #[arg(long, env = "MODEL_PROVIDER", value_enum, default_value_t = ModelProvider::Ollama)]
    pub provider: ModelProvider,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = DEFAULT_OLLAMA_BASE_URL)]
    pub ollama_base_url: String,

    /// Base URL for OpenAI-compatible endpoints
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    pub openai_base_url: String,

    /// API key for OpenAI-compatible endpoints
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// Embedding model identifier
    #[arg(long, env = "EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    /// Requested embedding size for OpenAI models that can shorten vectors
    #[arg(long, env = "EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,

    /// Vector DB (Qdrant) URL
    #[arg(long, env = "VECTORDB_URL", default_value = DEFAULT_VECTORDB_URL)]
    pub vectordb_url: String,

    /// Value for the Qdrant `api-key` header
    #[arg(long, env = "VECTORDB_API_KEY")]
    pub vectordb_api_key: Option<String>,

    /// Qdrant collection name
    #[arg(long, env = "VECTORDB_COLLECTION_NAME", default_value = DEFAULT_COLLECTION)]
    pub vectordb_collection_name: String,

    /// Number of recipes retrieved per question
    #[arg(long, env = "VECTORDB_K", default_value_t = 3)]
    pub vectordb_k: usize,

    /// Minimum cosine similarity for a recipe to be used as context
    #[arg(long, env = "VECTORDB_SCORE_THRESHOLD")]
    pub vectordb_score_threshold: Option<f32>,

    /// Chat model identifier
    #[arg(long, env = "LLM_MODEL", default_value = DEFAULT_LLM_MODEL)]
    pub llm_model: String,

    /// Sampling temperature for the chat model
    #[arg(long, env = "LLM_TEMPERATURE", default_value_t = 0.2)]
    pub llm_temperature: f32,

    /// Optional sampling seed
    #[arg(long, env = "LLM_SEED")]
    pub llm_seed: Option<i64>,

    /// Address the web UI binds to
    #[arg(long, env = "UI_BIND", default_value = "0.0.0.0")]
    pub ui_bind: String,

    /// Port the web UI is served on
    #[arg(long, env = "UI_PORT", default_value_t = 7860)]
    pub ui_port: u16,

    /// Basic-auth user for the web UI
    #[arg(long, env = "UI_USERNAME", default_value = "mealie")]
    pub ui_username: String,

    /// Basic-auth password for the web UI
    #[arg(long, env = "UI_PASSWORD", default_value = "rag")]
    pub ui_password: String,

    /// Delete the collection before ingesting when it already exists
    #[arg(long, env = "DELETE_COLLECTION_IF_EXISTS", default_value_t = false)]
    pub delete_collection_if_exists: bool,

    /// Append the table of recipes used after each answer
    #[arg(
        long,
        env = "SHOW_SOURCES",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub show_sources: bool,

    /// Seconds before any upstream HTTP request times out
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 120)]
    pub http_timeout_secs: u64,

    /// Log level for this crate
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log level for dependencies
    #[arg(long, env = "DEPENDENCY_LOG_LEVEL", default_value = "warn")]
    pub dependency_log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl Settings {
    /// Timeout applied to every upstream HTTP client.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> String {
        format!(
            "{},mealierag={}",
            self.dependency_log_level.to_lowercase(),
            self.log_level.to_lowercase()
        )
    }

    /// Socket address string for the web UI.
    pub fn ui_addr(&self) -> String {
        format!("{}:{}", self.ui_bind, self.ui_port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mealie_api_url: DEFAULT_MEALIE_API_URL.to_string(),
            mealie_external_url: DEFAULT_MEALIE_EXTERNAL_URL.to_string(),
            mealie_token: None,
            mealie_page_size: 50,
            provider: ModelProvider::Ollama,
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_api_key: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: None,
            vectordb_url: DEFAULT_VECTORDB_URL.to_string(),
            vectordb_api_key: None,
            vectordb_collection_name: DEFAULT_COLLECTION.to_string(),
            vectordb_k: 3,
            vectordb_score_threshold: None,
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_temperature: 0.2,
            llm_seed: None,
            ui_bind: "0.0.0.0".to_string(),
            ui_port: 7860,
            ui_username: "mealie".to_string(),
            ui_password: "rag".to_string(),
            delete_collection_if_exists: false,
            show_sources: true,
            http_timeout_secs: 120,
            log_level: "info".to_string(),
            dependency_log_level: "warn".to_string(),
            log_json: false,
        }
    }
}

// Secrets never reach the logs.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("mealie_api_url", &self.mealie_api_url)
            .field("mealie_external_url", &self.mealie_external_url)
            .field("mealie_token", &redact(&self.mealie_token))
            .field("mealie_page_size", &self.mealie_page_size)
            .field("provider", &self.provider)
            .field("ollama_base_url", &self.ollama_base_url)
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("vectordb_url", &self.vectordb_url)
            .field("vectordb_api_key", &redact(&self.vectordb_api_key))
            .field("vectordb_collection_name", &self.vectordb_collection_name)
            .field("vectordb_k", &self.vectordb_k)
            .field("vectordb_score_threshold", &self.vectordb_score_threshold)
            .field("llm_model", &self.llm_model)
            .field("llm_temperature", &self.llm_temperature)
            .field("llm_seed", &self.llm_seed)
            .field("ui_bind", &self.ui_bind)
            .field("ui_port", &self.ui_port)
            .field("ui_username", &self.ui_username)
            .field("ui_password", &"***")
            .field(
                "delete_collection_if_exists",
                &self.delete_collection_if_exists,
            )
            .field("show_sources", &self.show_sources)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("log_level", &self.log_level)
            .field("dependency_log_level", &self.dependency_log_level)
            .field("log_json", &self.log_json)
            .finish()
    }
}

fn redact(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "***")
}
