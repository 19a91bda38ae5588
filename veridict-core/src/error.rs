//! Error types for the Veridict core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering LLM, template, search, configuration, and pipeline domains.

use std::path::PathBuf;

/// Top-level error type for the Veridict core library.
#[derive(Debug, thiserror::Error)]
pub enum VeridictError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("No JSON payload found in model output")]
    NoJsonPayload,

    #[error("No credentials available for provider {provider}")]
    MissingCredentials { provider: String },

    #[error("Unknown provider: {provider}")]
    UnknownProvider { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Errors from the template service.
///
/// A missing section is always fatal for the call that needed it: the
/// pipeline never substitutes a default prompt.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Missing template section '{section}' in pipeline '{pipeline}'")]
    MissingSection { pipeline: String, section: String },

    #[error("Template render failed for '{section}': {message}")]
    RenderFailed { section: String, message: String },
}

/// Errors from web search and URL fetching.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search provider error: {message}")]
    Provider { message: String },

    #[error("Fetch failed for {url}: {message}")]
    FetchFailed { url: String, message: String },

    #[error("Unprocessable content type '{content_type}' at {url}")]
    UnprocessableContent { url: String, content_type: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },
}

/// Errors from the pipeline driver.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Input produced no verifiable claims")]
    NoClaims,

    #[error("Stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },

    #[error("Run was cancelled")]
    Cancelled,
}

/// A type alias for results using the top-level `VeridictError`.
pub type Result<T> = std::result::Result<T, VeridictError>;
