//! LLM invocation layer.
//!
//! Defines the `LlmTransport` trait for model-agnostic completions and the
//! `LlmClient` that composes template rendering, provider resolution with
//! credential fallback, a tokens-per-minute guard with preemptive model
//! downgrade, a single rate-limit retry, and strict JSON parsing of model
//! output.

use crate::config::LlmConfig;
use crate::error::{LlmError, Result, TemplateError, VeridictError};
use crate::prompts::{PIPELINE, TemplateService};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Model tier a call runs on. Validators typically run on `Economy`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    #[default]
    Primary,
    Economy,
}

/// Per-call options.
#[derive(Debug, Clone)]
pub struct LlmOptions {
    pub tier: ModelTier,
    pub temperature: f64,
    /// Explicit provider pin; falls back to the default provider when the
    /// pinned provider is unknown or lacks credentials.
    pub provider_override: Option<String>,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            tier: ModelTier::Primary,
            temperature: 0.0,
            provider_override: None,
        }
    }
}

/// Transport for one LLM vendor: prompt in, raw text out.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        temperature: f64,
    ) -> std::result::Result<String, LlmError>;

    fn name(&self) -> &str;

    /// Whether this transport has usable credentials.
    fn has_credentials(&self) -> bool;
}

/// Token counter for request-size estimation, backed by tiktoken.
pub struct TokenCounter {
    bpe: tiktoken_rs::CoreBPE,
}

impl TokenCounter {
    /// Counter for the given model; falls back to cl100k_base when the
    /// model isn't recognized.
    pub fn for_model(model: &str) -> Self {
        let bpe = tiktoken_rs::get_bpe_from_model(model).unwrap_or_else(|_| {
            tiktoken_rs::cl100k_base().expect("cl100k_base should be available")
        });
        Self { bpe }
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Sliding-window tally of tokens sent in the last minute.
struct TokenWindow {
    entries: VecDeque<(Instant, usize)>,
    window: Duration,
}

impl TokenWindow {
    fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            window: Duration::from_secs(60),
        }
    }

    fn used(&mut self, now: Instant) -> usize {
        let cutoff = now - self.window;
        while self.entries.front().is_some_and(|(t, _)| *t < cutoff) {
            self.entries.pop_front();
        }
        self.entries.iter().map(|(_, n)| n).sum()
    }

    fn record(&mut self, now: Instant, tokens: usize) {
        self.entries.push_back((now, tokens));
    }
}

static FENCE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("fence regex is valid")
});

/// Parse a model response that is plain JSON or JSON embedded in a fenced
/// code block. Unparseable output is an error, never an empty default.
pub fn extract_json(text: &str) -> std::result::Result<Value, LlmError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    if let Some(captures) = FENCE.captures(trimmed) {
        let inner = captures.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        return serde_json::from_str::<Value>(inner).map_err(|e| LlmError::ResponseParse {
            message: format!("fenced block is not valid JSON: {e}"),
        });
    }

    Err(LlmError::NoJsonPayload)
}

/// The LLM call surface used by every pipeline stage.
///
/// `call` renders the named template, resolves the provider, enforces the
/// TPM guard, and parses the response as JSON.
pub struct LlmClient {
    templates: Arc<dyn TemplateService>,
    transports: HashMap<String, Arc<dyn LlmTransport>>,
    config: LlmConfig,
    counter: TokenCounter,
    window: Mutex<TokenWindow>,
}

impl LlmClient {
    pub fn new(
        templates: Arc<dyn TemplateService>,
        transports: Vec<Arc<dyn LlmTransport>>,
        config: LlmConfig,
    ) -> Self {
        let counter = TokenCounter::for_model(&config.primary_model);
        let transports = transports
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect();
        Self {
            templates,
            transports,
            config,
            counter,
            window: Mutex::new(TokenWindow::new()),
        }
    }

    /// Resolve a provider override against available credentials.
    ///
    /// Returns the provider name to use plus whether a fallback happened.
    /// Never fails: an unusable override degrades to the default provider.
    pub fn resolve_provider(&self, provider_override: Option<&str>) -> (String, bool) {
        match provider_override {
            Some(name) => match self.transports.get(name) {
                Some(t) if t.has_credentials() => (name.to_string(), false),
                _ => (self.config.default_provider.clone(), true),
            },
            None => (self.config.default_provider.clone(), false),
        }
    }

    fn model_for_tier(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Primary => &self.config.primary_model,
            ModelTier::Economy => &self.config.economy_model,
        }
    }

    /// Render the named task template, send it, and parse the JSON reply.
    pub async fn call(&self, section: &str, variables: &Value, opts: &LlmOptions) -> Result<Value> {
        let prompt = self.templates.render(PIPELINE, section, variables)?;

        let (provider_name, _fell_back) = self.resolve_provider(opts.provider_override.as_deref());
        let transport = self
            .transports
            .get(&provider_name)
            .ok_or_else(|| VeridictError::Llm(LlmError::UnknownProvider {
                provider: provider_name.clone(),
            }))?;

        // TPM guard: if the estimated request would exceed the per-minute
        // budget, downgrade to the fallback model before sending.
        let estimate = self.counter.count(&prompt.content);
        let mut model = self.model_for_tier(opts.tier).to_string();
        {
            let mut window = self.window.lock().await;
            let now = Instant::now();
            if self.config.tpm_limit > 0 && window.used(now) + estimate > self.config.tpm_limit {
                debug!(
                    section,
                    estimate,
                    limit = self.config.tpm_limit,
                    "TPM guard: downgrading to fallback model"
                );
                model = self.config.fallback_model.clone();
            }
            window.record(now, estimate);
        }

        let raw = match transport
            .complete(&prompt.content, &model, opts.temperature)
            .await
        {
            Ok(raw) => raw,
            Err(LlmError::RateLimited { retry_after_secs }) => {
                // One retry with the fallback model before surfacing failure.
                warn!(
                    section,
                    provider = provider_name.as_str(),
                    retry_after_secs,
                    "Rate limited; retrying once with fallback model"
                );
                transport
                    .complete(&prompt.content, &self.config.fallback_model, opts.temperature)
                    .await
                    .map_err(VeridictError::Llm)?
            }
            Err(e) => return Err(VeridictError::Llm(e)),
        };

        extract_json(&raw).map_err(VeridictError::Llm)
    }

    /// Validate at startup that every task key has a template.
    pub fn check_templates(&self, sections: &[&str]) -> Result<()> {
        for section in sections {
            match self.templates.render(PIPELINE, section, &Value::Object(Default::default())) {
                Ok(_) => {}
                Err(TemplateError::MissingSection { .. }) => {
                    return Err(VeridictError::Template(TemplateError::MissingSection {
                        pipeline: PIPELINE.to_string(),
                        section: section.to_string(),
                    }));
                }
                // Render errors at probe time are tolerable; the strict-mode
                // registry renders with empty variables.
                Err(_) => {}
            }
        }
        Ok(())
    }
}

/// OpenAI-compatible chat-completions transport.
pub struct OpenAiCompatTransport {
    http: reqwest::Client,
    name: String,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatTransport {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            http,
            name: name.into(),
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl LlmTransport for OpenAiCompatTransport {
    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        temperature: f64,
    ) -> std::result::Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": model,
            "temperature": temperature,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| LlmError::ApiRequest {
            message: e.to_string(),
        })?;

        if response.status().as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(LlmError::RateLimited { retry_after_secs });
        }
        if !response.status().is_success() {
            return Err(LlmError::ApiRequest {
                message: format!("HTTP {}", response.status()),
            });
        }

        let payload: Value = response.json().await.map_err(|e| LlmError::ResponseParse {
            message: e.to_string(),
        })?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::ResponseParse {
                message: "response missing choices[0].message.content".to_string(),
            })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn has_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// In-memory transport for tests: queued raw responses, recorded prompts.
pub struct MockLlmTransport {
    name: String,
    credentialed: bool,
    responses: std::sync::Mutex<VecDeque<String>>,
    prompts: std::sync::Mutex<Vec<String>>,
    rate_limit_next: std::sync::Mutex<bool>,
}

impl MockLlmTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            credentialed: true,
            responses: std::sync::Mutex::new(VecDeque::new()),
            prompts: std::sync::Mutex::new(Vec::new()),
            rate_limit_next: std::sync::Mutex::new(false),
        }
    }

    /// A transport whose `has_credentials` reports false.
    pub fn without_credentials(name: impl Into<String>) -> Self {
        Self {
            credentialed: false,
            ..Self::new(name)
        }
    }

    /// Queue one raw response.
    pub fn push_response(&self, raw: impl Into<String>) {
        self.responses.lock().unwrap().push_back(raw.into());
    }

    /// Make the next call fail with a rate-limit rejection.
    pub fn rate_limit_next(&self) {
        *self.rate_limit_next.lock().unwrap() = true;
    }

    /// Prompts seen so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of completions served.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmTransport for MockLlmTransport {
    async fn complete(
        &self,
        prompt: &str,
        _model: &str,
        _temperature: f64,
    ) -> std::result::Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let mut limited = self.rate_limit_next.lock().unwrap();
        if *limited {
            *limited = false;
            return Err(LlmError::RateLimited { retry_after_secs: 1 });
        }
        drop(limited);

        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "{}".to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn has_credentials(&self) -> bool {
        self.credentialed
    }
}
