//! Web search and URL fetch providers.
//!
//! Thin trait seams over external search/fetch services, plus a
//! Serper-style HTTP backend and host-based source classification.
//! The researcher discards fetched pages under the configured minimum
//! content length; that filter lives in the pipeline, not here.

use crate::error::SearchError;
use crate::types::SourceType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// One search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Response from one search call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub providers_used: Vec<String>,
}

/// External web-search collaborator.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResponse, SearchError>;
}

/// One fetched page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub text: String,
    pub title: String,
    pub content_type: String,
}

/// External URL-fetch collaborator.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, SearchError>;
}

/// Serper-style search backend (POST with API key, organic results).
pub struct SerperSearch {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct SerperItem {
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperItem>,
}

impl SerperSearch {
    pub fn new(api_key: String, top_k: usize) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint: "https://google.serper.dev/search".to_string(),
            api_key,
            top_k,
        }
    }

    /// Override the endpoint (used against local stubs).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for SerperSearch {
    async fn search(&self, query: &str) -> Result<SearchResponse, SearchError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&serde_json::json!({ "q": query, "num": self.top_k }))
            .send()
            .await
            .map_err(|e| SearchError::Provider {
                message: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| SearchError::Provider {
                message: e.to_string(),
            })?
            .json::<SerperResponse>()
            .await
            .map_err(|e| SearchError::Provider {
                message: e.to_string(),
            })?;

        Ok(SearchResponse {
            results: response
                .organic
                .into_iter()
                .take(self.top_k)
                .map(|item| SearchHit {
                    url: item.link,
                    title: item.title,
                    snippet: item.snippet,
                })
                .collect(),
            providers_used: vec!["serper".to_string()],
        })
    }
}

/// HTTP page fetcher that reduces HTML to plain text.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent("veridict/0.3")
            .build()
            .unwrap_or_default();
        Self { http }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, SearchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SearchError::FetchFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| SearchError::FetchFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();

        if !content_type.contains("text") && !content_type.contains("json") {
            return Err(SearchError::UnprocessableContent {
                url: url.to_string(),
                content_type,
            });
        }

        let body = response.text().await.map_err(|e| SearchError::FetchFailed {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let title = extract_title(&body).unwrap_or_else(|| url.to_string());
        let text = strip_html(&body);
        Ok(FetchedPage {
            text,
            title,
            content_type,
        })
    }
}

/// Classify a source by its URL host.
pub fn classify_source(url: &str) -> SourceType {
    let Ok(parsed) = url::Url::parse(url) else {
        return SourceType::Other;
    };
    let Some(host) = parsed.host_str() else {
        return SourceType::Other;
    };
    let host = host.to_lowercase();

    if host.ends_with(".gov") || host.contains(".gov.") {
        SourceType::Government
    } else if host.ends_with(".edu")
        || host.contains("arxiv.org")
        || host.contains("nature.com")
        || host.contains("sciencedirect")
        || host.contains("pubmed")
        || host.contains("doi.org")
    {
        SourceType::Academic
    } else if host.contains("wikipedia.org") || host.contains("britannica.com") {
        SourceType::Reference
    } else if host.contains("reuters")
        || host.contains("apnews")
        || host.contains("bbc.")
        || host.contains("nytimes")
        || host.contains("theguardian")
        || host.contains("washingtonpost")
    {
        SourceType::News
    } else if host.contains("reddit.com")
        || host.contains("stackexchange")
        || host.contains("stackoverflow")
        || host.contains("quora.com")
    {
        SourceType::Forum
    } else if host.contains("medium.com")
        || host.contains("substack.com")
        || host.contains("blogspot")
        || host.contains("wordpress")
    {
        SourceType::Blog
    } else {
        SourceType::Other
    }
}

/// Default probative value by source class, used when the extractor gives
/// none.
pub fn default_probative_value(source_type: SourceType) -> f64 {
    match source_type {
        SourceType::Academic | SourceType::Government => 0.75,
        SourceType::News | SourceType::Reference => 0.6,
        SourceType::Blog => 0.4,
        SourceType::Forum => 0.3,
        SourceType::Other => 0.45,
    }
}

fn extract_title(html: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with the original.
    let lower: String = html.chars().map(|c| c.to_ascii_lowercase()).collect();
    let start = lower.find("<title")?;
    let open_end = html[start..].find('>')? + start + 1;
    let close = lower[open_end..].find("</title>")? + open_end;
    let title = html[open_end..close].trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Reduce HTML to whitespace-normalized visible text. Script and style
/// bodies are dropped entirely.
fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut chars = html.char_indices();
    let lower: String = html.chars().map(|c| c.to_ascii_lowercase()).collect();
    let mut skip_until: Option<&str> = None;
    let mut in_tag = false;

    while let Some((i, c)) = chars.next() {
        if let Some(closer) = skip_until {
            if lower[i..].starts_with(closer) {
                for _ in 0..closer.len().saturating_sub(1) {
                    chars.next();
                }
                skip_until = None;
                in_tag = false;
            }
            continue;
        }
        if c == '<' {
            if lower[i..].starts_with("<script") {
                skip_until = Some("</script>");
            } else if lower[i..].starts_with("<style") {
                skip_until = Some("</style>");
            } else {
                in_tag = true;
            }
            continue;
        }
        if c == '>' {
            in_tag = false;
            out.push(' ');
            continue;
        }
        if !in_tag {
            out.push(c);
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// In-memory search provider for tests: queued canned responses.
pub struct MockSearchProvider {
    responses: std::sync::Mutex<VecDeque<SearchResponse>>,
    queries: std::sync::Mutex<Vec<String>>,
}

impl MockSearchProvider {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(VecDeque::new()),
            queries: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn push_response(&self, response: SearchResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn push_hits(&self, hits: Vec<(&str, &str, &str)>) {
        self.push_response(SearchResponse {
            results: hits
                .into_iter()
                .map(|(url, title, snippet)| SearchHit {
                    url: url.into(),
                    title: title.into(),
                    snippet: snippet.into(),
                })
                .collect(),
            providers_used: vec!["mock".into()],
        });
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl Default for MockSearchProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(&self, query: &str) -> Result<SearchResponse, SearchError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

/// In-memory fetcher for tests: fixed text and title per URL.
pub struct MockFetcher {
    pages: std::sync::Mutex<std::collections::HashMap<String, (String, String)>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            pages: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn set_page(&self, url: &str, text: &str) {
        self.set_page_titled(url, url, text);
    }

    pub fn set_page_titled(&self, url: &str, title: &str, text: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), (title.to_string(), text.to_string()));
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, SearchError> {
        match self.pages.lock().unwrap().get(url) {
            Some((title, text)) => Ok(FetchedPage {
                text: text.clone(),
                title: title.clone(),
                content_type: "text/html".to_string(),
            }),
            None => Err(SearchError::FetchFailed {
                url: url.to_string(),
                message: "no mock page".to_string(),
            }),
        }
    }
}
