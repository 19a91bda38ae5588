//! Stage 2: budget-constrained iterative evidence research.
//!
//! Each round picks the least-researched claim, generates queries, scores
//! result relevance, fetches and length-filters sources, and extracts
//! structured evidence items with scope metadata. Iteration is bounded by
//! a per-claim query budget and a total iteration budget split between
//! main rounds and reserved contradiction rounds that deliberately search
//! for counter-evidence.

use crate::brain::{LlmClient, LlmOptions};
use crate::config::{QueryStrategy, ResearchConfig};
use crate::error::{Result, VeridictError};
use crate::state::{
    PipelineWarning, QueryStance, ResearchState, SearchQueryRecord, WarningKind, WarningSeverity,
};
use crate::types::{
    ClaimCategory, ClaimDirection, EvidenceItem, EvidenceScope, ScopeQuality, SourceRecord,
};
use crate::web::{PageFetcher, SearchProvider, classify_source, default_probative_value};
use futures::future;
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Page text is truncated to this many characters before extraction.
const EXTRACTION_TEXT_LIMIT: usize = 6000;

#[derive(Debug, Deserialize)]
struct QueriesResponse {
    #[serde(default)]
    queries: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RelevanceResponse {
    #[serde(default)]
    scores: Vec<RelevanceScore>,
}

#[derive(Debug, Deserialize)]
struct RelevanceScore {
    url: String,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    items: Vec<RawEvidence>,
}

#[derive(Debug, Deserialize)]
struct RawEvidence {
    statement: String,
    #[serde(default = "default_category")]
    category: ClaimCategory,
    #[serde(default = "default_half")]
    specificity: f64,
    #[serde(default)]
    excerpt: String,
    #[serde(default = "default_ev_direction")]
    direction: ClaimDirection,
    #[serde(default)]
    probative_value: Option<f64>,
    #[serde(default)]
    is_derivative: bool,
    #[serde(default)]
    independently_verified: bool,
    #[serde(default)]
    scope: Option<RawScope>,
}

#[derive(Debug, Deserialize)]
struct RawScope {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    methodology: Option<String>,
    #[serde(default)]
    boundaries: Option<String>,
    #[serde(default)]
    geographic: Option<String>,
    #[serde(default)]
    temporal: Option<String>,
}

fn default_category() -> ClaimCategory {
    ClaimCategory::Factual
}
fn default_ev_direction() -> ClaimDirection {
    ClaimDirection::Contextual
}
fn default_half() -> f64 {
    0.5
}

/// Classify how completely a scope's metadata is populated: methodology
/// and temporal both non-trivial is complete, one is partial.
pub fn scope_quality(scope: Option<&EvidenceScope>) -> ScopeQuality {
    let Some(scope) = scope else {
        return ScopeQuality::Incomplete;
    };
    let populated = [&scope.methodology, &scope.temporal]
        .iter()
        .filter(|field| is_nontrivial(field.as_deref()))
        .count();
    match populated {
        2 => ScopeQuality::Complete,
        1 => ScopeQuality::Partial,
        _ => ScopeQuality::Incomplete,
    }
}

fn is_nontrivial(value: Option<&str>) -> bool {
    let Some(value) = value else { return false };
    let trimmed = value.trim();
    trimmed.len() > 3 && !matches!(trimmed.to_lowercase().as_str(), "unknown" | "none" | "n/a")
}

/// Stage 2 driver.
pub struct EvidenceResearcher {
    llm: Arc<LlmClient>,
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    config: ResearchConfig,
}

impl EvidenceResearcher {
    pub fn new(
        llm: Arc<LlmClient>,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            llm,
            search,
            fetcher,
            config,
        }
    }

    /// Run the main and contradiction research phases.
    pub async fn research(&self, state: &mut ResearchState) -> Result<()> {
        let mut budgets: HashMap<String, usize> = state
            .claims
            .iter()
            .map(|c| (c.id.clone(), 0usize))
            .collect();

        let main_iterations = self
            .config
            .total_iterations
            .saturating_sub(self.config.contradiction_reserve);

        for iteration in 1..=main_iterations {
            let Some(claim_id) = self.select_least_researched(state, &budgets) else {
                debug!(iteration, "All claims sufficient or out of budget; ending main phase");
                break;
            };
            let stances = match self.config.query_strategy {
                QueryStrategy::Neutral => vec![QueryStance::Neutral],
                QueryStrategy::ProCon => vec![QueryStance::Supporting, QueryStance::Refuting],
            };
            for stance in stances {
                self.run_claim_iteration(state, &claim_id, iteration, stance, &mut budgets)
                    .await?;
            }
        }

        self.warn_exhausted_budgets(state, &budgets);

        // Contradiction phase: reserved iterations that deliberately hunt
        // counter-evidence once main research is done.
        for iteration in 1..=self.config.contradiction_reserve {
            let Some(claim_id) = self.select_least_contradicted(state, &budgets) else {
                break;
            };
            state.adversarial_search_ran = true;
            self.run_claim_iteration(
                state,
                &claim_id,
                main_iterations + iteration,
                QueryStance::Refuting,
                &mut budgets,
            )
            .await?;
        }

        info!(
            evidence = state.evidence.len(),
            sources = state.sources.len(),
            searches = state.queries.len(),
            adversarial = state.adversarial_search_ran,
            "Evidence research complete"
        );
        Ok(())
    }

    /// Relevant evidence items counted toward sufficiency.
    fn relevant_count(&self, state: &ResearchState, claim_id: &str) -> usize {
        state.evidence_for_claim(claim_id).len()
    }

    fn has_budget(&self, budgets: &HashMap<String, usize>, claim_id: &str) -> bool {
        budgets.get(claim_id).copied().unwrap_or(0) < self.config.per_claim_query_budget
    }

    /// The insufficient claim with the least evidence and budget remaining.
    fn select_least_researched(
        &self,
        state: &ResearchState,
        budgets: &HashMap<String, usize>,
    ) -> Option<String> {
        state
            .claims
            .iter()
            .filter(|c| self.has_budget(budgets, &c.id))
            .filter(|c| self.relevant_count(state, &c.id) < self.config.sufficiency_threshold)
            .min_by_key(|c| self.relevant_count(state, &c.id))
            .map(|c| c.id.clone())
    }

    /// The claim with the least contradicting evidence and budget remaining.
    fn select_least_contradicted(
        &self,
        state: &ResearchState,
        budgets: &HashMap<String, usize>,
    ) -> Option<String> {
        state
            .claims
            .iter()
            .filter(|c| self.has_budget(budgets, &c.id))
            .min_by_key(|c| state.directional_evidence_count(&c.id, ClaimDirection::Contradicts))
            .map(|c| c.id.clone())
    }

    fn warn_exhausted_budgets(&self, state: &mut ResearchState, budgets: &HashMap<String, usize>) {
        let exhausted: Vec<String> = state
            .claims
            .iter()
            .filter(|c| !self.has_budget(budgets, &c.id))
            .filter(|c| self.relevant_count(state, &c.id) < self.config.sufficiency_threshold)
            .map(|c| c.id.clone())
            .collect();
        for claim_id in exhausted {
            let found = self.relevant_count(state, &claim_id);
            state.push_warning(PipelineWarning::new(
                WarningKind::QueryBudgetExhausted,
                WarningSeverity::Caution,
                format!("claim {claim_id} exhausted its query budget before sufficiency"),
                json!({
                    "claim_id": claim_id,
                    "budget": self.config.per_claim_query_budget,
                    "evidence_found": found,
                    "sufficiency_threshold": self.config.sufficiency_threshold,
                }),
            ));
        }
    }

    /// One query for one claim: generate, search, score relevance, fetch,
    /// extract. External failures are recovered locally; only template
    /// errors propagate.
    async fn run_claim_iteration(
        &self,
        state: &mut ResearchState,
        claim_id: &str,
        iteration: usize,
        stance: QueryStance,
        budgets: &mut HashMap<String, usize>,
    ) -> Result<()> {
        if !self.has_budget(budgets, claim_id) {
            return Ok(());
        }
        let Some(claim) = state.claims.iter().find(|c| c.id == claim_id) else {
            return Ok(());
        };
        let statement = claim.statement.clone();

        let previous: Vec<String> = state
            .queries
            .iter()
            .filter(|q| q.claim_id == claim_id)
            .map(|q| q.query.clone())
            .collect();

        let query = match self.generate_query(state, &statement, stance, &previous).await {
            Ok(Some(q)) => q,
            Ok(None) => statement.clone(),
            Err(e) if is_recoverable(&e) => {
                warn!(claim = claim_id, error = %e, "Query generation failed; using claim text");
                statement.clone()
            }
            Err(e) => return Err(e),
        };

        *budgets.entry(claim_id.to_string()).or_insert(0) += 1;

        let response = match self.search.search(&query).await {
            Ok(r) => r,
            Err(e) => {
                warn!(claim = claim_id, error = %e, "Search failed");
                state.queries.push(SearchQueryRecord {
                    claim_id: claim_id.to_string(),
                    query,
                    iteration,
                    stance,
                    result_count: 0,
                });
                return Ok(());
            }
        };
        state.queries.push(SearchQueryRecord {
            claim_id: claim_id.to_string(),
            query: query.clone(),
            iteration,
            stance,
            result_count: response.results.len(),
        });
        if response.results.is_empty() {
            return Ok(());
        }

        let accepted = match self
            .score_relevance(state, &statement, &response.results)
            .await
        {
            Ok(urls) => urls,
            Err(e) if is_recoverable(&e) => {
                warn!(claim = claim_id, error = %e, "Relevance scoring failed; skipping results");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        // One source per URL per run; fetches run concurrently.
        let targets: Vec<crate::web::SearchHit> = response
            .results
            .iter()
            .filter(|h| accepted.contains(&h.url))
            .filter(|h| !state.sources.iter().any(|s| s.url == h.url))
            .cloned()
            .collect();
        let fetches = future::join_all(
            targets
                .iter()
                .map(|hit| async move { self.fetcher.fetch(&hit.url).await }),
        )
        .await;

        for (hit, fetched) in targets.iter().zip(fetches) {
            let page = match fetched {
                Ok(p) => p,
                Err(e) => {
                    debug!(url = hit.url.as_str(), error = %e, "Fetch failed");
                    continue;
                }
            };
            if page.text.len() < self.config.min_content_chars {
                debug!(
                    url = hit.url.as_str(),
                    chars = page.text.len(),
                    "Discarding short page"
                );
                continue;
            }
            let title = if page.title.is_empty() {
                hit.title.clone()
            } else {
                page.title.clone()
            };
            match self
                .extract_evidence(state, claim_id, &statement, &hit.url, &title, &page.text)
                .await
            {
                Ok(count) => {
                    if count > 0 {
                        debug!(url = hit.url.as_str(), count, title, "Extracted evidence");
                    }
                }
                Err(e) if is_recoverable(&e) => {
                    warn!(url = hit.url.as_str(), error = %e, "Evidence extraction failed");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn generate_query(
        &self,
        state: &mut ResearchState,
        statement: &str,
        stance: QueryStance,
        previous: &[String],
    ) -> Result<Option<String>> {
        let stance_label = match stance {
            QueryStance::Neutral => "neutral",
            QueryStance::Supporting => "supporting",
            QueryStance::Refuting => "refuting",
        };
        let value = self
            .llm
            .call(
                "GENERATE_QUERIES",
                &json!({
                    "claim": statement,
                    "stance": stance_label,
                    "previous_queries": previous.join("\n"),
                }),
                &LlmOptions::default(),
            )
            .await?;
        state.record_llm_call();
        let parsed: QueriesResponse = serde_json::from_value(value)?;
        Ok(parsed
            .queries
            .into_iter()
            .find(|q| !q.trim().is_empty()))
    }

    /// Returns the URLs whose relevance score clears the threshold.
    async fn score_relevance(
        &self,
        state: &mut ResearchState,
        statement: &str,
        results: &[crate::web::SearchHit],
    ) -> Result<HashSet<String>> {
        let listing: Vec<_> = results
            .iter()
            .map(|r| json!({"url": r.url, "title": r.title, "snippet": r.snippet}))
            .collect();
        let value = self
            .llm
            .call(
                "EVIDENCE_RELEVANCE",
                &json!({ "claim": statement, "results": serde_json::Value::Array(listing).to_string() }),
                &LlmOptions::default(),
            )
            .await?;
        state.record_llm_call();
        let parsed: RelevanceResponse = serde_json::from_value(value)?;
        Ok(parsed
            .scores
            .into_iter()
            .filter(|s| s.score >= self.config.relevance_threshold)
            .map(|s| s.url)
            .collect())
    }

    /// Extract evidence items from one fetched source. Returns how many
    /// items survived the probative-value filter; a source whose items
    /// are all filtered out is not recorded.
    async fn extract_evidence(
        &self,
        state: &mut ResearchState,
        claim_id: &str,
        statement: &str,
        url: &str,
        title: &str,
        text: &str,
    ) -> Result<usize> {
        let truncated: String = text.chars().take(EXTRACTION_TEXT_LIMIT).collect();
        let value = self
            .llm
            .call(
                "EVIDENCE_EXTRACTION",
                &json!({ "claim": statement, "url": url, "text": truncated }),
                &LlmOptions::default(),
            )
            .await?;
        state.record_llm_call();
        let parsed: ExtractionResponse = serde_json::from_value(value)?;

        let source_type = classify_source(url);
        let surviving: Vec<(RawEvidence, f64)> = parsed
            .items
            .into_iter()
            .take(self.config.max_evidence_per_source)
            .filter_map(|raw| {
                let probative = raw
                    .probative_value
                    .unwrap_or_else(|| default_probative_value(source_type));
                (probative >= self.config.min_probative_value).then_some((raw, probative))
            })
            .collect();
        if surviving.is_empty() {
            return Ok(0);
        }

        let source_id = format!("s{}", state.sources.len() + 1);
        state.sources.push(SourceRecord {
            id: source_id.clone(),
            url: url.to_string(),
            title: title.to_string(),
            source_type,
            content_chars: text.len(),
        });

        let kept = surviving.len();
        for (raw, probative) in surviving {
            let scope = raw.scope.map(|s| EvidenceScope {
                name: s.name,
                methodology: s.methodology,
                boundaries: s.boundaries,
                geographic: s.geographic,
                temporal: s.temporal,
                source_type,
            });
            let id = format!("e{}", state.evidence.len() + 1);
            state.evidence.push(EvidenceItem {
                id,
                statement: raw.statement,
                category: raw.category,
                specificity: raw.specificity,
                source_id: source_id.clone(),
                source_url: url.to_string(),
                source_title: title.to_string(),
                excerpt: raw.excerpt,
                direction: raw.direction,
                probative_value: probative,
                scope,
                relevant_claims: vec![claim_id.to_string()],
                is_derivative: raw.is_derivative,
                independently_verified: raw.independently_verified,
                claim_boundary_id: None,
            });
        }
        Ok(kept)
    }
}

/// Template and configuration errors abort the run; everything else is
/// recovered locally.
fn is_recoverable(err: &VeridictError) -> bool {
    !matches!(
        err,
        VeridictError::Template(_) | VeridictError::Config(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmTransport;
    use crate::config::LlmConfig;
    use crate::prompts::TemplateLibrary;
    use crate::types::{
        AtomicClaim, Centrality, ExpectedEvidence, HarmPotential,
    };
    use crate::web::{MockFetcher, MockSearchProvider};

    fn claim(id: &str, statement: &str) -> AtomicClaim {
        AtomicClaim {
            id: id.into(),
            statement: statement.into(),
            category: ClaimCategory::Factual,
            centrality: Centrality::High,
            harm_potential: HarmPotential::Medium,
            is_central: true,
            direction: ClaimDirection::Supports,
            key_entities: vec![],
            check_worthiness: 0.8,
            specificity: 0.8,
            grounding_quality: 0.8,
            expected_evidence: ExpectedEvidence::default(),
            verifiability: None,
        }
    }

    fn researcher(
        llm: Arc<MockLlmTransport>,
        search: Arc<MockSearchProvider>,
        fetcher: Arc<MockFetcher>,
        config: ResearchConfig,
    ) -> EvidenceResearcher {
        let client = LlmClient::new(
            Arc::new(TemplateLibrary::with_defaults()),
            vec![llm],
            LlmConfig {
                default_provider: "mock".into(),
                ..LlmConfig::default()
            },
        );
        EvidenceResearcher::new(Arc::new(client), search, fetcher, config)
    }

    /// Responses for one complete iteration on one claim against one URL.
    fn queue_iteration(llm: &MockLlmTransport, url: &str, evidence_statement: &str) {
        llm.push_response(r#"{"queries": ["generated query"]}"#);
        llm.push_response(&format!(r#"{{"scores": [{{"url": "{url}", "score": 0.9}}]}}"#));
        llm.push_response(&format!(
            r#"{{"items": [{{"statement": "{evidence_statement}", "specificity": 0.7,
                "direction": "supports", "probative_value": 0.8,
                "scope": {{"methodology": "survey data", "temporal": "2023"}}}}]}}"#
        ));
    }

    fn long_page() -> String {
        "measured content ".repeat(20)
    }

    #[test]
    fn test_scope_quality_classification() {
        let full = EvidenceScope {
            methodology: Some("lab measurement".into()),
            temporal: Some("2020-2024".into()),
            ..EvidenceScope::default()
        };
        assert_eq!(scope_quality(Some(&full)), ScopeQuality::Complete);

        let partial = EvidenceScope {
            methodology: Some("survey".into()),
            temporal: Some("n/a".into()),
            ..EvidenceScope::default()
        };
        assert_eq!(scope_quality(Some(&partial)), ScopeQuality::Partial);

        let trivial = EvidenceScope {
            methodology: Some("??".into()),
            temporal: Some("unknown".into()),
            ..EvidenceScope::default()
        };
        assert_eq!(scope_quality(Some(&trivial)), ScopeQuality::Incomplete);
        assert_eq!(scope_quality(None), ScopeQuality::Incomplete);
    }

    #[tokio::test]
    async fn test_research_extracts_evidence() {
        let llm = Arc::new(MockLlmTransport::new("mock"));
        queue_iteration(&llm, "https://a.gov/report", "X was measured at 5");
        let search = Arc::new(MockSearchProvider::new());
        search.push_hits(vec![("https://a.gov/report", "Report", "snippet")]);
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_page("https://a.gov/report", &long_page());

        let r = researcher(
            llm,
            search,
            fetcher,
            ResearchConfig {
                total_iterations: 1,
                contradiction_reserve: 0,
                sufficiency_threshold: 1,
                ..ResearchConfig::default()
            },
        );
        let mut state = ResearchState::new("input");
        state.claims.push(claim("c1", "X is 5"));
        r.research(&mut state).await.unwrap();

        assert_eq!(state.evidence.len(), 1);
        assert_eq!(state.evidence[0].statement, "X was measured at 5");
        assert_eq!(state.evidence[0].relevant_claims, vec!["c1".to_string()]);
        assert_eq!(state.sources.len(), 1);
        assert_eq!(state.queries.len(), 1);
        assert_eq!(state.queries[0].query, "generated query");
    }

    #[tokio::test]
    async fn test_source_title_comes_from_fetched_page() {
        let llm = Arc::new(MockLlmTransport::new("mock"));
        queue_iteration(&llm, "https://a.gov/report", "X was measured at 5");
        let search = Arc::new(MockSearchProvider::new());
        search.push_hits(vec![("https://a.gov/report", "Result title", "snippet")]);
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_page_titled("https://a.gov/report", "Annual Throughput Report", &long_page());

        let r = researcher(
            llm,
            search,
            fetcher,
            ResearchConfig {
                total_iterations: 1,
                contradiction_reserve: 0,
                sufficiency_threshold: 1,
                ..ResearchConfig::default()
            },
        );
        let mut state = ResearchState::new("input");
        state.claims.push(claim("c1", "X is 5"));
        r.research(&mut state).await.unwrap();

        assert_eq!(state.sources[0].title, "Annual Throughput Report");
        assert_eq!(state.evidence[0].source_title, "Annual Throughput Report");
    }

    #[tokio::test]
    async fn test_fully_filtered_source_is_not_recorded() {
        let llm = Arc::new(MockLlmTransport::new("mock"));
        llm.push_response(r#"{"queries": ["q"]}"#);
        llm.push_response(r#"{"scores": [{"url": "https://blog.example/x", "score": 0.9}]}"#);
        // Every extracted item sits below the probative minimum.
        llm.push_response(
            r#"{"items": [
                {"statement": "vague take", "probative_value": 0.1},
                {"statement": "another vague take", "probative_value": 0.2}
            ]}"#,
        );
        let search = Arc::new(MockSearchProvider::new());
        search.push_hits(vec![("https://blog.example/x", "Blog", "s")]);
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_page("https://blog.example/x", &long_page());

        let r = researcher(
            llm,
            search,
            fetcher,
            ResearchConfig {
                total_iterations: 1,
                contradiction_reserve: 0,
                ..ResearchConfig::default()
            },
        );
        let mut state = ResearchState::new("input");
        state.claims.push(claim("c1", "X is 5"));
        r.research(&mut state).await.unwrap();

        assert!(state.evidence.is_empty());
        assert!(state.sources.is_empty());
    }

    #[tokio::test]
    async fn test_short_pages_are_discarded() {
        let llm = Arc::new(MockLlmTransport::new("mock"));
        llm.push_response(r#"{"queries": ["q"]}"#);
        llm.push_response(r#"{"scores": [{"url": "https://a.org/x", "score": 0.9}]}"#);
        let search = Arc::new(MockSearchProvider::new());
        search.push_hits(vec![("https://a.org/x", "A", "s")]);
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_page("https://a.org/x", "too short");

        let r = researcher(
            llm,
            search,
            fetcher,
            ResearchConfig {
                total_iterations: 1,
                contradiction_reserve: 0,
                ..ResearchConfig::default()
            },
        );
        let mut state = ResearchState::new("input");
        state.claims.push(claim("c1", "X is 5"));
        r.research(&mut state).await.unwrap();

        // Page under the minimum content length: no source, no evidence.
        assert!(state.evidence.is_empty());
        assert!(state.sources.is_empty());
    }

    #[tokio::test]
    async fn test_irrelevant_results_are_not_fetched() {
        let llm = Arc::new(MockLlmTransport::new("mock"));
        llm.push_response(r#"{"queries": ["q"]}"#);
        llm.push_response(r#"{"scores": [{"url": "https://a.org/x", "score": 0.2}]}"#);
        let search = Arc::new(MockSearchProvider::new());
        search.push_hits(vec![("https://a.org/x", "A", "s")]);
        // Fetcher has no pages: a fetch attempt would error out loudly in
        // evidence counts; relevance filtering must skip it first.
        let fetcher = Arc::new(MockFetcher::new());

        let r = researcher(
            llm,
            search,
            fetcher,
            ResearchConfig {
                total_iterations: 1,
                contradiction_reserve: 0,
                ..ResearchConfig::default()
            },
        );
        let mut state = ResearchState::new("input");
        state.claims.push(claim("c1", "X is 5"));
        r.research(&mut state).await.unwrap();
        assert!(state.evidence.is_empty());
    }

    #[tokio::test]
    async fn test_per_claim_budgets_are_independent() {
        let llm = Arc::new(MockLlmTransport::new("mock"));
        // Two iterations, one per claim. Neither search returns results,
        // so no fetch/extraction calls are queued.
        llm.push_response(r#"{"queries": ["q for c1"]}"#);
        llm.push_response(r#"{"queries": ["q for c2"]}"#);
        let search = Arc::new(MockSearchProvider::new());
        // Both searches return nothing.
        let fetcher = Arc::new(MockFetcher::new());

        let r = researcher(
            llm,
            search.clone(),
            fetcher,
            ResearchConfig {
                per_claim_query_budget: 1,
                total_iterations: 4,
                contradiction_reserve: 0,
                sufficiency_threshold: 1,
                ..ResearchConfig::default()
            },
        );
        let mut state = ResearchState::new("input");
        state.claims.push(claim("c1", "A is true"));
        state.claims.push(claim("c2", "B is true"));
        r.research(&mut state).await.unwrap();

        // Claim A exhausting its budget of 1 did not block claim B.
        let c1_queries: Vec<_> = state.queries.iter().filter(|q| q.claim_id == "c1").collect();
        let c2_queries: Vec<_> = state.queries.iter().filter(|q| q.claim_id == "c2").collect();
        assert_eq!(c1_queries.len(), 1);
        assert_eq!(c2_queries.len(), 1);

        // Both claims exhausted before sufficiency: two budget warnings.
        let budget_warnings: Vec<_> = state
            .warnings
            .iter()
            .filter(|w| w.kind == WarningKind::QueryBudgetExhausted)
            .collect();
        assert_eq!(budget_warnings.len(), 2);
    }

    #[tokio::test]
    async fn test_sufficient_claims_are_skipped() {
        let llm = Arc::new(MockLlmTransport::new("mock"));
        let search = Arc::new(MockSearchProvider::new());
        let fetcher = Arc::new(MockFetcher::new());

        let r = researcher(
            llm,
            search.clone(),
            fetcher,
            ResearchConfig {
                total_iterations: 3,
                contradiction_reserve: 0,
                sufficiency_threshold: 1,
                ..ResearchConfig::default()
            },
        );
        let mut state = ResearchState::new("input");
        state.claims.push(claim("c1", "X is 5"));
        // Pre-seeded evidence satisfies the sufficiency threshold.
        state.evidence.push(EvidenceItem {
            id: "e1".into(),
            statement: "X measured at 5".into(),
            category: ClaimCategory::Factual,
            specificity: 0.7,
            source_id: "s1".into(),
            source_url: "https://a.org".into(),
            source_title: "A".into(),
            excerpt: String::new(),
            direction: ClaimDirection::Supports,
            probative_value: 0.7,
            scope: None,
            relevant_claims: vec!["c1".into()],
            is_derivative: false,
            independently_verified: false,
            claim_boundary_id: None,
        });
        r.research(&mut state).await.unwrap();

        // Main phase ended early on sufficiency: no searches ran.
        assert!(state.queries.is_empty());
        assert!(!state.adversarial_search_ran);
    }

    #[tokio::test]
    async fn test_contradiction_phase_runs_refuting_queries() {
        let llm = Arc::new(MockLlmTransport::new("mock"));
        // Main phase: claim becomes sufficient immediately (threshold 0
        // can't happen, so give it evidence). Use reserve of 1.
        llm.push_response(r#"{"queries": ["counter evidence query"]}"#);
        let search = Arc::new(MockSearchProvider::new());
        let fetcher = Arc::new(MockFetcher::new());

        let r = researcher(
            llm,
            search.clone(),
            fetcher,
            ResearchConfig {
                total_iterations: 2,
                contradiction_reserve: 1,
                sufficiency_threshold: 1,
                ..ResearchConfig::default()
            },
        );
        let mut state = ResearchState::new("input");
        state.claims.push(claim("c1", "X is 5"));
        state.evidence.push(EvidenceItem {
            id: "e1".into(),
            statement: "supportive".into(),
            category: ClaimCategory::Factual,
            specificity: 0.7,
            source_id: "s1".into(),
            source_url: "https://a.org".into(),
            source_title: "A".into(),
            excerpt: String::new(),
            direction: ClaimDirection::Supports,
            probative_value: 0.7,
            scope: None,
            relevant_claims: vec!["c1".into()],
            is_derivative: false,
            independently_verified: false,
            claim_boundary_id: None,
        });
        r.research(&mut state).await.unwrap();

        assert!(state.adversarial_search_ran);
        assert_eq!(state.queries.len(), 1);
        assert_eq!(state.queries[0].stance, QueryStance::Refuting);
    }
}
