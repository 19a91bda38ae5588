//! Stage 1: claim extraction and validation.
//!
//! Two LLM passes (neutral paraphrase + rough claims, then full atomic
//! claims) followed by the Gate 1 validation checks, centrality filtering,
//! and an optional preliminary search that seeds early evidence before the
//! main research loop.

use crate::brain::{LlmClient, LlmOptions};
use crate::config::{AnnotationMode, ExtractionConfig};
use crate::error::Result;
use crate::state::{QueryStance, ResearchState, SearchQueryRecord};
use crate::types::{
    AtomicClaim, Centrality, ClaimCategory, ClaimDirection, EvidenceItem, ExpectedEvidence,
    Gate1Stats, HarmPotential, SourceRecord,
};
use crate::web::{SearchProvider, classify_source};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct Pass1Response {
    #[serde(default)]
    paraphrase: String,
    #[serde(default)]
    rough_claims: Vec<RoughClaim>,
}

#[derive(Debug, Deserialize, serde::Serialize)]
struct RoughClaim {
    statement: String,
    #[serde(default)]
    search_hints: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Pass2Response {
    #[serde(default)]
    claims: Vec<RawClaim>,
}

/// Lenient mirror of `AtomicClaim` for parsing pass-2 output. Missing ids
/// are assigned sequentially afterwards.
#[derive(Debug, Deserialize)]
struct RawClaim {
    #[serde(default)]
    id: Option<String>,
    statement: String,
    #[serde(default = "default_category")]
    category: ClaimCategory,
    #[serde(default = "default_centrality")]
    centrality: Centrality,
    #[serde(default = "default_harm")]
    harm_potential: HarmPotential,
    #[serde(default)]
    is_central: bool,
    #[serde(default = "default_direction")]
    direction: ClaimDirection,
    #[serde(default)]
    key_entities: Vec<String>,
    #[serde(default = "default_half")]
    check_worthiness: f64,
    #[serde(default = "default_half")]
    specificity: f64,
    #[serde(default = "default_half")]
    grounding_quality: f64,
    #[serde(default)]
    expected_evidence: ExpectedEvidence,
    #[serde(default)]
    verifiability: Option<String>,
}

fn default_category() -> ClaimCategory {
    ClaimCategory::Factual
}
fn default_centrality() -> Centrality {
    Centrality::Medium
}
fn default_harm() -> HarmPotential {
    HarmPotential::Medium
}
fn default_direction() -> ClaimDirection {
    ClaimDirection::Contextual
}
fn default_half() -> f64 {
    0.5
}

impl RawClaim {
    fn into_claim(self, fallback_id: String) -> AtomicClaim {
        AtomicClaim {
            id: self.id.filter(|id| !id.is_empty()).unwrap_or(fallback_id),
            statement: self.statement,
            category: self.category,
            centrality: self.centrality,
            harm_potential: self.harm_potential,
            is_central: self.is_central,
            direction: self.direction,
            key_entities: self.key_entities,
            check_worthiness: self.check_worthiness,
            specificity: self.specificity,
            grounding_quality: self.grounding_quality,
            expected_evidence: self.expected_evidence,
            verifiability: self.verifiability,
        }
    }
}

/// Stage 1 driver.
pub struct ClaimExtractor {
    llm: Arc<LlmClient>,
    search: Arc<dyn SearchProvider>,
    config: ExtractionConfig,
}

impl ClaimExtractor {
    pub fn new(
        llm: Arc<LlmClient>,
        search: Arc<dyn SearchProvider>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            llm,
            search,
            config,
        }
    }

    /// Run both extraction passes, Gate 1, centrality filtering, and the
    /// preliminary search. Populates `state.claims`, `state.paraphrase`,
    /// and `state.gate1`.
    pub async fn extract(&self, state: &mut ResearchState) -> Result<()> {
        // Pass 1: neutral paraphrase and rough claims.
        let pass1 = self
            .llm
            .call(
                "CLAIM_EXTRACTION_PASS1",
                &json!({ "input": state.input }),
                &LlmOptions::default(),
            )
            .await?;
        state.record_llm_call();
        let pass1: Pass1Response = serde_json::from_value(pass1)?;
        state.paraphrase = Some(pass1.paraphrase.clone());

        // Pass 2: expand into atomic claims with full attribute sets.
        let pass2 = self
            .llm
            .call(
                "CLAIM_EXTRACTION_PASS2",
                &json!({
                    "paraphrase": pass1.paraphrase,
                    "rough_claims": serde_json::to_value(&pass1.rough_claims)?,
                }),
                &LlmOptions::default(),
            )
            .await?;
        state.record_llm_call();
        let pass2: Pass2Response = serde_json::from_value(pass2)?;

        let mut claims: Vec<AtomicClaim> = pass2
            .claims
            .into_iter()
            .enumerate()
            .map(|(i, raw)| raw.into_claim(format!("c{}", i + 1)))
            .collect();

        if self.config.annotation_mode == AnnotationMode::Strip {
            for claim in &mut claims {
                claim.verifiability = None;
            }
        }

        let reference = format!(
            "{}\n{}",
            state.input,
            state.paraphrase.as_deref().unwrap_or("")
        );
        let (kept, gate1) = validate_claims(claims, &reference, self.config.specificity_min);
        info!(
            evaluated = gate1.evaluated,
            kept = gate1.kept,
            filtered = gate1.filtered_count,
            safety_net = gate1.safety_net_used,
            "Gate 1 validation complete"
        );
        state.gate1 = Some(gate1);

        state.claims = filter_by_centrality(kept, self.config.max_claims);

        if self.config.preliminary_search {
            self.preliminary_search(state).await;
        }

        Ok(())
    }

    /// Seed early evidence from search snippets, one query per claim.
    /// These queries run before the research loop and are not charged
    /// against per-claim budgets. Search failures here are non-fatal.
    async fn preliminary_search(&self, state: &mut ResearchState) {
        let claims: Vec<(String, String, ClaimCategory)> = state
            .claims
            .iter()
            .map(|c| (c.id.clone(), c.statement.clone(), c.category))
            .collect();

        for (claim_id, statement, category) in claims {
            let response = match self.search.search(&statement).await {
                Ok(r) => r,
                Err(e) => {
                    debug!(claim = claim_id.as_str(), error = %e, "Preliminary search failed");
                    continue;
                }
            };
            state.queries.push(SearchQueryRecord {
                claim_id: claim_id.clone(),
                query: statement.clone(),
                iteration: 0,
                stance: QueryStance::Neutral,
                result_count: response.results.len(),
            });

            for hit in response.results.into_iter().take(2) {
                if hit.snippet.trim().is_empty() {
                    continue;
                }
                let source_id = format!("s{}", state.sources.len() + 1);
                state.sources.push(SourceRecord {
                    id: source_id.clone(),
                    url: hit.url.clone(),
                    title: hit.title.clone(),
                    source_type: classify_source(&hit.url),
                    content_chars: hit.snippet.len(),
                });
                let evidence_id = format!("e{}", state.evidence.len() + 1);
                state.evidence.push(EvidenceItem {
                    id: evidence_id,
                    statement: hit.snippet.clone(),
                    category,
                    specificity: 0.3,
                    source_id,
                    source_url: hit.url,
                    source_title: hit.title,
                    excerpt: hit.snippet,
                    direction: ClaimDirection::Contextual,
                    probative_value: 0.35,
                    scope: None,
                    relevant_claims: vec![claim_id.clone()],
                    is_derivative: false,
                    independently_verified: false,
                    claim_boundary_id: None,
                });
            }
        }
    }
}

/// Gate 1: keep a claim when it passes at least two of the three checks
/// (not-pure-opinion, specificity, input-fidelity). A safety net keeps the
/// most specific claim when everything fails, so the pipeline never goes
/// empty. `filtered_count` counts claims that failed both the opinion and
/// specificity checks.
pub fn validate_claims(
    claims: Vec<AtomicClaim>,
    reference_text: &str,
    specificity_min: f64,
) -> (Vec<AtomicClaim>, Gate1Stats) {
    let evaluated = claims.len();
    let mut kept = Vec::new();
    let mut filtered_count = 0;
    let mut best_rejected: Option<AtomicClaim> = None;

    for claim in claims {
        let opinion_ok = not_pure_opinion(&claim);
        let specificity_ok = claim.specificity >= specificity_min;
        let fidelity_ok = input_fidelity(&claim, reference_text);

        if !opinion_ok && !specificity_ok {
            filtered_count += 1;
        }

        let passes = usize::from(opinion_ok) + usize::from(specificity_ok) + usize::from(fidelity_ok);
        if passes >= 2 {
            kept.push(claim);
        } else if best_rejected
            .as_ref()
            .is_none_or(|b| claim.specificity > b.specificity)
        {
            best_rejected = Some(claim);
        }
    }

    let mut safety_net_used = false;
    let kept_on_merit = kept.len();
    if kept.is_empty() {
        if let Some(rescue) = best_rejected {
            kept.push(rescue);
            safety_net_used = true;
        }
    }

    let stats = Gate1Stats {
        evaluated,
        kept: kept.len(),
        filtered_count,
        safety_net_used,
        passed: kept_on_merit >= 1,
    };
    (kept, stats)
}

/// A claim is pure opinion when it is evaluative and nobody would bother
/// checking it.
fn not_pure_opinion(claim: &AtomicClaim) -> bool {
    claim.category == ClaimCategory::Factual || claim.check_worthiness >= 0.5
}

/// The claim must not introduce facts absent from the original input:
/// its key entities have to appear in the input or the paraphrase.
fn input_fidelity(claim: &AtomicClaim, reference_text: &str) -> bool {
    if claim.key_entities.is_empty() {
        return true;
    }
    let haystack = reference_text.to_lowercase();
    let present = claim
        .key_entities
        .iter()
        .filter(|e| haystack.contains(&e.to_lowercase()))
        .count();
    // Half the entities present is enough; extraction may normalize names.
    present * 2 >= claim.key_entities.len()
}

/// Order claims high-centrality-first and cap the list.
pub fn filter_by_centrality(mut claims: Vec<AtomicClaim>, max_claims: usize) -> Vec<AtomicClaim> {
    claims.sort_by_key(|c| c.centrality.rank());
    claims.truncate(max_claims);
    claims
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmTransport;
    use crate::config::LlmConfig;
    use crate::prompts::TemplateLibrary;
    use crate::web::MockSearchProvider;

    fn claim(id: &str, centrality: Centrality, specificity: f64) -> AtomicClaim {
        AtomicClaim {
            id: id.into(),
            statement: format!("claim {id} about solar capacity"),
            category: ClaimCategory::Factual,
            centrality,
            harm_potential: HarmPotential::Medium,
            is_central: centrality == Centrality::High,
            direction: ClaimDirection::Supports,
            key_entities: vec![],
            check_worthiness: 0.7,
            specificity,
            grounding_quality: 0.7,
            expected_evidence: ExpectedEvidence::default(),
            verifiability: None,
        }
    }

    fn make_extractor(
        llm: Arc<MockLlmTransport>,
        search: Arc<MockSearchProvider>,
        config: ExtractionConfig,
    ) -> ClaimExtractor {
        let client = LlmClient::new(
            Arc::new(TemplateLibrary::with_defaults()),
            vec![llm],
            LlmConfig {
                default_provider: "mock".into(),
                ..LlmConfig::default()
            },
        );
        ClaimExtractor::new(Arc::new(client), search, config)
    }

    #[test]
    fn test_filter_by_centrality_sorts_and_caps() {
        let claims = vec![
            claim("c1", Centrality::Low, 0.8),
            claim("c2", Centrality::High, 0.8),
            claim("c3", Centrality::Medium, 0.8),
            claim("c4", Centrality::High, 0.8),
        ];
        let filtered = filter_by_centrality(claims, 3);
        assert_eq!(filtered.len(), 3);
        assert_eq!(filtered[0].centrality, Centrality::High);
        assert_eq!(filtered[1].centrality, Centrality::High);
        assert_eq!(filtered[2].centrality, Centrality::Medium);
        // Stable: ties keep extraction order.
        assert_eq!(filtered[0].id, "c2");
        assert_eq!(filtered[1].id, "c4");
    }

    #[test]
    fn test_gate1_keeps_two_of_three() {
        let mut vague = claim("c1", Centrality::High, 0.2);
        vague.category = ClaimCategory::Factual; // opinion check passes
        // specificity fails, fidelity passes (no entities) -> 2 of 3, kept
        let (kept, stats) = validate_claims(vec![vague], "input text", 0.6);
        assert_eq!(kept.len(), 1);
        assert_eq!(stats.filtered_count, 0);
        assert!(stats.passed);
        assert!(!stats.safety_net_used);
    }

    #[test]
    fn test_gate1_safety_net_and_filtered_count() {
        // Both claims: evaluative with low check-worthiness (opinion fails)
        // and low specificity (specificity fails), entities not in input
        // (fidelity fails).
        let mut a = claim("c1", Centrality::High, 0.3);
        a.category = ClaimCategory::Evaluative;
        a.check_worthiness = 0.1;
        a.key_entities = vec!["Atlantis".into()];
        let mut b = claim("c2", Centrality::High, 0.5);
        b.category = ClaimCategory::Evaluative;
        b.check_worthiness = 0.2;
        b.key_entities = vec!["Elbonia".into()];

        let (kept, stats) = validate_claims(vec![a, b], "unrelated input", 0.6);
        // Safety net keeps exactly one claim: the more specific one.
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "c2");
        assert!(stats.safety_net_used);
        assert!(!stats.passed);
        // Both failed opinion AND specificity.
        assert_eq!(stats.filtered_count, 2);
    }

    #[test]
    fn test_gate1_filtered_count_excludes_partial_failures() {
        // Fails opinion but passes specificity: not counted as filtered.
        let mut a = claim("c1", Centrality::High, 0.9);
        a.category = ClaimCategory::Evaluative;
        a.check_worthiness = 0.1;

        let (kept, stats) = validate_claims(vec![a], "input", 0.6);
        assert_eq!(kept.len(), 1);
        assert_eq!(stats.filtered_count, 0);
    }

    #[test]
    fn test_input_fidelity_entity_matching() {
        let mut c = claim("c1", Centrality::High, 0.8);
        c.key_entities = vec!["Denmark".into(), "wind power".into()];
        assert!(input_fidelity(
            &c,
            "Denmark generates much of its electricity from wind power."
        ));
        assert!(!input_fidelity(&c, "France relies on nuclear plants."));
    }

    #[tokio::test]
    async fn test_extract_assigns_missing_ids_sequentially() {
        let llm = Arc::new(MockLlmTransport::new("mock"));
        llm.push_response(
            r#"{"paraphrase": "Solar output rose.", "rough_claims": [{"statement": "solar rose", "search_hints": []}]}"#,
        );
        llm.push_response(
            r#"{"claims": [
                {"statement": "Global solar output rose in 2024", "specificity": 0.9},
                {"id": "custom", "statement": "Capacity doubled since 2020", "specificity": 0.8}
            ]}"#,
        );
        let search = Arc::new(MockSearchProvider::new());
        let extractor = make_extractor(
            llm,
            search,
            ExtractionConfig {
                preliminary_search: false,
                ..ExtractionConfig::default()
            },
        );

        let mut state = ResearchState::new("Solar output rose in 2024, doubling 2020 capacity.");
        extractor.extract(&mut state).await.unwrap();

        assert_eq!(state.claims.len(), 2);
        assert_eq!(state.claims[0].id, "c1");
        assert_eq!(state.claims[1].id, "custom");
        assert_eq!(state.paraphrase.as_deref(), Some("Solar output rose."));
        assert_eq!(state.llm_calls, 2);
        assert!(state.gate1.as_ref().unwrap().passed);
    }

    #[tokio::test]
    async fn test_extract_strips_verifiability_in_strip_mode() {
        let llm = Arc::new(MockLlmTransport::new("mock"));
        llm.push_response(r#"{"paraphrase": "p", "rough_claims": []}"#);
        llm.push_response(
            r#"{"claims": [{"statement": "X is 5", "specificity": 0.9, "verifiability": "check registry"}]}"#,
        );
        let extractor = make_extractor(
            llm,
            Arc::new(MockSearchProvider::new()),
            ExtractionConfig {
                preliminary_search: false,
                annotation_mode: AnnotationMode::Strip,
                ..ExtractionConfig::default()
            },
        );

        let mut state = ResearchState::new("X is 5");
        extractor.extract(&mut state).await.unwrap();
        assert!(state.claims[0].verifiability.is_none());
    }

    #[tokio::test]
    async fn test_preliminary_search_seeds_snippet_evidence() {
        let llm = Arc::new(MockLlmTransport::new("mock"));
        llm.push_response(r#"{"paraphrase": "p", "rough_claims": []}"#);
        llm.push_response(r#"{"claims": [{"statement": "X is 5", "specificity": 0.9}]}"#);
        let search = Arc::new(MockSearchProvider::new());
        search.push_hits(vec![
            ("https://a.gov/x", "A", "X was measured at 5 in the census"),
            ("https://b.org/y", "B", "Report on X"),
            ("https://c.org/z", "C", "third hit ignored"),
        ]);

        let extractor = make_extractor(llm, search.clone(), ExtractionConfig::default());
        let mut state = ResearchState::new("X is 5");
        extractor.extract(&mut state).await.unwrap();

        // Top 2 snippets became contextual evidence.
        assert_eq!(state.evidence.len(), 2);
        assert_eq!(state.evidence[0].direction, ClaimDirection::Contextual);
        assert_eq!(state.evidence[0].relevant_claims, vec!["c1".to_string()]);
        assert_eq!(state.queries.len(), 1);
        assert_eq!(state.queries[0].iteration, 0);
        assert_eq!(search.queries(), vec!["X is 5"]);
    }
}
