//! Stage 4: multi-role debate verdicts.
//!
//! Each (claim, boundary) pair with evidence runs a four-role debate:
//! an advocate drafts a verdict, a challenger raises objections, a
//! reconciler settles them into a boundary finding, and two validator
//! passes check grounding and direction consistency, correcting the
//! finding when they disagree. Boundary findings combine into one claim
//! verdict weighted by evidence count, with a cross-boundary
//! triangulation signal and optional self-consistency sampling.

use crate::brain::{LlmClient, LlmOptions};
use crate::config::{CalculationConfig, DebateRole, VerdictConfig};
use crate::error::Result;
use crate::state::{PipelineWarning, ResearchState, WarningKind, WarningSeverity};
use crate::types::{
    ChallengeRecord, ClaimAssessmentBoundary, ClaimVerdict, ConsistencyResult, EvidenceDirection,
    EvidenceItem, MisleadingnessAssessment, MisleadingnessLevel, TriangulationLevel,
    TriangulationScore, verdict_label,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Boundary truth spread (percentage points) above which a claim counts
/// as contested.
const CONTESTED_SPREAD: f64 = 30.0;

#[derive(Debug, Deserialize)]
struct AdvocateResponse {
    truth_percentage: f64,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct ChallengerResponse {
    #[serde(default)]
    challenges: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReconciliationResponse {
    truth_percentage: f64,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default = "default_direction")]
    direction: EvidenceDirection,
    #[serde(default)]
    responses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GroundingResponse {
    #[serde(default = "default_true")]
    grounded: bool,
    #[serde(default)]
    corrected_confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DirectionResponse {
    #[serde(default = "default_true")]
    consistent: bool,
    #[serde(default)]
    corrected_percentage: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MisleadingnessResponse {
    level: MisleadingnessLevel,
    #[serde(default)]
    rationale: String,
}

#[derive(Debug, Deserialize)]
struct SampleResponse {
    truth_percentage: f64,
}

fn default_confidence() -> f64 {
    0.5
}
fn default_direction() -> EvidenceDirection {
    EvidenceDirection::Mixed
}
fn default_true() -> bool {
    true
}

/// One boundary debate's settled outcome plus the transcript pieces the
/// sampler reuses.
struct DebateOutcome {
    truth_percentage: f64,
    confidence: f64,
    direction: EvidenceDirection,
    reasoning: String,
    challenges: Vec<ChallengeRecord>,
    advocate_reasoning: String,
    challenge_text: String,
}

/// Stage 4 driver.
pub struct VerdictGenerator {
    llm: Arc<LlmClient>,
    config: VerdictConfig,
    calc: CalculationConfig,
}

impl VerdictGenerator {
    pub fn new(llm: Arc<LlmClient>, config: VerdictConfig, calc: CalculationConfig) -> Self {
        Self { llm, config, calc }
    }

    /// Warn when the four debate roles collapse onto one model.
    ///
    /// Debate only adds signal when roles can disagree; four calls to the
    /// same tier and provider are a single model arguing with itself. One
    /// role pinned to a distinct provider is enough to suppress the
    /// warning.
    pub fn check_debate_tier_diversity(&self, state: &mut ResearchState) {
        let roles = [
            &self.config.roles.advocate,
            &self.config.roles.challenger,
            &self.config.roles.reconciler,
            &self.config.roles.validator,
        ];
        let tiers: HashSet<_> = roles.iter().map(|r| r.tier).collect();
        let providers: HashSet<_> = roles
            .iter()
            .map(|r| r.provider.as_deref().unwrap_or("default"))
            .collect();
        if tiers.len() == 1 && providers.len() == 1 {
            state.push_warning(PipelineWarning::new(
                WarningKind::DegenerateDebateConfig,
                WarningSeverity::Info,
                "all debate roles share one tier and provider",
                json!({"tier": roles[0].tier}),
            ));
        }
    }

    /// Produce one verdict per claim.
    #[instrument(skip_all, fields(claims = state.claims.len()))]
    pub async fn generate(
        &self,
        state: &mut ResearchState,
        boundaries: &[ClaimAssessmentBoundary],
    ) -> Result<Vec<ClaimVerdict>> {
        self.check_debate_tier_diversity(state);

        let mut fallback_warned: HashSet<String> = HashSet::new();
        let mut verdicts = Vec::with_capacity(state.claims.len());
        for claim_idx in 0..state.claims.len() {
            let claim = state.claims[claim_idx].clone();
            let mut findings = Vec::new();
            let mut outcomes: Vec<(usize, DebateOutcome)> = Vec::new();

            for boundary in boundaries {
                let evidence: Vec<EvidenceItem> = state
                    .evidence_for_claim_in_boundary(&claim.id, &boundary.id)
                    .into_iter()
                    .cloned()
                    .collect();
                if evidence.is_empty() {
                    continue;
                }
                let outcome = self
                    .debate(state, &claim.statement, boundary, &evidence, &mut fallback_warned)
                    .await?;
                findings.push(crate::types::BoundaryFinding {
                    boundary_id: boundary.id.clone(),
                    truth_percentage: outcome.truth_percentage,
                    confidence: outcome.confidence,
                    direction: outcome.direction,
                    evidence_count: evidence.len(),
                });
                outcomes.push((evidence.len(), outcome));
            }

            let verdict = if findings.is_empty() {
                debug!(claim = claim.id.as_str(), "No evidence; insufficient verdict");
                self.insufficient_verdict(&claim)
            } else {
                self.combine(state, &claim, findings, outcomes).await?
            };
            verdicts.push(verdict);
        }

        info!(verdicts = verdicts.len(), "Verdict generation complete");
        Ok(verdicts)
    }

    fn role_options(&self, role: &DebateRole, temperature: f64) -> LlmOptions {
        LlmOptions {
            tier: role.tier,
            temperature,
            provider_override: role.provider.clone(),
        }
    }

    /// Warn once per pinned provider that had to fall back.
    fn note_fallback(
        &self,
        state: &mut ResearchState,
        role: &DebateRole,
        role_name: &str,
        warned: &mut HashSet<String>,
    ) {
        let Some(pinned) = role.provider.as_deref() else {
            return;
        };
        let (_resolved, fell_back) = self.llm.resolve_provider(Some(pinned));
        if fell_back && warned.insert(pinned.to_string()) {
            state.push_warning(PipelineWarning::new(
                WarningKind::DebateProviderFallback,
                WarningSeverity::Caution,
                format!("debate role {role_name} fell back from provider {pinned}"),
                json!({"role": role_name, "pinned_provider": pinned}),
            ));
        }
    }

    async fn debate(
        &self,
        state: &mut ResearchState,
        statement: &str,
        boundary: &ClaimAssessmentBoundary,
        evidence: &[EvidenceItem],
        fallback_warned: &mut HashSet<String>,
    ) -> Result<DebateOutcome> {
        let listing = evidence_listing(evidence);
        let roles = &self.config.roles;

        self.note_fallback(state, &roles.advocate, "advocate", fallback_warned);
        let advocate_value = self
            .llm
            .call(
                "VERDICT_ADVOCATE",
                &json!({
                    "claim": statement,
                    "boundary": boundary.name,
                    "evidence": listing,
                }),
                &self.role_options(&roles.advocate, 0.0),
            )
            .await?;
        state.record_llm_call();
        let advocate: AdvocateResponse = serde_json::from_value(advocate_value)?;

        self.note_fallback(state, &roles.challenger, "challenger", fallback_warned);
        let challenger_value = self
            .llm
            .call(
                "VERDICT_CHALLENGER",
                &json!({
                    "claim": statement,
                    "evidence": listing,
                    "advocate_reasoning": advocate.reasoning,
                    "advocate_percentage": advocate.truth_percentage,
                }),
                &self.role_options(&roles.challenger, 0.0),
            )
            .await?;
        state.record_llm_call();
        let challenger: ChallengerResponse = serde_json::from_value(challenger_value)?;
        let challenge_text = challenger.challenges.join("\n");

        self.note_fallback(state, &roles.reconciler, "reconciler", fallback_warned);
        let reconciliation_value = self
            .llm
            .call(
                "VERDICT_RECONCILIATION",
                &json!({
                    "claim": statement,
                    "evidence": listing,
                    "advocate_reasoning": advocate.reasoning,
                    "advocate_percentage": advocate.truth_percentage,
                    "challenges": challenge_text,
                }),
                &self.role_options(&roles.reconciler, 0.0),
            )
            .await?;
        state.record_llm_call();
        let reconciled: ReconciliationResponse = serde_json::from_value(reconciliation_value)?;

        let mut truth = reconciled.truth_percentage.clamp(0.0, 100.0);
        let mut confidence = reconciled.confidence.clamp(0.0, 1.0);

        self.note_fallback(state, &roles.validator, "validator", fallback_warned);
        let grounding_value = self
            .llm
            .call(
                "VERDICT_GROUNDING_VALIDATION",
                &json!({
                    "claim": statement,
                    "evidence": listing,
                    "reasoning": reconciled.reasoning,
                    "confidence": confidence,
                }),
                &self.role_options(&roles.validator, 0.0),
            )
            .await?;
        state.record_llm_call();
        let grounding: GroundingResponse = serde_json::from_value(grounding_value)?;
        if !grounding.grounded {
            if let Some(corrected) = grounding.corrected_confidence {
                debug!(
                    boundary = boundary.id.as_str(),
                    from = confidence,
                    to = corrected,
                    "Grounding validator corrected confidence"
                );
                confidence = corrected.clamp(0.0, 1.0);
            }
        }

        let direction_value = self
            .llm
            .call(
                "VERDICT_DIRECTION_VALIDATION",
                &json!({
                    "claim": statement,
                    "evidence": listing,
                    "truth_percentage": truth,
                    "reasoning": reconciled.reasoning,
                }),
                &self.role_options(&roles.validator, 0.0),
            )
            .await?;
        state.record_llm_call();
        let direction_check: DirectionResponse = serde_json::from_value(direction_value)?;
        if !direction_check.consistent {
            if let Some(corrected) = direction_check.corrected_percentage {
                debug!(
                    boundary = boundary.id.as_str(),
                    from = truth,
                    to = corrected,
                    "Direction validator corrected truth percentage"
                );
                truth = corrected.clamp(0.0, 100.0);
            }
        }

        let challenges = challenger
            .challenges
            .into_iter()
            .enumerate()
            .map(|(i, challenge)| ChallengeRecord {
                challenge,
                response: reconciled.responses.get(i).cloned().unwrap_or_default(),
            })
            .collect();

        Ok(DebateOutcome {
            truth_percentage: truth,
            confidence,
            direction: reconciled.direction,
            reasoning: reconciled.reasoning,
            challenges,
            advocate_reasoning: advocate.reasoning,
            challenge_text,
        })
    }

    /// Merge boundary findings into one claim verdict.
    async fn combine(
        &self,
        state: &mut ResearchState,
        claim: &crate::types::AtomicClaim,
        findings: Vec<crate::types::BoundaryFinding>,
        outcomes: Vec<(usize, DebateOutcome)>,
    ) -> Result<ClaimVerdict> {
        let total: usize = findings.iter().map(|f| f.evidence_count).sum();
        let total = total.max(1) as f64;
        let truth: f64 = findings
            .iter()
            .map(|f| f.truth_percentage * f.evidence_count as f64)
            .sum::<f64>()
            / total;
        let mut confidence: f64 = findings
            .iter()
            .map(|f| f.confidence * f.evidence_count as f64)
            .sum::<f64>()
            / total;

        let spread = findings
            .iter()
            .map(|f| f.truth_percentage)
            .fold(f64::NEG_INFINITY, f64::max)
            - findings
                .iter()
                .map(|f| f.truth_percentage)
                .fold(f64::INFINITY, f64::min);
        let triangulation = self.triangulate(&findings);
        let contested =
            spread > CONTESTED_SPREAD || triangulation.level == TriangulationLevel::Conflicted;

        // The boundary with the most evidence anchors reasoning, the
        // debate transcript, and consistency sampling.
        let primary = outcomes
            .iter()
            .max_by_key(|(count, _)| *count)
            .map(|(_, o)| o)
            .ok_or_else(|| {
                crate::error::VeridictError::Pipeline(crate::error::PipelineError::StageFailed {
                    stage: "verdict".to_string(),
                    message: "no debate outcome for claim with findings".to_string(),
                })
            })?;

        let consistency = self
            .sample_consistency(state, &claim.statement, primary)
            .await?;
        let mut final_truth = truth;
        if consistency.performed {
            final_truth = consistency.mean;
            if !consistency.stable {
                confidence = (confidence * 0.8).clamp(0.0, 1.0);
            }
        }

        let supporting_evidence: Vec<String> = state
            .evidence_for_claim(&claim.id)
            .iter()
            .filter(|e| e.direction == crate::types::ClaimDirection::Supports)
            .map(|e| e.id.clone())
            .collect();
        let contradicting_evidence: Vec<String> = state
            .evidence_for_claim(&claim.id)
            .iter()
            .filter(|e| e.direction == crate::types::ClaimDirection::Contradicts)
            .map(|e| e.id.clone())
            .collect();

        let misleadingness = if self.config.classify_misleadingness {
            Some(
                self.classify_misleadingness(state, &claim.statement, &primary.reasoning)
                    .await?,
            )
        } else {
            None
        };

        let reasoning = primary.reasoning.clone();
        let challenges = outcomes
            .into_iter()
            .flat_map(|(_, o)| o.challenges)
            .collect();

        Ok(ClaimVerdict {
            claim_id: claim.id.clone(),
            truth_percentage: final_truth,
            label: verdict_label(final_truth),
            confidence,
            reasoning,
            harm_potential: claim.harm_potential,
            contested,
            supporting_evidence,
            contradicting_evidence,
            boundary_findings: findings,
            consistency,
            challenges,
            triangulation,
            misleadingness,
        })
    }

    /// Cross-boundary agreement signal.
    fn triangulate(&self, findings: &[crate::types::BoundaryFinding]) -> TriangulationScore {
        let supporting = findings
            .iter()
            .filter(|f| f.direction == EvidenceDirection::Supports)
            .count();
        let contradicting = findings
            .iter()
            .filter(|f| f.direction == EvidenceDirection::Contradicts)
            .count();
        let values = &self.calc.triangulation;
        // Split support marks the claim conflicted but leaves its weight
        // alone; the contested flag carries the signal.
        let (level, adjustment) = if supporting >= 1 && contradicting >= 1 {
            (TriangulationLevel::Conflicted, 1.0)
        } else if supporting >= 3 {
            (TriangulationLevel::Strong, values.strong_boost)
        } else if supporting == 2 {
            (TriangulationLevel::Moderate, values.moderate_boost)
        } else {
            (TriangulationLevel::Weak, values.single_penalty)
        };
        TriangulationScore {
            boundary_count: findings.len(),
            supporting,
            contradicting,
            level,
            adjustment,
        }
    }

    /// Re-ask the reconciler at elevated temperature and measure spread.
    async fn sample_consistency(
        &self,
        state: &mut ResearchState,
        statement: &str,
        primary: &DebateOutcome,
    ) -> Result<ConsistencyResult> {
        if self.config.consistency_samples == 0 {
            return Ok(ConsistencyResult::skipped());
        }
        let opts = LlmOptions {
            tier: self.config.roles.reconciler.tier,
            temperature: self.config.consistency_temperature,
            provider_override: self.config.roles.reconciler.provider.clone(),
        };
        let mut samples = Vec::with_capacity(self.config.consistency_samples);
        for _ in 0..self.config.consistency_samples {
            let value = self
                .llm
                .call(
                    "VERDICT_RECONCILIATION",
                    &json!({
                        "claim": statement,
                        "evidence": "",
                        "advocate_reasoning": primary.advocate_reasoning,
                        "advocate_percentage": primary.truth_percentage,
                        "challenges": primary.challenge_text,
                    }),
                    &opts,
                )
                .await?;
            state.record_llm_call();
            let sample: SampleResponse = serde_json::from_value(value)?;
            samples.push(sample.truth_percentage.clamp(0.0, 100.0));
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let spread = samples.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b))
            - samples.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        Ok(ConsistencyResult {
            stable: spread <= self.config.consistency_spread_threshold,
            samples,
            mean,
            spread,
            performed: true,
        })
    }

    async fn classify_misleadingness(
        &self,
        state: &mut ResearchState,
        statement: &str,
        reasoning: &str,
    ) -> Result<MisleadingnessAssessment> {
        let value = self
            .llm
            .call(
                "VERDICT_MISLEADINGNESS",
                &json!({"claim": statement, "reasoning": reasoning}),
                &self.role_options(&self.config.roles.validator, 0.0),
            )
            .await?;
        state.record_llm_call();
        let parsed: MisleadingnessResponse = serde_json::from_value(value)?;
        Ok(MisleadingnessAssessment {
            level: parsed.level,
            rationale: parsed.rationale,
        })
    }

    /// Verdict for a claim the research stage found nothing on.
    fn insufficient_verdict(&self, claim: &crate::types::AtomicClaim) -> ClaimVerdict {
        ClaimVerdict {
            claim_id: claim.id.clone(),
            truth_percentage: 50.0,
            label: verdict_label(50.0),
            confidence: 0.1,
            reasoning: "No usable evidence was found for this claim.".to_string(),
            harm_potential: claim.harm_potential,
            contested: false,
            supporting_evidence: Vec::new(),
            contradicting_evidence: Vec::new(),
            boundary_findings: Vec::new(),
            consistency: ConsistencyResult::skipped(),
            challenges: Vec::new(),
            triangulation: TriangulationScore {
                boundary_count: 0,
                supporting: 0,
                contradicting: 0,
                level: TriangulationLevel::Weak,
                adjustment: self.calc.triangulation.single_penalty,
            },
            misleadingness: None,
        }
    }
}

fn evidence_listing(evidence: &[EvidenceItem]) -> String {
    let listing: Vec<_> = evidence
        .iter()
        .map(|e| {
            json!({
                "id": e.id,
                "statement": e.statement,
                "direction": e.direction,
                "probative_value": e.probative_value,
                "url": e.source_url,
            })
        })
        .collect();
    serde_json::Value::Array(listing).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::{LlmTransport, MockLlmTransport};
    use crate::config::{DebateRoles, LlmConfig};
    use crate::prompts::TemplateLibrary;
    use crate::types::{
        AtomicClaim, Centrality, ClaimCategory, ClaimDirection, ExpectedEvidence, HarmPotential,
        VerdictLabel,
    };

    fn generator(
        transports: Vec<Arc<dyn LlmTransport>>,
        config: VerdictConfig,
    ) -> VerdictGenerator {
        let client = LlmClient::new(
            Arc::new(TemplateLibrary::with_defaults()),
            transports,
            LlmConfig {
                default_provider: "mock".into(),
                ..LlmConfig::default()
            },
        );
        VerdictGenerator::new(Arc::new(client), config, CalculationConfig::default())
    }

    fn claim(id: &str) -> AtomicClaim {
        AtomicClaim {
            id: id.into(),
            statement: "X causes Y".into(),
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

    fn evidence(id: &str, claim: &str, boundary: &str, direction: ClaimDirection) -> EvidenceItem {
        EvidenceItem {
            id: id.into(),
            statement: "stmt".into(),
            category: ClaimCategory::Factual,
            specificity: 0.7,
            source_id: "s1".into(),
            source_url: "https://example.org".into(),
            source_title: "Example".into(),
            excerpt: String::new(),
            direction,
            probative_value: 0.7,
            scope: None,
            relevant_claims: vec![claim.into()],
            is_derivative: false,
            independently_verified: false,
            claim_boundary_id: Some(boundary.into()),
        }
    }

    fn boundary(id: &str) -> ClaimAssessmentBoundary {
        ClaimAssessmentBoundary {
            id: id.into(),
            name: format!("Boundary {id}"),
            short_name: id.into(),
            description: String::new(),
            methodology: None,
            boundaries: None,
            geographic: None,
            temporal: None,
            scope_fingerprints: vec![],
            coherence: 0.8,
            evidence_count: 0,
        }
    }

    /// Queue one full debate: advocate, challenger, reconciler, two
    /// validator passes.
    fn queue_debate(mock: &MockLlmTransport, reconciled_truth: f64) {
        mock.push_response(
            r#"{"truth_percentage": 80, "confidence": 0.8, "reasoning": "looks supported"}"#,
        );
        mock.push_response(r#"{"challenges": ["sample bias"]}"#);
        mock.push_response(&format!(
            r#"{{"truth_percentage": {reconciled_truth}, "confidence": 0.7,
                "reasoning": "settled", "direction": "supports",
                "responses": ["addressed"]}}"#
        ));
        mock.push_response(r#"{"grounded": true}"#);
        mock.push_response(r#"{"consistent": true}"#);
    }

    #[tokio::test]
    async fn test_debate_produces_verdict() {
        let mock = Arc::new(MockLlmTransport::new("mock"));
        queue_debate(&mock, 72.0);
        let g = generator(vec![mock], VerdictConfig::default());

        let mut state = ResearchState::new("input");
        state.claims.push(claim("c1"));
        state
            .evidence
            .push(evidence("e1", "c1", "b1", ClaimDirection::Supports));

        let verdicts = g.generate(&mut state, &[boundary("b1")]).await.unwrap();
        assert_eq!(verdicts.len(), 1);
        let v = &verdicts[0];
        assert_eq!(v.truth_percentage, 72.0);
        assert_eq!(v.label, VerdictLabel::MostlyTrue);
        assert_eq!(v.boundary_findings.len(), 1);
        assert_eq!(v.challenges.len(), 1);
        assert_eq!(v.challenges[0].challenge, "sample bias");
        assert_eq!(v.challenges[0].response, "addressed");
        assert_eq!(v.supporting_evidence, vec!["e1".to_string()]);
        assert!(!v.consistency.performed);
    }

    #[tokio::test]
    async fn test_direction_validator_corrects_reversed_verdict() {
        let mock = Arc::new(MockLlmTransport::new("mock"));
        mock.push_response(
            r#"{"truth_percentage": 85, "confidence": 0.8, "reasoning": "misread"}"#,
        );
        mock.push_response(r#"{"challenges": ["evidence points the other way"]}"#);
        mock.push_response(
            r#"{"truth_percentage": 80, "confidence": 0.7, "reasoning": "kept high",
                "direction": "contradicts", "responses": []}"#,
        );
        mock.push_response(r#"{"grounded": true}"#);
        // Contradicting evidence with a high percentage: the direction
        // validator flips the score down.
        mock.push_response(r#"{"consistent": false, "corrected_percentage": 22}"#);
        let g = generator(vec![mock], VerdictConfig::default());

        let mut state = ResearchState::new("input");
        state.claims.push(claim("c1"));
        state
            .evidence
            .push(evidence("e1", "c1", "b1", ClaimDirection::Contradicts));

        let verdicts = g.generate(&mut state, &[boundary("b1")]).await.unwrap();
        let v = &verdicts[0];
        assert!(v.truth_percentage <= 28.0);
        assert_eq!(v.label, VerdictLabel::False);
        assert_eq!(v.contradicting_evidence, vec!["e1".to_string()]);
    }

    #[tokio::test]
    async fn test_findings_combine_weighted_by_evidence() {
        let mock = Arc::new(MockLlmTransport::new("mock"));
        // b1 debate (2 evidence items), then b2 debate (1 item).
        queue_debate(&mock, 90.0);
        queue_debate(&mock, 30.0);
        let g = generator(vec![mock], VerdictConfig::default());

        let mut state = ResearchState::new("input");
        state.claims.push(claim("c1"));
        state
            .evidence
            .push(evidence("e1", "c1", "b1", ClaimDirection::Supports));
        state
            .evidence
            .push(evidence("e2", "c1", "b1", ClaimDirection::Supports));
        state
            .evidence
            .push(evidence("e3", "c1", "b2", ClaimDirection::Supports));

        let verdicts = g
            .generate(&mut state, &[boundary("b1"), boundary("b2")])
            .await
            .unwrap();
        let v = &verdicts[0];
        // (90*2 + 30*1) / 3 = 70.
        assert!((v.truth_percentage - 70.0).abs() < 1e-9);
        assert_eq!(v.boundary_findings.len(), 2);
        // 60-point spread across boundaries marks the claim contested.
        assert!(v.contested);
    }

    #[tokio::test]
    async fn test_split_support_is_conflicted_without_adjustment() {
        let mock = Arc::new(MockLlmTransport::new("mock"));
        // b1 settles supporting, b2 settles contradicting.
        queue_debate(&mock, 75.0);
        mock.push_response(
            r#"{"truth_percentage": 30, "confidence": 0.6, "reasoning": "refuted here"}"#,
        );
        mock.push_response(r#"{"challenges": []}"#);
        mock.push_response(
            r#"{"truth_percentage": 30, "confidence": 0.6, "reasoning": "refuted here",
                "direction": "contradicts", "responses": []}"#,
        );
        mock.push_response(r#"{"grounded": true}"#);
        mock.push_response(r#"{"consistent": true}"#);
        let g = generator(vec![mock], VerdictConfig::default());

        let mut state = ResearchState::new("input");
        state.claims.push(claim("c1"));
        state
            .evidence
            .push(evidence("e1", "c1", "b1", ClaimDirection::Supports));
        state
            .evidence
            .push(evidence("e2", "c1", "b2", ClaimDirection::Contradicts));

        let verdicts = g
            .generate(&mut state, &[boundary("b1"), boundary("b2")])
            .await
            .unwrap();
        let v = &verdicts[0];
        assert_eq!(v.triangulation.level, TriangulationLevel::Conflicted);
        assert_eq!(v.triangulation.adjustment, 1.0);
        assert!(v.contested);
    }

    #[tokio::test]
    async fn test_no_evidence_yields_insufficient_verdict() {
        let mock = Arc::new(MockLlmTransport::new("mock"));
        let g = generator(vec![mock.clone()], VerdictConfig::default());

        let mut state = ResearchState::new("input");
        state.claims.push(claim("c1"));

        let verdicts = g.generate(&mut state, &[boundary("b1")]).await.unwrap();
        let v = &verdicts[0];
        assert_eq!(v.truth_percentage, 50.0);
        assert!(v.confidence < 0.25);
        assert!(v.boundary_findings.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_degenerate_config_warns_and_distinct_provider_suppresses() {
        let mock = Arc::new(MockLlmTransport::new("mock"));
        let g = generator(
            vec![mock.clone()],
            VerdictConfig {
                roles: DebateRoles {
                    advocate: DebateRole::default(),
                    challenger: DebateRole::default(),
                    reconciler: DebateRole::default(),
                    validator: DebateRole::default(),
                },
                ..VerdictConfig::default()
            },
        );
        let mut state = ResearchState::new("input");
        g.check_debate_tier_diversity(&mut state);
        assert!(
            state
                .warnings
                .iter()
                .any(|w| w.kind == WarningKind::DegenerateDebateConfig)
        );

        // Default roles split the validator onto the economy tier.
        let g2 = generator(vec![mock.clone()], VerdictConfig::default());
        let mut state2 = ResearchState::new("input");
        g2.check_debate_tier_diversity(&mut state2);
        assert!(state2.warnings.is_empty());

        // Same tier everywhere, but one role pinned to a distinct
        // provider also suppresses the warning.
        let g3 = generator(
            vec![mock],
            VerdictConfig {
                roles: DebateRoles {
                    advocate: DebateRole::default(),
                    challenger: DebateRole {
                        provider: Some("anthropic".into()),
                        ..DebateRole::default()
                    },
                    reconciler: DebateRole::default(),
                    validator: DebateRole::default(),
                },
                ..VerdictConfig::default()
            },
        );
        let mut state3 = ResearchState::new("input");
        g3.check_debate_tier_diversity(&mut state3);
        assert!(state3.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_pinned_provider_fallback_warns_once() {
        let mock = Arc::new(MockLlmTransport::new("mock"));
        queue_debate(&mock, 60.0);
        let mut config = VerdictConfig::default();
        config.roles.advocate.provider = Some("pinned-but-absent".into());
        let g = generator(vec![mock], config);

        let mut state = ResearchState::new("input");
        state.claims.push(claim("c1"));
        state
            .evidence
            .push(evidence("e1", "c1", "b1", ClaimDirection::Supports));

        g.generate(&mut state, &[boundary("b1")]).await.unwrap();
        let fallbacks: Vec<_> = state
            .warnings
            .iter()
            .filter(|w| w.kind == WarningKind::DebateProviderFallback)
            .collect();
        assert_eq!(fallbacks.len(), 1);
    }

    #[tokio::test]
    async fn test_self_consistency_sampling() {
        let mock = Arc::new(MockLlmTransport::new("mock"));
        queue_debate(&mock, 70.0);
        // Three samples with a 40-point spread: unstable.
        mock.push_response(r#"{"truth_percentage": 50}"#);
        mock.push_response(r#"{"truth_percentage": 90}"#);
        mock.push_response(r#"{"truth_percentage": 70}"#);
        let g = generator(
            vec![mock],
            VerdictConfig {
                consistency_samples: 3,
                ..VerdictConfig::default()
            },
        );

        let mut state = ResearchState::new("input");
        state.claims.push(claim("c1"));
        state
            .evidence
            .push(evidence("e1", "c1", "b1", ClaimDirection::Supports));

        let verdicts = g.generate(&mut state, &[boundary("b1")]).await.unwrap();
        let v = &verdicts[0];
        assert!(v.consistency.performed);
        assert_eq!(v.consistency.samples.len(), 3);
        assert!((v.consistency.mean - 70.0).abs() < 1e-9);
        assert_eq!(v.consistency.spread, 40.0);
        assert!(!v.consistency.stable);
        // The sample mean replaces the single-shot verdict, and the
        // instability discounts confidence.
        assert!((v.truth_percentage - 70.0).abs() < 1e-9);
        assert!(v.confidence < 0.7);
    }

    #[tokio::test]
    async fn test_misleadingness_classification() {
        let mock = Arc::new(MockLlmTransport::new("mock"));
        queue_debate(&mock, 88.0);
        mock.push_response(r#"{"level": "moderate", "rationale": "true but cherry-picked"}"#);
        let g = generator(
            vec![mock],
            VerdictConfig {
                classify_misleadingness: true,
                ..VerdictConfig::default()
            },
        );

        let mut state = ResearchState::new("input");
        state.claims.push(claim("c1"));
        state
            .evidence
            .push(evidence("e1", "c1", "b1", ClaimDirection::Supports));

        let verdicts = g.generate(&mut state, &[boundary("b1")]).await.unwrap();
        let m = verdicts[0].misleadingness.as_ref().unwrap();
        assert_eq!(m.level, MisleadingnessLevel::Moderate);
        // High truth percentage and non-trivial misleadingness coexist.
        assert_eq!(verdicts[0].label, VerdictLabel::True);
    }
}
