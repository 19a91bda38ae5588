//! Stage 5: weighted aggregation into the overall assessment.
//!
//! Claim verdicts combine under weights built from centrality, harm
//! potential, the triangulation adjustment, and a discount for
//! derivative evidence. The stage also checks the evidence pool for
//! directional skew, renders the narrative (with a deterministic
//! fallback), and fills in the quality gates.

use crate::brain::{LlmClient, LlmOptions};
use crate::config::{AggregationConfig, CalculationConfig};
use crate::error::Result;
use crate::state::{PipelineWarning, ResearchState, WarningKind, WarningSeverity};
use crate::types::{
    AtomicClaim, Centrality, ClaimAssessmentBoundary, ClaimDirection, ClaimVerdict,
    ConfidenceBand, ExplanationQuality, Gate4Stats, HarmPotential, OverallAssessment,
    QualityGates, RunSummary, VerdictNarrative, build_coverage_matrix, confidence_band,
    verdict_label,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Directional balance of the evidence pool.
///
/// `ratio` is NaN when fewer than the configured minimum of directional
/// items exist; skew is only ever flagged on a defined ratio.
#[derive(Debug, Clone, Copy)]
pub struct EvidenceBalance {
    pub supporting: usize,
    pub contradicting: usize,
    pub ratio: f64,
    pub skewed: bool,
}

#[derive(Debug, Deserialize)]
struct NarrativeResponse {
    headline: String,
    #[serde(default)]
    evidence_summary: String,
    #[serde(default)]
    key_findings: Vec<String>,
    #[serde(default)]
    limitations: String,
}

#[derive(Debug, Deserialize)]
struct ExplanationQualityResponse {
    clarity: f64,
    completeness: f64,
    neutrality: f64,
    evidence_support: f64,
    hedging: f64,
}

/// Stage 5 driver.
pub struct AssessmentAggregator {
    llm: Arc<LlmClient>,
    config: AggregationConfig,
    calc: CalculationConfig,
}

impl AssessmentAggregator {
    pub fn new(llm: Arc<LlmClient>, config: AggregationConfig, calc: CalculationConfig) -> Self {
        Self { llm, config, calc }
    }

    /// Combine claim verdicts into the final assessment record.
    #[instrument(skip_all, fields(verdicts = verdicts.len()))]
    pub async fn aggregate(
        &self,
        state: &mut ResearchState,
        boundaries: Vec<ClaimAssessmentBoundary>,
        verdicts: Vec<ClaimVerdict>,
    ) -> Result<OverallAssessment> {
        let claims_by_id: HashMap<&str, &AtomicClaim> =
            state.claims.iter().map(|c| (c.id.as_str(), c)).collect();

        let mut weighted_truth = 0.0;
        let mut weighted_confidence = 0.0;
        let mut total_weight = 0.0;
        for verdict in &verdicts {
            let weight = match claims_by_id.get(verdict.claim_id.as_str()) {
                Some(claim) => self.claim_weight(state, claim, verdict),
                None => continue,
            };
            weighted_truth += verdict.truth_percentage * weight;
            weighted_confidence += verdict.confidence * weight;
            total_weight += weight;
        }
        let (truth, confidence) = if total_weight > 0.0 {
            (
                weighted_truth / total_weight,
                (weighted_confidence / total_weight).clamp(0.0, 1.0),
            )
        } else {
            (50.0, 0.0)
        };

        let balance = self.assess_evidence_balance(state);
        if balance.skewed {
            state.push_warning(PipelineWarning::new(
                WarningKind::EvidencePoolSkewed,
                WarningSeverity::Caution,
                "the evidence pool leans heavily in one direction",
                json!({
                    "supporting": balance.supporting,
                    "contradicting": balance.contradicting,
                    "ratio": balance.ratio,
                }),
            ));
        }

        let narrative = self.narrative(state, truth, &verdicts, &balance).await?;
        let explanation_quality = if self.config.check_explanation_quality {
            self.score_explanation(state, &narrative).await?
        } else {
            None
        };

        let coverage = build_coverage_matrix(&state.claims, &boundaries, &state.evidence);
        let gates = self.quality_gates(state, &verdicts);

        info!(
            truth_percentage = truth,
            confidence,
            passed = gates.passed,
            "Aggregation complete"
        );
        Ok(OverallAssessment {
            truth_percentage: truth,
            label: verdict_label(truth),
            confidence,
            narrative,
            multi_boundary: boundaries.len() > 1,
            boundaries,
            verdicts,
            coverage,
            gates,
            explanation_quality,
        })
    }

    /// A claim verdict's aggregation weight.
    fn claim_weight(
        &self,
        state: &ResearchState,
        claim: &AtomicClaim,
        verdict: &ClaimVerdict,
    ) -> f64 {
        let centrality = match claim.centrality {
            Centrality::High => self.calc.centrality_weights.high,
            Centrality::Medium => self.calc.centrality_weights.medium,
            Centrality::Low => self.calc.centrality_weights.low,
        };
        let harm = match claim.harm_potential {
            HarmPotential::Critical => self.calc.harm_weights.critical,
            HarmPotential::High => self.calc.harm_weights.high,
            HarmPotential::Medium => self.calc.harm_weights.medium,
            HarmPotential::Low => self.calc.harm_weights.low,
        };
        centrality * harm * verdict.triangulation.adjustment * self.derivative_factor(state, claim)
    }

    /// Shrink toward the floor as the share of derivative, not
    /// independently verified items among a claim's supporting evidence
    /// grows: all-primary support keeps factor 1.0, all-derivative
    /// support bottoms out at the floor itself. A derivative item that
    /// was independently verified counts as primary.
    fn derivative_factor(&self, state: &ResearchState, claim: &AtomicClaim) -> f64 {
        let supporting: Vec<_> = state
            .evidence_for_claim(&claim.id)
            .into_iter()
            .filter(|e| e.direction == ClaimDirection::Supports)
            .collect();
        if supporting.is_empty() {
            return 1.0;
        }
        let unverified = supporting
            .iter()
            .filter(|e| e.is_derivative && !e.independently_verified)
            .count();
        let fraction = unverified as f64 / supporting.len() as f64;
        1.0 - fraction * (1.0 - self.calc.derivative_floor)
    }

    /// Directional balance of the whole evidence pool.
    pub fn assess_evidence_balance(&self, state: &ResearchState) -> EvidenceBalance {
        let supporting = state
            .evidence
            .iter()
            .filter(|e| e.direction == ClaimDirection::Supports)
            .count();
        let contradicting = state
            .evidence
            .iter()
            .filter(|e| e.direction == ClaimDirection::Contradicts)
            .count();
        let directional = supporting + contradicting;
        if directional < self.config.min_directional_items {
            return EvidenceBalance {
                supporting,
                contradicting,
                ratio: f64::NAN,
                skewed: false,
            };
        }
        let ratio = supporting.max(contradicting) as f64 / directional as f64;
        EvidenceBalance {
            supporting,
            contradicting,
            ratio,
            skewed: ratio > self.config.skew_ratio_threshold,
        }
    }

    async fn narrative(
        &self,
        state: &mut ResearchState,
        truth: f64,
        verdicts: &[ClaimVerdict],
        balance: &EvidenceBalance,
    ) -> Result<VerdictNarrative> {
        let verdict_listing: Vec<_> = verdicts
            .iter()
            .map(|v| {
                json!({
                    "claim_id": v.claim_id,
                    "truth_percentage": v.truth_percentage,
                    "label": v.label,
                    "reasoning": v.reasoning,
                })
            })
            .collect();
        let result = self
            .llm
            .call(
                "VERDICT_NARRATIVE",
                &json!({
                    "input": state.input,
                    "truth_percentage": truth,
                    "verdicts": serde_json::Value::Array(verdict_listing).to_string(),
                    "evidence_count": state.evidence.len(),
                    "source_count": state.sources.len(),
                }),
                &LlmOptions::default(),
            )
            .await;
        state.record_llm_call();

        let parsed: std::result::Result<NarrativeResponse, _> = match result {
            Ok(value) => serde_json::from_value(value).map_err(crate::error::VeridictError::from),
            Err(e @ crate::error::VeridictError::Template(_)) => return Err(e),
            Err(e) => Err(e),
        };
        match parsed {
            Ok(n) => Ok(VerdictNarrative {
                headline: n.headline,
                evidence_summary: n.evidence_summary,
                key_findings: n.key_findings,
                limitations: n.limitations,
            }),
            Err(e) => {
                warn!(error = %e, "Narrative generation failed; using deterministic fallback");
                state.push_warning(PipelineWarning::new(
                    WarningKind::NarrativeFallback,
                    WarningSeverity::Info,
                    "narrative generation failed; a template narrative was substituted",
                    json!({"reason": e.to_string()}),
                ));
                Ok(fallback_narrative(state, truth, verdicts, balance))
            }
        }
    }

    async fn score_explanation(
        &self,
        state: &mut ResearchState,
        narrative: &VerdictNarrative,
    ) -> Result<Option<ExplanationQuality>> {
        let result = self
            .llm
            .call(
                "EXPLANATION_QUALITY",
                &json!({
                    "headline": narrative.headline,
                    "evidence_summary": narrative.evidence_summary,
                    "key_findings": narrative.key_findings.join("\n"),
                    "limitations": narrative.limitations,
                }),
                &LlmOptions::default(),
            )
            .await;
        state.record_llm_call();
        match result {
            Ok(value) => {
                let parsed: ExplanationQualityResponse = serde_json::from_value(value)?;
                Ok(Some(ExplanationQuality {
                    clarity: parsed.clarity,
                    completeness: parsed.completeness,
                    neutrality: parsed.neutrality,
                    evidence_support: parsed.evidence_support,
                    hedging: parsed.hedging,
                }))
            }
            Err(e @ crate::error::VeridictError::Template(_)) => Err(e),
            Err(e) => {
                warn!(error = %e, "Explanation-quality scoring failed; skipping");
                Ok(None)
            }
        }
    }

    /// Gate 4 plus the run summary. `passed` mirrors Gate 1: warnings and
    /// low-confidence verdicts are advisory, a failed extraction gate is
    /// not.
    fn quality_gates(&self, state: &ResearchState, verdicts: &[ClaimVerdict]) -> QualityGates {
        let gate1 = state.gate1.clone().unwrap_or_default();
        let mut gate4 = Gate4Stats::default();
        for verdict in verdicts {
            match confidence_band(verdict.confidence) {
                ConfidenceBand::High => gate4.high += 1,
                ConfidenceBand::Medium => gate4.medium += 1,
                ConfidenceBand::Low => gate4.low += 1,
                ConfidenceBand::Insufficient => gate4.insufficient += 1,
            }
        }
        gate4.publishable = gate4.high + gate4.medium;
        let passed = gate1.passed;
        QualityGates {
            gate1,
            gate4,
            summary: RunSummary {
                evidence_count: state.evidence.len(),
                source_count: state.sources.len(),
                searches_performed: state.queries.len(),
                adversarial_search_ran: state.adversarial_search_ran,
            },
            passed,
        }
    }
}

/// Narrative used when the model cannot produce one.
fn fallback_narrative(
    state: &ResearchState,
    truth: f64,
    verdicts: &[ClaimVerdict],
    balance: &EvidenceBalance,
) -> VerdictNarrative {
    let label = verdict_label(truth);
    let headline = format!(
        "Overall assessment: {label:?} ({truth:.0}% truth across {} claims)",
        verdicts.len()
    );
    let evidence_summary = format!(
        "{} evidence items from {} sources were considered; {} support and {} contradict the claims.",
        state.evidence.len(),
        state.sources.len(),
        balance.supporting,
        balance.contradicting,
    );
    let key_findings = verdicts
        .iter()
        .map(|v| {
            format!(
                "Claim {}: {:?} at {:.0}%",
                v.claim_id, v.label, v.truth_percentage
            )
        })
        .collect();
    let limitations = if state.warnings.is_empty() {
        "Automatically generated summary; see per-claim verdicts for detail.".to_string()
    } else {
        format!(
            "Automatically generated summary; {} pipeline warnings were recorded during this run.",
            state.warnings.len()
        )
    };
    VerdictNarrative {
        headline,
        evidence_summary,
        key_findings,
        limitations,
    }
}
