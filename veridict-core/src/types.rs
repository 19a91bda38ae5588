//! Shared data model for the verification pipeline.
//!
//! Claims, evidence, analytical boundaries, verdicts, and the final
//! assessment record. Everything is `serde`-serializable: the
//! `OverallAssessment` shape is the wire contract for downstream
//! presentation layers.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Whether a claim asserts a checkable fact or an evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClaimCategory {
    Factual,
    Evaluative,
}

/// How load-bearing a claim is for the input's thesis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Centrality {
    High,
    Medium,
    Low,
}

/// Potential for harm if the claim is wrongly rated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HarmPotential {
    Critical,
    High,
    Medium,
    Low,
}

/// Direction of a claim (or one evidence item) relative to the thesis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClaimDirection {
    Supports,
    Contradicts,
    Contextual,
}

/// Net direction of an evidence pool for one boundary finding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceDirection {
    Supports,
    Contradicts,
    Mixed,
    Neutral,
}

/// Classification of the publication hosting a source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Academic,
    Government,
    News,
    Reference,
    Blog,
    Forum,
    #[default]
    Other,
}

/// How completely an evidence item's scope metadata is populated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScopeQuality {
    Complete,
    Partial,
    Incomplete,
}

/// The evidence profile a claim is expected to attract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectedEvidence {
    #[serde(default)]
    pub methodologies: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub source_types: Vec<String>,
}

/// An independently verifiable assertion extracted from the input.
///
/// Immutable after extraction, except `verifiability`, which the pipeline
/// strips when the claim-annotation mode asks for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomicClaim {
    pub id: String,
    pub statement: String,
    pub category: ClaimCategory,
    pub centrality: Centrality,
    pub harm_potential: HarmPotential,
    pub is_central: bool,
    pub direction: ClaimDirection,
    #[serde(default)]
    pub key_entities: Vec<String>,
    /// How much a reasonable reader would want this checked, in [0,1].
    pub check_worthiness: f64,
    /// How specific (vs. vague) the statement is, in [0,1].
    pub specificity: f64,
    /// How well the claim is grounded in the original input, in [0,1].
    pub grounding_quality: f64,
    #[serde(default)]
    pub expected_evidence: ExpectedEvidence,
    /// Free-form note on how the claim could be verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifiability: Option<String>,
}

/// Per-evidence methodology metadata. The raw signal boundaries are
/// inferred from, not a boundary itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceScope {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub methodology: Option<String>,
    #[serde(default)]
    pub boundaries: Option<String>,
    #[serde(default)]
    pub geographic: Option<String>,
    #[serde(default)]
    pub temporal: Option<String>,
    #[serde(default)]
    pub source_type: SourceType,
}

/// One extracted, source-grounded statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: String,
    pub statement: String,
    pub category: ClaimCategory,
    pub specificity: f64,
    pub source_id: String,
    pub source_url: String,
    pub source_title: String,
    pub excerpt: String,
    pub direction: ClaimDirection,
    /// How strongly this item bears on its claims, in [0,1].
    pub probative_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<EvidenceScope>,
    /// Claims this item is relevant to.
    #[serde(default)]
    pub relevant_claims: Vec<String>,
    /// Restates another source rather than reporting an observation.
    #[serde(default)]
    pub is_derivative: bool,
    /// A derivative item that another independent source corroborates.
    #[serde(default)]
    pub independently_verified: bool,
    /// Assigned by the boundary clusterer; every item ends with exactly one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_boundary_id: Option<String>,
}

/// A fetched source the researcher extracted evidence from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub url: String,
    pub title: String,
    pub source_type: SourceType,
    pub content_chars: usize,
}

/// One analytical frame: a cluster of mutually compatible evidence scopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimAssessmentBoundary {
    pub id: String,
    pub name: String,
    pub short_name: String,
    pub description: String,
    #[serde(default)]
    pub methodology: Option<String>,
    #[serde(default)]
    pub boundaries: Option<String>,
    #[serde(default)]
    pub geographic: Option<String>,
    #[serde(default)]
    pub temporal: Option<String>,
    /// Fingerprints of the constituent scopes.
    pub scope_fingerprints: Vec<String>,
    /// Internal coherence of the cluster, in [0,1].
    pub coherence: f64,
    pub evidence_count: usize,
}

/// Dense claim-by-boundary table of evidence counts.
///
/// Derived and read-only; rebuilt whenever claims, boundaries, or evidence
/// change. Unknown claim or boundary ids in evidence are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageMatrix {
    pub claim_ids: Vec<String>,
    pub boundary_ids: Vec<String>,
    /// counts[claim_index][boundary_index]
    pub counts: Vec<Vec<usize>>,
}

impl CoverageMatrix {
    /// Boundary ids with at least one evidence item for the claim.
    pub fn boundaries_for_claim(&self, claim_id: &str) -> Vec<&str> {
        let Some(row) = self.claim_ids.iter().position(|c| c == claim_id) else {
            return Vec::new();
        };
        self.boundary_ids
            .iter()
            .enumerate()
            .filter(|(col, _)| self.counts[row][*col] > 0)
            .map(|(_, id)| id.as_str())
            .collect()
    }

    /// Claim ids with at least one evidence item in the boundary.
    pub fn claims_for_boundary(&self, boundary_id: &str) -> Vec<&str> {
        let Some(col) = self.boundary_ids.iter().position(|b| b == boundary_id) else {
            return Vec::new();
        };
        self.claim_ids
            .iter()
            .enumerate()
            .filter(|(row, _)| self.counts[*row][col] > 0)
            .map(|(_, id)| id.as_str())
            .collect()
    }

    /// Evidence count for a (claim, boundary) cell; 0 for unknown ids.
    pub fn count(&self, claim_id: &str, boundary_id: &str) -> usize {
        let row = self.claim_ids.iter().position(|c| c == claim_id);
        let col = self.boundary_ids.iter().position(|b| b == boundary_id);
        match (row, col) {
            (Some(r), Some(c)) => self.counts[r][c],
            _ => 0,
        }
    }

    /// Total number of cell increments in the matrix.
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }
}

/// One boundary's localized verdict contribution for one claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryFinding {
    pub boundary_id: String,
    pub truth_percentage: f64,
    pub confidence: f64,
    pub direction: EvidenceDirection,
    pub evidence_count: usize,
}

/// Result of repeated verdict sampling for one claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyResult {
    pub samples: Vec<f64>,
    pub mean: f64,
    /// Max minus min across samples, in percentage points.
    pub spread: f64,
    pub stable: bool,
    /// False when sampling was disabled or skipped.
    pub performed: bool,
}

impl ConsistencyResult {
    /// The result recorded when sampling did not run.
    pub fn skipped() -> Self {
        Self {
            samples: Vec::new(),
            mean: 0.0,
            spread: 0.0,
            stable: true,
            performed: false,
        }
    }
}

/// Qualitative cross-boundary agreement level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriangulationLevel {
    Strong,
    Moderate,
    Weak,
    Conflicted,
}

/// Cross-boundary agreement signal for one claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangulationScore {
    pub boundary_count: usize,
    pub supporting: usize,
    pub contradicting: usize,
    pub level: TriangulationLevel,
    /// Multiplicative adjustment applied during aggregation.
    pub adjustment: f64,
}

/// Verdict label derived from a truth percentage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerdictLabel {
    True,
    MostlyTrue,
    Mixed,
    MostlyFalse,
    False,
}

/// Map a truth percentage onto a verdict label.
pub fn verdict_label(truth_percentage: f64) -> VerdictLabel {
    if truth_percentage >= 85.0 {
        VerdictLabel::True
    } else if truth_percentage >= 65.0 {
        VerdictLabel::MostlyTrue
    } else if truth_percentage >= 45.0 {
        VerdictLabel::Mixed
    } else if truth_percentage >= 25.0 {
        VerdictLabel::MostlyFalse
    } else {
        VerdictLabel::False
    }
}

/// One challenger objection and the reconciler's answer to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub challenge: String,
    pub response: String,
}

/// How misleading a claim is, independent of its truth percentage.
///
/// Deliberately decoupled: a claim can be highly true and highly
/// misleading at the same time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MisleadingnessAssessment {
    pub level: MisleadingnessLevel,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MisleadingnessLevel {
    None,
    Low,
    Moderate,
    High,
}

/// The per-claim output of the verdict generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimVerdict {
    pub claim_id: String,
    pub truth_percentage: f64,
    pub label: VerdictLabel,
    pub confidence: f64,
    pub reasoning: String,
    pub harm_potential: HarmPotential,
    /// Whether boundaries disagreed materially on this claim.
    pub contested: bool,
    pub supporting_evidence: Vec<String>,
    pub contradicting_evidence: Vec<String>,
    pub boundary_findings: Vec<BoundaryFinding>,
    pub consistency: ConsistencyResult,
    pub challenges: Vec<ChallengeRecord>,
    pub triangulation: TriangulationScore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misleadingness: Option<MisleadingnessAssessment>,
}

/// Narrative explanation attached to the overall assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictNarrative {
    pub headline: String,
    pub evidence_summary: String,
    pub key_findings: Vec<String>,
    pub limitations: String,
}

/// Gate 1: claim filtering statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gate1Stats {
    pub evaluated: usize,
    pub kept: usize,
    /// Claims that failed both the opinion and specificity checks.
    pub filtered_count: usize,
    pub safety_net_used: bool,
    pub passed: bool,
}

/// Confidence band for one claim verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
    Insufficient,
}

/// Band for a confidence value in [0,1].
pub fn confidence_band(confidence: f64) -> ConfidenceBand {
    if confidence >= 0.75 {
        ConfidenceBand::High
    } else if confidence >= 0.5 {
        ConfidenceBand::Medium
    } else if confidence >= 0.25 {
        ConfidenceBand::Low
    } else {
        ConfidenceBand::Insufficient
    }
}

/// Gate 4: confidence distribution across claim verdicts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gate4Stats {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub insufficient: usize,
    /// High plus medium: verdicts considered publishable.
    pub publishable: usize,
}

/// Run-level statistics attached to the quality gates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub evidence_count: usize,
    pub source_count: usize,
    pub searches_performed: usize,
    pub adversarial_search_ran: bool,
}

/// Pass/fail statistics for the pipeline's quality gates.
///
/// `passed` is the single authoritative "should this be trusted" signal;
/// everything else recorded on the run is advisory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityGates {
    pub gate1: Gate1Stats,
    pub gate4: Gate4Stats,
    pub summary: RunSummary,
    pub passed: bool,
}

/// Scores from the optional explanation-quality check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplanationQuality {
    pub clarity: f64,
    pub completeness: f64,
    pub neutrality: f64,
    pub evidence_support: f64,
    pub hedging: f64,
}

/// The final, externally consumed assessment record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallAssessment {
    pub truth_percentage: f64,
    pub label: VerdictLabel,
    pub confidence: f64,
    pub narrative: VerdictNarrative,
    /// True when evidence split into more than one analytical frame.
    pub multi_boundary: bool,
    pub boundaries: Vec<ClaimAssessmentBoundary>,
    pub verdicts: Vec<ClaimVerdict>,
    pub coverage: CoverageMatrix,
    pub gates: QualityGates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation_quality: Option<ExplanationQuality>,
}

/// Build a coverage matrix from claims, boundaries, and assigned evidence.
///
/// Each assigned evidence item contributes exactly one cell increment per
/// relevant claim. Evidence naming unknown claims or boundaries is ignored.
pub fn build_coverage_matrix(
    claims: &[AtomicClaim],
    boundaries: &[ClaimAssessmentBoundary],
    evidence: &[EvidenceItem],
) -> CoverageMatrix {
    let claim_ids: Vec<String> = claims.iter().map(|c| c.id.clone()).collect();
    let boundary_ids: Vec<String> = boundaries.iter().map(|b| b.id.clone()).collect();
    let mut counts = vec![vec![0usize; boundary_ids.len()]; claim_ids.len()];

    let claim_index: std::collections::HashMap<&str, usize> = claim_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let boundary_index: std::collections::HashMap<&str, usize> = boundary_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    for item in evidence {
        let Some(boundary_id) = item.claim_boundary_id.as_deref() else {
            continue;
        };
        let Some(&col) = boundary_index.get(boundary_id) else {
            continue;
        };
        // De-duplicate relevant claim ids so one item increments a cell once.
        let mut seen: HashSet<&str> = HashSet::new();
        for claim_id in &item.relevant_claims {
            if !seen.insert(claim_id.as_str()) {
                continue;
            }
            if let Some(&row) = claim_index.get(claim_id.as_str()) {
                counts[row][col] += 1;
            }
        }
    }

    CoverageMatrix {
        claim_ids,
        boundary_ids,
        counts,
    }
}

impl Centrality {
    /// Sort rank: high sorts before medium sorts before low.
    pub fn rank(&self) -> u8 {
        match self {
            Centrality::High => 0,
            Centrality::Medium => 1,
            Centrality::Low => 2,
        }
    }
}
