//! Stage 3: clustering evidence scopes into claim-assessment boundaries.
//!
//! Each evidence scope reduces to a normalized fingerprint. When more
//! than one distinct fingerprint exists, an LLM proposes clusters of
//! compatible scopes; similar clusters are then merged by fingerprint
//! Jaccard similarity until the boundary cap holds. Every evidence item
//! ends up assigned to exactly one boundary, with a general-context
//! fallback for anything the clustering left unmatched.

use crate::brain::{LlmClient, LlmOptions};
use crate::config::ClusteringConfig;
use crate::error::Result;
use crate::state::{PipelineWarning, ResearchState, WarningKind, WarningSeverity};
use crate::types::{ClaimAssessmentBoundary, EvidenceScope};
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Normalized identity of an evidence scope: trivial fields dropped, the
/// rest lowercased, whitespace-collapsed, and joined in field order.
/// Items with no scope (or an all-trivial one) fingerprint to "".
pub fn scope_fingerprint(scope: Option<&EvidenceScope>) -> String {
    let Some(scope) = scope else {
        return String::new();
    };
    [
        &scope.methodology,
        &scope.boundaries,
        &scope.geographic,
        &scope.temporal,
    ]
    .iter()
    .filter_map(|field| field.as_deref())
    .map(normalize)
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join("|")
}

fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.as_str() {
        "unknown" | "none" | "n/a" => String::new(),
        _ => collapsed,
    }
}

/// Jaccard similarity of two fingerprint sets. Two empty sets count as
/// identical (1.0); disjoint non-empty sets score 0.0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

#[derive(Debug, Deserialize)]
struct ClusteringResponse {
    #[serde(default)]
    boundaries: Vec<RawBoundary>,
}

#[derive(Debug, Deserialize)]
struct RawBoundary {
    name: String,
    #[serde(default)]
    short_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    methodology: Option<String>,
    #[serde(default)]
    boundaries: Option<String>,
    #[serde(default)]
    geographic: Option<String>,
    #[serde(default)]
    temporal: Option<String>,
    #[serde(default)]
    fingerprints: Vec<String>,
    #[serde(default = "default_coherence")]
    coherence: f64,
}

fn default_coherence() -> f64 {
    0.7
}

/// Stage 3 driver.
pub struct BoundaryClusterer {
    llm: Arc<LlmClient>,
    config: ClusteringConfig,
}

impl BoundaryClusterer {
    pub fn new(llm: Arc<LlmClient>, config: ClusteringConfig) -> Self {
        Self { llm, config }
    }

    /// Cluster the evidence pool and assign every item to a boundary.
    pub async fn cluster(
        &self,
        state: &mut ResearchState,
    ) -> Result<Vec<ClaimAssessmentBoundary>> {
        let fingerprints: Vec<String> = state
            .evidence
            .iter()
            .map(|e| scope_fingerprint(e.scope.as_ref()))
            .collect();
        let distinct: HashSet<&String> =
            fingerprints.iter().filter(|f| !f.is_empty()).collect();

        let mut boundaries = if distinct.len() <= 1 {
            // Homogeneous pool: one boundary, no model call.
            debug!(
                distinct = distinct.len(),
                "Single scope fingerprint; skipping clustering"
            );
            vec![self.fallback_boundary(distinct.iter().next().map(|f| f.as_str()))]
        } else {
            match self.cluster_with_llm(state, &distinct).await {
                Ok(clustered) if !clustered.is_empty() => clustered,
                Ok(_) => {
                    self.warn_fallback(state, "clustering returned no boundaries");
                    vec![self.fallback_boundary(None)]
                }
                Err(e @ crate::error::VeridictError::Template(_)) => return Err(e),
                Err(e) => {
                    self.warn_fallback(state, &e.to_string());
                    vec![self.fallback_boundary(None)]
                }
            }
        };

        merge_to_cap(&mut boundaries, self.config.max_boundaries);
        self.assign_evidence(state, &mut boundaries, &fingerprints);

        info!(
            boundaries = boundaries.len(),
            evidence = state.evidence.len(),
            "Boundary clustering complete"
        );
        Ok(boundaries)
    }

    async fn cluster_with_llm(
        &self,
        state: &mut ResearchState,
        distinct: &HashSet<&String>,
    ) -> Result<Vec<ClaimAssessmentBoundary>> {
        let claims: Vec<_> = state
            .claims
            .iter()
            .map(|c| json!({"id": c.id, "statement": c.statement}))
            .collect();
        let mut listing: Vec<&str> = distinct.iter().map(|f| f.as_str()).collect();
        listing.sort_unstable();

        let value = self
            .llm
            .call(
                "BOUNDARY_CLUSTERING",
                &json!({
                    "claims": serde_json::Value::Array(claims).to_string(),
                    "fingerprints": listing.join("\n"),
                    "max_boundaries": self.config.max_boundaries,
                }),
                &LlmOptions::default(),
            )
            .await?;
        state.record_llm_call();
        let parsed: ClusteringResponse = serde_json::from_value(value)?;

        Ok(parsed
            .boundaries
            .into_iter()
            .enumerate()
            .map(|(i, raw)| {
                let short_name = if raw.short_name.is_empty() {
                    raw.name.clone()
                } else {
                    raw.short_name
                };
                ClaimAssessmentBoundary {
                    id: format!("b{}", i + 1),
                    name: raw.name,
                    short_name,
                    description: raw.description,
                    methodology: raw.methodology,
                    boundaries: raw.boundaries,
                    geographic: raw.geographic,
                    temporal: raw.temporal,
                    scope_fingerprints: raw
                        .fingerprints
                        .iter()
                        .map(|f| normalize(f))
                        .collect(),
                    coherence: raw.coherence.clamp(0.0, 1.0),
                    evidence_count: 0,
                }
            })
            .collect())
    }

    fn warn_fallback(&self, state: &mut ResearchState, reason: &str) {
        state.push_warning(PipelineWarning::new(
            WarningKind::ClusteringFallback,
            WarningSeverity::Caution,
            "boundary clustering failed; using a single general boundary",
            json!({"reason": reason}),
        ));
    }

    /// A catch-all boundary. When the whole pool shares one fingerprint,
    /// that fingerprint is carried so matching stays exact.
    fn fallback_boundary(&self, fingerprint: Option<&str>) -> ClaimAssessmentBoundary {
        ClaimAssessmentBoundary {
            id: "b-general".to_string(),
            name: self.config.fallback_boundary_name.clone(),
            short_name: self.config.fallback_boundary_name.clone(),
            description: "Evidence without a more specific analytical frame".to_string(),
            methodology: None,
            boundaries: None,
            geographic: None,
            temporal: None,
            scope_fingerprints: fingerprint.map(String::from).into_iter().collect(),
            coherence: 1.0,
            evidence_count: 0,
        }
    }

    /// Assign every evidence item to the boundary holding its fingerprint;
    /// unmatched items go to the general fallback, created on demand.
    fn assign_evidence(
        &self,
        state: &mut ResearchState,
        boundaries: &mut Vec<ClaimAssessmentBoundary>,
        fingerprints: &[String],
    ) {
        let mut by_fingerprint: HashMap<String, usize> = HashMap::new();
        for (idx, boundary) in boundaries.iter().enumerate() {
            for fp in &boundary.scope_fingerprints {
                by_fingerprint.entry(fp.clone()).or_insert(idx);
            }
        }

        let mut fallback_idx = boundaries
            .iter()
            .position(|b| b.id == "b-general");
        let mut assignments: Vec<usize> = Vec::with_capacity(fingerprints.len());
        for fp in fingerprints {
            let idx = match by_fingerprint.get(fp) {
                Some(idx) => *idx,
                None => match fallback_idx {
                    Some(idx) => idx,
                    None => {
                        boundaries.push(self.fallback_boundary(None));
                        let idx = boundaries.len() - 1;
                        fallback_idx = Some(idx);
                        idx
                    }
                },
            };
            assignments.push(idx);
        }

        for (item, idx) in state.evidence.iter_mut().zip(assignments) {
            item.claim_boundary_id = Some(boundaries[idx].id.clone());
            boundaries[idx].evidence_count += 1;
        }
    }
}

/// Merge the most similar boundary pairs until the cap holds. Merging
/// unions fingerprints, keeps the first boundary's identity, and averages
/// coherence.
fn merge_to_cap(boundaries: &mut Vec<ClaimAssessmentBoundary>, cap: usize) {
    let cap = cap.max(1);
    while boundaries.len() > cap {
        let mut best = (0usize, 1usize, -1.0f64);
        for i in 0..boundaries.len() {
            for j in (i + 1)..boundaries.len() {
                let a: HashSet<String> =
                    boundaries[i].scope_fingerprints.iter().cloned().collect();
                let b: HashSet<String> =
                    boundaries[j].scope_fingerprints.iter().cloned().collect();
                let sim = jaccard(&a, &b);
                if sim > best.2 {
                    best = (i, j, sim);
                }
            }
        }
        let (keep, absorb, sim) = best;
        debug!(
            keep = boundaries[keep].id.as_str(),
            absorb = boundaries[absorb].id.as_str(),
            similarity = sim,
            "Merging boundaries"
        );
        let absorbed = boundaries.remove(absorb);
        let target = &mut boundaries[keep];
        for fp in absorbed.scope_fingerprints {
            if !target.scope_fingerprints.contains(&fp) {
                target.scope_fingerprints.push(fp);
            }
        }
        target.coherence = (target.coherence + absorbed.coherence) / 2.0;
        target.evidence_count += absorbed.evidence_count;
    }
}
