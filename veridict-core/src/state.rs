//! Shared pipeline state, threaded through all five stages.
//!
//! One `ResearchState` record accumulates claims, evidence, sources,
//! search queries, LLM-call counters, and typed warnings. Stages mutate it
//! under single-writer discipline; a cancelled run leaves partial state as
//! the correct observable result. The record is serializable so a
//! completed run can be persisted and re-rendered without re-running.

use crate::types::{AtomicClaim, EvidenceItem, Gate1Stats, SourceRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of a non-fatal pipeline warning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    QueryBudgetExhausted,
    EvidencePoolSkewed,
    DebateProviderFallback,
    DegenerateDebateConfig,
    ClusteringFallback,
    NarrativeFallback,
}

/// Severity of a warning, for callers deciding whether to block publication.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    Info,
    Caution,
    Serious,
}

/// A typed, structured warning. Never fatal: `QualityGates.passed` is the
/// only authoritative trust signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineWarning {
    pub kind: WarningKind,
    pub severity: WarningSeverity,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl PipelineWarning {
    pub fn new(
        kind: WarningKind,
        severity: WarningSeverity,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            details,
            at: Utc::now(),
        }
    }
}

/// Stance of a generated search query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryStance {
    Neutral,
    Supporting,
    Refuting,
}

/// One executed search query, recorded for provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQueryRecord {
    pub claim_id: String,
    pub query: String,
    pub iteration: usize,
    pub stance: QueryStance,
    pub result_count: usize,
}

/// The shared, mutable research-state record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchState {
    pub id: Uuid,
    /// Raw input: claim, question, or article text.
    pub input: String,
    /// Neutral paraphrase produced by extraction pass 1.
    pub paraphrase: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub claims: Vec<AtomicClaim>,
    pub evidence: Vec<EvidenceItem>,
    pub sources: Vec<SourceRecord>,
    pub queries: Vec<SearchQueryRecord>,
    pub llm_calls: usize,
    pub warnings: Vec<PipelineWarning>,
    /// Gate 1 statistics, populated by the extractor.
    pub gate1: Option<Gate1Stats>,
    /// Whether the reserved contradiction-search phase ran.
    pub adversarial_search_ran: bool,
}

impl ResearchState {
    pub fn new(input: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            input: input.into(),
            paraphrase: None,
            created_at: now,
            updated_at: now,
            claims: Vec::new(),
            evidence: Vec::new(),
            sources: Vec::new(),
            queries: Vec::new(),
            llm_calls: 0,
            warnings: Vec::new(),
            gate1: None,
            adversarial_search_ran: false,
        }
    }

    pub fn record_llm_call(&mut self) {
        self.llm_calls += 1;
        self.updated_at = Utc::now();
    }

    pub fn push_warning(&mut self, warning: PipelineWarning) {
        tracing::warn!(
            kind = ?warning.kind,
            severity = ?warning.severity,
            message = warning.message.as_str(),
            "Pipeline warning"
        );
        self.warnings.push(warning);
        self.updated_at = Utc::now();
    }

    /// Evidence items relevant to one claim.
    pub fn evidence_for_claim(&self, claim_id: &str) -> Vec<&EvidenceItem> {
        self.evidence
            .iter()
            .filter(|e| e.relevant_claims.iter().any(|c| c == claim_id))
            .collect()
    }

    /// Evidence items relevant to one claim within one boundary.
    pub fn evidence_for_claim_in_boundary(
        &self,
        claim_id: &str,
        boundary_id: &str,
    ) -> Vec<&EvidenceItem> {
        self.evidence
            .iter()
            .filter(|e| {
                e.claim_boundary_id.as_deref() == Some(boundary_id)
                    && e.relevant_claims.iter().any(|c| c == claim_id)
            })
            .collect()
    }

    /// Evidence with the given direction relevant to one claim.
    pub fn directional_evidence_count(
        &self,
        claim_id: &str,
        direction: crate::types::ClaimDirection,
    ) -> usize {
        self.evidence_for_claim(claim_id)
            .iter()
            .filter(|e| e.direction == direction)
            .count()
    }

    /// Persist the state as pretty JSON.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, data)
    }

    /// Load a previously saved state.
    pub fn load(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ClaimCategory, ClaimDirection, EvidenceItem,
    };

    fn evidence(id: &str, claim: &str, direction: ClaimDirection) -> EvidenceItem {
        EvidenceItem {
            id: id.into(),
            statement: "stmt".into(),
            category: ClaimCategory::Factual,
            specificity: 0.5,
            source_id: "s1".into(),
            source_url: "https://example.org".into(),
            source_title: "Example".into(),
            excerpt: String::new(),
            direction,
            probative_value: 0.5,
            scope: None,
            relevant_claims: vec![claim.into()],
            is_derivative: false,
            independently_verified: false,
            claim_boundary_id: None,
        }
    }

    #[test]
    fn test_state_accumulates() {
        let mut state = ResearchState::new("The sky is green.");
        assert_eq!(state.llm_calls, 0);
        state.record_llm_call();
        state.record_llm_call();
        assert_eq!(state.llm_calls, 2);

        state.push_warning(PipelineWarning::new(
            WarningKind::QueryBudgetExhausted,
            WarningSeverity::Caution,
            "claim c1 exhausted its query budget",
            serde_json::json!({"claim_id": "c1"}),
        ));
        assert_eq!(state.warnings.len(), 1);
        assert_eq!(state.warnings[0].kind, WarningKind::QueryBudgetExhausted);
    }

    #[test]
    fn test_evidence_lookup_by_claim_and_direction() {
        let mut state = ResearchState::new("input");
        state.evidence.push(evidence("e1", "c1", ClaimDirection::Supports));
        state.evidence.push(evidence("e2", "c1", ClaimDirection::Contradicts));
        state.evidence.push(evidence("e3", "c2", ClaimDirection::Supports));

        assert_eq!(state.evidence_for_claim("c1").len(), 2);
        assert_eq!(
            state.directional_evidence_count("c1", ClaimDirection::Contradicts),
            1
        );
        assert_eq!(
            state.directional_evidence_count("c2", ClaimDirection::Supports),
            1
        );
    }

    #[test]
    fn test_evidence_lookup_by_boundary() {
        let mut state = ResearchState::new("input");
        let mut e1 = evidence("e1", "c1", ClaimDirection::Supports);
        e1.claim_boundary_id = Some("b1".into());
        let mut e2 = evidence("e2", "c1", ClaimDirection::Supports);
        e2.claim_boundary_id = Some("b2".into());
        state.evidence.push(e1);
        state.evidence.push(e2);

        assert_eq!(state.evidence_for_claim_in_boundary("c1", "b1").len(), 1);
        assert!(state.evidence_for_claim_in_boundary("c1", "b3").is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("state.json");

        let mut state = ResearchState::new("Saved input");
        state.record_llm_call();
        state.save(&path).unwrap();

        let loaded = ResearchState::load(&path).unwrap();
        assert_eq!(loaded.id, state.id);
        assert_eq!(loaded.input, "Saved input");
        assert_eq!(loaded.llm_calls, 1);
    }
}
