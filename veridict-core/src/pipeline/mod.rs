//! The five-stage fact-checking pipeline.
//!
//! Stages run strictly in order over one shared `ResearchState`: claim
//! extraction, evidence research, boundary clustering, debate verdicts,
//! and weighted aggregation. The driver owns the stage wiring; each
//! stage is independently testable with mock collaborators.

pub mod aggregate;
pub mod boundaries;
pub mod extraction;
pub mod research;
pub mod verdict;

pub use aggregate::{AssessmentAggregator, EvidenceBalance};
pub use boundaries::{BoundaryClusterer, jaccard, scope_fingerprint};
pub use extraction::ClaimExtractor;
pub use research::{EvidenceResearcher, scope_quality};
pub use verdict::VerdictGenerator;

use crate::brain::LlmClient;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, VeridictError};
use crate::state::ResearchState;
use crate::types::OverallAssessment;
use crate::web::{PageFetcher, SearchProvider};
use std::sync::Arc;
use tracing::{Instrument, info, info_span};

/// End-to-end pipeline runner.
pub struct PipelineDriver {
    llm: Arc<LlmClient>,
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    config: PipelineConfig,
}

impl PipelineDriver {
    pub fn new(
        llm: Arc<LlmClient>,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            llm,
            search,
            fetcher,
            config,
        }
    }

    /// Fact-check one input end to end.
    pub async fn run(&self, input: &str) -> Result<(OverallAssessment, ResearchState)> {
        let mut state = ResearchState::new(input);
        let assessment = self.run_with_state(&mut state).await?;
        Ok((assessment, state))
    }

    /// Run all five stages over an existing state record.
    pub async fn run_with_state(&self, state: &mut ResearchState) -> Result<OverallAssessment> {
        info!(run_id = %state.id, "Starting fact-check run");

        let extractor = ClaimExtractor::new(
            self.llm.clone(),
            self.search.clone(),
            self.config.extraction.clone(),
        );
        extractor
            .extract(state)
            .instrument(info_span!("extraction"))
            .await?;
        if state.claims.is_empty() {
            return Err(VeridictError::Pipeline(PipelineError::NoClaims));
        }

        let researcher = EvidenceResearcher::new(
            self.llm.clone(),
            self.search.clone(),
            self.fetcher.clone(),
            self.config.research.clone(),
        );
        researcher
            .research(state)
            .instrument(info_span!("research"))
            .await?;

        let clusterer = BoundaryClusterer::new(self.llm.clone(), self.config.clustering.clone());
        let boundaries = clusterer
            .cluster(state)
            .instrument(info_span!("clustering"))
            .await?;

        let generator = VerdictGenerator::new(
            self.llm.clone(),
            self.config.verdict.clone(),
            self.config.calculation.clone(),
        );
        let verdicts = generator
            .generate(state, &boundaries)
            .instrument(info_span!("verdicts"))
            .await?;

        let aggregator = AssessmentAggregator::new(
            self.llm.clone(),
            self.config.aggregation.clone(),
            self.config.calculation.clone(),
        );
        let assessment = aggregator
            .aggregate(state, boundaries, verdicts)
            .instrument(info_span!("aggregation"))
            .await?;

        info!(
            run_id = %state.id,
            truth_percentage = assessment.truth_percentage,
            label = ?assessment.label,
            llm_calls = state.llm_calls,
            "Fact-check run complete"
        );
        Ok(assessment)
    }
}
