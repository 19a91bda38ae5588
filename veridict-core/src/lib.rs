//! # Veridict Core
//!
//! Core library for the Veridict fact-checking pipeline.
//! Provides the five-stage pipeline (claim extraction, evidence research,
//! boundary clustering, debate verdicts, aggregation), the LLM interface,
//! web search and fetch collaborators, prompt templates, configuration,
//! and fundamental types.

pub mod brain;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod state;
pub mod types;
pub mod web;

// Re-export commonly used types at the crate root.
pub use brain::{LlmClient, LlmOptions, LlmTransport, MockLlmTransport, ModelTier, TokenCounter};
pub use config::PipelineConfig;
pub use error::{Result, VeridictError};
pub use pipeline::{
    AssessmentAggregator, BoundaryClusterer, ClaimExtractor, EvidenceResearcher, PipelineDriver,
    VerdictGenerator,
};
pub use prompts::{TemplateLibrary, TemplateService};
pub use state::{PipelineWarning, ResearchState, WarningKind, WarningSeverity};
pub use types::{
    AtomicClaim, ClaimAssessmentBoundary, ClaimVerdict, CoverageMatrix, EvidenceItem,
    OverallAssessment, QualityGates, VerdictLabel, VerdictNarrative,
};
pub use web::{HttpFetcher, MockFetcher, MockSearchProvider, PageFetcher, SearchProvider, SerperSearch};
