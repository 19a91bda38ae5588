//! Configuration for the verification pipeline.
//!
//! Uses `figment` for layered loading: built-in defaults -> TOML file ->
//! `VERIDICT_*` environment variables. Every tuning value the stages read
//! (budgets, thresholds, weight tables, debate-role assignments) lives
//! here so callers can re-tune without rebuilding.

use crate::brain::ModelTier;
use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for a pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub llm: LlmConfig,
    pub extraction: ExtractionConfig,
    pub research: ResearchConfig,
    pub clustering: ClusteringConfig,
    pub verdict: VerdictConfig,
    pub aggregation: AggregationConfig,
    pub calculation: CalculationConfig,
}

impl PipelineConfig {
    /// Load configuration: defaults, then the TOML file (if any), then
    /// `VERIDICT_`-prefixed environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));
        if let Some(path) = file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("VERIDICT_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Invalid {
                message: e.to_string(),
            })
    }

    /// Default config file location (`~/.config/veridict/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "veridict", "veridict")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// LLM provider and model selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// The run's global default provider.
    pub default_provider: String,
    /// Base URL for the OpenAI-compatible transport.
    pub base_url: String,
    /// Model used for `ModelTier::Primary` calls.
    pub primary_model: String,
    /// Model used for `ModelTier::Economy` calls.
    pub economy_model: String,
    /// Smaller model the TPM guard and rate-limit retry swap to.
    pub fallback_model: String,
    /// Tokens-per-minute budget; 0 disables the guard.
    pub tpm_limit: usize,
    /// Optional directory of `.hbs` template overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            primary_model: "gpt-4o".to_string(),
            economy_model: "gpt-4o-mini".to_string(),
            fallback_model: "gpt-4o-mini".to_string(),
            tpm_limit: 80_000,
            template_dir: None,
        }
    }
}

/// Whether claims keep their verifiability annotations downstream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationMode {
    #[default]
    Keep,
    Strip,
}

/// Claim extraction tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Cap applied by centrality filtering.
    pub max_claims: usize,
    /// Gate 1 specificity threshold.
    pub specificity_min: f64,
    /// Run the lightweight evidence-seeding search before the main loop.
    pub preliminary_search: bool,
    pub annotation_mode: AnnotationMode,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_claims: 5,
            specificity_min: 0.6,
            preliminary_search: true,
            annotation_mode: AnnotationMode::Keep,
        }
    }
}

/// Query generation strategy per research iteration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryStrategy {
    /// One neutral query per iteration.
    #[default]
    Neutral,
    /// Paired supporting/refuting query variants.
    ProCon,
}

/// Evidence research tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Search query budget per claim (not global).
    pub per_claim_query_budget: usize,
    /// Total loop iterations, split between main and contradiction phases.
    pub total_iterations: usize,
    /// Iterations reserved for deliberate counter-evidence search.
    pub contradiction_reserve: usize,
    /// Relevant evidence items after which a claim counts as sufficient.
    pub sufficiency_threshold: usize,
    /// Minimum LLM relevance score to fetch a result.
    pub relevance_threshold: f64,
    /// Fetched pages shorter than this are discarded.
    pub min_content_chars: usize,
    /// Evidence items below this probative value are dropped.
    pub min_probative_value: f64,
    /// At most this many evidence items kept per source.
    pub max_evidence_per_source: usize,
    pub query_strategy: QueryStrategy,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            per_claim_query_budget: 4,
            total_iterations: 10,
            contradiction_reserve: 3,
            sufficiency_threshold: 2,
            relevance_threshold: 0.4,
            min_content_chars: 100,
            min_probative_value: 0.3,
            max_evidence_per_source: 8,
            query_strategy: QueryStrategy::Neutral,
        }
    }
}

/// Boundary clustering tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Hard cap on boundary count, enforced by Jaccard merging.
    pub max_boundaries: usize,
    /// Name of the single fallback boundary.
    pub fallback_boundary_name: String,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            max_boundaries: 3,
            fallback_boundary_name: "General".to_string(),
        }
    }
}

/// Tier and optional provider pin for one debate role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebateRole {
    pub tier: ModelTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// The four debate roles. Validation covers both validators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateRoles {
    pub advocate: DebateRole,
    pub challenger: DebateRole,
    pub reconciler: DebateRole,
    pub validator: DebateRole,
}

impl Default for DebateRoles {
    fn default() -> Self {
        Self {
            advocate: DebateRole::default(),
            challenger: DebateRole::default(),
            reconciler: DebateRole::default(),
            // Validation runs on the cheaper tier by default.
            validator: DebateRole {
                tier: ModelTier::Economy,
                provider: None,
            },
        }
    }
}

/// Verdict generation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictConfig {
    pub roles: DebateRoles,
    /// Self-consistency sample count; 0 disables sampling.
    pub consistency_samples: usize,
    pub consistency_temperature: f64,
    /// Max spread (percentage points) still counted stable.
    pub consistency_spread_threshold: f64,
    /// Also classify misleadingness per claim.
    pub classify_misleadingness: bool,
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            roles: DebateRoles::default(),
            consistency_samples: 0,
            consistency_temperature: 0.7,
            consistency_spread_threshold: 15.0,
            classify_misleadingness: false,
        }
    }
}

/// Aggregation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Majority ratio above which (strictly) the evidence pool is skewed.
    pub skew_ratio_threshold: f64,
    /// Minimum directional items before skew is assessed.
    pub min_directional_items: usize,
    /// Score the narrative with the explanation-quality rubric.
    pub check_explanation_quality: bool,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            skew_ratio_threshold: 0.8,
            min_directional_items: 3,
            check_explanation_quality: false,
        }
    }
}

/// Weight multipliers by centrality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentralityWeights {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for CentralityWeights {
    fn default() -> Self {
        Self {
            high: 1.0,
            medium: 0.6,
            low: 0.3,
        }
    }
}

/// Weight multipliers by harm potential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarmWeights {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for HarmWeights {
    fn default() -> Self {
        Self {
            critical: 1.5,
            high: 1.25,
            medium: 1.0,
            low: 0.9,
        }
    }
}

/// Triangulation boost/penalty multipliers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangulationValues {
    /// Three or more agreeing boundaries.
    pub strong_boost: f64,
    /// Exactly two agreeing boundaries.
    pub moderate_boost: f64,
    /// Single-boundary claims are less trustworthy.
    pub single_penalty: f64,
}

impl Default for TriangulationValues {
    fn default() -> Self {
        Self {
            strong_boost: 1.1,
            moderate_boost: 1.05,
            single_penalty: 0.9,
        }
    }
}

/// Calculation constants used by verdict generation and aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationConfig {
    pub centrality_weights: CentralityWeights,
    pub harm_weights: HarmWeights,
    pub triangulation: TriangulationValues,
    /// Floor the derivative-evidence discount shrinks a weight toward.
    pub derivative_floor: f64,
}

impl Default for CalculationConfig {
    fn default() -> Self {
        Self {
            centrality_weights: CentralityWeights::default(),
            harm_weights: HarmWeights::default(),
            triangulation: TriangulationValues::default(),
            derivative_floor: 0.4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_documented_thresholds() {
        let config = PipelineConfig::default();
        assert_eq!(config.extraction.specificity_min, 0.6);
        assert_eq!(config.research.relevance_threshold, 0.4);
        assert_eq!(config.research.min_content_chars, 100);
        assert_eq!(config.aggregation.skew_ratio_threshold, 0.8);
        assert_eq!(config.aggregation.min_directional_items, 3);
        assert_eq!(config.calculation.derivative_floor, 0.4);
    }

    #[test]
    fn test_validator_defaults_to_economy_tier() {
        let roles = DebateRoles::default();
        assert_eq!(roles.advocate.tier, ModelTier::Primary);
        assert_eq!(roles.validator.tier, ModelTier::Economy);
        assert!(roles.validator.provider.is_none());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[research]\nper_claim_query_budget = 9\n\n[clustering]\nmax_boundaries = 2\n",
        )
        .unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.research.per_claim_query_budget, 9);
        assert_eq!(config.clustering.max_boundaries, 2);
        // Untouched values keep their defaults.
        assert_eq!(config.research.sufficiency_threshold, 2);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = PipelineConfig::load(Some(Path::new("/nonexistent/veridict.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = PipelineConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: PipelineConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(
            parsed.research.per_claim_query_budget,
            config.research.per_claim_query_budget
        );
        assert_eq!(parsed.llm.default_provider, config.llm.default_provider);
    }
}
