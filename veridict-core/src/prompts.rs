//! Prompt template service.
//!
//! The pipeline never inlines prompt text: every LLM call goes through
//! `TemplateService::render` keyed by pipeline name and task section. A
//! missing section is a fatal `TemplateError` for that call, never a
//! silent default. The shipped `TemplateLibrary` registers handlebars
//! templates for every task key the core invokes; a configured override
//! directory replaces templates per key.

use crate::error::TemplateError;
use handlebars::Handlebars;
use serde_json::Value;
use std::path::Path;

/// Pipeline name used for every task key the core invokes.
pub const PIPELINE: &str = "factcheck";

/// Every task section the core renders. The template library must define
/// all of them.
pub const TASK_KEYS: &[&str] = &[
    "CLAIM_EXTRACTION_PASS1",
    "CLAIM_EXTRACTION_PASS2",
    "GENERATE_QUERIES",
    "EVIDENCE_RELEVANCE",
    "EVIDENCE_EXTRACTION",
    "BOUNDARY_CLUSTERING",
    "VERDICT_ADVOCATE",
    "VERDICT_CHALLENGER",
    "VERDICT_RECONCILIATION",
    "VERDICT_GROUNDING_VALIDATION",
    "VERDICT_DIRECTION_VALIDATION",
    "VERDICT_MISLEADINGNESS",
    "VERDICT_NARRATIVE",
    "EXPLANATION_QUALITY",
];

/// A rendered prompt plus the variable names it consumed.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub content: String,
    pub variables: Vec<String>,
}

/// Opaque template-rendering service keyed by task name.
pub trait TemplateService: Send + Sync {
    fn render(
        &self,
        pipeline: &str,
        section: &str,
        variables: &Value,
    ) -> Result<RenderedPrompt, TemplateError>;
}

/// Handlebars-backed template store with built-in defaults.
pub struct TemplateLibrary {
    registry: Handlebars<'static>,
}

impl TemplateLibrary {
    /// Library with the built-in template for every task key registered.
    pub fn with_defaults() -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        for (section, body) in default_templates() {
            // Registration of static templates cannot fail at runtime;
            // a bad default is a programming error caught by tests.
            registry
                .register_template_string(&template_id(PIPELINE, section), body)
                .unwrap_or_else(|e| panic!("invalid built-in template {section}: {e}"));
        }
        Self { registry }
    }

    /// Empty library; every render fails with `MissingSection` until
    /// templates are registered. Used to test the fatal-miss contract.
    pub fn empty() -> Self {
        Self {
            registry: Handlebars::new(),
        }
    }

    /// Register or replace one template.
    pub fn register(
        &mut self,
        pipeline: &str,
        section: &str,
        body: &str,
    ) -> Result<(), TemplateError> {
        self.registry
            .register_template_string(&template_id(pipeline, section), body)
            .map_err(|e| TemplateError::RenderFailed {
                section: section.to_string(),
                message: e.to_string(),
            })
    }

    /// Load `<SECTION>.hbs` files from a directory, overriding built-ins
    /// per key. Unknown files are registered under their stem as-is.
    pub fn load_overrides(&mut self, dir: &Path) -> Result<usize, std::io::Error> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "hbs") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    let body = std::fs::read_to_string(&path)?;
                    if self.register(PIPELINE, stem, &body).is_ok() {
                        loaded += 1;
                    }
                }
            }
        }
        Ok(loaded)
    }
}

impl TemplateService for TemplateLibrary {
    fn render(
        &self,
        pipeline: &str,
        section: &str,
        variables: &Value,
    ) -> Result<RenderedPrompt, TemplateError> {
        let id = template_id(pipeline, section);
        if !self.registry.has_template(&id) {
            return Err(TemplateError::MissingSection {
                pipeline: pipeline.to_string(),
                section: section.to_string(),
            });
        }
        let content =
            self.registry
                .render(&id, variables)
                .map_err(|e| TemplateError::RenderFailed {
                    section: section.to_string(),
                    message: e.to_string(),
                })?;
        let variables = variables
            .as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        Ok(RenderedPrompt { content, variables })
    }
}

fn template_id(pipeline: &str, section: &str) -> String {
    format!("{pipeline}.{section}")
}

/// Built-in prompt bodies. All of them instruct the model to answer with a
/// single JSON object, matching the parser boundary in `brain`.
fn default_templates() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "CLAIM_EXTRACTION_PASS1",
            "Read the input below and produce a neutral one-paragraph paraphrase plus \
             a short list of rough, checkable claims with search hints.\n\nINPUT:\n{{input}}\n\n\
             Answer with JSON: {\"paraphrase\": string, \"rough_claims\": \
             [{\"statement\": string, \"search_hints\": [string]}]}",
        ),
        (
            "CLAIM_EXTRACTION_PASS2",
            "Expand the rough claims into atomic, independently verifiable claims.\n\
             PARAPHRASE:\n{{paraphrase}}\n\nROUGH CLAIMS:\n{{rough_claims}}\n\n\
             Answer with JSON: {\"claims\": [{\"id\": string, \"statement\": string, \
             \"category\": \"factual\"|\"evaluative\", \"centrality\": \"high\"|\"medium\"|\"low\", \
             \"harm_potential\": \"critical\"|\"high\"|\"medium\"|\"low\", \"is_central\": bool, \
             \"direction\": \"supports\"|\"contradicts\"|\"contextual\", \"key_entities\": [string], \
             \"check_worthiness\": number, \"specificity\": number, \"grounding_quality\": number, \
             \"expected_evidence\": {\"methodologies\": [string], \"metrics\": [string], \
             \"source_types\": [string]}, \"verifiability\": string}]}",
        ),
        (
            "GENERATE_QUERIES",
            "Generate web search queries for the claim below. Stance: {{stance}}. \
             Already executed queries:\n{{previous_queries}}\n\nCLAIM:\n{{claim}}\n\n\
             Answer with JSON: {\"queries\": [string]} (1-2 queries)",
        ),
        (
            "EVIDENCE_RELEVANCE",
            "Score how relevant each search result is to the claim, 0.0-1.0.\n\
             CLAIM:\n{{claim}}\n\nRESULTS:\n{{results}}\n\n\
             Answer with JSON: {\"scores\": [{\"url\": string, \"score\": number}]}",
        ),
        (
            "EVIDENCE_EXTRACTION",
            "Extract 3-8 evidence items from the source text bearing on the claim.\n\
             CLAIM:\n{{claim}}\n\nSOURCE ({{url}}):\n{{text}}\n\n\
             Answer with JSON: {\"items\": [{\"statement\": string, \
             \"category\": \"factual\"|\"evaluative\", \"specificity\": number, \
             \"excerpt\": string, \"direction\": \"supports\"|\"contradicts\"|\"contextual\", \
             \"probative_value\": number, \"is_derivative\": bool, \
             \"independently_verified\": bool, \"scope\": {\"name\": string, \
             \"methodology\": string, \"boundaries\": string, \"geographic\": string, \
             \"temporal\": string}}]}",
        ),
        (
            "BOUNDARY_CLUSTERING",
            "Group the scope fingerprints below into at most {{max_boundaries}} \
             analytical boundaries. Fingerprints in one boundary must be \
             methodologically compatible; do not blend incompatible \
             jurisdictions, methodologies, or time windows. Every fingerprint \
             must appear in exactly one boundary's fingerprints list.\n\n\
             CLAIMS:\n{{claims}}\n\nFINGERPRINTS (one per line):\n{{fingerprints}}\n\n\
             Answer with JSON: {\"boundaries\": [{\"name\": string, \"short_name\": string, \
             \"description\": string, \"methodology\": string, \"boundaries\": string, \
             \"geographic\": string, \"temporal\": string, \"fingerprints\": [string], \
             \"coherence\": number}]}",
        ),
        (
            "VERDICT_ADVOCATE",
            "You argue the strongest honest case for this claim from the \
             evidence, within the analytical boundary below.\n\
             CLAIM:\n{{claim}}\n\nBOUNDARY: {{boundary}}\n\nEVIDENCE:\n{{evidence}}\n\n\
             Answer with JSON: {\"truth_percentage\": number, \"confidence\": number, \
             \"reasoning\": string}",
        ),
        (
            "VERDICT_CHALLENGER",
            "Identify the weaknesses in the advocate verdict below: missing \
             context, methodological gaps, contrary evidence.\n\
             CLAIM:\n{{claim}}\n\nADVOCATE VERDICT ({{advocate_percentage}}%):\n\
             {{advocate_reasoning}}\n\nEVIDENCE:\n{{evidence}}\n\n\
             Answer with JSON: {\"challenges\": [string]}",
        ),
        (
            "VERDICT_RECONCILIATION",
            "Issue a revised verdict for the claim, incorporating the challenges. \
             Rate the truth of the claim itself, not the quality of the analysis. \
             Answer each challenge in order in the responses array.\n\
             CLAIM:\n{{claim}}\n\nADVOCATE VERDICT ({{advocate_percentage}}%):\n\
             {{advocate_reasoning}}\n\nCHALLENGES:\n{{challenges}}\n\n\
             EVIDENCE:\n{{evidence}}\n\n\
             Answer with JSON: {\"truth_percentage\": number, \"confidence\": number, \
             \"reasoning\": string, \
             \"direction\": \"supports\"|\"contradicts\"|\"mixed\"|\"neutral\", \
             \"responses\": [string]}",
        ),
        (
            "VERDICT_GROUNDING_VALIDATION",
            "Check whether the reasoning below is supported by the cited \
             evidence. If it overstates what the evidence shows, give a \
             corrected confidence.\n\
             CLAIM:\n{{claim}}\n\nREASONING (confidence {{confidence}}):\n\
             {{reasoning}}\n\nEVIDENCE:\n{{evidence}}\n\n\
             Answer with JSON: {\"grounded\": bool, \
             \"corrected_confidence\": number|null}",
        ),
        (
            "VERDICT_DIRECTION_VALIDATION",
            "Check whether the verdict rates the truth of the claim itself, not \
             the quality of the analysis, and that its percentage points the \
             same way as the evidence. If it is inverted, give the corrected \
             percentage.\n\
             CLAIM:\n{{claim}}\n\nVERDICT: {{truth_percentage}}%\n\n\
             REASONING:\n{{reasoning}}\n\nEVIDENCE:\n{{evidence}}\n\n\
             Answer with JSON: {\"consistent\": bool, \
             \"corrected_percentage\": number|null}",
        ),
        (
            "VERDICT_MISLEADINGNESS",
            "Independently of its truth percentage, rate how misleading the claim \
             is in context (framing, omission, cherry-picking).\n\
             CLAIM:\n{{claim}}\n\nVERDICT REASONING:\n{{reasoning}}\n\n\
             Answer with JSON: {\"level\": \"none\"|\"low\"|\"moderate\"|\"high\", \
             \"rationale\": string}",
        ),
        (
            "VERDICT_NARRATIVE",
            "Write the narrative for this assessment: a headline, an evidence \
             summary, key findings, and limitations. Neutral register; hedge \
             where confidence is low.\n\nINPUT:\n{{input}}\n\n\
             OVERALL: {{truth_percentage}}% from {{evidence_count}} evidence \
             items across {{source_count}} sources\n\nVERDICTS:\n{{verdicts}}\n\n\
             Answer with JSON: {\"headline\": string, \"evidence_summary\": string, \
             \"key_findings\": [string], \"limitations\": string}",
        ),
        (
            "EXPLANATION_QUALITY",
            "Score the narrative below on clarity, completeness, neutrality, \
             evidence support, and hedging, each 0.0-1.0.\n\n\
             HEADLINE:\n{{headline}}\n\nEVIDENCE SUMMARY:\n{{evidence_summary}}\n\n\
             KEY FINDINGS:\n{{key_findings}}\n\nLIMITATIONS:\n{{limitations}}\n\n\
             Answer with JSON: {\"clarity\": number, \"completeness\": number, \
             \"neutrality\": number, \"evidence_support\": number, \"hedging\": number}",
        ),
    ]
}
