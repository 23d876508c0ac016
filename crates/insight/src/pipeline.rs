//! The answering pipeline: `ask(question) -> AnswerResult`.
//!
//! Flow:
//! 1. Classify; AMBIGUOUS goes straight to clarification (no inference call)
//! 2. Decompose COMPLEX questions into sub-questions
//! 3. Retrieve per sub-question and aggregate into one budgeted context
//! 4. Generate one candidate per strategy, evaluate, gate
//! 5. RETRY with feedback (and entity narrowing) until `max_attempts`
//! 6. ACCEPT the preferred passing candidate or CLARIFY
//!
//! No error escapes `ask`; only construction can fail.

use crate::config::InsightConfig;
use crate::evaluator::AlignmentEvaluator;
use crate::generator::CandidateGenerator;
use crate::inference::{DisabledService, InferenceService, OllamaService};
use anyhow::{Context, Result};
use insight_shared::alignment::EvaluationInput;
use insight_shared::gate::{AttemptRecord, ClarifyCause};
use insight_shared::{
    aggregate, classify, decide, decompose, retrieve, AggregatedContext, AnswerResult,
    ClarificationRequest, Classification, DataSourceRegistry, Decomposition, GateDecision,
    PipelineState, ProvenanceSummary, Question, RetryFeedback, Stage,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Validated question-answering pipeline. Cheap to share across tasks.
pub struct Pipeline {
    registry: Arc<DataSourceRegistry>,
    config: InsightConfig,
    generator: CandidateGenerator,
    evaluator: AlignmentEvaluator,
}

impl Pipeline {
    pub fn new(
        registry: Arc<DataSourceRegistry>,
        service: Arc<dyn InferenceService>,
        config: InsightConfig,
    ) -> Self {
        let generator = CandidateGenerator::new(
            service.clone(),
            config.inference.generator_model.clone(),
            config.inference.generator_timeout(),
            config.prompts.clone(),
        );
        let evaluator = AlignmentEvaluator::new(
            service,
            config.inference.judge_model.clone(),
            config.inference.judge_timeout(),
            config.evaluation.judge_enabled,
            config.prompts.judge.clone(),
        );
        Self {
            registry,
            config,
            generator,
            evaluator,
        }
    }

    /// Load the registry from `config.registry.path` and talk to Ollama.
    /// An empty endpoint disables inference; every question then ends in
    /// clarification.
    pub fn from_config(config: InsightConfig) -> Result<Self> {
        let registry = DataSourceRegistry::load(&config.registry.path)
            .with_context(|| format!("loading registry from {}", config.registry.path.display()))?;
        let service: Arc<dyn InferenceService> = if config.inference.endpoint.trim().is_empty() {
            warn!("No inference endpoint configured, inference disabled");
            Arc::new(DisabledService)
        } else {
            Arc::new(OllamaService::new(config.inference.endpoint.clone())?)
        };
        Ok(Self::new(Arc::new(registry), service, config))
    }

    pub fn registry(&self) -> &DataSourceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &InsightConfig {
        &self.config
    }

    /// Answer a question or ask for clarification. Always terminates.
    pub async fn ask(&self, raw: &str) -> AnswerResult {
        let mut state = PipelineState::new(
            Uuid::new_v4().to_string(),
            self.config.pipeline.max_attempts,
        );
        let question = Question::new(raw);
        info!("[{}] Question: {}", state.request_id, question.raw().trim());

        let classification = classify(&question, self.registry.vocabulary());
        state.verdict = classification.verdict;
        info!(
            "[{}] {}: {} (entities={:?}, metrics={:?})",
            state.request_id,
            Stage::Classify,
            classification.verdict,
            classification.entities,
            classification.metrics
        );

        if classification.is_ambiguous() {
            return self.clarify_ambiguous(&mut state, &question, &classification.missing);
        }

        state.transition(Stage::Decompose);
        let sub_questions = match decompose(&question, &classification, &self.registry) {
            Decomposition::SubQuestions { items } => items,
            Decomposition::Ambiguous { missing } => {
                let classification = classification.into_ambiguous(missing);
                state.verdict = classification.verdict;
                return self.clarify_ambiguous(&mut state, &question, &classification.missing);
            }
        };
        info!(
            "[{}] {}: {} sub-question(s)",
            state.request_id,
            Stage::Decompose,
            sub_questions.len()
        );

        let opts = self.config.pipeline.retrieval_options();
        let retrieved = sub_questions
            .iter()
            .flat_map(|s| retrieve(s, &self.registry, &opts))
            .collect();
        let context = aggregate(retrieved, self.config.pipeline.context_budget_chars);
        if context.is_empty() {
            warn!("[{}] No context retrieved, generating anyway", state.request_id);
        } else {
            info!(
                "[{}] Context: {} fragment(s), {}/{} chars, {} dropped",
                state.request_id,
                context.fragments().len(),
                context.total_chars(),
                context.budget_chars(),
                context.dropped()
            );
        }

        self.run_rounds(&mut state, &question, &classification, context).await
    }

    fn clarify_ambiguous(
        &self,
        state: &mut PipelineState,
        question: &Question,
        missing: &[String],
    ) -> AnswerResult {
        state.transition(Stage::Clarify);
        info!("[{}] {}: ambiguous question", state.request_id, Stage::Clarify);
        AnswerResult::Clarification(ClarificationRequest::ambiguous(
            question.raw(),
            missing,
            &self.registry,
        ))
    }

    async fn run_rounds(
        &self,
        state: &mut PipelineState,
        question: &Question,
        classification: &Classification,
        context: AggregatedContext,
    ) -> AnswerResult {
        let vocab = self.registry.vocabulary();
        let mut active = context.clone();
        let mut narrowed = false;
        let mut feedback = RetryFeedback::default();

        loop {
            let attempt = state.begin_attempt();
            if !feedback.expected_entities.is_empty() {
                if let Some(reduced) = context.narrow_to(&feedback.expected_entities) {
                    info!(
                        "[{}] Narrowing context to {:?}: {} -> {} fragments",
                        state.request_id,
                        feedback.expected_entities,
                        active.fragments().len(),
                        reduced.fragments().len()
                    );
                    active = reduced;
                    narrowed = true;
                }
            }

            let round = self
                .generator
                .generate(question, classification.verdict, &active, &feedback.render(vocab))
                .await;
            info!(
                "[{}] {} attempt {}/{}: {} candidate(s)",
                state.request_id,
                Stage::RetrieveAndGenerate,
                attempt,
                state.max_attempts,
                round.candidates.len()
            );

            state.transition(Stage::Evaluate);
            let input = EvaluationInput {
                question,
                classification,
                context: &active,
                vocabulary: vocab,
                policy: self.config.evaluation.detail_policy(),
            };
            let scores = self.evaluator.evaluate(&round.candidates, &input).await;

            let record = AttemptRecord {
                attempt,
                failed_strategies: round.failed_strategies(),
                scores,
                narrowed,
            };
            let decision = decide(state, &record, &classification.entities);
            state.record(record);

            match decision {
                GateDecision::Accept { index } => {
                    if let Some(candidate) = round.candidates.get(index) {
                        state.transition(Stage::Accept);
                        info!(
                            "[{}] {}: {} after {} attempt(s)",
                            state.request_id,
                            Stage::Accept,
                            candidate.strategy,
                            attempt
                        );
                        return AnswerResult::Answer {
                            text: candidate.text.clone(),
                            provenance: ProvenanceSummary {
                                request_id: state.request_id.clone(),
                                sources: active.sources(),
                                strategy: candidate.strategy,
                                attempts: attempt,
                                verdict: classification.verdict,
                            },
                        };
                    }
                    warn!("[{}] Gate accepted missing candidate {}", state.request_id, index);
                    return self.clarify(state, question, classification, ClarifyCause::Unverified {
                        failing: Vec::new(),
                    });
                }
                GateDecision::Retry(next) => {
                    state.transition(Stage::Retry);
                    warn!(
                        "[{}] {}: failing={:?} service_failure={}",
                        state.request_id,
                        Stage::Retry,
                        next.failing,
                        next.service_failure
                    );
                    feedback = next;
                }
                GateDecision::Clarify(cause) => {
                    return self.clarify(state, question, classification, cause);
                }
            }
        }
    }

    fn clarify(
        &self,
        state: &mut PipelineState,
        question: &Question,
        classification: &Classification,
        cause: ClarifyCause,
    ) -> AnswerResult {
        state.transition(Stage::Clarify);
        let request = match cause {
            ClarifyCause::ServiceUnavailable => ClarificationRequest::service_unavailable(
                question.raw(),
                state.attempt_count,
                classification,
                &self.registry,
            ),
            ClarifyCause::Unverified { failing } => ClarificationRequest::unverified(
                question.raw(),
                &failing,
                classification,
                &self.registry,
            ),
        };
        info!(
            "[{}] {}: {} after {} attempt(s), last failed strategies {:?}",
            state.request_id,
            Stage::Clarify,
            request.code,
            state.attempt_count,
            state.last_attempt().map(|r| r.failed_strategies.as_slice()).unwrap_or_default()
        );
        AnswerResult::Clarification(request)
    }
}
