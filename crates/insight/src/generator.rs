//! Candidate Generator: one candidate per strategy per round.
//!
//! All three strategies share one parameterized path; only the template
//! differs. A failed or timed-out call yields no candidate for that strategy.

use crate::inference::{complete_with_timeout, InferenceError, InferenceService};
use insight_shared::prompt::render;
use insight_shared::{AggregatedContext, Candidate, ComplexityVerdict, PromptTemplates, Question, Strategy};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Output of one generation round
#[derive(Debug, Clone, Default)]
pub struct GenerationRound {
    /// In `Strategy::ALL` order, failed strategies omitted
    pub candidates: Vec<Candidate>,
    pub failures: Vec<(Strategy, InferenceError)>,
}

impl GenerationRound {
    pub fn failed_strategies(&self) -> Vec<Strategy> {
        self.failures.iter().map(|(s, _)| *s).collect()
    }
}

/// Fill a strategy template.
pub fn build_prompt(
    templates: &PromptTemplates,
    strategy: Strategy,
    question: &Question,
    verdict: ComplexityVerdict,
    context: &AggregatedContext,
    feedback: &str,
) -> String {
    let verdict = verdict.to_string();
    let context = context.render();
    render(
        templates.for_strategy(strategy),
        &[
            ("question", question.raw().trim()),
            ("verdict", &verdict),
            ("feedback", feedback),
            ("context", &context),
        ],
    )
}

pub struct CandidateGenerator {
    service: Arc<dyn InferenceService>,
    model: String,
    timeout: Duration,
    templates: PromptTemplates,
}

impl CandidateGenerator {
    pub fn new(
        service: Arc<dyn InferenceService>,
        model: impl Into<String>,
        timeout: Duration,
        templates: PromptTemplates,
    ) -> Self {
        Self {
            service,
            model: model.into(),
            timeout,
            templates,
        }
    }

    async fn generate_one(
        &self,
        strategy: Strategy,
        question: &Question,
        verdict: ComplexityVerdict,
        context: &AggregatedContext,
        feedback: &str,
    ) -> Result<Candidate, InferenceError> {
        let prompt = build_prompt(&self.templates, strategy, question, verdict, context, feedback);
        debug!("Generator: {} prompt {} chars", strategy, prompt.len());
        let text = complete_with_timeout(self.service.as_ref(), &self.model, &prompt, self.timeout).await?;
        Ok(Candidate::new(strategy, text))
    }

    /// Produce exactly one candidate attempt per strategy.
    pub async fn generate(
        &self,
        question: &Question,
        verdict: ComplexityVerdict,
        context: &AggregatedContext,
        feedback: &str,
    ) -> GenerationRound {
        let (direct, contextual, comprehensive) = tokio::join!(
            self.generate_one(Strategy::Direct, question, verdict, context, feedback),
            self.generate_one(Strategy::Contextual, question, verdict, context, feedback),
            self.generate_one(Strategy::Comprehensive, question, verdict, context, feedback),
        );

        let mut round = GenerationRound::default();
        for (strategy, result) in Strategy::ALL.into_iter().zip([direct, contextual, comprehensive]) {
            match result {
                Ok(candidate) if !candidate.text.is_empty() => round.candidates.push(candidate),
                Ok(_) => round.failures.push((strategy, InferenceError::EmptyResponse)),
                Err(e) => {
                    warn!("Generator: {} failed: {}", strategy, e);
                    round.failures.push((strategy, e));
                }
            }
        }
        round
    }
}
