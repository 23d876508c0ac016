//! Alignment Evaluator: deterministic checks first, judge second.
//!
//! The judge is only consulted for candidates that already pass every
//! deterministic check. Its verdict is AND-ed with the checks.

use crate::inference::{complete_with_timeout, InferenceService};
use insight_shared::alignment::{
    check_candidate, parse_judge_verdict, AlignmentScore, EvaluationInput, JudgeOutcome,
};
use insight_shared::prompt::render;
use insight_shared::Candidate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct AlignmentEvaluator {
    service: Arc<dyn InferenceService>,
    judge_model: String,
    timeout: Duration,
    judge_enabled: bool,
    template: String,
}

impl AlignmentEvaluator {
    pub fn new(
        service: Arc<dyn InferenceService>,
        judge_model: impl Into<String>,
        timeout: Duration,
        judge_enabled: bool,
        template: impl Into<String>,
    ) -> Self {
        Self {
            service,
            judge_model: judge_model.into(),
            timeout,
            judge_enabled,
            template: template.into(),
        }
    }

    fn judge_prompt(&self, candidate: &Candidate, input: &EvaluationInput<'_>) -> String {
        let vocab = input.vocabulary;
        let entity = if input.classification.entities.is_empty() {
            "the entity named in the question".to_string()
        } else {
            input
                .classification
                .entities
                .iter()
                .map(|e| vocab.label(e))
                .collect::<Vec<_>>()
                .join(" or ")
        };
        let verdict = input.classification.verdict.to_string();
        let context = input.context.render();
        render(
            &self.template,
            &[
                ("question", input.question.raw().trim()),
                ("verdict", &verdict),
                ("entity", &entity),
                ("context", &context),
                ("answer", &candidate.text),
            ],
        )
    }

    async fn judge(&self, candidate: &Candidate, input: &EvaluationInput<'_>) -> JudgeOutcome {
        let prompt = self.judge_prompt(candidate, input);
        match complete_with_timeout(self.service.as_ref(), &self.judge_model, &prompt, self.timeout).await {
            Ok(raw) => match parse_judge_verdict(&raw) {
                Some(verdict) => JudgeOutcome::Parsed { verdict },
                None => {
                    warn!("Judge output for {} is malformed, failing closed", candidate.strategy);
                    JudgeOutcome::Malformed
                }
            },
            Err(e) => {
                warn!("Judge call for {} failed: {}", candidate.strategy, e);
                JudgeOutcome::Unavailable
            }
        }
    }

    /// Score every candidate, in input order.
    pub async fn evaluate(
        &self,
        candidates: &[Candidate],
        input: &EvaluationInput<'_>,
    ) -> Vec<AlignmentScore> {
        let mut scores = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let report = check_candidate(candidate, input);
            let deterministic_pass = report.checks.iter().all(|(_, ok)| *ok);

            let judge = if !self.judge_enabled || !deterministic_pass {
                JudgeOutcome::Skipped
            } else {
                self.judge(candidate, input).await
            };

            let score = AlignmentScore::combine(candidate.strategy, &report, judge);
            debug!(
                "Evaluator: {} pass={} failing={:?} untraced={:?}",
                candidate.strategy, score.pass, score.failing, score.untraced_claims
            );
            scores.push(score);
        }
        scores
    }
}
